//! VD core: retained scene graph, component instancing, variables/themes,
//! transactional mutation with undo, fit/fill layout, hit-testing, and the
//! wire-format bridge.
//!
//! The entry point is [`Document`]: it owns the scene, the variable store,
//! the theme axes, and the undo history. All mutation goes through
//! [`Document::begin_update`], which returns the document's single
//! [`update::UpdateBlock`]; rendering and tools read the committed,
//! resolved tree and never mutate it.

pub mod document;
pub mod error;
pub mod geom;
pub mod hit;
pub mod id;
pub mod layout;
pub mod model;
pub mod prototype;
pub mod scene;
pub mod update;
pub mod variable;
pub mod wire;

pub use document::Document;
pub use error::{Error, ErrorKind, Result};
pub use id::NodeId;
pub use layout::{insertion_index, run_layout, Axis, HeuristicMeasurer, TextMeasurer};
pub use model::*;
pub use scene::{Geometry, Node, NodeKind, PrototypeLink, Scene};
pub use update::UpdateBlock;
pub use variable::{
    ThemeAxis, ThemeMap, ThemedValue, VarId, VarType, VarValue, Variable, VariableStore,
};

// Re-export the graph handle type so downstream crates don't need a direct
// petgraph dependency.
pub use petgraph::graph::NodeIndex;
