//! Serialization bridge: the on-wire JSON tree ↔ the runtime model.
//!
//! The bridge is the one boundary where policy is lenient: malformed
//! optional structure is downgraded to `log::warn!` and skipped, while
//! type mismatches on variable references and unknown schema versions are
//! hard errors. Documents are migrated to the current schema version
//! before any deserialization.

pub mod emitter;
pub mod migrate;
pub mod parser;

pub use emitter::{emit_document, emit_document_value, EmitOptions};
pub use migrate::{migrate, CURRENT_VERSION};
pub use parser::parse_document;
