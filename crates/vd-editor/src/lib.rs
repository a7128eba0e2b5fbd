//! VD editor layer: interaction-level services on top of the core —
//! geometric snapping for drag/resize gestures and the clipboard.

pub mod clipboard;
pub mod snap;

pub use clipboard::{copy, paste, ClipboardPayload, RemoteData};
pub use snap::{RecordedSnap, SnapEngine, SnapOptions, SnapResult};
