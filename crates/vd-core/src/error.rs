//! Typed error kinds for every fallible core operation.
//!
//! The kind set is closed; hosts match on `ErrorKind` for policy and show
//! `context` (the offending node id or path) to the user. Blocks are the
//! unit of recovery: any `Error` inside a block propagates to the owner and
//! the block rolls back.

use std::fmt;
use thiserror::Error;

/// The closed set of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DuplicateId,
    NotFound,
    InvalidPath,
    ReferenceCycle,
    PrototypeInUse,
    BlockAlreadyOpen,
    TypeMismatch,
    InvalidOverridePath,
    InstanceStructureMismatch,
    SizeOutOfRange,
    SchemaUnsupported,
    DuplicateName,
}

impl ErrorKind {
    /// Stable string form, used on the wire and in host logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateId => "DuplicateId",
            Self::NotFound => "NotFound",
            Self::InvalidPath => "InvalidPath",
            Self::ReferenceCycle => "ReferenceCycle",
            Self::PrototypeInUse => "PrototypeInUse",
            Self::BlockAlreadyOpen => "BlockAlreadyOpen",
            Self::TypeMismatch => "TypeMismatch",
            Self::InvalidOverridePath => "InvalidOverridePath",
            Self::InstanceStructureMismatch => "InstanceStructureMismatch",
            Self::SizeOutOfRange => "SizeOutOfRange",
            Self::SchemaUnsupported => "SchemaUnsupported",
            Self::DuplicateName => "DuplicateName",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure with its kind and a human-readable context string.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind}: {context}")]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
        }
    }

    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound, what.to_string())
    }

    pub fn duplicate_id(id: impl fmt::Display) -> Self {
        Self::new(ErrorKind::DuplicateId, id.to_string())
    }

    pub fn invalid_path(path: impl fmt::Display) -> Self {
        Self::new(ErrorKind::InvalidPath, path.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(ErrorKind::PrototypeInUse.as_str(), "PrototypeInUse");
        assert_eq!(
            Error::new(ErrorKind::NotFound, "hero/title").to_string(),
            "NotFound: hero/title"
        );
    }
}
