use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MhpfError {
    /// Structurally invalid archive or input that cannot be encoded.
    #[error("Format error: {0}")]
    Format(String),

    /// A declared byte range reaches past the end of the stream.
    #[error("Truncated archive: {what} needs {needed} bytes, only {available} available")]
    Truncated {
        what:      String,
        needed:    u64,
        available: u64,
    },

    #[error("No identifier for '{path}' in the identifier map")]
    MissingIdentifier { path: String },

    #[error("Source '{path}' changed size: expected {expected} bytes, read {actual}")]
    SizeMismatch {
        path:     String,
        expected: u64,
        actual:   u64,
    },

    #[error("Identifier map error: {0}")]
    IdMap(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, MhpfError>;

impl MhpfError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        MhpfError::Format(msg.into())
    }

    pub(crate) fn truncated(what: impl Into<String>, needed: u64, available: u64) -> Self {
        MhpfError::Truncated { what: what.into(), needed, available }
    }
}
