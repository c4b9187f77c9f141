//! Error kinds surfaced at the recovery engine's boundary.

use std::fmt;
use std::io;

/// An error produced while decoding the filesystem or recovering a file.
#[derive(Debug)]
pub enum RecoveryError {
    /// A seek or read on the device failed or returned fewer bytes than requested.
    IoFailure(io::Error),
    /// A decoded field violates a structural invariant of the on-disk format.
    FormatError(String),
    /// The super-block advertises a filesystem variant this engine does not model.
    UnsupportedFilesystem(String),
    /// Journal traversal was aborted before completion.
    JournalDamaged(String),
}

impl fmt::Display for RecoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoFailure(e) => write!(f, "I/O failure: {e}"),
            Self::FormatError(msg) => write!(f, "format error: {msg}"),
            Self::UnsupportedFilesystem(msg) => write!(f, "unsupported filesystem: {msg}"),
            Self::JournalDamaged(msg) => write!(f, "journal damaged: {msg}"),
        }
    }
}

impl std::error::Error for RecoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoFailure(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RecoveryError {
    fn from(e: io::Error) -> Self {
        Self::IoFailure(e)
    }
}

pub type Result<T> = std::result::Result<T, RecoveryError>;
