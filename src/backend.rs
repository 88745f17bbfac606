//! Transfer modes between an operation and a sink.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// How data travels from an operation to its sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The sink receives a filesystem path and works on it directly.
    File,
    /// The sink receives fully materialized text.
    Text,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// Data materialized for one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Absolute path of the source, unread.
    Path(PathBuf),
    /// Complete content.
    Text(String),
    /// Complete content of a source that is not valid UTF-8, byte for byte.
    Bytes(Vec<u8>),
}

impl Payload {
    /// The backend this payload belongs to.
    pub fn backend(&self) -> Backend {
        match self {
            Self::Path(_) => Backend::File,
            Self::Text(_) | Self::Bytes(_) => Backend::Text,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(p) => Some(p),
            Self::Text(_) | Self::Bytes(_) => None,
        }
    }

    /// Content as a string, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Path(_) | Self::Bytes(_) => None,
        }
    }

    /// Raw content, for either text shape.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Text(t) => Some(t.as_bytes()),
            Self::Bytes(b) => Some(b),
            Self::Path(_) => None,
        }
    }
}

pub(crate) fn join_backends(backends: &[Backend]) -> String {
    backends
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
