//! Error types for write-forget
//!
//! A single failure class exists: the physical write did not succeed. These
//! errors never reach the code that submitted the request; they are handed to
//! the coordinator's fault channel instead.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for write-forget operations
pub type Result<T> = std::result::Result<T, WriteError>;

/// How a physical operation changes the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Replace the whole file with the content.
    Overwrite,
    /// Add the content to the end of the file.
    Append,
}

impl WriteMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::Append => "append",
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a background write.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error during {mode} of {path}: {source}")]
    Io {
        path: String,
        mode: WriteMode,
        #[source]
        source: std::io::Error,
    },

    #[error("Sink panicked during {mode} of {path}: {message}")]
    SinkPanicked {
        path: String,
        mode: WriteMode,
        message: String,
    },

    #[error("Failed to start background write for {path}: {source}")]
    WorkerSpawn {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl WriteError {
    /// Path of the write that failed.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Io { path, .. } | Self::SinkPanicked { path, .. } | Self::WorkerSpawn { path, .. } => {
                path
            }
        }
    }

    /// Mode of the failed write, when the failure happened inside the sink.
    #[must_use]
    pub const fn mode(&self) -> Option<WriteMode> {
        match self {
            Self::Io { mode, .. } | Self::SinkPanicked { mode, .. } => Some(*mode),
            Self::WorkerSpawn { .. } => None,
        }
    }
}
