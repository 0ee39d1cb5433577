//! The physical I/O seam.
//!
//! The coordinator never touches the filesystem itself; it hands each
//! physical operation to a [`WriteSink`] on a background thread. Each call is
//! synchronous from the sink's point of view and its return value is the
//! completion signal.

use std::fs::{self, OpenOptions};
use std::io::{self, Write as IoWrite};

use write_forget_core::WriteMode;

/// Performs the byte-level writes for the coordinator.
///
/// Implementations must be callable from several threads at once: writes to
/// distinct paths run concurrently. Two calls for the same path never
/// overlap.
pub trait WriteSink: Send + Sync + 'static {
    /// Replace the contents of `path` with `content`, creating it if needed.
    fn write_all(&self, path: &str, content: &str) -> io::Result<()>;

    /// Append `content` to `path`, creating it if needed.
    fn append(&self, path: &str, content: &str) -> io::Result<()>;

    fn apply(&self, mode: WriteMode, path: &str, content: &str) -> io::Result<()> {
        match mode {
            WriteMode::Overwrite => self.write_all(path, content),
            WriteMode::Append => self.append(path, content),
        }
    }
}

/// Writes straight to the local filesystem, UTF-8 encoded.
///
/// No fsync, no temp-file rename: durability is whatever `write(2)` gives.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSink;

impl WriteSink for FsSink {
    fn write_all(&self, path: &str, content: &str) -> io::Result<()> {
        fs::write(path, content.as_bytes())
    }

    fn append(&self, path: &str, content: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(content.as_bytes())
    }
}
