//! Storage Module
//!
//! Narrow storage abstraction every other component goes through.
//!
//! ## Responsibilities
//! - Whole-file reads and atomic whole-file writes
//! - Create-if-absent publication (the primitive behind snapshot commits)
//! - Directory listing and existence probes
//! - Resolving a table locator (`file://`, bare path, `memory://`) to a backend
//!
//! Backends never hold authoritative state beyond the files themselves, so
//! any number of processes may share a table root.

mod local;
mod memory;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use url::Url;

use crate::error::{LakeError, Result};

pub use local::LocalFileIO;
pub use memory::MemoryFileIO;

/// One entry returned by [`FileIO::list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    /// Full path of the entry
    pub path: PathBuf,
    /// Whether the entry is a directory
    pub is_dir: bool,
    /// Size in bytes (0 for directories)
    pub len: u64,
}

impl FileStatus {
    /// Final path component as a string
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Storage operations required by the engine.
///
/// `write_atomic` replaces the target in one step (readers see either the old
/// or the new content). `write_new` publishes the content only if the target
/// does not exist yet and reports whether it won.
pub trait FileIO: Send + Sync + fmt::Debug {
    /// Read a whole file. Missing files fail with `NotFound`.
    fn read(&self, path: &Path) -> Result<Bytes>;

    /// Atomically create or replace a file.
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Atomically create a file only if absent. Returns `false` if it exists.
    fn write_new(&self, path: &Path, data: &[u8]) -> Result<bool>;

    /// List the direct children of a directory. Missing dirs fail with `NotFound`.
    fn list(&self, dir: &Path) -> Result<Vec<FileStatus>>;

    /// Whether a file or directory exists
    fn exists(&self, path: &Path) -> Result<bool>;

    /// Whether a path is an existing directory
    fn is_dir(&self, path: &Path) -> Result<bool>;

    /// Remove a file; removing a missing file is not an error
    fn delete(&self, path: &Path) -> Result<()>;

    /// Create a directory and all of its parents
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Size of an existing file
    fn file_size(&self, path: &Path) -> Result<u64>;
}

/// Resolve a table locator to a storage backend and the table root path.
///
/// - bare paths and `file://` URLs map to [`LocalFileIO`]
/// - `memory://<name>/...` maps to the process-wide [`MemoryFileIO`]
/// - anything else fails with `Unsupported`
pub fn resolve(locator: &str, sync_writes: bool) -> Result<(Arc<dyn FileIO>, PathBuf)> {
    if !locator.contains("://") {
        let io: Arc<dyn FileIO> = Arc::new(LocalFileIO::new(sync_writes));
        return Ok((io, PathBuf::from(locator)));
    }

    let url = Url::parse(locator)
        .map_err(|e| LakeError::InvalidArgument(format!("bad table locator '{}': {}", locator, e)))?;

    match url.scheme() {
        "file" => {
            let path = url.to_file_path().map_err(|_| {
                LakeError::InvalidArgument(format!("not a local file URL: {}", locator))
            })?;
            let io: Arc<dyn FileIO> = Arc::new(LocalFileIO::new(sync_writes));
            Ok((io, path))
        }
        "memory" => {
            let mut root = PathBuf::from("/");
            if let Some(host) = url.host_str() {
                root.push(host);
            }
            for segment in url.path_segments().into_iter().flatten() {
                if !segment.is_empty() {
                    root.push(segment);
                }
            }
            let io: Arc<dyn FileIO> = MemoryFileIO::shared();
            Ok((io, root))
        }
        other => Err(LakeError::Unsupported(format!(
            "storage scheme '{}' (table locator {})",
            other, locator
        ))),
    }
}
