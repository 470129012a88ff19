//! In-memory backend
//!
//! Behaves like an object store with conditional puts: every write is atomic
//! and `write_new` is a compare-and-set on absence. Used by tests and by
//! `memory://` locators.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{LakeError, Result};

use super::{FileIO, FileStatus};

#[derive(Debug, Default)]
struct MemState {
    files: BTreeMap<PathBuf, Bytes>,
    dirs: BTreeSet<PathBuf>,
}

impl MemState {
    fn add_parents(&mut self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir.as_os_str().is_empty() || !self.dirs.insert(dir.to_path_buf()) {
                break;
            }
            current = dir.parent();
        }
    }
}

/// [`FileIO`] backed by a map of path → bytes
#[derive(Debug, Default)]
pub struct MemoryFileIO {
    state: RwLock<MemState>,
}

impl MemoryFileIO {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance behind `memory://` locators
    pub fn shared() -> Arc<MemoryFileIO> {
        static SHARED: OnceLock<Arc<MemoryFileIO>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(MemoryFileIO::new())))
    }

    /// Number of stored files (for tests)
    pub fn file_count(&self) -> usize {
        self.state.read().files.len()
    }
}

impl FileIO for MemoryFileIO {
    fn read(&self, path: &Path) -> Result<Bytes> {
        self.state
            .read()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| LakeError::not_found("file", path))
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut state = self.state.write();
        state.add_parents(path);
        state
            .files
            .insert(path.to_path_buf(), Bytes::copy_from_slice(data));
        Ok(())
    }

    fn write_new(&self, path: &Path, data: &[u8]) -> Result<bool> {
        let mut state = self.state.write();
        if state.files.contains_key(path) {
            return Ok(false);
        }
        state.add_parents(path);
        state
            .files
            .insert(path.to_path_buf(), Bytes::copy_from_slice(data));
        Ok(true)
    }

    fn list(&self, dir: &Path) -> Result<Vec<FileStatus>> {
        let state = self.state.read();
        if !state.dirs.contains(dir) {
            return Err(LakeError::not_found("directory", dir));
        }

        let mut out = Vec::new();
        for sub in state.dirs.iter().filter(|d| d.parent() == Some(dir)) {
            out.push(FileStatus {
                path: sub.clone(),
                is_dir: true,
                len: 0,
            });
        }
        for (path, data) in state.files.iter().filter(|(p, _)| p.parent() == Some(dir)) {
            out.push(FileStatus {
                path: path.clone(),
                is_dir: false,
                len: data.len() as u64,
            });
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        let state = self.state.read();
        Ok(state.files.contains_key(path) || state.dirs.contains(path))
    }

    fn is_dir(&self, path: &Path) -> Result<bool> {
        Ok(self.state.read().dirs.contains(path))
    }

    fn delete(&self, path: &Path) -> Result<()> {
        self.state.write().files.remove(path);
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.state.write();
        state.add_parents(path);
        state.dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        self.state
            .read()
            .files
            .get(path)
            .map(|b| b.len() as u64)
            .ok_or_else(|| LakeError::not_found("file", path))
    }
}
