//! Local filesystem backend
//!
//! Atomic replace uses write-temp → fsync → rename. Create-if-absent uses
//! write-temp → fsync → hard link, since `link(2)` refuses to overwrite and
//! the published file is complete the instant it becomes visible.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use uuid::Uuid;

use crate::error::{LakeError, Result};

use super::{FileIO, FileStatus};

/// [`FileIO`] over `std::fs`
#[derive(Debug, Clone)]
pub struct LocalFileIO {
    /// fsync files and parent directories before publishing
    sync: bool,
}

impl LocalFileIO {
    pub fn new(sync: bool) -> Self {
        Self { sync }
    }

    /// Temp path next to the target so rename/link stay on one filesystem
    fn temp_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4()))
    }

    fn write_temp(&self, path: &Path, data: &[u8]) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = Self::temp_path(path);
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp)?;
        let written = file.write_all(data).and_then(|_| {
            if self.sync {
                file.sync_all()
            } else {
                Ok(())
            }
        });
        discard_on_error(&temp, written.map_err(LakeError::from))?;
        Ok(temp)
    }

    fn sync_parent(&self, path: &Path) -> Result<()> {
        if !self.sync {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            // Directory fsync is not supported everywhere (e.g. Windows)
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }
}

impl Default for LocalFileIO {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Remove a half-written temp file if `result` failed
fn discard_on_error<T>(temp: &Path, result: Result<T>) -> Result<T> {
    if result.is_err() {
        let _ = fs::remove_file(temp);
    }
    result
}

fn map_missing(err: std::io::Error, path: &Path) -> LakeError {
    if err.kind() == ErrorKind::NotFound {
        LakeError::not_found("file", path)
    } else {
        LakeError::Io(err)
    }
}

impl FileIO for LocalFileIO {
    fn read(&self, path: &Path) -> Result<Bytes> {
        fs::read(path)
            .map(Bytes::from)
            .map_err(|e| map_missing(e, path))
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let temp = self.write_temp(path, data)?;
        if let Err(e) = fs::rename(&temp, path) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        self.sync_parent(path)
    }

    fn write_new(&self, path: &Path, data: &[u8]) -> Result<bool> {
        let temp = self.write_temp(path, data)?;
        let linked = fs::hard_link(&temp, path);
        let _ = fs::remove_file(&temp);
        match linked {
            Ok(()) => {
                self.sync_parent(path)?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, dir: &Path) -> Result<Vec<FileStatus>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| map_missing(e, dir))? {
            let entry = entry?;
            let meta = entry.metadata()?;
            out.push(FileStatus {
                path: entry.path(),
                is_dir: meta.is_dir(),
                len: if meta.is_dir() { 0 } else { meta.len() },
            });
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(path.exists())
    }

    fn is_dir(&self, path: &Path) -> Result<bool> {
        Ok(path.is_dir())
    }

    fn delete(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| map_missing(e, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_new_refuses_overwrite() {
        let temp = TempDir::new().unwrap();
        let io = LocalFileIO::new(false);
        let path = temp.path().join("snapshot-1");

        assert!(io.write_new(&path, b"first").unwrap());
        assert!(!io.write_new(&path, b"second").unwrap());
        assert_eq!(io.read(&path).unwrap().as_ref(), b"first");
    }

    #[test]
    fn test_failed_temp_write_is_removed() {
        let temp = TempDir::new().unwrap();
        let partial = temp.path().join(".LATEST.tmp");
        fs::write(&partial, b"par").unwrap();

        let failed: Result<()> = Err(LakeError::Io(std::io::Error::new(ErrorKind::Other, "disk full")));
        assert!(discard_on_error(&partial, failed).is_err());
        assert!(!partial.exists());

        fs::write(&partial, b"ok").unwrap();
        discard_on_error(&partial, Ok(())).unwrap();
        assert!(partial.exists());
    }

    #[test]
    fn test_write_atomic_replaces_and_leaves_no_temp() {
        let temp = TempDir::new().unwrap();
        let io = LocalFileIO::new(false);
        let path = temp.path().join("LATEST");

        io.write_atomic(&path, b"1").unwrap();
        io.write_atomic(&path, b"2").unwrap();

        assert_eq!(io.read(&path).unwrap().as_ref(), b"2");
        let entries = io.list(temp.path()).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let io = LocalFileIO::new(false);
        let err = io.read(&temp.path().join("nope")).unwrap_err();
        assert!(matches!(err, LakeError::NotFound { .. }));
    }
}
