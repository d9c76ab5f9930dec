use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::sanitize::sanitize;

use super::model::FileEntry;

/// Filesystem-backed store for uploaded files. Cheap to clone; every handle
/// points at the same uploads directory. Names are sanitized before any
/// path is built, and collisions are last-writer-wins.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (or create) the uploads directory at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).context("create uploads dir")?;
        Ok(Self {
            root: root.to_owned(),
        })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(sanitize(name))
    }

    /// Write `bytes` under the sanitized `name`, replacing any existing file.
    pub fn put(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(name);
        fs::write(&path, bytes).with_context(|| format!("write upload {}", path.display()))?;
        debug!(name = %path.display(), size = bytes.len(), "stored upload");
        Ok(())
    }

    /// Enumerate the uploads area, skipping dot-names, sorted by name.
    pub fn list(&self) -> Result<Vec<FileEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root).context("read uploads dir")? {
            let entry = entry.context("read uploads dir entry")?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let size = entry
                .metadata()
                .with_context(|| format!("stat upload {name}"))?
                .len();
            entries.push(FileEntry { name, size });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Read a file's bytes. `None` if it does not exist; any other I/O
    /// failure is an error.
    pub fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(name);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read upload {}", path.display())),
        }
    }

    /// Remove a file if present. Absence is success.
    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(name = %path.display(), "deleted upload");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("delete upload {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_store() -> (FileStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = FileStore::open(&dir.path().join("uploads")).unwrap();
        (store, dir)
    }

    #[test]
    fn put_get_delete_round_trip() {
        let (s, _dir) = make_store();
        s.put("report.pdf", b"pdf bytes").unwrap();
        assert_eq!(s.get("report.pdf").unwrap().unwrap(), b"pdf bytes");
        s.delete("report.pdf").unwrap();
        assert!(s.get("report.pdf").unwrap().is_none());
    }

    #[test]
    fn get_missing_is_none() {
        let (s, _dir) = make_store();
        assert!(s.get("nope.bin").unwrap().is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let (s, _dir) = make_store();
        s.put("a.txt", b"x").unwrap();
        s.delete("a.txt").unwrap();
        s.delete("a.txt").unwrap();
    }

    #[test]
    fn overwrite_is_last_writer_wins() {
        let (s, _dir) = make_store();
        s.put("a.txt", b"first").unwrap();
        s.put("a.txt", b"second").unwrap();
        assert_eq!(s.get("a.txt").unwrap().unwrap(), b"second");
        assert_eq!(s.list().unwrap().len(), 1);
    }

    #[test]
    fn list_reports_sizes_and_skips_dot_names() {
        let (s, dir) = make_store();
        s.put("b.bin", &[0u8; 10]).unwrap();
        s.put("a.bin", &[0u8; 3]).unwrap();
        std::fs::write(dir.path().join("uploads").join(".hidden"), b"x").unwrap();

        let entries = s.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.bin");
        assert_eq!(entries[0].size, 3);
        assert_eq!(entries[1].name, "b.bin");
        assert_eq!(entries[1].size, 10);
    }

    #[test]
    fn traversal_names_stay_inside_the_root() {
        let (s, dir) = make_store();
        s.put("../escape.txt", b"x").unwrap();
        // Sanitized to "_escape.txt" ("/" substituted, ".." stripped).
        assert!(dir.path().join("uploads").join("_escape.txt").exists());
        assert!(!dir.path().join("escape.txt").exists());
    }
}
