use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use tracing::debug;

use crate::sanitize::sanitize;

use super::model::{TextDocument, TextEntry, TextMeta};

const META_FILE: &str = ".meta.json";

/// Filesystem-backed store for named text documents, plus the visibility
/// metadata map. The map is authoritative for listings and for the public
/// read gate; it is rewritten wholesale to `.meta.json` on every mutation,
/// under the same write lock as the in-memory update.
#[derive(Clone)]
pub struct TextStore {
    root: PathBuf,
    meta: Arc<RwLock<HashMap<String, TextMeta>>>,
}

impl TextStore {
    /// Open (or create) the texts directory and load the metadata file.
    /// A corrupt metadata file fails the open rather than being discarded.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).context("create texts dir")?;

        let meta_path = root.join(META_FILE);
        let meta = match fs::read(&meta_path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parse {}", meta_path.display()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e).with_context(|| format!("read {}", meta_path.display())),
        };

        Ok(Self {
            root: root.to_owned(),
            meta: Arc::new(RwLock::new(meta)),
        })
    }

    fn doc_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.txt"))
    }

    /// Serialize the map to `.meta.json`. Callers hold the write lock so the
    /// persisted form never lags a concurrent mutation.
    fn persist_meta(&self, meta: &HashMap<String, TextMeta>) -> Result<()> {
        let bytes = serde_json::to_vec(meta).context("encode text metadata")?;
        fs::write(self.root.join(META_FILE), bytes).context("write text metadata")?;
        Ok(())
    }

    /// Write the document, then update and persist the metadata entry.
    /// Overwrites any prior document and flag for the sanitized name.
    pub fn save(&self, name: &str, content: &str, open: bool) -> Result<()> {
        let name = sanitize(name);
        let doc = TextDocument {
            content: content.to_owned(),
            open,
        };
        let bytes = serde_json::to_vec(&doc).context("encode text document")?;
        fs::write(self.doc_path(&name), bytes)
            .with_context(|| format!("write text document {name}"))?;

        let mut meta = self.meta.write().unwrap_or_else(PoisonError::into_inner);
        meta.insert(name.clone(), TextMeta { open });
        self.persist_meta(&meta)?;
        debug!(name = %name, open, "saved text");
        Ok(())
    }

    /// Authenticated read: the document regardless of its visibility flag.
    /// `None` if absent; a document that exists but fails to parse is an
    /// error, not a panic.
    pub fn read(&self, name: &str) -> Result<Option<TextDocument>> {
        let name = sanitize(name);
        let path = self.doc_path(&name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("read text document {name}")),
        };
        let doc = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse text document {name}"))?;
        Ok(Some(doc))
    }

    /// Unauthenticated read: only succeeds when the metadata map marks the
    /// name open AND the document is present. Everything else is `None`, so
    /// the caller falls through to its session gate.
    pub fn read_public(&self, name: &str) -> Result<Option<TextDocument>> {
        let name = sanitize(name);
        let open = {
            let meta = self.meta.read().unwrap_or_else(PoisonError::into_inner);
            meta.get(&name).map(|m| m.open).unwrap_or(false)
        };
        if !open {
            return Ok(None);
        }
        self.read(&name)
    }

    /// Listing straight from the metadata map, sorted by name. No on-disk
    /// existence check: an externally removed document still lists.
    pub fn list(&self) -> Result<Vec<TextEntry>> {
        let meta = self.meta.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<TextEntry> = meta
            .iter()
            .map(|(name, m)| TextEntry {
                name: name.clone(),
                open: m.open,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Remove the document (absence is fine) and its metadata entry, then
    /// persist the map. Idempotent.
    pub fn delete(&self, name: &str) -> Result<()> {
        let name = sanitize(name);
        match fs::remove_file(self.doc_path(&name)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("delete text document {name}")),
        }

        let mut meta = self.meta.write().unwrap_or_else(PoisonError::into_inner);
        meta.remove(&name);
        self.persist_meta(&meta)?;
        debug!(name = %name, "deleted text");
        Ok(())
    }
}
