//! Word to VerifiedRoot cache
//!
//! File format: `{word: {root, sources, confidence, agreement_count, total_sources}}`,
//! loaded at startup and rewritten wholesale on save (temp file + rename).

use crate::error::{PipelineError, PipelineResult};
use crate::types::VerifiedRoot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// On-disk entry (the word is the map key)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CachedRoot {
    root: String,
    sources: BTreeMap<String, String>,
    confidence: f64,
    agreement_count: usize,
    total_sources: usize,
}

impl CachedRoot {
    fn from_verified(verified: &VerifiedRoot) -> Self {
        Self {
            root: verified.root.clone(),
            sources: verified.sources.clone(),
            confidence: verified.confidence,
            agreement_count: verified.agreement_count,
            total_sources: verified.total_sources,
        }
    }

    fn into_verified(self, word: &str) -> VerifiedRoot {
        VerifiedRoot {
            word: word.to_string(),
            root: self.root,
            sources: self.sources,
            confidence: self.confidence,
            agreement_count: self.agreement_count,
            total_sources: self.total_sources,
        }
    }
}

/// Shared result cache
///
/// Entries are immutable once inserted; a second insert for the same word
/// is ignored.
pub struct ResultCache {
    path: Option<PathBuf>,
    entries: RwLock<BTreeMap<String, CachedRoot>>,
    /// One writer of the temp file at a time
    save_lock: Mutex<()>,
}

impl ResultCache {
    /// Cache that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(BTreeMap::new()),
            save_lock: Mutex::new(()),
        }
    }

    /// Load from `path`
    ///
    /// A missing file gives an empty cache. A corrupt file is logged and
    /// also gives an empty cache; it is overwritten on the next save.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, CachedRoot>>(&content) {
                Ok(entries) => {
                    info!(path = %path.display(), entries = entries.len(), "Loaded result cache");
                    entries
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Result cache is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No result cache file yet");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Result cache unreadable, starting empty");
                BTreeMap::new()
            }
        };

        Self {
            path: Some(path),
            entries: RwLock::new(entries),
            save_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn get(&self, word: &str) -> Option<VerifiedRoot> {
        let entries = self.entries.read().await;
        entries.get(word).cloned().map(|cached| cached.into_verified(word))
    }

    /// Insert unless already cached; returns true if the entry was added
    pub async fn insert(&self, verified: &VerifiedRoot) -> bool {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&verified.word) {
            return false;
        }
        entries.insert(verified.word.clone(), CachedRoot::from_verified(verified));
        true
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Serialized form of the whole cache
    pub async fn to_json(&self) -> PipelineResult<String> {
        let entries = self.entries.read().await;
        Ok(serde_json::to_string_pretty(&*entries)?)
    }

    /// Rewrite the cache file atomically; no-op for in-memory caches
    ///
    /// Concurrent saves are serialized, each writing the snapshot current
    /// when it takes the lock.
    pub async fn save(&self) -> PipelineResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _guard = self.save_lock.lock().await;
        let json = self.to_json().await?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| PipelineError::Cache(format!("write {}: {}", tmp_path.display(), e)))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| PipelineError::Cache(format!("rename to {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "Saved result cache");
        Ok(())
    }
}
