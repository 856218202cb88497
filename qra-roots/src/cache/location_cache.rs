//! Location-keyed root store backing the offline corpus extractor
//!
//! File format:
//! `{"metadata": {"version", "source", "total_words"}, "roots": {"c:v:p": root}}`

use crate::types::Location;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationCacheMetadata {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub total_words: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationCache {
    #[serde(default)]
    pub metadata: LocationCacheMetadata,
    #[serde(default)]
    roots: HashMap<String, String>,
}

impl LocationCache {
    /// Load from disk; missing or corrupt files give an empty cache
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Location cache not available, offline lookups disabled");
                return Self::default();
            }
        };

        match serde_json::from_str::<LocationCache>(&content) {
            Ok(cache) => {
                info!(
                    path = %path.display(),
                    total_words = cache.metadata.total_words.unwrap_or(cache.roots.len() as u64),
                    "Loaded location cache"
                );
                cache
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Location cache is corrupt, offline lookups disabled");
                Self::default()
            }
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (Location, String)>) -> Self {
        let roots: HashMap<String, String> = entries
            .into_iter()
            .map(|(location, root)| (location.key(), root))
            .collect();
        Self {
            metadata: LocationCacheMetadata {
                version: None,
                source: None,
                total_words: Some(roots.len() as u64),
            },
            roots,
        }
    }

    pub fn get(&self, location: &Location) -> Option<&str> {
        self.roots
            .get(&location.key())
            .map(String::as_str)
            .filter(|root| !root.is_empty())
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_file_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corpus.json");
        std::fs::write(
            &path,
            r#"{"metadata": {"version": "0.4", "source": "corpus dump", "total_words": 2},
                "roots": {"1:1:0": "سمو", "1:1:1": "أله"}}"#,
        )
        .unwrap();

        let cache = LocationCache::load(&path);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.metadata.version.as_deref(), Some("0.4"));
        assert_eq!(cache.get(&Location::new(1, 1, 0)), Some("سمو"));
        assert_eq!(cache.get(&Location::new(1, 1, 5)), None);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let cache = LocationCache::load(Path::new("/nonexistent/corpus.json"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corpus.json");
        std::fs::write(&path, "[1, 2").unwrap();
        assert!(LocationCache::load(&path).is_empty());
    }
}
