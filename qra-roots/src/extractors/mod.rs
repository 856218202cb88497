//! Root extraction backends
//!
//! Each backend implements [`RootExtractor`](crate::types::RootExtractor):
//! 1. **offline_cache** - location lookup in the offline corpus dump
//! 2. **online_corpus** - word-by-word corpus pages, one request per verse
//! 3. **dictionary** - curated online dictionaries (AlMaany, Baheth)
//! 4. **stemmer** - algorithmic stemmers (known-word table + affix rules, rule-based)
//!
//! Backends never return errors; failures come back as unsuccessful
//! `ExtractionResult`s and are retried or ignored by the caller.

pub mod dictionary;
pub mod offline_cache;
pub mod online_corpus;
pub mod stemmer;

#[cfg(test)]
pub mod mock;

pub use dictionary::{DictionaryExtractor, DictionaryKind};
pub use offline_cache::OfflineCacheExtractor;
pub use online_corpus::OnlineCorpusExtractor;
pub use stemmer::{AlKhalilStemmer, PyArabicStemmer};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::types::{ExtractionError, RootExtractor};
use reqwest::{header, Client};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Browser-like User-Agent; the dictionary sites reject unknown agents
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Build the HTTP client shared by the scraping backends
pub(crate) fn build_http_client(timeout: Duration, accept_language: &'static str) -> reqwest::Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        header::HeaderValue::from_static(accept_language),
    );

    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
}

/// GET `url` and return the body, mapping failures to extraction errors
pub(crate) async fn fetch_text(client: &Client, url: reqwest::Url) -> Result<String, ExtractionError> {
    debug!(url = %url, "Fetching page");

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| ExtractionError::Network(format!("request to {} failed: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ExtractionError::Api(format!("{} returned {}", url, status)));
    }

    response
        .text()
        .await
        .map_err(|e| ExtractionError::Network(format!("reading body from {} failed: {}", url, e)))
}

/// Extractors grouped by the tier that calls them
#[derive(Default)]
pub struct ExtractorRegistry {
    pub offline: Option<Arc<dyn RootExtractor>>,
    pub online: Option<Arc<dyn RootExtractor>>,
    /// Consensus voters, in call order
    pub consensus: Vec<Arc<dyn RootExtractor>>,
}

impl ExtractorRegistry {
    /// Build the configured backends
    ///
    /// Cache files are resolved against `root_folder`.
    pub fn from_config(config: &PipelineConfig, root_folder: &Path) -> PipelineResult<Self> {
        let location_cache = PipelineConfig::resolve(root_folder, &config.location_cache_file);
        let offline: Arc<dyn RootExtractor> = Arc::new(OfflineCacheExtractor::from_file(&location_cache));

        let online: Option<Arc<dyn RootExtractor>> = if config.enable_online_corpus {
            Some(Arc::new(OnlineCorpusExtractor::new(
                config.online_corpus_url.clone(),
                config.http_timeout(),
            )?))
        } else {
            None
        };

        let mut consensus: Vec<Arc<dyn RootExtractor>> = Vec::new();
        if config.enable_dictionaries {
            consensus.push(Arc::new(DictionaryExtractor::almaany(config.http_timeout())?));
            consensus.push(Arc::new(DictionaryExtractor::baheth(config.http_timeout())?));
        }
        let known_roots = config
            .known_roots_file
            .as_deref()
            .map(|file| PipelineConfig::resolve(root_folder, file));
        consensus.push(Arc::new(PyArabicStemmer::from_file(known_roots.as_deref())));
        consensus.push(Arc::new(AlKhalilStemmer::new()));

        let registry = Self {
            offline: Some(offline),
            online,
            consensus,
        };
        info!(sources = ?registry.names(), "Extractors registered");
        for (name, interval) in registry.min_intervals() {
            if !interval.is_zero() {
                debug!(source = %name, interval_ms = interval.as_millis() as u64, "Rate limited source");
            }
        }
        Ok(registry)
    }

    fn all(&self) -> impl Iterator<Item = &Arc<dyn RootExtractor>> {
        self.offline
            .iter()
            .chain(self.online.iter())
            .chain(self.consensus.iter())
    }

    /// Source names in tier order
    pub fn names(&self) -> Vec<String> {
        self.all().map(|e| e.name().to_string()).collect()
    }

    /// Minimum spacing each source enforces between its requests, in tier order
    pub fn min_intervals(&self) -> Vec<(String, Duration)> {
        self.all()
            .map(|e| (e.name().to_string(), e.rate_limiter().min_interval()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.offline.is_none() && self.online.is_none() && self.consensus.is_empty()
    }

    /// Reject a registry that cannot produce any root
    pub fn ensure_usable(&self) -> PipelineResult<()> {
        if self.is_empty() {
            return Err(PipelineError::Config("no extractor registered".to_string()));
        }
        Ok(())
    }
}
