//! Curated online dictionary extractors (AlMaany, Baheth)
//!
//! Both fetch an HTML entry page, strip markup and look for the root label
//! `الجذر` followed by a 3-4 letter root.
//!
//! - AlMaany: GET `<base>/<word>/`
//! - Baheth: GET `<base>/all.jsp?term=<word>`
//! - Rate limit: 1.5 seconds per dictionary
//! - Confidence: 0.85

use crate::rate_limiter::RateLimiter;
use crate::types::{
    ExtractionError, ExtractionResult, Location, RootExtractor, SOURCE_ALMAANY, SOURCE_BAHETH,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

pub const ALMAANY_BASE_URL: &str = "https://www.almaany.com/ar/dict/ar-ar";
pub const BAHETH_BASE_URL: &str = "https://www.baheth.info";

/// Curated dictionary confidence
const DICTIONARY_CONFIDENCE: f64 = 0.85;

const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(1500);

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid tag regex"));

/// AlMaany accepts a few label variants and requires a separator
static ALMAANY_ROOT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:الجذر|الأصل|جذر)[\s:]+([ا-ي]{3,4})").expect("valid almaany regex")
});

static BAHETH_ROOT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"الجذر[\s:]*([ا-ي]{3,4})").expect("valid baheth regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictionaryKind {
    AlMaany,
    Baheth,
}

impl DictionaryKind {
    pub fn source(&self) -> &'static str {
        match self {
            DictionaryKind::AlMaany => SOURCE_ALMAANY,
            DictionaryKind::Baheth => SOURCE_BAHETH,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            DictionaryKind::AlMaany => ALMAANY_BASE_URL,
            DictionaryKind::Baheth => BAHETH_BASE_URL,
        }
    }

    fn root_pattern(&self) -> &'static Regex {
        match self {
            DictionaryKind::AlMaany => &ALMAANY_ROOT_RE,
            DictionaryKind::Baheth => &BAHETH_ROOT_RE,
        }
    }
}

/// Markup-free text of an HTML page, whitespace collapsed
pub fn page_text(html: &str) -> String {
    let without_tags = TAG_RE.replace_all(html, " ");
    without_tags
        .replace("&nbsp;", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First root following the dictionary's root label, if any
pub fn find_root(kind: DictionaryKind, html: &str) -> Option<String> {
    let text = page_text(html);
    kind.root_pattern()
        .captures(&text)
        .map(|caps| caps[1].to_string())
}

pub struct DictionaryExtractor {
    kind: DictionaryKind,
    http_client: Client,
    base_url: String,
    rate_limiter: RateLimiter,
}

impl DictionaryExtractor {
    pub fn new(kind: DictionaryKind, base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            kind,
            http_client: super::build_http_client(timeout, "ar,en-US;q=0.7,en;q=0.3")?,
            base_url: base_url.into(),
            rate_limiter: RateLimiter::new(RATE_LIMIT_INTERVAL),
        })
    }

    pub fn almaany(timeout: Duration) -> reqwest::Result<Self> {
        Self::new(DictionaryKind::AlMaany, ALMAANY_BASE_URL, timeout)
    }

    pub fn baheth(timeout: Duration) -> reqwest::Result<Self> {
        Self::new(DictionaryKind::Baheth, BAHETH_BASE_URL, timeout)
    }

    fn entry_url(&self, word: &str) -> Result<Url, ExtractionError> {
        let invalid = |e: String| ExtractionError::Parse(format!("invalid dictionary URL: {}", e));
        let base = self.base_url.trim_end_matches('/');

        match self.kind {
            DictionaryKind::AlMaany => {
                let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
                url.path_segments_mut()
                    .map_err(|_| invalid(base.to_string()))?
                    .push(word)
                    .push("");
                Ok(url)
            }
            DictionaryKind::Baheth => {
                let mut url =
                    Url::parse(&format!("{}/all.jsp", base)).map_err(|e| invalid(e.to_string()))?;
                url.query_pairs_mut().append_pair("term", word);
                Ok(url)
            }
        }
    }

    async fn lookup(&self, word: &str) -> Result<String, ExtractionError> {
        let url = self.entry_url(word)?;
        self.rate_limiter.wait().await;
        let html = super::fetch_text(&self.http_client, url).await?;

        find_root(self.kind, &html)
            .ok_or_else(|| ExtractionError::NotFound("root not found in dictionary".to_string()))
    }
}

#[async_trait]
impl RootExtractor for DictionaryExtractor {
    fn name(&self) -> &str {
        self.kind.source()
    }

    fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    async fn extract_root(&self, word: &str, _location: Option<&Location>) -> ExtractionResult {
        let source = self.kind.source();
        match self.lookup(word).await {
            Ok(root) => {
                debug!(source, word, root = %root, "Dictionary root found");
                ExtractionResult::success(word, root, source, DICTIONARY_CONFIDENCE)
            }
            Err(e) => e.into_result(word, source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_root_after_label_in_sibling_element() {
        let html = r#"<div class="entry"><span class="label">الجذر</span> : <span>كتب</span></div>"#;
        assert_eq!(find_root(DictionaryKind::AlMaany, html).as_deref(), Some("كتب"));
        assert_eq!(find_root(DictionaryKind::Baheth, html).as_deref(), Some("كتب"));
    }

    #[test]
    fn test_almaany_accepts_origin_label() {
        let html = "<p>الأصل: علم</p>";
        assert_eq!(find_root(DictionaryKind::AlMaany, html).as_deref(), Some("علم"));
        assert_eq!(find_root(DictionaryKind::Baheth, html), None);
    }

    #[test]
    fn test_no_label_no_root() {
        let html = "<html><body><p>لا توجد نتائج</p></body></html>";
        assert_eq!(find_root(DictionaryKind::AlMaany, html), None);
        assert_eq!(find_root(DictionaryKind::Baheth, html), None);
    }

    #[test]
    fn test_page_text_strips_markup() {
        assert_eq!(page_text("<b>a</b>&nbsp;<i>b</i>\n\n c"), "a b c");
    }

    #[test]
    fn test_entry_urls() {
        let almaany = DictionaryExtractor::almaany(Duration::from_secs(1)).unwrap();
        let url = almaany.entry_url("كتاب").unwrap();
        assert!(url.as_str().starts_with("https://www.almaany.com/ar/dict/ar-ar/"));
        assert!(url.as_str().ends_with('/'));

        let baheth = DictionaryExtractor::baheth(Duration::from_secs(1)).unwrap();
        let url = baheth.entry_url("كتاب").unwrap();
        assert_eq!(url.path(), "/all.jsp");
        assert_eq!(url.query_pairs().next().map(|(k, v)| (k.into_owned(), v.into_owned())),
            Some(("term".to_string(), "كتاب".to_string())));
    }

    #[test]
    fn test_source_names() {
        assert_eq!(DictionaryKind::AlMaany.source(), "almaany");
        assert_eq!(DictionaryKind::Baheth.source(), "baheth");
    }
}
