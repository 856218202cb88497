//! Online corpus extractor
//!
//! Scrapes the corpus word-by-word page for a verse. Each table row whose
//! first cell holds a `(C:V:W)` location span and a `qurandictionary.jsp?q=`
//! link yields the Buckwalter root of word W, stored at position W-1.
//! Parsed verses are memoized so one request serves the whole verse.
//!
//! - Endpoint: `<base>/wordbyword.jsp?chapter=C&verse=V`
//! - Rate limit: 1 request/second
//! - Confidence: 1.0

use crate::rate_limiter::RateLimiter;
use crate::types::{
    ExtractionError, ExtractionResult, Location, RootExtractor, SOURCE_ONLINE_CORPUS,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Url};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Default corpus site
pub const DEFAULT_BASE_URL: &str = "https://corpus.quran.com";

/// Rate limit: 1 request per second
const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(1000);

/// Buckwalter transliteration to Arabic
pub fn buckwalter_to_arabic(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'A' => 'ا',
            'b' => 'ب',
            't' => 'ت',
            'v' => 'ث',
            'j' => 'ج',
            'H' => 'ح',
            'x' => 'خ',
            'd' => 'د',
            '*' => 'ذ',
            'r' => 'ر',
            'z' => 'ز',
            's' => 'س',
            '$' => 'ش',
            'S' => 'ص',
            'D' => 'ض',
            'T' => 'ط',
            'Z' => 'ظ',
            'E' => 'ع',
            'g' => 'غ',
            'f' => 'ف',
            'q' => 'ق',
            'k' => 'ك',
            'l' => 'ل',
            'm' => 'م',
            'n' => 'ن',
            'h' => 'ه',
            'w' => 'و',
            'y' => 'ي',
            'Y' => 'ى',
            '\'' => 'ء',
            'p' => 'ة',
            '|' => 'آ',
            '>' => 'أ',
            '<' => 'إ',
            '&' => 'ؤ',
            '}' => 'ئ',
            other => other,
        })
        .collect()
}

static ROW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("valid row regex"));

static CELL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<td[^>]*>(.*?)</td>").expect("valid cell regex"));

static LOCATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<span[^>]*class="location"[^>]*>\s*\((\d+):(\d+):(\d+)\)"#)
        .expect("valid location regex")
});

static DICTIONARY_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)href="[^"]*qurandictionary\.jsp\?q=([A-Za-z*$]+)"#)
        .expect("valid dictionary link regex")
});

/// Parse a word-by-word page into `position -> Arabic root` for one verse
///
/// Rows for other verses (or without a dictionary link) are skipped.
pub fn parse_verse_roots(html: &str, container: i64, verse: i64) -> HashMap<i64, String> {
    let mut roots = HashMap::new();

    for row in ROW_RE.captures_iter(html) {
        let row_html = &row[1];
        let cells: Vec<&str> = CELL_RE
            .captures_iter(row_html)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        if cells.len() < 3 {
            continue;
        }

        let first_cell = cells[0];
        let Some(link) = DICTIONARY_LINK_RE.captures(first_cell) else {
            continue;
        };
        let Some(location) = LOCATION_RE.captures(first_cell) else {
            continue;
        };

        let (Ok(row_container), Ok(row_verse), Ok(word_index)) = (
            location[1].parse::<i64>(),
            location[2].parse::<i64>(),
            location[3].parse::<i64>(),
        ) else {
            continue;
        };

        if row_container == container && row_verse == verse && word_index >= 1 {
            roots.insert(word_index - 1, buckwalter_to_arabic(&link[1]));
        }
    }

    roots
}

pub struct OnlineCorpusExtractor {
    http_client: Client,
    base_url: String,
    rate_limiter: RateLimiter,
    /// (container, verse) -> position -> root
    verse_cache: Mutex<HashMap<(i64, i64), HashMap<i64, String>>>,
}

impl OnlineCorpusExtractor {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            http_client: super::build_http_client(timeout, "en-US,en;q=0.5")?,
            base_url: base_url.into(),
            rate_limiter: RateLimiter::new(RATE_LIMIT_INTERVAL),
            verse_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Seed the per-verse memo (used when a verse page was fetched elsewhere)
    pub async fn remember_verse(&self, container: i64, verse: i64, roots: HashMap<i64, String>) {
        self.verse_cache.lock().await.insert((container, verse), roots);
    }

    async fn cached_verse(&self, container: i64, verse: i64) -> Option<HashMap<i64, String>> {
        self.verse_cache.lock().await.get(&(container, verse)).cloned()
    }

    fn verse_url(&self, container: i64, verse: i64) -> Result<Url, ExtractionError> {
        let mut url = Url::parse(&format!("{}/wordbyword.jsp", self.base_url.trim_end_matches('/')))
            .map_err(|e| ExtractionError::Parse(format!("invalid corpus URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("chapter", &container.to_string())
            .append_pair("verse", &verse.to_string());
        Ok(url)
    }

    /// Roots for a whole verse, fetched at most once
    ///
    /// Failed fetches are not memoized.
    async fn fetch_verse_roots(
        &self,
        container: i64,
        verse: i64,
    ) -> Result<HashMap<i64, String>, ExtractionError> {
        if let Some(roots) = self.cached_verse(container, verse).await {
            return Ok(roots);
        }

        self.rate_limiter.wait().await;

        // Another caller may have fetched the verse while we waited
        if let Some(roots) = self.cached_verse(container, verse).await {
            return Ok(roots);
        }

        let url = self.verse_url(container, verse)?;
        let html = super::fetch_text(&self.http_client, url).await?;
        let roots = parse_verse_roots(&html, container, verse);

        info!(container, verse, words = roots.len(), "Fetched corpus verse");
        self.remember_verse(container, verse, roots.clone()).await;
        Ok(roots)
    }
}

#[async_trait]
impl RootExtractor for OnlineCorpusExtractor {
    fn name(&self) -> &str {
        SOURCE_ONLINE_CORPUS
    }

    fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    async fn extract_root(&self, word: &str, location: Option<&Location>) -> ExtractionResult {
        let Some(location) = location else {
            return ExtractionError::MissingLocation(SOURCE_ONLINE_CORPUS.to_string())
                .into_result(word, SOURCE_ONLINE_CORPUS);
        };

        let verse_roots = match self.fetch_verse_roots(location.container, location.verse).await {
            Ok(roots) => roots,
            Err(e) => return e.into_result(word, SOURCE_ONLINE_CORPUS),
        };

        match verse_roots.get(&location.position) {
            Some(root) if !root.is_empty() => {
                debug!(location = %location, word, root = %root, "Corpus root found");
                ExtractionResult::success(word, root.clone(), SOURCE_ONLINE_CORPUS, 1.0)
            }
            _ => ExtractionError::NotFound(format!(
                "position {} not found in verse {}:{}",
                location.position, location.container, location.verse
            ))
            .into_result(word, SOURCE_ONLINE_CORPUS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSE_PAGE: &str = r#"
        <table class="morphologyTable">
          <tr><th>Translation</th><th>Arabic</th><th>Grammar</th></tr>
          <tr>
            <td class="c1"><span class="location">(1:2:1)</span><br/>
              <a href="/qurandictionary.jsp?q=Hmd#(1:2:1)">All praise</a></td>
            <td class="c2">ٱلْحَمْدُ</td>
            <td class="c3">N</td>
          </tr>
          <tr>
            <td class="c1"><span class="location">(1:2:2)</span><br/>
              <a href="/qurandictionary.jsp?q=Alh#(1:2:2)">(be) to Allah</a></td>
            <td class="c2">لِلَّهِ</td>
            <td class="c3">P PN</td>
          </tr>
          <tr>
            <td class="c1"><span class="location">(1:2:3)</span><br/>
              <a href="/qurandictionary.jsp?q=rbb#(1:2:3)">(the) Lord</a></td>
            <td class="c2">رَبِّ</td>
            <td class="c3">N</td>
          </tr>
          <tr>
            <td class="c1"><span class="location">(1:3:1)</span><br/>
              <a href="/qurandictionary.jsp?q=rHm#(1:3:1)">The Most Gracious</a></td>
            <td class="c2">ٱلرَّحْمَٰنِ</td>
            <td class="c3">ADJ</td>
          </tr>
          <tr>
            <td class="c1"><span class="location">(1:2:4)</span><br/>no root</td>
            <td class="c2">ٱلْ</td>
            <td class="c3">DET</td>
          </tr>
        </table>"#;

    #[test]
    fn test_buckwalter_conversion() {
        assert_eq!(buckwalter_to_arabic("ktb"), "كتب");
        assert_eq!(buckwalter_to_arabic("Hmd"), "حمد");
        assert_eq!(buckwalter_to_arabic("$ms"), "شمس");
        assert_eq!(buckwalter_to_arabic("*kr"), "ذكر");
        assert_eq!(buckwalter_to_arabic(">mn"), "أمن");
    }

    #[test]
    fn test_parse_verse_roots_zero_indexed() {
        let roots = parse_verse_roots(VERSE_PAGE, 1, 2);

        assert_eq!(roots.len(), 3);
        assert_eq!(roots.get(&0).map(String::as_str), Some("حمد"));
        assert_eq!(roots.get(&1).map(String::as_str), Some("اله"));
        assert_eq!(roots.get(&2).map(String::as_str), Some("ربب"));
    }

    #[test]
    fn test_parse_skips_other_verses() {
        let roots = parse_verse_roots(VERSE_PAGE, 1, 3);
        assert_eq!(roots.len(), 1);
        assert_eq!(roots.get(&0).map(String::as_str), Some("رحم"));
        assert!(parse_verse_roots(VERSE_PAGE, 2, 2).is_empty());
    }

    #[tokio::test]
    async fn test_memoized_verse_serves_all_positions() {
        let extractor =
            OnlineCorpusExtractor::new(DEFAULT_BASE_URL, Duration::from_secs(1)).unwrap();
        extractor
            .remember_verse(1, 2, parse_verse_roots(VERSE_PAGE, 1, 2))
            .await;

        let first = extractor
            .extract_root("الحمد", Some(&Location::new(1, 2, 0)))
            .await;
        let third = extractor
            .extract_root("رب", Some(&Location::new(1, 2, 2)))
            .await;
        let missing = extractor
            .extract_root("العالمين", Some(&Location::new(1, 2, 3)))
            .await;

        assert_eq!(first.root.as_deref(), Some("حمد"));
        assert_eq!(first.confidence, 1.0);
        assert_eq!(third.root.as_deref(), Some("ربب"));
        assert!(!missing.success);
    }

    #[tokio::test]
    async fn test_requires_location() {
        let extractor =
            OnlineCorpusExtractor::new(DEFAULT_BASE_URL, Duration::from_secs(1)).unwrap();
        let result = extractor.extract_root("كتاب", None).await;

        assert!(!result.success);
        assert_eq!(result.source, "qurancorpus");
    }

    #[test]
    fn test_verse_url() {
        let extractor =
            OnlineCorpusExtractor::new("https://corpus.example/", Duration::from_secs(1)).unwrap();
        let url = extractor.verse_url(2, 255).unwrap();
        assert_eq!(
            url.as_str(),
            "https://corpus.example/wordbyword.jsp?chapter=2&verse=255"
        );
    }
}
