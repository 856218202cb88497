//! Algorithmic stemmers
//!
//! - [`PyArabicStemmer`] (`pyarabic`): known-word table, then affix stripping
//!   with weak-letter trimming. Confidence 0.7 for a table hit, 0.6 otherwise.
//! - [`AlKhalilStemmer`] (`alkhalil`): prefix/suffix stripping, weak-letter
//!   handling and duplicate collapsing, then 3-4 letter root selection.
//!   Confidence 0.4 for a root pattern, 0.3 for the bare-stem fallback.
//!
//! Both are local and unthrottled.

use crate::arabic::{clean_word, is_arabic_letters, is_weak, strip_prefix, strip_suffix};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    ExtractionError, ExtractionResult, Location, RootExtractor, SOURCE_ALKHALIL, SOURCE_PYARABIC,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

// ============================================================================
// PyArabic-style stemmer
// ============================================================================

const PYARABIC_PREFIXES: &[&str] = &["وال", "فال", "بال", "كال", "لال", "ال", "و", "ف", "ب", "ل", "ك"];

const PYARABIC_SUFFIXES: &[&str] = &[
    "ونهم", "ونها", "ونكم", "ونه", "ونا", "وني", "ومه", "وما", "ومي", "ون", "ين", "ان", "ات", "ية",
    "تين", "ته", "تا", "تي", "تك", "تم", "تن", "ها", "هم", "هن", "كم", "كن", "نا", "ة", "ه", "ي",
    "ك", "ن", "ا",
];

const KNOWN_ROOT_CONFIDENCE: f64 = 0.7;
const PYARABIC_ALGORITHMIC_CONFIDENCE: f64 = 0.6;

/// Keys consulted, in order, when a known-roots entry is a `{source: root}` object
const KNOWN_ROOT_KEYS: [&str; 2] = ["placeholder", "qurancorpus"];

pub struct PyArabicStemmer {
    known_roots: HashMap<String, String>,
    rate_limiter: RateLimiter,
}

impl PyArabicStemmer {
    pub fn new(known_roots: HashMap<String, String>) -> Self {
        Self {
            known_roots,
            rate_limiter: RateLimiter::unlimited(),
        }
    }

    /// Load the known-word table from `path` if present
    ///
    /// Accepts `{word: root}` or `{word: {source: root}}`. Unreadable files
    /// are logged and leave the table empty.
    pub fn from_file(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::new(HashMap::new());
        };

        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<HashMap<String, Value>>(&content).map_err(|e| e.to_string())
            });

        match parsed {
            Ok(entries) => {
                let known_roots: HashMap<String, String> = entries
                    .into_iter()
                    .filter_map(|(word, value)| known_root_from_value(&value).map(|root| (word, root)))
                    .collect();
                info!(path = %path.display(), words = known_roots.len(), "Loaded known roots");
                Self::new(known_roots)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not load known roots");
                Self::new(HashMap::new())
            }
        }
    }

    pub fn known_word_count(&self) -> usize {
        self.known_roots.len()
    }
}

fn known_root_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(root) if !root.is_empty() => Some(root.clone()),
        Value::Object(sources) => KNOWN_ROOT_KEYS
            .iter()
            .filter_map(|key| sources.get(*key).and_then(Value::as_str))
            .find(|root| !root.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

/// Affix-stripping root guess
pub fn pyarabic_root(word: &str) -> Option<String> {
    let cleaned: Vec<char> = clean_word(word).chars().collect();
    let had_marks = cleaned.len() != word.chars().count();

    let (stem, _) = strip_prefix(&cleaned, PYARABIC_PREFIXES);
    let mut stem = strip_suffix(&stem, PYARABIC_SUFFIXES);

    let leading_weak = |c: char| matches!(c, 'ا' | 'و' | 'ي');
    let trailing_weak = |c: char| matches!(c, 'ا' | 'ي' | 'و' | 'ى');
    let hard_weak = |c: char| matches!(c, 'ا' | 'و' | 'ي' | 'ء');

    if stem.len() > 3 {
        if leading_weak(stem[0]) && !hard_weak(stem[1]) && !hard_weak(stem[2]) {
            stem.remove(0);
        }
        let n = stem.len();
        if n > 3 && trailing_weak(stem[n - 1]) && !hard_weak(stem[n - 2]) {
            stem.pop();
        }
    }

    let root: Vec<char> = match stem.len() {
        0..=3 => stem,
        4 if stem[3] == 'ن' && had_marks => stem[..3].to_vec(),
        4 => stem,
        _ => {
            let strong: Vec<char> = stem.iter().copied().filter(|c| !is_weak(*c)).collect();
            if strong.len() >= 3 {
                strong[..3].to_vec()
            } else {
                stem[..3].to_vec()
            }
        }
    };

    (root.len() >= 2).then(|| root.into_iter().collect())
}

#[async_trait]
impl RootExtractor for PyArabicStemmer {
    fn name(&self) -> &str {
        SOURCE_PYARABIC
    }

    fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    async fn extract_root(&self, word: &str, _location: Option<&Location>) -> ExtractionResult {
        if let Some(root) = self.known_roots.get(word) {
            return ExtractionResult::success(word, root.clone(), SOURCE_PYARABIC, KNOWN_ROOT_CONFIDENCE);
        }

        match pyarabic_root(word) {
            Some(root) => {
                ExtractionResult::success(word, root, SOURCE_PYARABIC, PYARABIC_ALGORITHMIC_CONFIDENCE)
            }
            None => ExtractionError::NotFound("could not extract valid root".to_string())
                .into_result(word, SOURCE_PYARABIC),
        }
    }
}

// ============================================================================
// AlKhalil-style rule-based stemmer
// ============================================================================

const ALKHALIL_PREFIXES: &[&str] = &[
    "والذي", "بالذي", "فالذي", "كالذي", "وال", "فال", "بال", "كال", "لل", "ال", "و", "ف", "ب", "ل",
    "ك",
];

const ALKHALIL_SUFFIXES: &[&str] = &[
    "ونهم", "ونها", "ونني", "ونكم", "ونه", "ونا", "وني", "ومه", "وما", "تهم", "تها", "تني", "تكم",
    "تنا", "هما", "كما", "نني", "ون", "ين", "ان", "ات", "ية", "ته", "تا", "تي", "تك", "تم", "تن",
    "ها", "هم", "هن", "كم", "كن", "نا", "ة", "ه", "ي", "ك", "ن", "ا", "ت",
];

const ROOT_PATTERN_CONFIDENCE: f64 = 0.4;
const STEM_FALLBACK_CONFIDENCE: f64 = 0.3;

/// Rule-based outcome: the root and whether it came from the pattern step
#[derive(Debug, Clone, PartialEq)]
pub enum AlKhalilOutcome {
    Root(String),
    Stem(String),
    None,
}

pub fn alkhalil_root(word: &str) -> AlKhalilOutcome {
    let cleaned: Vec<char> = clean_word(word).chars().collect();

    let (stem, prefix) = strip_prefix(&cleaned, ALKHALIL_PREFIXES);
    let mut stem = strip_suffix(&stem, ALKHALIL_SUFFIXES);

    // A weak letter right after a removed prefix is usually part of the affix
    if prefix.is_some() && stem.len() > 3 && is_weak(stem[0]) && !is_weak(stem[1]) {
        stem.remove(0);
    }

    // Collapse doubled strong consonants
    let mut collapsed: Vec<char> = Vec::with_capacity(stem.len());
    for &c in &stem {
        if collapsed.last() != Some(&c) || is_weak(c) {
            collapsed.push(c);
        }
    }
    if collapsed.len() >= 3 {
        stem = collapsed;
    }

    if stem.len() >= 3 {
        let root: Vec<char> = match stem.len() {
            3 => stem.clone(),
            4 if is_weak(stem[3]) && !is_weak(stem[2]) => stem[..3].to_vec(),
            4 => stem.clone(),
            _ => {
                let strong: Vec<char> = stem.iter().copied().filter(|c| !is_weak(*c)).collect();
                if strong.len() >= 3 {
                    strong[..3].to_vec()
                } else {
                    stem[..4].to_vec()
                }
            }
        };

        let root: String = root.into_iter().collect();
        if is_arabic_letters(&root) {
            return AlKhalilOutcome::Root(root);
        }
    }

    if (2..=4).contains(&stem.len()) {
        return AlKhalilOutcome::Stem(stem.into_iter().collect());
    }

    AlKhalilOutcome::None
}

pub struct AlKhalilStemmer {
    rate_limiter: RateLimiter,
}

impl AlKhalilStemmer {
    pub fn new() -> Self {
        Self {
            rate_limiter: RateLimiter::unlimited(),
        }
    }
}

impl Default for AlKhalilStemmer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RootExtractor for AlKhalilStemmer {
    fn name(&self) -> &str {
        SOURCE_ALKHALIL
    }

    fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    async fn extract_root(&self, word: &str, _location: Option<&Location>) -> ExtractionResult {
        match alkhalil_root(word) {
            AlKhalilOutcome::Root(root) => {
                ExtractionResult::success(word, root, SOURCE_ALKHALIL, ROOT_PATTERN_CONFIDENCE)
            }
            AlKhalilOutcome::Stem(stem) => {
                ExtractionResult::success(word, stem, SOURCE_ALKHALIL, STEM_FALLBACK_CONFIDENCE)
            }
            AlKhalilOutcome::None => ExtractionError::NotFound("could not extract valid root".to_string())
                .into_result(word, SOURCE_ALKHALIL),
        }
    }
}
