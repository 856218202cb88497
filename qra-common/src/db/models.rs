//! Database models

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Verification status of a token's root
///
/// A token starts as `Missing` and moves to exactly one of the other
/// states; it never returns to `Missing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Missing,
    Verified,
    Discrepancy,
    ManualReview,
}

impl TokenStatus {
    /// Stored (lowercase) form
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Missing => "missing",
            TokenStatus::Verified => "verified",
            TokenStatus::Discrepancy => "discrepancy",
            TokenStatus::ManualReview => "manual_review",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TokenStatus::Missing)
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "missing" => Ok(TokenStatus::Missing),
            "verified" => Ok(TokenStatus::Verified),
            "discrepancy" => Ok(TokenStatus::Discrepancy),
            "manual_review" => Ok(TokenStatus::ManualReview),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown token status: {}",
                other
            ))),
        }
    }
}

/// Position of a word: container (surah), verse (aya), 0-indexed word position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub container: i64,
    pub verse: i64,
    pub position: i64,
}

impl Location {
    pub fn new(container: i64, verse: i64, position: i64) -> Self {
        Self {
            container,
            verse,
            position,
        }
    }

    /// Cache key form `"<container>:<verse>:<position>"`
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.container, self.verse, self.position)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.container, self.verse, self.position)
    }
}

/// A persisted token row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub id: i64,
    pub container: i64,
    pub verse: i64,
    pub position: i64,
    pub text_ar: String,
    pub normalized: String,
    pub root: Option<String>,
    /// Source name to root, as reported by the extractors that agreed or disagreed
    pub root_sources: Option<BTreeMap<String, String>>,
    pub status: TokenStatus,
    /// Ids of other tokens sharing the root
    pub references: Option<Vec<i64>>,
}

impl TokenRecord {
    pub fn location(&self) -> Location {
        Location::new(self.container, self.verse, self.position)
    }
}

/// A persisted root index entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootEntry {
    pub root: String,
    pub token_count: i64,
    pub tokens: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_string_forms() {
        for status in [
            TokenStatus::Missing,
            TokenStatus::Verified,
            TokenStatus::Discrepancy,
            TokenStatus::ManualReview,
        ] {
            let parsed: TokenStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!("VERIFIED".parse::<TokenStatus>().is_err());
        assert!(!TokenStatus::Missing.is_terminal());
        assert!(TokenStatus::ManualReview.is_terminal());
    }

    #[test]
    fn test_location_key() {
        let location = Location::new(2, 255, 0);
        assert_eq!(location.key(), "2:255:0");
        assert_eq!(location.to_string(), "2:255:0");
    }
}
