//! Source disagreement classification
//!
//! Pure functions over a `{source: root?}` map. Used after extraction to
//! pick the status written to a token, and by the reconciliation pass.

use qra_common::db::TokenStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default minimum number of agreeing sources for VERIFIED
pub const DEFAULT_MIN_SOURCES: usize = 2;

/// Classification of one word's sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    pub word: String,
    pub sources: BTreeMap<String, Option<String>>,
    pub consensus_root: Option<String>,
    pub has_discrepancy: bool,
    pub confidence: f64,
    pub recommended_status: TokenStatus,
}

/// Bucket counts over a set of reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancyStatistics {
    pub total: usize,
    pub verified: usize,
    pub discrepancy: usize,
    pub manual_review: usize,
    pub missing: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct DiscrepancyChecker {
    min_sources: usize,
}

impl Default for DiscrepancyChecker {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SOURCES)
    }
}

impl DiscrepancyChecker {
    pub fn new(min_sources: usize) -> Self {
        Self { min_sources }
    }

    pub fn min_sources(&self) -> usize {
        self.min_sources
    }

    /// Classify one word's sources
    pub fn check(&self, word: &str, sources: &BTreeMap<String, Option<String>>) -> DiscrepancyReport {
        // (root, count) in first-seen order; ties resolve to the earlier entry
        let mut tally: Vec<(&str, usize)> = Vec::new();
        let mut non_null = 0usize;
        for root in sources.values().flatten() {
            non_null += 1;
            match tally.iter_mut().find(|(r, _)| *r == root.as_str()) {
                Some((_, count)) => *count += 1,
                None => tally.push((root.as_str(), 1)),
            }
        }

        if tally.is_empty() {
            return DiscrepancyReport {
                word: word.to_string(),
                sources: sources.clone(),
                consensus_root: None,
                has_discrepancy: false,
                confidence: 0.0,
                recommended_status: TokenStatus::Missing,
            };
        }

        let (mut winner, mut winner_count) = tally[0];
        for &(root, count) in &tally[1..] {
            if count > winner_count {
                winner = root;
                winner_count = count;
            }
        }

        let confidence = winner_count as f64 / non_null as f64;
        let has_discrepancy = tally.len() > 1;

        let recommended_status = if !has_discrepancy && winner_count >= self.min_sources {
            TokenStatus::Verified
        } else if has_discrepancy && confidence < 0.5 {
            TokenStatus::ManualReview
        } else if has_discrepancy {
            TokenStatus::Discrepancy
        } else {
            // Unanimous but below the source minimum
            TokenStatus::Verified
        };

        DiscrepancyReport {
            word: word.to_string(),
            sources: sources.clone(),
            consensus_root: Some(winner.to_string()),
            has_discrepancy,
            confidence,
            recommended_status,
        }
    }

    /// Classify a source map whose roots are all present
    pub fn check_resolved(&self, word: &str, sources: &BTreeMap<String, String>) -> DiscrepancyReport {
        let sources = sources
            .iter()
            .map(|(source, root)| (source.clone(), Some(root.clone())))
            .collect();
        self.check(word, &sources)
    }

    pub fn analyze_batch<'a, I>(&self, words: I) -> Vec<DiscrepancyReport>
    where
        I: IntoIterator<Item = (&'a str, &'a BTreeMap<String, Option<String>>)>,
    {
        words
            .into_iter()
            .map(|(word, sources)| self.check(word, sources))
            .collect()
    }

    pub fn statistics(reports: &[DiscrepancyReport]) -> DiscrepancyStatistics {
        let mut stats = DiscrepancyStatistics {
            total: reports.len(),
            ..Default::default()
        };
        for report in reports {
            match report.recommended_status {
                TokenStatus::Verified => stats.verified += 1,
                TokenStatus::Discrepancy => stats.discrepancy += 1,
                TokenStatus::ManualReview => stats.manual_review += 1,
                TokenStatus::Missing => stats.missing += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(entries: &[(&str, Option<&str>)]) -> BTreeMap<String, Option<String>> {
        entries
            .iter()
            .map(|(s, r)| (s.to_string(), r.map(str::to_string)))
            .collect()
    }

    #[test]
    fn test_unanimous_is_verified() {
        let checker = DiscrepancyChecker::default();
        let report = checker.check(
            "كتاب",
            &sources(&[("alkhalil", Some("كتب")), ("pyarabic", Some("كتب"))]),
        );

        assert_eq!(report.consensus_root.as_deref(), Some("كتب"));
        assert!(!report.has_discrepancy);
        assert_eq!(report.confidence, 1.0);
        assert_eq!(report.recommended_status, TokenStatus::Verified);
    }

    #[test]
    fn test_single_source_still_verified() {
        let checker = DiscrepancyChecker::default();
        let report = checker.check("قلم", &sources(&[("qurancorpus", Some("قلم")), ("baheth", None)]));
        assert_eq!(report.recommended_status, TokenStatus::Verified);
        assert_eq!(report.confidence, 1.0);
    }

    #[test]
    fn test_no_agreement_needs_manual_review() {
        let checker = DiscrepancyChecker::default();
        let report = checker.check(
            "w",
            &sources(&[("a", Some("قرء")), ("b", Some("كتب")), ("c", Some("حمد"))]),
        );

        assert!(report.has_discrepancy);
        assert!((report.confidence - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.recommended_status, TokenStatus::ManualReview);
        // Tie resolves to the first source in map order
        assert_eq!(report.consensus_root.as_deref(), Some("قرء"));
    }

    #[test]
    fn test_majority_with_dissent_is_discrepancy() {
        let checker = DiscrepancyChecker::default();
        let report = checker.check(
            "w",
            &sources(&[("a", Some("تاب")), ("b", Some("كتب")), ("c", Some("كتب"))]),
        );

        assert_eq!(report.consensus_root.as_deref(), Some("كتب"));
        assert!((report.confidence - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.recommended_status, TokenStatus::Discrepancy);
    }

    #[test]
    fn test_even_split_is_discrepancy() {
        let checker = DiscrepancyChecker::default();
        let report = checker.check("w", &sources(&[("a", Some("تاب")), ("b", Some("كتب"))]));
        assert_eq!(report.confidence, 0.5);
        assert_eq!(report.recommended_status, TokenStatus::Discrepancy);
    }

    #[test]
    fn test_all_null_is_missing() {
        let checker = DiscrepancyChecker::default();
        let report = checker.check("w", &sources(&[("a", None), ("b", None)]));
        assert_eq!(report.consensus_root, None);
        assert_eq!(report.confidence, 0.0);
        assert_eq!(report.recommended_status, TokenStatus::Missing);

        let empty = checker.check("w", &BTreeMap::new());
        assert_eq!(empty.recommended_status, TokenStatus::Missing);
    }

    #[test]
    fn test_statistics_partition() {
        let checker = DiscrepancyChecker::default();
        let inputs = vec![
            ("a".to_string(), sources(&[("x", Some("كتب")), ("y", Some("كتب"))])),
            ("b".to_string(), sources(&[("x", Some("كتب")), ("y", Some("تاب"))])),
            ("c".to_string(), sources(&[("x", Some("ا")), ("y", Some("ب")), ("z", Some("ت"))])),
            ("d".to_string(), sources(&[("x", None)])),
            ("e".to_string(), sources(&[("x", Some("قلم"))])),
        ];

        let reports = checker.analyze_batch(inputs.iter().map(|(w, s)| (w.as_str(), s)));
        let stats = DiscrepancyChecker::statistics(&reports);

        assert_eq!(stats.total, 5);
        assert_eq!(stats.verified, 2);
        assert_eq!(stats.discrepancy, 1);
        assert_eq!(stats.manual_review, 1);
        assert_eq!(stats.missing, 1);
        assert_eq!(
            stats.verified + stats.discrepancy + stats.manual_review + stats.missing,
            stats.total
        );
    }

    #[test]
    fn test_check_resolved_matches_check() {
        let checker = DiscrepancyChecker::new(3);
        let mut resolved = BTreeMap::new();
        resolved.insert("a".to_string(), "كتب".to_string());
        resolved.insert("b".to_string(), "كتب".to_string());

        let report = checker.check_resolved("w", &resolved);
        assert_eq!(report.sources.len(), 2);
        assert_eq!(report.recommended_status, TokenStatus::Verified);
    }
}
