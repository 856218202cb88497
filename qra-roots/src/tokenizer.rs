//! Verse text tokenization
//!
//! Input files carry one verse per line, either `container|verse|text` or
//! `container:verse text`. Lines starting with `#` and blank lines are
//! skipped; malformed lines are logged and skipped.

use crate::arabic::normalize;
use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// One verse of source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerseText {
    pub container: i64,
    pub verse: i64,
    pub text: String,
}

/// One word of a verse, ready to insert as a token row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordToken {
    pub container: i64,
    pub verse: i64,
    /// Index of the word in the whitespace split of the verse
    pub position: i64,
    pub text_ar: String,
    pub normalized: String,
}

/// Split a verse into word tokens
///
/// Positions are the original word indices, so a word that normalizes to
/// nothing leaves a gap rather than shifting later positions.
pub fn tokenize_verse(text: &str, container: i64, verse: i64) -> Vec<WordToken> {
    text.split_whitespace()
        .enumerate()
        .filter_map(|(position, word)| {
            let normalized = normalize(word);
            if normalized.is_empty() {
                return None;
            }
            Some(WordToken {
                container,
                verse,
                position: position as i64,
                text_ar: word.to_string(),
                normalized,
            })
        })
        .collect()
}

fn parse_number(field: &str, line: &str) -> PipelineResult<i64> {
    field
        .trim()
        .parse::<i64>()
        .map_err(|_| PipelineError::Config(format!("invalid verse reference in line: {}", line)))
}

/// Parse one line of a verse text file
///
/// `Ok(None)` for comments and blank lines.
pub fn parse_line(line: &str) -> PipelineResult<Option<VerseText>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    if line.contains('|') {
        let mut parts = line.splitn(3, '|');
        let (Some(container), Some(verse), Some(text)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(PipelineError::Config(format!("expected container|verse|text: {}", line)));
        };
        return Ok(Some(VerseText {
            container: parse_number(container, line)?,
            verse: parse_number(verse, line)?,
            text: text.trim().to_string(),
        }));
    }

    let Some((reference, text)) = line.split_once(char::is_whitespace) else {
        return Err(PipelineError::Config(format!("expected container:verse text: {}", line)));
    };
    let Some((container, verse)) = reference.split_once(':') else {
        return Err(PipelineError::Config(format!("expected container:verse text: {}", line)));
    };

    Ok(Some(VerseText {
        container: parse_number(container, line)?,
        verse: parse_number(verse, line)?,
        text: text.trim().to_string(),
    }))
}

/// Parse every verse in `content`, skipping malformed lines
pub fn parse_verses(content: &str) -> Vec<VerseText> {
    content
        .lines()
        .enumerate()
        .filter_map(|(index, line)| match parse_line(line) {
            Ok(verse) => verse,
            Err(e) => {
                warn!(line = index + 1, error = %e, "Skipping malformed verse line");
                None
            }
        })
        .collect()
}

/// Read the verses of one container from a text file, ordered by verse
pub async fn load_container_verses(path: &Path, container: i64) -> PipelineResult<Vec<VerseText>> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        PipelineError::Config(format!("cannot read verse file {}: {}", path.display(), e))
    })?;

    let mut verses: Vec<VerseText> = parse_verses(&content)
        .into_iter()
        .filter(|v| v.container == container)
        .collect();
    verses.sort_by_key(|v| v.verse);
    verses.dedup_by_key(|v| v.verse);

    debug!(path = %path.display(), container, verses = verses.len(), "Loaded verses");
    Ok(verses)
}

/// Tokenize every verse in `content`
pub fn tokenize_str(content: &str) -> Vec<WordToken> {
    parse_verses(content)
        .iter()
        .flat_map(|v| tokenize_verse(&v.text, v.container, v.verse))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tokenize_verse_normalizes_and_keeps_positions() {
        let tokens = tokenize_verse("بِسْمِ ٱللَّهِ ٱلرَّحْمَـٰنِ ٱلرَّحِيمِ", 1, 1);

        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].normalized, "بسم");
        assert_eq!(tokens[1].normalized, "الله");
        assert_eq!(tokens[3].normalized, "الرحيم");
        assert_eq!(
            tokens.iter().map(|t| t.position).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert_eq!(tokens[0].text_ar, "بِسْمِ");
    }

    #[test]
    fn test_punctuation_only_words_leave_gaps() {
        let tokens = tokenize_verse("ذَٰلِكَ ۞ ٱلْكِتَٰبُ", 2, 2);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].position, 0);
        assert_eq!(tokens[1].position, 2);
        assert_eq!(tokens[1].normalized, "الكتب");
    }

    #[test]
    fn test_parse_line_formats() {
        let piped = parse_line("2|2|ذَٰلِكَ ٱلْكِتَٰبُ").unwrap().unwrap();
        assert_eq!((piped.container, piped.verse), (2, 2));
        assert_eq!(piped.text, "ذَٰلِكَ ٱلْكِتَٰبُ");

        let colon = parse_line("112:1 قُلْ هُوَ ٱللَّهُ أَحَدٌ").unwrap().unwrap();
        assert_eq!((colon.container, colon.verse), (112, 1));
        assert_eq!(colon.text, "قُلْ هُوَ ٱللَّهُ أَحَدٌ");

        assert_eq!(parse_line("# header").unwrap(), None);
        assert_eq!(parse_line("   ").unwrap(), None);
        assert!(parse_line("x|1|text").is_err());
        assert!(parse_line("nonsense").is_err());
    }

    #[test]
    fn test_tokenize_str_skips_bad_lines() {
        let content = "# sample\n1|1|بِسْمِ ٱللَّهِ\nbroken line\n\n1:2 ٱلْحَمْدُ لِلَّهِ\n";
        let tokens = tokenize_str(content);
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[2].verse, 2);
        assert_eq!(tokens[2].normalized, "الحمد");
    }

    #[tokio::test]
    async fn test_load_container_verses_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("text.txt");
        std::fs::write(&path, "1|2|b\n2|1|x\n1|1|a\n1|2|dup\n").unwrap();

        let verses = load_container_verses(&path, 1).await.unwrap();
        assert_eq!(verses.iter().map(|v| v.verse).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(verses[0].text, "a");

        assert!(load_container_verses(&dir.path().join("missing.txt"), 1).await.is_err());
    }
}
