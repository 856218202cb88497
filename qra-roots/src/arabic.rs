//! Arabic text helpers shared by the tokenizer and the stemmers

/// Tatweel (kashida) elongation mark
const TATWEEL: char = '\u{0640}';

/// Quranic punctuation and verse markers removed during normalization
const QURANIC_PUNCTUATION: [char; 7] = ['۝', '۞', '﴿', '﴾', '،', '؛', '؟'];

/// Weak letters (alef, waw, ya, hamza, alef maksura)
pub const WEAK_LETTERS: [char; 5] = ['ا', 'و', 'ي', 'ء', 'ى'];

pub fn is_weak(c: char) -> bool {
    WEAK_LETTERS.contains(&c)
}

/// Harakat: fathatan through sukun
fn is_tashkeel(c: char) -> bool {
    ('\u{064B}'..='\u{0652}').contains(&c)
}

/// Full diacritic range removed by normalization (harakat, Quranic annotation marks)
fn is_diacritic(c: char) -> bool {
    matches!(c,
        '\u{064B}'..='\u{065F}'
        | '\u{0670}'
        | '\u{06D6}'..='\u{06DC}'
        | '\u{06DF}'..='\u{06ED}'
        | '\u{08D4}'..='\u{08ED}'
        | '\u{FE70}'..='\u{FE7F}')
}

/// Remove harakat only
pub fn strip_tashkeel(text: &str) -> String {
    text.chars().filter(|c| !is_tashkeel(*c)).collect()
}

/// Remove tatweel only
pub fn strip_tatweel(text: &str) -> String {
    text.chars().filter(|c| *c != TATWEEL).collect()
}

/// Stemmer input cleaning: tatweel then tashkeel
pub fn clean_word(word: &str) -> String {
    strip_tashkeel(&strip_tatweel(word))
}

/// Tokenizer normalization
///
/// Removes diacritics and Quranic punctuation, unifies alef variants to
/// bare alef, alef maksura to ya and ta marbuta to ha, then collapses
/// whitespace.
pub fn normalize(text: &str) -> String {
    let mapped: String = text
        .chars()
        .filter(|c| !is_diacritic(*c) && !QURANIC_PUNCTUATION.contains(c))
        .map(|c| match c {
            'ٱ' | 'أ' | 'إ' | 'آ' => 'ا',
            'ى' => 'ي',
            'ة' => 'ه',
            other => other,
        })
        .collect();

    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True if every character is in the Arabic block (U+0600-U+06FF)
pub fn is_arabic_letters(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| ('\u{0600}'..='\u{06FF}').contains(&c))
}

/// Strip the first matching prefix, keeping more than two letters of stem
///
/// `affixes` is checked in order; only one prefix is removed.
pub fn strip_prefix(stem: &[char], affixes: &[&str]) -> (Vec<char>, Option<usize>) {
    for (index, affix) in affixes.iter().enumerate() {
        let affix: Vec<char> = affix.chars().collect();
        if stem.starts_with(&affix) && stem.len() > affix.len() + 2 {
            return (stem[affix.len()..].to_vec(), Some(index));
        }
    }
    (stem.to_vec(), None)
}

/// Strip the first matching suffix under the same length rule as [`strip_prefix`]
pub fn strip_suffix(stem: &[char], affixes: &[&str]) -> Vec<char> {
    for affix in affixes {
        let affix: Vec<char> = affix.chars().collect();
        if stem.ends_with(&affix) && stem.len() > affix.len() + 2 {
            return stem[..stem.len() - affix.len()].to_vec();
        }
    }
    stem.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_removes_diacritics() {
        assert_eq!(normalize("بِسْمِ"), "بسم");
        assert_eq!(normalize("ٱللَّهِ"), "الله");
    }

    #[test]
    fn test_normalize_unifies_letter_forms() {
        assert_eq!(normalize("أحمد"), "احمد");
        assert_eq!(normalize("إيمان"), "ايمان");
        assert_eq!(normalize("آمن"), "امن");
        assert_eq!(normalize("موسى"), "موسي");
        assert_eq!(normalize("رحمة"), "رحمه");
    }

    #[test]
    fn test_normalize_strips_punctuation_and_whitespace() {
        assert_eq!(normalize("  ﴿ الحمد ،  لله ﴾ "), "الحمد لله");
        assert_eq!(normalize("۞"), "");
    }

    #[test]
    fn test_clean_word_keeps_letter_forms() {
        assert_eq!(clean_word("كِتَـــابٌ"), "كتاب");
        assert_eq!(clean_word("رحمة"), "رحمة");
    }

    #[test]
    fn test_affix_stripping_respects_length() {
        let word: Vec<char> = "والكتاب".chars().collect();
        let (stem, prefix) = strip_prefix(&word, &["وال", "ال", "و"]);
        assert_eq!(stem.iter().collect::<String>(), "كتاب");
        assert_eq!(prefix, Some(0));

        // Removing "ال" from "الله" would leave two letters
        let short: Vec<char> = "الله".chars().collect();
        let (stem, prefix) = strip_prefix(&short, &["ال"]);
        assert_eq!(stem.len(), 4);
        assert!(prefix.is_none());

        let word: Vec<char> = "مسلمون".chars().collect();
        assert_eq!(strip_suffix(&word, &["ون"]).iter().collect::<String>(), "مسلم");
    }

    #[test]
    fn test_is_arabic_letters() {
        assert!(is_arabic_letters("كتب"));
        assert!(!is_arabic_letters("ktb"));
        assert!(!is_arabic_letters(""));
    }
}
