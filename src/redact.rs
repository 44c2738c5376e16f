//! Text redaction: strips phone numbers, address fragments and filter words
//! from a message before it is relayed.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

/// Best-effort phone pattern: optional country code, then three digit groups
/// separated by spaces/dots/dashes/parentheses. Not a validated phone parser.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?\d{1,3})?[ .-]?\(?\d{3}\)?[ .-]?\d{3}[ .-]?\d{2}[ .-]?\d{2}").unwrap()
});

/// Address fragment: a street/building keyword up to the next sentence boundary.
static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(ул\.|улица|проспект|пр-т|пер\.|переулок|г\.|город|д\.|дом)[^\n,.!?]*")
        .unwrap()
});

/// Removes phone numbers, address fragments and all case-insensitive
/// occurrences of each filter word, then trims the result.
///
/// Filter words are matched as literal substrings (escaped before compiling),
/// so words containing regex metacharacters behave predictably.
pub fn clean(text: &str, filters: &[String]) -> String {
    let mut out = PHONE_RE.replace_all(text, "").into_owned();
    out = ADDRESS_RE.replace_all(&out, "").into_owned();

    for word in filters {
        if word.is_empty() {
            continue;
        }
        // Escaped patterns always compile; skip on the impossible failure.
        if let Ok(re) = RegexBuilder::new(&regex::escape(word))
            .case_insensitive(true)
            .build()
        {
            out = re.replace_all(&out, "").into_owned();
        }
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_removes_phone_number() {
        let out = clean("Звоните +7 912 345 67 89 срочно", &filters(&["срочно"]));
        assert!(!out.contains("912"));
        assert!(!out.contains("срочно"));
        assert!(out.contains("Звоните"));
    }

    #[test]
    fn test_removes_phone_with_parentheses() {
        let out = clean("тел. 8 (495) 123-45-67, пишите", &[]);
        assert!(!out.contains("495"));
        assert!(!out.contains("123"));
    }

    #[test]
    fn test_removes_address_fragment() {
        let out = clean("Продам диван. улица Ленина 5, самовывоз", &[]);
        assert!(!out.contains("Ленина"));
        assert!(out.contains("Продам диван"));
        assert!(out.contains("самовывоз"));
    }

    #[test]
    fn test_address_stops_at_sentence_boundary() {
        let out = clean("Адрес: г. Москва, метро рядом", &[]);
        assert!(!out.contains("Москва"));
        assert!(out.contains("метро рядом"));
    }

    #[test]
    fn test_removes_filter_words_case_insensitive() {
        let out = clean("Отдам даром, ТОРГ уместен", &filters(&["торг"]));
        assert!(!out.to_lowercase().contains("торг"));
        assert!(out.contains("Отдам даром"));
    }

    #[test]
    fn test_filter_word_with_metacharacters_is_literal() {
        // "c++" must not be treated as a regex
        let out = clean("учу c++ недорого", &filters(&["c++"]));
        assert!(!out.contains("c++"));
        assert!(out.contains("учу"));
    }

    #[test]
    fn test_no_filter_word_survives() {
        let words = filters(&["цена", "срочно", "без посредников"]);
        let out = clean("СРОЧНО продам, Цена договорная, без посредников!", &words);
        let lowered = out.to_lowercase();
        for w in &words {
            assert!(!lowered.contains(w.as_str()), "{w} survived in {out:?}");
        }
    }

    #[test]
    fn test_trims_result() {
        let out = clean("  привет  ", &[]);
        assert_eq!(out, "привет");
    }

    #[test]
    fn test_clean_text_untouched() {
        let out = clean("Обычное объявление без контактов", &filters(&["торг"]));
        assert_eq!(out, "Обычное объявление без контактов");
    }
}
