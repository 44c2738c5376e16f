//! Admission check for inbound messages: manual filter words and profanity.

use regex::Regex;

/// Compiled profanity patterns.
///
/// The list covers common Russian obscenity stems. It is intentionally
/// stem-based: inflected forms are caught by matching the root.
pub struct ProfanityList {
    patterns: Vec<Regex>,
}

impl ProfanityList {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self { patterns }
    }

    /// True if any profanity pattern matches the text.
    pub fn check(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }
}

impl Default for ProfanityList {
    fn default() -> Self {
        Self::new(default_profanity_patterns())
    }
}

fn default_profanity_patterns() -> Vec<Regex> {
    // Word boundaries matter: substrings like "блят" occur in clean words
    // ("употреблять"), so verb stems carry an explicit prefix alternation.
    vec![
        r"(?i)\bху[йяеё]",
        r"(?i)пизд",
        r"(?i)\b(?:на|за|по|до|про|раз|вы|от|с|у)?[её]б(?:ал|ан|ат|ут|ну|ись|л[аио])",
        r"(?i)\bбля(?:[дт][ьи]?)?\b",
        r"(?i)\bмуда[кцч]",
        r"(?i)\bсук[аи]\b",
        r"(?i)г[ао]ндон",
        r"(?i)долбо[её]б",
        r"(?i)\bпид[ао]р",
        r"(?i)залуп",
    ]
    .into_iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
}

/// Returns true when the message must not be relayed: either a filter word
/// occurs case-insensitively in the text, or the profanity list matches the
/// original (pre-redaction) text.
///
/// Messages with no text (pure media with an empty caption) pass trivially.
pub fn should_drop(text: &str, filters: &[String], profanity: &ProfanityList) -> bool {
    if text.is_empty() {
        return false;
    }
    let lowered = text.to_lowercase();
    if filters
        .iter()
        .any(|w| !w.is_empty() && lowered.contains(&w.to_lowercase()))
    {
        return true;
    }
    profanity.check(text)
}
