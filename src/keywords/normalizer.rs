use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::inflect::depluralize;
use super::vocabulary::{DEFAULT_BANNED_WORDS, is_and_exception};

static HYPHENATED_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+-\w+$").expect("valid hyphen regex"));
static LEADING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{3,}").expect("valid digit regex"));

/// Switches controlling which normalization rules apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Master switch; when off keywords are only trimmed.
    pub normalize_keywords: bool,
    pub depluralize_keywords: bool,
    pub limit_word_count: bool,
    pub max_words_per_keyword: usize,
    /// Collapse "A and B" / "A or B" into "A B".
    pub split_and_entries: bool,
    pub ban_prompt_words: bool,
    /// Reject keywords whose first word starts with three or more digits.
    pub no_digits_start: bool,
    pub min_word_length: bool,
    pub latin_only: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            normalize_keywords: true,
            depluralize_keywords: true,
            limit_word_count: true,
            max_words_per_keyword: 2,
            split_and_entries: true,
            ban_prompt_words: true,
            no_digits_start: true,
            min_word_length: true,
            latin_only: true,
        }
    }
}

/// Post-processing layer turning free-form model keywords into a consistent
/// vocabulary.
///
/// Output is lowercase, space-separated words with at most one internal
/// hyphen per token. Keywords that cannot be brought into that shape are
/// rejected rather than repaired.
///
/// # Examples
///
/// ```
/// use phototag::keywords::KeywordNormalizer;
///
/// let normalizer = KeywordNormalizer::default();
/// assert_eq!(normalizer.normalize("BlueSky").as_deref(), Some("blue sky"));
/// assert_eq!(normalizer.normalize("cats and dogs").as_deref(), Some("cat dog"));
/// assert_eq!(normalizer.normalize("123abc widget"), None);
/// ```
#[derive(Debug, Clone)]
pub struct KeywordNormalizer {
    config: NormalizerConfig,
    banned_words: HashSet<String>,
}

impl Default for KeywordNormalizer {
    fn default() -> Self {
        Self::new(NormalizerConfig::default())
    }
}

impl KeywordNormalizer {
    /// Creates a normalizer with the default banned-word list.
    pub fn new(config: NormalizerConfig) -> Self {
        Self::with_banned_words(config, DEFAULT_BANNED_WORDS.iter().copied())
    }

    /// Creates a normalizer with a custom banned-word list.
    pub fn with_banned_words<I, S>(config: NormalizerConfig, banned_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            config,
            banned_words: banned_words.into_iter().map(Into::into).collect(),
        }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Normalizes one keyword, returning `None` when it is rejected.
    #[must_use]
    pub fn normalize(&self, raw: &str) -> Option<String> {
        normalize_keyword(raw, &self.banned_words, &self.config)
    }

    /// Normalizes a collection of keywords into a deduplicated set.
    ///
    /// Rejected keywords are dropped. Two inputs that normalize to the same
    /// string produce one entry.
    #[must_use]
    pub fn normalize_all<I, S>(&self, raw: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter()
            .filter_map(|keyword| self.normalize(keyword.as_ref()))
            .collect()
    }
}

/// Normalizes a single keyword against a banned-word set and configuration.
///
/// Rules, in order:
///
/// 1. Words longer than four characters are split at their first uppercase
///    letter from the fifth character on (`BlueSky` -> `Blue Sky`)
/// 2. Lowercase; optionally drop non-ASCII
/// 3. Strip everything but letters, digits, whitespace, hyphens and
///    underscores, collapse whitespace and hyphen runs, turn underscores into
///    spaces
/// 4. A hyphenated token must be exactly `word-word`; its halves count as two
///    words but the hyphenated form is kept
/// 5. Reject when the word count exceeds `max_words_per_keyword + 1`
/// 6. A three-word `A and B` / `A or B` phrase becomes `A B` unless it is an
///    allow-listed phrase
/// 7. Reject short words (except `x` and `u`), banned words, and a first word
///    starting with three or more digits
/// 8. Singularize the sole word, or the last token of a multi-word keyword
pub fn normalize_keyword(
    raw: &str,
    banned_words: &HashSet<String>,
    config: &NormalizerConfig,
) -> Option<String> {
    if !config.normalize_keywords {
        let trimmed = raw.trim();
        return (!trimmed.is_empty()).then(|| trimmed.to_string());
    }

    let split = raw
        .split_whitespace()
        .map(split_on_internal_capital)
        .collect::<Vec<_>>()
        .join(" ");

    let mut phrase = split.to_lowercase().trim().to_string();

    if config.latin_only {
        phrase.retain(|c| c.is_ascii());
    }

    phrase.retain(|c| c.is_alphanumeric() || c == '_' || c == '-' || c.is_whitespace());
    let phrase = collapse_separators(&phrase);

    let mut tokens: Vec<String> = phrase.split_whitespace().map(str::to_string).collect();
    let mut words: Vec<String> = Vec::with_capacity(tokens.len());

    for token in &tokens {
        if token.contains('-') {
            if !HYPHENATED_TOKEN.is_match(token) {
                return None;
            }
            words.extend(token.split('-').map(str::to_string));
        } else {
            words.push(token.clone());
        }
    }

    if words.is_empty() {
        return None;
    }

    if config.limit_word_count && words.len() > config.max_words_per_keyword + 1 {
        return None;
    }

    if config.split_and_entries
        && words.len() == 3
        && (words[1] == "and" || words[1] == "or")
        && !is_and_exception(&words.join(" "))
    {
        tokens = if config.depluralize_keywords {
            vec![depluralize(&words[0]), depluralize(&words[2])]
        } else {
            vec![words[0].clone(), words[2].clone()]
        };
    }

    for word in &words {
        if config.min_word_length && word.chars().count() < 2 && word != "x" && word != "u" {
            return None;
        }
        if config.ban_prompt_words && banned_words.contains(word) {
            return None;
        }
    }

    if config.no_digits_start && LEADING_DIGITS.is_match(&words[0]) {
        return None;
    }

    if config.depluralize_keywords {
        if words.len() == 1 {
            tokens = vec![depluralize(&words[0])];
        } else if tokens.len() > 1
            && let Some(last) = tokens.last_mut()
        {
            let singular = depluralize(last);
            *last = singular;
        }
    }

    Some(tokens.join(" "))
}

/// Splits a word at its first uppercase character at index four or later.
fn split_on_internal_capital(word: &str) -> String {
    let chars: Vec<char> = word.chars().collect();
    if chars.len() <= 4 {
        return word.to_string();
    }

    match chars.iter().skip(4).position(|c| c.is_uppercase()) {
        Some(offset) => {
            let at = offset + 4;
            let head: String = chars[..at].iter().collect();
            let tail: String = chars[at..].iter().collect();
            format!("{head} {tail}")
        }
        None => word.to_string(),
    }
}

/// Collapses whitespace runs to one space and hyphen runs to one hyphen, then
/// turns underscores into spaces.
fn collapse_separators(phrase: &str) -> String {
    let mut out = String::with_capacity(phrase.len());
    let mut prev: Option<char> = None;

    for c in phrase.chars() {
        let c = if c.is_whitespace() { ' ' } else { c };
        if (c == ' ' || c == '-') && prev == Some(c) {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }

    out.replace('_', " ")
}
