use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "aren", "as", "at", "be", "because", "been", "before", "being", "below", "between",
    "both", "but", "by", "can", "could", "did", "didn", "do", "does", "doesn", "doing", "don",
    "down", "during", "each", "even", "few", "for", "from", "further", "get", "had", "has",
    "have", "having", "he", "her", "here", "hers", "herself", "him", "himself", "his", "how",
    "i", "if", "in", "into", "is", "isn", "it", "its", "itself", "just", "let", "like", "may",
    "me", "might", "more", "most", "much", "must", "my", "myself", "need", "no", "nor", "not",
    "now", "of", "off", "on", "once", "one", "only", "or", "other", "our", "ours", "ourselves",
    "out", "over", "own", "same", "she", "should", "so", "some", "such", "than", "that", "the",
    "their", "theirs", "them", "themselves", "then", "there", "these", "they", "this", "those",
    "through", "to", "too", "under", "until", "up", "us", "very", "was", "wasn", "we", "were",
    "weren", "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with",
    "would", "you", "your", "yours", "yourself", "yourselves",
];

fn html_tag() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid markup regex"))
}

fn mention_pattern() -> &'static Regex {
    static MENTION: OnceLock<Regex> = OnceLock::new();
    MENTION.get_or_init(|| {
        Regex::new(r"@([A-Za-z0-9_][A-Za-z0-9_.\-]*)").expect("valid mention regex")
    })
}

/// Lowercases, strips markup and punctuation, drops stop words and short tokens.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    min_len: usize,
    stop_words: HashSet<String>,
}

impl Tokenizer {
    pub fn new(min_len: usize, extra_stop_words: &[String]) -> Self {
        let stop_words = ENGLISH_STOP_WORDS
            .iter()
            .map(|w| w.to_string())
            .chain(extra_stop_words.iter().map(|w| w.trim().to_lowercase()))
            .collect();
        Self {
            min_len,
            stop_words,
        }
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let without_markup = html_tag().replace_all(text, " ");
        let normalized: String = without_markup
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
            .collect();

        normalized
            .split_whitespace()
            .filter(|token| token.chars().count() >= self.min_len)
            .filter(|token| !self.stop_words.contains(*token))
            .map(str::to_string)
            .collect()
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }
}

/// `@handle` references, lowercased, in order of appearance.
pub fn extract_mentions(text: &str) -> Vec<String> {
    mention_pattern()
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches(['.', '-']).to_lowercase())
        .filter(|handle| !handle.is_empty())
        .collect()
}
