//! Deterministic text analysis.
//!
//! Every metric here is a pure function of the input text: no model calls,
//! no randomness. The AI-enriched analyzer in the app crate starts from
//! [`analyze`] and overlays model-derived fields on top.
//!
//! | Metric | Definition |
//! |--------|------------|
//! | `word_count` | whitespace-delimited tokens |
//! | `sentence_count` | pieces produced by splitting on runs of `.`, `!`, `?` (minimum 1) |
//! | `readability_score` | Flesch Reading Ease; `0.0` for text without words |
//! | `sentiment_score` | (positive hits − negative hits) / words |
//! | `entities` | up to 10 unique capitalized word runs, first-seen order |
//! | `key_topics` | top 5 tokens longer than 4 chars by frequency, ties by first-seen |

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::AnalysisRecord;

const POSITIVE_WORDS: [&str; 5] = ["good", "great", "excellent", "positive", "success"];
const NEGATIVE_WORDS: [&str; 5] = ["bad", "terrible", "negative", "failure", "crash"];
const VOWELS: &str = "aeiouy";

pub const MAX_ENTITIES: usize = 10;
pub const MAX_KEY_TOPICS: usize = 5;
const MIN_TOPIC_CHARS: usize = 5;

pub const DEFAULT_LANGUAGE: &str = "English";
pub const DEFAULT_CONTENT_TYPE: &str = "news";

fn sentence_splitter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+").expect("valid sentence regex"))
}

fn entity_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*\b").expect("valid entity regex")
    })
}

/// Compute the full deterministic [`AnalysisRecord`] for `text`.
///
/// Total: never panics, including for empty or whitespace-only input.
///
/// ```rust
/// use saransh_core::analysis::analyze;
///
/// let record = analyze("");
/// assert_eq!(record.word_count, 0);
/// assert_eq!(record.sentence_count, 1);
/// assert_eq!(record.readability_score, 0.0);
/// assert_eq!(record.sentiment_score, 0.0);
/// ```
pub fn analyze(text: &str) -> AnalysisRecord {
    let sentiment_score = sentiment(text);
    AnalysisRecord {
        word_count: count_words(text),
        sentence_count: count_sentences(text),
        readability_score: readability(text),
        sentiment_score,
        sentiment_label: sentiment_label(sentiment_score).to_string(),
        entities: extract_entities(text),
        key_topics: extract_topics(text),
        categories: Vec::new(),
        summary: None,
        keywords: Vec::new(),
        language: DEFAULT_LANGUAGE.to_string(),
        quality_score: None,
        confidence_score: None,
        content_type: DEFAULT_CONTENT_TYPE.to_string(),
    }
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Number of pieces left after splitting on sentence punctuation.
///
/// Follows split semantics: empty text is one (empty) piece, and trailing
/// punctuation yields a trailing empty piece.
pub fn count_sentences(text: &str) -> usize {
    sentence_splitter().split(text).count()
}

/// Count vowel groups in a word, at least 1.
pub fn count_syllables(word: &str) -> usize {
    let mut count = 0;
    let mut on_vowel = false;
    for ch in word.to_lowercase().chars() {
        let is_vowel = VOWELS.contains(ch);
        if is_vowel && !on_vowel {
            count += 1;
        }
        on_vowel = is_vowel;
    }
    count.max(1)
}

/// Flesch Reading Ease.
///
/// Nominally 0–100, but short texts with long words go negative.
pub fn readability(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let sentences = count_sentences(text) as f64;
    let word_count = words.len() as f64;
    let syllables: usize = words.iter().map(|w| count_syllables(w)).sum();

    206.835 - 1.015 * (word_count / sentences) - 84.6 * (syllables as f64 / word_count)
}

/// Lexicon sentiment in `[-1, 1]`; `0.0` for text without words.
pub fn sentiment(text: &str) -> f64 {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let positive = words.iter().filter(|w| POSITIVE_WORDS.contains(w)).count() as f64;
    let negative = words.iter().filter(|w| NEGATIVE_WORDS.contains(w)).count() as f64;
    (positive - negative) / words.len() as f64
}

pub fn sentiment_label(score: f64) -> &'static str {
    if score > 0.0 {
        "positive"
    } else if score < 0.0 {
        "negative"
    } else {
        "neutral"
    }
}

/// Capitalized word runs, de-duplicated in first-seen order.
pub fn extract_entities(text: &str) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();
    for m in entity_pattern().find_iter(text) {
        if entities.len() == MAX_ENTITIES {
            break;
        }
        let entity = m.as_str();
        if !entities.iter().any(|e| e == entity) {
            entities.push(entity.to_string());
        }
    }
    entities
}

/// Most frequent long tokens, ties broken by first appearance.
pub fn extract_topics(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut order: Vec<(&str, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for word in lowered.split_whitespace() {
        if word.chars().count() < MIN_TOPIC_CHARS {
            continue;
        }
        match index.get(word) {
            Some(&i) => order[i].1 += 1,
            None => {
                index.insert(word, order.len());
                order.push((word, 1));
            }
        }
    }

    // stable: equal counts keep first-seen order
    order.sort_by(|a, b| b.1.cmp(&a.1));
    order
        .into_iter()
        .take(MAX_KEY_TOPICS)
        .map(|(w, _)| w.to_string())
        .collect()
}
