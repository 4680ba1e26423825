//! AI-enriched content analysis.
//!
//! [`AiAnalyzer`] starts from the deterministic record produced by
//! [`saransh_core::analysis::analyze`] and overlays one model-derived field
//! per prompt, in this order:
//!
//! | Field | Prompt answer | Default on failure |
//! |-------|---------------|--------------------|
//! | `sentiment_score`, `sentiment_label`, `confidence_score` | `{score, label, confidence}` | `0.0`, `"neutral"`, absent |
//! | `entities` | JSON array of names | empty list |
//! | `categories` | up to 3 labels from [`TOPIC_VOCABULARY`] | empty list |
//! | `summary` | text, truncated to `analysis.summary_words` | absent |
//! | `keywords` | JSON array, capped at 10 | empty list |
//! | `language` | language name | `"English"` |
//! | `quality_score` | 0–10, rescaled to 0–1 | `0.5` |
//!
//! A malformed answer or a request that stays rate limited or transient
//! after retries only costs that one field. A [`RequestFailure::Fatal`]
//! aborts the enrichment so the caller can fall back to the deterministic
//! path.

use std::collections::HashSet;

use saransh_core::analysis::{self, DEFAULT_LANGUAGE};
use saransh_core::models::AnalysisRecord;
use saransh_core::parse::{
    parse_language, parse_quality, parse_sentiment, parse_string_list, parse_text, ParseFailure,
    DEFAULT_QUALITY_SCORE, DEFAULT_SENTIMENT_LABEL, DEFAULT_SENTIMENT_SCORE,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::client::{RequestFailure, ResilientClient};
use crate::config::AnalysisConfig;
use crate::deadline::{expired, Deadline};

/// Closed vocabulary for topic classification.
pub const TOPIC_VOCABULARY: [&str; 10] = [
    "politics",
    "business",
    "technology",
    "sports",
    "entertainment",
    "health",
    "science",
    "world",
    "environment",
    "education",
];

pub const MAX_CATEGORIES: usize = 3;
pub const MAX_KEYWORDS: usize = 10;

/// Article text beyond this many characters is not sent to the model.
const MAX_PROMPT_CHARS: usize = 12_000;

const ANALYST_PROMPT: &str =
    "You are a news analyst. Answer with the requested JSON only, no commentary.";

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("AI analysis aborted: {0}")]
    Request(#[from] RequestFailure),
}

/// Result of an enrichment pass.
#[derive(Debug, Clone)]
pub struct EnrichedAnalysis {
    pub record: AnalysisRecord,
    /// AI fields that fell back to their defaults.
    pub degraded_fields: Vec<&'static str>,
    /// The deadline passed before every field was requested; skipped
    /// fields keep their deterministic values.
    pub cancelled: bool,
}

pub struct AiAnalyzer {
    client: ResilientClient,
    config: AnalysisConfig,
}

impl AiAnalyzer {
    pub fn new(client: ResilientClient, config: AnalysisConfig) -> Self {
        Self { client, config }
    }

    /// Analyze `text` without a deadline.
    pub async fn analyze(&self, text: &str) -> Result<AnalysisRecord, AnalysisError> {
        Ok(self.analyze_within(text, None).await?.record)
    }

    /// Analyze `text`, issuing no further prompts once `deadline` passes.
    pub async fn analyze_within(
        &self,
        text: &str,
        deadline: Option<Deadline>,
    ) -> Result<EnrichedAnalysis, AnalysisError> {
        let mut enriched = EnrichedAnalysis {
            record: analysis::analyze(text),
            degraded_fields: Vec::new(),
            cancelled: false,
        };
        if !self.config.ai_enrichment || enriched.record.word_count == 0 {
            return Ok(enriched);
        }

        let excerpt = excerpt(text);
        let client = self.client.within(deadline);

        macro_rules! step {
            ($name:literal, $prompt:expr, $parse:expr) => {{
                if expired(deadline) {
                    enriched.cancelled = true;
                    return Ok(enriched);
                }
                let value = field(&client, $name, &$prompt, $parse).await?;
                if value.is_none() {
                    enriched.degraded_fields.push($name);
                }
                value
            }};
        }

        let sentiment = step!("sentiment", sentiment_prompt(&excerpt), parse_sentiment);
        let record = &mut enriched.record;
        match sentiment {
            Some(reading) => {
                record.sentiment_score = reading.score;
                record.sentiment_label = reading.label;
                record.confidence_score = Some(reading.confidence);
            }
            None => {
                record.sentiment_score = DEFAULT_SENTIMENT_SCORE;
                record.sentiment_label = DEFAULT_SENTIMENT_LABEL.to_string();
            }
        }

        let entities = step!("entities", entities_prompt(&excerpt), |raw: &str| {
            parse_string_list(raw, "entities")
        });
        enriched.record.entities = entities
            .map(|list| dedup_capped(list, analysis::MAX_ENTITIES))
            .unwrap_or_default();

        let categories = step!("categories", categories_prompt(&excerpt), |raw: &str| {
            parse_string_list(raw, "categories")
        });
        enriched.record.categories = categories.map(restrict_to_vocabulary).unwrap_or_default();

        let summary = step!("summary", summary_prompt(&excerpt, self.config.summary_words), |raw: &str| {
            parse_text(raw, "summary")
        });
        enriched.record.summary = summary.map(|s| truncate_words(&s, self.config.summary_words));

        let keywords = step!("keywords", keywords_prompt(&excerpt), |raw: &str| {
            parse_string_list(raw, "keywords")
        });
        enriched.record.keywords = keywords
            .map(|list| dedup_capped(list, MAX_KEYWORDS))
            .unwrap_or_default();

        let language = step!("language", language_prompt(&excerpt), parse_language);
        enriched.record.language = language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        let quality = step!("quality", quality_prompt(&excerpt), parse_quality);
        enriched.record.quality_score = Some(quality.unwrap_or(DEFAULT_QUALITY_SCORE));

        debug!(
            degraded = enriched.degraded_fields.len(),
            "AI analysis complete"
        );
        Ok(enriched)
    }
}

/// Request and parse one field. `Ok(None)` means "use the default".
async fn field<T>(
    client: &ResilientClient,
    name: &'static str,
    prompt: &str,
    parse: impl FnOnce(&str) -> Result<T, ParseFailure>,
) -> Result<Option<T>, AnalysisError> {
    match client.ask(ANALYST_PROMPT, prompt).await {
        Ok(raw) => match parse(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(field = name, error = %e, "unparseable model answer, using default");
                Ok(None)
            }
        },
        Err(e @ RequestFailure::Fatal(_)) => Err(e.into()),
        Err(e) => {
            warn!(field = name, error = %e, "field request failed, using default");
            Ok(None)
        }
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(MAX_PROMPT_CHARS).collect()
}

fn sentiment_prompt(text: &str) -> String {
    format!(
        "Analyze the sentiment of this news article.\n\
         Return JSON: {{\"score\": <number from -1 to 1>, \"label\": \"positive|negative|neutral\", \"confidence\": <number from 0 to 1>}}\n\n\
         Article: {}",
        text
    )
}

fn entities_prompt(text: &str) -> String {
    format!(
        "Extract the named entities (people, organizations, places) from this news article.\n\
         Return a JSON array of strings.\n\nArticle: {}",
        text
    )
}

fn categories_prompt(text: &str) -> String {
    format!(
        "Classify this news article into at most {} of these topics: {}.\n\
         Return a JSON array of topic names, most relevant first.\n\nArticle: {}",
        MAX_CATEGORIES,
        TOPIC_VOCABULARY.join(", "),
        text
    )
}

fn summary_prompt(text: &str, words: usize) -> String {
    format!(
        "Summarize this news article in at most {} words.\n\
         Return JSON: {{\"summary\": \"...\"}}\n\nArticle: {}",
        words, text
    )
}

fn keywords_prompt(text: &str) -> String {
    format!(
        "List the {} most important keywords of this news article.\n\
         Return a JSON array of strings.\n\nArticle: {}",
        MAX_KEYWORDS, text
    )
}

fn language_prompt(text: &str) -> String {
    format!(
        "Which language is this article written in? Return JSON: {{\"language\": \"<name>\"}}\n\nArticle: {}",
        text
    )
}

fn quality_prompt(text: &str) -> String {
    format!(
        "Rate the journalistic quality of this news article from 0 to 10.\n\
         Return JSON: {{\"quality_score\": <number>}}\n\nArticle: {}",
        text
    )
}

fn dedup_capped(items: Vec<String>, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.to_lowercase()))
        .take(cap)
        .collect()
}

fn restrict_to_vocabulary(labels: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in labels {
        let label = label.trim().to_lowercase();
        if TOPIC_VOCABULARY.contains(&label.as_str()) && !out.contains(&label) {
            out.push(label);
        }
        if out.len() == MAX_CATEGORIES {
            break;
        }
    }
    out
}

fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}
