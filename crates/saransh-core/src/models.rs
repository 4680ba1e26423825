//! Core data models used throughout Saransh.
//!
//! These types represent the articles, chunks, and analysis records that
//! flow through the processing pipeline. They carry no behavior beyond
//! construction and (de)serialization.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Output shape of the scraping collaborator.
///
/// Saransh never scrapes on its own; it only consumes this shape.
/// `status` is `"success"` or `"failed"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedArticle {
    pub title: String,
    pub content: String,
    pub source: String,
    pub url: String,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub scraped_at: DateTime<Utc>,
    #[serde(default = "default_scrape_status")]
    pub status: String,
}

fn default_scrape_status() -> String {
    "success".to_string()
}

/// An article ready for processing.
///
/// The `id` doubles as the fingerprint that keys stored chunks and
/// embeddings. For scraped articles it is the canonical URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub content: String,
    pub source: String,
    pub url: String,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl Article {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            url: id.clone(),
            id,
            title: title.into(),
            content: content.into(),
            source: "unknown".to_string(),
            published_date: None,
            author: None,
            category: None,
        }
    }

    /// Convert a scraper result into an article.
    ///
    /// Returns `None` when the scrape did not succeed.
    pub fn from_scraped(scraped: ScrapedArticle) -> Option<Self> {
        if scraped.status != "success" {
            return None;
        }
        Some(Self {
            id: scraped.url.clone(),
            title: scraped.title,
            content: scraped.content,
            source: scraped.source,
            url: scraped.url,
            published_date: scraped.published_date,
            author: scraped.author,
            category: scraped.category,
        })
    }
}

/// A bounded slice of article text.
///
/// `start_position` and `end_position` are word offsets into the article's
/// whitespace-delimited token sequence (`end` exclusive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub chunk_index: usize,
    pub content: String,
    pub word_count: usize,
    pub start_position: usize,
    pub end_position: usize,
    /// SHA-256 of `content`, hex encoded.
    pub hash: String,
}

/// Derived metrics for a body of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub word_count: usize,
    pub sentence_count: usize,
    pub readability_score: f64,
    pub sentiment_score: f64,
    pub sentiment_label: String,
    pub entities: Vec<String>,
    pub key_topics: Vec<String>,
    /// Closed-vocabulary topic classification (AI only).
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub language: String,
    #[serde(default)]
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    pub content_type: String,
}

/// Outcome label of article processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Success,
    Fallback,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Success => "success",
            ProcessingStatus::Fallback => "fallback",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ProcessingStatus::Success),
            "fallback" => Ok(ProcessingStatus::Fallback),
            "failed" => Ok(ProcessingStatus::Failed),
            _ => Err(format!("Invalid processing status: {}", s)),
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final article-processing output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedArticle {
    pub original_article_id: String,
    pub title: String,
    pub clean_content: String,
    pub chunks: Vec<Chunk>,
    pub analysis: AnalysisRecord,
    pub processing_status: ProcessingStatus,
    /// Why the deterministic path was substituted, when it was.
    #[serde(default)]
    pub degraded_reason: Option<String>,
    /// Set when a deadline stopped further external calls.
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub vector_stored: bool,
    pub processed_at: DateTime<Utc>,
}
