//! TOML configuration.
//!
//! Every section and field carries a serde default, so an empty file (or no
//! file at all) yields a working configuration with AI calls disabled.
//! [`load_config`] parses and then runs [`Config::validate`]; bound
//! violations are startup faults.
//!
//! ```toml
//! [llm]
//! provider = "openai"
//! model = "gpt-3.5-turbo"
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 1000
//!
//! [chunking]
//! strategy = "semantic"
//! max_words = 300
//! overlap_words = 50
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::agents::DEFAULT_PIPELINE;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub chunking: ChunkingConfig,
    pub analysis: AnalysisConfig,
    pub store: StoreConfig,
    pub agents: AgentsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_tokens_limit")]
    pub max_tokens_limit: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            max_tokens: default_max_tokens(),
            max_tokens_limit: default_max_tokens_limit(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_max_tokens_limit() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    30
}

/// Retry schedule for external calls. Delays are in milliseconds.
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Wait applied on rate limiting when the server suggests none.
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_rate_limit_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    Fixed,
    #[default]
    Semantic,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub strategy: ChunkStrategy,
    #[serde(default = "default_max_words")]
    pub max_words: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::default(),
            max_words: default_max_words(),
            overlap_words: default_overlap_words(),
        }
    }
}

fn default_max_words() -> usize {
    300
}
fn default_overlap_words() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_true")]
    pub ai_enrichment: bool,
    #[serde(default = "default_summary_words")]
    pub summary_words: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            ai_enrichment: true,
            summary_words: default_summary_words(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_summary_words() -> usize {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collection: default_collection(),
        }
    }
}

fn default_collection() -> String {
    "news_articles".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentsConfig {
    #[serde(default = "default_pipeline")]
    pub default_pipeline: Vec<String>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            default_pipeline: default_pipeline(),
        }
    }
}

fn default_pipeline() -> Vec<String> {
    DEFAULT_PIPELINE.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Enforce cross-field bounds.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_words == 0 {
            bail!("chunking.max_words must be > 0");
        }
        if self.chunking.overlap_words >= self.chunking.max_words {
            bail!(
                "chunking.overlap_words ({}) must be smaller than chunking.max_words ({})",
                self.chunking.overlap_words,
                self.chunking.max_words
            );
        }

        if self.retry.max_retries < 1 {
            bail!("retry.max_retries must be >= 1");
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            bail!("retry.max_delay_ms must be >= retry.base_delay_ms");
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!("llm.temperature must be in [0.0, 2.0]");
        }
        if self.llm.max_tokens == 0 || self.llm.max_tokens > self.llm.max_tokens_limit {
            bail!(
                "llm.max_tokens must be in 1..={} (llm.max_tokens_limit)",
                self.llm.max_tokens_limit
            );
        }
        match self.llm.provider.as_str() {
            "disabled" | "openai" => {}
            other => bail!(
                "Unknown llm provider: '{}'. Must be disabled or openai.",
                other
            ),
        }

        if self.analysis.summary_words == 0 {
            bail!("analysis.summary_words must be > 0");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
