//! Multi-stage agent orchestration.
//!
//! A stage is a named unit that reads an evolving JSON context and returns
//! a structured payload. [`AgentOrchestrator::run_stages`] runs stages
//! strictly in the requested order and, after each one, writes its payload
//! to `context["<name>_result"]` so later stages can build on it.
//!
//! A failing stage never stops the run. Its [`StageResult`] carries a
//! [`StageFailure`], its context slot holds `{"error": "..."}`, and the
//! next stage starts as usual.
//!
//! # Built-in Stages
//!
//! | Name | Reads | Payload key |
//! |------|-------|-------------|
//! | `curation` | `article_data`, `user_preferences` | `curation_result` |
//! | `summarization` | `article_content`, `article_metadata` | `summary_result` |
//! | `fact_checking` | `article_content`, `article_sources` | `fact_check_result` |
//! | `trend_analysis` | `current_article`, `recent_articles` | `trend_analysis_result` |
//!
//! All four are served by [`PromptStage`]. Custom stages implement
//! [`Stage`] and are added with [`StageRegistry::register`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use saransh::agents::{AgentOrchestrator, Context, StageRegistry};
//! use saransh::client::ResilientClient;
//!
//! # async fn demo(client: ResilientClient) {
//! let orchestrator = AgentOrchestrator::new(StageRegistry::with_builtins(&client), Vec::new());
//! let mut context = Context::new();
//! context.insert("article_content".into(), "Markets rallied today.".into());
//! let run = orchestrator
//!     .run_stages(context, &["summarization".to_string()], None)
//!     .await;
//! assert_eq!(run.results.len(), 1);
//! # }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use saransh_core::parse::parse_object;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::client::{RequestFailure, ResilientClient};
use crate::config::Config;
use crate::deadline::{expired, Deadline};

/// Accumulated stage input, keyed by field name.
pub type Context = Map<String, Value>;

pub const DEFAULT_PIPELINE: [&str; 4] = ["curation", "summarization", "fact_checking", "trend_analysis"];

const INVALID_JSON: &str = "Invalid JSON response";
const UNKNOWN_ARTICLE: &str = "unknown";

// ═══════════════════════════════════════════════════════════════════════
// Failures and results
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    /// The completion API call failed after retries.
    Request,
    /// No stage is registered under the requested name.
    NotFound,
    /// The deadline passed before the stage started.
    Cancelled,
    /// The stage itself reported an error.
    Internal,
}

/// Stage error carried as data inside a [`StageResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct StageFailure {
    pub kind: StageErrorKind,
    pub message: String,
}

impl StageFailure {
    pub fn new(kind: StageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(name: &str) -> Self {
        Self::new(StageErrorKind::NotFound, format!("Stage '{}' not found", name))
    }

    pub fn cancelled(name: &str) -> Self {
        Self::new(
            StageErrorKind::Cancelled,
            format!("Stage '{}' not started: deadline passed", name),
        )
    }
}

impl From<RequestFailure> for StageFailure {
    fn from(failure: RequestFailure) -> Self {
        Self::new(StageErrorKind::Request, failure.to_string())
    }
}

/// Output of one stage invocation.
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub stage_name: String,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StageFailure>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl StageResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    fn failed(name: &str, failure: StageFailure, started: Instant) -> Self {
        Self {
            stage_name: name.to_string(),
            payload: json!({ "error": failure.message }),
            error: Some(failure),
            completed_at: Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// One orchestration run. Always produced, even when every stage failed.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    /// Stages that were started, in order.
    pub stages_executed: Vec<String>,
    /// One entry per requested stage, in request order.
    pub results: Vec<StageResult>,
    /// Wall time in seconds.
    pub duration: f64,
    pub completed_at: DateTime<Utc>,
    pub cancelled: bool,
    /// Final context including every `<name>_result` entry.
    pub context: Context,
}

impl PipelineRun {
    pub fn result(&self, stage: &str) -> Option<&StageResult> {
        self.results.iter().find(|r| r.stage_name == stage)
    }

    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| !r.is_ok()).count()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Stage trait
// ═══════════════════════════════════════════════════════════════════════

/// A named unit of work over the shared context.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn process_input(&self, context: &Context) -> Result<Value, StageFailure>;

    /// Like [`process_input`](Stage::process_input), but issues no new
    /// external requests once `deadline` passes. Stages without external
    /// calls keep the default, which ignores the deadline.
    async fn process_within(
        &self,
        context: &Context,
        _deadline: Option<Deadline>,
    ) -> Result<Value, StageFailure> {
        self.process_input(context).await
    }
}

/// The built-in stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Curation,
    Summarization,
    FactChecking,
    TrendAnalysis,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::Curation,
        StageKind::Summarization,
        StageKind::FactChecking,
        StageKind::TrendAnalysis,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Curation => "curation",
            StageKind::Summarization => "summarization",
            StageKind::FactChecking => "fact_checking",
            StageKind::TrendAnalysis => "trend_analysis",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            StageKind::Curation => {
                "Selects and curates relevant articles based on quality, relevance, and user preferences"
            }
            StageKind::Summarization => "Creates 60-word summaries with key points and insights",
            StageKind::FactChecking => {
                "Validates information accuracy, checks sources, and flags potential misinformation"
            }
            StageKind::TrendAnalysis => {
                "Identifies emerging topics, patterns, and trending stories across articles"
            }
        }
    }

    /// Context keys rendered into the prompt.
    pub fn input_keys(&self) -> [&'static str; 2] {
        match self {
            StageKind::Curation => ["article_data", "user_preferences"],
            StageKind::Summarization => ["article_content", "article_metadata"],
            StageKind::FactChecking => ["article_content", "article_sources"],
            StageKind::TrendAnalysis => ["current_article", "recent_articles"],
        }
    }

    /// Key of the parsed model answer inside the payload.
    pub fn result_key(&self) -> &'static str {
        match self {
            StageKind::Curation => "curation_result",
            StageKind::Summarization => "summary_result",
            StageKind::FactChecking => "fact_check_result",
            StageKind::TrendAnalysis => "trend_analysis_result",
        }
    }

    fn system_prompt(&self) -> String {
        let role = match self {
            StageKind::Curation => "Content Curation Agent",
            StageKind::Summarization => "Summarization Agent",
            StageKind::FactChecking => "Fact-Checking Agent",
            StageKind::TrendAnalysis => "Trend Analysis Agent",
        };
        format!(
            "You are the {} of the Saransh news app. Respond with a single JSON object only.",
            role
        )
    }

    fn instructions(&self) -> &'static str {
        match self {
            StageKind::Curation => {
                "Judge this article's relevance, quality, and fit for different reader segments.\n\
                 Weigh relevance to the reader's interests, accuracy, timeliness, source diversity, and balance.\n\
                 Respond as JSON:\n\
                 {\"relevance_score\": 1-10, \"quality_score\": 1-10, \"recommended_segments\": [\"general\"], \
                 \"key_topics\": [\"...\"], \"curation_decision\": \"include|exclude|flag\", \"reasoning\": \"...\"}"
            }
            StageKind::Summarization => {
                "Summarize the article in about 60 words. Keep key facts and figures, stay objective, \
                 and mention place and time when relevant.\n\
                 Respond as JSON:\n\
                 {\"summary\": \"...\", \"word_count\": 60, \"key_points\": [\"...\"], \
                 \"entities\": [\"...\"], \"sentiment\": \"positive|negative|neutral\"}"
            }
            StageKind::FactChecking => {
                "Assess the article's factual accuracy and the credibility of its sources. \
                 Look for unverifiable claims, logical gaps, bias, and misinformation patterns.\n\
                 Respond as JSON:\n\
                 {\"credibility_score\": 1-10, \"source_assessment\": \"reliable|unreliable|mixed\", \
                 \"factual_claims\": [{\"claim\": \"...\", \"verification_status\": \"verified|unverified|contested\", \
                 \"confidence\": \"high|medium|low\"}], \"potential_issues\": [\"...\"], \
                 \"verification_recommendations\": [\"...\"], \"overall_assessment\": \"reliable|questionable|unreliable\"}"
            }
            StageKind::TrendAnalysis => {
                "Compare the current article with recent coverage. Identify emerging trends, trending \
                 entities, story momentum, and connections across topics.\n\
                 Respond as JSON:\n\
                 {\"emerging_trends\": [{\"trend\": \"...\", \"momentum\": \"rising|stable|declining\", \
                 \"confidence\": \"high|medium|low\", \"related_topics\": [\"...\"]}], \
                 \"trending_entities\": [{\"entity\": \"...\", \"type\": \"person|place|event|organization\", \
                 \"frequency\": \"high|medium|low\", \"sentiment\": \"positive|negative|neutral\"}], \
                 \"pattern_analysis\": {\"story_arc\": \"developing|peaking|declining\", \
                 \"geographic_focus\": [\"...\"], \"temporal_pattern\": \"breaking|ongoing|resolved\"}, \
                 \"cross_topic_connections\": [{\"topics\": [\"...\"], \"connection_strength\": \"strong|medium|weak\", \
                 \"connection_type\": \"causal|correlational|thematic\"}]}"
            }
        }
    }

    /// Render the user prompt: declared inputs, then earlier stage outputs.
    pub fn build_prompt(&self, context: &Context) -> String {
        let mut prompt = String::new();
        for key in self.input_keys() {
            prompt.push_str(&format!("{}:\n{}\n\n", heading(key), render(context.get(key))));
        }

        let own = format!("{}_result", self.name());
        let earlier: Vec<(&String, &Value)> = context
            .iter()
            .filter(|(k, _)| k.ends_with("_result") && **k != own)
            .collect();
        if !earlier.is_empty() {
            prompt.push_str("Earlier stage results:\n");
            for (key, value) in earlier {
                prompt.push_str(&format!("{}: {}\n", key, render(Some(value))));
            }
            prompt.push('\n');
        }

        prompt.push_str(self.instructions());
        prompt
    }

    /// Article id the payload is attributed to.
    fn article_id(&self, context: &Context) -> String {
        let holder = match self {
            StageKind::Curation => context.get("article_data"),
            StageKind::Summarization => context.get("article_metadata"),
            StageKind::FactChecking => None,
            StageKind::TrendAnalysis => context.get("current_article"),
        };
        holder
            .and_then(|h| h.get("article_id"))
            .or_else(|| context.get("article_id"))
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_ARTICLE)
            .to_string()
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn heading(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, word) in key.split('_').enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "(none provided)".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
    }
}

/// A built-in stage backed by one completion request.
pub struct PromptStage {
    kind: StageKind,
    client: ResilientClient,
}

impl PromptStage {
    pub fn new(kind: StageKind, client: ResilientClient) -> Self {
        Self { kind, client }
    }
}

#[async_trait]
impl Stage for PromptStage {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn description(&self) -> &str {
        self.kind.description()
    }

    async fn process_input(&self, context: &Context) -> Result<Value, StageFailure> {
        self.process_within(context, None).await
    }

    async fn process_within(
        &self,
        context: &Context,
        deadline: Option<Deadline>,
    ) -> Result<Value, StageFailure> {
        let prompt = self.kind.build_prompt(context);
        let raw = self
            .client
            .within(deadline)
            .ask(&self.kind.system_prompt(), &prompt)
            .await?;

        let parsed = match parse_object(&raw) {
            Ok(map) => Value::Object(map),
            Err(e) => {
                warn!(stage = self.kind.name(), error = %e, "stage answer is not a JSON object");
                json!({ "error": INVALID_JSON })
            }
        };

        let mut payload = Map::new();
        payload.insert(self.kind.result_key().to_string(), parsed);
        payload.insert("raw_response".to_string(), Value::String(raw));
        payload.insert(
            "article_id".to_string(),
            Value::String(self.kind.article_id(context)),
        );
        Ok(Value::Object(payload))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

struct StageEntry {
    stage: Arc<dyn Stage>,
    created_at: DateTime<Utc>,
    executions: AtomicU64,
    failures: AtomicU64,
    /// Milliseconds since the epoch; 0 when never executed.
    last_executed_ms: AtomicI64,
}

/// Per-stage execution counters.
#[derive(Debug, Clone, Serialize)]
pub struct StageStats {
    pub description: String,
    pub executions: u64,
    pub failures: u64,
    pub created_at: DateTime<Utc>,
    pub last_executed_at: Option<DateTime<Utc>>,
}

/// Name → stage map.
#[derive(Default)]
pub struct StageRegistry {
    stages: BTreeMap<String, StageEntry>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the four built-in prompt stages.
    pub fn with_builtins(client: &ResilientClient) -> Self {
        let mut registry = Self::new();
        for kind in StageKind::ALL {
            registry.register(Arc::new(PromptStage::new(kind, client.clone())));
        }
        registry
    }

    /// Register a stage, replacing any stage with the same name.
    pub fn register(&mut self, stage: Arc<dyn Stage>) {
        self.stages.insert(
            stage.name().to_string(),
            StageEntry {
                stage,
                created_at: Utc::now(),
                executions: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                last_executed_ms: AtomicI64::new(0),
            },
        );
    }

    pub fn find(&self, name: &str) -> Option<&Arc<dyn Stage>> {
        self.stages.get(name).map(|e| &e.stage)
    }

    pub fn stages(&self) -> impl Iterator<Item = &Arc<dyn Stage>> {
        self.stages.values().map(|e| &e.stage)
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Orchestrator
// ═══════════════════════════════════════════════════════════════════════

pub struct AgentOrchestrator {
    registry: StageRegistry,
    default_pipeline: Vec<String>,
}

impl AgentOrchestrator {
    /// An empty `default_pipeline` means [`DEFAULT_PIPELINE`].
    pub fn new(registry: StageRegistry, default_pipeline: Vec<String>) -> Self {
        let default_pipeline = if default_pipeline.is_empty() {
            DEFAULT_PIPELINE.iter().map(|s| s.to_string()).collect()
        } else {
            default_pipeline
        };
        info!(stages = registry.len(), "agent orchestrator initialized");
        Self {
            registry,
            default_pipeline,
        }
    }

    pub fn from_config(client: &ResilientClient, config: &Config) -> Self {
        Self::new(
            StageRegistry::with_builtins(client),
            config.agents.default_pipeline.clone(),
        )
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn default_pipeline(&self) -> &[String] {
        &self.default_pipeline
    }

    /// Run one stage against `context`. Never fails; errors land in the
    /// returned [`StageResult`].
    pub async fn execute_stage(&self, name: &str, context: &Context) -> StageResult {
        self.execute_within(name, context, None).await
    }

    async fn execute_within(
        &self,
        name: &str,
        context: &Context,
        deadline: Option<Deadline>,
    ) -> StageResult {
        let started = Instant::now();
        let Some(entry) = self.registry.stages.get(name) else {
            warn!(stage = name, "unknown stage requested");
            return StageResult::failed(name, StageFailure::not_found(name), started);
        };

        let execution_count = entry.executions.fetch_add(1, Ordering::SeqCst) + 1;
        let executed_at = Utc::now();
        entry
            .last_executed_ms
            .store(executed_at.timestamp_millis(), Ordering::SeqCst);
        info!(stage = name, execution_count, "executing stage");

        match entry.stage.process_within(context, deadline).await {
            Ok(payload) => {
                let payload = annotate(payload, entry.stage.as_ref(), execution_count, executed_at);
                StageResult {
                    stage_name: name.to_string(),
                    payload,
                    error: None,
                    completed_at: Utc::now(),
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
            Err(failure) => {
                entry.failures.fetch_add(1, Ordering::SeqCst);
                error!(stage = name, error = %failure, "stage failed");
                StageResult::failed(name, failure, started)
            }
        }
    }

    /// Run `stage_order` sequentially, threading each payload into the
    /// context as `<name>_result`. Returns one [`StageResult`] per
    /// requested name.
    pub async fn run_stages(
        &self,
        mut context: Context,
        stage_order: &[String],
        deadline: Option<Deadline>,
    ) -> PipelineRun {
        let started = Instant::now();
        let mut run = PipelineRun {
            stages_executed: Vec::with_capacity(stage_order.len()),
            results: Vec::with_capacity(stage_order.len()),
            duration: 0.0,
            completed_at: Utc::now(),
            cancelled: false,
            context: Context::new(),
        };
        info!(stages = ?stage_order, "starting stage pipeline");

        for name in stage_order {
            let result = if expired(deadline) {
                run.cancelled = true;
                StageResult::failed(name, StageFailure::cancelled(name), Instant::now())
            } else {
                run.stages_executed.push(name.clone());
                self.execute_within(name, &context, deadline).await
            };
            context.insert(format!("{}_result", name), result.payload.clone());
            run.results.push(result);
        }

        run.duration = started.elapsed().as_secs_f64();
        run.completed_at = Utc::now();
        run.context = context;
        info!(
            duration_secs = run.duration,
            failures = run.failures(),
            cancelled = run.cancelled,
            "stage pipeline completed"
        );
        run
    }

    /// Run the configured default pipeline.
    pub async fn run_default(&self, context: Context, deadline: Option<Deadline>) -> PipelineRun {
        self.run_stages(context, &self.default_pipeline, deadline).await
    }

    pub fn get_stats(&self) -> BTreeMap<String, StageStats> {
        self.registry
            .stages
            .iter()
            .map(|(name, entry)| {
                let last_ms = entry.last_executed_ms.load(Ordering::SeqCst);
                let last_executed_at = if last_ms == 0 {
                    None
                } else {
                    Utc.timestamp_millis_opt(last_ms).single()
                };
                (
                    name.clone(),
                    StageStats {
                        description: entry.stage.description().to_string(),
                        executions: entry.executions.load(Ordering::SeqCst),
                        failures: entry.failures.load(Ordering::SeqCst),
                        created_at: entry.created_at,
                        last_executed_at,
                    },
                )
            })
            .collect()
    }
}

fn annotate(payload: Value, stage: &dyn Stage, execution_count: u64, executed_at: DateTime<Utc>) -> Value {
    let mut map = match payload {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    map.insert("stage_name".to_string(), json!(stage.name()));
    map.insert("stage_description".to_string(), json!(stage.description()));
    map.insert("execution_count".to_string(), json!(execution_count));
    map.insert("executed_at".to_string(), json!(executed_at.to_rfc3339()));
    Value::Object(map)
}
