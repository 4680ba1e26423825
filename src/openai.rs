//! OpenAI-compatible completion backend.
//!
//! [`OpenAiBackend`] talks to `POST {base_url}/chat/completions` and
//! `POST {base_url}/embeddings` with bearer auth. It makes exactly one
//! HTTP request per call and maps the outcome onto [`RequestFailure`]:
//!
//! | Outcome | Classification |
//! |---------|----------------|
//! | HTTP 429 | `RateLimited`, honoring `Retry-After` seconds |
//! | HTTP 5xx, HTTP 408 | `Transient` |
//! | other HTTP 4xx | `Fatal` |
//! | network error or timeout | `Transient` |
//! | 2xx with an undecodable body | `Fatal` |
//!
//! [`DisabledBackend`] is selected with `llm.provider = "disabled"`; every
//! call fails `Fatal`, which sends the pipeline down its deterministic path.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde_json::Value;

use crate::client::{CompletionBackend, Message, RequestFailure};
use crate::config::LlmConfig;

const MAX_ERROR_BODY_CHARS: usize = 300;

pub struct OpenAiBackend {
    http: reqwest::Client,
    base_url: String,
    model: String,
    embedding_model: String,
    api_key: String,
}

impl OpenAiBackend {
    /// # Errors
    ///
    /// Fails when `OPENAI_API_KEY` is not set or the HTTP client cannot be
    /// built.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .context("OPENAI_API_KEY environment variable not set")?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            api_key,
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, RequestFailure> {
        let resp = self
            .http
            .post(format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<Value>()
                .await
                .map_err(|e| RequestFailure::Fatal(format!("undecodable response body: {}", e)));
        }

        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body_text = resp.text().await.unwrap_or_default();
        Err(classify_status(status.as_u16(), retry_after, &body_text))
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(
        &self,
        messages: &[Message],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, RequestFailure> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": max_tokens,
            "temperature": temperature,
        });
        let json = self.post("chat/completions", &body).await?;
        parse_completion(&json)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RequestFailure> {
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": texts,
        });
        let json = self.post("embeddings", &body).await?;
        parse_embeddings(&json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Backend used when AI calls are switched off.
pub struct DisabledBackend;

#[async_trait]
impl CompletionBackend for DisabledBackend {
    async fn complete(
        &self,
        _messages: &[Message],
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String, RequestFailure> {
        Err(RequestFailure::Fatal("llm provider is disabled".to_string()))
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RequestFailure> {
        Err(RequestFailure::Fatal("llm provider is disabled".to_string()))
    }

    fn model_name(&self) -> &str {
        "disabled"
    }
}

/// Select the backend named by `llm.provider`.
pub fn create_backend(config: &LlmConfig) -> Result<Arc<dyn CompletionBackend>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledBackend)),
        "openai" => Ok(Arc::new(OpenAiBackend::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

pub fn classify_status(status: u16, retry_after: Option<Duration>, body: &str) -> RequestFailure {
    let message = format!("HTTP {}: {}", status, truncate(body));
    match status {
        429 => RequestFailure::RateLimited {
            retry_after,
            message,
        },
        408 | 500..=599 => RequestFailure::Transient(message),
        _ => RequestFailure::Fatal(message),
    }
}

fn classify_transport(e: reqwest::Error) -> RequestFailure {
    if e.is_builder() {
        RequestFailure::Fatal(format!("invalid request: {}", e))
    } else {
        RequestFailure::Transient(format!("network error: {}", e))
    }
}

/// Seconds form of `Retry-After`. HTTP-date values are ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
}

fn truncate(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() > MAX_ERROR_BODY_CHARS {
        let head: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{}...", head)
    } else {
        body.to_string()
    }
}

/// Extract `choices[0].message.content`.
fn parse_completion(json: &Value) -> Result<String, RequestFailure> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RequestFailure::Fatal("response missing choices[0].message.content".to_string()))
}

/// Extract `data[].embedding`, ordered by `data[].index` when present.
fn parse_embeddings(json: &Value) -> Result<Vec<Vec<f32>>, RequestFailure> {
    let data = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| RequestFailure::Fatal("response missing data array".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| RequestFailure::Fatal("response item missing embedding".to_string()))?;
        let mut vector = Vec::with_capacity(embedding.len());
        for v in embedding {
            let n = v
                .as_f64()
                .ok_or_else(|| RequestFailure::Fatal("non-numeric embedding value".to_string()))?;
            vector.push(n as f32);
        }
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}
