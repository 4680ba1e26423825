//! Scripted completion backend for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use saransh::client::{CompletionBackend, Message, RequestFailure, ResilientClient, RetryPolicy};
use saransh::config::LlmConfig;

type Responder = Box<dyn Fn(&str) -> Result<String, RequestFailure> + Send + Sync>;

/// Answers completions from a queue first, then from a responder keyed on
/// the last user prompt. Embeddings are letter-frequency vectors.
pub struct ScriptedBackend {
    queue: Mutex<VecDeque<Result<String, RequestFailure>>>,
    responder: Responder,
    embed_failure: Option<RequestFailure>,
    prompts: Mutex<Vec<String>>,
    completions: AtomicUsize,
    embeddings: AtomicUsize,
    latency: Duration,
}

impl ScriptedBackend {
    pub fn responding<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<String, RequestFailure> + Send + Sync + 'static,
    {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: Box::new(responder),
            embed_failure: None,
            prompts: Mutex::new(Vec::new()),
            completions: AtomicUsize::new(0),
            embeddings: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    /// Always answer with `reply`.
    pub fn constant(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::responding(move |_| Ok(reply.clone()))
    }

    /// Always fail with `failure`.
    pub fn failing(failure: RequestFailure) -> Self {
        let embed = failure.clone();
        let mut backend = Self::responding(move |_| Err(failure.clone()));
        backend.embed_failure = Some(embed);
        backend
    }

    /// Answer analysis prompts sensibly and everything else with `{}`.
    pub fn newsroom() -> Self {
        Self::responding(newsroom_reply)
    }

    pub fn with_queue(self, replies: Vec<Result<String, RequestFailure>>) -> Self {
        *self.queue.lock().unwrap() = replies.into();
        self
    }

    pub fn with_embed_failure(mut self, failure: RequestFailure) -> Self {
        self.embed_failure = Some(failure);
        self
    }

    /// Every completion takes `latency` on the tokio clock.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    pub fn embeddings(&self) -> usize {
        self.embeddings.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(
        &self,
        messages: &[Message],
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String, RequestFailure> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(reply) = self.queue.lock().unwrap().pop_front() {
            return reply;
        }
        (self.responder)(&prompt)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RequestFailure> {
        self.embeddings.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = &self.embed_failure {
            return Err(failure.clone());
        }
        Ok(texts.iter().map(|t| letter_vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// 26-dim letter frequency vector.
pub fn letter_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 26];
    for c in text.to_ascii_lowercase().chars() {
        if c.is_ascii_lowercase() {
            v[(c as u8 - b'a') as usize] += 1.0;
        }
    }
    v
}

pub fn newsroom_reply(prompt: &str) -> Result<String, RequestFailure> {
    let reply = if prompt.contains("sentiment of this news article") {
        r#"{"score": 0.6, "label": "positive", "confidence": 0.8}"#
    } else if prompt.contains("named entities") {
        r#"["ISRO", "Chandrayaan", "isro", "Sriharikota"]"#
    } else if prompt.contains("Classify this news article") {
        "```json\n[\"science\", \"cooking\", \"technology\"]\n```"
    } else if prompt.contains("Summarize this news article") {
        r#"{"summary": "ISRO launched its lunar mission from Sriharikota."}"#
    } else if prompt.contains("keywords") {
        r#"{"keywords": ["isro", "moon", "launch"]}"#
    } else if prompt.contains("Which language") {
        r#"{"language": "english"}"#
    } else if prompt.contains("journalistic quality") {
        "Quality: {\"quality_score\": 8}"
    } else {
        "{}"
    };
    Ok(reply.to_string())
}

pub fn rate_limited() -> RequestFailure {
    RequestFailure::RateLimited {
        retry_after: None,
        message: "429".to_string(),
    }
}

/// A client that retries up to three times without sleeping.
pub fn client_for(backend: Arc<ScriptedBackend>) -> ResilientClient {
    ResilientClient::new(backend, RetryPolicy::immediate(3), &LlmConfig::default())
}
