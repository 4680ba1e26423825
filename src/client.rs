//! Resilient request client for the text/embedding completion API.
//!
//! [`ResilientClient`] wraps any [`CompletionBackend`] with input
//! validation and a bounded retry loop. Backends only classify failures;
//! the client decides whether and how long to wait.
//!
//! # Retry Strategy
//!
//! | Failure | Retried | Wait before next attempt |
//! |---------|---------|--------------------------|
//! | [`RequestFailure::Transient`] | yes | `base * 2^attempt`, capped |
//! | [`RequestFailure::RateLimited`] | yes | larger of server hint (or default) and the backoff, capped at `max_delay` |
//! | [`RequestFailure::Fatal`] | no | returned immediately |
//!
//! `attempt` is 0-indexed. At most `max_retries` attempts are made; when
//! the last one fails, its classification is returned unchanged. There is
//! no jitter, so the schedule is fully deterministic. Attempt counters live
//! on the stack of each call, so concurrent calls never serialize on
//! shared retry state.
//!
//! A client scoped with [`ResilientClient::within`] stops retrying once its
//! deadline passes: waits are shortened to the time remaining, and the last
//! failure is returned instead of issuing another attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{Config, LlmConfig, RetryConfig};
use crate::deadline::{expired, Deadline};
use crate::logging::sanitize_prompt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Classified failure at the external call boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestFailure {
    /// The server signalled throttling, optionally suggesting a wait.
    #[error("rate limited: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },
    /// Network or server-side error worth retrying.
    #[error("transient request failure: {0}")]
    Transient(String),
    /// Authentication, validation, or malformed response. Never retried.
    #[error("fatal request failure: {0}")]
    Fatal(String),
}

impl RequestFailure {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RequestFailure::Fatal(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RequestFailure::RateLimited { .. } => "rate_limited",
            RequestFailure::Transient(_) => "transient",
            RequestFailure::Fatal(_) => "fatal",
        }
    }
}

/// A text-completion and embedding service.
///
/// Implementations perform exactly one request per call and classify the
/// outcome; retrying is the client's job.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, RequestFailure>;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RequestFailure>;

    fn model_name(&self) -> &str;
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub rate_limit_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            rate_limit_delay: Duration::from_millis(config.rate_limit_delay_ms),
        }
    }

    /// A policy that retries without sleeping.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            rate_limit_delay: Duration::ZERO,
        }
    }

    /// `base * 2^attempt`, capped at `max_delay`.
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use saransh::client::RetryPolicy;
    ///
    /// let policy = RetryPolicy {
    ///     max_retries: 5,
    ///     base_delay: Duration::from_secs(1),
    ///     max_delay: Duration::from_secs(5),
    ///     rate_limit_delay: Duration::from_secs(1),
    /// };
    /// assert_eq!(policy.backoff_delay(0), Duration::from_secs(1));
    /// assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
    /// assert_eq!(policy.backoff_delay(3), Duration::from_secs(5));
    /// ```
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Wait after `failure` on `attempt`, or `None` when it must not be retried.
    ///
    /// A server `Retry-After` hint never pushes the wait past `max_delay`.
    pub fn delay_for(&self, failure: &RequestFailure, attempt: u32) -> Option<Duration> {
        match failure {
            RequestFailure::Fatal(_) => None,
            RequestFailure::Transient(_) => Some(self.backoff_delay(attempt)),
            RequestFailure::RateLimited { retry_after, .. } => {
                let hinted = retry_after.unwrap_or(self.rate_limit_delay);
                Some(hinted.max(self.backoff_delay(attempt)).min(self.max_delay))
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Validating, retrying front end over a [`CompletionBackend`].
#[derive(Clone)]
pub struct ResilientClient {
    backend: Arc<dyn CompletionBackend>,
    policy: RetryPolicy,
    max_tokens: u32,
    max_tokens_limit: u32,
    temperature: f32,
    deadline: Option<Deadline>,
}

impl ResilientClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, policy: RetryPolicy, llm: &LlmConfig) -> Self {
        Self {
            backend,
            policy,
            max_tokens: llm.max_tokens,
            max_tokens_limit: llm.max_tokens_limit,
            temperature: llm.temperature,
            deadline: None,
        }
    }

    pub fn from_config(backend: Arc<dyn CompletionBackend>, config: &Config) -> Self {
        Self::new(backend, RetryPolicy::from_config(&config.retry), &config.llm)
    }

    /// A copy of this client that issues no further attempts once
    /// `deadline` passes. `None` removes any limit.
    pub fn within(&self, deadline: Option<Deadline>) -> Self {
        Self {
            deadline,
            ..self.clone()
        }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Send a chat completion request.
    ///
    /// # Errors
    ///
    /// [`RequestFailure::Fatal`] without contacting the backend when
    /// `messages` is empty, `max_tokens` is outside `1..=limit`, or
    /// `temperature` is outside `[0, 2]`. Otherwise the classification of
    /// the last failed attempt.
    pub async fn send(
        &self,
        messages: &[Message],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, RequestFailure> {
        if messages.is_empty() || messages.iter().all(|m| m.content.trim().is_empty()) {
            return Err(RequestFailure::Fatal("messages must not be empty".to_string()));
        }
        if max_tokens == 0 || max_tokens > self.max_tokens_limit {
            return Err(RequestFailure::Fatal(format!(
                "max_tokens {} outside 1..={}",
                max_tokens, self.max_tokens_limit
            )));
        }
        if !(0.0..=2.0).contains(&temperature) {
            return Err(RequestFailure::Fatal(format!(
                "temperature {} outside [0, 2]",
                temperature
            )));
        }

        if let Some(last) = messages.last() {
            debug!(
                model = self.backend.model_name(),
                prompt = %sanitize_prompt(&last.content),
                "sending completion"
            );
        }

        let backend = &self.backend;
        self.with_retry("complete", move || {
            backend.complete(messages, max_tokens, temperature)
        })
        .await
    }

    /// System + user prompt with the configured token and temperature defaults.
    pub async fn ask(&self, system: &str, user: &str) -> Result<String, RequestFailure> {
        let messages = [Message::system(system), Message::user(user)];
        self.send(&messages, self.max_tokens, self.temperature).await
    }

    /// Embed `texts`, one vector per input in input order.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RequestFailure> {
        if texts.is_empty() || texts.iter().any(|t| t.trim().is_empty()) {
            return Err(RequestFailure::Fatal(
                "embedding input must be non-empty texts".to_string(),
            ));
        }

        let backend = &self.backend;
        let vectors = self
            .with_retry("embed", move || backend.embed(texts))
            .await?;
        if vectors.len() != texts.len() {
            return Err(RequestFailure::Fatal(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, RequestFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RequestFailure>>,
    {
        let attempts = self.policy.max_retries.max(1);
        let mut attempt = 0;
        loop {
            let failure = match call().await {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };

            let is_last = attempt + 1 >= attempts;
            let delay = match self.policy.delay_for(&failure, attempt) {
                Some(delay) if !is_last => delay,
                _ => {
                    warn!(
                        op,
                        attempt = attempt + 1,
                        kind = failure.kind(),
                        error = %failure,
                        "request failed, giving up"
                    );
                    return Err(failure);
                }
            };

            let delay = match self.deadline {
                Some(deadline) => delay.min(deadline.remaining()),
                None => delay,
            };

            warn!(
                op,
                attempt = attempt + 1,
                kind = failure.kind(),
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "request failed, retrying"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if expired(self.deadline) {
                warn!(op, attempt = attempt + 1, "deadline passed, not retrying");
                return Err(failure);
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<VecDeque<Result<String, RequestFailure>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, RequestFailure>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for Scripted {
        async fn complete(
            &self,
            _messages: &[Message],
            _max_tokens: u32,
            _temperature: f32,
        ) -> Result<String, RequestFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RequestFailure::Fatal("script exhausted".into())))
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RequestFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn client(backend: Arc<Scripted>, retries: u32) -> ResilientClient {
        ResilientClient::new(backend, RetryPolicy::immediate(retries), &LlmConfig::default())
    }

    fn rate_limited() -> RequestFailure {
        RequestFailure::RateLimited {
            retry_after: None,
            message: "slow down".into(),
        }
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            rate_limit_delay: Duration::from_millis(50),
        };
        let delays: Vec<u128> = (0..6).map(|i| policy.backoff_delay(i).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
        for w in delays.windows(2) {
            assert!(w[0] <= w[1]);
        }
        assert_eq!(policy.backoff_delay(200), Duration::from_millis(1000));
    }

    #[test]
    fn test_rate_limit_delay_never_shorter_than_backoff() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            rate_limit_delay: Duration::from_secs(1),
        };
        let hinted = RequestFailure::RateLimited {
            retry_after: Some(Duration::from_secs(10)),
            message: String::new(),
        };
        assert_eq!(policy.delay_for(&hinted, 0), Some(Duration::from_secs(10)));
        assert_eq!(policy.delay_for(&rate_limited(), 2), Some(Duration::from_secs(4)));
        assert_eq!(policy.delay_for(&RequestFailure::Fatal("x".into()), 0), None);
    }

    #[test]
    fn test_retry_after_hint_capped_at_max_delay() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            rate_limit_delay: Duration::from_millis(100),
        };
        let hinted = RequestFailure::RateLimited {
            retry_after: Some(Duration::from_secs(600)),
            message: String::new(),
        };
        assert_eq!(policy.delay_for(&hinted, 0), Some(Duration::from_secs(2)));
        assert_eq!(
            RetryPolicy::immediate(3).delay_for(&hinted, 1),
            Some(Duration::ZERO)
        );
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let backend = Scripted::new(vec![
            Err(RequestFailure::Transient("502".into())),
            Err(rate_limited()),
            Ok("done".into()),
        ]);
        let out = client(backend.clone(), 3).ask("sys", "hi").await.unwrap();
        assert_eq!(out, "done");
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_rate_limited_exhausts_retries() {
        let backend = Scripted::new(vec![Err(rate_limited()), Err(rate_limited()), Err(rate_limited())]);
        let err = client(backend.clone(), 3).ask("sys", "hi").await.unwrap_err();
        assert!(matches!(err, RequestFailure::RateLimited { .. }));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let backend = Scripted::new(vec![
            Err(RequestFailure::Fatal("401".into())),
            Ok("never".into()),
        ]);
        let err = client(backend.clone(), 3).ask("sys", "hi").await.unwrap_err();
        assert_eq!(err, RequestFailure::Fatal("401".into()));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_inputs_never_reach_backend() {
        let backend = Scripted::new(vec![Ok("x".into())]);
        let c = client(backend.clone(), 3);
        assert!(c.send(&[], 10, 0.5).await.is_err());
        assert!(c.send(&[Message::user("hi")], 0, 0.5).await.is_err());
        assert!(c.send(&[Message::user("hi")], 100_000, 0.5).await.is_err());
        assert!(c.send(&[Message::user("hi")], 10, 2.5).await.is_err());
        assert!(c.embed(&[]).await.is_err());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_embed_returns_one_vector_per_text() {
        let backend = Scripted::new(vec![]);
        let vectors = client(backend, 3)
            .embed(&["a".to_string(), "bcd".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![3.0]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_follow_schedule() {
        let backend = Scripted::new(vec![
            Err(RequestFailure::Transient("a".into())),
            Err(RequestFailure::Transient("b".into())),
            Ok("ok".into()),
        ]);
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            rate_limit_delay: Duration::from_secs(1),
        };
        let c = ResilientClient::new(backend, policy, &LlmConfig::default());
        let start = tokio::time::Instant::now();
        c.ask("sys", "hi").await.unwrap();
        // 1s after attempt 0, 2s after attempt 1
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cuts_retry_wait_short() {
        let hinted = || {
            Err(RequestFailure::RateLimited {
                retry_after: Some(Duration::from_millis(400)),
                message: "429".into(),
            })
        };
        let backend = Scripted::new(vec![hinted(), hinted(), hinted()]);
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            rate_limit_delay: Duration::from_millis(10),
        };
        let c = ResilientClient::new(backend.clone(), policy, &LlmConfig::default())
            .within(Some(Deadline::after(Duration::from_millis(50))));

        let start = tokio::time::Instant::now();
        let err = c.ask("sys", "hi").await.unwrap_err();
        assert!(matches!(err, RequestFailure::RateLimited { .. }));
        // one attempt, then a 50ms wait instead of 400ms, then give up
        assert_eq!(backend.calls(), 1);
        assert_eq!(start.elapsed(), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_expired_deadline_still_allows_first_attempt() {
        let backend = Scripted::new(vec![Err(RequestFailure::Transient("502".into())), Ok("late".into())]);
        let c = client(backend.clone(), 3).within(Some(Deadline::after(Duration::ZERO)));
        assert!(c.ask("sys", "hi").await.is_err());
        assert_eq!(backend.calls(), 1);
    }
}
