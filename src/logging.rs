//! Tracing setup and log hygiene.
//!
//! The binary calls [`init_tracing`] once. `RUST_LOG` wins over the
//! configured level; `LOG_FORMAT=json` or `logging.json = true` switches to
//! the JSON formatter. Logs go to stderr so command output on stdout stays
//! machine-readable.

use std::sync::OnceLock;

use regex::Regex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

const MAX_VISIBLE_CHARS: usize = 100;

/// Install the global subscriber. A second call is a no-op.
pub fn init_tracing(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let json = config.json
        || std::env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

    let result = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    };

    if result.is_ok() {
        tracing::debug!(level = %config.level, json, "tracing initialized");
    }
}

fn secret_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(bearer\s+|api_key=|password=|secret=|token=)[^\s&"']+"#)
            .expect("valid secret regex")
    })
}

/// Make prompt text safe to log: trimmed, truncated to 100 characters, and
/// with credentials redacted.
pub fn sanitize_prompt(prompt: &str) -> String {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return "[EMPTY]".to_string();
    }

    let total = trimmed.chars().count();
    let visible = if total > MAX_VISIBLE_CHARS {
        let head: String = trimmed.chars().take(MAX_VISIBLE_CHARS).collect();
        format!("{}... ({} chars total)", head, total)
    } else {
        trimmed.to_string()
    };

    secret_pattern()
        .replace_all(&visible, "${1}[REDACTED]")
        .into_owned()
}
