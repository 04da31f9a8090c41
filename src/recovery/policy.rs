//! Failure classification, retry cap, and exponential backoff.

use crate::config::Config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How a failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClassification {
    /// Worth retrying after a backoff.
    Transient,
    /// Needs a human; always escalated.
    Critical,
    /// Logged and never retried.
    Terminal,
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClassification::Transient => "transient",
            ErrorClassification::Critical => "critical",
            ErrorClassification::Terminal => "terminal",
        };
        write!(f, "{}", name)
    }
}

const CRITICAL_PATTERNS: &[&str] = &["authentication", "permission", "quota", "rate limit", "firebase", "firestore"];

const TRANSIENT_PATTERNS: &[&str] =
    &["econnreset", "etimedout", "enotfound", "econnrefused", "timeout", "network", "temporary"];

/// Ordered classification rules. The first rule with a matching pattern wins;
/// a message matching none is [`ErrorClassification::Terminal`].
pub const CLASSIFICATION_RULES: &[(ErrorClassification, &[&str])] = &[
    (ErrorClassification::Critical, CRITICAL_PATTERNS),
    (ErrorClassification::Transient, TRANSIENT_PATTERNS),
];

fn matches_any(message: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| message.contains(p))
}

/// Where and how often a failure happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Page being visited. Never part of the classified message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            product: None,
            target: None,
            url: None,
            retry_count: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Context for the next retry of the same operation, stamped now.
    pub fn next_attempt(&self) -> Self {
        Self { retry_count: self.retry_count.saturating_add(1), timestamp: Utc::now(), ..self.clone() }
    }
}

/// Retry decisions shared by every crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, backoff_base: Duration::from_millis(1000) }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self { max_retries: config.max_retries, backoff_base: Duration::from_millis(config.backoff_base_ms) }
    }

    /// Classifies an error message, case-insensitively.
    pub fn classify(&self, message: &str) -> ErrorClassification {
        let message = message.to_lowercase();
        CLASSIFICATION_RULES
            .iter()
            .find(|(_, patterns)| matches_any(&message, patterns))
            .map(|(classification, _)| *classification)
            .unwrap_or(ErrorClassification::Terminal)
    }

    /// True while retries remain and the message looks transient.
    ///
    /// Independent of [`classify`](Self::classify): a critical message that
    /// also carries a transient pattern is still retried.
    pub fn should_retry(&self, message: &str, context: &ErrorContext) -> bool {
        if context.retry_count >= self.max_retries {
            return false;
        }
        matches_any(&message.to_lowercase(), TRANSIENT_PATTERNS)
    }

    /// `base * 2^retry_count`, saturating.
    pub fn backoff_delay(&self, context: &ErrorContext) -> Duration {
        let factor = 2u32.checked_pow(context.retry_count).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }
}
