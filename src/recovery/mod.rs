//! Failure handling: log, classify, decide on retry, escalate.
//!
//! Every failure goes through [`Recovery::handle`], which always writes the
//! error log first. A log or escalation failure is reported with `warn!` and
//! never surfaces to the caller.

pub mod escalation;
pub mod log;
pub mod policy;

pub use escalation::{CompositeEscalation, EscalationSink, LogEscalation, WebhookEscalation};
pub use log::{ErrorLogEntry, ErrorSink, JsonlErrorLog, MemoryErrorLog};
pub use policy::{ErrorClassification, ErrorContext, RetryPolicy};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// What the caller should do about one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryDecision {
    pub classification: ErrorClassification,
    pub retry: bool,
    /// Backoff before the retry, present only when `retry` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_ms: Option<u64>,
}

impl RecoveryDecision {
    pub fn backoff(&self) -> Option<Duration> {
        self.backoff_ms.map(Duration::from_millis)
    }
}

/// The recovery pipeline shared by a crawl run.
#[derive(Clone)]
pub struct Recovery {
    policy: RetryPolicy,
    log: Arc<dyn ErrorSink>,
    escalation: Arc<dyn EscalationSink>,
}

impl Recovery {
    pub fn new(policy: RetryPolicy, log: Arc<dyn ErrorSink>, escalation: Arc<dyn EscalationSink>) -> Self {
        Self { policy, log, escalation }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Appends a failure to the error log without classifying it.
    pub async fn record(&self, message: &str, stack: Option<String>, context: ErrorContext) -> ErrorLogEntry {
        let entry = ErrorLogEntry::new(message, stack, context);
        if let Err(e) = self.log.append(&entry).await {
            warn!("Failed to write error log: {:#}", e);
        }
        entry
    }

    /// [`record`](Self::record) for a typed error.
    pub async fn record_error(
        &self,
        error: &(dyn std::error::Error + Send + Sync + 'static),
        context: ErrorContext,
    ) -> ErrorLogEntry {
        self.record(&error.to_string(), log::render_chain(error), context).await
    }

    /// Records a failure and decides what to do about it.
    pub async fn handle(&self, message: &str, stack: Option<String>, context: ErrorContext) -> RecoveryDecision {
        let classification = self.policy.classify(message);
        let entry = self.record(message, stack, context).await;

        let retry = self.policy.should_retry(message, &entry.context);
        let backoff_ms = retry.then(|| self.policy.backoff_delay(&entry.context).as_millis() as u64);
        debug!(%classification, retry, ?backoff_ms, "Handled failure: {}", message);

        if classification == ErrorClassification::Critical {
            if let Err(e) = self.escalation.escalate(&entry, classification).await {
                warn!("Failed to escalate critical error: {:#}", e);
            }
        }

        RecoveryDecision { classification, retry, backoff_ms }
    }

    /// [`handle`](Self::handle) for a typed error; the stack is its cause chain.
    pub async fn handle_error(
        &self,
        error: &(dyn std::error::Error + Send + Sync + 'static),
        context: ErrorContext,
    ) -> RecoveryDecision {
        self.handle(&error.to_string(), log::render_chain(error), context).await
    }
}
