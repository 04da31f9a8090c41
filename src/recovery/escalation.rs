//! Escalation of critical failures.

use super::log::ErrorLogEntry;
use super::policy::ErrorClassification;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error};
use wreq::Client;

/// Receives entries that need a human.
#[async_trait]
pub trait EscalationSink: Send + Sync {
    async fn escalate(&self, entry: &ErrorLogEntry, classification: ErrorClassification) -> Result<()>;
}

/// Diagnostic payload shared by every escalation channel.
pub fn alert_payload(entry: &ErrorLogEntry, classification: ErrorClassification) -> Value {
    json!({
        "type": "CRITICAL_ERROR",
        "classification": classification,
        "error": entry.message,
        "context": entry.context,
        "timestamp": entry.timestamp,
    })
}

/// Emits an `error!` event carrying the JSON payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEscalation;

#[async_trait]
impl EscalationSink for LogEscalation {
    async fn escalate(&self, entry: &ErrorLogEntry, classification: ErrorClassification) -> Result<()> {
        let payload = alert_payload(entry, classification);
        error!(payload = %payload, "Critical error: {}", entry.message);
        Ok(())
    }
}

/// Posts a Slack-compatible message to an incoming webhook.
#[derive(Debug, Clone)]
pub struct WebhookEscalation {
    client: Client,
    url: String,
}

impl WebhookEscalation {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build webhook client")?;
        Ok(Self { client, url: url.into() })
    }

    fn slack_message(entry: &ErrorLogEntry) -> Value {
        let context = serde_json::to_string_pretty(&entry.context).unwrap_or_default();
        json!({
            "text": "🚨 Price crawler critical error",
            "attachments": [{
                "color": "danger",
                "fields": [
                    { "title": "Error", "value": entry.message, "short": false },
                    { "title": "Context", "value": context, "short": false },
                    { "title": "Timestamp", "value": entry.timestamp.to_rfc3339(), "short": true },
                ]
            }]
        })
    }
}

#[async_trait]
impl EscalationSink for WebhookEscalation {
    async fn escalate(&self, entry: &ErrorLogEntry, _classification: ErrorClassification) -> Result<()> {
        let body = serde_json::to_string(&Self::slack_message(entry))?;
        debug!("Posting critical alert to webhook");

        let response = self
            .client
            .post(self.url.as_str())
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .context("Failed to send webhook alert")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Webhook returned HTTP {}", status.as_u16());
        }
        Ok(())
    }
}

/// Fans out to several sinks; every sink is tried even if one fails.
pub struct CompositeEscalation {
    sinks: Vec<Box<dyn EscalationSink>>,
}

impl CompositeEscalation {
    pub fn new(sinks: Vec<Box<dyn EscalationSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl EscalationSink for CompositeEscalation {
    async fn escalate(&self, entry: &ErrorLogEntry, classification: ErrorClassification) -> Result<()> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.escalate(entry, classification).await {
                failures.push(e.to_string());
            }
        }
        if !failures.is_empty() {
            bail!("{} escalation(s) failed: {}", failures.len(), failures.join("; "));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::policy::ErrorContext;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry() -> ErrorLogEntry {
        ErrorLogEntry::new(
            "rate limit hit (HTTP 429)",
            None,
            ErrorContext::new("crawl").with_target("coupang_korea"),
        )
    }

    #[test]
    fn test_alert_payload_shape() {
        let payload = alert_payload(&entry(), ErrorClassification::Critical);
        assert_eq!(payload["type"], "CRITICAL_ERROR");
        assert_eq!(payload["classification"], "critical");
        assert_eq!(payload["context"]["target"], "coupang_korea");
    }

    #[tokio::test]
    async fn test_log_escalation_never_fails() {
        assert!(LogEscalation.escalate(&entry(), ErrorClassification::Critical).await.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_posts_slack_message() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/hooks/alert"))
            .and(header("Content-Type", "application/json"))
            .and(body_partial_json(json!({ "attachments": [{ "color": "danger" }] })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let sink = WebhookEscalation::new(format!("{}/hooks/alert", mock_server.uri())).unwrap();
        sink.escalate(&entry(), ErrorClassification::Critical).await.unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body["attachments"][0]["fields"][0]["value"].as_str().unwrap().contains("rate limit"));
    }

    #[tokio::test]
    async fn test_webhook_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let sink = WebhookEscalation::new(mock_server.uri()).unwrap();
        let err = sink.escalate(&entry(), ErrorClassification::Critical).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn test_composite_tries_every_sink() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&mock_server)
            .await;

        let composite = CompositeEscalation::new(vec![
            Box::new(WebhookEscalation::new(mock_server.uri()).unwrap()),
            Box::new(LogEscalation),
        ]);
        let err = composite.escalate(&entry(), ErrorClassification::Critical).await.unwrap_err();
        assert!(err.to_string().contains("1 escalation(s) failed"));
    }
}
