//! Destinations for crawl outcomes and run summaries.

use crate::config::OutputFormat;
use crate::format::Formatter;
use crate::orchestrator::CrawlOutcome;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

/// A product the run could not price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFailure {
    pub name: String,
    pub error: String,
}

/// End-of-run report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub successes: Vec<String>,
    pub failures: Vec<ProductFailure>,
    pub duration_ms: u64,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn record_success(&mut self, name: impl Into<String>) {
        self.successes.push(name.into());
    }

    pub fn record_failure(&mut self, name: impl Into<String>, error: impl Into<String>) {
        self.failures.push(ProductFailure { name: name.into(), error: error.into() });
    }
}

/// Receives every completed crawl outcome.
#[async_trait]
pub trait OutcomeSink: Send + Sync {
    async fn persist(&self, outcome: &CrawlOutcome) -> Result<()>;
}

/// Receives the run summary once all products are done.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn report(&self, summary: &RunSummary) -> Result<()>;
}

/// Prints each outcome as soon as it completes.
pub struct StdoutOutcomeSink {
    formatter: Formatter,
}

impl StdoutOutcomeSink {
    pub fn new(format: OutputFormat) -> Self {
        Self { formatter: Formatter::new(format) }
    }
}

#[async_trait]
impl OutcomeSink for StdoutOutcomeSink {
    async fn persist(&self, outcome: &CrawlOutcome) -> Result<()> {
        println!("{}\n", self.formatter.format_outcome(outcome));
        Ok(())
    }
}

/// Prints the run summary.
pub struct StdoutReportSink {
    formatter: Formatter,
}

impl StdoutReportSink {
    pub fn new(format: OutputFormat) -> Self {
        Self { formatter: Formatter::new(format) }
    }
}

#[async_trait]
impl ReportSink for StdoutReportSink {
    async fn report(&self, summary: &RunSummary) -> Result<()> {
        println!("{}", self.formatter.format_summary(summary));
        Ok(())
    }
}

/// Collects outcomes and summaries in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    outcomes: Mutex<Vec<CrawlOutcome>>,
    summaries: Mutex<Vec<RunSummary>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<CrawlOutcome> {
        self.outcomes.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn summaries(&self) -> Vec<RunSummary> {
        self.summaries.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl OutcomeSink for MemorySink {
    async fn persist(&self, outcome: &CrawlOutcome) -> Result<()> {
        self.outcomes.lock().map_err(|_| anyhow!("outcome store poisoned"))?.push(outcome.clone());
        Ok(())
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn report(&self, summary: &RunSummary) -> Result<()> {
        self.summaries.lock().map_err(|_| anyhow!("summary store poisoned"))?.push(summary.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = RunSummary::default();
        summary.record_success("Dell XPS 13");
        summary.record_failure("Unbranded Widget", "no storefronts answered");
        summary.duration_ms = 1500;

        assert_eq!(summary.total(), 2);
        assert_eq!(summary.duration(), Duration::from_millis(1500));
        assert_eq!(summary.failures[0].error, "no storefronts answered");
    }

    #[tokio::test]
    async fn test_memory_sink_collects() {
        let sink = MemorySink::new();
        let mut summary = RunSummary::default();
        summary.record_success("COSRX Snail Mucin");

        sink.report(&summary).await.unwrap();
        assert_eq!(sink.summaries(), vec![summary]);
        assert!(sink.outcomes().is_empty());
    }
}
