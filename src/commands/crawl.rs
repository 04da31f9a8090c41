//! Crawl command implementation.

use crate::browser::{self, BrowserProvider};
use crate::config::Config;
use crate::fetcher::{PageFetcher, ProductQuery};
use crate::orchestrator::{CrawlError, CrawlOrchestrator, CrawlOutcome};
use crate::recovery::{
    CompositeEscalation, ErrorContext, ErrorSink, EscalationSink, JsonlErrorLog, LogEscalation,
    MemoryErrorLog, Recovery, RetryPolicy, WebhookEscalation,
};
use crate::router::CategoryRouter;
use crate::sinks::{OutcomeSink, ReportSink, RunSummary, StdoutOutcomeSink, StdoutReportSink};
use crate::sites::SiteRegistry;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Reads product names from a file, one per line. Blank lines and `#`
/// comments are skipped.
pub fn read_products_file(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read products file: {}", path.display()))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Crawls a list of products one after another.
pub struct CrawlCommand {
    config: Config,
}

impl CrawlCommand {
    /// Creates a new crawl command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Crawls with the configured backend, printing outcomes and the summary.
    pub async fn execute(&self, names: &[String], cancel: &CancellationToken) -> Result<RunSummary> {
        let provider = browser::provider_for(&self.config)?;
        let outcomes = StdoutOutcomeSink::new(self.config.format);
        let reports = StdoutReportSink::new(self.config.format);

        self.execute_with_provider(provider, &outcomes, &reports, names, cancel).await
    }

    /// Crawls with a provided browser and sinks (for testing).
    pub async fn execute_with_provider(
        &self,
        provider: Arc<dyn BrowserProvider>,
        outcomes: &dyn OutcomeSink,
        reports: &dyn ReportSink,
        names: &[String],
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let orchestrator = self.build_orchestrator(provider)?;
        let product_delay = Duration::from_millis(self.config.product_delay_ms);

        let started = Instant::now();
        let mut summary = RunSummary::default();
        let mut fatal = None;

        let queries: Vec<ProductQuery> = names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(ProductQuery::new)
            .collect();

        info!("Crawling {} product(s)", queries.len());

        for (index, query) in queries.iter().enumerate() {
            if index > 0 && !product_delay.is_zero() {
                debug!("Waiting {}ms before next product", product_delay.as_millis());
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(product_delay) => {}
                }
            }
            if cancel.is_cancelled() {
                warn!("Run cancelled; {} product(s) not crawled", queries.len() - index);
                break;
            }

            match self.crawl_product(&orchestrator, query, cancel).await {
                Ok(outcome) => {
                    self.persist_outcome(&orchestrator, outcomes, &outcome, cancel).await;

                    if outcome.is_success() {
                        summary.record_success(&query.name);
                    } else {
                        summary.record_failure(&query.name, outcome.failure_summary());
                    }
                }
                Err(e) => {
                    error!("Aborting run: {}", e);
                    summary.record_failure(&query.name, e.to_string());
                    fatal = Some(e);
                    break;
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        summary.cancelled = cancel.is_cancelled();
        info!(
            succeeded = summary.successes.len(),
            failed = summary.failures.len(),
            "Run finished in {:.1}s",
            summary.duration().as_secs_f64()
        );

        if let Err(e) = reports.report(&summary).await {
            warn!("Failed to deliver run summary: {:#}", e);
        }

        match fatal {
            Some(e) => Err(e).context("Browser session could not be acquired"),
            None => Ok(summary),
        }
    }

    /// Crawls one product, re-attempting while the retry policy allows.
    pub async fn crawl_product(
        &self,
        orchestrator: &CrawlOrchestrator,
        query: &ProductQuery,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutcome, CrawlError> {
        let mut retry_count = 0;
        loop {
            let outcome = orchestrator.crawl_attempt(query, retry_count, cancel).await?;

            let Some(delay) = outcome.retry_after() else {
                return Ok(outcome);
            };

            retry_count += 1;
            info!(
                delay_ms = delay.as_millis() as u64,
                "Retrying '{}' (attempt {}/{})",
                query.name,
                retry_count,
                orchestrator.recovery().policy().max_retries
            );

            tokio::select! {
                _ = cancel.cancelled() => return Ok(outcome),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Hands `outcome` to the sink, re-trying while the recovery policy allows.
    /// A failure that is not retried leaves the outcome unpersisted.
    async fn persist_outcome(
        &self,
        orchestrator: &CrawlOrchestrator,
        outcomes: &dyn OutcomeSink,
        outcome: &CrawlOutcome,
        cancel: &CancellationToken,
    ) {
        let mut context = ErrorContext::new("persist").with_product(&outcome.product_name);
        loop {
            let Err(e) = outcomes.persist(outcome).await else {
                return;
            };
            let decision = orchestrator.recovery().handle(&format!("{:#}", e), None, context.clone()).await;
            let Some(delay) = decision.backoff() else {
                warn!("Outcome for '{}' was not persisted: {:#}", outcome.product_name, e);
                return;
            };

            debug!(delay_ms = delay.as_millis() as u64, "Retrying persist for '{}'", outcome.product_name);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            context = context.next_attempt();
        }
    }

    /// Wires the orchestrator from configuration.
    pub fn build_orchestrator(&self, provider: Arc<dyn BrowserProvider>) -> Result<CrawlOrchestrator> {
        let router = CategoryRouter::new().with_extra_keywords(
            &self.config.extra_cosmetic_keywords,
            &self.config.extra_electronics_keywords,
        );

        let log: Arc<dyn ErrorSink> = match &self.config.error_log {
            Some(path) => {
                debug!("Error log: {}", path.display());
                Arc::new(JsonlErrorLog::new(path))
            }
            None => Arc::new(MemoryErrorLog::new()),
        };

        let mut escalations: Vec<Box<dyn EscalationSink>> = vec![Box::new(LogEscalation)];
        if let Some(url) = &self.config.alert_webhook {
            escalations.push(Box::new(WebhookEscalation::new(url.as_str())?));
        }

        let recovery = Recovery::new(
            RetryPolicy::from_config(&self.config),
            log,
            Arc::new(CompositeEscalation::new(escalations)),
        );

        Ok(CrawlOrchestrator::new(
            SiteRegistry::builtin(),
            router,
            PageFetcher::new(provider, &self.config),
            recovery,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::FixtureBrowser;
    use crate::sinks::MemorySink;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::NamedTempFile;

    const AMAZON_PAGE: &str =
        r#"<html><body><div class="a-price"><span class="a-offscreen">$199.99</span></div></body></html>"#;

    fn make_test_config() -> Config {
        Config { jitter_seed: Some(5), ..Config::without_delays() }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_crawl_command_basic() {
        let browser = FixtureBrowser::new().with_page("amazon", AMAZON_PAGE);
        let sink = MemorySink::new();
        let cmd = CrawlCommand::new(make_test_config());

        let summary = cmd
            .execute_with_provider(
                Arc::new(browser.clone()),
                &sink,
                &sink,
                &names(&["Dell XPS 13"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(summary.successes, vec!["Dell XPS 13"]);
        assert!(summary.failures.is_empty());
        assert!(!summary.cancelled);

        let outcomes = sink.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].prices["amazon_us"].price, "$199.99");
        assert_eq!(sink.summaries().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_until_cap() {
        // No fixtures: every navigation fails with ENOTFOUND.
        let browser = FixtureBrowser::new();
        let sink = MemorySink::new();
        let cmd = CrawlCommand::new(make_test_config());

        let summary = cmd
            .execute_with_provider(
                Arc::new(browser.clone()),
                &sink,
                &sink,
                &names(&["Dell XPS 13"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].error.contains("ENOTFOUND"));

        // First attempt plus three retries, four US storefronts each.
        assert_eq!(browser.stats().opened(), 16);
        let outcomes = sink.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].retry_count, 3);
    }

    #[tokio::test]
    async fn test_flaky_product_recovers_on_retry() {
        // Two navigations fail per visit; with one navigation attempt per
        // visit the first two crawls fail and the third succeeds.
        let browser = FixtureBrowser::new()
            .with_page("amazon", AMAZON_PAGE)
            .with_flaky_navigation("amazon", 2, "net::ERR_CONNECTION_RESET (ECONNRESET)");
        let sink = MemorySink::new();
        let config = Config { navigation_attempts: 1, ..make_test_config() };
        let cmd = CrawlCommand::new(config);

        let summary = cmd
            .execute_with_provider(Arc::new(browser), &sink, &sink, &names(&["Dell XPS 13"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.successes, vec!["Dell XPS 13"]);
        assert_eq!(sink.outcomes()[0].retry_count, 2);
    }

    #[tokio::test]
    async fn test_terminal_failures_are_not_retried() {
        let browser = FixtureBrowser::new()
            .with_page("amazon", "<html></html>")
            .with_page("bestbuy", "<html></html>")
            .with_page("newegg", "<html></html>")
            .with_page("walmart", "<html></html>");
        let sink = MemorySink::new();
        let cmd = CrawlCommand::new(make_test_config());

        let summary = cmd
            .execute_with_provider(
                Arc::new(browser.clone()),
                &sink,
                &sink,
                &names(&["Dell XPS 13"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].error.contains("no price found on amazon"));
        assert_eq!(browser.stats().opened(), 4);
    }

    #[tokio::test]
    async fn test_session_failure_aborts_run() {
        let browser = FixtureBrowser::new().with_open_failure("chrome crashed");
        let sink = MemorySink::new();
        let cmd = CrawlCommand::new(make_test_config());

        let result = cmd
            .execute_with_provider(
                Arc::new(browser),
                &sink,
                &sink,
                &names(&["Dell XPS 13", "COSRX Snail Mucin"]),
                &CancellationToken::new(),
            )
            .await;

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("chrome crashed"));

        // The summary is still reported, covering only the aborted product.
        let summaries = sink.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].failures.len(), 1);
        assert_eq!(summaries[0].failures[0].name, "Dell XPS 13");
        assert!(sink.outcomes().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_products() {
        let browser = FixtureBrowser::new().with_page("amazon", AMAZON_PAGE);
        let sink = MemorySink::new();
        let cmd = CrawlCommand::new(make_test_config());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = cmd
            .execute_with_provider(Arc::new(browser.clone()), &sink, &sink, &names(&["Dell XPS 13"]), &cancel)
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.total(), 0);
        assert_eq!(browser.stats().opened(), 0);
    }

    #[tokio::test]
    async fn test_blank_names_skipped() {
        let browser = FixtureBrowser::new().with_page("amazon", AMAZON_PAGE);
        let sink = MemorySink::new();
        let cmd = CrawlCommand::new(make_test_config());

        let summary = cmd
            .execute_with_provider(
                Arc::new(browser),
                &sink,
                &sink,
                &names(&["  ", "Dell XPS 13  ", ""]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(summary.successes, vec!["Dell XPS 13"]);
    }

    #[tokio::test]
    async fn test_error_log_file_written() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("errors.jsonl");
        let config = Config { error_log: Some(log_path.clone()), max_retries: 0, ..make_test_config() };
        let sink = MemorySink::new();

        CrawlCommand::new(config)
            .execute_with_provider(
                Arc::new(FixtureBrowser::new()),
                &sink,
                &sink,
                &names(&["COSRX Snail Mucin"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let entries = JsonlErrorLog::new(&log_path).read_all().await.unwrap();
        assert_eq!(entries.len(), 4);
        assert!(entries.iter().all(|e| e.context.product.as_deref() == Some("COSRX Snail Mucin")));
        assert!(entries[0].stack.as_deref().unwrap_or_default().contains("ENOTFOUND"));
    }

    struct FlakySink {
        failures_left: AtomicU32,
        attempts: AtomicU32,
        message: &'static str,
        inner: MemorySink,
    }

    impl FlakySink {
        fn new(failures: u32, message: &'static str) -> Self {
            Self { failures_left: AtomicU32::new(failures), attempts: AtomicU32::new(0), message, inner: MemorySink::new() }
        }
    }

    #[async_trait]
    impl OutcomeSink for FlakySink {
        async fn persist(&self, outcome: &CrawlOutcome) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                bail!("{}", self.message);
            }
            self.inner.persist(outcome).await
        }
    }

    #[tokio::test]
    async fn test_transient_persist_failure_is_retried() {
        let browser = FixtureBrowser::new().with_page("amazon", AMAZON_PAGE);
        let sink = FlakySink::new(2, "write ECONNRESET");
        let reports = MemorySink::new();

        let summary = CrawlCommand::new(make_test_config())
            .execute_with_provider(Arc::new(browser), &sink, &reports, &names(&["Dell XPS 13"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.successes, vec!["Dell XPS 13"]);
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(sink.inner.outcomes().len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_persist_failure_is_not_retried() {
        let browser = FixtureBrowser::new().with_page("amazon", AMAZON_PAGE);
        let sink = FlakySink::new(5, "document rejected: invalid field");
        let reports = MemorySink::new();

        let summary = CrawlCommand::new(make_test_config())
            .execute_with_provider(Arc::new(browser), &sink, &reports, &names(&["Dell XPS 13"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.successes, vec!["Dell XPS 13"]);
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);
        assert!(sink.inner.outcomes().is_empty());
    }

    fn cancel_after(cancel: &CancellationToken, delay: Duration) {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            cancel.cancel();
        });
    }

    #[tokio::test]
    async fn test_cancel_interrupts_product_delay() {
        let browser = FixtureBrowser::new().with_page("amazon", AMAZON_PAGE);
        let sink = MemorySink::new();
        let config = Config { product_delay_ms: 60_000, ..make_test_config() };
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(100));

        let started = Instant::now();
        let summary = CrawlCommand::new(config)
            .execute_with_provider(
                Arc::new(browser.clone()),
                &sink,
                &sink,
                &names(&["Dell XPS 13", "Dell XPS 15"]),
                &cancel,
            )
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(summary.cancelled);
        assert_eq!(summary.successes, vec!["Dell XPS 13"]);
        assert_eq!(browser.stats().opened(), 4);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_retry_backoff() {
        // Every navigation fails transiently, so the product waits on backoff.
        let browser = FixtureBrowser::new();
        let sink = MemorySink::new();
        let config = Config { backoff_base_ms: 60_000, ..make_test_config() };
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(100));

        let started = Instant::now();
        let summary = CrawlCommand::new(config)
            .execute_with_provider(Arc::new(browser.clone()), &sink, &sink, &names(&["Dell XPS 13"]), &cancel)
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(summary.cancelled);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(sink.outcomes()[0].retry_count, 0);
        assert_eq!(browser.stats().opened(), 4);
    }

    #[test]
    fn test_read_products_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# weekly list\nDell XPS 13\n\n  Laneige Lip Sleeping Mask  \n").unwrap();

        let products = read_products_file(file.path()).unwrap();
        assert_eq!(products, vec!["Dell XPS 13", "Laneige Lip Sleeping Mask"]);
    }

    #[test]
    fn test_read_products_file_missing() {
        let err = read_products_file("/nonexistent/products.txt").unwrap_err();
        assert!(err.to_string().contains("Failed to read products file"));
    }
}
