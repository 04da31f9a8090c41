//! Crawls one product across the storefronts of its region(s).

use crate::fetcher::{FetchError, PageFetcher, ProductQuery};
use crate::recovery::{ErrorContext, Recovery, RecoveryDecision};
use crate::router::{CategoryRouter, ProductCategory};
use crate::sites::{Region, SiteRegistry, StorefrontTarget};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Errors that abort a crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("browser session unavailable while visiting {target}: {source}")]
    SessionUnavailable {
        target: String,
        #[source]
        source: FetchError,
    },
}

/// A price found on one storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub source_key: String,
    pub price: String,
    pub category: Option<String>,
    pub title: Option<String>,
}

/// Why a storefront produced no price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Navigation,
    Document,
    NoPrice,
}

/// A storefront visit that produced no price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlFailure {
    pub target: String,
    pub source_key: String,
    pub region: Region,
    pub kind: FailureKind,
    pub reason: String,
    pub decision: RecoveryDecision,
}

/// Result of crawling one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlOutcome {
    pub product_name: String,
    pub category: ProductCategory,
    /// Product-level retry this outcome came from, 0 for the first attempt.
    pub retry_count: u32,
    pub prices: BTreeMap<String, PriceRecord>,
    pub attempted: Vec<String>,
    pub failures: Vec<CrawlFailure>,
    pub cancelled: bool,
}

impl CrawlOutcome {
    fn new(product_name: &str, category: ProductCategory, retry_count: u32) -> Self {
        Self {
            product_name: product_name.to_string(),
            category,
            retry_count,
            prices: BTreeMap::new(),
            attempted: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
        }
    }

    /// True if at least one storefront yielded a price.
    pub fn is_success(&self) -> bool {
        !self.prices.is_empty()
    }

    /// Backoff before re-crawling, if the outcome found nothing and some
    /// failure is worth retrying.
    pub fn retry_after(&self) -> Option<Duration> {
        if self.is_success() || self.cancelled {
            return None;
        }
        self.failures.iter().filter_map(|f| f.decision.retry.then(|| f.decision.backoff())).flatten().max()
    }

    /// One-line description of every failure.
    pub fn failure_summary(&self) -> String {
        if self.failures.is_empty() {
            return "no storefronts for this product".to_string();
        }
        self.failures.iter().map(|f| format!("{}: {}", f.source_key, f.reason)).collect::<Vec<_>>().join("; ")
    }
}

/// Routes a product to storefronts and visits each in turn.
pub struct CrawlOrchestrator {
    registry: Arc<SiteRegistry>,
    router: CategoryRouter,
    fetcher: PageFetcher,
    recovery: Recovery,
}

impl CrawlOrchestrator {
    pub fn new(registry: Arc<SiteRegistry>, router: CategoryRouter, fetcher: PageFetcher, recovery: Recovery) -> Self {
        Self { registry, router, fetcher, recovery }
    }

    pub fn router(&self) -> &CategoryRouter {
        &self.router
    }

    pub fn recovery(&self) -> &Recovery {
        &self.recovery
    }

    /// Crawls `query` as a first attempt.
    pub async fn crawl(&self, query: &ProductQuery, cancel: &CancellationToken) -> Result<CrawlOutcome, CrawlError> {
        self.crawl_attempt(query, 0, cancel).await
    }

    /// Crawls `query` with `retry_count` recorded in every failure context.
    ///
    /// Storefronts are visited one at a time. Cancellation is honoured between
    /// visits and keeps prices already found. Only a failure to open a page
    /// aborts the crawl.
    pub async fn crawl_attempt(
        &self,
        query: &ProductQuery,
        retry_count: u32,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutcome, CrawlError> {
        let category = self.router.classify(&query.name);
        let targets: Vec<Arc<StorefrontTarget>> =
            category.regions().iter().flat_map(|region| self.registry.targets_for(*region)).collect();

        info!(
            product = %query.name,
            %category,
            retry_count,
            "Crawling {} storefront(s)",
            targets.len()
        );

        let mut outcome = CrawlOutcome::new(&query.name, category, retry_count);

        for target in targets {
            if cancel.is_cancelled() {
                warn!("Crawl of '{}' cancelled after {} storefront(s)", query.name, outcome.attempted.len());
                outcome.cancelled = true;
                break;
            }

            let source_key = target.source_key();
            outcome.attempted.push(source_key.clone());

            let context = ErrorContext::new("crawl")
                .with_product(&query.name)
                .with_target(&source_key)
                .with_url(target.search_url(&query.name))
                .with_retry_count(retry_count);

            let (kind, reason, decision) = match self.fetcher.fetch(&target, query).await {
                Ok(result) => match result.price {
                    Some(price) => {
                        info!("{}: {}", source_key, price);
                        let record = PriceRecord {
                            source_key: source_key.clone(),
                            price,
                            category: result.category,
                            title: result.title,
                        };
                        outcome.prices.insert(source_key, record);
                        continue;
                    }
                    None => {
                        let reason = format!("no price found on {}", target.id);
                        let decision = self.recovery.handle(&reason, None, context).await;
                        (FailureKind::NoPrice, reason, decision)
                    }
                },
                Err(e) if e.is_fatal() => {
                    let context = ErrorContext { operation: "open_page".to_string(), ..context };
                    self.recovery.record_error(&e, context).await;
                    return Err(CrawlError::SessionUnavailable { target: source_key, source: e });
                }
                Err(e) => {
                    let kind = match &e {
                        FetchError::DocumentUnavailable { .. } => FailureKind::Document,
                        _ => FailureKind::Navigation,
                    };
                    let decision = self.recovery.handle_error(&e, context).await;
                    (kind, e.to_string(), decision)
                }
            };

            warn!("{} failed: {}", source_key, reason);
            outcome.failures.push(CrawlFailure {
                target: target.id.clone(),
                source_key,
                region: target.region,
                kind,
                reason,
                decision,
            });
        }

        info!(
            product = %query.name,
            found = outcome.prices.len(),
            failed = outcome.failures.len(),
            "Crawl finished"
        );
        Ok(outcome)
    }
}
