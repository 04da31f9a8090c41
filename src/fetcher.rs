//! One storefront visit: open a page, look human, navigate, extract, close.

use crate::browser::{BrowserError, BrowserPage, BrowserProvider, Fingerprint};
use crate::config::{Config, JitterRange};
use crate::extract::{ExtractionPipeline, ExtractionResult};
use crate::sites::StorefrontTarget;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Immutable input to one crawl run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductQuery {
    pub name: String,
}

impl ProductQuery {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Errors from a single storefront visit.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Every navigation attempt failed. Recorded, not fatal.
    #[error("navigation failed after {attempts} attempt(s): {source}")]
    NavigationFailed {
        url: String,
        attempts: u32,
        #[source]
        source: BrowserError,
    },

    /// No page could be opened. Fatal for the crawl.
    #[error("could not acquire a browser page: {0}")]
    SessionAcquisitionFailed(#[source] BrowserError),

    /// The page loaded but its DOM could not be read. Recorded, not fatal.
    #[error("could not read page: {source}")]
    DocumentUnavailable {
        url: String,
        #[source]
        source: BrowserError,
    },
}

impl FetchError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::SessionAcquisitionFailed(_))
    }
}

/// Timing and fingerprint parameters for page visits.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub pre_navigation_delay: JitterRange,
    pub settle_delay: JitterRange,
    pub pointer_moves: u32,
    pub navigation_attempts: u32,
    pub navigation_timeout: Duration,
    pub navigation_retry_delay: Duration,
    pub user_agent: String,
    pub viewport: (u32, u32),
}

impl FetchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pre_navigation_delay: config.pre_navigation_delay,
            settle_delay: config.settle_delay,
            pointer_moves: config.pointer_moves,
            navigation_attempts: config.navigation_attempts,
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
            navigation_retry_delay: Duration::from_millis(config.navigation_retry_delay_ms),
            user_agent: config.user_agent.clone(),
            viewport: config.viewport(),
        }
    }
}

/// Seedable source of human-like randomness.
#[derive(Debug)]
pub struct Jitter {
    rng: Mutex<StdRng>,
}

impl Jitter {
    /// A fixed seed makes every delay and pointer position reproducible.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng: Mutex::new(rng) }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut rng)
    }

    /// Picks a delay in `[min_ms, max_ms)`; an empty range yields `min_ms`.
    pub fn delay(&self, range: JitterRange) -> Duration {
        if range.max_ms <= range.min_ms {
            return Duration::from_millis(range.min_ms);
        }
        Duration::from_millis(self.with_rng(|rng| rng.random_range(range.min_ms..range.max_ms)))
    }

    /// Picks a point inside the viewport.
    pub fn point(&self, viewport: (u32, u32)) -> (u32, u32) {
        let (width, height) = (viewport.0.max(1), viewport.1.max(1));
        self.with_rng(|rng| (rng.random_range(0..width), rng.random_range(0..height)))
    }
}

/// Drives one page per storefront visit.
pub struct PageFetcher {
    provider: Arc<dyn BrowserProvider>,
    settings: FetchSettings,
    jitter: Jitter,
}

impl PageFetcher {
    pub fn new(provider: Arc<dyn BrowserProvider>, config: &Config) -> Self {
        Self::with_settings(provider, FetchSettings::from_config(config), config.jitter_seed)
    }

    pub fn with_settings(provider: Arc<dyn BrowserProvider>, settings: FetchSettings, seed: Option<u64>) -> Self {
        Self { provider, settings, jitter: Jitter::new(seed) }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Visits `target`'s search page for `query` and extracts from it.
    ///
    /// The page is closed exactly once whether the visit succeeds or not.
    pub async fn fetch(&self, target: &StorefrontTarget, query: &ProductQuery) -> Result<ExtractionResult, FetchError> {
        let url = target.search_url(&query.name);
        info!("Fetching {} for '{}'", target.source_key(), query.name);

        let mut page = self.provider.open_page().await.map_err(FetchError::SessionAcquisitionFailed)?;

        let result = self.visit(page.as_mut(), target, &url).await;

        if let Err(e) = page.close().await {
            warn!("Failed to close page for {}: {}", target.id, e);
        }

        result
    }

    async fn visit(
        &self,
        page: &mut dyn BrowserPage,
        target: &StorefrontTarget,
        url: &str,
    ) -> Result<ExtractionResult, FetchError> {
        let fingerprint =
            Fingerprint::desktop(&self.settings.user_agent, self.settings.viewport, target.region.accept_language());
        if let Err(e) = page.configure(&fingerprint).await {
            warn!("Could not apply fingerprint on {}: {}", target.id, e);
        }

        self.pause(self.settings.pre_navigation_delay).await;
        self.wiggle_pointer(page).await;

        self.navigate(page, url).await?;

        self.pause(self.settings.settle_delay).await;

        let html = page
            .content()
            .await
            .map_err(|source| FetchError::DocumentUnavailable { url: url.to_string(), source })?;

        Ok(ExtractionPipeline::new(target).extract_html(&html))
    }

    async fn pause(&self, range: JitterRange) {
        let delay = self.jitter.delay(range);
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "Sleeping");
            tokio::time::sleep(delay).await;
        }
    }

    async fn wiggle_pointer(&self, page: &mut dyn BrowserPage) {
        for _ in 0..self.settings.pointer_moves {
            let (x, y) = self.jitter.point(self.settings.viewport);
            if let Err(e) = page.move_pointer(x, y).await {
                debug!("Pointer move failed: {}", e);
                break;
            }
        }
    }

    async fn navigate(&self, page: &mut dyn BrowserPage, url: &str) -> Result<(), FetchError> {
        let attempts = self.settings.navigation_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match tokio::time::timeout(self.settings.navigation_timeout, page.navigate(url)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => e,
                Err(_) => BrowserError::Timeout(self.settings.navigation_timeout),
            };
            warn!(attempt, attempts, "Navigation to {} failed: {}", url, error);

            if attempt >= attempts {
                return Err(FetchError::NavigationFailed { url: url.to_string(), attempts, source: error });
            }
            attempt += 1;

            if !self.settings.navigation_retry_delay.is_zero() {
                tokio::time::sleep(self.settings.navigation_retry_delay).await;
            }
        }
    }
}
