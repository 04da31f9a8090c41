//! Browser automation capability used by the page fetcher.
//!
//! The crawler only needs to open a page, configure it, navigate, read the
//! loaded DOM, and close it. Backends:
//!
//! - [`HttpBrowser`]: TLS-fingerprint-emulating HTTP client, static DOM only
//! - [`FixtureBrowser`]: deterministic DOM fixtures for tests and dry runs
//! - `ChromeBrowser`: headless Chrome (requires the `chrome` feature)

#[cfg(feature = "chrome")]
pub mod chrome;
pub mod fixture;
pub mod http;

#[cfg(feature = "chrome")]
pub use chrome::ChromeBrowser;
pub use fixture::{FixtureBrowser, FixtureStats};
pub use http::HttpBrowser;

use crate::config::{BrowserBackend, Config};
use anyhow::{bail, Context};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors raised by a browser backend.
///
/// Messages describe the cause only. The URL is kept as a field so that a
/// product name inside a search URL never reaches error classification.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser unavailable: {0}")]
    Unavailable(String),

    #[error("navigation failed: {message}")]
    Navigation { url: String, message: String },

    #[error("navigation timeout after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("rate limit hit (HTTP {status})")]
    RateLimited { url: String, status: u16 },

    #[error("HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("page error: {0}")]
    Page(String),

    #[error("network error: {0}")]
    Http(#[from] wreq::Error),
}

/// Client fingerprint applied to every page before navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub headers: Vec<(String, String)>,
}

impl Fingerprint {
    /// Builds the standard desktop fingerprint with region-specific language.
    pub fn desktop(user_agent: &str, viewport: (u32, u32), accept_language: &str) -> Self {
        let headers = [
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"),
            ("Accept-Language", accept_language),
            ("Accept-Encoding", "gzip, deflate, br"),
            ("Cache-Control", "no-cache"),
            ("Pragma", "no-cache"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self { user_agent: user_agent.to_string(), viewport, headers }
    }

    /// Looks up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }
}

/// Opens pages. Implementations are shared across crawl runs.
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    /// Acquires a fresh page. Failing here means the browser is unavailable.
    async fn open_page(&self) -> Result<Box<dyn BrowserPage>, BrowserError>;
}

/// One exclusively owned page. Callers must `close` it exactly once.
#[async_trait]
pub trait BrowserPage: Send {
    /// Applies user agent, viewport, and extra headers.
    async fn configure(&mut self, fingerprint: &Fingerprint) -> Result<(), BrowserError>;

    /// Moves the pointer to viewport coordinates.
    async fn move_pointer(&mut self, x: u32, y: u32) -> Result<(), BrowserError>;

    /// Navigates and waits until the network is idle.
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Returns the serialized DOM of the loaded document.
    async fn content(&mut self) -> Result<String, BrowserError>;

    /// Releases the page.
    async fn close(&mut self) -> Result<(), BrowserError>;
}

/// Builds the provider selected by `config.backend`.
pub fn provider_for(config: &Config) -> anyhow::Result<Arc<dyn BrowserProvider>> {
    debug!("Using {} backend", config.backend);
    match config.backend {
        BrowserBackend::Http => {
            let browser = HttpBrowser::new(config).context("Failed to create HTTP client")?;
            Ok(Arc::new(browser))
        }
        BrowserBackend::Fixture => {
            let Some(dir) = &config.fixture_dir else {
                bail!("The fixture backend needs `fixture_dir` in the config file");
            };
            Ok(Arc::new(FixtureBrowser::from_dir(dir)?))
        }
        #[cfg(feature = "chrome")]
        BrowserBackend::Chrome => {
            let browser = ChromeBrowser::launch(config).context("Failed to launch Chrome")?;
            Ok(Arc::new(browser))
        }
        #[cfg(not(feature = "chrome"))]
        BrowserBackend::Chrome => {
            bail!("The chrome backend is not compiled in; rebuild with `--features chrome`")
        }
    }
}
