//! HTTP page backend using wreq for TLS fingerprint emulation.
//!
//! Pages are plain GET requests: the "DOM" is the server-rendered HTML, with
//! no script execution. Cheap, and good enough for storefronts that render
//! search results server-side.

use super::{BrowserError, BrowserPage, BrowserProvider, Fingerprint};
use crate::config::Config;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, trace, warn};
use wreq::Client;
use wreq_util::Emulation;

/// Browser provider backed by a shared cookie-keeping HTTP client.
pub struct HttpBrowser {
    client: Client,
}

impl HttpBrowser {
    /// Creates a provider with the given configuration.
    pub fn new(config: &Config) -> Result<Self, BrowserError> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .timeout(Duration::from_secs(config.navigation_timeout_secs))
            .connect_timeout(Duration::from_secs(10));

        // Configure proxy if specified
        if let Some(proxy_url) = &config.proxy {
            debug!("Configuring proxy: {}", proxy_url);
            let proxy = wreq::Proxy::all(proxy_url)
                .map_err(|e| BrowserError::Unavailable(format!("invalid proxy {}: {}", proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BrowserProvider for HttpBrowser {
    async fn open_page(&self) -> Result<Box<dyn BrowserPage>, BrowserError> {
        Ok(Box::new(HttpPage { client: self.client.clone(), fingerprint: None, body: None }))
    }
}

struct HttpPage {
    client: Client,
    fingerprint: Option<Fingerprint>,
    body: Option<String>,
}

#[async_trait]
impl BrowserPage for HttpPage {
    async fn configure(&mut self, fingerprint: &Fingerprint) -> Result<(), BrowserError> {
        self.fingerprint = Some(fingerprint.clone());
        Ok(())
    }

    async fn move_pointer(&mut self, x: u32, y: u32) -> Result<(), BrowserError> {
        trace!("Pointer move to ({}, {}) ignored by HTTP backend", x, y);
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        debug!("GET {}", url);

        let mut request = self.client.get(url).emulation(Emulation::Chrome131);
        if let Some(fp) = &self.fingerprint {
            request = request.header("User-Agent", fp.user_agent.as_str());
            for (name, value) in &fp.headers {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        let response = request
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "none")
            .header("Sec-Fetch-User", "?1")
            .header("Upgrade-Insecure-Requests", "1")
            .send()
            .await
            .map_err(|e| BrowserError::Http(e.without_uri()))?;

        let status = response.status();
        debug!("Response status: {}", status);

        if status == 429 || status == 503 {
            warn!("Rate limited ({}) at {}", status, url);
            return Err(BrowserError::RateLimited { url: url.to_string(), status: status.as_u16() });
        }

        if !status.is_success() {
            return Err(BrowserError::Status { url: url.to_string(), status: status.as_u16() });
        }

        self.body = Some(response.text().await.map_err(|e| BrowserError::Http(e.without_uri()))?);
        Ok(())
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        self.body.clone().ok_or_else(|| BrowserError::Page("no document loaded".to_string()))
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.body = None;
        Ok(())
    }
}
