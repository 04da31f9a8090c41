//! Headless Chrome backend (enable with `--features chrome`).
//!
//! headless_chrome is synchronous, so every DevTools call runs on the blocking
//! pool. One browser process is shared; each page is a fresh tab.

use super::{BrowserError, BrowserPage, BrowserProvider, Fingerprint};
use crate::config::Config;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Browser provider backed by a single headless Chrome process.
pub struct ChromeBrowser {
    browser: Arc<Browser>,
    navigation_timeout: Duration,
}

impl ChromeBrowser {
    /// Launches Chrome with the configured viewport and executable.
    pub fn launch(config: &Config) -> Result<Self, BrowserError> {
        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-gpu"),
            OsStr::new("--disable-extensions"),
            OsStr::new("--disable-blink-features=AutomationControlled"),
        ];
        let proxy_arg = config.proxy.as_ref().map(|p| format!("--proxy-server={}", p));
        if let Some(arg) = &proxy_arg {
            args.push(OsStr::new(arg.as_str()));
        }

        let mut launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .window_size(Some(config.viewport()))
            .idle_browser_timeout(Duration::from_secs(config.navigation_timeout_secs.saturating_mul(2)))
            .args(args)
            .build()
            .map_err(|e| BrowserError::Unavailable(format!("invalid launch options: {}", e)))?;

        if let Some(path) = &config.chrome_path {
            launch_options.path = Some(path.clone());
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| BrowserError::Unavailable(format!("failed to launch chrome: {}", e)))?;
        info!("Launched headless Chrome");

        Ok(Self { browser: Arc::new(browser), navigation_timeout: Duration::from_secs(config.navigation_timeout_secs) })
    }
}

async fn blocking<T, F>(call: F) -> Result<T, BrowserError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, BrowserError> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| BrowserError::Page(format!("devtools task failed: {}", e)))?
}

#[async_trait]
impl BrowserProvider for ChromeBrowser {
    async fn open_page(&self) -> Result<Box<dyn BrowserPage>, BrowserError> {
        let browser = Arc::clone(&self.browser);
        let timeout = self.navigation_timeout;
        let tab = blocking(move || {
            let tab = browser
                .new_tab()
                .map_err(|e| BrowserError::Unavailable(format!("failed to open tab: {}", e)))?;
            tab.set_default_timeout(timeout);
            Ok(tab)
        })
        .await?;

        Ok(Box::new(ChromePage { tab }))
    }
}

struct ChromePage {
    tab: Arc<Tab>,
}

#[async_trait]
impl BrowserPage for ChromePage {
    async fn configure(&mut self, fingerprint: &Fingerprint) -> Result<(), BrowserError> {
        let tab = Arc::clone(&self.tab);
        let fp = fingerprint.clone();
        blocking(move || {
            tab.set_user_agent(&fp.user_agent, fp.header("Accept-Language"), None)
                .map_err(|e| BrowserError::Page(format!("failed to set user agent: {}", e)))?;

            let headers: HashMap<&str, &str> =
                fp.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            tab.set_extra_http_headers(headers)
                .map_err(|e| BrowserError::Page(format!("failed to set headers: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn move_pointer(&mut self, x: u32, y: u32) -> Result<(), BrowserError> {
        let tab = Arc::clone(&self.tab);
        let script = format!(
            "document.dispatchEvent(new MouseEvent('mousemove', {{ clientX: {}, clientY: {}, bubbles: true }}))",
            x, y
        );
        blocking(move || {
            tab.evaluate(&script, false)
                .map_err(|e| BrowserError::Page(format!("pointer move failed: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        debug!("Chrome navigating to {}", url);
        let tab = Arc::clone(&self.tab);
        let target = url.to_string();
        blocking(move || {
            tab.navigate_to(&target)
                .and_then(|tab| tab.wait_until_navigated())
                .map_err(|e| BrowserError::Navigation { url: target.clone(), message: e.to_string() })?;
            Ok(())
        })
        .await
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        let tab = Arc::clone(&self.tab);
        blocking(move || tab.get_content().map_err(|e| BrowserError::Page(format!("failed to read DOM: {}", e))))
            .await
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        let tab = Arc::clone(&self.tab);
        blocking(move || {
            tab.close(true).map_err(|e| BrowserError::Page(format!("failed to close tab: {}", e)))?;
            Ok(())
        })
        .await
    }
}
