//! Deterministic page backend serving canned DOM snapshots.
//!
//! A fixture is keyed by a URL substring; the first fixture whose key occurs
//! in the navigated URL answers. Faults (navigation errors, flaky navigation,
//! hangs, unreadable DOM) are injected per key so fetch paths can be exercised
//! without a network.

use super::{BrowserError, BrowserPage, BrowserProvider, Fingerprint};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, trace};

/// Error reported for URLs that no fixture answers.
const UNRESOLVED: &str = "net::ERR_NAME_NOT_RESOLVED (ENOTFOUND)";

#[derive(Debug, Clone, Default)]
struct Fixture {
    key: String,
    html: Option<String>,
    navigation_error: Option<String>,
    /// Remaining navigations that fail before `html` is served.
    flaky: Option<(Arc<AtomicU32>, String)>,
    hang: Option<Duration>,
    content_error: Option<String>,
}

/// Counters shared by a [`FixtureBrowser`] and every page it opened.
#[derive(Debug, Clone, Default)]
pub struct FixtureStats {
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    configured: Arc<AtomicUsize>,
    navigations: Arc<AtomicUsize>,
    pointer_moves: Arc<AtomicUsize>,
    visited: Arc<Mutex<Vec<String>>>,
    user_agents: Arc<Mutex<Vec<String>>>,
}

impl FixtureStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn configured(&self) -> usize {
        self.configured.load(Ordering::SeqCst)
    }

    /// Navigation attempts, including failed ones.
    pub fn navigations(&self) -> usize {
        self.navigations.load(Ordering::SeqCst)
    }

    pub fn pointer_moves(&self) -> usize {
        self.pointer_moves.load(Ordering::SeqCst)
    }

    /// Every URL a page attempted to load, in order.
    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// User agents applied through `configure`, in order.
    pub fn user_agents(&self) -> Vec<String> {
        self.user_agents.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

/// In-memory browser provider.
#[derive(Debug, Clone, Default)]
pub struct FixtureBrowser {
    fixtures: Arc<Vec<Fixture>>,
    open_failure: Option<String>,
    stats: FixtureStats,
}

impl FixtureBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `<key>.html` file in `dir` as a fixture keyed by file stem.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut browser = Self::new();

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read fixture directory: {}", dir.display()))?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "html"))
            .collect();
        paths.sort();

        for path in paths {
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let html = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read fixture: {}", path.display()))?;
            debug!("Loaded fixture '{}' from {}", key, path.display());
            browser = browser.with_page(key, html);
        }

        Ok(browser)
    }

    fn entry(&mut self, key: &str) -> &mut Fixture {
        let fixtures = Arc::make_mut(&mut self.fixtures);
        let index = match fixtures.iter().position(|f| f.key == key) {
            Some(index) => index,
            None => {
                fixtures.push(Fixture { key: key.to_string(), ..Fixture::default() });
                fixtures.len() - 1
            }
        };
        &mut fixtures[index]
    }

    /// Serves `html` for URLs containing `key`.
    pub fn with_page(mut self, key: impl Into<String>, html: impl Into<String>) -> Self {
        self.entry(&key.into()).html = Some(html.into());
        self
    }

    /// Every navigation to URLs containing `key` fails with `message`.
    pub fn with_navigation_failure(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.entry(&key.into()).navigation_error = Some(message.into());
        self
    }

    /// The first `failures` navigations fail with `message`, later ones succeed.
    pub fn with_flaky_navigation(
        mut self,
        key: impl Into<String>,
        failures: u32,
        message: impl Into<String>,
    ) -> Self {
        self.entry(&key.into()).flaky = Some((Arc::new(AtomicU32::new(failures)), message.into()));
        self
    }

    /// Navigation stalls for `delay` before answering.
    pub fn with_hang(mut self, key: impl Into<String>, delay: Duration) -> Self {
        self.entry(&key.into()).hang = Some(delay);
        self
    }

    /// Navigation succeeds but reading the DOM fails.
    pub fn with_content_failure(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.entry(&key.into()).content_error = Some(message.into());
        self
    }

    /// Page acquisition itself fails.
    pub fn with_open_failure(mut self, message: impl Into<String>) -> Self {
        self.open_failure = Some(message.into());
        self
    }

    /// Returns a handle to the shared counters.
    pub fn stats(&self) -> FixtureStats {
        self.stats.clone()
    }
}

#[async_trait]
impl BrowserProvider for FixtureBrowser {
    async fn open_page(&self) -> Result<Box<dyn BrowserPage>, BrowserError> {
        if let Some(message) = &self.open_failure {
            return Err(BrowserError::Unavailable(message.clone()));
        }
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FixturePage {
            fixtures: Arc::clone(&self.fixtures),
            stats: self.stats.clone(),
            loaded: None,
        }))
    }
}

struct FixturePage {
    fixtures: Arc<Vec<Fixture>>,
    stats: FixtureStats,
    loaded: Option<Fixture>,
}

#[async_trait]
impl BrowserPage for FixturePage {
    async fn configure(&mut self, fingerprint: &Fingerprint) -> Result<(), BrowserError> {
        self.stats.configured.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut agents) = self.stats.user_agents.lock() {
            agents.push(fingerprint.user_agent.clone());
        }
        Ok(())
    }

    async fn move_pointer(&mut self, x: u32, y: u32) -> Result<(), BrowserError> {
        trace!("Fixture pointer at ({}, {})", x, y);
        self.stats.pointer_moves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.stats.navigations.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut visited) = self.stats.visited.lock() {
            visited.push(url.to_string());
        }

        let fixture = self
            .fixtures
            .iter()
            .find(|f| url.contains(f.key.as_str()))
            .ok_or_else(|| BrowserError::Navigation { url: url.to_string(), message: UNRESOLVED.to_string() })?;

        if let Some(delay) = fixture.hang {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = &fixture.navigation_error {
            return Err(BrowserError::Navigation { url: url.to_string(), message: message.clone() });
        }

        if let Some((remaining, message)) = &fixture.flaky {
            let failed = remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(BrowserError::Navigation { url: url.to_string(), message: message.clone() });
            }
        }

        self.loaded = Some(fixture.clone());
        Ok(())
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        let fixture = self.loaded.as_ref().ok_or_else(|| BrowserError::Page("no document loaded".to_string()))?;
        if let Some(message) = &fixture.content_error {
            return Err(BrowserError::Page(message.clone()));
        }
        Ok(fixture.html.clone().unwrap_or_default())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        self.loaded = None;
        Ok(())
    }
}
