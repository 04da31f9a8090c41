//! Configuration management with TOML, environment variables, and CLI overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default desktop user agent presented to storefronts.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Page backend
    #[serde(default)]
    pub backend: BrowserBackend,

    /// Proxy URL (e.g., socks5://host:port)
    #[serde(default)]
    pub proxy: Option<String>,

    /// Chrome/Chromium executable for the chrome backend
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Directory of `<target id>.html` files for the fixture backend
    #[serde(default)]
    pub fixture_dir: Option<PathBuf>,

    /// Pause between products in milliseconds
    #[serde(default = "default_product_delay_ms")]
    pub product_delay_ms: u64,

    /// Randomized pause before navigating
    #[serde(default)]
    pub pre_navigation_delay: JitterRange,

    /// Randomized pause after navigating, before reading the page
    #[serde(default)]
    pub settle_delay: JitterRange,

    /// Number of simulated pointer moves per page
    #[serde(default = "default_pointer_moves")]
    pub pointer_moves: u32,

    /// Navigation attempts per storefront visit
    #[serde(default = "default_navigation_attempts")]
    pub navigation_attempts: u32,

    /// Ceiling for a single navigation
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,

    /// Pause between navigation attempts in milliseconds
    #[serde(default = "default_navigation_retry_delay_ms")]
    pub navigation_retry_delay_ms: u64,

    /// Product-level retry cap
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the exponential backoff in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    /// Fixed RNG seed for reproducible timing jitter
    #[serde(default)]
    pub jitter_seed: Option<u64>,

    /// Output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Append-only JSONL error log
    #[serde(default)]
    pub error_log: Option<PathBuf>,

    /// Slack-compatible webhook for critical errors
    #[serde(default)]
    pub alert_webhook: Option<String>,

    /// Additional cosmetics brand names
    #[serde(default)]
    pub extra_cosmetic_keywords: Vec<String>,

    /// Additional electronics brand names
    #[serde(default)]
    pub extra_electronics_keywords: Vec<String>,
}

fn default_product_delay_ms() -> u64 {
    3000
}

fn default_pointer_moves() -> u32 {
    3
}

fn default_navigation_attempts() -> u32 {
    3
}

fn default_navigation_timeout_secs() -> u64 {
    60
}

fn default_navigation_retry_delay_ms() -> u64 {
    2000
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_viewport_width() -> u32 {
    1280
}

fn default_viewport_height() -> u32 {
    800
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BrowserBackend::Http,
            proxy: None,
            chrome_path: None,
            fixture_dir: None,
            product_delay_ms: default_product_delay_ms(),
            pre_navigation_delay: JitterRange::default(),
            settle_delay: JitterRange::default(),
            pointer_moves: default_pointer_moves(),
            navigation_attempts: default_navigation_attempts(),
            navigation_timeout_secs: default_navigation_timeout_secs(),
            navigation_retry_delay_ms: default_navigation_retry_delay_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            user_agent: default_user_agent(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            jitter_seed: None,
            format: OutputFormat::Table,
            error_log: None,
            alert_webhook: None,
            extra_cosmetic_keywords: Vec::new(),
            extra_electronics_keywords: Vec::new(),
        }
    }
}

impl Config {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with every delay zeroed, for tests and dry runs.
    pub fn without_delays() -> Self {
        Self {
            product_delay_ms: 0,
            pre_navigation_delay: JitterRange::fixed(0),
            settle_delay: JitterRange::fixed(0),
            navigation_retry_delay_ms: 0,
            backoff_base_ms: 0,
            ..Self::default()
        }
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Loads configuration with fallback to default locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        // 1. Explicit path takes precedence
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        // 2. Try current directory
        let local_config = Path::new("config.toml");
        if local_config.exists() {
            debug!("Found config.toml in current directory");
            return Self::from_file(local_config);
        }

        // 3. Try XDG config directory
        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("xborder-crawler").join("config.toml");
            if xdg_config.exists() {
                debug!("Found config in XDG config directory");
                return Self::from_file(xdg_config);
            }
        }

        // 4. Return default config
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Applies environment variable overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(backend) = std::env::var("XB_BACKEND") {
            if let Ok(b) = backend.parse() {
                self.backend = b;
            }
        }

        if let Ok(proxy) = std::env::var("XB_PROXY") {
            self.proxy = Some(proxy);
        }

        if let Ok(delay) = std::env::var("XB_DELAY") {
            if let Ok(d) = delay.parse() {
                self.product_delay_ms = d;
            }
        }

        if let Ok(path) = std::env::var("XB_ERROR_LOG") {
            self.error_log = Some(PathBuf::from(path));
        }

        if let Ok(url) = std::env::var("XB_ALERT_WEBHOOK") {
            self.alert_webhook = Some(url);
        }

        self
    }

    /// Viewport as `(width, height)`.
    pub fn viewport(&self) -> (u32, u32) {
        (self.viewport_width, self.viewport_height)
    }
}

/// Half-open millisecond range `[min_ms, max_ms)` for randomized pauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JitterRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl JitterRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// A range that always yields `ms`.
    pub fn fixed(ms: u64) -> Self {
        Self { min_ms: ms, max_ms: ms }
    }
}

impl Default for JitterRange {
    fn default() -> Self {
        Self { min_ms: 1000, max_ms: 3000 }
    }
}

/// Which page backend drives storefront visits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserBackend {
    #[default]
    Http,
    Chrome,
    Fixture,
}

impl std::str::FromStr for BrowserBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(BrowserBackend::Http),
            "chrome" | "headless" => Ok(BrowserBackend::Chrome),
            "fixture" | "fixtures" => Ok(BrowserBackend::Fixture),
            _ => Err(format!("Unknown backend: {}. Use: http, chrome, fixture", s)),
        }
    }
}

impl std::fmt::Display for BrowserBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrowserBackend::Http => write!(f, "http"),
            BrowserBackend::Chrome => write!(f, "chrome"),
            BrowserBackend::Fixture => write!(f, "fixture"),
        }
    }
}

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Markdown,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use: table, json, markdown, csv", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}
