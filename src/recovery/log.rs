//! Append-only error log stores.

use super::policy::ErrorContext;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub context: ErrorContext,
    pub timestamp: DateTime<Utc>,
}

impl ErrorLogEntry {
    pub fn new(message: impl Into<String>, stack: Option<String>, context: ErrorContext) -> Self {
        Self { message: message.into(), stack, context, timestamp: Utc::now() }
    }
}

/// Renders an error's `source()` chain, one cause per line. `None` when the
/// error has no cause.
pub fn render_chain(error: &(dyn std::error::Error + 'static)) -> Option<String> {
    let mut causes = Vec::new();
    let mut current = error.source();
    while let Some(cause) = current {
        causes.push(format!("caused by: {}", cause));
        current = cause.source();
    }
    (!causes.is_empty()).then(|| causes.join("\n"))
}

/// Append-only store for error entries. Implementations serialize writers.
#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn append(&self, entry: &ErrorLogEntry) -> Result<()>;
}

/// Writes one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonlErrorLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every entry back, skipping malformed lines.
    pub async fn read_all(&self) -> Result<Vec<ErrorLogEntry>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read error log: {}", self.path.display()))?;
        Ok(content.lines().filter_map(|line| serde_json::from_str(line).ok()).collect())
    }
}

#[async_trait]
impl ErrorSink for JsonlErrorLog {
    async fn append(&self, entry: &ErrorLogEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry).context("Failed to serialize error entry")?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open error log: {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to write error log: {}", self.path.display()))?;
        file.flush().await?;

        debug!("Appended error entry to {}", self.path.display());
        Ok(())
    }
}

/// Keeps entries in memory. Used when no log file is configured, and in tests.
#[derive(Debug, Default)]
pub struct MemoryErrorLog {
    entries: StdMutex<Vec<ErrorLogEntry>>,
}

impl MemoryErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ErrorLogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ErrorSink for MemoryErrorLog {
    async fn append(&self, entry: &ErrorLogEntry) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("error log lock poisoned"))?
            .push(entry.clone());
        Ok(())
    }
}
