//! Append-only exchange log.
//!
//! One JSON object per line, one line per handled request:
//!
//! ```text
//! {"timestamp":"2026-01-01T12:00:00.000Z","model":"gemini-2.5-flash","streaming":false,"prompt":"hi","reply":"hello"}
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::ExchangeLogError;

/// One prompt/reply pair plus metadata.
///
/// Field order is the on-disk order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    #[serde(serialize_with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub streaming: bool,
    pub prompt: String,
    pub reply: String,
}

impl ExchangeRecord {
    /// Stamp a new record with the current UTC time.
    pub fn now(
        model: impl Into<String>,
        streaming: bool,
        prompt: impl Into<String>,
        reply: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            model: model.into(),
            streaming,
            prompt: prompt.into(),
            reply: reply.into(),
        }
    }
}

fn iso8601<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Destination for exchange records.
///
/// Implement this to send records somewhere other than a local file without
/// touching the relay.
#[async_trait]
pub trait ExchangeStore: Send + Sync + 'static {
    async fn append(&self, record: ExchangeRecord) -> Result<(), ExchangeLogError>;
}

/// Newline-delimited JSON file opened in append mode for every write.
///
/// Appends from concurrent requests are serialised through an async mutex so
/// lines never interleave. There is no rotation or size bound.
#[derive(Debug)]
pub struct JsonlExchangeLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlExchangeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ExchangeStore for JsonlExchangeLog {
    async fn append(&self, record: ExchangeRecord) -> Result<(), ExchangeLogError> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
