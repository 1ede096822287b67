//! Interaction journal
//!
//! Dispatch results are appended as JSON lines by a background task. The
//! conversation never waits on it and never hears about its failures.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::ReplySource;

/// Records buffered before new ones are dropped
const QUEUE_CAPACITY: usize = 64;

/// One journaled dispatch
#[derive(Debug, Clone, Serialize)]
pub struct InteractionRecord {
    pub at: DateTime<Local>,
    pub command: String,
    pub response: Option<String>,
    pub source: Option<ReplySource>,
    pub ok: bool,
}

/// Fire-and-forget handle to the journal writer
#[derive(Debug, Clone)]
pub struct InteractionJournal {
    tx: mpsc::Sender<InteractionRecord>,
}

impl InteractionJournal {
    /// Start the writer task appending to `path`
    ///
    /// The task ends once every handle is dropped and the queue drains.
    #[must_use]
    pub fn spawn(path: PathBuf) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let handle = tokio::spawn(write_records(path, rx));
        (Self { tx }, handle)
    }

    /// Queue a record without waiting
    pub fn record(&self, record: InteractionRecord) {
        if let Err(e) = self.tx.try_send(record) {
            tracing::debug!(error = %e, "interaction journal record dropped");
        }
    }
}

async fn write_records(path: PathBuf, mut rx: mpsc::Receiver<InteractionRecord>) {
    while let Some(record) = rx.recv().await {
        if let Err(e) = append(&path, &record).await {
            tracing::debug!(path = %path.display(), error = %e, "interaction journal write failed");
        }
    }
}

async fn append(path: &Path, record: &InteractionRecord) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut line = serde_json::to_string(record)?;
    line.push('\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
