//! Append-only decision journal.
//!
//! One JSON object per line. A single writer task owns the file handle, so
//! record offsets always reflect completion order; callers get their ack
//! only after the line is on disk (and fsynced when configured).

use crate::config::JournalConfig;
use crate::domain::errors::JournalError;
use crate::domain::journal::JournalRecord;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

struct WriteRequest {
    line: String,
    ack: oneshot::Sender<Result<(), JournalError>>,
}

/// Handle to the journal writer task. Cloneable; dropping every handle
/// closes the file cleanly.
#[derive(Clone)]
pub struct JournalWriter {
    tx: mpsc::Sender<WriteRequest>,
}

impl JournalWriter {
    /// Opens (creating parents as needed) and spawns the writer task.
    pub async fn open(config: &JournalConfig) -> Result<(Self, JoinHandle<()>), JournalError> {
        let path = PathBuf::from(&config.path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let fsync = config.fsync_each_record;
        info!(
            "JournalWriter: Appending to {} (fsync_each_record={})",
            path.display(),
            fsync
        );

        let (tx, mut rx) = mpsc::channel::<WriteRequest>(64);
        let handle = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let result = write_line(&mut file, &request.line, fsync).await;
                if let Err(e) = &result {
                    error!("JournalWriter: Write failed: {}", e);
                }
                // Receiver may have been dropped by a cancelled cycle.
                let _ = request.ack.send(result);
            }
            let _ = file.flush().await;
        });

        Ok((Self { tx }, handle))
    }

    /// Appends one record, returning once it is durable.
    pub async fn append(&self, record: &JournalRecord) -> Result<(), JournalError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(WriteRequest { line, ack: ack_tx })
            .await
            .map_err(|_| JournalError::Closed)?;
        ack_rx.await.map_err(|_| JournalError::Closed)?
    }
}

async fn write_line(
    file: &mut tokio::fs::File,
    line: &str,
    fsync: bool,
) -> Result<(), JournalError> {
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    if fsync {
        file.sync_data().await?;
    }
    Ok(())
}

/// Reads records back, newest-last, optionally bounded to fire times at or
/// after `since`. Lines that fail to parse are skipped with a warning so a
/// torn tail write cannot block audits.
pub fn read_records(
    path: impl AsRef<Path>,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<JournalRecord>, JournalError> {
    let raw = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<JournalRecord>(line) {
            Ok(record) => {
                if since.is_none_or(|cutoff| record.trigger.fire_time >= cutoff) {
                    records.push(record);
                }
            }
            Err(e) => {
                tracing::warn!("Journal: Skipping unparseable line {}: {}", index + 1, e);
            }
        }
    }
    Ok(records)
}
