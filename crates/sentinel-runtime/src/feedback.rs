//! Persistent audit corrections.
//!
//! Rejection feedback from the reviewer is stored so later runs can show
//! the classifier its past mistakes. A run loads a [`FeedbackSnapshot`] once
//! and never sees entries appended during that run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sentinel_core::Posting;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Errors from a feedback store.
#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("Feedback file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode feedback record: {0}")]
    Json(#[from] serde_json::Error),
}

/// One stored correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub timestamp: DateTime<Utc>,
    pub job_title: String,
    pub job_company: String,
    pub feedback: String,
}

impl FeedbackRecord {
    pub fn new(posting: &Posting, feedback: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            job_title: posting.title.clone(),
            job_company: posting.company.clone(),
            feedback: feedback.into(),
        }
    }
}

/// Source and sink of correction strings, in append order.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// The most recent `max_entries` corrections, most recent last.
    async fn load(&self, max_entries: usize) -> Result<Vec<String>, FeedbackError>;

    async fn append(&self, record: FeedbackRecord) -> Result<(), FeedbackError>;
}

/// Immutable corrections shared by every posting of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackSnapshot(Arc<[String]>);

impl FeedbackSnapshot {
    pub fn new(entries: Vec<String>) -> Self {
        Self(entries.into())
    }

    /// Load from `store`, treating a failed read as an empty history.
    pub async fn load(store: &dyn FeedbackStore, max_entries: usize) -> Self {
        match store.load(max_entries).await {
            Ok(entries) => {
                if !entries.is_empty() {
                    tracing::info!(count = entries.len(), "Loaded past corrections");
                }
                Self::new(entries)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not load feedback, continuing without");
                Self::default()
            }
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn most_recent(mut entries: Vec<String>, max_entries: usize) -> Vec<String> {
    let excess = entries.len().saturating_sub(max_entries);
    entries.drain(..excess);
    entries
}

/// One JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonlFeedbackStore {
    path: PathBuf,
}

impl JsonlFeedbackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FeedbackStore for JsonlFeedbackStore {
    async fn load(&self, max_entries: usize) -> Result<Vec<String>, FeedbackError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<FeedbackRecord>(line) {
                Ok(record) if !record.feedback.is_empty() => entries.push(record.feedback),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(
                        path = %self.path.display(),
                        line = number + 1,
                        error = %e,
                        "Skipping unreadable feedback line"
                    );
                }
            }
        }

        Ok(most_recent(entries, max_entries))
    }

    async fn append(&self, record: FeedbackRecord) -> Result<(), FeedbackError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::info!(
            posting = %format!("{} @ {}", record.job_title, record.job_company),
            "Saved reviewer feedback"
        );
        Ok(())
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryFeedbackStore {
    records: Mutex<Vec<FeedbackRecord>>,
}

impl MemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let posting = Posting::new("Unknown", "Unknown", "");
        let records = entries
            .into_iter()
            .map(|e| FeedbackRecord::new(&posting, e))
            .collect();
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn records(&self) -> Vec<FeedbackRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl FeedbackStore for MemoryFeedbackStore {
    async fn load(&self, max_entries: usize) -> Result<Vec<String>, FeedbackError> {
        let entries = self
            .records
            .lock()
            .iter()
            .filter(|r| !r.feedback.is_empty())
            .map(|r| r.feedback.clone())
            .collect();
        Ok(most_recent(entries, max_entries))
    }

    async fn append(&self, record: FeedbackRecord) -> Result<(), FeedbackError> {
        self.records.lock().push(record);
        Ok(())
    }
}
