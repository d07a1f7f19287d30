//! Append-only event log backing the release catalog

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::DeployerError;

/// Position in a stream, counted in events
pub type Cursor = u64;

/// Result of one read
#[derive(Debug, Clone, Default)]
pub struct ReadBatch {
    pub lines: Vec<String>,

    /// Cursor to continue reading from
    pub next: Cursor,

    /// `false` once `next` is the head of the stream
    pub more: bool,
}

/// An ordered, append-only log of event lines split into named streams
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Read events starting at `cursor`
    async fn read(&self, stream: &str, cursor: Cursor) -> Result<ReadBatch, DeployerError>;

    /// Append events to the end of the stream, all or nothing
    async fn append(&self, stream: &str, lines: Vec<String>) -> Result<(), DeployerError>;
}

/// Maximum events returned by a single read
const READ_BATCH_SIZE: usize = 1000;

/// One JSON-lines file per stream
#[derive(Debug)]
pub struct FileEventLog {
    dir: PathBuf,

    // serializes appends from this process
    append_lock: Mutex<()>,
}

impl FileEventLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// "/software-releases" => "<dir>/software-releases.jsonl"
    fn stream_file(&self, stream: &str) -> PathBuf {
        let name = stream.trim_start_matches('/').replace('/', "_");
        self.dir.join(format!("{}.jsonl", name))
    }
}

#[async_trait]
impl EventLog for FileEventLog {
    async fn read(&self, stream: &str, cursor: Cursor) -> Result<ReadBatch, DeployerError> {
        let path = self.stream_file(stream);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            // a stream nobody has written to yet is empty
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(DeployerError::CatalogUnavailable(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let all: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = (cursor as usize).min(all.len());
        let end = (start + READ_BATCH_SIZE).min(all.len());

        Ok(ReadBatch {
            lines: all[start..end].iter().map(|l| l.to_string()).collect(),
            next: end as Cursor,
            more: end < all.len(),
        })
    }

    async fn append(&self, stream: &str, lines: Vec<String>) -> Result<(), DeployerError> {
        if lines.is_empty() {
            return Ok(());
        }

        let _guard = self.append_lock.lock().await;

        tokio::fs::create_dir_all(&self.dir).await?;

        let mut buf = String::new();
        for line in &lines {
            if line.contains('\n') {
                return Err(DeployerError::Internal("event line contains a newline".to_string()));
            }
            buf.push_str(line);
            buf.push('\n');
        }

        let path = self.stream_file(stream);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(buf.as_bytes()).await?;
        file.sync_all().await?;

        debug!("appended {} events to {}", lines.len(), path.display());
        Ok(())
    }
}

/// In-process event log
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    streams: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines of a stream
    pub async fn lines(&self, stream: &str) -> Vec<String> {
        self.streams
            .lock()
            .await
            .get(stream)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn read(&self, stream: &str, cursor: Cursor) -> Result<ReadBatch, DeployerError> {
        let streams = self.streams.lock().await;
        let all = streams.get(stream).map(Vec::as_slice).unwrap_or_default();

        let start = (cursor as usize).min(all.len());
        let end = (start + READ_BATCH_SIZE).min(all.len());

        Ok(ReadBatch {
            lines: all[start..end].to_vec(),
            next: end as Cursor,
            more: end < all.len(),
        })
    }

    async fn append(&self, stream: &str, lines: Vec<String>) -> Result<(), DeployerError> {
        self.streams
            .lock()
            .await
            .entry(stream.to_string())
            .or_default()
            .extend(lines);
        Ok(())
    }
}
