//! Queue transport contracts and adapters: in-process channels and file-backed topics.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use cdr_core::{codec, DocumentRecord, ErrorKind, Message};
use serde::Deserialize;
use thiserror::Error;

mod channel;
mod file_topic;

pub use channel::{channel, ChannelSink, ChannelSource};
pub use file_topic::{decode_line, encode_line, FileTopic, FileTopicSink, FileTopicSource};

pub const CRATE_NAME: &str = "cdr-queue";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport io failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid envelope: {0}")]
    Envelope(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("transport channel closed")]
    Closed,
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::TransportUnavailable
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        TransportError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Inbound side of a topic. Delivery is at-least-once: anything returned
/// but not committed is handed out again after a restart.
#[async_trait]
pub trait MessageSource: Send {
    /// Next message, or `None` once the stream has ended.
    async fn next_message(&mut self) -> Result<Option<Message>, TransportError>;

    /// Acknowledge the message most recently returned by `next_message`.
    async fn commit(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[async_trait]
pub trait MessageSink: Send {
    async fn publish(&mut self, message: Message) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub queue_dir: PathBuf,
    pub input_topic: String,
    pub output_topic: String,
    pub dead_letter_topic: Option<String>,
    pub group_id: String,
    pub follow: bool,
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_dir: PathBuf::from("./queue"),
            input_topic: "in-queue-0".to_string(),
            output_topic: "out-queue-0".to_string(),
            dead_letter_topic: None,
            group_id: "cdr-reconciler".to_string(),
            follow: true,
            poll_interval_ms: 500,
        }
    }
}

impl QueueConfig {
    pub fn topic(&self, name: &str) -> FileTopic {
        FileTopic::new(&self.queue_dir, name)
    }
}

/// Load a JSON array of crawled documents (`url`, `pubdate`, `fetchtime`, `text`).
pub fn load_documents(path: impl AsRef<Path>) -> Result<Vec<DocumentRecord>> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

/// Publish each document as one keyed five-field message.
pub async fn publish_documents(
    sink: &mut dyn MessageSink,
    documents: &[DocumentRecord],
) -> Result<usize, TransportError> {
    for document in documents {
        sink.publish(codec::to_message(document)).await?;
        tracing::debug!(url = %document.url, fetch_time = document.fetch_time, "document published");
    }
    Ok(documents.len())
}
