//! Topics stored as JSON-lines files, one envelope per line.
//!
//! Binary values are hex-encoded. Each consumer group keeps its committed
//! line offset in `<topic>.<group>.offset` next to the topic file.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use cdr_core::{Header, Message};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::{MessageSink, MessageSource, TransportError};

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeLine {
    key: String,
    headers: Vec<HeaderLine>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HeaderLine {
    key: String,
    value: String,
}

pub fn encode_line(message: &Message) -> Result<String, TransportError> {
    let line = EnvelopeLine {
        key: hex::encode(&message.key),
        headers: message
            .headers
            .iter()
            .map(|h| HeaderLine {
                key: h.key.clone(),
                value: hex::encode(&h.value),
            })
            .collect(),
    };
    Ok(serde_json::to_string(&line)?)
}

pub fn decode_line(line: &str) -> Result<Message, TransportError> {
    let envelope: EnvelopeLine = serde_json::from_str(line)?;
    let key = hex::decode(&envelope.key)
        .map_err(|err| TransportError::Envelope(format!("message key: {err}")))?;
    let headers = envelope
        .headers
        .into_iter()
        .map(|h| {
            let value = hex::decode(&h.value)
                .map_err(|err| TransportError::Envelope(format!("header `{}`: {err}", h.key)))?;
            Ok(Header { key: h.key, value })
        })
        .collect::<Result<Vec<_>, TransportError>>()?;
    Ok(Message { key, headers })
}

#[derive(Debug, Clone)]
pub struct FileTopic {
    dir: PathBuf,
    name: String,
}

impl FileTopic {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.jsonl", self.name))
    }

    pub fn offset_path(&self, group_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}.offset", self.name, group_id))
    }

    async fn ensure_exists(&self) -> Result<PathBuf, TransportError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| TransportError::io(&self.dir, err))?;
        let path = self.path();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|err| TransportError::io(&path, err))?;
        Ok(path)
    }

    pub async fn committed_offset(&self, group_id: &str) -> Result<u64, TransportError> {
        let path = self.offset_path(group_id);
        match fs::read_to_string(&path).await {
            Ok(text) => text
                .trim()
                .parse()
                .map_err(|_| TransportError::Envelope(format!("corrupt offset file {}", path.display()))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(err) => Err(TransportError::io(&path, err)),
        }
    }

    pub async fn open_sink(&self) -> Result<FileTopicSink, TransportError> {
        let path = self.ensure_exists().await?;
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|err| TransportError::io(&path, err))?;
        Ok(FileTopicSink { path, file })
    }

    /// Open a consumer positioned at the group's committed offset.
    ///
    /// With `poll` set, the source waits for appended lines instead of ending at EOF.
    pub async fn open_source(
        &self,
        group_id: &str,
        poll: Option<Duration>,
    ) -> Result<FileTopicSource, TransportError> {
        let path = self.ensure_exists().await?;
        let committed = self.committed_offset(group_id).await?;
        let file = File::open(&path)
            .await
            .map_err(|err| TransportError::io(&path, err))?;

        let mut source = FileTopicSource {
            reader: BufReader::new(file),
            path,
            offset_path: self.offset_path(group_id),
            committed,
            delivered: 0,
            pending: Vec::new(),
            poll,
        };
        source.skip_committed().await?;
        debug!(topic = %self.name, group_id, committed, "file topic source opened");
        Ok(source)
    }
}

#[derive(Debug)]
pub struct FileTopicSink {
    path: PathBuf,
    file: File,
}

#[async_trait]
impl MessageSink for FileTopicSink {
    async fn publish(&mut self, message: Message) -> Result<(), TransportError> {
        let mut line = encode_line(&message)?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .await
            .map_err(|err| TransportError::io(&self.path, err))?;
        self.file
            .flush()
            .await
            .map_err(|err| TransportError::io(&self.path, err))
    }
}

#[derive(Debug)]
pub struct FileTopicSource {
    reader: BufReader<File>,
    path: PathBuf,
    offset_path: PathBuf,
    committed: u64,
    // complete lines consumed so far, including skipped blank lines
    delivered: u64,
    pending: Vec<u8>,
    poll: Option<Duration>,
}

impl FileTopicSource {
    async fn skip_committed(&mut self) -> Result<(), TransportError> {
        while self.delivered < self.committed {
            match self.read_complete_line().await? {
                Some(_) => self.delivered += 1,
                None => break,
            }
        }
        Ok(())
    }

    /// A full newline-terminated line, or `None` at EOF. Partial tails stay buffered.
    async fn read_complete_line(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            let read = self
                .reader
                .read_until(b'\n', &mut self.pending)
                .await
                .map_err(|err| TransportError::io(&self.path, err))?;
            if self.pending.ends_with(b"\n") {
                return Ok(Some(std::mem::take(&mut self.pending)));
            }
            if read == 0 {
                return Ok(None);
            }
        }
    }
}

/// Carries the raw line as the key with no headers, so it fails record
/// decoding and reaches the dead-letter topic intact.
fn unreadable_line(line: &[u8]) -> Message {
    Message {
        key: line.to_vec(),
        headers: Vec::new(),
    }
}

#[async_trait]
impl MessageSource for FileTopicSource {
    async fn next_message(&mut self) -> Result<Option<Message>, TransportError> {
        loop {
            let Some(line) = self.read_complete_line().await? else {
                match self.poll {
                    Some(interval) => {
                        tokio::time::sleep(interval).await;
                        continue;
                    }
                    None => return Ok(None),
                }
            };
            self.delivered += 1;

            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }
            let message = std::str::from_utf8(line)
                .map_err(|err| TransportError::Envelope(format!("line is not UTF-8: {err}")))
                .and_then(decode_line)
                .unwrap_or_else(|err| {
                    warn!(path = %self.path.display(), line_no = self.delivered, %err, "unreadable envelope line");
                    unreadable_line(line)
                });
            return Ok(Some(message));
        }
    }

    async fn commit(&mut self) -> Result<(), TransportError> {
        if self.delivered == self.committed {
            return Ok(());
        }
        let temp_path = self.offset_path.with_extension("offset.tmp");
        fs::write(&temp_path, self.delivered.to_string())
            .await
            .map_err(|err| TransportError::io(&temp_path, err))?;
        fs::rename(&temp_path, &self.offset_path)
            .await
            .map_err(|err| TransportError::io(&self.offset_path, err))?;
        self.committed = self.delivered;
        Ok(())
    }
}
