use async_trait::async_trait;
use cdr_core::Message;
use tokio::sync::mpsc;

use crate::{MessageSink, MessageSource, TransportError};

/// Bounded in-process topic. The source ends once every sink is dropped.
pub fn channel(capacity: usize) -> (ChannelSink, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelSink { tx }, ChannelSource { rx })
}

#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Message>,
}

#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Message>,
}

impl ChannelSource {
    /// Drain whatever is buffered without waiting.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            out.push(message);
        }
        out
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn publish(&mut self, message: Message) -> Result<(), TransportError> {
        self.tx.send(message).await.map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn next_message(&mut self) -> Result<Option<Message>, TransportError> {
        Ok(self.rx.recv().await)
    }
}
