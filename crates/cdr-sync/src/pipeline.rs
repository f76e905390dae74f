//! Sequential driver: pull one message, reconcile, publish, commit, repeat.

use std::future::Future;
use std::sync::Arc;

use cdr_core::{codec, Message, Outcome};
use cdr_queue::{MessageSink, MessageSource};
use cdr_storage::DocumentStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::reconcile::reconcile;
use crate::PipelineError;

#[derive(Debug, Clone, Serialize)]
pub struct PipelineRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub received: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub duplicate: usize,
    pub malformed: usize,
    pub rejected: usize,
    pub dead_lettered: usize,
}

impl PipelineRunSummary {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            received: 0,
            created: 0,
            updated: 0,
            unchanged: 0,
            duplicate: 0,
            malformed: 0,
            rejected: 0,
            dead_lettered: 0,
        }
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Duplicate => self.duplicate += 1,
        }
    }

    pub fn published(&self) -> usize {
        self.created + self.updated + self.unchanged + self.duplicate
    }
}

pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    dead_letter: Option<Box<dyn MessageSink>>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            dead_letter: None,
        }
    }

    pub fn with_dead_letter(mut self, sink: Box<dyn MessageSink>) -> Self {
        self.dead_letter = Some(sink);
        self
    }

    /// Decode, reconcile and re-encode a single inbound message.
    pub async fn process_message(&self, message: &Message) -> Result<(Message, Outcome), PipelineError> {
        let observation = codec::from_message(message)?;
        let reconciled = reconcile(self.store.as_ref(), &observation).await?;
        Ok((codec::to_message(&reconciled.record), reconciled.outcome))
    }

    /// Process messages one at a time until `shutdown` resolves or the source ends.
    ///
    /// Shutdown is only observed between messages. Malformed messages and
    /// per-record store rejections are dead-lettered and committed; store or
    /// transport outages stop the loop with the message left uncommitted.
    pub async fn run_until<F>(
        &mut self,
        source: &mut dyn MessageSource,
        sink: &mut dyn MessageSink,
        shutdown: F,
    ) -> Result<PipelineRunSummary, PipelineError>
    where
        F: Future<Output = ()> + Send,
    {
        let mut summary = PipelineRunSummary::start();
        tokio::pin!(shutdown);

        loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(run_id = %summary.run_id, "shutdown requested");
                    break;
                }
                next = source.next_message() => next?,
            };
            let Some(message) = next else {
                info!(run_id = %summary.run_id, "input exhausted");
                break;
            };
            summary.received += 1;

            let span = info_span!("message", run_id = %summary.run_id, seq = summary.received);
            match self.process_message(&message).instrument(span).await {
                Ok((outbound, outcome)) => {
                    sink.publish(outbound).await?;
                    summary.record(outcome);
                }
                Err(err) if err.kind().is_transient() => {
                    error!(
                        run_id = %summary.run_id,
                        kind = %err.kind(),
                        %err,
                        received = summary.received,
                        "stopping pipeline; message left uncommitted for redelivery"
                    );
                    return Err(err);
                }
                Err(err @ PipelineError::Malformed(_)) => {
                    warn!(run_id = %summary.run_id, kind = %err.kind(), %err, "dropping malformed message");
                    summary.malformed += 1;
                    self.route_to_dead_letter(message, &mut summary).await?;
                }
                Err(err) => {
                    error!(run_id = %summary.run_id, kind = %err.kind(), %err, "observation rejected");
                    summary.rejected += 1;
                    self.route_to_dead_letter(message, &mut summary).await?;
                }
            }

            source.commit().await?;
        }

        summary.finished_at = Utc::now();
        info!(
            run_id = %summary.run_id,
            received = summary.received,
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            duplicate = summary.duplicate,
            malformed = summary.malformed,
            rejected = summary.rejected,
            "pipeline run finished"
        );
        Ok(summary)
    }

    async fn route_to_dead_letter(
        &mut self,
        message: Message,
        summary: &mut PipelineRunSummary,
    ) -> Result<(), PipelineError> {
        if let Some(dead_letter) = self.dead_letter.as_mut() {
            dead_letter.publish(message).await?;
            summary.dead_lettered += 1;
        }
        Ok(())
    }
}
