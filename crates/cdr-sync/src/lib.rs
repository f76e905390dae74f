//! Reconciliation engine and the sequential pipeline that drives it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cdr_core::{CodecError, ErrorKind};
use cdr_queue::{MessageSink, TransportError};
use cdr_storage::{DocumentStore, PgDocumentStore, StoreError};
use thiserror::Error;
use tracing::info;

pub mod config;
pub mod pipeline;
pub mod reconcile;

pub use config::AppConfig;
pub use pipeline::{Pipeline, PipelineRunSummary};
pub use reconcile::{reconcile, Reconciled, UpdatePlan};

pub const CRATE_NAME: &str = "cdr-sync";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed message: {0}")]
    Malformed(#[from] CodecError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Malformed(err) => err.kind(),
            PipelineError::Store(err) => err.kind(),
            PipelineError::Transport(err) => err.kind(),
        }
    }
}

/// Connect, migrate, open the configured topics and drive the pipeline until
/// `shutdown` resolves or the input ends.
pub async fn run_from_config<F>(config: &AppConfig, shutdown: F) -> Result<PipelineRunSummary>
where
    F: Future<Output = ()> + Send,
{
    let store = PgDocumentStore::connect(&config.store).await?;
    store.migrate().await?;
    let store: Arc<dyn DocumentStore> = Arc::new(store);

    let queue = &config.queue;
    let poll = queue
        .follow
        .then(|| Duration::from_millis(queue.poll_interval_ms.max(1)));
    let mut source = queue
        .topic(&queue.input_topic)
        .open_source(&queue.group_id, poll)
        .await
        .with_context(|| format!("opening input topic {}", queue.input_topic))?;
    let mut sink = queue
        .topic(&queue.output_topic)
        .open_sink()
        .await
        .with_context(|| format!("opening output topic {}", queue.output_topic))?;

    let mut pipeline = Pipeline::new(store);
    if let Some(dead_letter_topic) = &queue.dead_letter_topic {
        let dead_letter = queue
            .topic(dead_letter_topic)
            .open_sink()
            .await
            .with_context(|| format!("opening dead-letter topic {dead_letter_topic}"))?;
        pipeline = pipeline.with_dead_letter(Box::new(dead_letter) as Box<dyn MessageSink>);
    }

    info!(
        input = %queue.input_topic,
        output = %queue.output_topic,
        group_id = %queue.group_id,
        follow = queue.follow,
        "start consuming"
    );
    let summary = pipeline.run_until(&mut source, &mut sink, shutdown).await?;
    Ok(summary)
}
