use std::path::PathBuf;

use anyhow::{Context, Result};
use cdr_storage::{DocumentStore, PgDocumentStore};
use cdr_sync::AppConfig;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "cdr-cli")]
#[command(about = "Crawled document reconciler")]
struct Cli {
    /// Optional YAML config file; CDR_* environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Consume the input topic and reconcile until Ctrl-C or end of input.
    Run,
    /// Apply the document store schema migrations.
    Migrate,
    /// Publish a JSON array of crawled documents onto a topic.
    Produce {
        #[arg(long)]
        file: PathBuf,
        /// Defaults to the configured input topic.
        #[arg(long)]
        topic: Option<String>,
    },
    /// Print the stored canonical record for a url.
    Show {
        #[arg(long)]
        url: String,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let summary = cdr_sync::run_from_config(&config, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
            println!(
                "run complete: run_id={} received={} created={} updated={} unchanged={} duplicate={} malformed={} rejected={} dead_lettered={}",
                summary.run_id,
                summary.received,
                summary.created,
                summary.updated,
                summary.unchanged,
                summary.duplicate,
                summary.malformed,
                summary.rejected,
                summary.dead_lettered
            );
        }
        Commands::Migrate => {
            let store = PgDocumentStore::connect(&config.store).await?;
            store.migrate().await?;
            println!("migrations applied");
        }
        Commands::Produce { file, topic } => {
            let documents = cdr_queue::load_documents(&file)?;
            let topic_name = topic.unwrap_or_else(|| config.queue.input_topic.clone());
            let mut sink = config
                .queue
                .topic(&topic_name)
                .open_sink()
                .await
                .with_context(|| format!("opening topic {topic_name}"))?;
            let count = cdr_queue::publish_documents(&mut sink, &documents).await?;
            info!(topic = %topic_name, count, "documents produced");
            println!("produced {count} documents to {topic_name}");
        }
        Commands::Show { url } => {
            let store = PgDocumentStore::connect(&config.store).await?;
            let record = store.get(&url).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    Ok(())
}
