//! tipgated - operate the tip pipeline from the command line.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tipgate_common::{detect_injection_attempts, Tier, Tip};
use tipgated::{Config, TipPipeline};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.daemon.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("tipgated v{} starting", tipgate_common::VERSION);

    match cli.command {
        Commands::Scan { text } => print_json(&detect_injection_attempts(&text)),
        command => run(command, &config).await,
    }
}

async fn run(command: Commands, config: &Config) -> Result<()> {
    let pipeline = TipPipeline::from_config(config).await?;

    match command {
        Commands::Process { input } => {
            let content = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let tip: Tip = serde_json::from_str(&content)
                .with_context(|| format!("Invalid tip record {}", input.display()))?;
            print_json(&pipeline.process(tip).await?)
        }
        Commands::Warrant {
            tip_id,
            file_id,
            status,
            actor,
        } => {
            let transition = pipeline
                .update_warrant_status(&tip_id, &file_id, status, &actor)
                .await?;
            print_json(&transition)
        }
        Commands::Exigent {
            tip_id,
            file_id,
            authorized_by,
            justification,
        } => {
            let tip = pipeline
                .grant_exigent_access(&tip_id, &file_id, &authorized_by, &justification)
                .await?;
            print_json(&tip)
        }
        Commands::Coordinate {
            tip_id,
            supervisor,
            agency,
            notes,
        } => {
            let tip = pipeline
                .record_coordination(&tip_id, &supervisor, &agency, &notes)
                .await?;
            print_json(&tip)
        }
        Commands::Audit { tip_id } => print_json(pipeline.audit_trail(&tip_id).await?.entries()),
        Commands::Queue => {
            let tips = pipeline.queue().await?;
            let queue: Vec<QueueItem> = tips.iter().map(QueueItem::from).collect();
            print_json(&queue)
        }
        Commands::Scan { text } => print_json(&detect_injection_attempts(&text)),
    }
}

/// One line of the triage queue
#[derive(Serialize)]
struct QueueItem {
    tip_id: String,
    received_at: chrono::DateTime<chrono::Utc>,
    score: Option<u8>,
    tier: Option<Tier>,
    automatic_actions_suspended: bool,
    review_flags: usize,
}

impl From<&Tip> for QueueItem {
    fn from(tip: &Tip) -> Self {
        let priority = tip.priority.computed();
        Self {
            tip_id: tip.tip_id.clone(),
            received_at: tip.received_at,
            score: priority.map(|p| p.score),
            tier: priority.map(|p| p.tier),
            automatic_actions_suspended: priority
                .map(|p| p.automatic_actions_suspended)
                .unwrap_or(true),
            review_flags: tip.review_flags.len(),
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
