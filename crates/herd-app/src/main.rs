//! # Herd - Activity settlement engine demo
//!
//! Wires the settlement engine to the in-memory adapters and drives it with
//! simulated chat traffic.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  main.rs (this file) - Wiring                               │
//! │    │                                                        │
//! │    ├── Creates: InMemoryStore, NotificationLog,             │
//! │    │            RecordingSpawnTrigger (adapters)            │
//! │    ├── Starts:  herd_core::start (loops + producer handle)  │
//! │    └── Runs:    simulated traffic until Ctrl-C / duration   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage:
//!   herd                                  - Run the demo with defaults
//!   herd --config herd.yaml run --users 20
//!   herd --config herd.yaml config        - Print the effective configuration

mod simulation;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use herd_adapter::{InMemoryStore, NotificationKind, NotificationLog, RecordingSpawnTrigger};
use herd_core::Collaborators;
use shared::{CommunityId, QuestKind, SettlementConfig};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use simulation::TrafficPlan;

#[derive(Parser)]
#[command(name = "herd")]
#[command(about = "Herd - Activity aggregation and deferred settlement")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (JSON, or YAML by extension)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine against simulated traffic
    Run(RunArgs),
    /// Print the effective configuration as YAML
    Config,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Number of simulated users
    #[arg(long, default_value_t = 5)]
    users: u64,

    /// Number of spawn channels
    #[arg(long, default_value_t = 3)]
    channels: u64,

    /// Simulated messages per second
    #[arg(long, default_value_t = 20)]
    rate: u64,

    /// Messages per spawn in every channel
    #[arg(long, default_value_t = 25)]
    spawn_target: u64,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Write delivered notices to this file as JSON on exit
    #[arg(long)]
    export_notices: Option<PathBuf>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            users: 5,
            channels: 3,
            rate: 20,
            spawn_target: 25,
            duration_secs: None,
            export_notices: None,
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SettlementConfig> {
    match path {
        Some(path) => SettlementConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(SettlementConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Config) => {
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
        Some(Commands::Run(args)) => run(config, args).await,
        None => run(config, RunArgs::default()).await,
    }
}

async fn run(config: SettlementConfig, args: RunArgs) -> anyhow::Result<()> {
    // ========================================
    // Adapters
    // ========================================

    let store = Arc::new(InMemoryStore::new());
    let notices = Arc::new(NotificationLog::default());
    let spawns = Arc::new(RecordingSpawnTrigger::new());

    let plan = TrafficPlan {
        community_id: CommunityId::new(1),
        users: args.users,
        channels: args.channels,
        messages_per_second: args.rate,
        spawn_target: args.spawn_target,
        bonus_role: config.role_bonus_percent.keys().next().cloned(),
    };
    simulation::seed(&store, &plan)?;

    // ========================================
    // Engine
    // ========================================

    let collaborators = Collaborators::new(store.clone(), notices.clone(), spawns.clone());
    let runtime = herd_core::start(config, collaborators).context("Failed to start engine")?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    let traffic = tokio::spawn(simulation::run(runtime.producer.clone(), plan.clone(), shutdown_rx));

    match args.duration_secs {
        Some(secs) => {
            info!(secs, "Running for a fixed duration");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C")?,
            }
        }
        None => {
            info!("Running until Ctrl-C");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
        }
    }

    // ========================================
    // Shutdown
    // ========================================

    let _ = shutdown_tx.send(()).await;
    let sent = traffic.await.context("Traffic task failed")?;
    let flush = runtime.scheduler.shutdown().await;

    let mut total_experience = 0u64;
    for i in 0..plan.users {
        if let Some(companion) = store.companion(plan.user(i))? {
            info!(
                user = %plan.user(i),
                companion = %companion.name,
                level = companion.level,
                experience = companion.total_experience,
                "Companion"
            );
            total_experience += companion.total_experience;
        }
    }

    info!(
        sent,
        total_experience,
        carried_over = flush.activity.messages_carried,
        level_ups = notices.count_of(NotificationKind::LevelUp),
        milestones = notices.count_of(NotificationKind::Milestone),
        spawns = spawns.total_events(),
        messages_quest = store.community_quest_total(plan.community_id, QuestKind::MessagesSent)?,
        bits_quest = store.community_quest_total(plan.community_id, QuestKind::BitsEarned)?,
        "Demo finished"
    );

    if let Some(path) = args.export_notices {
        std::fs::write(&path, notices.export_json()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Exported notices");
    }

    Ok(())
}
