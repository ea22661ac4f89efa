use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use muninn::api::{self, AppState};
use muninn::storage::{InMemoryStore, PostgresStorage, Storage};
use muninn::{AgentFilter, CapabilityRegistry, Config, Scheduler};

#[derive(Parser)]
#[command(name = "muninn")]
#[command(about = "Event-driven automation agent scheduler", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML config file. `MUNINN_*` environment variables override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve webhooks and run due agents until interrupted
    Serve {
        #[arg(long, help = "Port to listen on, overriding the config")]
        port: Option<u16>,
    },
    /// Run every agent that is due right now, once
    Tick,
    /// List registered agents
    Agents {
        #[arg(long, help = "Include deactivated agents")]
        all: bool,
        #[arg(long, help = "Only agents of this capability kind")]
        kind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env(),
    };

    let storage = open_storage(&config).await?;
    let scheduler = Scheduler::new(
        storage,
        CapabilityRegistry::with_builtins(),
        config.scheduler_config(),
    );

    match cli.command {
        Commands::Serve { port } => serve(scheduler, port.unwrap_or(config.port)).await?,
        Commands::Tick => tick(&scheduler).await?,
        Commands::Agents { all, kind } => list_agents(&scheduler, all, kind).await?,
    }

    Ok(())
}

async fn open_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    match &config.database_url {
        Some(url) => {
            let storage = PostgresStorage::new(url).await?;
            storage.run_migrations().await?;
            log::info!("Using PostgreSQL storage");
            Ok(Arc::new(storage))
        }
        None => {
            log::warn!("MUNINN_DATABASE_URL not set, agents and events are kept in memory");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

async fn serve(scheduler: Scheduler, port: u16) -> Result<()> {
    let state = AppState {
        scheduler: scheduler.clone(),
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    tokio::select! {
        result = api::serve(state, port) => result?,
        _ = scheduler.run_until(shutdown) => {}
    }

    Ok(())
}

async fn tick(scheduler: &Scheduler) -> Result<()> {
    let report = scheduler.tick(Utc::now()).await?;

    println!("{}", report);
    for (id, error) in &report.failed {
        println!("  {} failed: {}", id, error);
    }

    Ok(())
}

async fn list_agents(scheduler: &Scheduler, all: bool, kind: Option<String>) -> Result<()> {
    let mut filter = AgentFilter::default();
    if all {
        filter = filter.including_inactive();
    }
    if let Some(kind) = kind {
        filter = filter.with_kind(kind);
    }

    let agents = scheduler.registry().list(&filter).await?;
    if agents.is_empty() {
        println!("No agents registered");
        return Ok(());
    }

    for agent in agents {
        let next_run = agent
            .next_run
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<24} {:<14} active={} next_run={}",
            agent.id, agent.name, agent.kind, agent.is_active, next_run
        );
    }

    Ok(())
}
