mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use screams::config::StoreBackend;
use screams::repair::repair_counters;
use screams::{AppState, Backend, Config, MemoryStore, RedisStore, Store, TriggerRunner, router};

use output::{OutputFormat, print_repair_report};

#[derive(Parser)]
#[command(name = "screams")]
#[command(version, about = "Social micro-blogging API server")]
#[command(subcommand_required = true, arg_required_else_help = true)]
struct Cli {
    /// TOML configuration file; `SCREAMS_*` variables override it
    #[arg(long, short = 'c', env = "SCREAMS_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Recount likes and comments and rewrite drifted scream counters
    RepairCounters(RepairArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long)]
    bind: Option<String>,
}

#[derive(Args)]
struct RepairArgs {
    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    output: OutputFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = Config::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve(args) => {
            if let Some(bind) = args.bind {
                config.server.bind_addr = bind;
            }
            serve(config).await
        }
        Commands::RepairCounters(args) => {
            let store = Store::new(open_backend(&config).await?);
            let report = repair_counters(&store).await?;
            print_repair_report(&report, &args.output)
        }
    }
}

async fn open_backend(config: &Config) -> Result<Backend> {
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory store; data does not outlive the process");
            Ok(Backend::Memory(MemoryStore::new()))
        }
        StoreBackend::Redis => {
            let store = RedisStore::connect(&config.store.redis_url, config.store.key_prefix.as_str())
                .await
                .with_context(|| format!("Failed to connect to {}", config.store.redis_url))?;
            tracing::info!(prefix = %store.prefix(), "connected to redis");
            Ok(Backend::Redis(store))
        }
    }
}

async fn periodic_repair(store: Store, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match repair_counters(&store).await {
            Ok(report) if !report.is_clean() => {
                tracing::warn!(
                    corrected = report.corrections.len(),
                    skipped = report.skipped,
                    "repaired drifted counters"
                );
            }
            Ok(_) => {}
            Err(err) => tracing::error!(error = %err, "counter repair failed"),
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    let (store, feed) = Store::with_feed(open_backend(&config).await?);
    tokio::spawn(TriggerRunner::new(store.clone(), feed).run());
    if let Some(period) = config.repair_interval() {
        tracing::info!(secs = period.as_secs(), "scheduling counter repair");
        tokio::spawn(periodic_repair(store.clone(), period));
    }

    let bind_addr = config.server.bind_addr.clone();
    let state = AppState::new(store, config);
    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "starting server");
    axum::serve(listener, app).await?;
    Ok(())
}
