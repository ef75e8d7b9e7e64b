// src/main.rs
//! Fraud gate server entry point
use anyhow::Result;
use clap::{Parser, Subcommand};
use fraud_gate::api::server::FraudGateServer;
use fraud_gate::config::AppConfig;
use fraud_gate::risk::{CsvTrainer, ModelTrainer};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "fraud_gate")]
#[command(about = "PIN-gated transaction fraud scoring")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve {
        /// Port to bind, overrides PORT
        #[arg(long)]
        port: Option<u16>,
        /// Train before accepting requests instead of on first use
        #[arg(long)]
        warm: bool,
    },
    /// Train once and print the training report
    Train {
        /// Dataset path, overrides DATASET_PATH
        #[arg(long)]
        dataset: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = AppConfig::load()?;

    init_logging(config.debug)?;
    if let Some(path) = AppConfig::missing_config_path(|key| std::env::var(key).ok()) {
        warn!("⚠️ Config file {} not found, using defaults", path);
    }

    info!("Starting fraud gate v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Some(Commands::Train { dataset }) => {
            if let Some(path) = dataset {
                config.dataset_path = path;
            }
            train_once(&config)
        }
        Some(Commands::Serve { port, warm }) => {
            if let Some(port) = port {
                config.port = port;
            }
            serve(config, warm).await
        }
        None => serve(config, false).await,
    }
}

async fn serve(config: AppConfig, warm: bool) -> Result<()> {
    if config.uses_default_secret() {
        warn!("⚠️ SECRET_KEY is the built-in default; set it before exposing this server");
    }
    info!(
        "Dataset {}, fallback threshold {}",
        config.dataset_path.display(),
        config.fallback_amount_threshold
    );

    let server = FraudGateServer::new(&config);
    if warm {
        let cache = server.cache.clone();
        let ready = tokio::task::spawn_blocking(move || cache.warm_up()).await?;
        if !ready {
            warn!("⚠️ Warm-up training failed; scoring will use the amount rule until training succeeds");
        }
    }
    server.start().await
}

fn train_once(config: &AppConfig) -> Result<()> {
    let trainer = CsvTrainer::new(config.dataset_path.clone(), config.trainer_config());
    let model = trainer.train()?;
    info!("✅ Trained on {} features", model.schema().len());
    println!("{}", serde_json::to_string_pretty(model.report())?);
    println!("features: {}", model.schema().names().join(", "));
    Ok(())
}

fn init_logging(debug: bool) -> Result<()> {
    let default_filter = if debug {
        "debug,hyper=info,h2=info"
    } else {
        "info,hyper=info,h2=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_max_level(tracing::Level::TRACE)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
