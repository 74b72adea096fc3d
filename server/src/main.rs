use std::{fs::OpenOptions, path::PathBuf, sync::Arc};

use anyhow::Context;
use bus_tracker_data_management::DataManager;
use clap::Parser;
use server::{api, configuration::Configuration, server_state::ServerState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bus-server")]
#[command(about = "Serves school bus trips, attendance and the live map", long_about = None)]
struct Args {
    /// key = value configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the port from the configuration file
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut configuration = match &args.config {
        Some(path) => Configuration::load(path).with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(port) = args.port {
        configuration.port = port;
    }

    std::fs::create_dir_all(&configuration.log_dir)
        .with_context(|| format!("Failed to create log directory {}", configuration.log_dir.display()))?;
    let log_file = configuration.log_dir.join("server.log");

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .with_context(|| format!("Failed to open {}", log_file.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| format!("{}=trace,bus_tracker_lib=debug,bus_tracker_data_management=debug", env!("CARGO_CRATE_NAME")).into())
        )
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file))
        .init();

    tracing::info!("Starting server...");
    for key in &configuration.unknown_keys {
        tracing::warn!("Unknown config key: {}", key);
    }

    let data_manager = DataManager::start().await.context("Failed to load fleet data")?;
    let server_state = Arc::new(ServerState::new(data_manager, configuration.clone()));
    let app = api::router(server_state.clone());

    let listener = tokio::net::TcpListener::bind(configuration.socket_addr())
        .await
        .with_context(|| format!("Failed to bind {}", configuration.socket_addr()))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(server_state))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(state: Arc<ServerState>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
    state.stop_all_tickers().await;
}
