use clap::Parser;
use tracing_subscriber::EnvFilter;

use webcloset::api::{AppState, create_router};
use webcloset::config::{BackendKind, Config};
use webcloset::query_engine::QueryEngine;

#[derive(Debug, Parser)]
#[command(name = "webcloset", about = "Product search aggregation API")]
struct Cli {
    /// Address to listen on; overrides BIND_ADDR.
    #[arg(long)]
    bind: Option<String>,

    /// Search backend; overrides SEARCH_BACKEND.
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG wins; log crate records are bridged by the subscriber
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    let config = Config::from_lookup(|key| match (key, &cli.bind, cli.backend) {
        ("BIND_ADDR", Some(bind), _) => Some(bind.clone()),
        ("SEARCH_BACKEND", _, Some(backend)) => Some(backend.as_str().to_string()),
        _ => std::env::var(key).ok(),
    })?;

    let engine = QueryEngine::from_config(&config).await?;
    tracing::info!(backend = engine.backend_name(), "search backend ready");

    let app = create_router(AppState::new(engine, config.cors_origins.clone()));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
