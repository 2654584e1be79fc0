use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use gateway_core::{AppConfig, Mode};
use gateway_server::dispatch::http;
use gateway_server::lifecycle::Lifecycle;
use gateway_server::{dispatch, streaming};
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, StructOpt)]
struct LaunchOptions {
    /// Path to the YAML config file. Missing file falls back to defaults.
    #[structopt(short = "c", long = "config", parse(from_os_str), default_value = "./config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = LaunchOptions::from_args();
    let mode = Mode::from_env();

    let config = AppConfig::load(&options.config)?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(config.logging.level.clone())
        }))
        .init();

    tracing::info!(?mode, config_path = %options.config.display(), "starting gateway");

    let lifecycle = Lifecycle::bootstrap(config, mode);
    lifecycle.spawn_idle_sweep();

    let http_host = lifecycle.state.config.http.host.clone();
    let http_port = lifecycle.state.config.http.port;
    let rpc_host = lifecycle.state.config.rpc.host.clone();
    let rpc_port = lifecycle.state.config.rpc.port;

    let rpc_state = lifecycle.state.clone();
    let rpc_task = tokio::spawn(async move {
        if let Err(err) = dispatch::rpc::serve(rpc_state, &rpc_host, rpc_port).await {
            tracing::error!(error = %err, "binary rpc surface stopped");
        }
    });

    let app: Router<()> = Router::new()
        .nest("/api/v1", http::router())
        .route("/ws/quote/:subscription_id", get(streaming::upgrade))
        .with_state(lifecycle.state.clone());

    let listener = tokio::net::TcpListener::bind((http_host.as_str(), http_port)).await?;
    tracing::info!(host = %http_host, port = http_port, "http surface listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(Lifecycle::shutdown_signal())
        .await?;

    lifecycle.graceful_shutdown().await;
    rpc_task.abort();

    Ok(())
}
