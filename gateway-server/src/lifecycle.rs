use std::sync::Arc;
use std::time::Duration;

use gateway_core::adapter::{LiveAdapter, ReadLiveAdapter, SimulationAdapter};
use gateway_core::{AppConfig, Mode, UpstreamAdapter};
use tokio::sync::Notify;

use crate::services::{DataService, TradingService};
use crate::session_registry::SessionRegistry;
use crate::subscription_manager::SubscriptionManager;

/// Everything a dispatch handler needs, handed out as `Arc<AppState>`
/// through axum's `State` extractor and the RPC dispatch loop alike.
pub struct AppState {
    pub config: AppConfig,
    pub mode: Mode,
    pub data_service: DataService,
    pub trading_service: TradingService,
    pub session_registry: SessionRegistry,
}

/// Picks the adapter variant for the process's mode, the one place in the
/// server that is allowed to know all three exist.
fn build_adapter(mode: Mode) -> Arc<dyn UpstreamAdapter> {
    match mode {
        Mode::Mock => Arc::new(SimulationAdapter::new()),
        Mode::Dev => Arc::new(ReadLiveAdapter::new()),
        Mode::Prod => Arc::new(LiveAdapter::new()),
    }
}

/// Owns cold start and graceful shutdown: builds the adapter, wires the
/// services together, and runs the idle-subscription sweep for as long as
/// the process is up.
pub struct Lifecycle {
    pub state: Arc<AppState>,
    shutdown: Arc<Notify>,
}

impl Lifecycle {
    pub fn bootstrap(config: AppConfig, mode: Mode) -> Self {
        let adapter = build_adapter(mode);
        let subscriptions =
            SubscriptionManager::new(config.upstream.caps.clone(), mode, adapter.clone());
        let data_service = DataService::new(adapter.clone(), subscriptions);
        let session_registry = SessionRegistry::new();
        let config_arc = Arc::new(config.clone());
        let trading_service =
            TradingService::new(adapter, session_registry.clone(), mode, config_arc);

        let state = Arc::new(AppState {
            config,
            mode,
            data_service,
            trading_service,
            session_registry,
        });

        Lifecycle {
            state,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Spawns the background idle-subscription sweep. Runs until
    /// `trigger_shutdown` fires.
    pub fn spawn_idle_sweep(&self) {
        let manager = self.state.data_service.subscriptions().clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let swept = manager.sweep_idle().await;
                        if swept > 0 {
                            tracing::debug!(swept, "idle subscriptions reaped");
                        }
                    }
                    _ = shutdown.notified() => {
                        tracing::info!("idle sweep task shutting down");
                        break;
                    }
                }
            }
        });
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    /// Unsubscribes every live subscription so the adapter's callback
    /// threads and streaming tasks wind down cleanly.
    pub async fn graceful_shutdown(&self) {
        tracing::info!("gateway shutting down, draining subscriptions");
        self.state.data_service.subscriptions().shutdown().await;
        self.trigger_shutdown();
    }

    /// Resolves when the process receives SIGINT/SIGTERM (or just ctrl-c
    /// on platforms without SIGTERM), for use as an axum graceful-shutdown
    /// future.
    pub async fn shutdown_signal() {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_picks_simulation_adapter_for_mock_mode() {
        let lifecycle = Lifecycle::bootstrap(AppConfig::default(), Mode::Mock);
        assert_eq!(lifecycle.state.mode, Mode::Mock);
    }

    #[tokio::test]
    async fn graceful_shutdown_drains_without_panicking() {
        let lifecycle = Lifecycle::bootstrap(AppConfig::default(), Mode::Mock);
        lifecycle.graceful_shutdown().await;
    }
}
