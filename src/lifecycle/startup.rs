//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging, metrics and the route table in dependency order
//! - Start background tasks (admin API, config watcher, signal handler)
//! - Bind the proxy listener and begin accepting traffic
//! - Drain live connections once shutdown is requested
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener starts last (traffic only when ready)

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::admin::{self, AdminState};
use crate::config::{load_config, ConfigError, ConfigWatcher, ProxyConfig};
use crate::lifecycle::{signals, Shutdown};
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics::{self, ProxyStats};
use crate::observability::logging;
use crate::proxy::{ProxyServer, SessionSettings};
use crate::routing::{RouteError, RouteTable, SharedRouter};

/// How long live sessions get to finish after the accept loop stops.
const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("invalid {field} address: {value}")]
    Address { field: &'static str, value: String },

    #[error("admin API failed to bind {address}: {source}")]
    Admin {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Loads the configuration at `path` (defaults when `None`) and runs the
/// proxy until a shutdown signal arrives.
pub async fn run(path: Option<&Path>) -> Result<(), StartupError> {
    let config = match path {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "proxylet starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        routes = config.routes.len(),
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(&shutdown);
    serve(config, path, shutdown).await
}

/// Runs the proxy with an already loaded configuration until `shutdown`
/// is triggered. `path` enables route hot reload.
pub async fn serve(
    config: ProxyConfig,
    path: Option<&Path>,
    shutdown: Shutdown,
) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr =
            config
                .observability
                .metrics_address
                .parse()
                .map_err(|_| StartupError::Address {
                    field: "metrics",
                    value: config.observability.metrics_address.clone(),
                })?;
        metrics::init_metrics(addr);
    }

    let router = Arc::new(SharedRouter::new(RouteTable::from_config(&config.routes)?));
    let tracker = ConnectionTracker::new();
    let stats = Arc::new(ProxyStats::new());

    if config.admin.enabled {
        let address = config.admin.bind_address.clone();
        let listener = TcpListener::bind(address.as_str())
            .await
            .map_err(|source| StartupError::Admin { address, source })?;
        let state = AdminState::new(
            Arc::clone(&router),
            Arc::clone(&stats),
            tracker.clone(),
            &config.admin.api_key,
        );
        let rx = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = admin::serve(listener, state, rx).await {
                tracing::error!(error = %e, "Admin API stopped");
            }
        });
    }

    // dropping the handle stops the watcher
    let _watcher = match path {
        Some(path) => match ConfigWatcher::new(path, Arc::clone(&router)).run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                None
            }
        },
        None => None,
    };

    let listener = Listener::bind(&config.listener).await?;
    let server = ProxyServer::new(router, SessionSettings::from_config(&config))
        .with_observers(tracker.clone(), stats);
    server.run(listener, shutdown.subscribe()).await;

    let active = tracker.active_count();
    if active > 0 {
        tracing::info!(active, "Waiting for connections to drain");
        let left = tracker.drain(DRAIN_DEADLINE).await;
        if left > 0 {
            tracing::warn!(left, "Connections still open at shutdown");
        }
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stops_on_shutdown() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "127.0.0.1:0".into();
        let shutdown = Shutdown::new();
        let task = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { serve(config, None, shutdown).await })
        };
        while shutdown.receiver_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.trigger();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn unbindable_listener_is_fatal() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "127.0.0.1:99999".into();
        let err = serve(config, None, Shutdown::new()).await.unwrap_err();
        assert!(matches!(err, StartupError::Listener(_)));
    }
}
