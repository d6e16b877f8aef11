//! Accept loop: one session task per client connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::config::ListenerConfig;
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics::ProxyStats;
use crate::proxy::session::{Session, SessionSettings};
use crate::routing::Router;

/// The proxy server. Cheap to share; the accept loop borrows it.
pub struct ProxyServer {
    router: Arc<dyn Router>,
    settings: Arc<SessionSettings>,
    tracker: ConnectionTracker,
    stats: Arc<ProxyStats>,
}

impl ProxyServer {
    pub fn new(router: Arc<dyn Router>, settings: SessionSettings) -> Self {
        Self {
            router,
            settings: Arc::new(settings),
            tracker: ConnectionTracker::new(),
            stats: Arc::new(ProxyStats::new()),
        }
    }

    /// Shares counters with the admin API.
    pub fn with_observers(mut self, tracker: ConnectionTracker, stats: Arc<ProxyStats>) -> Self {
        self.tracker = tracker;
        self.stats = stats;
        self
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    pub fn stats(&self) -> &Arc<ProxyStats> {
        &self.stats
    }

    /// Accepts connections until `shutdown` fires.
    ///
    /// Accept failures (e.g. file descriptor exhaustion) are logged and
    /// retried; they never end the loop.
    pub async fn run(&self, listener: Listener, mut shutdown: broadcast::Receiver<()>) {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "Proxy accepting connections");
        }

        loop {
            let accepted = tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
                accepted = listener.accept() => accepted,
            };

            let (stream, peer, permit) = match accepted {
                Ok(accepted) => accepted,
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            };

            let _ = stream.set_nodelay(true);
            let guard = self.tracker.track();
            self.stats.connection_opened();
            let id = guard.id();
            let session = Session::new(
                id,
                Arc::clone(&self.router),
                Arc::clone(&self.settings),
                Arc::clone(&self.stats),
            );

            tokio::spawn(
                async move {
                    session.run(stream).await;
                    drop(guard);
                    drop(permit);
                }
                .instrument(tracing::info_span!("conn", id = %id, %peer)),
            );
        }
    }
}

/// Serves `router` on `host:port` with default settings until the process
/// exits.
pub async fn serve(host: &str, port: u16, router: Arc<dyn Router>) -> Result<(), ListenerError> {
    let address = format!("{host}:{port}");
    let listener = TcpListener::bind(address.as_str())
        .await
        .map_err(|source| ListenerError::Bind { address, source })?;
    let max_connections = ListenerConfig::default().max_connections;
    let listener = Listener::from_listener(listener, max_connections);

    // kept alive so the receiver never reports a closed channel
    let (_tx, rx) = broadcast::channel(1);
    ProxyServer::new(router, SessionSettings::default())
        .run(listener, rx)
        .await;
    Ok(())
}
