//! Admin API.
//!
//! # Endpoints
//! - `GET /admin/status`: version, uptime, route count
//! - `GET /admin/routes`: the compiled route table
//! - `GET /admin/stats`: live connection count and request totals
//!
//! Every endpoint requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::net::ConnectionTracker;
use crate::observability::metrics::ProxyStats;
use crate::routing::SharedRouter;

use self::auth::admin_auth_middleware;
use self::handlers::{get_routes, get_stats, get_status};

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub router: Arc<SharedRouter>,
    pub stats: Arc<ProxyStats>,
    pub tracker: ConnectionTracker,
    pub api_key: Arc<str>,
    pub started: Instant,
}

impl AdminState {
    pub fn new(
        router: Arc<SharedRouter>,
        stats: Arc<ProxyStats>,
        tracker: ConnectionTracker,
        api_key: &str,
    ) -> Self {
        Self {
            router,
            stats,
            tracker,
            api_key: Arc::from(api_key),
            started: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .route("/admin/stats", get(get_stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the admin API on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "Admin API listening");
    }
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouteAction, RouteConfig};
    use crate::routing::RouteTable;

    async fn start() -> (String, broadcast::Sender<()>) {
        let table = RouteTable::from_config(&[RouteConfig {
            name: "svn".into(),
            priority: 0,
            action: RouteAction::Forward {
                host: None,
                path_prefix: Some("/svn".into()),
                upstream: "127.0.0.1:3690".into(),
            },
        }])
        .unwrap();
        let state = AdminState::new(
            Arc::new(SharedRouter::new(table)),
            Arc::new(ProxyStats::new()),
            ConnectionTracker::new(),
            "secret",
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = broadcast::channel(1);
        tokio::spawn(serve(listener, state, rx));
        (base, tx)
    }

    #[tokio::test]
    async fn rejects_missing_token() {
        let (base, _tx) = start().await;
        let res = reqwest::get(format!("{base}/admin/status")).await.unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn lists_routes_and_stats() {
        let (base, _tx) = start().await;
        let client = reqwest::Client::new();

        let routes: serde_json::Value = client
            .get(format!("{base}/admin/routes"))
            .bearer_auth("secret")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(routes[0]["name"], "svn");
        assert_eq!(routes[0]["upstream"], "127.0.0.1:3690");

        let stats: serde_json::Value = client
            .get(format!("{base}/admin/stats"))
            .bearer_auth("secret")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["active_connections"], 0);
        assert_eq!(stats["total_requests"], 0);
    }
}
