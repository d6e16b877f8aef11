use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::observability::metrics::StatsSnapshot;
use crate::routing::RouteSummary;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub routes: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started.elapsed().as_secs(),
        routes: state.router.snapshot().len(),
    })
}

pub async fn get_routes(State(state): State<AdminState>) -> Json<Vec<RouteSummary>> {
    Json(state.router.snapshot().describe())
}

pub async fn get_stats(State(state): State<AdminState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot(state.tracker.active_count()))
}
