//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Parsed request head (method, target, Host)
//!     → Router::route
//!         → router.rs (ordered route table, first match wins)
//!         → matcher.rs (evaluate match conditions)
//!     → RouteDecision::NotFound | RouteDecision::Forward(Destination)
//!
//! Route Compilation (startup and reload):
//!     RouteConfig[]
//!     → Sort by priority
//!     → Build matchers and relocators
//!     → Swap into the shared router
//! ```
//!
//! # Design Decisions
//! - The router sees only the request head; the body stays on the wire
//! - No regex in the hot path (prefix matching only)
//! - Explicit NotFound rather than a silent default route

pub mod matcher;
pub mod router;

use std::fmt;
use std::sync::Arc;

use crate::http::RequestHead;
use crate::rewrite::Rewriter;

pub use router::{parse_upstream, RouteError, RouteSummary, RouteTable, SharedRouter};

/// Decides where a request goes.
///
/// Implemented by [`RouteTable`], [`SharedRouter`] and any
/// `Fn(&RequestHead) -> RouteDecision` closure.
pub trait Router: Send + Sync {
    fn route(&self, request: &RequestHead) -> RouteDecision;
}

impl<F> Router for F
where
    F: Fn(&RequestHead) -> RouteDecision + Send + Sync,
{
    fn route(&self, request: &RequestHead) -> RouteDecision {
        self(request)
    }
}

/// Upstream endpoint plus the rewriter to apply on the way through.
#[derive(Clone)]
pub struct Destination {
    pub host: String,
    pub port: u16,
    pub rewriter: Option<Arc<dyn Rewriter>>,
}

impl Destination {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            rewriter: None,
        }
    }

    pub fn with_rewriter(mut self, rewriter: Arc<dyn Rewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("rewriter", &self.rewriter.as_ref().map(|r| r.name()))
            .finish()
    }
}

/// Outcome of a routing lookup.
#[derive(Debug, Clone)]
pub enum RouteDecision {
    NotFound,
    Forward(Destination),
}

impl From<Option<Destination>> for RouteDecision {
    fn from(dest: Option<Destination>) -> Self {
        match dest {
            Some(dest) => RouteDecision::Forward(dest),
            None => RouteDecision::NotFound,
        }
    }
}
