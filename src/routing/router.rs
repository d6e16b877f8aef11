//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up matching route for request
//! - Return matched destination or explicit NotFound
//!
//! # Design Decisions
//! - A compiled table is immutable; reloads build a new table and swap it in
//! - O(n) scan in priority order (acceptable for typical route counts)
//! - Ties in priority keep configuration order

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use thiserror::Error;

use crate::config::schema::{RouteAction, RouteConfig};
use crate::http::RequestHead;
use crate::rewrite::{Relocator, UrlError};
use crate::routing::matcher::{AndMatcher, HostMatcher, LocalRootMatcher, Matcher, PathPrefixMatcher};
use crate::routing::{Destination, RouteDecision, Router};

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route {route:?}: {source}")]
    Url {
        route: String,
        #[source]
        source: UrlError,
    },

    #[error("route {route:?}: upstream {upstream:?} is not host:port")]
    Upstream { route: String, upstream: String },
}

/// Splits `host:port`, accepting bracketed IPv6 hosts.
pub fn parse_upstream(value: &str) -> Option<(String, u16)> {
    let (host, port) = value.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}

enum Target {
    Forward(Destination),
    Relocate(Arc<Relocator>),
}

impl Target {
    fn destination(&self) -> Destination {
        match self {
            Target::Forward(dest) => dest.clone(),
            Target::Relocate(relocator) => relocator.mapping(),
        }
    }
}

struct Route {
    name: String,
    priority: u32,
    matcher: Box<dyn Matcher>,
    target: Target,
}

/// Admin view of one compiled route.
#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub name: String,
    pub priority: u32,
    pub matcher: String,
    pub upstream: String,
    pub rewriter: Option<String>,
}

/// Ordered, immutable route list.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, RouteError> {
        let mut routes = configs
            .iter()
            .map(compile)
            .collect::<Result<Vec<_>, _>>()?;
        // stable: equal priorities keep file order
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(Self { routes })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn describe(&self) -> Vec<RouteSummary> {
        self.routes
            .iter()
            .map(|route| {
                let dest = route.target.destination();
                RouteSummary {
                    name: route.name.clone(),
                    priority: route.priority,
                    matcher: format!("{:?}", route.matcher),
                    upstream: dest.authority(),
                    rewriter: dest.rewriter.as_ref().map(|r| r.name().to_string()),
                }
            })
            .collect()
    }
}

fn compile(config: &RouteConfig) -> Result<Route, RouteError> {
    let (matcher, target): (Box<dyn Matcher>, Target) = match &config.action {
        RouteAction::Relocate {
            local,
            remote,
            rewriter,
        } => {
            let relocator = Relocator::new(local, remote, *rewriter).map_err(|source| RouteError::Url {
                route: config.name.clone(),
                source,
            })?;
            let relocator = Arc::new(relocator);
            (
                Box::new(LocalRootMatcher::new(relocator.clone())),
                Target::Relocate(relocator),
            )
        }
        RouteAction::Forward {
            host,
            path_prefix,
            upstream,
        } => {
            let (up_host, up_port) = parse_upstream(upstream).ok_or_else(|| RouteError::Upstream {
                route: config.name.clone(),
                upstream: upstream.clone(),
            })?;
            let mut conditions: Vec<Box<dyn Matcher>> = Vec::new();
            if let Some(host) = host {
                conditions.push(Box::new(HostMatcher::new(host.clone())));
            }
            if let Some(prefix) = path_prefix {
                conditions.push(Box::new(PathPrefixMatcher::new(prefix.clone())));
            }
            (
                Box::new(AndMatcher::new(conditions)),
                Target::Forward(Destination::new(up_host, up_port)),
            )
        }
    };
    Ok(Route {
        name: config.name.clone(),
        priority: config.priority,
        matcher,
        target,
    })
}

impl Router for RouteTable {
    fn route(&self, request: &RequestHead) -> RouteDecision {
        for route in &self.routes {
            if route.matcher.matches(request) {
                tracing::debug!(route = %route.name, uri = %request.uri, "Route matched");
                return RouteDecision::Forward(route.target.destination());
            }
        }
        RouteDecision::NotFound
    }
}

/// A route table that can be replaced while sessions are using it.
///
/// Each lookup loads the current table once, so a reload never splits a
/// single request across two tables.
pub struct SharedRouter {
    table: ArcSwap<RouteTable>,
}

impl SharedRouter {
    pub fn new(table: RouteTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    pub fn replace(&self, table: RouteTable) {
        tracing::info!(routes = table.len(), "Route table replaced");
        self.table.store(Arc::new(table));
    }

    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.table.load_full()
    }
}

impl Router for SharedRouter {
    fn route(&self, request: &RequestHead) -> RouteDecision {
        self.table.load().route(request)
    }
}
