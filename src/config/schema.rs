//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::rewrite::RelocatorKind;

/// Root configuration for the reverse proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Protocol limits.
    pub limits: LimitsConfig,

    /// Route definitions, checked in priority order.
    pub routes: Vec<RouteConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// A single route.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging and the admin API.
    pub name: String,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,

    #[serde(flatten)]
    pub action: RouteAction,
}

/// What a matching route does with the request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RouteAction {
    /// Serve `local` from `remote`, rewriting URLs both ways.
    Relocate {
        /// Externally visible root (`/svn` or `http://www.example.com/svn`).
        local: String,
        /// Upstream root (`http://svn.example.com/`).
        remote: String,
        #[serde(default)]
        rewriter: RelocatorKind,
    },

    /// Forward untouched to a fixed upstream.
    Forward {
        /// Host header to match (exact match).
        #[serde(default)]
        host: Option<String>,
        /// Path prefix to match.
        #[serde(default)]
        path_prefix: Option<String>,
        /// Upstream `host:port`.
        upstream: String,
    },
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Idle keep-alive timeout between requests in seconds (0 disables).
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            idle_secs: 60,
        }
    }
}

/// Limits applied while framing messages.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted request or response head, in bytes.
    pub max_header_bytes: usize,

    /// Largest number of header lines in one head.
    pub max_headers: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024,
            max_headers: 100,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_route_kinds() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:8080"

            [[routes]]
            name = "svn"
            kind = "relocate"
            local = "/svn"
            remote = "http://svn.example.com/"
            rewriter = "svn"
            priority = 10

            [[routes]]
            name = "site"
            kind = "forward"
            host = "www.example.com"
            upstream = "127.0.0.1:3000"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.max_connections, 10_000);
        assert_eq!(config.limits.max_headers, 100);
        assert_eq!(config.routes.len(), 2);
        match &config.routes[0].action {
            RouteAction::Relocate { rewriter, .. } => assert_eq!(*rewriter, RelocatorKind::Svn),
            other => panic!("unexpected {other:?}"),
        }
        match &config.routes[1].action {
            RouteAction::Forward { path_prefix, upstream, .. } => {
                assert!(path_prefix.is_none());
                assert_eq!(upstream, "127.0.0.1:3000");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(config.routes[1].priority, 0);
    }
}
