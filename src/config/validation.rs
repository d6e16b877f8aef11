//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that every route compiles (roots parse, upstreams resolve to host:port)
//! - Validate value ranges (limits > 0, addresses well-formed)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{ProxyConfig, RouteAction};
use crate::rewrite::Relocator;
use crate::routing::parse_upstream;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("route #{0} has an empty name")]
    EmptyRouteName(usize),

    #[error("duplicate route name {0:?}")]
    DuplicateRouteName(String),

    #[error("route {route:?}: {reason}")]
    InvalidRoute { route: String, reason: String },

    #[error("{field} {value:?} is not a valid address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),

    #[error("admin.api_key must be set when the admin API is enabled")]
    MissingApiKey,
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if parse_upstream(&config.listener.bind_address).is_none() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroLimit("listener.max_connections"));
    }
    if config.limits.max_header_bytes == 0 {
        errors.push(ValidationError::ZeroLimit("limits.max_header_bytes"));
    }
    if config.limits.max_headers == 0 {
        errors.push(ValidationError::ZeroLimit("limits.max_headers"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroLimit("timeouts.connect_secs"));
    }

    let mut names = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        if route.name.trim().is_empty() {
            errors.push(ValidationError::EmptyRouteName(index));
        } else if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRouteName(route.name.clone()));
        }
        let invalid = |reason: String| ValidationError::InvalidRoute {
            route: route.name.clone(),
            reason,
        };
        match &route.action {
            RouteAction::Relocate {
                local,
                remote,
                rewriter,
            } => {
                if let Err(e) = Relocator::new(local, remote, *rewriter) {
                    errors.push(invalid(e.to_string()));
                }
            }
            RouteAction::Forward {
                path_prefix,
                upstream,
                ..
            } => {
                if parse_upstream(upstream).is_none() {
                    errors.push(invalid(format!("upstream {upstream:?} is not host:port")));
                }
                if let Some(prefix) = path_prefix {
                    if !prefix.starts_with('/') {
                        errors.push(invalid(format!("path_prefix {prefix:?} must start with '/'")));
                    }
                }
            }
        }
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: obs.metrics_address.clone(),
        });
    }

    let admin = &config.admin;
    if admin.enabled {
        if admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress {
                field: "admin.bind_address",
                value: admin.bind_address.clone(),
            });
        }
        if admin.api_key.is_empty() {
            errors.push(ValidationError::MissingApiKey);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
