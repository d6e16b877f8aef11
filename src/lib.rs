//! proxylet: HTTP/1.x reverse proxy library.
//!
//! Accepts client connections, asks a caller-supplied [`Router`] where each
//! request goes, and relays the exchange to that upstream through an
//! optional [`Rewriter`], preserving keep-alive.

// Core engine
pub mod http;
pub mod net;
pub mod proxy;
pub mod rewrite;
pub mod routing;

// Cross-cutting concerns
pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::ProxyConfig;
pub use lifecycle::Shutdown;
pub use proxy::{serve, ProxyServer, SessionSettings};
pub use rewrite::{Identity, Relocator, RelocatorKind, Rewriter};
pub use routing::{Destination, RouteDecision, RouteTable, Router, SharedRouter};
