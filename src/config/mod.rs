//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors at once)
//!     → ProxyConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads and validates
//!     → routes compiled and swapped into the shared router
//! ```
//!
//! # Design Decisions
//! - All sections have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, LimitsConfig, ListenerConfig, ObservabilityConfig, ProxyConfig, RouteAction,
    RouteConfig, TimeoutConfig,
};
pub use validation::ValidationError;
pub use watcher::{reload_routes, ConfigWatcher, ReloadError};
