//! Connection engine.
//!
//! # Data Flow
//! ```text
//! server.rs   accept loop, one task per connection
//!     → session.rs   read head → route → connect → relay → keep-alive?
//!         → http/    framing, bodies, writers
//!         → rewrite/ request and response rewriting
//! ```

pub mod error;
pub mod server;
pub mod session;

pub use error::{ProxyError, RelayFailure};
pub use server::{serve, ProxyServer};
pub use session::{Session, SessionSettings, SessionState};
