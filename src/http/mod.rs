//! HTTP/1.x stream framing.
//!
//! # Responsibilities
//! - Parse request and response heads off a byte stream
//! - Decode bodies lazily (length, chunked, close-delimited)
//! - Serialize messages with framing headers that match the body sent
//!
//! # Data Flow
//! ```text
//! client bytes
//!     → prebuffered.rs (shared read buffer, survives across requests)
//!     → request.rs / response.rs (head parse)
//!     → body.rs (lazy decode, optional transform)
//!     → write.rs (settle framing, encode)
//!     → peer bytes
//! ```

pub mod body;
pub mod error;
pub mod headers;
pub mod message;
pub mod prebuffered;
pub mod request;
pub mod response;
pub mod write;

pub use body::{Body, Completion, Framing};
pub use error::FrameError;
pub use headers::{Header, Headers};
pub use message::Version;
pub use prebuffered::Prebuffered;
pub use request::{HttpRequest, RequestHead};
pub use response::{HttpResponse, ResponseHead};
pub use write::{sync_framing, write_body, write_request, write_response};
