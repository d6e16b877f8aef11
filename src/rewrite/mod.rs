//! In-flight message rewriting.
//!
//! # Responsibilities
//! - Define the [`Rewriter`] seam applied to every forwarded exchange
//! - Relocate URLs between an external and an upstream path layout
//!
//! # Design Decisions
//! - Rewriters never touch connection state; they take a message and hand
//!   back a message
//! - Bodies stay lazy: a rewriter wraps the body stream instead of reading
//!   it, and buffers only through [`Body::map_full`](crate::http::Body::map_full)
//! - Framing headers are not the rewriter's concern; the writer re-derives
//!   them from whatever body comes out
//!
//! # Data Flow
//! ```text
//! client request  → rewrite_request  → upstream
//! client response ← rewrite_response ← upstream
//! ```

pub mod markup;
pub mod relocator;
pub mod url;

use crate::http::{HttpRequest, HttpResponse, RequestHead};

pub use relocator::{Relocator, RelocatorKind};
pub use url::{UrlError, UrlInfo};

/// A transform applied to a request before it goes upstream and to the
/// matching response before it goes back to the client.
///
/// Both methods default to passing the message through untouched.
pub trait Rewriter: Send + Sync {
    fn rewrite_request<'a>(&self, request: HttpRequest<'a>) -> HttpRequest<'a> {
        request
    }

    /// `request` is the client's request as it arrived, before
    /// [`rewrite_request`](Rewriter::rewrite_request) ran.
    fn rewrite_response<'a>(
        &self,
        response: HttpResponse<'a>,
        request: &RequestHead,
    ) -> HttpResponse<'a> {
        let _ = request;
        response
    }

    /// Short label for logs and the admin API.
    fn name(&self) -> &str {
        "custom"
    }
}

/// Passes everything through.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Rewriter for Identity {
    fn name(&self) -> &str {
        "identity"
    }
}
