//! Per-exchange failure taxonomy.

use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

use crate::http::FrameError;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("request head exceeds {limit} bytes")]
    RequestTooLarge { limit: usize },

    #[error("no route for request")]
    NotFound,

    #[error("upstream {addr} unavailable: {source}")]
    UpstreamUnavailable {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("upstream {addr} did not accept a connection within {timeout:?}")]
    UpstreamTimeout { addr: String, timeout: Duration },

    #[error("upstream protocol error: {0}")]
    UpstreamProtocol(String),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl ProxyError {
    /// Status sent to the client when nothing has been written yet.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::RequestTooLarge { .. } => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            ProxyError::NotFound => StatusCode::NOT_FOUND,
            ProxyError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamUnavailable { .. }
            | ProxyError::UpstreamProtocol(_)
            | ProxyError::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Whether the client connection must close after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProxyError::MalformedRequest(_)
                | ProxyError::RequestTooLarge { .. }
                | ProxyError::Transport(_)
        )
    }

    /// Label for the upstream error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MalformedRequest(_) => "malformed_request",
            ProxyError::RequestTooLarge { .. } => "request_too_large",
            ProxyError::NotFound => "not_found",
            ProxyError::UpstreamUnavailable { .. } => "connect",
            ProxyError::UpstreamTimeout { .. } => "connect_timeout",
            ProxyError::UpstreamProtocol(_) => "protocol",
            ProxyError::Transport(_) => "transport",
        }
    }

    /// Maps a framing failure on the client side.
    pub fn from_request(err: FrameError) -> Self {
        match err {
            FrameError::TooLarge { limit } => ProxyError::RequestTooLarge { limit },
            FrameError::Io(e) => ProxyError::Transport(e),
            FrameError::Incomplete { .. } => {
                ProxyError::MalformedRequest("connection closed inside request head".into())
            }
            FrameError::Malformed(msg) => ProxyError::MalformedRequest(msg),
        }
    }

    /// Maps a framing failure on the upstream side. Everything the
    /// upstream gets wrong is a bad gateway from the client's view.
    pub fn from_upstream(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => ProxyError::Transport(e),
            FrameError::Incomplete { partial: false } => {
                ProxyError::UpstreamProtocol("upstream closed without a response".into())
            }
            other => ProxyError::UpstreamProtocol(other.to_string()),
        }
    }
}

/// A relay that failed, and whether the client already saw a status line.
#[derive(Debug)]
pub struct RelayFailure {
    pub error: ProxyError,
    pub head_sent: bool,
}

impl RelayFailure {
    pub fn before_head(error: ProxyError) -> Self {
        Self {
            error,
            head_sent: false,
        }
    }

    pub fn after_head(error: impl Into<ProxyError>) -> Self {
        Self {
            error: error.into(),
            head_sent: true,
        }
    }
}
