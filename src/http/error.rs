//! Framing errors.

use std::io;

use thiserror::Error;

/// Errors produced while reading an HTTP/1.x message off a byte stream.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream ended before a complete head was read.
    ///
    /// `partial` is false when nothing at all was received, which on a
    /// keep-alive connection is just the peer going away.
    #[error("connection closed before a complete message head (partial: {partial})")]
    Incomplete { partial: bool },

    /// Start-line, headers or framing headers are unusable.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The head did not fit in the configured buffer limit.
    #[error("message head exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// Transport failure while reading.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        FrameError::Malformed(msg.into())
    }

    /// True when the peer closed the connection cleanly between messages.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, FrameError::Incomplete { partial: false })
    }
}

impl From<httparse::Error> for FrameError {
    fn from(e: httparse::Error) -> Self {
        FrameError::Malformed(e.to_string())
    }
}
