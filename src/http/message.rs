//! Pieces shared by requests and responses: protocol version, framing
//! precedence and head encoding.

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::http::body::Framing;
use crate::http::error::FrameError;
use crate::http::headers::Headers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    pub(crate) fn from_minor(minor: u8) -> Self {
        match minor {
            0 => Version::Http10,
            _ => Version::Http11,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the sender of `headers` asked for a persistent connection.
///
/// HTTP/1.1 is persistent unless `Connection: close`; HTTP/1.0 only with an
/// explicit `Connection: keep-alive`.
pub fn wants_keep_alive(version: Version, headers: &Headers) -> bool {
    if headers.has_token("connection", "close") {
        return false;
    }
    match version {
        Version::Http11 => true,
        Version::Http10 => headers.has_token("connection", "keep-alive"),
    }
}

/// Parses every `Content-Length` value. All values must agree.
pub(crate) fn content_length(headers: &Headers) -> Result<Option<u64>, FrameError> {
    let mut found: Option<u64> = None;
    for raw in headers.get_all("content-length") {
        let value = std::str::from_utf8(raw)
            .map_err(|_| FrameError::malformed("non-ascii content-length"))?;
        for part in value.split(',') {
            let part = part.trim();
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(FrameError::malformed(format!("invalid content-length {part:?}")));
            }
            let n: u64 = part
                .parse()
                .map_err(|_| FrameError::malformed("content-length overflow"))?;
            match found {
                Some(prev) if prev != n => {
                    return Err(FrameError::malformed("conflicting content-length values"));
                }
                _ => found = Some(n),
            }
        }
    }
    Ok(found)
}

/// Framing of a message body.
///
/// `Transfer-Encoding` wins over `Content-Length`. A request carrying both is
/// rejected outright since the two parties could disagree on where it ends.
/// A request with a transfer coding other than a final `chunked` has no
/// determinable length and is rejected too; a response in that situation
/// runs until close.
pub(crate) fn body_framing(headers: &Headers, is_request: bool) -> Result<Framing, FrameError> {
    let codings: Vec<&str> = headers.tokens("transfer-encoding").collect();
    let length = content_length(headers)?;

    if !codings.is_empty() {
        let chunked_last = codings
            .last()
            .is_some_and(|c| c.eq_ignore_ascii_case("chunked"));
        if is_request {
            if length.is_some() {
                return Err(FrameError::malformed(
                    "both transfer-encoding and content-length present",
                ));
            }
            if !chunked_last {
                return Err(FrameError::malformed("request transfer-encoding must end in chunked"));
            }
            return Ok(Framing::Chunked);
        }
        return Ok(if chunked_last {
            Framing::Chunked
        } else {
            Framing::UntilClose
        });
    }

    Ok(match length {
        Some(n) => Framing::Length(n),
        None if is_request => Framing::None,
        None => Framing::UntilClose,
    })
}

pub(crate) fn encode_headers(headers: &Headers, out: &mut BytesMut) {
    for header in headers.iter() {
        out.put_slice(header.name.as_bytes());
        out.put_slice(b": ");
        out.put_slice(&header.value);
        out.put_slice(b"\r\n");
    }
    out.put_slice(b"\r\n");
}

/// Converts httparse headers into an ordered [`Headers`] list.
pub(crate) fn collect_headers(raw: &[httparse::Header<'_>]) -> Headers {
    raw.iter()
        .map(|h| (h.name.to_string(), h.value.to_vec()))
        .collect()
}
