//! Response heads, their parser, and the proxy's own error responses.

use bytes::{BufMut, BytesMut};
use http::StatusCode;
use tokio::io::{self, AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::http::body::{Body, Framing};
use crate::http::error::FrameError;
use crate::http::headers::Headers;
use crate::http::message::{self, Version};
use crate::http::prebuffered::Prebuffered;

/// Status line and header section of an HTTP/1.x response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub version: Version,
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
}

/// A parsed response: head plus lazy body.
#[derive(Debug)]
pub struct HttpResponse<'a> {
    pub head: ResponseHead,
    pub body: Body<'a>,
}

impl<'a> HttpResponse<'a> {
    pub fn new(head: ResponseHead, body: Body<'a>) -> Self {
        Self { head, body }
    }
}

impl HttpResponse<'static> {
    /// A small plain-text response generated by the proxy itself.
    pub fn error(status: StatusCode, keep_alive: bool) -> Self {
        let text = status.canonical_reason().unwrap_or("Error");
        let mut head = ResponseHead::new(status);
        head.headers.append("Content-Type", "text/plain; charset=utf-8");
        head.headers
            .append("Content-Length", text.len().to_string());
        if !keep_alive {
            head.headers.append("Connection", "close");
        }
        Self {
            head,
            body: Body::full(text),
        }
    }
}

impl ResponseHead {
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: Version::Http11,
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            headers: Headers::new(),
        }
    }

    /// Parses a head from `buf`. Returns `None` while incomplete, otherwise
    /// the head and the number of bytes it occupied.
    pub fn parse(buf: &[u8], max_headers: usize) -> Result<Option<(usize, Self)>, FrameError> {
        let mut headers = vec![httparse::EMPTY_HEADER; max_headers];
        let mut res = httparse::Response::new(&mut headers);
        let len = match res.parse(buf)? {
            httparse::Status::Partial => return Ok(None),
            httparse::Status::Complete(len) => len,
        };
        let status = res
            .code
            .ok_or_else(|| FrameError::malformed("missing status code"))?;
        let version = Version::from_minor(
            res.version
                .ok_or_else(|| FrameError::malformed("missing version"))?,
        );
        Ok(Some((
            len,
            Self {
                version,
                status,
                reason: res.reason.unwrap_or("").to_string(),
                headers: message::collect_headers(res.headers),
            },
        )))
    }

    /// Reads one response head off `reader`, leaving the body in place.
    pub async fn read<R>(reader: &mut Prebuffered<R>, max_headers: usize) -> Result<Self, FrameError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            if !reader.is_empty() {
                if let Some((len, head)) = Self::parse(reader.buffer(), max_headers)? {
                    reader.discard(len);
                    return Ok(head);
                }
                if reader.is_full() {
                    return Err(FrameError::TooLarge {
                        limit: reader.len(),
                    });
                }
            }
            if reader.buffer_more().await? == 0 {
                return Err(FrameError::Incomplete {
                    partial: !reader.is_empty(),
                });
            }
        }
    }

    /// Body framing for this response to a `request_method` request.
    pub fn framing(&self, request_method: &str) -> Result<Framing, FrameError> {
        if request_method.eq_ignore_ascii_case("HEAD")
            || self.is_informational()
            || self.status == 204
            || self.status == 304
        {
            return Ok(Framing::None);
        }
        message::body_framing(&self.headers, false)
    }

    /// `1xx` responses other than `101 Switching Protocols`.
    pub fn is_interim(&self) -> bool {
        self.is_informational() && self.status != 101
    }

    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.status)
    }

    pub fn encode(&self, out: &mut BytesMut) {
        out.put_slice(self.version.as_str().as_bytes());
        out.put_u8(b' ');
        out.put_slice(self.status.to_string().as_bytes());
        out.put_u8(b' ');
        out.put_slice(self.reason.as_bytes());
        out.put_slice(b"\r\n");
        message::encode_headers(&self.headers, out);
    }

    pub async fn write<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = BytesMut::with_capacity(512);
        self.encode(&mut buf);
        writer.write_all(&buf).await
    }
}
