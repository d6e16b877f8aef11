//! Request heads and their parser.

use bytes::{BufMut, BytesMut};
use tokio::io::{self, AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::http::body::{Body, Framing};
use crate::http::error::FrameError;
use crate::http::headers::Headers;
use crate::http::message::{self, Version};
use crate::http::prebuffered::Prebuffered;

/// Request line and header section of an HTTP/1.x request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub uri: String,
    pub version: Version,
    pub headers: Headers,
}

/// A parsed request: head plus lazy body.
#[derive(Debug)]
pub struct HttpRequest<'a> {
    pub head: RequestHead,
    pub body: Body<'a>,
}

impl<'a> HttpRequest<'a> {
    pub fn new(head: RequestHead, body: Body<'a>) -> Self {
        Self { head, body }
    }
}

impl RequestHead {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            version: Version::Http11,
            headers: Headers::new(),
        }
    }

    /// Parses a head from `buf`. Returns `None` while incomplete, otherwise
    /// the head and the number of bytes it occupied.
    pub fn parse(buf: &[u8], max_headers: usize) -> Result<Option<(usize, Self)>, FrameError> {
        let mut headers = vec![httparse::EMPTY_HEADER; max_headers];
        let mut req = httparse::Request::new(&mut headers);
        let len = match req.parse(buf)? {
            httparse::Status::Partial => return Ok(None),
            httparse::Status::Complete(len) => len,
        };
        let method = req.method.ok_or_else(|| FrameError::malformed("missing method"))?;
        let uri = req.path.ok_or_else(|| FrameError::malformed("missing request target"))?;
        let version = Version::from_minor(
            req.version
                .ok_or_else(|| FrameError::malformed("missing version"))?,
        );
        let head = Self {
            method: method.to_string(),
            uri: uri.to_string(),
            version,
            headers: message::collect_headers(req.headers),
        };
        head.validate()?;
        Ok(Some((len, head)))
    }

    /// Reads one request head off `reader`, leaving the body in place.
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
                let partial = reader.buffer().iter().any(|b| !b.is_ascii_whitespace());
                return Err(FrameError::Incomplete { partial });
            }
        }
    }

    fn validate(&self) -> Result<(), FrameError> {
        if self.version == Version::Http11 && !self.headers.contains("host") {
            return Err(FrameError::malformed("HTTP/1.1 request without Host header"));
        }
        if self.headers.get_all("host").count() > 1 {
            return Err(FrameError::malformed("multiple Host headers"));
        }
        Ok(())
    }

    /// Body framing declared by this head.
    pub fn framing(&self) -> Result<Framing, FrameError> {
        message::body_framing(&self.headers, true)
    }

    /// The `Host` header, if present.
    pub fn host(&self) -> Option<&str> {
        self.headers.get("host")
    }

    /// Path component of the request target, for origin- and absolute-form.
    pub fn path(&self) -> &str {
        let uri = self.uri.as_str();
        let path = match uri.find("://") {
            Some(idx) => {
                let rest = &uri[idx + 3..];
                rest.find(['/', '?']).map(|i| &rest[i..]).unwrap_or("/")
            }
            None => uri,
        };
        path.split(['?', '#']).next().unwrap_or(path)
    }

    pub fn is_method(&self, method: &str) -> bool {
        self.method.eq_ignore_ascii_case(method)
    }

    pub fn wants_keep_alive(&self) -> bool {
        message::wants_keep_alive(self.version, &self.headers)
    }

    pub fn encode(&self, out: &mut BytesMut) {
        out.put_slice(self.method.as_bytes());
        out.put_u8(b' ');
        out.put_slice(self.uri.as_bytes());
        out.put_u8(b' ');
        out.put_slice(self.version.as_str().as_bytes());
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
