//! Message serialization.
//!
//! Framing headers are always re-derived from the body that is actually
//! sent, so a rewritten body never travels under a stale `Content-Length`.

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::{self, AsyncWrite, AsyncWriteExt};

use crate::http::body::{Body, Frame, Framing};
use crate::http::headers::Headers;
use crate::http::message::Version;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;

/// Makes the framing headers in `headers` agree with `framing`.
///
/// Headers that already agree are left untouched, including their position.
pub fn sync_framing(headers: &mut Headers, framing: Framing) {
    match framing {
        Framing::None => {}
        Framing::Length(n) => {
            headers.remove("transfer-encoding");
            let value = n.to_string();
            if headers.get("content-length") != Some(value.as_str())
                || headers.get_all("content-length").count() > 1
            {
                headers.set("Content-Length", value);
            }
        }
        Framing::Chunked => {
            headers.remove("content-length");
            if !headers.has_token("transfer-encoding", "chunked") {
                headers.append("Transfer-Encoding", "chunked");
            }
        }
        Framing::UntilClose => {
            headers.remove("content-length");
            if headers.has_token("transfer-encoding", "chunked") {
                let codings: Vec<String> = headers
                    .tokens("transfer-encoding")
                    .filter(|t| !t.eq_ignore_ascii_case("chunked"))
                    .map(str::to_owned)
                    .collect();
                if codings.is_empty() {
                    headers.remove("transfer-encoding");
                } else {
                    headers.set("Transfer-Encoding", codings.join(", "));
                }
            }
        }
    }
}

/// Streams `body` to `writer` using its framing. Returns payload bytes sent.
pub async fn write_body<W>(writer: &mut W, body: Body<'_>) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let (framing, mut stream) = body.into_stream();
    let mut sent = 0u64;
    match framing {
        Framing::Chunked => {
            // Bytes still owed to the chunk currently open on the wire.
            let mut open = 0u64;
            let mut trailers = Bytes::new();
            while let Some(frame) = stream.next().await {
                let (chunk, size) = match frame? {
                    Frame::Data { bytes, chunk } => (bytes, chunk),
                    Frame::Trailers(t) => {
                        trailers = t;
                        continue;
                    }
                };
                let opens = match size {
                    Some(_) if open != 0 => return Err(short_chunk(open)),
                    Some(0) | None if open == 0 && chunk.is_empty() => continue,
                    Some(size) => Some(size),
                    None if open == 0 => Some(chunk.len() as u64),
                    None => None,
                };
                if let Some(size) = opens {
                    writer.write_all(format!("{size:x}\r\n").as_bytes()).await?;
                    open = size;
                }
                let len = chunk.len() as u64;
                if len > open {
                    return Err(invalid_data("chunk data overruns its declared size"));
                }
                writer.write_all(&chunk).await?;
                open -= len;
                sent += len;
                if open == 0 {
                    writer.write_all(b"\r\n").await?;
                }
            }
            if open != 0 {
                return Err(short_chunk(open));
            }
            writer.write_all(b"0\r\n").await?;
            writer.write_all(&trailers).await?;
            writer.write_all(b"\r\n").await?;
        }
        Framing::Length(expected) => {
            while let Some(chunk) = stream.next().await {
                let Frame::Data { bytes: chunk, .. } = chunk? else {
                    continue;
                };
                sent += chunk.len() as u64;
                if sent > expected {
                    return Err(length_mismatch(expected, sent));
                }
                writer.write_all(&chunk).await?;
            }
            if sent != expected {
                return Err(length_mismatch(expected, sent));
            }
        }
        Framing::UntilClose | Framing::None => {
            while let Some(chunk) = stream.next().await {
                let Frame::Data { bytes: chunk, .. } = chunk? else {
                    continue;
                };
                sent += chunk.len() as u64;
                writer.write_all(&chunk).await?;
            }
        }
    }
    writer.flush().await?;
    Ok(sent)
}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_owned())
}

fn short_chunk(missing: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("chunk ended {missing} bytes short of its declared size"),
    )
}

fn length_mismatch(expected: u64, actual: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("body length {actual} does not match content-length {expected}"),
    )
}

/// Serializes a request: settles the body, fixes framing headers, writes
/// head and body.
///
/// Requests are never close-delimited; an HTTP/1.0 request whose body lost
/// its length is buffered to recover one.
pub async fn write_request<W>(writer: &mut W, request: HttpRequest<'_>) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let HttpRequest { mut head, body } = request;
    let body = body.settle(head.version == Version::Http11, false).await?;
    sync_framing(&mut head.headers, body.framing());
    head.write(writer).await?;
    write_body(writer, body).await
}

/// Serializes a response for a client speaking `client_version`.
pub async fn write_response<W>(
    writer: &mut W,
    response: HttpResponse<'_>,
    client_version: Version,
) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let HttpResponse { mut head, body } = response;
    let body = body.settle(client_version == Version::Http11, true).await?;
    sync_framing(&mut head.headers, body.framing());
    head.write(writer).await?;
    write_body(writer, body).await
}
