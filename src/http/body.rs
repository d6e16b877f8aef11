//! Lazy message bodies.
//!
//! A [`Body`] is a pull-based sequence of byte chunks. Bodies built from a
//! connection decode straight off the shared [`Prebuffered`] reader: nothing
//! is read from the socket until the consumer asks for the next chunk, and a
//! consumed body cannot be replayed.
//!
//! # Framing
//! ```text
//! None        no body by message semantics (GET without entity, HEAD reply, 204, 304)
//! Length(n)   exactly n bytes follow the head
//! Chunked     chunk-size lines, terminated by the zero-size chunk
//! UntilClose  everything up to end of stream (responses only)
//! ```

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::io::AsyncRead;

use crate::http::prebuffered::Prebuffered;

/// Largest slice of a single chunk handed out at once.
/// Bigger chunks are split across several frames.
const MAX_CHUNK: usize = 1024 * 1024;

/// Longest chunk-size or trailer line accepted.
const MAX_LINE: usize = 4096;

/// Largest trailer section accepted after the last chunk.
const MAX_TRAILERS: usize = 16 * 1024;

/// How a message body is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    None,
    Length(u64),
    Chunked,
    UntilClose,
}

impl Framing {
    /// True when the message end is known without closing the connection.
    pub fn is_delimited(&self) -> bool {
        !matches!(self, Framing::UntilClose)
    }

    /// True when no body bytes are expected at all.
    pub fn is_empty(&self) -> bool {
        matches!(self, Framing::None | Framing::Length(0))
    }
}

/// Shared flag flipped once a transport-backed body has been read to its end.
///
/// The session keeps a clone to learn whether the connection input is
/// positioned at the next message, whatever a rewriter did with the body.
#[derive(Debug, Clone, Default)]
pub struct Completion(Arc<AtomicBool>);

impl Completion {
    fn done() -> Self {
        let c = Self::default();
        c.mark();
        c
    }

    fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_complete(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One item of a body stream.
///
/// Decoded chunked bodies remember their wire layout so a pass-through
/// writer can reproduce it: the slice opening a chunk carries that chunk's
/// size, and the trailer section arrives last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Frame {
    /// Body bytes. `chunk` is the wire size of the chunk this slice opens;
    /// `None` for the rest of that chunk and for data with no chunk layout.
    Data { bytes: Bytes, chunk: Option<u64> },
    /// Trailer field lines of a chunked body, each ending in CRLF.
    Trailers(Bytes),
}

impl Frame {
    fn data(bytes: Bytes) -> Self {
        Frame::Data { bytes, chunk: None }
    }
}

/// A lazy, single-pass message body.
pub struct Body<'a> {
    framing: Framing,
    stream: BoxStream<'a, io::Result<Frame>>,
    buffered: bool,
    completion: Completion,
}

impl std::fmt::Debug for Body<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Body")
            .field("framing", &self.framing)
            .field("buffered", &self.buffered)
            .field("complete", &self.completion.is_complete())
            .finish()
    }
}

impl<'a> Body<'a> {
    /// A body that is absent by message semantics.
    pub fn empty() -> Self {
        Self {
            framing: Framing::None,
            stream: stream::empty().boxed(),
            buffered: false,
            completion: Completion::done(),
        }
    }

    /// A fully materialised body with a known length.
    pub fn full(data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        let framing = Framing::Length(data.len() as u64);
        let stream = if data.is_empty() {
            stream::empty().boxed()
        } else {
            stream::once(async move { Ok(Frame::data(data)) }).boxed()
        };
        Self {
            framing,
            stream,
            buffered: false,
            completion: Completion::done(),
        }
    }

    /// A body decoded lazily from `reader` according to `framing`.
    pub fn from_reader<R>(framing: Framing, reader: &'a mut Prebuffered<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'a,
    {
        let state = match framing {
            Framing::None | Framing::Length(0) => {
                return Self {
                    framing,
                    stream: stream::empty().boxed(),
                    buffered: false,
                    completion: Completion::done(),
                };
            }
            Framing::Length(n) => DecodeState::Length(n),
            Framing::Chunked => DecodeState::ChunkSize,
            Framing::UntilClose => DecodeState::Close,
        };
        let completion = Completion::default();
        let decoder = Decoder {
            reader,
            state,
            completion: completion.clone(),
        };
        let stream = stream::unfold(decoder, |mut decoder| async move {
            let item = decoder.next().await?;
            Some((item, decoder))
        })
        .boxed();
        Self {
            framing,
            stream,
            buffered: false,
            completion,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// True if the body will be collected before the head is written.
    pub fn is_buffered(&self) -> bool {
        self.buffered
    }

    /// Handle reporting whether the underlying transport body was fully read.
    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    /// Pulls the next chunk of payload. `None` once the body is exhausted.
    ///
    /// Chunked trailers are not payload and are skipped.
    pub async fn next_chunk(&mut self) -> Option<io::Result<Bytes>> {
        next_data(&mut self.stream).await
    }

    /// Reads the whole payload into memory.
    pub async fn collect(mut self) -> io::Result<Bytes> {
        collect_data(&mut self.stream).await
    }

    /// Reads and discards the rest of the body, returning the byte count.
    pub async fn drain(mut self) -> io::Result<u64> {
        let mut total = 0u64;
        while let Some(chunk) = self.next_chunk().await {
            total += chunk?.len() as u64;
        }
        Ok(total)
    }

    /// Transforms the body chunk by chunk, keeping it streaming.
    ///
    /// The resulting length is unknown, so a `Length` body becomes `Chunked`;
    /// the writer falls back to buffering for peers that cannot take chunks.
    /// Transformed data loses its original chunk layout; trailers are kept.
    pub fn map_chunks<F>(self, mut f: F) -> Self
    where
        F: FnMut(Bytes) -> Bytes + Send + 'a,
    {
        if self.framing == Framing::None {
            return self;
        }
        let framing = match self.framing {
            Framing::Length(_) => Framing::Chunked,
            other => other,
        };
        Self {
            framing,
            stream: self
                .stream
                .map(move |frame| {
                    frame.map(|frame| match frame {
                        Frame::Data { bytes, .. } => Frame::data(f(bytes)),
                        trailers => trailers,
                    })
                })
                .boxed(),
            buffered: self.buffered,
            completion: self.completion,
        }
    }

    /// Transforms the body as a whole.
    ///
    /// This opts into buffering: the full body is collected before anything
    /// is sent so that an exact `Content-Length` can be emitted.
    pub fn map_full<F>(self, f: F) -> Self
    where
        F: FnOnce(Bytes) -> Bytes + Send + 'a,
    {
        if self.framing == Framing::None {
            return self;
        }
        let inner = self.stream;
        let stream = stream::once(async move {
            let mut inner = inner;
            let data = collect_data(&mut inner).await?;
            Ok(Frame::data(f(data)))
        })
        .boxed();
        Self {
            framing: self.framing,
            stream,
            buffered: true,
            completion: self.completion,
        }
    }

    /// Resolves the framing this body will actually use on the wire.
    ///
    /// Buffered bodies are collected and get an exact length. Chunked bodies
    /// for peers that cannot take chunks are either close-delimited (when
    /// `close_ok`) or collected.
    pub async fn settle(self, chunked_ok: bool, close_ok: bool) -> io::Result<Self> {
        let must_collect = match self.framing {
            Framing::None => false,
            _ if self.buffered => true,
            Framing::Chunked if !chunked_ok => !close_ok,
            Framing::UntilClose => !close_ok,
            _ => false,
        };
        if must_collect {
            let completion = self.completion.clone();
            let data = self.collect().await?;
            let mut body = Body::full(data);
            body.completion = completion;
            return Ok(body);
        }
        if self.framing == Framing::Chunked && !chunked_ok {
            return Ok(Self {
                framing: Framing::UntilClose,
                ..self
            });
        }
        Ok(self)
    }

    pub(crate) fn into_stream(self) -> (Framing, BoxStream<'a, io::Result<Frame>>) {
        (self.framing, self.stream)
    }
}

async fn next_data(stream: &mut BoxStream<'_, io::Result<Frame>>) -> Option<io::Result<Bytes>> {
    loop {
        match stream.next().await? {
            Ok(Frame::Data { bytes, .. }) => return Some(Ok(bytes)),
            Ok(Frame::Trailers(_)) => continue,
            Err(e) => return Some(Err(e)),
        }
    }
}

async fn collect_data(stream: &mut BoxStream<'_, io::Result<Frame>>) -> io::Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = next_data(stream).await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

enum DecodeState {
    Length(u64),
    ChunkSize,
    /// `opening` holds the chunk size until its first slice is handed out.
    ChunkData { left: u64, opening: Option<u64> },
    ChunkEnd,
    Close,
    Finished,
}

struct Decoder<'a, R> {
    reader: &'a mut Prebuffered<R>,
    state: DecodeState,
    completion: Completion,
}

impl<R: AsyncRead + Unpin> Decoder<'_, R> {
    async fn next(&mut self) -> Option<io::Result<Frame>> {
        match self.step().await {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.state = DecodeState::Finished;
                self.completion.mark();
                None
            }
            Err(e) => {
                self.state = DecodeState::Finished;
                Some(Err(e))
            }
        }
    }

    async fn step(&mut self) -> io::Result<Option<Frame>> {
        loop {
            match self.state {
                DecodeState::Finished => return Ok(None),
                DecodeState::Length(0) => return Ok(None),
                DecodeState::Length(remaining) => {
                    self.reader.fill().await?;
                    let chunk = self.reader.split_front(clamp(remaining));
                    let left = remaining - chunk.len() as u64;
                    self.state = DecodeState::Length(left);
                    if left == 0 {
                        self.completion.mark();
                    }
                    return Ok(Some(Frame::data(chunk)));
                }
                DecodeState::ChunkSize => {
                    let line = read_line(self.reader).await?;
                    let size = parse_chunk_size(&line)?;
                    if size == 0 {
                        let trailers = read_trailers(self.reader).await?;
                        self.completion.mark();
                        self.state = DecodeState::Finished;
                        if trailers.is_empty() {
                            return Ok(None);
                        }
                        return Ok(Some(Frame::Trailers(trailers)));
                    }
                    self.state = DecodeState::ChunkData {
                        left: size,
                        opening: Some(size),
                    };
                }
                DecodeState::ChunkData { left, opening } => {
                    let want = clamp(left);
                    let mut data = BytesMut::with_capacity(want);
                    while data.len() < want {
                        self.reader.fill().await?;
                        let piece = self.reader.split_front(want - data.len());
                        data.extend_from_slice(&piece);
                    }
                    let left = left - want as u64;
                    self.state = if left == 0 {
                        DecodeState::ChunkEnd
                    } else {
                        DecodeState::ChunkData {
                            left,
                            opening: None,
                        }
                    };
                    return Ok(Some(Frame::Data {
                        bytes: data.freeze(),
                        chunk: opening,
                    }));
                }
                DecodeState::ChunkEnd => {
                    let line = read_line(self.reader).await?;
                    if !line.is_empty() {
                        return Err(invalid("missing CRLF after chunk data"));
                    }
                    self.state = DecodeState::ChunkSize;
                }
                DecodeState::Close => {
                    if self.reader.is_empty() && self.reader.buffer_more().await? == 0 {
                        return Ok(None);
                    }
                    let len = self.reader.len();
                    return Ok(Some(Frame::data(self.reader.split_front(len))));
                }
            }
        }
    }
}

fn clamp(remaining: u64) -> usize {
    remaining.min(MAX_CHUNK as u64) as usize
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// Reads one CRLF (or bare LF) terminated line, without the terminator.
async fn read_line<R: AsyncRead + Unpin>(reader: &mut Prebuffered<R>) -> io::Result<Bytes> {
    loop {
        if let Some(pos) = reader.buffer().iter().position(|&b| b == b'\n') {
            let mut line = reader.split_front(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }
            return Ok(line);
        }
        if reader.len() > MAX_LINE || reader.is_full() {
            return Err(invalid("chunk line too long"));
        }
        if reader.buffer_more().await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed inside chunked body",
            ));
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> io::Result<u64> {
    let line = std::str::from_utf8(line).map_err(|_| invalid("non-ascii chunk size"))?;
    let size = line.split(';').next().unwrap_or("").trim();
    if size.is_empty() || size.len() > 16 {
        return Err(invalid("invalid chunk size"));
    }
    u64::from_str_radix(size, 16).map_err(|_| invalid("invalid chunk size"))
}

/// Reads the trailer section up to and including the blank line. Returns
/// the field lines, each re-terminated with CRLF.
async fn read_trailers<R: AsyncRead + Unpin>(reader: &mut Prebuffered<R>) -> io::Result<Bytes> {
    let mut trailers = BytesMut::new();
    loop {
        let line = read_line(reader).await?;
        if line.is_empty() {
            return Ok(trailers.freeze());
        }
        if trailers.len() + line.len() > MAX_TRAILERS {
            return Err(invalid("chunked trailer section too large"));
        }
        trailers.extend_from_slice(&line);
        trailers.extend_from_slice(b"\r\n");
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn reader(data: &'static [u8]) -> Prebuffered<Cursor<&'static [u8]>> {
        Prebuffered::new(Cursor::new(data), 64 * 1024)
    }

    async fn chunks(mut body: Body<'_>) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Some(chunk) = body.next_chunk().await {
            out.push(chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn length_body_stops_at_boundary() {
        let mut r = reader(b"helloGET / HTTP/1.1\r\n");
        let body = Body::from_reader(Framing::Length(5), &mut r);
        let completion = body.completion();
        assert!(!completion.is_complete());
        assert_eq!(&body.collect().await.unwrap()[..], b"hello");
        assert!(completion.is_complete());
        assert_eq!(r.buffer(), b"GET / HTTP/1.1\r\n");
    }

    #[tokio::test]
    async fn length_body_short_read_is_an_error() {
        let mut r = reader(b"hel");
        let body = Body::from_reader(Framing::Length(5), &mut r);
        let err = body.collect().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn chunked_body_yields_each_chunk() {
        let mut r = reader(b"5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\nX-Trailer: 1\r\n\r\nNEXT");
        let body = Body::from_reader(Framing::Chunked, &mut r);
        let completion = body.completion();
        let got = chunks(body).await;
        assert_eq!(got, vec![Bytes::from_static(b"hello"), Bytes::from_static(b" world")]);
        assert!(completion.is_complete());
        assert_eq!(r.buffer(), b"NEXT");
    }

    #[tokio::test]
    async fn chunked_frames_keep_layout_and_trailers() {
        let mut r = reader(b"5\r\nhello\r\n0\r\nX-Sum: abc\r\n\r\n");
        let (_, mut stream) = Body::from_reader(Framing::Chunked, &mut r).into_stream();
        let mut frames = Vec::new();
        while let Some(frame) = stream.next().await {
            frames.push(frame.unwrap());
        }
        assert_eq!(
            frames,
            vec![
                Frame::Data {
                    bytes: Bytes::from_static(b"hello"),
                    chunk: Some(5),
                },
                Frame::Trailers(Bytes::from_static(b"X-Sum: abc\r\n")),
            ]
        );
    }

    #[tokio::test]
    async fn oversized_chunk_is_sliced_under_one_size() {
        let size = MAX_CHUNK + 10;
        let mut raw = format!("{size:x}\r\n").into_bytes();
        raw.extend(std::iter::repeat(b'x').take(size));
        raw.extend_from_slice(b"\r\n0\r\n\r\n");
        let mut r = Prebuffered::new(Cursor::new(raw), 64 * 1024);
        let (_, mut stream) = Body::from_reader(Framing::Chunked, &mut r).into_stream();

        let mut sizes = Vec::new();
        let mut total = 0;
        while let Some(frame) = stream.next().await {
            match frame.unwrap() {
                Frame::Data { bytes, chunk } => {
                    total += bytes.len();
                    sizes.push(chunk);
                }
                Frame::Trailers(_) => panic!("no trailers sent"),
            }
        }
        assert_eq!(total, size);
        assert_eq!(sizes, vec![Some(size as u64), None]);
    }

    #[tokio::test]
    async fn chunked_body_rejects_bad_size() {
        let mut r = reader(b"zz\r\nhello\r\n0\r\n\r\n");
        let body = Body::from_reader(Framing::Chunked, &mut r);
        let err = body.collect().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn close_delimited_reads_to_eof() {
        let mut r = reader(b"all of it");
        let body = Body::from_reader(Framing::UntilClose, &mut r);
        let completion = body.completion();
        assert_eq!(&body.collect().await.unwrap()[..], b"all of it");
        assert!(completion.is_complete());
    }

    #[tokio::test]
    async fn no_body_is_immediately_exhausted() {
        let mut r = reader(b"GET / HTTP/1.1\r\n\r\n");
        let mut body = Body::from_reader(Framing::None, &mut r);
        assert!(body.next_chunk().await.is_none());
        assert!(body.completion().is_complete());
        drop(body);
        assert_eq!(r.len(), 0);
    }

    #[tokio::test]
    async fn map_chunks_drops_known_length() {
        let body = Body::full("abc").map_chunks(|b| Bytes::from(b.to_ascii_uppercase()));
        assert_eq!(body.framing(), Framing::Chunked);
        assert_eq!(&body.collect().await.unwrap()[..], b"ABC");
    }

    #[tokio::test]
    async fn settle_buffers_full_rewrites() {
        let body = Body::full("abc").map_full(|_| Bytes::from_static(b"replaced"));
        assert!(body.is_buffered());
        let body = body.settle(true, true).await.unwrap();
        assert_eq!(body.framing(), Framing::Length(8));
        assert_eq!(&body.collect().await.unwrap()[..], b"replaced");
    }

    #[tokio::test]
    async fn settle_dechunks_for_http10() {
        let mut r = reader(b"3\r\nabc\r\n0\r\n\r\n");
        let body = Body::from_reader(Framing::Chunked, &mut r);
        let settled = body.settle(false, true).await.unwrap();
        assert_eq!(settled.framing(), Framing::UntilClose);

        let mut r = reader(b"3\r\nabc\r\n0\r\n\r\n");
        let body = Body::from_reader(Framing::Chunked, &mut r);
        let settled = body.settle(false, false).await.unwrap();
        assert_eq!(settled.framing(), Framing::Length(3));
    }
}
