//! Per-connection session state machine.
//!
//! # States
//! ```text
//! AwaitingRequest ──▶ Routing ──▶ ConnectingUpstream ──▶ Relaying
//!        ▲               │                │                  │
//!        │           NotFound      connect failure           │
//!        │               ▼                ▼                  ▼
//!        └──────── keep-alive? ◀──────────┴──────────── keep-alive?
//!                        │ no                                │ no / abort
//!                        ▼                                   ▼
//!                      Closed ◀──────────────────────────── Closed
//! ```
//!
//! # Design Decisions
//! - One upstream connection per request, no pooling
//! - The request body is sent while the response is relayed, inside the
//!   same task, so an upstream that answers early never deadlocks against
//!   an unread upload
//! - Once the client has seen a final status line, any failure closes the
//!   connection without writing anything else

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::StatusCode;
use tokio::io::{self, AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::config::ProxyConfig;
use crate::http::{
    sync_framing, write_body, write_request, write_response, Body, Completion, Framing,
    HttpRequest, HttpResponse, Prebuffered, RequestHead, ResponseHead, Version,
};
use crate::net::ConnectionId;
use crate::observability::metrics::{self, Outcome, ProxyStats};
use crate::proxy::error::{ProxyError, RelayFailure};
use crate::rewrite::Rewriter;
use crate::routing::{Destination, RouteDecision, Router};

/// Knobs a session needs; derived from [`ProxyConfig`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub connect_timeout: Duration,
    /// Maximum wait for the next request head. `None` waits forever.
    pub idle_timeout: Option<Duration>,
    pub max_header_bytes: usize,
    pub max_headers: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(60)),
            max_header_bytes: 64 * 1024,
            max_headers: 100,
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.timeouts.connect_secs),
            idle_timeout: match config.timeouts.idle_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            max_header_bytes: config.limits.max_header_bytes,
            max_headers: config.limits.max_headers,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingRequest,
    Routing,
    ConnectingUpstream,
    Relaying,
    Closed,
}

/// What the connection does after an exchange.
enum Next {
    KeepAlive,
    Close,
    Upgrade(Upstream),
}

/// Upstream halves kept alive for a protocol switch.
struct Upstream {
    reader: Prebuffered<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// Result of a response that made it to the client.
#[derive(Debug)]
struct Relayed {
    status: u16,
    keep_alive: bool,
    upgraded: bool,
    bytes: u64,
}

/// Drives one client connection from accept to close.
pub struct Session {
    id: ConnectionId,
    router: Arc<dyn Router>,
    settings: Arc<SessionSettings>,
    stats: Arc<ProxyStats>,
    state: SessionState,
    requests: u64,
}

impl Session {
    pub fn new(
        id: ConnectionId,
        router: Arc<dyn Router>,
        settings: Arc<SessionSettings>,
        stats: Arc<ProxyStats>,
    ) -> Self {
        Self {
            id,
            router,
            settings,
            stats,
            state: SessionState::AwaitingRequest,
            requests: 0,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serves requests on `stream` until either side closes.
    pub async fn run<S>(mut self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        let (read_half, mut writer) = tokio::io::split(stream);
        let mut reader = Prebuffered::new(read_half, self.settings.max_header_bytes);

        loop {
            self.transition(SessionState::AwaitingRequest);
            let Some((head, framing)) = self.read_request(&mut reader, &mut writer).await else {
                break;
            };
            self.requests += 1;
            match self.exchange(head, framing, &mut reader, &mut writer).await {
                Next::KeepAlive => continue,
                Next::Close => break,
                Next::Upgrade(upstream) => {
                    tunnel(&mut reader, &mut writer, upstream).await;
                    break;
                }
            }
        }

        self.transition(SessionState::Closed);
        let _ = writer.shutdown().await;
        tracing::debug!(requests = self.requests, "Session closed");
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            tracing::trace!(from = ?self.state, to = ?next, "Session state");
            self.state = next;
        }
    }

    /// Reads the next request head. `None` means the connection is done,
    /// either because the client left or because it was sent an error.
    async fn read_request<R, W>(
        &mut self,
        reader: &mut Prebuffered<R>,
        writer: &mut W,
    ) -> Option<(RequestHead, Framing)>
    where
        R: AsyncRead + Send + Unpin,
        W: AsyncWrite + Send + Unpin,
    {
        let start = Instant::now();
        let read = RequestHead::read(reader, self.settings.max_headers);
        let result = match self.settings.idle_timeout {
            Some(idle) => match tokio::time::timeout(idle, read).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::debug!(idle_secs = idle.as_secs(), "Idle timeout");
                    return None;
                }
            },
            None => read.await,
        };

        let err = match result.and_then(|head| Ok((head.framing()?, head))) {
            Ok((framing, head)) => return Some((head, framing)),
            Err(err) => err,
        };
        if err.is_clean_close() {
            tracing::trace!("Client closed connection");
            return None;
        }
        let error = ProxyError::from_request(err);
        if let ProxyError::Transport(e) = &error {
            tracing::debug!(error = %e, "Client transport error");
            return None;
        }

        tracing::warn!(error = %error, "Rejecting request");
        self.stats.record(Outcome::ClientError);
        metrics::record_request("-", error.status().as_u16(), start);
        let _ = respond(writer, error.status(), false, Version::Http11).await;
        None
    }

    async fn exchange<R, W>(
        &mut self,
        head: RequestHead,
        framing: Framing,
        reader: &mut Prebuffered<R>,
        writer: &mut W,
    ) -> Next
    where
        R: AsyncRead + Send + Unpin,
        W: AsyncWrite + Send + Unpin,
    {
        let start = Instant::now();

        self.transition(SessionState::Routing);
        let destination = match self.router.route(&head) {
            RouteDecision::Forward(destination) => destination,
            RouteDecision::NotFound => {
                tracing::info!(method = %head.method, uri = %head.uri, "No route for request");
                return self
                    .reject(ProxyError::NotFound, &head, framing, reader, writer, start)
                    .await;
            }
        };

        self.transition(SessionState::ConnectingUpstream);
        let upstream = match self.connect(&destination).await {
            Ok(stream) => stream,
            Err(error) => {
                tracing::warn!(error = %error, "Upstream connect failed");
                metrics::record_upstream_error(error.kind());
                return self.reject(error, &head, framing, reader, writer, start).await;
            }
        };

        self.transition(SessionState::Relaying);
        self.relay(head, framing, destination, upstream, reader, writer, start)
            .await
    }

    async fn connect(&self, destination: &Destination) -> Result<TcpStream, ProxyError> {
        let connect = TcpStream::connect((destination.host.as_str(), destination.port));
        let stream =
            connect_within(destination.authority(), self.settings.connect_timeout, connect).await?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }

    /// Answers a request that will not be forwarded. The request body is
    /// read off the connection first so the next request starts cleanly.
    async fn reject<R, W>(
        &mut self,
        error: ProxyError,
        head: &RequestHead,
        framing: Framing,
        reader: &mut Prebuffered<R>,
        writer: &mut W,
        start: Instant,
    ) -> Next
    where
        R: AsyncRead + Send + Unpin,
        W: AsyncWrite + Send + Unpin,
    {
        // a client waiting on 100-continue has not sent its body
        let awaiting_continue =
            !framing.is_empty() && head.headers.has_token("expect", "100-continue");
        let drained = !awaiting_continue && Body::from_reader(framing, reader).drain().await.is_ok();
        let keep_alive = drained && head.wants_keep_alive() && !error.is_fatal();

        let status = error.status();
        self.stats.record(match error {
            ProxyError::NotFound => Outcome::NotFound,
            _ => Outcome::UpstreamError,
        });
        metrics::record_request(&head.method, status.as_u16(), start);

        if respond(writer, status, keep_alive, head.version).await.is_err() || !keep_alive {
            return Next::Close;
        }
        Next::KeepAlive
    }

    #[allow(clippy::too_many_arguments)]
    async fn relay<R, W>(
        &mut self,
        head: RequestHead,
        framing: Framing,
        destination: Destination,
        upstream: TcpStream,
        reader: &mut Prebuffered<R>,
        writer: &mut W,
        start: Instant,
    ) -> Next
    where
        R: AsyncRead + Send + Unpin,
        W: AsyncWrite + Send + Unpin,
    {
        let (up_read, up_write) = upstream.into_split();
        let mut up_reader = Prebuffered::new(up_read, self.settings.max_header_bytes);
        let original = head.clone();
        let rewriter = destination.rewriter.clone();

        let body = Body::from_reader(framing, reader);
        let request_done = body.completion();
        let mut request = HttpRequest::new(head, body);
        if let Some(rewriter) = &rewriter {
            request = rewriter.rewrite_request(request);
        }
        tracing::debug!(
            upstream = %destination.authority(),
            method = %request.head.method,
            target = %request.head.uri,
            "Forwarding request"
        );

        let (outcome, sent) = {
            let send = async move {
                let mut up_write = up_write;
                let result = write_request(&mut up_write, request).await;
                if result.is_err() {
                    let _ = up_write.shutdown().await;
                }
                (result, up_write)
            };
            let relay = relay_response(
                &mut up_reader,
                writer,
                &original,
                rewriter.as_deref(),
                &request_done,
                self.settings.max_headers,
            );
            tokio::pin!(send);
            tokio::pin!(relay);

            let mut sent: Option<(io::Result<u64>, OwnedWriteHalf)> = None;
            let outcome = loop {
                tokio::select! {
                    done = &mut send, if sent.is_none() => {
                        if let Err(e) = &done.0 {
                            tracing::debug!(error = %e, "Request body forwarding failed");
                        }
                        sent = Some(done);
                    }
                    outcome = &mut relay => break outcome,
                }
            };
            // a tunnel needs the upstream writer back
            if sent.is_none() && matches!(&outcome, Ok(relayed) if relayed.upgraded) {
                sent = Some((&mut send).await);
            }
            (outcome, sent)
        };

        match outcome {
            Ok(relayed) => {
                self.stats.record(Outcome::Forwarded);
                metrics::record_request(&original.method, relayed.status, start);
                tracing::info!(
                    method = %original.method,
                    uri = %original.uri,
                    status = relayed.status,
                    bytes = relayed.bytes,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Request completed"
                );
                if relayed.upgraded {
                    return match sent {
                        Some((Ok(_), writer)) => Next::Upgrade(Upstream {
                            reader: up_reader,
                            writer,
                        }),
                        _ => Next::Close,
                    };
                }
                if relayed.keep_alive {
                    Next::KeepAlive
                } else {
                    Next::Close
                }
            }
            Err(failure) => {
                metrics::record_upstream_error(failure.error.kind());
                if failure.head_sent {
                    tracing::warn!(error = %failure.error, "Relay aborted after response head");
                    self.stats.record(Outcome::Aborted);
                    return Next::Close;
                }
                let status = failure.error.status();
                tracing::warn!(error = %failure.error, status = status.as_u16(), "Upstream failed");
                self.stats.record(Outcome::UpstreamError);
                metrics::record_request(&original.method, status.as_u16(), start);
                let _ = respond(writer, status, false, original.version).await;
                Next::Close
            }
        }
    }
}

/// Bounds an upstream connect attempt and maps its failure.
async fn connect_within<F, T>(addr: String, timeout: Duration, connect: F) -> Result<T, ProxyError>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => {
            tracing::debug!(upstream = %addr, "Upstream connected");
            Ok(stream)
        }
        Ok(Err(source)) => Err(ProxyError::UpstreamUnavailable { addr, source }),
        Err(_) => Err(ProxyError::UpstreamTimeout { addr, timeout }),
    }
}

/// Reads the upstream response and streams it to the client.
async fn relay_response<U, W>(
    upstream: &mut Prebuffered<U>,
    client: &mut W,
    request: &RequestHead,
    rewriter: Option<&dyn Rewriter>,
    request_done: &Completion,
    max_headers: usize,
) -> Result<Relayed, RelayFailure>
where
    U: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin,
{
    let head = loop {
        let head = ResponseHead::read(upstream, max_headers)
            .await
            .map_err(|e| RelayFailure::before_head(ProxyError::from_upstream(e)))?;
        if !head.is_interim() {
            break head;
        }
        if request.version == Version::Http11 {
            tracing::debug!(status = head.status, "Relaying interim response");
            write_interim(client, &head).await.map_err(RelayFailure::after_head)?;
        }
    };

    let framing = head
        .framing(&request.method)
        .map_err(|e| RelayFailure::before_head(ProxyError::from_upstream(e)))?;
    let upgraded = head.status == 101;

    let mut response = HttpResponse::new(head, Body::from_reader(framing, upstream));
    if let Some(rewriter) = rewriter {
        response = rewriter.rewrite_response(response, request);
    }
    let HttpResponse { mut head, body } = response;
    let body = body
        .settle(request.version == Version::Http11, true)
        .await
        .map_err(|e| RelayFailure::before_head(ProxyError::Transport(e)))?;
    let framing = body.framing();

    let keep_alive = !upgraded
        && request.wants_keep_alive()
        && framing.is_delimited()
        && !head.headers.has_token("connection", "close")
        && request_done.is_complete();

    if !upgraded {
        if !keep_alive {
            head.headers.set("Connection", "close");
        } else if head.version == Version::Http10 || request.version == Version::Http10 {
            head.headers.set("Connection", "keep-alive");
        }
    }
    sync_framing(&mut head.headers, framing);

    let status = head.status;
    head.write(client).await.map_err(RelayFailure::after_head)?;
    let bytes = write_body(client, body).await.map_err(RelayFailure::after_head)?;

    Ok(Relayed {
        status,
        keep_alive,
        upgraded,
        bytes,
    })
}

async fn write_interim<W>(client: &mut W, head: &ResponseHead) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    head.write(client).await?;
    client.flush().await
}

/// Writes a proxy-generated error page.
async fn respond<W>(
    writer: &mut W,
    status: StatusCode,
    keep_alive: bool,
    client_version: Version,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut response = HttpResponse::error(status, keep_alive);
    if keep_alive && client_version == Version::Http10 {
        response.head.headers.set("Connection", "keep-alive");
    }
    write_response(writer, response, client_version).await.map(|_| ())
}

/// Splices client and upstream together after `101 Switching Protocols`.
async fn tunnel<R, W>(client_reader: &mut Prebuffered<R>, client_writer: &mut W, upstream: Upstream)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Upstream {
        reader: mut up_reader,
        writer: mut up_writer,
    } = upstream;
    let start = Instant::now();
    let (up, down) = tokio::join!(
        async {
            let res = io::copy(client_reader, &mut up_writer).await;
            up_writer.shutdown().await.ok();
            res
        },
        async {
            let res = io::copy(&mut up_reader, client_writer).await;
            client_writer.shutdown().await.ok();
            res
        }
    );
    tracing::debug!(?up, ?down, elapsed = ?start.elapsed(), "Tunnel closed");
}

#[cfg(test)]
mod tests {
    use tokio::io::{duplex, AsyncReadExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::rewrite::{Relocator, RelocatorKind};

    fn session(router: impl Router + 'static) -> Session {
        session_with(router, SessionSettings::default())
    }

    fn session_with(router: impl Router + 'static, settings: SessionSettings) -> Session {
        Session::new(
            ConnectionId::new(),
            Arc::new(router),
            Arc::new(settings),
            Arc::new(ProxyStats::new()),
        )
    }

    fn nowhere(_: &RequestHead) -> RouteDecision {
        RouteDecision::NotFound
    }

    async fn read_response<R>(reader: &mut Prebuffered<R>) -> String
    where
        R: AsyncRead + Unpin + Send,
    {
        let head = ResponseHead::read(reader, 32).await.unwrap();
        let framing = head.framing("GET").unwrap();
        let body = Body::from_reader(framing, reader).collect().await.unwrap();
        format!("{} {}", head.status, String::from_utf8_lossy(&body))
    }

    #[tokio::test]
    async fn not_found_keeps_connection_open() {
        let (client, server) = duplex(64 * 1024);
        let task = tokio::spawn(session(nowhere).run(server));

        let (read, mut write) = tokio::io::split(client);
        let mut reader = Prebuffered::new(read, 64 * 1024);

        write
            .write_all(b"GET /unmapped HTTP/1.1\r\nHost: a\r\nConnection: keep-alive\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(read_response(&mut reader).await, "404 Not Found");

        write
            .write_all(b"GET /again HTTP/1.1\r\nHost: a\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(read_response(&mut reader).await, "404 Not Found");

        task.await.unwrap();
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn not_found_drains_request_body() {
        let (mut client, server) = duplex(64 * 1024);
        tokio::spawn(session(nowhere).run(server));

        client
            .write_all(b"PUT /x HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\n\r\nhelloGET /y HTTP/1.1\r\nHost: a\r\n\r\n")
            .await
            .unwrap();
        let mut reader = Prebuffered::new(&mut client, 64 * 1024);
        assert_eq!(read_response(&mut reader).await, "404 Not Found");
        assert_eq!(read_response(&mut reader).await, "404 Not Found");
    }

    #[tokio::test]
    async fn malformed_request_gets_400_and_close() {
        let (mut client, server) = duplex(64 * 1024);
        let task = tokio::spawn(session(nowhere).run(server));

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn silent_close_on_idle_eof() {
        let (client, server) = duplex(1024);
        let task = tokio::spawn(session(nowhere).run(server));
        drop(client);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn idle_keep_alive_connection_is_closed_silently() {
        let settings = SessionSettings {
            idle_timeout: Some(Duration::from_millis(50)),
            ..SessionSettings::default()
        };
        let (client, server) = duplex(64 * 1024);
        let task = tokio::spawn(session_with(nowhere, settings).run(server));

        let (read, mut write) = tokio::io::split(client);
        let mut reader = Prebuffered::new(read, 64 * 1024);
        write
            .write_all(b"GET /x HTTP/1.1\r\nHost: a\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(read_response(&mut reader).await, "404 Not Found");

        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), reader.read_to_end(&mut rest))
            .await
            .expect("idle connection was not closed")
            .unwrap();
        assert!(rest.is_empty());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stalled_connect_times_out_as_gateway_timeout() {
        let err = connect_within(
            "upstream:80".to_string(),
            Duration::from_millis(20),
            std::future::pending::<io::Result<()>>(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamTimeout { .. }));
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(!err.is_fatal());

        let (client, server) = duplex(64 * 1024);
        let (server_read, mut server_write) = tokio::io::split(server);
        let mut server_reader = Prebuffered::new(server_read, 64 * 1024);
        let head = RequestHead::new("GET", "/slow");
        let next = session(nowhere)
            .reject(err, &head, Framing::None, &mut server_reader, &mut server_write, Instant::now())
            .await;
        assert!(matches!(next, Next::KeepAlive));

        let (read, _write) = tokio::io::split(client);
        let mut reader = Prebuffered::new(read, 64 * 1024);
        assert_eq!(read_response(&mut reader).await, "504 Gateway Timeout");
    }

    #[tokio::test]
    async fn upgrade_turns_connection_into_tunnel() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = upstream.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = upstream.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut reader = Prebuffered::new(read, 64 * 1024);
            RequestHead::read(&mut reader, 32).await.unwrap();
            write
                .write_all(b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: echo\r\n\r\n")
                .await
                .unwrap();
            let _ = io::copy(&mut reader, &mut write).await;
        });

        let router = move |_: &RequestHead| RouteDecision::Forward(Destination::new("127.0.0.1", port));
        let (client, server) = duplex(64 * 1024);
        let task = tokio::spawn(session(router).run(server));

        let (read, mut write) = tokio::io::split(client);
        let mut reader = Prebuffered::new(read, 64 * 1024);
        write
            .write_all(b"GET /chat HTTP/1.1\r\nHost: a\r\nConnection: Upgrade\r\nUpgrade: echo\r\n\r\n")
            .await
            .unwrap();
        let head = ResponseHead::read(&mut reader, 32).await.unwrap();
        assert_eq!(head.status, 101);
        assert_eq!(head.headers.get("upgrade"), Some("echo"));

        write.write_all(b"ping, not http").await.unwrap();
        let mut echoed = [0u8; 14];
        reader.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"ping, not http");

        write.shutdown().await.unwrap();
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn refused_upstream_is_bad_gateway() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let router = move |_: &RequestHead| RouteDecision::Forward(Destination::new("127.0.0.1", port));
        let (mut client, server) = duplex(64 * 1024);
        tokio::spawn(session(router).run(server));

        client
            .write_all(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n")
            .await
            .unwrap();
        let (read, mut write) = tokio::io::split(client);
        let mut reader = Prebuffered::new(read, 64 * 1024);
        assert_eq!(read_response(&mut reader).await, "502 Bad Gateway");

        write
            .write_all(b"GET / HTTP/1.1\r\nHost: a\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(read_response(&mut reader).await, "502 Bad Gateway");
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn relocated_exchange_round_trip() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = upstream.local_addr().unwrap().port();
        let remote = format!("http://127.0.0.1:{port}/");
        let upstream_task = tokio::spawn(async move {
            let (mut stream, _) = upstream.accept().await.unwrap();
            let mut reader = Prebuffered::new(&mut stream, 64 * 1024);
            let head = RequestHead::read(&mut reader, 32).await.unwrap();
            drop(reader);
            let location = format!("http://127.0.0.1:{port}/trunk/newfile.txt");
            let response = format!(
                "HTTP/1.1 201 Created\r\nLocation: {location}\r\nContent-Length: 0\r\n\r\n"
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            head
        });

        let relocator = Arc::new(Relocator::new("/svn", &remote, RelocatorKind::Plain).unwrap());
        let router = move |req: &RequestHead| {
            if relocator.matches_local(&req.uri) {
                RouteDecision::Forward(relocator.mapping())
            } else {
                RouteDecision::NotFound
            }
        };
        let (mut client, server) = duplex(64 * 1024);
        tokio::spawn(session(router).run(server));

        client
            .write_all(b"PUT /svn/trunk/newfile.txt HTTP/1.1\r\nHost: proxy.test\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();

        let mut reader = Prebuffered::new(&mut client, 64 * 1024);
        let head = ResponseHead::read(&mut reader, 32).await.unwrap();
        assert_eq!(head.status, 201);
        assert_eq!(
            head.headers.get("location"),
            Some("http://proxy.test/svn/trunk/newfile.txt")
        );

        let seen = upstream_task.await.unwrap();
        assert_eq!(seen.uri, "/trunk/newfile.txt");
        assert_eq!(seen.host(), Some(format!("127.0.0.1:{port}").as_str()));
    }

    #[test]
    fn settings_from_config() {
        let mut config = ProxyConfig::default();
        config.timeouts.idle_secs = 0;
        let settings = SessionSettings::from_config(&config);
        assert_eq!(settings.idle_timeout, None);
        assert_eq!(settings.connect_timeout, Duration::from_secs(5));
    }
}
