//! Shared utilities for integration tests: mock upstreams, a proxy on an
//! ephemeral port, and raw HTTP client helpers.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use proxylet::http::{Body, Prebuffered, RequestHead, ResponseHead};
use proxylet::lifecycle::Shutdown;
use proxylet::net::Listener;
use proxylet::{ProxyServer, Router, SessionSettings};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A request as the mock upstream received it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub head: RequestHead,
    pub body: Bytes,
}

/// A programmable upstream on `127.0.0.1:0`.
///
/// The handler returns raw response bytes. The connection is kept open
/// for further requests unless the response carries `Connection: close`.
pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
    connections: Arc<AtomicUsize>,
}

impl MockUpstream {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Recorded) -> String + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(handler);

        {
            let requests = Arc::clone(&requests);
            let connections = Arc::clone(&connections);
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    let handler = Arc::clone(&handler);
                    let requests = Arc::clone(&requests);
                    tokio::spawn(async move {
                        let (read, mut write) = socket.into_split();
                        let mut reader = Prebuffered::new(read, 64 * 1024);
                        loop {
                            let Ok(head) = RequestHead::read(&mut reader, 64).await else {
                                break;
                            };
                            let framing = head.framing().unwrap();
                            let body = Body::from_reader(framing, &mut reader)
                                .collect()
                                .await
                                .unwrap();
                            let recorded = Recorded { head, body };
                            let response = handler(&recorded);
                            requests.lock().unwrap().push(recorded);
                            if write.write_all(response.as_bytes()).await.is_err() {
                                break;
                            }
                            if response.to_ascii_lowercase().contains("connection: close") {
                                let _ = write.shutdown().await;
                                break;
                            }
                        }
                    });
                }
            });
        }

        Self {
            addr,
            requests,
            connections,
        }
    }

    /// Answers every request with `200 OK` and `body`.
    pub async fn fixed(body: &'static str) -> Self {
        Self::start(move |_| {
            format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            )
        })
        .await
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// A proxy on `127.0.0.1:0`, stopped when dropped.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub server: Arc<ProxyServer>,
    shutdown: Shutdown,
}

impl TestProxy {
    pub async fn start(router: Arc<dyn Router>) -> Self {
        let settings = SessionSettings {
            connect_timeout: Duration::from_secs(2),
            ..SessionSettings::default()
        };
        let server = Arc::new(ProxyServer::new(router, settings));
        let listener = Listener::from_listener(TcpListener::bind("127.0.0.1:0").await.unwrap(), 64);
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let rx = shutdown.subscribe();
        {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.run(listener, rx).await });
        }
        Self {
            addr,
            server,
            shutdown,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// A port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// A reqwest client that never pools or follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

/// A raw keep-alive client connection.
pub struct RawClient {
    reader: Prebuffered<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

/// One response as the client saw it.
#[derive(Debug)]
pub struct Received {
    pub head: ResponseHead,
    pub body: Bytes,
}

impl RawClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let (read, writer) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            reader: Prebuffered::new(read, 64 * 1024),
            writer,
        }
    }

    pub async fn send(&mut self, raw: &[u8]) {
        self.writer.write_all(raw).await.unwrap();
    }

    /// Reads one response to a request made with `method`.
    pub async fn response(&mut self, method: &str) -> Received {
        let head = ResponseHead::read(&mut self.reader, 64).await.unwrap();
        let framing = head.framing(method).unwrap();
        let body = Body::from_reader(framing, &mut self.reader)
            .collect()
            .await
            .unwrap();
        Received { head, body }
    }

    /// Reads raw bytes until the proxy closes the connection.
    pub async fn read_to_close(&mut self) -> Vec<u8> {
        read_all(&mut self.reader).await
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: &mut R) -> Vec<u8> {
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), reader.read_to_end(&mut out))
        .await
        .expect("connection was not closed")
        .unwrap();
    out
}

/// Sends `raw` on a fresh connection and returns everything the proxy
/// writes back before closing.
pub async fn exchange_raw(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    String::from_utf8_lossy(&read_all(&mut stream).await).into_owned()
}
