//! HTTP server setup and the connection accept loop.
//!
//! # Responsibilities
//! - Build the Axum router and the optional TLS acceptor from config
//! - Accept connections, unwrap PROXY headers, terminate TLS
//! - Serve HTTP/1.1, and HTTP/2 when enabled (ALPN `h2` or cleartext h2c)
//! - Drain in-flight connections on shutdown, bounded by a grace period
//!
//! # Data Flow
//! ```text
//! TcpListener::accept
//!     → ProxyUnwrapper (effective client address)
//!     → TlsAcceptor (optional)
//!     → hyper-util auto::Builder (http1 only, or http1 + h2)
//!     → ConnectInfo(effective address) → Router
//! ```
//!
//! # Design Decisions
//! - One task per connection in a JoinSet; a failing connection never stops the loop
//! - `ServerState` is published on a watch channel: Starting → Serving → Draining → Stopped
//! - Connections still open when the grace period ends are aborted

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use axum::extract::ConnectInfo;
use axum::Router;
use bytes::Bytes;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tower::Service;

use crate::config::SpeedtestConfig;
use crate::http::routes::build_router;
use crate::http::state::AppState;
use crate::net::connection::ConnectionTracker;
use crate::net::proxy_protocol::PrefixedStream;
use crate::net::{load_tls_acceptor, ProxyUnwrapper, TlsError};
use crate::observability::metrics;
use crate::security::{AllowListError, ProxyAllowList};

/// Pause after an accept error that is not tied to one connection.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    Serving,
    Draining,
    Stopped,
}

/// Error type for server setup and serving.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("invalid proxy allow-list: {0}")]
    AllowList(#[from] AllowListError),

    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("listener error: {0}")]
    Io(#[from] io::Error),
}

/// HTTP server for the speed test endpoints.
pub struct HttpServer {
    router: Router,
    tls: Option<TlsAcceptor>,
    proxy: Option<ProxyUnwrapper>,
    enable_http2: bool,
    grace: Duration,
    state: watch::Sender<ServerState>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &SpeedtestConfig, state: AppState) -> Result<Self, ServeError> {
        let router = build_router(state, &config.url_base);

        let tls = if config.enable_tls {
            Some(load_tls_acceptor(
                Path::new(&config.tls_cert_file),
                Path::new(&config.tls_key_file),
                config.enable_http2,
            )?)
        } else {
            None
        };

        let proxy = if config.enable_proxyprotocol {
            let allow_list = ProxyAllowList::from_cidrs(&config.proxyprotocol_allowed_ips)?;
            tracing::info!(allowed_networks = allow_list.len(), "PROXY protocol enabled");
            Some(ProxyUnwrapper::new(allow_list))
        } else {
            None
        };

        Ok(Self::from_parts(router, tls, proxy, config.enable_http2)
            .with_grace_period(Duration::from_secs(config.shutdown_grace_secs)))
    }

    /// Assemble a server from already built parts.
    pub fn from_parts(router: Router, tls: Option<TlsAcceptor>, proxy: Option<ProxyUnwrapper>, enable_http2: bool) -> Self {
        let (state, _) = watch::channel(ServerState::Starting);
        Self {
            router,
            tls,
            proxy,
            enable_http2,
            grace: Duration::from_secs(10),
            state,
        }
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Observe state transitions.
    pub fn state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Serve `listener` until `shutdown` resolves, then drain.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServeError>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            tls = self.tls.is_some(),
            http2 = self.enable_http2,
            proxy_protocol = self.proxy.is_some(),
            "HTTP server starting"
        );

        let mut builder = auto::Builder::new(TokioExecutor::new());
        if !self.enable_http2 {
            builder = builder.http1_only();
        }

        let (drain_tx, drain_rx) = watch::channel(false);
        let tracker = ConnectionTracker::new();
        let mut connections = JoinSet::new();
        let mut outcome = Ok(());

        self.state.send_replace(ServerState::Serving);
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                () = &mut shutdown => break,
                accepted = listener.accept() => accepted,
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(error = %e, "Connection task panicked");
                        }
                    }
                    continue;
                }
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) if is_connection_error(&e) => {
                    tracing::debug!(error = %e, "Accept failed for one connection");
                    continue;
                }
                Err(e) if is_resource_error(&e) => {
                    tracing::warn!(error = %e, "Accept failed, backing off");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Listener failed");
                    outcome = Err(ServeError::Accept(e));
                    break;
                }
            };

            let guard = tracker.track();
            let connection = Connection {
                router: self.router.clone(),
                tls: self.tls.clone(),
                proxy: self.proxy.clone(),
                builder: builder.clone(),
                drain: drain_rx.clone(),
            };
            connections.spawn(async move {
                tracing::trace!(connection_id = %guard.id(), peer = %peer, "Connection accepted");
                connection.serve(stream, peer).await;
                drop(guard);
            });
        }

        drop(listener);
        self.state.send_replace(ServerState::Draining);
        tracing::info!(
            active_connections = tracker.active_count(),
            grace_secs = self.grace.as_secs(),
            "Draining connections"
        );
        drain_tx.send_replace(true);

        let drained = tokio::time::timeout(self.grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                remaining = tracker.active_count(),
                "Grace period elapsed, closing remaining connections"
            );
            connections.shutdown().await;
        }

        self.state.send_replace(ServerState::Stopped);
        tracing::info!("HTTP server stopped");
        outcome
    }
}

/// Per-connection serving context.
struct Connection {
    router: Router,
    tls: Option<TlsAcceptor>,
    proxy: Option<ProxyUnwrapper>,
    builder: auto::Builder<TokioExecutor>,
    drain: watch::Receiver<bool>,
}

impl Connection {
    async fn serve(self, stream: TcpStream, peer: SocketAddr) {
        let (stream, client) = match &self.proxy {
            Some(proxy) => match proxy.unwrap(stream, peer).await {
                Ok(unwrapped) => unwrapped,
                Err(e) => {
                    metrics::record_proxy_header_rejected();
                    tracing::warn!(peer = %peer, error = %e, "Rejecting connection with bad PROXY header");
                    return;
                }
            },
            None => (PrefixedStream::new(Bytes::new(), stream), peer),
        };

        match self.tls.clone() {
            Some(acceptor) => match acceptor.accept(stream).await {
                Ok(tls_stream) => self.serve_http(tls_stream, client).await,
                Err(e) => tracing::debug!(peer = %client, error = %e, "TLS handshake failed"),
            },
            None => self.serve_http(stream, client).await,
        }
    }

    async fn serve_http<S>(self, stream: S, client: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let router = self.router;
        let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
            request.extensions_mut().insert(ConnectInfo(client));
            router.clone().call(request)
        });

        let mut drain = self.drain;
        let connection = self.builder.serve_connection(TokioIo::new(stream), service);
        tokio::pin!(connection);

        let result = tokio::select! {
            result = connection.as_mut() => result,
            () = draining(&mut drain) => {
                connection.as_mut().graceful_shutdown();
                connection.await
            }
        };

        if let Err(e) = result {
            tracing::debug!(peer = %client, error = %e, "Connection closed with error");
        }
    }
}

async fn draining(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|draining| *draining).await;
}

fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// ENFILE, EMFILE, ENOBUFS and ENOMEM for the target platform.
#[cfg(any(target_os = "linux", target_os = "android"))]
const RESOURCE_ERRNOS: &[i32] = &[23, 24, 105, 12];

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
const RESOURCE_ERRNOS: &[i32] = &[23, 24, 55, 12];

/// WSAEMFILE and WSAENOBUFS.
#[cfg(windows)]
const RESOURCE_ERRNOS: &[i32] = &[10024, 10055];

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
    windows
)))]
const RESOURCE_ERRNOS: &[i32] = &[];

/// Out of descriptors, buffers or memory: retry once resources free up.
fn is_resource_error(e: &io::Error) -> bool {
    e.raw_os_error().is_some_and(|code| RESOURCE_ERRNOS.contains(&code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    async fn start(server: HttpServer) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<Result<(), ServeError>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(listener, async move {
            let _ = rx.await;
        }));
        (addr, tx, handle)
    }

    fn echo_router() -> Router {
        Router::new().route(
            "/whoami",
            get(|ConnectInfo(addr): ConnectInfo<SocketAddr>| async move { addr.ip().to_string() }),
        )
    }

    async fn raw_request(addr: SocketAddr, preamble: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut request = preamble.to_vec();
        request.extend_from_slice(b"GET /whoami HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n");
        let _ = stream.write_all(&request).await;
        let mut response = String::new();
        // A rejected connection may surface as a reset instead of EOF.
        let _ = stream.read_to_string(&mut response).await;
        response
    }

    #[tokio::test]
    async fn state_transitions_through_shutdown() {
        let server = HttpServer::from_parts(echo_router(), None, None, false).with_grace_period(Duration::from_secs(1));
        let mut state = server.state();
        assert_eq!(*state.borrow(), ServerState::Starting);

        let (addr, tx, handle) = start(server).await;
        state.wait_for(|s| *s == ServerState::Serving).await.unwrap();

        let response = raw_request(addr, b"").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("127.0.0.1"));

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(*state.borrow(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn trusted_proxy_header_sets_client_address() {
        let allow = ProxyAllowList::from_cidrs(&["127.0.0.0/8"]).unwrap();
        let server = HttpServer::from_parts(echo_router(), None, Some(ProxyUnwrapper::new(allow)), false);
        let (addr, tx, _handle) = start(server).await;

        let response = raw_request(addr, b"PROXY TCP4 203.0.113.7 10.0.0.1 51000 443\r\n").await;
        assert!(response.ends_with("203.0.113.7"), "{response}");
        let _ = tx.send(());
    }

    #[tokio::test]
    async fn untrusted_proxy_header_is_ignored() {
        let allow = ProxyAllowList::from_cidrs(&["192.0.2.0/24"]).unwrap();
        let server = HttpServer::from_parts(echo_router(), None, Some(ProxyUnwrapper::new(allow)), false);
        let (addr, tx, _handle) = start(server).await;

        let response = raw_request(addr, b"PROXY TCP4 203.0.113.7 10.0.0.1 51000 443\r\n").await;
        assert!(response.ends_with("127.0.0.1"), "{response}");
        let _ = tx.send(());
    }

    #[tokio::test]
    async fn malformed_proxy_header_drops_connection() {
        let server = HttpServer::from_parts(
            echo_router(),
            None,
            Some(ProxyUnwrapper::new(ProxyAllowList::allow_all())),
            false,
        );
        let (addr, tx, _handle) = start(server).await;

        let response = raw_request(addr, b"PROXY TCP4 not-an-ip 10.0.0.1 1 2\r\n").await;
        assert!(response.is_empty());

        let healthy = raw_request(addr, b"").await;
        assert!(healthy.starts_with("HTTP/1.1 200"));
        let _ = tx.send(());
    }

    #[tokio::test]
    async fn slow_connection_is_cut_after_grace_period() {
        let server = HttpServer::from_parts(echo_router(), None, None, false).with_grace_period(Duration::from_millis(200));
        let (addr, tx, handle) = start(server).await;

        let mut idle = TcpStream::connect(addr).await.unwrap();
        idle.write_all(b"GET /whoami HTTP/1.1\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        tx.send(()).unwrap();
        let finished = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(finished.is_ok());
    }

    const H2_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";
    const EMPTY_SETTINGS: [u8; 9] = [0, 0, 0, 4, 0, 0, 0, 0, 0];

    /// Frame header type byte 4 on stream 0.
    fn is_settings_frame(bytes: &[u8]) -> bool {
        bytes.len() >= 9 && bytes[3] == 4 && bytes[5..9] == [0, 0, 0, 0]
    }

    async fn h2c_exchange(addr: SocketAddr) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut hello = H2_PREFACE.to_vec();
        hello.extend_from_slice(&EMPTY_SETTINGS);
        let _ = stream.write_all(&hello).await;

        let mut reply = Vec::new();
        let mut buf = [0u8; 256];
        let _ = tokio::time::timeout(Duration::from_secs(2), async {
            while reply.len() < 9 {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => reply.extend_from_slice(&buf[..n]),
                }
            }
        })
        .await;
        reply
    }

    #[tokio::test]
    async fn cleartext_h2_is_served_when_enabled() {
        let server = HttpServer::from_parts(echo_router(), None, None, true);
        let (addr, tx, _handle) = start(server).await;

        let reply = h2c_exchange(addr).await;
        assert!(is_settings_frame(&reply), "{reply:?}");
        let _ = tx.send(());
    }

    #[tokio::test]
    async fn cleartext_h2_is_refused_when_disabled() {
        let server = HttpServer::from_parts(echo_router(), None, None, false);
        let (addr, tx, _handle) = start(server).await;

        let reply = h2c_exchange(addr).await;
        assert!(!is_settings_frame(&reply), "{reply:?}");

        let healthy = raw_request(addr, b"").await;
        assert!(healthy.starts_with("HTTP/1.1 200"));
        let _ = tx.send(());
    }

    fn fixture(name: &str) -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
    }

    /// Handshake offering both protocols; returns the one the server picked.
    async fn negotiated_alpn(addr: SocketAddr) -> Option<Vec<u8>> {
        use std::sync::Arc;
        use tokio_rustls::rustls::pki_types::ServerName;
        use tokio_rustls::rustls::{ClientConfig, RootCertStore};
        use tokio_rustls::TlsConnector;

        let mut roots = RootCertStore::empty();
        let pem = std::fs::File::open(fixture("localhost.crt")).unwrap();
        for cert in rustls_pemfile::certs(&mut std::io::BufReader::new(pem)) {
            roots.add(cert.unwrap()).unwrap();
        }
        let mut config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        let tcp = TcpStream::connect(addr).await.unwrap();
        let stream = TlsConnector::from(Arc::new(config))
            .connect(ServerName::try_from("localhost").unwrap(), tcp)
            .await
            .unwrap();
        stream.get_ref().1.alpn_protocol().map(<[u8]>::to_vec)
    }

    #[tokio::test]
    async fn tls_negotiates_h2_only_when_enabled() {
        for (enable_http2, expected) in [(true, b"h2".as_slice()), (false, b"http/1.1".as_slice())] {
            let acceptor =
                load_tls_acceptor(&fixture("localhost.crt"), &fixture("localhost.key"), enable_http2).unwrap();
            let server = HttpServer::from_parts(echo_router(), Some(acceptor), None, enable_http2);
            let (addr, tx, _handle) = start(server).await;

            assert_eq!(negotiated_alpn(addr).await.as_deref(), Some(expected), "http2={enable_http2}");
            let _ = tx.send(());
        }
    }

    #[test]
    fn accept_error_classes() {
        assert!(is_connection_error(&io::Error::from(io::ErrorKind::ConnectionAborted)));
        assert!(!is_connection_error(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(!is_resource_error(&io::Error::from(io::ErrorKind::ConnectionReset)));
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn resource_errors_use_linux_errnos() {
        assert!(is_resource_error(&io::Error::from_raw_os_error(24)));
        assert!(is_resource_error(&io::Error::from_raw_os_error(105)));
        assert!(!is_resource_error(&io::Error::from_raw_os_error(55)));
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn resource_errors_use_bsd_errnos() {
        assert!(is_resource_error(&io::Error::from_raw_os_error(24)));
        assert!(is_resource_error(&io::Error::from_raw_os_error(55)));
        assert!(!is_resource_error(&io::Error::from_raw_os_error(105)));
    }
}
