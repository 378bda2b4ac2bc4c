//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use speedtest_backend::config::SpeedtestConfig;
use speedtest_backend::http::ServerState;
use speedtest_backend::lifecycle::{build_server, serve, Shutdown, StartupError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A backend running on an ephemeral loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), StartupError>>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server task to finish.
    pub async fn stop(self) -> Result<(), StartupError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked")
    }
}

/// Config that never reaches the network on startup.
pub fn test_config() -> SpeedtestConfig {
    SpeedtestConfig {
        bind_address: "127.0.0.1".to_string(),
        listen_port: "0".to_string(),
        server_lat: 45.0,
        server_lng: 7.0,
        ipinfo_url: "http://127.0.0.1:9".to_string(),
        database_type: "memory".to_string(),
        statistics_password: "letmein".to_string(),
        shutdown_grace_secs: 2,
        ..SpeedtestConfig::default()
    }
}

/// Start the full backend and wait until it is serving.
pub async fn start_backend(config: SpeedtestConfig) -> TestServer {
    let server = build_server(&config).await.expect("startup failed");
    let mut state = server.state();

    // Pick a free port first so tests know where to connect.
    let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = reserved.local_addr().unwrap();
    drop(reserved);

    let config = SpeedtestConfig {
        listen_port: addr.port().to_string(),
        ..config
    };

    let shutdown = Shutdown::new();
    let signalled = shutdown.signalled();
    let handle = tokio::spawn(async move { serve(&config, server, signalled).await });

    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == ServerState::Serving))
        .await
        .expect("server did not start in time")
        .expect("server state channel closed");

    TestServer { addr, shutdown, handle }
}

/// Start a mock ipinfo service that answers every request with `body`.
#[allow(dead_code)]
pub async fn start_mock_ipinfo(body: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (200, body.to_string()) }).await
}

/// Start a programmable mock backend with async support.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = std::sync::Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;

                let (status, body) = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    429 => "429 Too Many Requests",
                    _ => "500 Internal Server Error",
                };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Send raw bytes and read until the server closes the connection.
#[allow(dead_code)]
pub async fn raw_exchange(addr: SocketAddr, payload: &[u8]) -> String {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let _ = stream.write_all(payload).await;
    let mut out = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out)).await;
    String::from_utf8_lossy(&out).into_owned()
}
