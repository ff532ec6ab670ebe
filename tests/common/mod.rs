//! Shared utilities for integration testing: a daemon instance on an
//! ephemeral port plus mock backends for each probe family.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tempfile::TempDir;

use healthgate::cache::ResponseCache;
use healthgate::checker::CheckSettings;
use healthgate::http::{AppState, HttpServer};
use healthgate::lifecycle::Shutdown;
use healthgate::spool::SpoolStore;

/// A running daemon with handles into its subsystems.
pub struct TestApp {
    pub addr: SocketAddr,
    pub spool: Arc<SpoolStore>,
    pub cache: Arc<ResponseCache>,
    pub shutdown: Shutdown,
    _spool_dir: TempDir,
}

impl TestApp {
    #[allow(dead_code)]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Plain client that ignores any proxy configured in the environment.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[allow(dead_code)]
pub fn test_settings() -> CheckSettings {
    CheckSettings {
        timeout: Duration::from_secs(2),
        service_name_header: None,
        mysql_username: None,
        mysql_password: None,
    }
}

/// Start a daemon on an ephemeral port with a throwaway spool directory.
#[allow(dead_code)]
pub async fn spawn_app(settings: CheckSettings, allow_remote_spool_changes: bool) -> TestApp {
    let spool_dir = TempDir::new().unwrap();
    let spool = Arc::new(SpoolStore::configure(spool_dir.path(), true).unwrap());
    let cache = Arc::new(ResponseCache::new(10.0));
    let state = AppState::from_parts(
        spool.clone(),
        cache.clone(),
        settings,
        allow_remote_spool_changes,
    );

    let shutdown = Shutdown::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(state);
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestApp {
        addr,
        spool,
        cache,
        shutdown,
        _spool_dir: spool_dir,
    }
}

/// Start a mock HTTP backend returning a fixed response, counting hits.
#[allow(dead_code)]
pub async fn start_mock_backend(
    status: u16,
    body: impl Into<String>,
) -> (SocketAddr, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let body: Arc<str> = body.into().into();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let body = body.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, hits)
}

/// Start a mock redis that answers PING with `ping_reply` and INFO with
/// `info`. One command per connection, then EOF.
#[allow(dead_code)]
pub async fn start_mock_redis(ping_reply: &'static str, info: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 64];
                        let n = socket.read(&mut buf).await.unwrap_or(0);
                        let command = String::from_utf8_lossy(&buf[..n]);
                        let reply = if command.starts_with("PING") {
                            ping_reply
                        } else {
                            info
                        };
                        let _ = socket.write_all(reply.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

// Protocol-10 greeting: version 5.7.34-log, connection id 1234, scramble
// ABCDEFGH + IJKLMNOPQRST, plugin mysql_native_password.
#[allow(dead_code)]
const MYSQL_GREETING: [u8; 78] = [
    0x0a, 0x35, 0x2e, 0x37, 0x2e, 0x33, 0x34, 0x2d, 0x6c, 0x6f, 0x67, 0x00, 0xd2, 0x04, 0x00,
    0x00, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x00, 0xff, 0xff, 0x21, 0x02, 0x00,
    0xff, 0xc1, 0x15, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x49, 0x4a,
    0x4b, 0x4c, 0x4d, 0x4e, 0x4f, 0x50, 0x51, 0x52, 0x53, 0x54, 0x00, 0x6d, 0x79, 0x73, 0x71,
    0x6c, 0x5f, 0x6e, 0x61, 0x74, 0x69, 0x76, 0x65, 0x5f, 0x70, 0x61, 0x73, 0x73, 0x77, 0x6f,
    0x72, 0x64, 0x00,
];

/// Start a mock MySQL server: sends the canned greeting, reads the client
/// handshake, then answers OK or access-denied depending on `accept_auth`.
#[allow(dead_code)]
pub async fn start_mock_mysql(accept_auth: bool) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut greeting = vec![0x4e, 0x00, 0x00, 0x00];
                        greeting.extend_from_slice(&MYSQL_GREETING);
                        if socket.write_all(&greeting).await.is_err() {
                            return;
                        }

                        // Client handshake response.
                        let mut header = [0u8; 4];
                        if socket.read_exact(&mut header).await.is_err() {
                            return;
                        }
                        let len = header[0] as usize
                            | (header[1] as usize) << 8
                            | (header[2] as usize) << 16;
                        let mut payload = vec![0u8; len];
                        if socket.read_exact(&mut payload).await.is_err() {
                            return;
                        }

                        let mut reply = Vec::new();
                        if accept_auth {
                            reply.extend_from_slice(&[0x07, 0x00, 0x00, 0x02]);
                            reply.extend_from_slice(&[0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00]);
                        } else {
                            let mut body = vec![0xff, 0x15, 0x04, b'#'];
                            body.extend_from_slice(b"28000");
                            body.extend_from_slice(b"Access denied for user");
                            reply.extend_from_slice(&[body.len() as u8, 0x00, 0x00, 0x02]);
                            reply.extend_from_slice(&body);
                        }
                        if socket.write_all(&reply).await.is_err() {
                            return;
                        }

                        // COM_QUIT, or just the client hanging up.
                        let mut rest = [0u8; 16];
                        let _ = socket.read(&mut rest).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}
