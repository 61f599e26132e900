//! HTTP-level tests for the WebSocket server.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use fob_hmr::HmrService;
use fob_hmr::testing::ManualChangeSource;
use fob_hmr_cli::server::StatusResponse;
use fob_hmr_cli::{HmrServer, HmrServerConfig, NativeResolver};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

struct Running {
    _temp: TempDir,
    addr: std::net::SocketAddr,
    service: Arc<HmrService>,
    _shutdown: oneshot::Sender<()>,
}

async fn start() -> Running {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    fs::write(root.join("index.js"), "export default 1;\n").unwrap();

    let config = HmrServerConfig {
        root: root.clone(),
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    };
    let resolver = Arc::new(NativeResolver::new(root, config.extensions.clone()));
    let service = HmrService::new(
        resolver,
        Arc::new(ManualChangeSource::new()),
        config.hmr_config(),
    );

    let server = HmrServer::new(config, Arc::clone(&service));
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(server.serve(listener, async move {
        let _ = rx.await;
    }));

    Running {
        _temp: temp,
        addr,
        service,
        _shutdown: tx,
    }
}

fn upgrade_request(query: &str) -> String {
    format!(
        "GET /hot?{query} HTTP/1.1\r\n\
         Host: localhost\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n"
    )
}

/// Send `request` and read until the end of the response head.
async fn send(stream: &mut TcpStream, request: &str) -> String {
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut chunk))
            .await
            .unwrap()
            .unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn status(addr: std::net::SocketAddr) -> StatusResponse {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    let body = response.split("\r\n\r\n").nth(1).unwrap();
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn test_status_without_clients() {
    let running = start().await;
    assert_eq!(
        status(running.addr).await,
        StatusResponse {
            sessions: 0,
            listening: false
        }
    );
}

#[tokio::test]
async fn test_handshake_refused_for_missing_entry() {
    let running = start().await;
    let mut stream = TcpStream::connect(running.addr).await.unwrap();

    let response = send(&mut stream, &upgrade_request("platform=ios&bundleEntry=missing.js")).await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");
    assert_eq!(running.service.session_count(), 0);
}

#[tokio::test]
async fn test_handshake_refused_for_entry_outside_root() {
    let running = start().await;
    let mut stream = TcpStream::connect(running.addr).await.unwrap();

    let response = send(&mut stream, &upgrade_request("platform=ios&bundleEntry=../../x.js")).await;
    assert!(response.starts_with("HTTP/1.1 403"), "{response}");
    assert_eq!(running.service.session_count(), 0);
    assert!(!running.service.is_listening());
}

#[tokio::test]
async fn test_handshake_requires_query() {
    let running = start().await;
    let mut stream = TcpStream::connect(running.addr).await.unwrap();

    let response = send(&mut stream, &upgrade_request("platform=ios")).await;
    assert!(response.starts_with("HTTP/1.1 400"), "{response}");
}

#[tokio::test]
async fn test_session_lives_as_long_as_socket() {
    let running = start().await;
    let mut stream = TcpStream::connect(running.addr).await.unwrap();

    let response = send(&mut stream, &upgrade_request("platform=ios&bundleEntry=index.js")).await;
    assert!(response.starts_with("HTTP/1.1 101"), "{response}");
    assert_eq!(running.service.session_count(), 1);
    assert!(status(running.addr).await.listening);

    drop(stream);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while running.service.session_count() > 0 {
        assert!(tokio::time::Instant::now() < deadline, "session never unregistered");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!running.service.is_listening());
}
