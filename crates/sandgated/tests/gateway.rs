//! End-to-end gateway tests: real TCP on both sides, host routing, token
//! enforcement, and the upgrade tunnel.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use sandgate_api::{build_router, ApiState, SessionService, SessionServiceConfig};
use sandgate_auth::{TokenCodec, DEFAULT_TOKEN_TTL};
use sandgate_provision::{ProvisionError, ProvisionSpec, Provisioner};
use sandgate_proxy::{HostRouter, ProxyForwarder};
use sandgate_resolver::{ResolverConfig, TargetResolver};
use sandgate_state::StateStore;
use sandgated::gateway::Gateway;

struct NoopProvisioner;

#[async_trait]
impl Provisioner for NoopProvisioner {
    async fn create(&self, spec: &ProvisionSpec) -> Result<String, ProvisionError> {
        Ok(format!("res-{}", spec.name))
    }

    async fn destroy(&self, _resource_id: &str) -> Result<(), ProvisionError> {
        Ok(())
    }
}

/// Upstream that answers every request with a small 200 and closes.
async fn spawn_http_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_head(&mut stream).await;
                let _ = stream
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nhi",
                    )
                    .await;
            });
        }
    });
    addr
}

/// Upstream that accepts any upgrade with a 101 and then echoes bytes.
async fn spawn_echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_head(&mut stream).await;
                if stream
                    .write_all(
                        b"HTTP/1.1 101 Switching Protocols\r\nupgrade: tcp\r\nconnection: upgrade\r\n\r\n",
                    )
                    .await
                    .is_err()
                {
                    return;
                }
                let mut buf = [0u8; 1024];
                loop {
                    let n = match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    if stream.write_all(&buf[..n]).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    addr
}

async fn read_head(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    while !buf.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte).await {
            Ok(0) | Err(_) => break,
            Ok(_) => buf.push(byte[0]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Assemble a gateway with all sandbox names resolving to `upstream`.
async fn spawn_gateway(upstream: SocketAddr) -> (SocketAddr, Arc<TokenCodec>, watch::Sender<bool>) {
    let store = StateStore::open_in_memory().unwrap();
    let tokens = Arc::new(TokenCodec::new("gateway-test-secret"));
    let resolver = Arc::new(TargetResolver::new(ResolverConfig {
        internal_domain: "sandbox.internal".to_string(),
        sandbox_port: 3000,
        local_mode: true,
        local_targets: HashMap::new(),
        local_fallback: Some(upstream.to_string()),
    }));
    let sessions = SessionService::new(
        store,
        Arc::new(NoopProvisioner),
        SessionServiceConfig {
            local_mode: false,
            sandbox_image: "img:latest".to_string(),
            sandbox_env: HashMap::new(),
        },
    );
    let admin = build_router(ApiState {
        sessions,
        tokens: tokens.clone(),
        admin_password: "hunter2".to_string(),
    });
    let gateway = Arc::new(Gateway::new(
        HostRouter::new("api.test", "proxy.test"),
        admin,
        ProxyForwarder::new(tokens.clone(), resolver),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = gateway.run(listener, shutdown_rx).await;
    });
    (addr, tokens, shutdown_tx)
}

/// One raw round-trip; the request must carry `connection: close`.
async fn raw_request(addr: SocketAddr, request: String) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    String::from_utf8_lossy(&out).into_owned()
}

#[tokio::test]
async fn admin_host_serves_health() {
    let upstream = spawn_http_upstream().await;
    let (addr, _tokens, _shutdown) = spawn_gateway(upstream).await;

    let response = raw_request(
        addr,
        "GET /health HTTP/1.1\r\nhost: api.test\r\nconnection: close\r\n\r\n".to_string(),
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains(r#""status":"ok""#), "{response}");
}

#[tokio::test]
async fn unknown_host_is_404() {
    let upstream = spawn_http_upstream().await;
    let (addr, _tokens, _shutdown) = spawn_gateway(upstream).await;

    let response = raw_request(
        addr,
        "GET /health HTTP/1.1\r\nhost: other.test\r\nconnection: close\r\n\r\n".to_string(),
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 404"), "{response}");
    assert!(response.contains("Not found"), "{response}");
}

#[tokio::test]
async fn proxy_host_without_token_is_401() {
    let upstream = spawn_http_upstream().await;
    let (addr, _tokens, _shutdown) = spawn_gateway(upstream).await;

    let response = raw_request(
        addr,
        "GET /anything HTTP/1.1\r\nhost: proxy.test\r\nconnection: close\r\n\r\n".to_string(),
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 401"), "{response}");
    assert!(response.contains("Unauthorized"), "{response}");
}

#[tokio::test]
async fn proxy_query_token_forwards_and_sets_cookie() {
    let upstream = spawn_http_upstream().await;
    let (addr, tokens, _shutdown) = spawn_gateway(upstream).await;
    let token = tokens.sandbox_token("demo", DEFAULT_TOKEN_TTL).unwrap();

    let response = raw_request(
        addr,
        format!(
            "GET /app?token={token} HTTP/1.1\r\nhost: proxy.test\r\nconnection: close\r\n\r\n"
        ),
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with("hi"), "{response}");
    // The URL token is persisted as a continuity cookie.
    assert!(
        response
            .to_ascii_lowercase()
            .contains("set-cookie: sandbox_token="),
        "{response}"
    );
}

#[tokio::test]
async fn proxy_bearer_token_does_not_set_cookie() {
    let upstream = spawn_http_upstream().await;
    let (addr, tokens, _shutdown) = spawn_gateway(upstream).await;
    let token = tokens.sandbox_token("demo", DEFAULT_TOKEN_TTL).unwrap();

    let response = raw_request(
        addr,
        format!(
            "GET /app HTTP/1.1\r\nhost: proxy.test\r\nauthorization: Bearer {token}\r\nconnection: close\r\n\r\n"
        ),
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(
        !response.to_ascii_lowercase().contains("set-cookie"),
        "{response}"
    );
}

#[tokio::test]
async fn admin_login_over_the_wire() {
    let upstream = spawn_http_upstream().await;
    let (addr, _tokens, _shutdown) = spawn_gateway(upstream).await;

    let body = r#"{"password":"hunter2"}"#;
    let response = raw_request(
        addr,
        format!(
            "POST /auth/login HTTP/1.1\r\nhost: api.test\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        ),
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains(r#""token":""#), "{response}");
}

#[tokio::test]
async fn upgrade_tunnels_bytes_both_ways() {
    let upstream = spawn_echo_upstream().await;
    let (addr, tokens, _shutdown) = spawn_gateway(upstream).await;
    let token = tokens.sandbox_token("demo", DEFAULT_TOKEN_TTL).unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(
            format!(
                "GET /ws?token={token} HTTP/1.1\r\nhost: proxy.test\r\nconnection: upgrade\r\nupgrade: tcp\r\norigin: http://somewhere.example\r\n\r\n"
            )
            .as_bytes(),
        )
        .await
        .unwrap();

    let head = read_head(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 101"), "{head}");

    stream.write_all(b"ping").await.unwrap();
    let mut echo = [0u8; 4];
    stream.read_exact(&mut echo).await.unwrap();
    assert_eq!(&echo, b"ping");
}
