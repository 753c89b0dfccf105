//! Proxy forwarder — authenticated forwarding of HTTP and WebSocket
//! traffic into sandbox instances.
//!
//! One code path serves both shapes: plain requests stream through a
//! hyper http1 client connection; upgrade requests additionally bridge
//! the two upgraded byte streams once the upstream answers 101.
//!
//! Authentication happens before any network call: a request without a
//! verifiable token is rejected with 401 and never touches a sandbox.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderValue, HOST, SET_COOKIE, UPGRADE};
use http::{HeaderMap, Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use sandgate_auth::{extract_token, TokenCodec, TokenSource};
use sandgate_resolver::TargetResolver;

use crate::body::{self, BoxError, ProxyBody};

/// Internal failure classification; mapped to responses at the edge.
#[derive(Debug, Error)]
enum ForwardError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("upstream unavailable: {0}")]
    Upstream(String),

    #[error("internal: {0}")]
    Internal(String),
}

/// Forwards proxy-bound traffic to resolved sandbox targets.
pub struct ProxyForwarder {
    tokens: Arc<TokenCodec>,
    resolver: Arc<TargetResolver>,
}

impl ProxyForwarder {
    pub fn new(tokens: Arc<TokenCodec>, resolver: Arc<TargetResolver>) -> Self {
        Self { tokens, resolver }
    }

    /// Authenticate, resolve, and forward one request. Never fails:
    /// every error maps to a response.
    ///
    /// - missing/invalid/expired token → 401, before any upstream I/O
    /// - upstream connect/forward failure → 502
    /// - unexpected fault → 500, detail withheld
    pub async fn forward<B>(&self, req: Request<B>, remote: SocketAddr) -> Response<ProxyBody>
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        match self.forward_inner(req, remote).await {
            Ok(resp) => resp,
            Err(ForwardError::Unauthenticated) => {
                body::json_error(StatusCode::UNAUTHORIZED, "Unauthorized")
            }
            Err(ForwardError::Upstream(e)) => {
                warn!(error = %e, "sandbox forward failed");
                body::json_error(StatusCode::BAD_GATEWAY, "Sandbox proxy error")
            }
            Err(ForwardError::Internal(e)) => {
                warn!(error = %e, "unexpected proxy fault");
                body::json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }

    async fn forward_inner<B>(
        &self,
        req: Request<B>,
        remote: SocketAddr,
    ) -> Result<Response<ProxyBody>, ForwardError>
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        // Authenticate before touching the network.
        let extracted = extract_token(&req).ok_or(ForwardError::Unauthenticated)?;
        let claims = self
            .tokens
            .verify(&extracted.value)
            .map_err(|_| ForwardError::Unauthenticated)?;

        let session = claims.target_session().to_string();
        let target = self.resolver.resolve(&session);
        debug!(session = %session, authority = %target.authority, "proxying to sandbox");

        let (mut parts, req_body) = req.into_parts();

        // Upgrade requests: take the client's pending upgrade now, so it
        // can be completed after the upstream answers 101.
        let is_upgrade = parts.headers.contains_key(UPGRADE);
        let client_upgrade = if is_upgrade {
            parts.extensions.remove::<OnUpgrade>()
        } else {
            None
        };
        if is_upgrade {
            strip_origin_headers(&mut parts.headers);
        }

        // Rewrite to origin-form and re-anchor the Host at the target.
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| "/".to_string());
        parts.uri = path_and_query
            .parse()
            .map_err(|e: http::uri::InvalidUri| ForwardError::Internal(e.to_string()))?;
        let host = HeaderValue::from_str(&target.authority)
            .map_err(|e| ForwardError::Internal(e.to_string()))?;
        parts.headers.insert(HOST, host);
        append_forwarded_headers(&mut parts.headers, remote);

        // The connect attempt is the final liveness check; a session's
        // status may have changed since resolution. Accepted race.
        let stream = TcpStream::connect(&target.authority)
            .await
            .map_err(|e| ForwardError::Upstream(e.to_string()))?;
        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ForwardError::Upstream(e.to_string()))?;
        tokio::spawn(async move {
            let _ = conn.with_upgrades().await;
        });

        let upstream_req = Request::from_parts(parts, req_body);
        let mut resp = sender
            .send_request(upstream_req)
            .await
            .map_err(|e| ForwardError::Upstream(e.to_string()))?;

        if resp.status() == StatusCode::SWITCHING_PROTOCOLS {
            if let Some(client_upgrade) = client_upgrade {
                let upstream_upgrade = hyper::upgrade::on(&mut resp);
                tokio::spawn(async move {
                    match tokio::try_join!(client_upgrade, upstream_upgrade) {
                        Ok((client_io, upstream_io)) => {
                            let mut client_io = TokioIo::new(client_io);
                            let mut upstream_io = TokioIo::new(upstream_io);
                            if let Err(e) =
                                tokio::io::copy_bidirectional(&mut client_io, &mut upstream_io)
                                    .await
                            {
                                debug!(error = %e, "upgraded tunnel closed");
                            }
                        }
                        Err(e) => warn!(error = %e, "upgrade completion failed"),
                    }
                });
            }
            let (parts, _) = resp.into_parts();
            return Ok(Response::from_parts(parts, body::empty()));
        }

        let mut resp = resp.map(|b| b.map_err(BoxError::from).boxed_unsync());

        // Session continuity: a token that arrived via query parameter is
        // re-bound as a cookie for subsequent same-origin requests.
        if extracted.source == TokenSource::QueryParam {
            append_session_cookie(resp.headers_mut(), &extracted.value);
        }

        Ok(resp)
    }
}

/// Drop origin-revealing headers so the proxy's origin never leaks into
/// the sandbox's own origin checks.
fn strip_origin_headers(headers: &mut HeaderMap) {
    headers.remove("origin");
    headers.remove("sec-websocket-origin");
}

/// `x-forwarded-for` (appended) and `x-forwarded-proto`. Multiple
/// inbound `x-forwarded-for` headers are collapsed into one chain before
/// the peer address is appended.
fn append_forwarded_headers(headers: &mut HeaderMap, remote: SocketAddr) {
    let mut chain: Vec<String> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect();
    chain.push(remote.ip().to_string());
    if let Ok(value) = HeaderValue::from_str(&chain.join(", ")) {
        headers.insert("x-forwarded-for", value);
    }
    headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
}

/// Append (never replace) the session-continuity cookie.
fn append_session_cookie(headers: &mut HeaderMap, token: &str) {
    let cookie = format!(
        "sandbox_token={}; Path=/; HttpOnly; SameSite=Lax",
        urlencoding::encode(token)
    );
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        headers.append(SET_COOKIE, value);
    }
}
