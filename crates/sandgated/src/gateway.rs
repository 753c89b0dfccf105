//! Host-routed gateway: one listener, three surfaces.
//!
//! Every accepted connection is served by a hyper http1 connection with
//! upgrades enabled, so WebSocket traffic rides the same listener as
//! plain HTTP. Per request, the declared host picks the surface:
//!
//! - admin host → the axum admin router
//! - proxy host → the authenticated sandbox forwarder
//! - anything else → 404
//!
//! Admin responses and forwarder responses unify on the proxy body type,
//! keeping the connection-serving code path shape-agnostic.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use http::header::HOST;
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceExt;
use tracing::{debug, info, warn};

use sandgate_proxy::body::{self, BoxError, ProxyBody};
use sandgate_proxy::{HostClass, HostRouter, ProxyForwarder};

/// The daemon's front door. Owns the host classifier and both surfaces.
pub struct Gateway {
    hosts: HostRouter,
    admin: Router,
    forwarder: ProxyForwarder,
}

impl Gateway {
    pub fn new(hosts: HostRouter, admin: Router, forwarder: ProxyForwarder) -> Self {
        Self {
            hosts,
            admin,
            forwarder,
        }
    }

    /// Accept loop. Each connection is served on its own task with
    /// upgrades enabled; the loop exits on the shutdown signal.
    pub async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        info!(addr = %listener.local_addr()?, "gateway listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            warn!(error = %err, "accept failed");
                            continue;
                        }
                    };
                    let gateway = self.clone();
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            let gateway = gateway.clone();
                            async move {
                                Ok::<_, std::convert::Infallible>(gateway.handle(req, remote).await)
                            }
                        });
                        if let Err(err) = hyper::server::conn::http1::Builder::new()
                            .serve_connection(io, service)
                            .with_upgrades()
                            .await
                        {
                            debug!(error = %err, "connection closed with error");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    info!("gateway shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle(&self, req: Request<Incoming>, remote: SocketAddr) -> Response<ProxyBody> {
        let host = declared_host(&req);
        match self.hosts.classify(host.as_deref()) {
            HostClass::Proxy => self.forwarder.forward(req, remote).await,
            HostClass::Admin => {
                let req = req.map(axum::body::Body::new);
                match self.admin.clone().oneshot(req).await {
                    Ok(resp) => resp.map(|b| b.map_err(|e| Box::new(e) as BoxError).boxed_unsync()),
                    Err(infallible) => match infallible {},
                }
            }
            HostClass::Unknown => {
                debug!(host = host.as_deref().unwrap_or("<none>"), "no surface for host");
                body::json_error(StatusCode::NOT_FOUND, "Not found")
            }
        }
    }
}

/// The host a request declares: URI authority (absolute-form requests)
/// with the `Host` header as the usual origin-form fallback.
fn declared_host<B>(req: &Request<B>) -> Option<String> {
    if let Some(authority) = req.uri().authority() {
        return Some(authority.to_string());
    }
    req.headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}
