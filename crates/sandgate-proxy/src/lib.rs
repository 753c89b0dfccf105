//! sandgate-proxy — the sandbox-bound data plane.
//!
//! Two pieces:
//!
//! - **`host`** — classifies inbound connections by virtual host into
//!   admin-surface traffic, proxy-bound traffic, or neither.
//! - **`forward`** — authenticates a proxy-bound request via token,
//!   resolves the sandbox target, and streams the request (plain HTTP or
//!   WebSocket upgrade) to it.
//!
//! The forwarder holds no session state: a session's status may change
//! between resolution and connect, and the connect attempt itself is the
//! final liveness check.

pub mod body;
pub mod forward;
pub mod host;

pub use body::{BoxError, ProxyBody};
pub use forward::ProxyForwarder;
pub use host::{HostClass, HostRouter};
