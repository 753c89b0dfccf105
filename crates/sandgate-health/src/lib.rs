//! sandgate-health — health-driven session lifecycle.
//!
//! A periodic poller probes every non-terminal session's health endpoint
//! and applies the lifecycle transition rules:
//!
//! ```text
//! starting ──healthy──▶ active
//! active ──unhealthy──▶ starting
//! starting ──unhealthy, past startup deadline──▶ failed   (terminal)
//! ```
//!
//! Only one poll cycle is ever in flight; a tick arriving while the
//! previous cycle still runs is skipped outright, never queued.

pub mod poller;
pub mod probe;
pub mod transition;

pub use poller::{HealthPoller, PollerConfig};
pub use probe::{http_probe, ProbeResult};
pub use transition::next_status;
