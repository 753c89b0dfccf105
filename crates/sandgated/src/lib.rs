//! Assembly pieces of the Sandgate daemon: configuration loading and the
//! host-routed gateway. The binary in `main.rs` wires them to the
//! subsystem crates.

pub mod config;
pub mod gateway;
