//! sandgate-state — embedded session store for Sandgate.
//!
//! Backed by [redb](https://docs.rs/redb), holds the durable record of
//! every sandbox session and its lifecycle status.
//!
//! # Architecture
//!
//! Session records are JSON-serialized into redb's `&[u8]` value column,
//! keyed by session id. The `StateStore` is `Clone` + `Send` + `Sync`
//! (backed by `Arc<Database>`) and can be shared across async tasks.
//! Status updates are targeted read-modify-writes of a single record —
//! no operation spans more than one session.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
