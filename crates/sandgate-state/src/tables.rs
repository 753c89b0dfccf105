//! redb table definitions for the Sandgate session store.
//!
//! A single table with `&str` keys (session id) and `&[u8]` values
//! (JSON-serialized [`crate::types::Session`]).

use redb::TableDefinition;

/// Session records keyed by `{session_id}`.
pub const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");
