//! StateStore — redb-backed session persistence for Sandgate.
//!
//! Provides typed CRUD operations over session records. All values are
//! JSON-serialized into redb's `&[u8]` value column. The store supports
//! both on-disk and in-memory backends (the latter for testing).
//!
//! Records are never removed: session deletion is a status transition to
//! `deleted`, so the history stays queryable.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::SESSIONS;
use crate::types::{Session, SessionStatus};

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe session store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent session store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "session store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory session store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory session store opened");
        Ok(store)
    }

    /// Create the sessions table if it doesn't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SESSIONS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Cheap reachability check: opens a read transaction.
    pub fn ping(&self) -> StateResult<()> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        txn.open_table(SESSIONS).map_err(map_err!(Table))?;
        Ok(())
    }

    /// Insert or replace a session record.
    pub fn put_session(&self, session: &Session) -> StateResult<()> {
        let value = serde_json::to_vec(session).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SESSIONS).map_err(map_err!(Table))?;
            table
                .insert(session.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(session_id = %session.id, status = %session.status, "session stored");
        Ok(())
    }

    /// Get a session by id.
    pub fn get_session(&self, id: &str) -> StateResult<Option<Session>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SESSIONS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let session: Session =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// List all sessions, newest first.
    pub fn list_sessions(&self) -> StateResult<Vec<Session>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SESSIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let session: Session =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(session);
        }
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(results)
    }

    /// List sessions whose status is one of the given set.
    pub fn list_by_status(&self, statuses: &[SessionStatus]) -> StateResult<Vec<Session>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SESSIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let session: Session =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if statuses.contains(&session.status) {
                results.push(session);
            }
        }
        Ok(results)
    }

    /// Targeted status write: updates `status` and `updated_at` of one
    /// record inside a single write transaction. Returns the updated
    /// session, or `NotFound` if the id is unknown.
    pub fn update_status(&self, id: &str, status: SessionStatus) -> StateResult<Session> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated;
        {
            let mut table = txn.open_table(SESSIONS).map_err(map_err!(Table))?;
            let mut session: Session = match table.get(id).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(id.to_string())),
            };
            session.status = status;
            session.updated_at = epoch_secs();
            let value = serde_json::to_vec(&session).map_err(map_err!(Serialize))?;
            table
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
            updated = session;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(session_id = %id, status = %status, "session status updated");
        Ok(updated)
    }

    /// Conditional status write for decisions computed outside the
    /// transaction: re-reads the record and writes only while its status
    /// still equals `expected`. Returns `None` when the record changed
    /// underneath (or is gone), leaving it untouched — a transition
    /// decided against a stale snapshot must never clobber a newer
    /// status, in particular the terminal ones.
    pub fn transition_status(
        &self,
        id: &str,
        expected: SessionStatus,
        next: SessionStatus,
    ) -> StateResult<Option<Session>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated;
        {
            let mut table = txn.open_table(SESSIONS).map_err(map_err!(Table))?;
            let mut session: Session = match table.get(id).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Ok(None),
            };
            if session.status != expected {
                debug!(
                    session_id = %id,
                    stored = %session.status,
                    %expected,
                    "status changed since snapshot, transition skipped"
                );
                return Ok(None);
            }
            session.status = next;
            session.updated_at = epoch_secs();
            let value = serde_json::to_vec(&session).map_err(map_err!(Serialize))?;
            table
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
            updated = session;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(session_id = %id, status = %next, "session status transitioned");
        Ok(Some(updated))
    }
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
