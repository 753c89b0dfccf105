//! Health poller — the periodic reconciliation loop.
//!
//! Each cycle re-reads every `starting`/`active` session from the store,
//! probes them concurrently, and persists status transitions. Probes are
//! independent: one session's failure never aborts the cycle for others.
//!
//! The single-slot guard keeps at most one cycle in flight. A tick that
//! fires while a cycle is still running is a no-op, not a queued retry,
//! so slow or hung probes can never pile up concurrent cycles.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use sandgate_resolver::{TargetResolver, HEALTH_PATH};
use sandgate_state::{SessionStatus, StateStore};

use crate::probe::http_probe;
use crate::transition::next_status;

/// Poller timing configuration. Immutable after construction.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Cadence of poll cycles.
    pub interval: Duration,
    /// Hard timeout per health probe.
    pub probe_timeout: Duration,
    /// Maximum time a session may stay `starting` before an unhealthy
    /// probe forces it to `failed`. Measured from `created_at`.
    pub startup_deadline: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(3),
            startup_deadline: Duration::from_secs(90),
        }
    }
}

/// Periodic health poller driving session lifecycle transitions.
#[derive(Clone)]
pub struct HealthPoller {
    store: StateStore,
    resolver: Arc<TargetResolver>,
    config: PollerConfig,
    /// Single-slot cycle guard: held for the duration of one cycle.
    in_flight: Arc<tokio::sync::Mutex<()>>,
}

impl HealthPoller {
    pub fn new(store: StateStore, resolver: Arc<TargetResolver>, config: PollerConfig) -> Self {
        Self {
            store,
            resolver,
            config,
            in_flight: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Run the poll loop until the shutdown signal fires.
    ///
    /// Cycles are spawned off the timer task so that a slow cycle delays
    /// nothing: the next tick fires on schedule and is skipped by the
    /// guard if the previous cycle is still running.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            startup_deadline_secs = self.config.startup_deadline.as_secs(),
            "health poller started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {
                    let poller = self.clone();
                    tokio::spawn(async move {
                        poller.try_cycle().await;
                    });
                }
                _ = shutdown.changed() => {
                    info!("health poller shutting down");
                    break;
                }
            }
        }
    }

    /// Attempt one poll cycle. Returns `false` when a cycle was already
    /// in flight and this tick was skipped.
    pub async fn try_cycle(&self) -> bool {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("previous poll cycle still running, tick skipped");
            return false;
        };
        self.run_cycle().await;
        true
    }

    /// One full poll cycle: fetch candidates, probe concurrently, apply
    /// transition rules, persist changes.
    async fn run_cycle(&self) {
        let candidates = match self
            .store
            .list_by_status(&[SessionStatus::Starting, SessionStatus::Active])
        {
            Ok(sessions) => sessions,
            Err(e) => {
                error!(error = %e, "failed to list poll candidates");
                return;
            }
        };

        if candidates.is_empty() {
            return;
        }

        let now = epoch_secs();
        let mut probes = JoinSet::new();

        for session in candidates {
            let store = self.store.clone();
            let resolver = self.resolver.clone();
            let probe_timeout = self.config.probe_timeout;
            let startup_deadline = self.config.startup_deadline;

            probes.spawn(async move {
                let target = resolver.resolve(&session.name);
                let result = http_probe(&target.authority, HEALTH_PATH, probe_timeout).await;
                let next = next_status(&session, result.is_healthy(), now, startup_deadline);

                // Idempotent no-op when nothing changed.
                if next == session.status {
                    return;
                }

                // Conditional on the snapshot: a session deleted (or
                // otherwise moved on) while its probe was in flight must
                // not be written over.
                match store.transition_status(&session.id, session.status, next) {
                    Ok(Some(_)) => {
                        info!(
                            session_id = %session.id,
                            session = %session.name,
                            from = %session.status,
                            to = %next,
                            "session status changed"
                        );
                    }
                    Ok(None) => {
                        debug!(
                            session_id = %session.id,
                            "session changed during probe, transition dropped"
                        );
                    }
                    Err(e) => {
                        error!(
                            session_id = %session.id,
                            error = %e,
                            "failed to persist session status"
                        );
                    }
                }
            });
        }

        while probes.join_next().await.is_some() {}
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use sandgate_resolver::ResolverConfig;
    use sandgate_state::Session;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Spawn a TCP listener answering every connection with HTTP 200.
    async fn spawn_healthy_sandbox() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let authority = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    let _ = stream
                        .write_all(
                            b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
                        )
                        .await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        authority
    }

    fn test_config() -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(50),
            probe_timeout: Duration::from_millis(300),
            startup_deadline: Duration::from_secs(90),
        }
    }

    fn session(id: &str, status: SessionStatus, created_at: u64) -> Session {
        Session {
            id: id.to_string(),
            name: id.to_string(),
            status,
            resource_id: format!("res-{id}"),
            created_at,
            updated_at: created_at,
        }
    }

    fn poller_with(
        store: &StateStore,
        targets: HashMap<String, String>,
    ) -> HealthPoller {
        let resolver = TargetResolver::new(ResolverConfig {
            internal_domain: "sandbox.internal".to_string(),
            sandbox_port: 8080,
            local_mode: true,
            local_targets: targets,
            // Unmapped names resolve to a closed port.
            local_fallback: Some("127.0.0.1:1".to_string()),
        });
        HealthPoller::new(store.clone(), Arc::new(resolver), test_config())
    }

    #[tokio::test]
    async fn cycle_applies_transitions_to_mixed_cohort() {
        let store = StateStore::open_in_memory().unwrap();
        let now = epoch_secs();
        let healthy = spawn_healthy_sandbox().await;

        // s1: starting, past the 90s budget, unreachable target.
        store.put_session(&session("s1", SessionStatus::Starting, now - 91)).unwrap();
        // s2: starting, created 5s ago, unreachable target.
        store.put_session(&session("s2", SessionStatus::Starting, now - 5)).unwrap();
        // s3: starting, reachable target.
        store.put_session(&session("s3", SessionStatus::Starting, now - 5)).unwrap();

        let poller = poller_with(
            &store,
            HashMap::from([("s3".to_string(), healthy)]),
        );
        assert!(poller.try_cycle().await);

        assert_eq!(store.get_session("s1").unwrap().unwrap().status, SessionStatus::Failed);
        assert_eq!(store.get_session("s2").unwrap().unwrap().status, SessionStatus::Starting);
        assert_eq!(store.get_session("s3").unwrap().unwrap().status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn unchanged_status_causes_no_write() {
        let store = StateStore::open_in_memory().unwrap();
        let now = epoch_secs();
        let created = now - 5;
        store.put_session(&session("s1", SessionStatus::Starting, created)).unwrap();

        let poller = poller_with(&store, HashMap::new());
        poller.try_cycle().await;

        // Still starting, and the record was not rewritten.
        let after = store.get_session("s1").unwrap().unwrap();
        assert_eq!(after.status, SessionStatus::Starting);
        assert_eq!(after.updated_at, created);
    }

    #[tokio::test]
    async fn active_session_demotes_when_unreachable() {
        let store = StateStore::open_in_memory().unwrap();
        let now = epoch_secs();
        store.put_session(&session("s1", SessionStatus::Active, now - 300)).unwrap();

        let poller = poller_with(&store, HashMap::new());
        poller.try_cycle().await;

        assert_eq!(store.get_session("s1").unwrap().unwrap().status, SessionStatus::Starting);
    }

    #[tokio::test]
    async fn terminal_and_terminating_sessions_are_not_polled() {
        let store = StateStore::open_in_memory().unwrap();
        let now = epoch_secs();
        let healthy = spawn_healthy_sandbox().await;

        for (id, status) in [
            ("t1", SessionStatus::Terminating),
            ("t2", SessionStatus::Deleted),
            ("t3", SessionStatus::Failed),
        ] {
            store.put_session(&session(id, status, now - 300)).unwrap();
        }

        // Even with healthy targets, excluded statuses never resurrect.
        let targets: HashMap<String, String> = ["t1", "t2", "t3"]
            .iter()
            .map(|id| (id.to_string(), healthy.clone()))
            .collect();
        let poller = poller_with(&store, targets);
        poller.try_cycle().await;

        assert_eq!(store.get_session("t1").unwrap().unwrap().status, SessionStatus::Terminating);
        assert_eq!(store.get_session("t2").unwrap().unwrap().status, SessionStatus::Deleted);
        assert_eq!(store.get_session("t3").unwrap().unwrap().status, SessionStatus::Failed);
    }

    /// Spawn a TCP listener that waits before answering 200, keeping the
    /// probe in flight long enough for something else to happen.
    async fn spawn_slow_healthy_sandbox(delay: Duration) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let authority = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    tokio::time::sleep(delay).await;
                    let _ = stream
                        .write_all(
                            b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
                        )
                        .await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        authority
    }

    #[tokio::test]
    async fn delete_during_in_flight_cycle_is_not_overwritten() {
        let store = StateStore::open_in_memory().unwrap();
        let now = epoch_secs();
        let slow = spawn_slow_healthy_sandbox(Duration::from_millis(200)).await;

        store.put_session(&session("s1", SessionStatus::Starting, now - 5)).unwrap();

        let poller = poller_with(
            &store,
            HashMap::from([("s1".to_string(), slow)]),
        );

        // Cycle starts, snapshots s1 as starting, and blocks on the
        // probe; mid-probe the session is deleted through the store.
        let cycle = {
            let poller = poller.clone();
            tokio::spawn(async move { poller.try_cycle().await })
        };
        tokio::time::sleep(Duration::from_millis(60)).await;
        store.update_status("s1", SessionStatus::Deleted).unwrap();

        assert!(cycle.await.unwrap());

        // The healthy verdict arrived after the delete and must not
        // resurrect the session.
        assert_eq!(
            store.get_session("s1").unwrap().unwrap().status,
            SessionStatus::Deleted
        );
    }

    #[tokio::test]
    async fn overlapping_tick_is_a_no_op() {
        let store = StateStore::open_in_memory().unwrap();
        let now = epoch_secs();
        // Would demote to starting if a cycle actually ran.
        store.put_session(&session("s1", SessionStatus::Active, now - 300)).unwrap();

        let poller = poller_with(&store, HashMap::new());

        // Hold the cycle slot, simulating a cycle still in flight.
        let guard = poller.in_flight.clone();
        let _held = guard.lock().await;

        assert!(!poller.try_cycle().await);

        // No write happened for the skipped tick.
        let after = store.get_session("s1").unwrap().unwrap();
        assert_eq!(after.status, SessionStatus::Active);
        assert_eq!(after.updated_at, now - 300);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let store = StateStore::open_in_memory().unwrap();
        let poller = poller_with(&store, HashMap::new());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = {
            let poller = poller.clone();
            tokio::spawn(async move { poller.run(shutdown_rx).await })
        };

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("poller did not stop")
            .unwrap();
    }
}
