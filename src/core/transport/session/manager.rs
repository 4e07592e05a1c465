//! Session registry.
//!
//! Sessions are created lazily by the first request that carries no
//! session id, reused by every request that names them, and destroyed by
//! explicit termination or by the idle sweep. The map lock is never held
//! across an `.await`.

use axum::response::Response;
use bytes::Bytes;
use http::HeaderMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::engine::ProtocolEngine;
use super::error::SessionError;
use super::transport::SessionTransport;
use crate::core::transport::SessionConfig;

/// Builds a fully registered engine for a new session.
pub trait EngineFactory: Send + Sync {
    fn create_engine(&self, session_id: &str) -> ProtocolEngine;
}

/// One client session.
pub struct Session {
    id: String,
    transport: SessionTransport,
    last_accessed: Mutex<Instant>,
}

impl Session {
    /// Session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The session's transport.
    pub fn transport(&self) -> &SessionTransport {
        &self.transport
    }

    fn touch(&self) {
        *self.last_accessed.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Time since the last request.
    pub fn idle_for(&self, now: Instant) -> Duration {
        let last = *self.last_accessed.lock().unwrap_or_else(PoisonError::into_inner);
        now.saturating_duration_since(last)
    }
}

/// Result of [`SessionManager::resolve_or_create`].
pub struct Resolved {
    pub session: Arc<Session>,
    pub created: bool,
}

/// Work handed to a session.
pub enum Inbound {
    /// A POSTed JSON-RPC message or batch.
    Post { headers: HeaderMap, body: Bytes },
    /// A GET opening the standalone stream.
    OpenStream { headers: HeaderMap },
}

/// Owns every live session.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    factory: Arc<dyn EngineFactory>,
    config: SessionConfig,
    prefer_sse: bool,
    shutdown: CancellationToken,
}

impl SessionManager {
    /// Create an empty manager.
    pub fn new(factory: Arc<dyn EngineFactory>, config: SessionConfig, prefer_sse: bool) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            factory,
            config,
            prefer_sse,
            shutdown: CancellationToken::new(),
        }
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    /// Whether there are no live sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    /// Look up `session_id`, or create a session when none is given.
    ///
    /// An id that is not live is an error; it is never silently recreated.
    #[instrument(skip(self))]
    pub fn resolve_or_create(&self, session_id: Option<&str>) -> Result<Resolved, SessionError> {
        if let Some(id) = session_id {
            return self.get(id).map(|session| Resolved {
                session,
                created: false,
            });
        }

        let id = Uuid::new_v4().to_string();
        let engine = Arc::new(self.factory.create_engine(&id));
        let transport = SessionTransport::new(id.clone(), self.prefer_sse);
        transport.connect(engine)?;

        let session = Arc::new(Session {
            id: id.clone(),
            transport,
            last_accessed: Mutex::new(Instant::now()),
        });
        let total = {
            let mut sessions = self.sessions();
            sessions.insert(id.clone(), Arc::clone(&session));
            sessions.len()
        };

        info!(session_id = %id, total, "Session created");
        Ok(Resolved {
            session,
            created: true,
        })
    }

    /// Look up a live session and refresh its idle timer.
    pub fn get(&self, session_id: &str) -> Result<Arc<Session>, SessionError> {
        let session = self
            .sessions()
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::not_found(session_id))?;
        session.touch();
        Ok(session)
    }

    /// Hand `inbound` to the session's transport.
    pub async fn dispatch(
        &self,
        session: &Session,
        inbound: Inbound,
    ) -> Result<Response, SessionError> {
        match inbound {
            Inbound::Post { headers, body } => session.transport.handle_post(&headers, body).await,
            Inbound::OpenStream { headers } => session.transport.open_stream(&headers),
        }
    }

    /// Close and remove a session.
    #[instrument(skip(self))]
    pub fn terminate(&self, session_id: &str) -> Result<(), SessionError> {
        let session = self
            .sessions()
            .remove(session_id)
            .ok_or_else(|| SessionError::not_found(session_id))?;
        session.transport.close();
        info!(session_id, "Session terminated");
        Ok(())
    }

    /// Remove sessions idle for strictly longer than the configured TTL.
    pub fn sweep_idle(&self) -> usize {
        let now = Instant::now();
        let ttl = self.config.idle_ttl;

        let expired: Vec<Arc<Session>> = {
            let mut sessions = self.sessions();
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, session)| session.idle_for(now) > ttl)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &expired {
            session.transport.close();
            debug!(session_id = %session.id, "Idle session swept");
        }
        if !expired.is_empty() {
            info!(swept = expired.len(), remaining = self.len(), "Swept idle sessions");
        }
        expired.len()
    }

    /// Run [`sweep_idle`](Self::sweep_idle) every sweep interval until shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        let interval = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut tick = tokio::time::interval_at(Instant::now() + interval, interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = tick.tick() => {
                        manager.sweep_idle();
                    }
                }
            }
        })
    }

    /// Stop the sweeper and close every session. Safe to call repeatedly.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let drained: Vec<Arc<Session>> = self.sessions().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.transport.close();
        }
        if !drained.is_empty() {
            info!(closed = drained.len(), "Closed all sessions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::session::engine::ServerIdentity;
    use crate::core::transport::session::transport::TransportState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingFactory {
        built: AtomicUsize,
    }

    impl EngineFactory for CountingFactory {
        fn create_engine(&self, _session_id: &str) -> ProtocolEngine {
            self.built.fetch_add(1, Ordering::SeqCst);
            ProtocolEngine::new(ServerIdentity {
                name: "test".to_string(),
                version: "0.0.0".to_string(),
                instructions: None,
            })
        }
    }

    fn manager() -> (Arc<SessionManager>, Arc<CountingFactory>) {
        let factory = Arc::new(CountingFactory::default());
        let config = SessionConfig {
            idle_ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
        };
        let manager = SessionManager::new(factory.clone(), config, false);
        (Arc::new(manager), factory)
    }

    #[tokio::test]
    async fn test_sessionless_request_creates_one_connected_session() {
        let (manager, factory) = manager();
        let resolved = manager.resolve_or_create(None).unwrap();

        assert!(resolved.created);
        assert_eq!(factory.built.load(Ordering::SeqCst), 1);
        assert_eq!(manager.len(), 1);
        assert_eq!(resolved.session.transport().state(), TransportState::Connected);
        assert!(Uuid::parse_str(resolved.session.id()).is_ok());
    }

    #[tokio::test]
    async fn test_known_session_is_reused_without_reconstruction() {
        let (manager, factory) = manager();
        let first = manager.resolve_or_create(None).unwrap().session;

        for _ in 0..3 {
            let again = manager.resolve_or_create(Some(first.id())).unwrap();
            assert!(!again.created);
            assert!(Arc::ptr_eq(&again.session, &first));
        }
        assert_eq!(factory.built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found_and_map_unchanged() {
        let (manager, factory) = manager();
        manager.resolve_or_create(None).unwrap();

        let err = manager.resolve_or_create(Some("no-such-session")).err().unwrap();
        assert_eq!(err, SessionError::not_found("no-such-session"));
        assert_eq!(manager.len(), 1);
        assert_eq!(factory.built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let (manager, _) = manager();
        let session = manager.resolve_or_create(None).unwrap().session;
        let id = session.id().to_string();

        assert_eq!(manager.terminate(&id), Ok(()));
        assert_eq!(session.transport().state(), TransportState::Closed);
        assert_eq!(manager.terminate(&id), Err(SessionError::not_found(&id)));
        assert!(manager.resolve_or_create(Some(&id)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_sessions_idle_past_ttl() {
        let (manager, _) = manager();
        let stale = manager.resolve_or_create(None).unwrap().session;
        let fresh = manager.resolve_or_create(None).unwrap().session;

        tokio::time::advance(Duration::from_secs(60)).await;
        // idle exactly the TTL is kept
        assert_eq!(manager.sweep_idle(), 0);

        manager.get(fresh.id()).unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(manager.sweep_idle(), 1);

        assert!(manager.get(stale.id()).is_err());
        assert!(manager.get(fresh.id()).is_ok());
        assert_eq!(stale.transport().state(), TransportState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_on_interval_until_shutdown() {
        let (manager, _) = manager();
        let handle = manager.spawn_sweeper();
        manager.resolve_or_create(None).unwrap();

        tokio::time::sleep(Duration::from_secs(75)).await;
        assert!(manager.is_empty());

        manager.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything_and_is_repeatable() {
        let (manager, _) = manager();
        manager.shutdown();

        let a = manager.resolve_or_create(None).unwrap().session;
        let b = manager.resolve_or_create(None).unwrap().session;
        manager.shutdown();
        manager.shutdown();

        assert!(manager.is_empty());
        assert_eq!(a.transport().state(), TransportState::Closed);
        assert_eq!(b.transport().state(), TransportState::Closed);
    }

    #[tokio::test]
    async fn test_sessions_do_not_interfere() {
        let (manager, _) = manager();
        let a = manager.resolve_or_create(None).unwrap().session;
        let b = manager.resolve_or_create(None).unwrap().session;
        assert_ne!(a.id(), b.id());

        manager.terminate(a.id()).unwrap();
        assert_eq!(b.transport().state(), TransportState::Connected);
        assert!(manager.get(b.id()).is_ok());
    }
}
