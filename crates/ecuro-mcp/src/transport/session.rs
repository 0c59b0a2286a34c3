//! Session tables for the HTTP transports.
//!
//! A [`SessionManager`] owns one table per [`Family`]. Each entry binds a
//! session id to its own protocol engine, created by the manager's factory
//! when the session starts. Transports only see `Arc<Session<S>>` handles;
//! the maps never leave this module.
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::{RwLock, mpsc},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::model::ServerJsonRpcMessage;

pub type SessionId = Arc<str>;

pub fn session_id() -> SessionId {
    uuid::Uuid::new_v4().to_string().into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// `mcp-session-id` header on `/mcp`.
    StreamableHttp,
    /// `GET /sse` + `POST /messages?sessionId=`.
    Sse,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::StreamableHttp => f.write_str("streamable-http"),
            Family::Sse => f.write_str("sse"),
        }
    }
}

pub struct Session<S> {
    id: SessionId,
    family: Family,
    engine: Arc<S>,
    created_at: DateTime<Utc>,
    last_seen: Mutex<Instant>,
    ct: CancellationToken,
    outbound: Option<mpsc::Sender<ServerJsonRpcMessage>>,
}

impl<S> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("family", &self.family)
            .field("created_at", &self.created_at)
            .field("closed", &self.ct.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<S> Session<S> {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn engine(&self) -> &Arc<S> {
        &self.engine
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Cancelled once the session is closed.
    pub fn ct(&self) -> &CancellationToken {
        &self.ct
    }

    pub fn is_closed(&self) -> bool {
        self.ct.is_cancelled()
    }

    /// Channel feeding the session's event stream, when it has one.
    pub fn outbound(&self) -> Option<&mpsc::Sender<ServerJsonRpcMessage>> {
        self.outbound.as_ref()
    }

    pub fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

/// Live session count per family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCounts {
    pub streamable_http: usize,
    pub sse: usize,
}

type Table<S> = RwLock<HashMap<SessionId, Arc<Session<S>>>>;
type EngineFactory<S> = dyn Fn() -> S + Send + Sync;

pub struct SessionManager<S> {
    streamable_http: Table<S>,
    sse: Table<S>,
    factory: Box<EngineFactory<S>>,
    ct: CancellationToken,
}

impl<S> fmt::Debug for SessionManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}

impl<S> SessionManager<S>
where
    S: Send + Sync + 'static,
{
    pub fn new(factory: impl Fn() -> S + Send + Sync + 'static) -> Self {
        Self::with_ct(factory, CancellationToken::new())
    }

    /// Session tokens are children of `ct`; cancelling it ends every session.
    pub fn with_ct(factory: impl Fn() -> S + Send + Sync + 'static, ct: CancellationToken) -> Self {
        Self {
            streamable_http: Default::default(),
            sse: Default::default(),
            factory: Box::new(factory),
            ct,
        }
    }

    fn table(&self, family: Family) -> &Table<S> {
        match family {
            Family::StreamableHttp => &self.streamable_http,
            Family::Sse => &self.sse,
        }
    }

    /// Allocate a fresh id and engine.
    pub async fn create(
        &self,
        family: Family,
        outbound: Option<mpsc::Sender<ServerJsonRpcMessage>>,
    ) -> Arc<Session<S>> {
        let engine = Arc::new((self.factory)());
        let mut table = self.table(family).write().await;
        let mut id = session_id();
        while table.contains_key(&id) {
            id = session_id();
        }
        let session = Arc::new(Session {
            id: id.clone(),
            family,
            engine,
            created_at: Utc::now(),
            last_seen: Mutex::new(Instant::now()),
            ct: self.ct.child_token(),
            outbound,
        });
        table.insert(id.clone(), session.clone());
        tracing::info!(session_id = %id, %family, "session created");
        session
    }

    /// Look up a live session and mark it as seen.
    pub async fn get(&self, family: Family, id: &str) -> Option<Arc<Session<S>>> {
        let table = self.table(family).read().await;
        let session = table.get(id)?;
        // touched under the read lock so a concurrent reap sees the new time
        session.touch();
        Some(session.clone())
    }

    /// Remove and cancel a session. Returns whether it was still present;
    /// closing an unknown or already closed id is a no-op.
    pub async fn close(&self, family: Family, id: &str) -> bool {
        let removed = self.table(family).write().await.remove(id);
        match removed {
            Some(session) => {
                session.ct.cancel();
                tracing::info!(session_id = %session.id, %family, "session closed");
                true
            }
            None => false,
        }
    }

    pub async fn len(&self, family: Family) -> usize {
        self.table(family).read().await.len()
    }

    pub async fn counts(&self) -> SessionCounts {
        SessionCounts {
            streamable_http: self.len(Family::StreamableHttp).await,
            sse: self.len(Family::Sse).await,
        }
    }

    /// Close every streamable HTTP session idle for longer than `max_idle`.
    ///
    /// SSE sessions live exactly as long as their event stream and are not
    /// subject to reaping.
    pub async fn reap_idle(&self, max_idle: Duration) -> usize {
        let expired: Vec<Arc<Session<S>>> = {
            let mut table = self.table(Family::StreamableHttp).write().await;
            let ids: Vec<SessionId> = table
                .values()
                .filter(|session| session.idle_for() > max_idle)
                .map(|session| session.id.clone())
                .collect();
            ids.iter().filter_map(|id| table.remove(id)).collect()
        };
        for session in &expired {
            session.ct.cancel();
            tracing::info!(session_id = %session.id, "idle session reaped");
        }
        expired.len()
    }

    pub async fn close_all(&self) {
        for family in [Family::StreamableHttp, Family::Sse] {
            let drained: Vec<_> = self.table(family).write().await.drain().collect();
            for (id, session) in drained {
                session.ct.cancel();
                tracing::debug!(session_id = %id, %family, "session closed on shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn manager() -> SessionManager<usize> {
        let next = AtomicUsize::new(0);
        SessionManager::new(move || next.fetch_add(1, Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_sessions_get_distinct_ids_and_engines() {
        let manager = manager();
        let a = manager.create(Family::StreamableHttp, None).await;
        let b = manager.create(Family::StreamableHttp, None).await;
        assert_ne!(a.id(), b.id());
        assert_ne!(a.engine(), b.engine());

        let found = manager.get(Family::StreamableHttp, a.id()).await.unwrap();
        assert!(Arc::ptr_eq(found.engine(), a.engine()));
        assert_eq!(manager.len(Family::StreamableHttp).await, 2);
    }

    #[tokio::test]
    async fn test_families_are_separate_tables() {
        let manager = manager();
        let session = manager.create(Family::Sse, None).await;
        assert!(manager.get(Family::StreamableHttp, session.id()).await.is_none());
        assert_eq!(
            manager.counts().await,
            SessionCounts {
                streamable_http: 0,
                sse: 1
            }
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let manager = manager();
        let session = manager.create(Family::StreamableHttp, None).await;
        let _other = manager.create(Family::StreamableHttp, None).await;

        assert!(manager.close(Family::StreamableHttp, session.id()).await);
        assert!(session.is_closed());
        assert_eq!(manager.len(Family::StreamableHttp).await, 1);

        assert!(!manager.close(Family::StreamableHttp, session.id()).await);
        assert_eq!(manager.len(Family::StreamableHttp).await, 1);
        assert!(manager.get(Family::StreamableHttp, session.id()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_idle_only_closes_stale_sessions() {
        let manager = manager();
        let stale = manager.create(Family::StreamableHttp, None).await;
        let streaming = manager.create(Family::Sse, None).await;
        tokio::time::advance(Duration::from_secs(120)).await;
        let fresh = manager.create(Family::StreamableHttp, None).await;

        assert_eq!(manager.reap_idle(Duration::from_secs(60)).await, 1);
        assert!(stale.is_closed());
        assert!(!fresh.is_closed());
        assert!(!streaming.is_closed());
        assert_eq!(manager.len(Family::StreamableHttp).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_used_while_reaping_survives() {
        let manager = Arc::new(manager());
        let session = manager.create(Family::StreamableHttp, None).await;
        tokio::time::advance(Duration::from_secs(120)).await;

        // a lookup in flight holds the table while the reaper starts
        let in_flight = manager.table(Family::StreamableHttp).read().await;
        let reaper = tokio::spawn({
            let manager = manager.clone();
            async move { manager.reap_idle(Duration::from_secs(60)).await }
        });
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        session.touch();
        drop(in_flight);

        assert_eq!(reaper.await.unwrap(), 0);
        assert!(!session.is_closed());
        assert!(manager.get(Family::StreamableHttp, session.id()).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_keeps_session_alive() {
        let manager = manager();
        let session = manager.create(Family::StreamableHttp, None).await;
        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(manager.get(Family::StreamableHttp, session.id()).await.is_some());
        assert_eq!(manager.reap_idle(Duration::from_secs(60)).await, 0);
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn test_close_all_cancels_everything() {
        let ct = CancellationToken::new();
        let manager = SessionManager::with_ct(|| (), ct.clone());
        let a = manager.create(Family::StreamableHttp, None).await;
        let b = manager.create(Family::Sse, None).await;
        manager.close_all().await;
        assert!(a.is_closed() && b.is_closed());
        assert_eq!(manager.counts().await, SessionCounts::default());
        assert!(!ct.is_cancelled());
    }
}
