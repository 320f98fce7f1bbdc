//! Context Engine: per-session candidate profile, anchored role, and turn history.
//!
//! Sessions live in memory and expire after a configurable idle period. Any
//! access through the store counts as activity; a session with a turn in
//! flight is never expired.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::competency::CompetencyIndex;

pub mod handlers;
pub mod models;
pub mod profile;
pub mod questions;

use models::{Profile, Session};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(Uuid),

    #[error("Role '{0}' is not in the competency index")]
    UnknownRole(String),
}

/// Exclusive handle on one session. Holding the lock for a whole turn is what
/// keeps turns of the same session from interleaving.
pub type SessionHandle = Arc<Mutex<Session>>;

pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(3600);

struct Slot {
    handle: SessionHandle,
    /// Milliseconds after the store's epoch of the last access.
    last_active_ms: AtomicU64,
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Slot>>>,
    idle_ttl: Duration,
    epoch: Instant,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_ttl(DEFAULT_IDLE_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl,
            epoch: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        Instant::now().duration_since(self.epoch).as_millis() as u64
    }

    /// Idle past the TTL and not in the middle of a turn.
    fn is_expired(&self, slot: &Slot, now_ms: u64) -> bool {
        let idle = now_ms.saturating_sub(slot.last_active_ms.load(Ordering::Relaxed));
        idle > self.idle_ttl.as_millis() as u64 && slot.handle.try_lock().is_ok()
    }

    /// Creates a session with an empty profile and no role.
    pub async fn start_session(&self) -> Session {
        self.sweep_idle().await;
        let session = Session::new();
        let snapshot = session.clone();
        let slot = Slot {
            handle: Arc::new(Mutex::new(session)),
            last_active_ms: AtomicU64::new(self.now_ms()),
        };
        self.sessions.write().await.insert(snapshot.id, slot);
        info!("Session {} started", snapshot.id);
        snapshot
    }

    /// The session's lock handle. Counts as activity; an expired session is
    /// removed and reported as not found.
    pub async fn handle(&self, id: Uuid) -> Result<SessionHandle, SessionError> {
        let now_ms = self.now_ms();
        {
            let sessions = self.sessions.read().await;
            let slot = sessions.get(&id).ok_or(SessionError::NotFound(id))?;
            if !self.is_expired(slot, now_ms) {
                slot.last_active_ms.store(now_ms, Ordering::Relaxed);
                return Ok(slot.handle.clone());
            }
        }
        let mut sessions = self.sessions.write().await;
        if sessions.get(&id).is_some_and(|slot| self.is_expired(slot, now_ms)) {
            sessions.remove(&id);
            info!("Session {id} expired after {:?} idle", self.idle_ttl);
        }
        Err(SessionError::NotFound(id))
    }

    /// Drops every expired session and returns how many were dropped.
    pub async fn sweep_idle(&self) -> usize {
        let now_ms = self.now_ms();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, slot| !self.is_expired(slot, now_ms));
        let dropped = before - sessions.len();
        if dropped > 0 {
            info!("Expired {dropped} idle session(s)");
        }
        dropped
    }

    /// Sweeps idle sessions in the background for the life of the process.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let store = self.clone();
        let period = (self.idle_ttl / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let dropped = store.sweep_idle().await;
                debug!("Session sweep dropped {dropped}");
            }
        })
    }

    /// Replaces the profile wholesale with one extracted from `raw_text`.
    pub async fn set_profile(&self, id: Uuid, raw_text: &str) -> Result<Profile, SessionError> {
        let handle = self.handle(id).await?;
        let profile = profile::extract_profile(raw_text);
        let mut session = handle.lock().await;
        session.profile = profile.clone();
        info!(
            "Session {id} profile set ({} skills, {} snippets)",
            profile.skill_mentions.len(),
            profile.snippets.len()
        );
        Ok(profile)
    }

    /// Anchors the session to `role`. Earlier turns keep the role they ran under.
    pub async fn set_role(
        &self,
        id: Uuid,
        role: &str,
        index: &CompetencyIndex,
    ) -> Result<(), SessionError> {
        let handle = self.handle(id).await?;
        if !index.contains_role(role) {
            return Err(SessionError::UnknownRole(role.to_string()));
        }
        let mut session = handle.lock().await;
        if session.role.as_deref() != Some(role) {
            info!("Session {id} role set to '{role}'");
            session.role = Some(role.to_string());
        }
        Ok(())
    }

    /// Point-in-time copy of the session. Waits for any in-flight turn.
    pub async fn get_session(&self, id: Uuid) -> Result<Session, SessionError> {
        let handle = self.handle(id).await?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    pub async fn end_session(&self, id: Uuid) -> Result<(), SessionError> {
        let removed = self.sessions.write().await.remove(&id);
        match removed {
            Some(_) => {
                info!("Session {id} ended");
                Ok(())
            }
            None => Err(SessionError::NotFound(id)),
        }
    }

    /// Live sessions, not counting expired ones awaiting a sweep.
    pub async fn len(&self) -> usize {
        let now_ms = self.now_ms();
        self.sessions
            .read()
            .await
            .values()
            .filter(|slot| !self.is_expired(slot, now_ms))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::build_test_index;

    #[tokio::test]
    async fn test_start_session_is_empty() {
        let store = SessionStore::new();
        let session = store.start_session().await;
        let fetched = store.get_session(session.id).await.unwrap();
        assert!(fetched.role.is_none());
        assert!(fetched.profile.is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_set_role_rejects_unknown_role() {
        let index = build_test_index().await;
        let store = SessionStore::new();
        let id = store.start_session().await.id;
        let err = store.set_role(id, "Astronaut", &index).await.unwrap_err();
        assert!(matches!(err, SessionError::UnknownRole(r) if r == "Astronaut"));
        assert!(store.get_session(id).await.unwrap().role.is_none());
    }

    #[tokio::test]
    async fn test_set_role_is_idempotent_and_swappable() {
        let index = build_test_index().await;
        let store = SessionStore::new();
        let id = store.start_session().await.id;
        store.set_role(id, "Audit Associate", &index).await.unwrap();
        store.set_role(id, "Audit Associate", &index).await.unwrap();
        assert_eq!(
            store.get_session(id).await.unwrap().role.as_deref(),
            Some("Audit Associate")
        );
        store.set_role(id, "Software Engineer", &index).await.unwrap();
        assert_eq!(
            store.get_session(id).await.unwrap().role.as_deref(),
            Some("Software Engineer")
        );
    }

    #[tokio::test]
    async fn test_set_profile_replaces_previous_profile() {
        let store = SessionStore::new();
        let id = store.start_session().await.id;
        store
            .set_profile(id, "Summary of a long audit career here\nSkills: Excel, SQL")
            .await
            .unwrap();
        store
            .set_profile(id, "Summary of a long audit career here\nSkills: IFRS")
            .await
            .unwrap();
        let session = store.get_session(id).await.unwrap();
        assert_eq!(session.profile.skill_mentions, vec!["IFRS"]);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.get_session(id).await, Err(SessionError::NotFound(x)) if x == id));
        assert!(store.set_profile(id, "text").await.is_err());
        assert!(store.end_session(id).await.is_err());
    }

    #[tokio::test]
    async fn test_end_session_discards_it() {
        let store = SessionStore::new();
        let id = store.start_session().await.id;
        store.end_session(id).await.unwrap();
        assert!(matches!(store.get_session(id).await, Err(SessionError::NotFound(_))));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_expires_and_access_keeps_it_alive() {
        let store = SessionStore::with_idle_ttl(Duration::from_secs(60));
        let id = store.start_session().await.id;

        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(store.get_session(id).await.is_ok());
        // 90s since creation, 45s since the last access.
        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(store.get_session(id).await.is_ok());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.len().await, 0);
        assert!(matches!(store.get_session(id).await, Err(SessionError::NotFound(_))));
        assert!(store.sessions.read().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_only_idle_sessions() {
        let store = SessionStore::with_idle_ttl(Duration::from_secs(60));
        let idle = store.start_session().await.id;
        let active = store.start_session().await.id;

        tokio::time::advance(Duration::from_secs(40)).await;
        store.get_session(active).await.unwrap();
        tokio::time::advance(Duration::from_secs(40)).await;

        assert_eq!(store.sweep_idle().await, 1);
        assert!(store.get_session(active).await.is_ok());
        assert!(store.get_session(idle).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_with_turn_in_flight_is_not_expired() {
        let store = SessionStore::with_idle_ttl(Duration::from_secs(60));
        let id = store.start_session().await.id;
        let handle = store.handle(id).await.unwrap();
        let guard = handle.lock().await;

        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(store.sweep_idle().await, 0);
        drop(guard);
        assert_eq!(store.sweep_idle().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper_reclaims_abandoned_sessions() {
        let store = SessionStore::with_idle_ttl(Duration::from_secs(60));
        store.start_session().await;
        let sweeper = store.spawn_sweeper();

        tokio::time::sleep(Duration::from_secs(60 + 15 + 1)).await;
        assert!(store.sessions.read().await.is_empty());
        sweeper.abort();
    }
}
