//! In-process session storage.
//!
//! Records live in a `DashMap`; each session additionally owns an async mutex
//! that stands in for a row-level lock.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::{LockedSession, RepositoryError, RepositoryResult, SessionRepository};
use crate::domain::{Session, StateType};

/// Session repository backed by concurrent in-memory maps.
#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: DashMap<String, Session>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks.entry(id.to_string()).or_default().clone()
    }

    fn read(&self, id: &str) -> RepositoryResult<Session> {
        self.sessions
            .get(id)
            .map(|s| s.clone())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find_by_id(&self, id: &str) -> RepositoryResult<Session> {
        self.read(id)
    }

    async fn find_by_id_for_update(&self, id: &str) -> RepositoryResult<LockedSession> {
        if !self.sessions.contains_key(id) {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        let guard = self.lock_for(id).lock_owned().await;
        // Re-read after acquiring: the previous holder may have written.
        let session = self.read(id)?;
        Ok(LockedSession::new(session, guard))
    }

    async fn store(&self, session: &Session) -> RepositoryResult<()> {
        match self.sessions.entry(session.id.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::AlreadyExists(session.id.clone())),
            Entry::Vacant(v) => {
                v.insert(session.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, session: &Session) -> RepositoryResult<()> {
        match self.sessions.get_mut(&session.id) {
            Some(mut stored) => {
                *stored = session.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(session.id.clone())),
        }
    }

    async fn update_with_expired_at(
        &self,
        session: &mut Session,
        expired_at: u64,
    ) -> RepositoryResult<()> {
        session.expired_at = Some(expired_at);
        self.update(session).await
    }

    async fn archive_expired(&self, now_ms: u64) -> RepositoryResult<Vec<String>> {
        let candidates: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| is_expired(s.value(), now_ms))
            .map(|s| s.key().clone())
            .collect();

        let mut archived = Vec::with_capacity(candidates.len());
        for id in candidates {
            let mut locked = self.find_by_id_for_update(&id).await?;
            // State may have changed while waiting for the lock.
            if !is_expired(&locked, now_ms) {
                continue;
            }
            locked.move_to_archived();
            self.update(&locked).await?;
            archived.push(id);
        }
        Ok(archived)
    }
}

fn is_expired(session: &Session, now_ms: u64) -> bool {
    session.state != StateType::Archived && session.expired_at.is_some_and(|at| at < now_ms)
}
