//! Session persistence.
//!
//! The repository is the single authority for session records. Read-modify-
//! write sequences go through [`SessionRepository::find_by_id_for_update`],
//! which hands out a [`LockedSession`] that excludes every other locking
//! reader of the same session until it is dropped.

use std::ops::{Deref, DerefMut};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

use crate::domain::Session;

pub mod memory;

pub use memory::InMemorySessionRepository;

/// Errors reported by session storage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session already exists: {0}")]
    AlreadyExists(String),
}

/// Convenient Result alias for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// A session read under its per-session lock.
///
/// The lock is released when this value is dropped, so the whole
/// fetch-mutate-persist sequence must happen while it is alive.
pub struct LockedSession {
    session: Session,
    _guard: OwnedMutexGuard<()>,
}

impl LockedSession {
    pub fn new(session: Session, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            session,
            _guard: guard,
        }
    }
}

impl Deref for LockedSession {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl DerefMut for LockedSession {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

/// Storage for session records.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Reads a session without locking.
    async fn find_by_id(&self, id: &str) -> RepositoryResult<Session>;

    /// Reads a session and holds its lock until the returned value is dropped.
    async fn find_by_id_for_update(&self, id: &str) -> RepositoryResult<LockedSession>;

    /// Inserts a new session.
    async fn store(&self, session: &Session) -> RepositoryResult<()>;

    /// Overwrites an existing session.
    async fn update(&self, session: &Session) -> RepositoryResult<()>;

    /// Overwrites an existing session after stamping a new expiry.
    async fn update_with_expired_at(
        &self,
        session: &mut Session,
        expired_at: u64,
    ) -> RepositoryResult<()>;

    /// Archives every non-archived session whose expiry is before `now_ms`.
    ///
    /// Returns the IDs of the sessions that were archived.
    async fn archive_expired(&self, now_ms: u64) -> RepositoryResult<Vec<String>>;
}
