//! Content Store access for the engagement ledger.
//!
//! The ledger only talks to [`ContentStore`]. Storage engines translate their
//! own error encodings into [`StoreError`] so that uniqueness violations reach
//! the ledger as [`StoreError::ConstraintViolation`] regardless of backend.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryContentStore;
pub use postgres::PgContentStore;

use crate::domain::{EngagementEvent, EngagementKind, EventKey, PostCounts};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An event with the same (post, user, kind) already exists
    #[error("uniqueness constraint violated")]
    ConstraintViolation,

    #[error("post not found")]
    PostNotFound,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// An event change together with the counter adjustment made under the same
/// post lock.
///
/// `counter` holds the adjusted value, or the error that kept the counter
/// from moving while the event change itself still committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventWrite<T> {
    pub record: T,
    pub counter: StoreResult<i64>,
}

#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert an event and add one to its counter (floored at zero) while
    /// holding the post lock. Fails with `ConstraintViolation` when the key is
    /// already present; nothing is written in that case.
    async fn insert_event(&self, key: &EventKey) -> StoreResult<EventWrite<EngagementEvent>>;

    /// Delete an event and take one from its counter (floored at zero) while
    /// holding the post lock. `None` when there was no event to delete.
    async fn delete_event(&self, key: &EventKey) -> StoreResult<Option<EventWrite<Uuid>>>;

    /// Overwrite the counter with the live event count. Takes the same post
    /// lock as event writes, so it never observes an event without its
    /// counter step. Returns the reconciled value.
    async fn recompute_counter(&self, post_id: Uuid, kind: EngagementKind) -> StoreResult<i64>;

    /// Read both counters; `None` when the post does not exist
    async fn counters(&self, post_id: Uuid) -> StoreResult<Option<PostCounts>>;

    async fn has_event(&self, key: &EventKey) -> StoreResult<bool>;

    /// Events for a post, newest first
    async fn list_events(
        &self,
        post_id: Uuid,
        kind: EngagementKind,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<EngagementEvent>>;

    /// Cheap liveness probe used by the readiness route
    async fn ping(&self) -> StoreResult<()>;
}
