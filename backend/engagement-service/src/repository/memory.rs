use super::{ContentStore, EventWrite, StoreError, StoreResult};
use crate::domain::{EngagementEvent, EngagementKind, EventKey, PostCounts};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    posts: HashMap<Uuid, PostCounts>,
    events: HashMap<EventKey, EngagementEvent>,
}

impl MemoryState {
    fn live_count(&self, post_id: Uuid, kind: EngagementKind) -> i64 {
        self.events
            .keys()
            .filter(|key| key.post_id == post_id && key.kind == kind)
            .count() as i64
    }

    fn adjust(&mut self, post_id: Uuid, kind: EngagementKind, delta: i64) -> StoreResult<i64> {
        let counts = self.posts.get_mut(&post_id).ok_or(StoreError::PostNotFound)?;
        let next = (counts.get(kind) + delta).max(0);
        counts.set(kind, next);
        Ok(next)
    }
}

/// In-process Content Store for tests and local runs.
///
/// A single mutex guards posts and events together, so every primitive is
/// atomic with respect to the others, like a row-level transaction would be.
/// Counter faults can be switched on to exercise drift handling.
#[derive(Default)]
pub struct InMemoryContentStore {
    state: Mutex<MemoryState>,
    counter_faults: AtomicBool,
    recompute_faults: AtomicBool,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a post with zeroed counters. Existing posts are left alone.
    pub fn insert_post(&self, post_id: Uuid) -> StoreResult<()> {
        self.lock()?
            .posts
            .entry(post_id)
            .or_insert_with(|| PostCounts::empty(post_id));
        Ok(())
    }

    /// Overwrite a counter without touching events (simulates drift)
    pub fn force_counter(&self, post_id: Uuid, kind: EngagementKind, value: i64) -> StoreResult<()> {
        let mut state = self.lock()?;
        let counts = state.posts.get_mut(&post_id).ok_or(StoreError::PostNotFound)?;
        counts.set(kind, value);
        Ok(())
    }

    /// Number of stored events for a post and kind
    pub fn event_count(&self, post_id: Uuid, kind: EngagementKind) -> StoreResult<i64> {
        Ok(self.lock()?.live_count(post_id, kind))
    }

    /// Make the counter step of event writes fail while the event change
    /// still applies
    pub fn set_counter_faults(&self, enabled: bool) {
        self.counter_faults.store(enabled, Ordering::SeqCst);
    }

    /// Make counter recomputation fail
    pub fn set_recompute_faults(&self, enabled: bool) {
        self.recompute_faults.store(enabled, Ordering::SeqCst);
    }

    fn counter_step(
        &self,
        state: &mut MemoryState,
        post_id: Uuid,
        kind: EngagementKind,
        delta: i64,
    ) -> StoreResult<i64> {
        if self.counter_faults.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("counter update timed out".to_string()));
        }
        state.adjust(post_id, kind, delta)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl ContentStore for InMemoryContentStore {
    async fn insert_event(&self, key: &EventKey) -> StoreResult<EventWrite<EngagementEvent>> {
        let mut state = self.lock()?;
        if !state.posts.contains_key(&key.post_id) {
            return Err(StoreError::PostNotFound);
        }
        if state.events.contains_key(key) {
            return Err(StoreError::ConstraintViolation);
        }

        let event = EngagementEvent {
            id: Uuid::new_v4(),
            post_id: key.post_id,
            user_id: key.user_id,
            created_at: Utc::now(),
        };
        state.events.insert(*key, event.clone());
        let counter = self.counter_step(&mut state, key.post_id, key.kind, 1);

        Ok(EventWrite {
            record: event,
            counter,
        })
    }

    async fn delete_event(&self, key: &EventKey) -> StoreResult<Option<EventWrite<Uuid>>> {
        let mut state = self.lock()?;
        let Some(event) = state.events.remove(key) else {
            return Ok(None);
        };
        let counter = self.counter_step(&mut state, key.post_id, key.kind, -1);

        Ok(Some(EventWrite {
            record: event.id,
            counter,
        }))
    }

    async fn recompute_counter(&self, post_id: Uuid, kind: EngagementKind) -> StoreResult<i64> {
        if self.recompute_faults.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }

        let mut state = self.lock()?;
        let live = state.live_count(post_id, kind);
        let counts = state.posts.get_mut(&post_id).ok_or(StoreError::PostNotFound)?;
        counts.set(kind, live);
        Ok(live)
    }

    async fn counters(&self, post_id: Uuid) -> StoreResult<Option<PostCounts>> {
        Ok(self.lock()?.posts.get(&post_id).copied())
    }

    async fn has_event(&self, key: &EventKey) -> StoreResult<bool> {
        Ok(self.lock()?.events.contains_key(key))
    }

    async fn list_events(
        &self,
        post_id: Uuid,
        kind: EngagementKind,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<EngagementEvent>> {
        let state = self.lock()?;
        let mut events: Vec<EngagementEvent> = state
            .events
            .iter()
            .filter(|(key, _)| key.post_id == post_id && key.kind == kind)
            .map(|(_, event)| event.clone())
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(events
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.lock().map(|_| ())
    }
}
