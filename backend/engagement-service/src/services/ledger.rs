use crate::domain::{
    EngagementEvent, EngagementKind, EngagementStatus, EventKey, PostCounts, ToggleOutcome,
};
use crate::error::{EngagementError, EngagementResult};
use crate::metrics::{COUNTER_DRIFT_TOTAL, ENGAGEMENT_OPERATIONS_TOTAL, RECONCILED_COUNTERS_TOTAL};
use crate::repository::{ContentStore, StoreError, StoreResult};
use crate::services::DriftRegistry;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Per-post, per-user engagement ledger.
///
/// Architecture:
/// - Add: insert event (uniqueness enforced by the store) and +1 under one post lock
/// - Remove: delete event and -1 under one post lock, only if a row was deleted
/// - Recompute takes the same lock, so it never lands between the two steps
/// - A counter step that fails while its event change commits is recorded in
///   the [`DriftRegistry`] and repaired by recomputing from the event log
///
/// One instance serves every [`EngagementKind`].
#[derive(Clone)]
pub struct EngagementLedger {
    store: Arc<dyn ContentStore>,
    drift: DriftRegistry,
}

impl EngagementLedger {
    pub fn new(store: Arc<dyn ContentStore>, drift: DriftRegistry) -> Self {
        Self { store, drift }
    }

    pub fn drift(&self) -> &DriftRegistry {
        &self.drift
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    // ========== Toggle Operations ==========

    /// Record that `caller` engaged with a post.
    ///
    /// A second add for the same (post, user, kind) answers
    /// [`EngagementError::AlreadyEngaged`] and leaves the counter untouched.
    pub async fn add(
        &self,
        post_id: Uuid,
        caller: Option<Uuid>,
        kind: EngagementKind,
    ) -> EngagementResult<ToggleOutcome> {
        let result = self.add_inner(post_id, caller, kind).await;
        observe(kind, "add", &result);
        result
    }

    /// Withdraw `caller`'s engagement. Removing an absent engagement is a
    /// successful no-op.
    pub async fn remove(
        &self,
        post_id: Uuid,
        caller: Option<Uuid>,
        kind: EngagementKind,
    ) -> EngagementResult<ToggleOutcome> {
        let result = self.remove_inner(post_id, caller, kind).await;
        observe(kind, "remove", &result);
        result
    }

    async fn add_inner(
        &self,
        post_id: Uuid,
        caller: Option<Uuid>,
        kind: EngagementKind,
    ) -> EngagementResult<ToggleOutcome> {
        let user_id = caller.ok_or(EngagementError::Unauthenticated)?;
        let key = EventKey::new(post_id, user_id, kind);

        let write = match self.store.insert_event(&key).await {
            Ok(write) => write,
            Err(StoreError::ConstraintViolation) => {
                tracing::debug!(
                    post_id = %post_id,
                    user_id = %user_id,
                    kind = %kind,
                    "Engagement already exists"
                );
                return Err(EngagementError::AlreadyEngaged(kind));
            }
            Err(err) => return Err(err.into()),
        };

        tracing::debug!(
            post_id = %post_id,
            user_id = %user_id,
            kind = %kind,
            event_id = %write.record.id,
            "Engagement event recorded"
        );

        self.settle_counter(post_id, kind, write.counter).await?;
        Ok(ToggleOutcome::Applied)
    }

    async fn remove_inner(
        &self,
        post_id: Uuid,
        caller: Option<Uuid>,
        kind: EngagementKind,
    ) -> EngagementResult<ToggleOutcome> {
        let user_id = caller.ok_or(EngagementError::Unauthenticated)?;
        let key = EventKey::new(post_id, user_id, kind);

        let Some(write) = self.store.delete_event(&key).await? else {
            tracing::debug!(
                post_id = %post_id,
                user_id = %user_id,
                kind = %kind,
                "No engagement to remove"
            );
            return Ok(ToggleOutcome::Unchanged);
        };

        tracing::debug!(
            post_id = %post_id,
            user_id = %user_id,
            kind = %kind,
            event_id = %write.record,
            "Engagement event removed"
        );

        self.settle_counter(post_id, kind, write.counter).await?;
        Ok(ToggleOutcome::Applied)
    }

    /// Inspect the counter step of a committed event write
    async fn settle_counter(
        &self,
        post_id: Uuid,
        kind: EngagementKind,
        counter: StoreResult<i64>,
    ) -> EngagementResult<()> {
        match counter {
            Ok(count) => {
                tracing::debug!(post_id = %post_id, kind = %kind, count, "Counter adjusted");
                Ok(())
            }
            // The post went away with its events; there is no counter to drift.
            Err(StoreError::PostNotFound) => Err(EngagementError::PostNotFound),
            Err(err) => self.recover_drift(post_id, kind, err).await,
        }
    }

    /// The event write is durable but its counter adjustment failed. Record
    /// the pair for out-of-band reconciliation and try one immediate repair.
    async fn recover_drift(
        &self,
        post_id: Uuid,
        kind: EngagementKind,
        cause: StoreError,
    ) -> EngagementResult<()> {
        tracing::error!(
            post_id = %post_id,
            kind = %kind,
            error = %cause,
            "Counter drift risk: event recorded but counter adjustment failed"
        );
        COUNTER_DRIFT_TOTAL.with_label_values(&[kind.as_str()]).inc();
        self.drift.record(post_id, kind);

        match self.store.recompute_counter(post_id, kind).await {
            Ok(count) => {
                self.drift.resolve(post_id, kind);
                RECONCILED_COUNTERS_TOTAL
                    .with_label_values(&[kind.as_str(), "ok"])
                    .inc();
                tracing::info!(
                    post_id = %post_id,
                    kind = %kind,
                    count,
                    "Counter repaired from event log"
                );
                Ok(())
            }
            Err(StoreError::PostNotFound) => {
                // Post deleted concurrently; its events went with it.
                self.drift.resolve(post_id, kind);
                Err(EngagementError::PostNotFound)
            }
            Err(err) => {
                RECONCILED_COUNTERS_TOTAL
                    .with_label_values(&[kind.as_str(), "failed"])
                    .inc();
                tracing::warn!(
                    post_id = %post_id,
                    kind = %kind,
                    error = %err,
                    pending = self.drift.len(),
                    "Immediate counter repair failed, left for reconciler"
                );
                Err(EngagementError::StoreUnavailable(cause.to_string()))
            }
        }
    }

    // ========== Reconciliation ==========

    /// Recompute one counter from the live event count
    pub async fn reconcile(&self, post_id: Uuid, kind: EngagementKind) -> EngagementResult<i64> {
        let result = self.store.recompute_counter(post_id, kind).await;
        let outcome = if result.is_ok() { "ok" } else { "failed" };
        RECONCILED_COUNTERS_TOTAL
            .with_label_values(&[kind.as_str(), outcome])
            .inc();

        let count = result?;
        self.drift.resolve(post_id, kind);
        Ok(count)
    }

    /// Recompute every counter of a post
    pub async fn reconcile_post(&self, post_id: Uuid) -> EngagementResult<PostCounts> {
        let mut counts = PostCounts::empty(post_id);
        for kind in EngagementKind::ALL {
            counts.set(kind, self.reconcile(post_id, kind).await?);
        }

        tracing::info!(
            post_id = %post_id,
            like_count = counts.like_count,
            prayer_count = counts.prayer_count,
            "Reconciled post counters"
        );
        Ok(counts)
    }

    /// Drain the drift registry and reconcile each pending counter.
    ///
    /// Pairs that fail to reconcile are put back. Returns
    /// `(reconciled, failed)`.
    pub async fn reconcile_pending(&self) -> (usize, usize) {
        let pending = self.drift.drain();
        let mut reconciled = 0;
        let mut failed = 0;

        for (post_id, kind) in pending {
            match self.reconcile(post_id, kind).await {
                Ok(_) => reconciled += 1,
                Err(EngagementError::PostNotFound) => {
                    tracing::debug!(post_id = %post_id, kind = %kind, "Dropping drift entry for deleted post");
                }
                Err(err) => {
                    failed += 1;
                    self.drift.record(post_id, kind);
                    tracing::warn!(
                        post_id = %post_id,
                        kind = %kind,
                        error = %err,
                        "Failed to reconcile counter"
                    );
                }
            }
        }

        (reconciled, failed)
    }

    // ========== Reads ==========

    /// Counters plus the caller's own engagement flags
    pub async fn status(
        &self,
        post_id: Uuid,
        caller: Option<Uuid>,
    ) -> EngagementResult<EngagementStatus> {
        let counts = self
            .store
            .counters(post_id)
            .await?
            .ok_or(EngagementError::PostNotFound)?;

        let (liked, prayed) = match caller {
            Some(user_id) => (
                self.store
                    .has_event(&EventKey::new(post_id, user_id, EngagementKind::Like))
                    .await?,
                self.store
                    .has_event(&EventKey::new(post_id, user_id, EngagementKind::Prayer))
                    .await?,
            ),
            None => (false, false),
        };

        Ok(EngagementStatus {
            post_id,
            like_count: counts.like_count,
            prayer_count: counts.prayer_count,
            liked,
            prayed,
        })
    }

    /// Paginated engagers of a post, newest first
    pub async fn engagers(
        &self,
        post_id: Uuid,
        kind: EngagementKind,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> EngagementResult<Vec<EngagementEvent>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0).max(0);

        Ok(self.store.list_events(post_id, kind, limit, offset).await?)
    }
}

fn observe(kind: EngagementKind, op: &str, result: &EngagementResult<ToggleOutcome>) {
    let outcome = match result {
        Ok(ToggleOutcome::Applied) => "applied",
        Ok(ToggleOutcome::Unchanged) => "noop",
        Err(err) => err.outcome(),
    };
    ENGAGEMENT_OPERATIONS_TOTAL
        .with_label_values(&[kind.as_str(), op, outcome])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{EventWrite, InMemoryContentStore};

    /// Reports the post as gone during the counter step of every event write,
    /// as when the post is deleted while the write is in flight
    struct DeletedDuringWrite {
        inner: InMemoryContentStore,
    }

    #[async_trait::async_trait]
    impl ContentStore for DeletedDuringWrite {
        async fn insert_event(&self, key: &EventKey) -> StoreResult<EventWrite<EngagementEvent>> {
            let write = self.inner.insert_event(key).await?;
            Ok(EventWrite {
                record: write.record,
                counter: Err(StoreError::PostNotFound),
            })
        }

        async fn delete_event(&self, key: &EventKey) -> StoreResult<Option<EventWrite<Uuid>>> {
            Ok(self.inner.delete_event(key).await?.map(|write| EventWrite {
                record: write.record,
                counter: Err(StoreError::PostNotFound),
            }))
        }

        async fn recompute_counter(
            &self,
            post_id: Uuid,
            kind: EngagementKind,
        ) -> StoreResult<i64> {
            self.inner.recompute_counter(post_id, kind).await
        }

        async fn counters(&self, post_id: Uuid) -> StoreResult<Option<PostCounts>> {
            self.inner.counters(post_id).await
        }

        async fn has_event(&self, key: &EventKey) -> StoreResult<bool> {
            self.inner.has_event(key).await
        }

        async fn list_events(
            &self,
            post_id: Uuid,
            kind: EngagementKind,
            limit: i64,
            offset: i64,
        ) -> StoreResult<Vec<EngagementEvent>> {
            self.inner.list_events(post_id, kind, limit, offset).await
        }

        async fn ping(&self) -> StoreResult<()> {
            self.inner.ping().await
        }
    }

    fn ledger_with_post() -> (EngagementLedger, Arc<InMemoryContentStore>, Uuid) {
        let store = Arc::new(InMemoryContentStore::new());
        let post_id = Uuid::new_v4();
        store.insert_post(post_id).unwrap();
        let ledger = EngagementLedger::new(store.clone(), DriftRegistry::new());
        (ledger, store, post_id)
    }

    async fn count(ledger: &EngagementLedger, post_id: Uuid, kind: EngagementKind) -> i64 {
        ledger
            .store()
            .counters(post_id)
            .await
            .unwrap()
            .unwrap()
            .get(kind)
    }

    #[tokio::test]
    async fn add_then_remove_round_trip() {
        let (ledger, store, post_id) = ledger_with_post();
        let user = Some(Uuid::new_v4());

        let outcome = ledger.add(post_id, user, EngagementKind::Like).await.unwrap();
        assert_eq!(outcome, ToggleOutcome::Applied);
        assert_eq!(count(&ledger, post_id, EngagementKind::Like).await, 1);

        let outcome = ledger
            .remove(post_id, user, EngagementKind::Like)
            .await
            .unwrap();
        assert_eq!(outcome, ToggleOutcome::Applied);
        assert_eq!(count(&ledger, post_id, EngagementKind::Like).await, 0);
        assert_eq!(store.event_count(post_id, EngagementKind::Like).unwrap(), 0);
    }

    #[tokio::test]
    async fn repeated_add_is_a_conflict() {
        let (ledger, store, post_id) = ledger_with_post();
        let user = Some(Uuid::new_v4());

        ledger.add(post_id, user, EngagementKind::Prayer).await.unwrap();
        let err = ledger
            .add(post_id, user, EngagementKind::Prayer)
            .await
            .unwrap_err();

        assert_eq!(err, EngagementError::AlreadyEngaged(EngagementKind::Prayer));
        assert_eq!(count(&ledger, post_id, EngagementKind::Prayer).await, 1);
        assert_eq!(store.event_count(post_id, EngagementKind::Prayer).unwrap(), 1);
    }

    #[tokio::test]
    async fn remove_without_add_is_noop() {
        let (ledger, _store, post_id) = ledger_with_post();

        let outcome = ledger
            .remove(post_id, Some(Uuid::new_v4()), EngagementKind::Like)
            .await
            .unwrap();

        assert_eq!(outcome, ToggleOutcome::Unchanged);
        assert_eq!(count(&ledger, post_id, EngagementKind::Like).await, 0);
    }

    #[tokio::test]
    async fn anonymous_caller_is_rejected_without_side_effects() {
        let (ledger, store, post_id) = ledger_with_post();

        for kind in EngagementKind::ALL {
            assert_eq!(
                ledger.add(post_id, None, kind).await.unwrap_err(),
                EngagementError::Unauthenticated
            );
            assert_eq!(
                ledger.remove(post_id, None, kind).await.unwrap_err(),
                EngagementError::Unauthenticated
            );
            assert_eq!(store.event_count(post_id, kind).unwrap(), 0);
            assert_eq!(count(&ledger, post_id, kind).await, 0);
        }
    }

    #[tokio::test]
    async fn kinds_are_counted_independently() {
        let (ledger, _store, post_id) = ledger_with_post();
        let user = Some(Uuid::new_v4());

        ledger.add(post_id, user, EngagementKind::Like).await.unwrap();
        ledger.add(post_id, user, EngagementKind::Prayer).await.unwrap();
        ledger
            .remove(post_id, user, EngagementKind::Like)
            .await
            .unwrap();

        let status = ledger.status(post_id, user).await.unwrap();
        assert_eq!(status.like_count, 0);
        assert_eq!(status.prayer_count, 1);
        assert!(!status.liked);
        assert!(status.prayed);
    }

    #[tokio::test]
    async fn add_on_missing_post_is_not_found() {
        let (ledger, _store, _post_id) = ledger_with_post();

        let err = ledger
            .add(Uuid::new_v4(), Some(Uuid::new_v4()), EngagementKind::Like)
            .await
            .unwrap_err();

        assert_eq!(err, EngagementError::PostNotFound);
    }

    #[tokio::test]
    async fn failed_increment_is_repaired_immediately() {
        let (ledger, store, post_id) = ledger_with_post();
        store.set_counter_faults(true);

        ledger
            .add(post_id, Some(Uuid::new_v4()), EngagementKind::Like)
            .await
            .unwrap();

        assert_eq!(count(&ledger, post_id, EngagementKind::Like).await, 1);
        assert!(ledger.drift().is_empty());
    }

    #[tokio::test]
    async fn unrepaired_drift_is_left_for_the_reconciler() {
        let (ledger, store, post_id) = ledger_with_post();
        let user = Some(Uuid::new_v4());
        store.set_counter_faults(true);
        store.set_recompute_faults(true);

        let err = ledger
            .add(post_id, user, EngagementKind::Like)
            .await
            .unwrap_err();
        assert!(matches!(err, EngagementError::StoreUnavailable(_)));
        assert!(ledger.drift().contains(post_id, EngagementKind::Like));
        assert_eq!(count(&ledger, post_id, EngagementKind::Like).await, 0);

        // The event is durable, so a retry reports the desired state.
        let retry = ledger
            .add(post_id, user, EngagementKind::Like)
            .await
            .unwrap_err();
        assert_eq!(retry, EngagementError::AlreadyEngaged(EngagementKind::Like));

        assert_eq!(ledger.reconcile_pending().await, (0, 1));
        assert!(ledger.drift().contains(post_id, EngagementKind::Like));

        store.set_recompute_faults(false);
        assert_eq!(ledger.reconcile_pending().await, (1, 0));
        assert!(ledger.drift().is_empty());
        assert_eq!(count(&ledger, post_id, EngagementKind::Like).await, 1);
    }

    #[tokio::test]
    async fn failed_decrement_is_repaired_immediately() {
        let (ledger, store, post_id) = ledger_with_post();
        let user = Some(Uuid::new_v4());
        ledger.add(post_id, user, EngagementKind::Like).await.unwrap();
        store.set_counter_faults(true);

        let outcome = ledger
            .remove(post_id, user, EngagementKind::Like)
            .await
            .unwrap();

        assert_eq!(outcome, ToggleOutcome::Applied);
        assert_eq!(count(&ledger, post_id, EngagementKind::Like).await, 0);
        assert_eq!(store.event_count(post_id, EngagementKind::Like).unwrap(), 0);
        assert!(ledger.drift().is_empty());
    }

    #[tokio::test]
    async fn unrepaired_decrement_is_left_for_the_reconciler() {
        let (ledger, store, post_id) = ledger_with_post();
        let user = Some(Uuid::new_v4());
        ledger.add(post_id, user, EngagementKind::Like).await.unwrap();
        store.set_counter_faults(true);
        store.set_recompute_faults(true);

        let err = ledger
            .remove(post_id, user, EngagementKind::Like)
            .await
            .unwrap_err();
        assert!(matches!(err, EngagementError::StoreUnavailable(_)));
        assert!(ledger.drift().contains(post_id, EngagementKind::Like));
        assert_eq!(store.event_count(post_id, EngagementKind::Like).unwrap(), 0);
        assert_eq!(count(&ledger, post_id, EngagementKind::Like).await, 1);

        // The delete is durable, so a retry is a no-op.
        let retry = ledger
            .remove(post_id, user, EngagementKind::Like)
            .await
            .unwrap();
        assert_eq!(retry, ToggleOutcome::Unchanged);

        store.set_recompute_faults(false);
        assert_eq!(ledger.reconcile_pending().await, (1, 0));
        assert!(ledger.drift().is_empty());
        assert_eq!(count(&ledger, post_id, EngagementKind::Like).await, 0);
    }

    #[tokio::test]
    async fn post_deleted_during_write_is_not_drift() {
        let inner = InMemoryContentStore::new();
        let post_id = Uuid::new_v4();
        inner.insert_post(post_id).unwrap();
        let ledger = EngagementLedger::new(
            Arc::new(DeletedDuringWrite { inner }),
            DriftRegistry::new(),
        );
        let user = Some(Uuid::new_v4());

        let before = COUNTER_DRIFT_TOTAL
            .with_label_values(&[EngagementKind::Prayer.as_str()])
            .get();

        assert_eq!(
            ledger
                .add(post_id, user, EngagementKind::Prayer)
                .await
                .unwrap_err(),
            EngagementError::PostNotFound
        );
        assert_eq!(
            ledger
                .remove(post_id, user, EngagementKind::Prayer)
                .await
                .unwrap_err(),
            EngagementError::PostNotFound
        );

        assert!(ledger.drift().is_empty());
        // No other test in this module records prayer drift
        assert_eq!(
            COUNTER_DRIFT_TOTAL
                .with_label_values(&[EngagementKind::Prayer.as_str()])
                .get(),
            before
        );
    }

    #[tokio::test]
    async fn reconcile_post_resets_drifted_counters() {
        let (ledger, store, post_id) = ledger_with_post();
        ledger
            .add(post_id, Some(Uuid::new_v4()), EngagementKind::Like)
            .await
            .unwrap();
        store.force_counter(post_id, EngagementKind::Like, 42).unwrap();
        store
            .force_counter(post_id, EngagementKind::Prayer, 3)
            .unwrap();

        let counts = ledger.reconcile_post(post_id).await.unwrap();

        assert_eq!(counts.like_count, 1);
        assert_eq!(counts.prayer_count, 0);
    }

    #[tokio::test]
    async fn status_for_anonymous_caller_has_no_flags() {
        let (ledger, _store, post_id) = ledger_with_post();
        ledger
            .add(post_id, Some(Uuid::new_v4()), EngagementKind::Like)
            .await
            .unwrap();

        let status = ledger.status(post_id, None).await.unwrap();

        assert_eq!(status.like_count, 1);
        assert!(!status.liked);
        assert!(!status.prayed);
    }

    #[tokio::test]
    async fn engagers_page_size_is_clamped() {
        let (ledger, _store, post_id) = ledger_with_post();
        for _ in 0..3 {
            ledger
                .add(post_id, Some(Uuid::new_v4()), EngagementKind::Prayer)
                .await
                .unwrap();
        }

        let page = ledger
            .engagers(post_id, EngagementKind::Prayer, Some(0), None)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);

        let page = ledger
            .engagers(post_id, EngagementKind::Prayer, Some(500), Some(-4))
            .await
            .unwrap();
        assert_eq!(page.len(), 3);
    }
}
