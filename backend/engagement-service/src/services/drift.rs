use crate::domain::EngagementKind;
use dashmap::DashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Counters that may disagree with their event log.
///
/// Entries are added when an event write succeeded but the following counter
/// adjustment did not confirm. The reconciler drains the set and recomputes
/// each counter from the live event count.
#[derive(Clone, Default)]
pub struct DriftRegistry {
    pending: Arc<DashSet<(Uuid, EngagementKind)>>,
}

impl DriftRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the pair was not already pending
    pub fn record(&self, post_id: Uuid, kind: EngagementKind) -> bool {
        self.pending.insert((post_id, kind))
    }

    pub fn resolve(&self, post_id: Uuid, kind: EngagementKind) {
        self.pending.remove(&(post_id, kind));
    }

    pub fn contains(&self, post_id: Uuid, kind: EngagementKind) -> bool {
        self.pending.contains(&(post_id, kind))
    }

    /// Take every pending pair, leaving the registry empty
    pub fn drain(&self) -> Vec<(Uuid, EngagementKind)> {
        let snapshot: Vec<_> = self.pending.iter().map(|entry| *entry).collect();
        for pair in &snapshot {
            self.pending.remove(pair);
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
