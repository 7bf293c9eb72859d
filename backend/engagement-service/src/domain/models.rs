use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Reaction a user can toggle on a post.
///
/// Every kind owns its own event table and counter column on `posts`, so the
/// ledger can run the same toggle logic for all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementKind {
    Like,
    Prayer,
}

impl EngagementKind {
    pub const ALL: [EngagementKind; 2] = [EngagementKind::Like, EngagementKind::Prayer];

    /// URL segment and metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementKind::Like => "like",
            EngagementKind::Prayer => "prayer",
        }
    }

    /// Table holding one row per (post, user) engagement of this kind
    pub fn event_table(&self) -> &'static str {
        match self {
            EngagementKind::Like => "post_likes",
            EngagementKind::Prayer => "post_prayers",
        }
    }

    /// Denormalized counter column on `posts`
    pub fn counter_column(&self) -> &'static str {
        match self {
            EngagementKind::Like => "like_count",
            EngagementKind::Prayer => "prayer_count",
        }
    }

    /// Message returned to a caller who already holds this engagement
    pub fn conflict_message(&self) -> &'static str {
        match self {
            EngagementKind::Like => "Already liked",
            EngagementKind::Prayer => "Already prayed",
        }
    }
}

impl fmt::Display for EngagementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown engagement kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for EngagementKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(EngagementKind::Like),
            "prayer" => Ok(EngagementKind::Prayer),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// Identity of an engagement event: at most one may exist per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub kind: EngagementKind,
}

impl EventKey {
    pub fn new(post_id: Uuid, user_id: Uuid, kind: EngagementKind) -> Self {
        Self {
            post_id,
            user_id,
            kind,
        }
    }
}

/// Engagement event - a user liked or prayed for a post
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EngagementEvent {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Denormalized counters stored on a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostCounts {
    pub post_id: Uuid,
    pub like_count: i64,
    pub prayer_count: i64,
}

impl PostCounts {
    pub fn empty(post_id: Uuid) -> Self {
        Self {
            post_id,
            like_count: 0,
            prayer_count: 0,
        }
    }

    pub fn get(&self, kind: EngagementKind) -> i64 {
        match kind {
            EngagementKind::Like => self.like_count,
            EngagementKind::Prayer => self.prayer_count,
        }
    }

    pub fn set(&mut self, kind: EngagementKind, value: i64) {
        match kind {
            EngagementKind::Like => self.like_count = value,
            EngagementKind::Prayer => self.prayer_count = value,
        }
    }
}

/// Post counters plus the caller's own engagement state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngagementStatus {
    pub post_id: Uuid,
    pub like_count: i64,
    pub prayer_count: i64,
    pub liked: bool,
    pub prayed: bool,
}

/// Result of a toggle request that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The event was written or deleted and the counter adjusted
    Applied,
    /// Nothing to do: the requested state already held
    Unchanged,
}
