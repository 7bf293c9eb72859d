pub mod models;

pub use models::{
    EngagementEvent, EngagementKind, EngagementStatus, EventKey, PostCounts, ToggleOutcome,
    UnknownKind,
};
