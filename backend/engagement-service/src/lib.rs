pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod repository;
pub mod services;
pub mod workers;

pub use domain::{EngagementKind, ToggleOutcome};
pub use error::{EngagementError, EngagementResult};
pub use repository::{ContentStore, InMemoryContentStore, PgContentStore, StoreError};
pub use services::{DriftRegistry, EngagementLedger};
