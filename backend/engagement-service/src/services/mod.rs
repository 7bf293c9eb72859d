pub mod drift;
pub mod ledger;

pub use drift::DriftRegistry;
pub use ledger::EngagementLedger;
