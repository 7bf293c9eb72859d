//! # Actix Middleware Library
//!
//! Shared middleware components for the engagement HTTP services
//!
//! ## Modules
//! - `jwt_auth`: caller identity resolution (`IdentityProvider`, `Caller`)
//! - `correlation_id`: request correlation ids
//! - `logging`: structured request logging
//! - `metrics`: Prometheus metrics middleware

pub mod correlation_id;
pub mod jwt_auth;
pub mod logging;
pub mod metrics;

pub use correlation_id::{get_correlation_id, CorrelationId, CorrelationIdMiddleware};
pub use jwt_auth::{
    Caller, Claims, IdentityError, IdentityMiddleware, IdentityProvider, JwtIdentityProvider,
    UserId,
};
pub use logging::Logging;
pub use metrics::MetricsMiddleware;
