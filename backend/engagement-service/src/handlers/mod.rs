pub mod admin;
pub mod engagement;

use crate::metrics::metrics_handler;
use crate::services::EngagementLedger;
use actix_web::{web, HttpResponse};

/// Public engagement routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/posts/{post_id}/engagement",
        web::get().to(engagement::get_engagement_status),
    )
    .route(
        "/posts/{post_id}/{kind}/users",
        web::get().to(engagement::list_engagers),
    )
    .route(
        "/posts/{post_id}/{kind}",
        web::post().to(engagement::add_engagement),
    )
    .route(
        "/posts/{post_id}/{kind}",
        web::delete().to(engagement::remove_engagement),
    );
}

/// Counter reconciliation routes, mounted only when admin is enabled
pub fn configure_admin(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/admin/posts/{post_id}/reconcile",
        web::post().to(admin::reconcile_post),
    )
    .route("/admin/drift", web::get().to(admin::drift_stats));
}

/// Liveness, readiness and metrics
pub fn configure_ops(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(|| async { "OK" }))
        .route("/ready", web::get().to(ready))
        .route("/metrics", web::get().to(metrics_handler));
}

async fn ready(ledger: web::Data<EngagementLedger>) -> HttpResponse {
    match ledger.store().ping().await {
        Ok(()) => HttpResponse::Ok().body("READY"),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            HttpResponse::ServiceUnavailable().body(format!("error: {}", e))
        }
    }
}
