/// Admin handlers - counter reconciliation
use crate::error::EngagementResult;
use crate::services::EngagementLedger;
use actix_web::{web, HttpResponse};
use uuid::Uuid;

/// POST /admin/posts/{post_id}/reconcile
pub async fn reconcile_post(
    ledger: web::Data<EngagementLedger>,
    post_id: web::Path<Uuid>,
) -> EngagementResult<HttpResponse> {
    let counts = ledger.reconcile_post(*post_id).await?;
    Ok(HttpResponse::Ok().json(counts))
}

/// GET /admin/drift
pub async fn drift_stats(ledger: web::Data<EngagementLedger>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "pending_count": ledger.drift().len(),
    }))
}
