/// Engagement handlers - HTTP endpoints for likes and prayers
use crate::domain::{EngagementKind, ToggleOutcome};
use crate::error::{EngagementError, EngagementResult};
use crate::services::EngagementLedger;
use actix_middleware::Caller;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::future::Future;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct EngagementPath {
    pub post_id: Uuid,
    pub kind: EngagementKind,
}

#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct EngagerResponse {
    pub user_id: Uuid,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct EngagersResponse {
    pub post_id: Uuid,
    pub kind: EngagementKind,
    pub users: Vec<EngagerResponse>,
}

/// Run a ledger mutation on its own task so a client disconnect cannot cancel
/// it between a committed event write and the drift handling that follows.
async fn run_detached<F>(fut: F) -> EngagementResult<ToggleOutcome>
where
    F: Future<Output = EngagementResult<ToggleOutcome>> + Send + 'static,
{
    tokio::spawn(fut).await.map_err(|e| {
        tracing::error!(error = %e, "Engagement task aborted");
        EngagementError::StoreUnavailable(format!("engagement task aborted: {}", e))
    })?
}

fn success() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "success": true }))
}

/// POST /posts/{post_id}/{kind}
pub async fn add_engagement(
    ledger: web::Data<EngagementLedger>,
    path: web::Path<EngagementPath>,
    caller: Caller,
) -> EngagementResult<HttpResponse> {
    let EngagementPath { post_id, kind } = path.into_inner();
    let ledger = ledger.into_inner();
    let user_id = caller.user_id();

    run_detached(async move { ledger.add(post_id, user_id, kind).await }).await?;

    Ok(success())
}

/// DELETE /posts/{post_id}/{kind}
pub async fn remove_engagement(
    ledger: web::Data<EngagementLedger>,
    path: web::Path<EngagementPath>,
    caller: Caller,
) -> EngagementResult<HttpResponse> {
    let EngagementPath { post_id, kind } = path.into_inner();
    let ledger = ledger.into_inner();
    let user_id = caller.user_id();

    run_detached(async move { ledger.remove(post_id, user_id, kind).await }).await?;

    Ok(success())
}

/// GET /posts/{post_id}/engagement
pub async fn get_engagement_status(
    ledger: web::Data<EngagementLedger>,
    post_id: web::Path<Uuid>,
    caller: Caller,
) -> EngagementResult<HttpResponse> {
    let status = ledger.status(*post_id, caller.user_id()).await?;
    Ok(HttpResponse::Ok().json(status))
}

/// GET /posts/{post_id}/{kind}/users
pub async fn list_engagers(
    ledger: web::Data<EngagementLedger>,
    path: web::Path<EngagementPath>,
    query: web::Query<PaginationParams>,
) -> EngagementResult<HttpResponse> {
    let EngagementPath { post_id, kind } = path.into_inner();
    let events = ledger
        .engagers(post_id, kind, query.limit, query.offset)
        .await?;

    Ok(HttpResponse::Ok().json(EngagersResponse {
        post_id,
        kind,
        users: events
            .into_iter()
            .map(|event| EngagerResponse {
                user_id: event.user_id,
                created_at: event.created_at.to_rfc3339(),
            })
            .collect(),
    }))
}
