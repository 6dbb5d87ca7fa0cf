use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;

use crate::http_server::auth::CurrentUser;
use crate::http_server::error::Report;
use crate::http_server::state::AppState;
use crate::services::error::ServiceError;
use crate::services::reconciliation::job::{self, JobOutcome};

/// GET /jobs/{id}
pub async fn get(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(job_id): Path<i64>,
) -> Result<impl IntoResponse, Report> {
    let job = job::get(&app_state.db, job_id)
        .await?
        .ok_or(ServiceError::not_found("Job not found"))?;
    if job.user_id != user.id {
        return Err(ServiceError::forbidden("You can only view your own jobs").into());
    }

    let failures = job::failures(&app_state.db, job.id).await?;
    Ok(Json(JobOutcome { job, failures }))
}

/// POST /jobs/{id}/cancel
///
/// Cooperative: the running job stops between song batches. Provider-side
/// changes already applied stay applied.
pub async fn cancel(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(job_id): Path<i64>,
) -> Result<impl IntoResponse, Report> {
    let job = job::get(&app_state.db, job_id)
        .await?
        .ok_or(ServiceError::not_found("Job not found"))?;
    if job.user_id != user.id {
        return Err(ServiceError::forbidden("You can only cancel your own jobs").into());
    }

    let cancelled = app_state.jobs.cancel(job_id);
    Ok(Json(serde_json::json!({ "cancelled": cancelled })))
}
