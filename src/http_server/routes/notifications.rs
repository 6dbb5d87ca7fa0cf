use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;

use crate::http_server::auth::CurrentUser;
use crate::http_server::error::Report;
use crate::http_server::state::AppState;

/// GET /notifications
pub async fn list(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, Report> {
    let notifications = app_state.notifications().list_for_user(user.id).await?;
    Ok(Json(notifications))
}

/// PUT /notifications/{id}/read
pub async fn mark_read(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(notification_id): Path<i64>,
) -> Result<impl IntoResponse, Report> {
    app_state
        .notifications()
        .mark_read(user.id, notification_id)
        .await?;
    Ok(Json(serde_json::json!({ "message": "Notification marked as read" })))
}

/// PUT /notifications/read-all
pub async fn mark_all_read(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, Report> {
    app_state.notifications().mark_all_read(user.id).await?;
    Ok(Json(serde_json::json!({ "message": "All notifications marked as read" })))
}

/// DELETE /notifications/{id}
pub async fn delete(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(notification_id): Path<i64>,
) -> Result<impl IntoResponse, Report> {
    app_state
        .notifications()
        .delete(user.id, notification_id)
        .await?;
    Ok(Json(serde_json::json!({ "message": "Notification deleted successfully" })))
}
