use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities;
use crate::http_server::auth::CurrentUser;
use crate::http_server::error::Report;
use crate::http_server::routes::parse_provider;
use crate::http_server::state::AppState;
use crate::ports::provider::ProviderKind;
use crate::services::connection::ConnectionTokens;

/// Connection view without token material.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionView {
    provider: ProviderKind,
    connected: bool,
    provider_user_id: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl From<entities::provider_connection::Model> for ConnectionView {
    fn from(connection: entities::provider_connection::Model) -> Self {
        Self {
            provider: connection.provider,
            connected: connection.connected,
            provider_user_id: connection.provider_user_id,
            expires_at: connection.expires_at,
        }
    }
}

/// GET /connections
pub async fn list(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, Report> {
    let connections = app_state.connections().list(user.id).await?;
    let views: Vec<ConnectionView> = connections.into_iter().map(Into::into).collect();
    Ok(Json(views))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    provider_user_id: Option<String>,
    #[serde(default)]
    expires_in_seconds: Option<i64>,
}

/// POST /connections/{provider}
///
/// The OAuth authorization-code exchange happens outside this service; this
/// endpoint only stores the resulting token fields.
pub async fn connect(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(provider): Path<String>,
    Json(request): Json<ConnectRequest>,
) -> Result<impl IntoResponse, Report> {
    let provider = parse_provider(&provider)?;
    if request.access_token.trim().is_empty() {
        return Err(crate::services::error::ServiceError::invalid_input(
            "Access token is required",
        )
        .into());
    }

    let connection = app_state
        .connections()
        .upsert(
            user.id,
            provider,
            ConnectionTokens {
                access_token: request.access_token,
                refresh_token: request.refresh_token,
                provider_user_id: request.provider_user_id,
                expires_in_seconds: request.expires_in_seconds,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ConnectionView::from(connection))))
}

/// DELETE /connections/{provider}
pub async fn disconnect(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(provider): Path<String>,
) -> Result<impl IntoResponse, Report> {
    let provider = parse_provider(&provider)?;
    app_state.connections().disconnect(user.id, provider).await?;
    Ok(Json(serde_json::json!({ "message": "Service disconnected" })))
}
