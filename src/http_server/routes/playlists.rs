use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::entities;
use crate::http_server::auth::CurrentUser;
use crate::http_server::error::Report;
use crate::http_server::routes::parse_provider;
use crate::http_server::state::AppState;
use crate::services::playlist::{CreatePlaylist, UpdatePlaylist};

#[derive(Serialize)]
pub struct PlaylistResponse {
    #[serde(flatten)]
    playlist: entities::playlist::Model,
    songs: Vec<entities::playlist_song::Model>,
}

/// GET /playlists
pub async fn list(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, Report> {
    let playlists = app_state.playlists().list_created_by(user.id).await?;
    Ok(Json(playlists))
}

/// GET /playlists/shared
pub async fn list_shared(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, Report> {
    let playlists = app_state.playlists().list_shared_with(user.id).await?;
    Ok(Json(playlists))
}

/// GET /playlists/{id}
pub async fn get(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(playlist_id): Path<i64>,
) -> Result<impl IntoResponse, Report> {
    let (playlist, songs) = app_state
        .playlists()
        .get_authorized(user.id, playlist_id)
        .await?;
    Ok(Json(PlaylistResponse { playlist, songs }))
}

/// POST /playlists
pub async fn create(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreatePlaylist>,
) -> Result<impl IntoResponse, Report> {
    let (playlist, songs) = app_state.playlists().create(user.id, input).await?;
    Ok((StatusCode::CREATED, Json(PlaylistResponse { playlist, songs })))
}

/// PUT /playlists/{id}
pub async fn update(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(playlist_id): Path<i64>,
    Json(input): Json<UpdatePlaylist>,
) -> Result<impl IntoResponse, Report> {
    let (playlist, songs) = app_state
        .playlists()
        .update(user.id, playlist_id, input)
        .await?;
    Ok(Json(PlaylistResponse { playlist, songs }))
}

/// DELETE /playlists/{id}
pub async fn delete(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(playlist_id): Path<i64>,
) -> Result<impl IntoResponse, Report> {
    app_state.playlists().delete(user.id, playlist_id).await?;
    Ok(Json(serde_json::json!({ "message": "Playlist deleted successfully" })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    user_ids: Vec<i64>,
}

/// POST /playlists/{id}/share
pub async fn share(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(playlist_id): Path<i64>,
    Json(request): Json<ShareRequest>,
) -> Result<impl IntoResponse, Report> {
    let newly_shared = app_state
        .playlists()
        .share(user.id, playlist_id, &request.user_ids)
        .await?;
    let shared_with = app_state.playlists().shared_user_ids(playlist_id).await?;
    Ok(Json(serde_json::json!({
        "newlyShared": newly_shared,
        "sharedWith": shared_with,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    target_service: String,
}

/// POST /playlists/{id}/export
pub async fn export(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(playlist_id): Path<i64>,
    Json(request): Json<ExportRequest>,
) -> Result<impl IntoResponse, Report> {
    let target = parse_provider(&request.target_service)?;
    let outcome = app_state
        .reconciliation()
        .export(user.id, playlist_id, target)
        .await?;
    Ok(Json(outcome))
}
