use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;

use crate::http_server::auth::CurrentUser;
use crate::http_server::error::Report;
use crate::http_server::routes::parse_provider;
use crate::http_server::state::AppState;
use crate::matching::resolver::SongCandidate;
use crate::ports::provider::ProviderKind;

#[derive(Deserialize)]
pub struct SearchParams {
    q: String,
    service: Option<String>,
}

/// GET /music/search?q=...&service=spotify|appleMusic|amazonMusic|all
pub async fn search(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, Report> {
    let target = match params.service.as_deref() {
        None | Some("all") => None,
        Some(service) => Some(parse_provider(service)?),
    };

    let hits = app_state.music().search(user.id, target, &params.q).await?;
    Ok(Json(hits))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSongPayload {
    title: String,
    artist: String,
    #[serde(default)]
    album: Option<String>,
    #[serde(default)]
    duration_seconds: Option<i32>,
    #[serde(default)]
    spotify_id: Option<String>,
    #[serde(default)]
    apple_music_id: Option<String>,
    #[serde(default)]
    amazon_music_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    song: MatchSongPayload,
    target_service: String,
}

/// POST /music/match
pub async fn match_song(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<MatchRequest>,
) -> Result<impl IntoResponse, Report> {
    let target = parse_provider(&request.target_service)?;

    let mut provider_ids = HashMap::new();
    if let Some(id) = request.song.spotify_id {
        provider_ids.insert(ProviderKind::Spotify, id);
    }
    if let Some(id) = request.song.apple_music_id {
        provider_ids.insert(ProviderKind::AppleMusic, id);
    }
    if let Some(id) = request.song.amazon_music_id {
        provider_ids.insert(ProviderKind::AmazonMusic, id);
    }
    let candidate = SongCandidate {
        title: request.song.title,
        artist: request.song.artist,
        album: request.song.album,
        duration_seconds: request.song.duration_seconds,
        provider_ids,
    };

    let result = app_state.music().match_song(user.id, &candidate, target).await?;
    Ok(Json(result))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    service: String,
    playlist_id: String,
}

/// POST /music/import
pub async fn import(
    State(app_state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<ImportRequest>,
) -> Result<impl IntoResponse, Report> {
    let source = parse_provider(&request.service)?;
    if request.playlist_id.trim().is_empty() {
        return Err(crate::services::error::ServiceError::invalid_input(
            "Playlist ID is required",
        )
        .into());
    }

    let outcome = app_state
        .reconciliation()
        .import(user.id, source, &request.playlist_id)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}
