use std::time::Duration;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// An external music service with its own catalog and playlist API.
/// `Custom` marks playlists created inside the app; it has no adapter.
#[derive(
    Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "camelCase")]
pub enum ProviderKind {
    #[sea_orm(string_value = "spotify")]
    Spotify,
    #[sea_orm(string_value = "apple_music")]
    AppleMusic,
    #[sea_orm(string_value = "amazon_music")]
    AmazonMusic,
    #[sea_orm(string_value = "custom")]
    Custom,
}

impl ProviderKind {
    /// Parse the public API spelling (`spotify`, `appleMusic`, `amazonMusic`).
    pub fn parse_api(value: &str) -> Option<Self> {
        match value {
            "spotify" => Some(ProviderKind::Spotify),
            "appleMusic" => Some(ProviderKind::AppleMusic),
            "amazonMusic" => Some(ProviderKind::AmazonMusic),
            "custom" => Some(ProviderKind::Custom),
            _ => None,
        }
    }

    pub fn api_name(&self) -> &'static str {
        match self {
            ProviderKind::Spotify => "spotify",
            ProviderKind::AppleMusic => "appleMusic",
            ProviderKind::AmazonMusic => "amazonMusic",
            ProviderKind::Custom => "custom",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.api_name())
    }
}

/// Decoupled representation of a provider track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTrack {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_seconds: Option<i32>,
    pub cover_image_url: Option<String>,
}

/// Decoupled representation of a provider playlist with its complete,
/// ordered track list (adapters paginate internally).
#[derive(Debug, Clone)]
pub struct ProviderPlaylist {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
    pub tracks: Vec<ProviderTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlaylistRequest {
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
}

/// Result of a refresh-token exchange.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Some providers rotate the refresh token on every exchange.
    pub refresh_token: Option<String>,
    pub expires_in_seconds: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider token expired and no refresh path is available")]
    TokenExpired,
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },
    #[error("{added} tracks were written before the provider rejected the batch")]
    PartialWrite {
        added: usize,
        #[source]
        source: Box<ProviderError>,
    },
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Transient errors are retried with backoff before being recorded
    /// against a song or batch.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Unavailable(_) | ProviderError::RateLimited { .. }
        )
    }
}

/// Port trait wrapping one external music provider.
///
/// Implementations live in `providers::*` (production) or test mocks. All
/// calls are side-effect free towards local state; only the connection
/// service mutates stored credentials.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ProviderClient: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Documented per-request track limit for playlist writes.
    fn batch_limit(&self) -> usize;

    /// Whether the provider issues refresh tokens the server can redeem.
    fn supports_refresh(&self) -> bool;

    async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshedToken, ProviderError>;

    /// Search the provider catalog, preserving its relevance ranking.
    async fn search(
        &self,
        query: &str,
        token: &str,
        limit: usize,
    ) -> Result<Vec<ProviderTrack>, ProviderError>;

    async fn fetch_playlist(
        &self,
        playlist_id: &str,
        token: &str,
    ) -> Result<ProviderPlaylist, ProviderError>;

    /// Returns the provider-native playlist id.
    async fn create_playlist(
        &self,
        token: &str,
        request: &CreatePlaylistRequest,
    ) -> Result<String, ProviderError>;

    /// Adds tracks in `batch_limit`-sized sequential requests. A mid-way
    /// failure surfaces as `PartialWrite` carrying the applied count.
    async fn add_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
        token: &str,
    ) -> Result<(), ProviderError>;
}
