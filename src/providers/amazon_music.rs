use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::AmazonMusicConfig;
use crate::ports::provider::{
    CreatePlaylistRequest, ProviderClient, ProviderError, ProviderKind, ProviderPlaylist,
    ProviderTrack, RefreshedToken,
};
use crate::providers::{DirectRateLimiter, check_response, outbound_limiter, request_error};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const ADD_TRACKS_BATCH: usize = 50;

/// Amazon Music API adapter. The endpoint base is configurable so
/// deployments can point at a gateway.
pub struct AmazonMusicProvider {
    client: reqwest::Client,
    api_base: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    limiter: DirectRateLimiter,
}

#[derive(Deserialize)]
struct AmazonTrack {
    id: String,
    title: String,
    #[serde(rename = "artistName")]
    artist_name: String,
    #[serde(rename = "albumName")]
    album_name: Option<String>,
    #[serde(rename = "durationSeconds")]
    duration_seconds: Option<i32>,
    #[serde(rename = "imageUrl")]
    image_url: Option<String>,
}

impl From<AmazonTrack> for ProviderTrack {
    fn from(track: AmazonTrack) -> Self {
        ProviderTrack {
            id: track.id,
            title: track.title,
            artist: track.artist_name,
            album: track.album_name,
            duration_seconds: track.duration_seconds,
            cover_image_url: track.image_url,
        }
    }
}

impl AmazonMusicProvider {
    pub fn new(config: &AmazonMusicConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.clone(),
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            limiter: outbound_limiter(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
    ) -> Result<T, ProviderError> {
        self.limiter.until_ready().await;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(request_error)?;
        check_response(response)
            .await?
            .json()
            .await
            .map_err(|error| ProviderError::InvalidResponse(error.to_string()))
    }
}

#[async_trait]
impl ProviderClient for AmazonMusicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AmazonMusic
    }

    fn batch_limit(&self) -> usize {
        ADD_TRACKS_BATCH
    }

    fn supports_refresh(&self) -> bool {
        true
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshedToken, ProviderError> {
        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", self.client_id.as_str());
        params.insert("client_secret", self.client_secret.as_str());

        self.limiter.until_ready().await;
        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(request_error)?;

        if response.status() == reqwest::StatusCode::BAD_REQUEST
            || response.status() == reqwest::StatusCode::UNAUTHORIZED
        {
            return Err(ProviderError::TokenExpired);
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            refresh_token: Option<String>,
            expires_in: i64,
        }

        let token: TokenResponse = check_response(response)
            .await?
            .json()
            .await
            .map_err(|error| ProviderError::InvalidResponse(error.to_string()))?;

        Ok(RefreshedToken {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in_seconds: token.expires_in,
        })
    }

    async fn search(
        &self,
        query: &str,
        token: &str,
        limit: usize,
    ) -> Result<Vec<ProviderTrack>, ProviderError> {
        #[derive(Deserialize)]
        struct SearchResponse {
            tracks: Vec<AmazonTrack>,
        }

        let url = format!(
            "{}/search?keywords={}&types=tracks&limit={}",
            self.api_base,
            urlencoding::encode(query),
            limit
        );
        let page: SearchResponse = self.get_json(&url, token).await?;
        Ok(page.tracks.into_iter().map(Into::into).collect())
    }

    async fn fetch_playlist(
        &self,
        playlist_id: &str,
        token: &str,
    ) -> Result<ProviderPlaylist, ProviderError> {
        #[derive(Deserialize)]
        struct PlaylistResponse {
            id: String,
            name: String,
            description: Option<String>,
            #[serde(rename = "imageUrl")]
            image_url: Option<String>,
        }

        let url = format!("{}/playlists/{}", self.api_base, playlist_id);
        let playlist: PlaylistResponse = self.get_json(&url, token).await?;

        let mut tracks = Vec::new();
        let mut next_url = Some(format!(
            "{}/playlists/{}/tracks?limit=100",
            self.api_base, playlist_id
        ));

        while let Some(url) = next_url {
            #[derive(Deserialize)]
            struct TracksResponse {
                tracks: Vec<AmazonTrack>,
                next: Option<String>,
            }

            let page: TracksResponse = self.get_json(&url, token).await?;
            tracks.extend(page.tracks.into_iter().map(ProviderTrack::from));
            next_url = page.next;
        }

        Ok(ProviderPlaylist {
            id: playlist.id,
            name: playlist.name,
            description: playlist.description,
            cover_image_url: playlist.image_url,
            tracks,
        })
    }

    async fn create_playlist(
        &self,
        token: &str,
        request: &CreatePlaylistRequest,
    ) -> Result<String, ProviderError> {
        #[derive(Deserialize)]
        struct CreateResponse {
            id: String,
        }

        self.limiter.until_ready().await;
        let response = self
            .client
            .post(format!("{}/playlists", self.api_base))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "name": request.name,
                "description": request.description.clone().unwrap_or_default(),
                "visibility": if request.is_public { "PUBLIC" } else { "PRIVATE" },
            }))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(request_error)?;

        let created: CreateResponse = check_response(response)
            .await?
            .json()
            .await
            .map_err(|error| ProviderError::InvalidResponse(error.to_string()))?;
        Ok(created.id)
    }

    async fn add_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
        token: &str,
    ) -> Result<(), ProviderError> {
        let mut added = 0usize;

        for chunk in track_ids.chunks(ADD_TRACKS_BATCH) {
            self.limiter.until_ready().await;
            let result = async {
                let response = self
                    .client
                    .post(format!("{}/playlists/{}/tracks", self.api_base, playlist_id))
                    .bearer_auth(token)
                    .json(&serde_json::json!({ "trackIds": chunk }))
                    .timeout(REQUEST_TIMEOUT)
                    .send()
                    .await
                    .map_err(request_error)?;
                check_response(response).await
            }
            .await;

            if let Err(error) = result {
                return Err(ProviderError::PartialWrite {
                    added,
                    source: Box::new(error),
                });
            }
            added += chunk.len();
        }

        Ok(())
    }
}
