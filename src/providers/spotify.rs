use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SpotifyConfig;
use crate::ports::provider::{
    CreatePlaylistRequest, ProviderClient, ProviderError, ProviderKind, ProviderPlaylist,
    ProviderTrack, RefreshedToken,
};
use crate::providers::{DirectRateLimiter, check_response, outbound_limiter, request_error};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Documented per-request cap for playlist track additions.
const ADD_TRACKS_BATCH: usize = 100;

/// Spotify Web API adapter.
pub struct SpotifyProvider {
    client: reqwest::Client,
    api_base: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    limiter: DirectRateLimiter,
}

#[derive(Deserialize)]
struct SpotifyTrack {
    id: String,
    name: String,
    duration_ms: Option<i64>,
    artists: Vec<SpotifyArtist>,
    album: Option<SpotifyAlbum>,
}

#[derive(Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Deserialize)]
struct SpotifyAlbum {
    name: String,
    #[serde(default)]
    images: Vec<SpotifyImage>,
}

#[derive(Deserialize)]
struct SpotifyImage {
    url: String,
}

impl From<SpotifyTrack> for ProviderTrack {
    fn from(track: SpotifyTrack) -> Self {
        ProviderTrack {
            id: track.id,
            title: track.name,
            artist: track
                .artists
                .into_iter()
                .map(|artist| artist.name)
                .collect::<Vec<_>>()
                .join(", "),
            album: track.album.as_ref().map(|album| album.name.clone()),
            duration_seconds: track
                .duration_ms
                .map(|ms| (ms / 1000) as i32),
            cover_image_url: track
                .album
                .and_then(|album| album.images.into_iter().next())
                .map(|image| image.url),
        }
    }
}

impl SpotifyProvider {
    pub fn new(config: &SpotifyConfig) -> Self {
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
impl ProviderClient for SpotifyProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Spotify
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

        self.limiter.until_ready().await;
        let response = self
            .client
            .post(&self.token_url)
            // Serializes to x-www-form-urlencoded as the token endpoint requires
            .form(&params)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(request_error)?;

        if response.status() == reqwest::StatusCode::BAD_REQUEST
            || response.status() == reqwest::StatusCode::UNAUTHORIZED
        {
            // The refresh grant was rejected; the connection must be redone.
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
            tracks: SearchTracks,
        }

        #[derive(Deserialize)]
        struct SearchTracks {
            items: Vec<SpotifyTrack>,
        }

        let url = format!(
            "{}/search?q={}&type=track&limit={}",
            self.api_base,
            urlencoding::encode(query),
            limit
        );
        let page: SearchResponse = self.get_json(&url, token).await?;
        Ok(page.tracks.items.into_iter().map(Into::into).collect())
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
            #[serde(default)]
            images: Vec<SpotifyImage>,
        }

        let url = format!("{}/playlists/{}", self.api_base, playlist_id);
        let playlist: PlaylistResponse = self.get_json(&url, token).await?;

        // Track pages come separately so large playlists can be walked in full
        let mut tracks = Vec::new();
        let mut next_url = Some(format!(
            "{}/playlists/{}/tracks?limit=100",
            self.api_base, playlist_id
        ));

        while let Some(url) = next_url {
            #[derive(Deserialize)]
            struct PlaylistTrackItem {
                // Local or removed tracks come back as null
                track: Option<SpotifyTrack>,
            }

            #[derive(Deserialize)]
            struct TracksResponse {
                items: Vec<PlaylistTrackItem>,
                next: Option<String>,
            }

            let page: TracksResponse = self.get_json(&url, token).await?;
            for item in page.items {
                if let Some(track) = item.track {
                    tracks.push(track.into());
                }
            }
            next_url = page.next;
        }

        Ok(ProviderPlaylist {
            id: playlist.id,
            name: playlist.name,
            description: playlist.description,
            cover_image_url: playlist.images.into_iter().next().map(|image| image.url),
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
            .post(format!("{}/me/playlists", self.api_base))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "name": request.name,
                "description": request.description.clone().unwrap_or_default(),
                "public": request.is_public,
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
            let uris: Vec<String> = chunk
                .iter()
                .map(|id| format!("spotify:track:{id}"))
                .collect();

            self.limiter.until_ready().await;
            let result = async {
                let response = self
                    .client
                    .post(format!(
                        "{}/playlists/{}/tracks",
                        self.api_base, playlist_id
                    ))
                    .bearer_auth(token)
                    .json(&serde_json::json!({ "uris": uris }))
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
