use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::AppleMusicConfig;
use crate::ports::provider::{
    CreatePlaylistRequest, ProviderClient, ProviderError, ProviderKind, ProviderPlaylist,
    ProviderTrack, RefreshedToken,
};
use crate::providers::{DirectRateLimiter, check_response, outbound_limiter, request_error};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const ADD_TRACKS_BATCH: usize = 25;

/// Apple Music API adapter. Requests carry two credentials: the app-level
/// developer token (configuration) and the per-user Music-User-Token (the
/// stored connection's access token).
pub struct AppleMusicProvider {
    client: reqwest::Client,
    api_base: String,
    developer_token: String,
    storefront: String,
    limiter: DirectRateLimiter,
}

#[derive(Deserialize)]
struct AppleSong {
    id: String,
    attributes: AppleSongAttributes,
}

#[derive(Deserialize)]
struct AppleSongAttributes {
    name: String,
    #[serde(rename = "artistName")]
    artist_name: String,
    #[serde(rename = "albumName")]
    album_name: Option<String>,
    #[serde(rename = "durationInMillis")]
    duration_in_millis: Option<i64>,
    artwork: Option<AppleArtwork>,
}

#[derive(Deserialize)]
struct AppleArtwork {
    url: String,
}

impl From<AppleSong> for ProviderTrack {
    fn from(song: AppleSong) -> Self {
        ProviderTrack {
            id: song.id,
            title: song.attributes.name,
            artist: song.attributes.artist_name,
            album: song.attributes.album_name,
            duration_seconds: song
                .attributes
                .duration_in_millis
                .map(|ms| (ms / 1000) as i32),
            cover_image_url: song
                .attributes
                .artwork
                // Artwork URLs are templated with {w}x{h} placeholders
                .map(|artwork| artwork.url.replace("{w}", "300").replace("{h}", "300")),
        }
    }
}

impl AppleMusicProvider {
    pub fn new(config: &AppleMusicConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.clone(),
            developer_token: config.developer_token.clone(),
            storefront: config.storefront.clone(),
            limiter: outbound_limiter(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        user_token: &str,
    ) -> Result<T, ProviderError> {
        self.limiter.until_ready().await;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.developer_token)
            .header("Music-User-Token", user_token)
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
impl ProviderClient for AppleMusicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AppleMusic
    }

    fn batch_limit(&self) -> usize {
        ADD_TRACKS_BATCH
    }

    fn supports_refresh(&self) -> bool {
        false
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<RefreshedToken, ProviderError> {
        // Music-User-Tokens cannot be refreshed server-side; the user has to
        // re-authorize through the client.
        Err(ProviderError::TokenExpired)
    }

    async fn search(
        &self,
        query: &str,
        token: &str,
        limit: usize,
    ) -> Result<Vec<ProviderTrack>, ProviderError> {
        #[derive(Deserialize)]
        struct SearchResponse {
            results: SearchResults,
        }

        #[derive(Deserialize)]
        struct SearchResults {
            songs: Option<SongPage>,
        }

        #[derive(Deserialize)]
        struct SongPage {
            data: Vec<AppleSong>,
        }

        let url = format!(
            "{}/catalog/{}/search?term={}&types=songs&limit={}",
            self.api_base,
            self.storefront,
            urlencoding::encode(query),
            limit
        );
        let page: SearchResponse = self.get_json(&url, token).await?;
        Ok(page
            .results
            .songs
            .map(|songs| songs.data.into_iter().map(Into::into).collect())
            .unwrap_or_default())
    }

    async fn fetch_playlist(
        &self,
        playlist_id: &str,
        token: &str,
    ) -> Result<ProviderPlaylist, ProviderError> {
        #[derive(Deserialize)]
        struct PlaylistResponse {
            data: Vec<ApplePlaylist>,
        }

        #[derive(Deserialize)]
        struct ApplePlaylist {
            id: String,
            attributes: ApplePlaylistAttributes,
        }

        #[derive(Deserialize)]
        struct ApplePlaylistAttributes {
            name: String,
            description: Option<AppleDescription>,
            artwork: Option<AppleArtwork>,
        }

        #[derive(Deserialize)]
        struct AppleDescription {
            standard: String,
        }

        let url = format!("{}/me/library/playlists/{}", self.api_base, playlist_id);
        let response: PlaylistResponse = self.get_json(&url, token).await?;
        let playlist = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("empty playlist response".to_string()))?;

        // Library track listings page through `next` relative paths
        let mut tracks = Vec::new();
        let mut next_path = Some(format!(
            "/v1/me/library/playlists/{playlist_id}/tracks?limit=100"
        ));

        while let Some(path) = next_path {
            #[derive(Deserialize)]
            struct TracksResponse {
                data: Vec<AppleSong>,
                next: Option<String>,
            }

            let origin = self
                .api_base
                .strip_suffix("/v1")
                .unwrap_or(&self.api_base)
                .to_string();
            let page: TracksResponse = self.get_json(&format!("{origin}{path}"), token).await?;
            tracks.extend(page.data.into_iter().map(ProviderTrack::from));
            next_path = page.next;
        }

        Ok(ProviderPlaylist {
            id: playlist.id,
            name: playlist.attributes.name,
            description: playlist
                .attributes
                .description
                .map(|description| description.standard),
            cover_image_url: playlist
                .attributes
                .artwork
                .map(|artwork| artwork.url.replace("{w}", "300").replace("{h}", "300")),
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
            data: Vec<CreatedPlaylist>,
        }

        #[derive(Deserialize)]
        struct CreatedPlaylist {
            id: String,
        }

        self.limiter.until_ready().await;
        let response = self
            .client
            .post(format!("{}/me/library/playlists", self.api_base))
            .bearer_auth(&self.developer_token)
            .header("Music-User-Token", token)
            .json(&serde_json::json!({
                "attributes": {
                    "name": request.name,
                    "description": {
                        "standard": request.description.clone().unwrap_or_default(),
                    },
                },
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
        created
            .data
            .into_iter()
            .next()
            .map(|playlist| playlist.id)
            .ok_or_else(|| ProviderError::InvalidResponse("empty create response".to_string()))
    }

    async fn add_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
        token: &str,
    ) -> Result<(), ProviderError> {
        let mut added = 0usize;

        for chunk in track_ids.chunks(ADD_TRACKS_BATCH) {
            let data: Vec<serde_json::Value> = chunk
                .iter()
                .map(|id| serde_json::json!({ "id": id, "type": "songs" }))
                .collect();

            self.limiter.until_ready().await;
            let result = async {
                let response = self
                    .client
                    .post(format!(
                        "{}/me/library/playlists/{}/tracks",
                        self.api_base, playlist_id
                    ))
                    .bearer_auth(&self.developer_token)
                    .header("Music-User-Token", token)
                    .json(&serde_json::json!({ "data": data }))
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
