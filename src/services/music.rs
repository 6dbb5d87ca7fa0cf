use std::sync::Arc;

use color_eyre::eyre::Result;
use serde::Serialize;

use crate::database::Database;
use crate::matching::resolver::{self, MatchResult, SongCandidate};
use crate::ports::provider::{ProviderKind, ProviderTrack};
use crate::providers::{ProviderRegistry, with_provider_retry};
use crate::services::connection::ConnectionService;
use crate::services::error::ServiceError;
use crate::services::locks::ProviderLocks;

const SEARCH_LIMIT: usize = 20;

/// One search result, tagged with the provider it came from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub provider: ProviderKind,
    #[serde(flatten)]
    pub track: ProviderTrack,
}

pub struct MusicService {
    db: Arc<Database>,
    registry: Arc<ProviderRegistry>,
    locks: Arc<ProviderLocks>,
}

impl MusicService {
    pub fn new(db: Arc<Database>, registry: Arc<ProviderRegistry>, locks: Arc<ProviderLocks>) -> Self {
        Self { db, registry, locks }
    }

    fn connections(&self) -> ConnectionService {
        ConnectionService::new(self.db.clone(), self.registry.clone(), self.locks.clone())
    }

    /// Search one provider, or every connected provider when `target` is
    /// `None`, keeping each provider's own relevance order.
    pub async fn search(
        &self,
        user_id: i64,
        target: Option<ProviderKind>,
        query: &str,
    ) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(ServiceError::invalid_input("Search query is required").into());
        }

        match target {
            Some(provider) => self.search_provider(user_id, provider, query).await,
            None => {
                let connections = self.connections();
                let mut hits = Vec::new();
                let mut searched_any = false;

                for provider in self.registry.kinds() {
                    let connected = connections
                        .get(user_id, provider)
                        .await?
                        .map(|connection| connection.connected)
                        .unwrap_or(false);
                    if !connected {
                        continue;
                    }
                    searched_any = true;
                    hits.extend(self.search_provider(user_id, provider, query).await?);
                }

                if !searched_any {
                    return Err(ServiceError::invalid_input(
                        "You need to connect at least one music service",
                    )
                    .into());
                }
                Ok(hits)
            }
        }
    }

    async fn search_provider(
        &self,
        user_id: i64,
        provider: ProviderKind,
        query: &str,
    ) -> Result<Vec<SearchHit>> {
        let adapter = self
            .registry
            .get(provider)
            .ok_or_else(|| ServiceError::invalid_input(format!("no adapter configured for {provider}")))?;

        let token = self.connections().ensure_valid_token(user_id, provider).await?;
        let tracks = with_provider_retry(|| adapter.search(query, &token, SEARCH_LIMIT))
            .await
            .map_err(ServiceError::Provider)?;

        Ok(tracks
            .into_iter()
            .map(|track| SearchHit { provider, track })
            .collect())
    }

    /// Stateless single-song lookup against a target provider. Not a job.
    pub async fn match_song(
        &self,
        user_id: i64,
        candidate: &SongCandidate,
        target: ProviderKind,
    ) -> Result<MatchResult> {
        if candidate.title.trim().is_empty() || candidate.artist.trim().is_empty() {
            return Err(ServiceError::invalid_input("Song title and artist are required").into());
        }

        let adapter = self
            .registry
            .get(target)
            .ok_or_else(|| ServiceError::invalid_input(format!("no adapter configured for {target}")))?;

        let token = self.connections().ensure_valid_token(user_id, target).await?;
        let result = with_provider_retry(|| resolver::resolve(adapter.as_ref(), &token, candidate))
            .await
            .map_err(ServiceError::Provider)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{Duration as ChronoDuration, Utc};

    use super::*;
    use crate::ports::provider::MockProviderClient;
    use crate::test_utils::{seed_connection, seed_user, test_db};

    fn track(id: &str, title: &str) -> ProviderTrack {
        ProviderTrack {
            id: id.to_string(),
            title: title.to_string(),
            artist: "Example Artist".to_string(),
            album: None,
            duration_seconds: Some(180),
            cover_image_url: None,
        }
    }

    fn searching_adapter(kind: ProviderKind, result_id: &'static str) -> MockProviderClient {
        let mut adapter = MockProviderClient::new();
        adapter.expect_kind().return_const(kind);
        adapter
            .expect_search()
            .returning(move |_, _, _| Ok(vec![track(result_id, "Song 1")]));
        adapter
    }

    #[tokio::test]
    async fn search_all_merges_connected_providers_only() {
        let db = test_db().await;
        let user = seed_user(&db, "alice").await;
        let future = Some(Utc::now() + ChronoDuration::hours(1));
        seed_connection(&db, user.id, ProviderKind::Spotify, future).await;
        seed_connection(&db, user.id, ProviderKind::AppleMusic, future).await;
        // Amazon adapter exists but the user never connected it

        let mut registry = ProviderRegistry::empty();
        registry.register(Arc::new(searching_adapter(ProviderKind::Spotify, "sp-1")));
        registry.register(Arc::new(searching_adapter(ProviderKind::AppleMusic, "am-1")));
        let mut amazon = MockProviderClient::new();
        amazon.expect_kind().return_const(ProviderKind::AmazonMusic);
        amazon.expect_search().times(0);
        registry.register(Arc::new(amazon));

        let service = MusicService::new(
            db.clone(),
            Arc::new(registry),
            Arc::new(ProviderLocks::new()),
        );
        let hits = service.search(user.id, None, "Song 1").await.unwrap();

        assert_eq!(hits.len(), 2);
        assert!(hits.iter().any(|hit| hit.provider == ProviderKind::Spotify));
        assert!(hits.iter().any(|hit| hit.provider == ProviderKind::AppleMusic));
    }

    #[tokio::test]
    async fn search_all_with_no_connections_is_invalid_input() {
        let db = test_db().await;
        let user = seed_user(&db, "alice").await;

        let mut registry = ProviderRegistry::empty();
        registry.register(Arc::new(searching_adapter(ProviderKind::Spotify, "sp-1")));

        let service = MusicService::new(
            db.clone(),
            Arc::new(registry),
            Arc::new(ProviderLocks::new()),
        );
        let error = service.search(user.id, None, "Song 1").await.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ServiceError>(),
            Some(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn match_with_known_id_issues_no_network_calls() {
        let db = test_db().await;
        let user = seed_user(&db, "alice").await;
        seed_connection(
            &db,
            user.id,
            ProviderKind::Spotify,
            Some(Utc::now() + ChronoDuration::hours(1)),
        )
        .await;

        let mut adapter = MockProviderClient::new();
        adapter.expect_kind().return_const(ProviderKind::Spotify);
        adapter.expect_search().times(0);
        adapter.expect_refresh_token().times(0);
        let mut registry = ProviderRegistry::empty();
        registry.register(Arc::new(adapter));

        let service = MusicService::new(
            db.clone(),
            Arc::new(registry),
            Arc::new(ProviderLocks::new()),
        );

        let mut provider_ids = HashMap::new();
        provider_ids.insert(ProviderKind::Spotify, "sp-known".to_string());
        let candidate = SongCandidate {
            title: "Song 1".to_string(),
            artist: "Example Artist".to_string(),
            album: None,
            duration_seconds: Some(180),
            provider_ids,
        };

        let result = service
            .match_song(user.id, &candidate, ProviderKind::Spotify)
            .await
            .unwrap();
        assert_eq!(result.provider_id.as_deref(), Some("sp-known"));
        assert_eq!(result.confidence, 1.0);
    }
}
