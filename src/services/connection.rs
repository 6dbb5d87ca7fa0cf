use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use color_eyre::eyre::{OptionExt, Result, WrapErr};
use sea_orm::{ActiveModelBehavior, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};

use crate::database::Database;
use crate::entities;
use crate::ports::provider::{ProviderError, ProviderKind};
use crate::providers::{ProviderRegistry, with_provider_retry};
use crate::services::error::ServiceError;
use crate::services::locks::ProviderLocks;

/// Tokens within this margin of expiry are refreshed eagerly so an in-flight
/// job doesn't race the expiry mid-sequence.
const EXPIRY_MARGIN_SECONDS: i64 = 30;

/// Token fields produced by the external OAuth exchange.
#[derive(Debug, Clone)]
pub struct ConnectionTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub provider_user_id: Option<String>,
    pub expires_in_seconds: Option<i64>,
}

pub struct ConnectionService {
    db: Arc<Database>,
    registry: Arc<ProviderRegistry>,
    locks: Arc<ProviderLocks>,
}

impl ConnectionService {
    pub fn new(db: Arc<Database>, registry: Arc<ProviderRegistry>, locks: Arc<ProviderLocks>) -> Self {
        Self { db, registry, locks }
    }

    pub async fn get(
        &self,
        user_id: i64,
        provider: ProviderKind,
    ) -> Result<Option<entities::provider_connection::Model>> {
        entities::provider_connection::Entity::find()
            .filter(entities::provider_connection::Column::UserId.eq(user_id))
            .filter(entities::provider_connection::Column::Provider.eq(provider))
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch provider connection")
    }

    pub async fn list(&self, user_id: i64) -> Result<Vec<entities::provider_connection::Model>> {
        entities::provider_connection::Entity::find()
            .filter(entities::provider_connection::Column::UserId.eq(user_id))
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch provider connections")
    }

    /// Store the token fields from a completed OAuth exchange, creating or
    /// replacing the user's connection for this provider.
    pub async fn upsert(
        &self,
        user_id: i64,
        provider: ProviderKind,
        tokens: ConnectionTokens,
    ) -> Result<entities::provider_connection::Model> {
        let expires_at = tokens
            .expires_in_seconds
            .map(|seconds| Utc::now() + ChronoDuration::seconds(seconds));

        let existing = self.get(user_id, provider).await?;

        let model = if let Some(existing) = existing {
            let mut active: entities::provider_connection::ActiveModel = existing.into();
            active.connected = Set(true);
            active.access_token = Set(Some(tokens.access_token));
            active.refresh_token = Set(tokens.refresh_token);
            active.provider_user_id = Set(tokens.provider_user_id);
            active.expires_at = Set(expires_at);
            active
                .update(&self.db.conn)
                .await
                .wrap_err("Failed to update provider connection")?
        } else {
            let active = entities::provider_connection::ActiveModel {
                user_id: Set(user_id),
                provider: Set(provider),
                connected: Set(true),
                access_token: Set(Some(tokens.access_token)),
                refresh_token: Set(tokens.refresh_token),
                provider_user_id: Set(tokens.provider_user_id),
                expires_at: Set(expires_at),
                ..entities::provider_connection::ActiveModel::new()
            };
            active
                .insert(&self.db.conn)
                .await
                .wrap_err("Failed to create provider connection")?
        };

        log::info!("Provider connection stored: user={user_id} provider={provider}");
        Ok(model)
    }

    /// Disconnect clears every token field in a single update; there is no
    /// partially cleared state.
    pub async fn disconnect(&self, user_id: i64, provider: ProviderKind) -> Result<()> {
        let connection = self
            .get(user_id, provider)
            .await?
            .ok_or_eyre("Provider connection not found")?;

        let mut active: entities::provider_connection::ActiveModel = connection.into();
        active.connected = Set(false);
        active.access_token = Set(None);
        active.refresh_token = Set(None);
        active.provider_user_id = Set(None);
        active.expires_at = Set(None);
        active
            .update(&self.db.conn)
            .await
            .wrap_err("Failed to disconnect provider")?;

        log::info!("Provider disconnected: user={user_id} provider={provider}");
        Ok(())
    }

    /// Returns a usable access token, refreshing the stored connection first
    /// when it is at or past expiry. Serialized per (user, provider).
    pub async fn ensure_valid_token(&self, user_id: i64, provider: ProviderKind) -> Result<String> {
        let _guard = self.locks.acquire((user_id, provider)).await;
        self.valid_token_locked(user_id, provider).await
    }

    /// Same as [`ensure_valid_token`] but assumes the caller already holds
    /// the (user, provider) lock for a longer provider-call sequence.
    pub(crate) async fn valid_token_locked(
        &self,
        user_id: i64,
        provider: ProviderKind,
    ) -> Result<String> {
        let connection = self
            .get(user_id, provider)
            .await?
            .filter(|connection| connection.connected)
            .ok_or(ServiceError::ServiceNotConnected { provider })?;

        let access_token = connection
            .access_token
            .clone()
            .ok_or(ServiceError::ServiceNotConnected { provider })?;

        let expired = connection
            .expires_at
            .map(|expires_at| expires_at <= Utc::now() + ChronoDuration::seconds(EXPIRY_MARGIN_SECONDS))
            .unwrap_or(false);

        if !expired {
            return Ok(access_token);
        }

        let adapter = self
            .registry
            .get(provider)
            .ok_or_else(|| ServiceError::invalid_input(format!("no adapter configured for {provider}")))?;

        let refresh_token = connection
            .refresh_token
            .clone()
            .filter(|_| adapter.supports_refresh())
            .ok_or(ServiceError::TokenExpired { provider })?;

        log::debug!("Refreshing expired token: user={user_id} provider={provider}");
        let refreshed = with_provider_retry(|| adapter.refresh_token(&refresh_token))
            .await
            .map_err(|error| match error {
                ProviderError::TokenExpired => ServiceError::TokenExpired { provider },
                other => ServiceError::Provider(other),
            })?;

        let new_access = refreshed.access_token.clone();
        let mut active: entities::provider_connection::ActiveModel = connection.into();
        active.access_token = Set(Some(refreshed.access_token));
        if let Some(rotated) = refreshed.refresh_token {
            active.refresh_token = Set(Some(rotated));
        }
        active.expires_at = Set(Some(
            Utc::now() + ChronoDuration::seconds(refreshed.expires_in_seconds),
        ));
        active
            .update(&self.db.conn)
            .await
            .wrap_err("Failed to persist refreshed token")?;

        Ok(new_access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::provider::{MockProviderClient, RefreshedToken};
    use crate::test_utils::{seed_connection, seed_user, test_db};

    fn refreshing_registry(times: usize) -> Arc<ProviderRegistry> {
        let mut adapter = MockProviderClient::new();
        adapter.expect_kind().return_const(ProviderKind::Spotify);
        adapter.expect_supports_refresh().return_const(true);
        adapter
            .expect_refresh_token()
            .times(times)
            .returning(|_| {
                Ok(RefreshedToken {
                    access_token: "fresh-token".to_string(),
                    refresh_token: Some("rotated-refresh".to_string()),
                    expires_in_seconds: 3600,
                })
            });

        let mut registry = ProviderRegistry::empty();
        registry.register(Arc::new(adapter));
        Arc::new(registry)
    }

    #[tokio::test]
    async fn valid_token_returned_without_refresh() {
        let db = test_db().await;
        let user = seed_user(&db, "alice").await;
        seed_connection(
            &db,
            user.id,
            ProviderKind::Spotify,
            Some(Utc::now() + ChronoDuration::hours(1)),
        )
        .await;

        let service = ConnectionService::new(
            db.clone(),
            refreshing_registry(0),
            Arc::new(ProviderLocks::new()),
        );
        let token = service
            .ensure_valid_token(user.id, ProviderKind::Spotify)
            .await
            .unwrap();
        assert_eq!(token, "stored-token");
    }

    #[tokio::test]
    async fn concurrent_calls_refresh_exactly_once() {
        let db = test_db().await;
        let user = seed_user(&db, "alice").await;
        seed_connection(
            &db,
            user.id,
            ProviderKind::Spotify,
            Some(Utc::now() - ChronoDuration::minutes(5)),
        )
        .await;

        let service = Arc::new(ConnectionService::new(
            db.clone(),
            refreshing_registry(1),
            Arc::new(ProviderLocks::new()),
        ));

        let first = {
            let service = service.clone();
            let user_id = user.id;
            tokio::spawn(async move {
                service
                    .ensure_valid_token(user_id, ProviderKind::Spotify)
                    .await
                    .unwrap()
            })
        };
        let second = {
            let service = service.clone();
            let user_id = user.id;
            tokio::spawn(async move {
                service
                    .ensure_valid_token(user_id, ProviderKind::Spotify)
                    .await
                    .unwrap()
            })
        };

        assert_eq!(first.await.unwrap(), "fresh-token");
        assert_eq!(second.await.unwrap(), "fresh-token");
    }

    #[tokio::test]
    async fn expired_without_refresh_token_is_token_expired() {
        let db = test_db().await;
        let user = seed_user(&db, "alice").await;
        let connection = seed_connection(
            &db,
            user.id,
            ProviderKind::Spotify,
            Some(Utc::now() - ChronoDuration::minutes(5)),
        )
        .await;

        let mut active: entities::provider_connection::ActiveModel = connection.into();
        active.refresh_token = Set(None);
        active.update(&db.conn).await.unwrap();

        let service = ConnectionService::new(
            db.clone(),
            refreshing_registry(0),
            Arc::new(ProviderLocks::new()),
        );
        let error = service
            .ensure_valid_token(user.id, ProviderKind::Spotify)
            .await
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ServiceError>(),
            Some(ServiceError::TokenExpired { .. })
        ));
    }

    #[tokio::test]
    async fn disconnect_clears_all_token_fields() {
        let db = test_db().await;
        let user = seed_user(&db, "alice").await;
        seed_connection(&db, user.id, ProviderKind::Spotify, None).await;

        let service = ConnectionService::new(
            db.clone(),
            Arc::new(ProviderRegistry::empty()),
            Arc::new(ProviderLocks::new()),
        );
        service
            .disconnect(user.id, ProviderKind::Spotify)
            .await
            .unwrap();

        let connection = service
            .get(user.id, ProviderKind::Spotify)
            .await
            .unwrap()
            .unwrap();
        assert!(!connection.connected);
        assert_eq!(connection.access_token, None);
        assert_eq!(connection.refresh_token, None);
        assert_eq!(connection.provider_user_id, None);
        assert_eq!(connection.expires_at, None);
    }

    #[tokio::test]
    async fn missing_connection_is_service_not_connected() {
        let db = test_db().await;
        let user = seed_user(&db, "alice").await;

        let service = ConnectionService::new(
            db.clone(),
            Arc::new(ProviderRegistry::empty()),
            Arc::new(ProviderLocks::new()),
        );
        let error = service
            .ensure_valid_token(user.id, ProviderKind::Spotify)
            .await
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ServiceError>(),
            Some(ServiceError::ServiceNotConnected { .. })
        ));
    }
}
