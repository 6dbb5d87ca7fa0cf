use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::Set;
use sea_orm::entity::prelude::*;
use serde::Serialize;

use crate::ports::provider::ProviderKind;

/// One canonical song inside a playlist. Provider id columns grow
/// monotonically: a confirmed id is never replaced by a lower-confidence
/// match (enforced in the reconciliation service).
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize)]
#[sea_orm(table_name = "playlist_songs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub playlist_id: i64,
    pub position: i32,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_seconds: Option<i32>,
    pub cover_image_url: Option<String>,
    pub spotify_id: Option<String>,
    pub apple_music_id: Option<String>,
    pub amazon_music_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// The stored provider-native id for the given provider, if confirmed.
    pub fn provider_id(&self, provider: ProviderKind) -> Option<&str> {
        match provider {
            ProviderKind::Spotify => self.spotify_id.as_deref(),
            ProviderKind::AppleMusic => self.apple_music_id.as_deref(),
            ProviderKind::AmazonMusic => self.amazon_music_id.as_deref(),
            ProviderKind::Custom => None,
        }
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: Set(now),
            updated_at: Set(now),
            ..ActiveModelTrait::default()
        }
    }

    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, sea_orm::DbErr>
    where
        C: ConnectionTrait,
    {
        if !insert {
            self.updated_at = Set(Utc::now());
        }
        Ok(self)
    }
}
