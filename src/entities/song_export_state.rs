use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::Set;
use sea_orm::entity::prelude::*;

use crate::ports::provider::ProviderKind;

/// Persisted "already added to the target playlist" marker. Export
/// idempotence reads this table instead of re-deriving membership from the
/// remote playlist.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "song_export_states")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub playlist_song_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub provider: ProviderKind,
    pub provider_playlist_id: String,
    pub added_at: DateTime<Utc>,
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    fn new() -> Self {
        Self {
            added_at: Set(Utc::now()),
            ..ActiveModelTrait::default()
        }
    }
}
