use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::Set;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Why a single song failed inside a reconciliation job. Kept per song so a
/// partially failed job can be resumed by reprocessing only these entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    #[sea_orm(string_value = "no_match_found")]
    NoMatchFound,
    #[sea_orm(string_value = "provider_unavailable")]
    ProviderUnavailable,
    #[sea_orm(string_value = "rate_limited")]
    RateLimited,
    #[sea_orm(string_value = "partial_write")]
    PartialWrite,
    #[sea_orm(string_value = "invalid_track")]
    InvalidTrack,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize)]
#[sea_orm(table_name = "job_song_failures")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub job_id: i64,
    pub position: Option<i32>,
    pub title: String,
    pub artist: String,
    pub reason: FailureReason,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    fn new() -> Self {
        Self {
            created_at: Set(Utc::now()),
            ..ActiveModelTrait::default()
        }
    }
}
