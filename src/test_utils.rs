use std::sync::Arc;

use chrono::{DateTime, Utc};
use migration::MigratorTrait;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ConnectOptions, ConnectionTrait,
    Database as SeaDatabase, Set,
};

use crate::database::Database;
use crate::entities;
use crate::ports::provider::ProviderKind;

/// In-memory sqlite database with the full schema applied. One connection
/// only, so every query sees the same memory database.
pub async fn test_db() -> Arc<Database> {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).sqlx_logging(false);

    let conn = SeaDatabase::connect(opt).await.unwrap();

    conn.execute_unprepared("PRAGMA foreign_keys = ON")
        .await
        .unwrap();

    migration::Migrator::up(&conn, None).await.unwrap();

    Arc::new(Database { conn })
}

pub async fn seed_user(db: &Database, username: &str) -> entities::user::Model {
    entities::user::ActiveModel {
        username: Set(username.to_string()),
        email: Set(format!("{username}@example.com")),
        ..entities::user::ActiveModel::new()
    }
    .insert(&db.conn)
    .await
    .unwrap()
}

pub async fn seed_connection(
    db: &Database,
    user_id: i64,
    provider: ProviderKind,
    expires_at: Option<DateTime<Utc>>,
) -> entities::provider_connection::Model {
    entities::provider_connection::ActiveModel {
        user_id: Set(user_id),
        provider: Set(provider),
        connected: Set(true),
        access_token: Set(Some("stored-token".to_string())),
        refresh_token: Set(Some("stored-refresh".to_string())),
        provider_user_id: Set(Some("provider-user".to_string())),
        expires_at: Set(expires_at),
        ..entities::provider_connection::ActiveModel::new()
    }
    .insert(&db.conn)
    .await
    .unwrap()
}

pub async fn seed_playlist(
    db: &Database,
    creator_id: i64,
    name: &str,
    source_provider: ProviderKind,
) -> entities::playlist::Model {
    entities::playlist::ActiveModel {
        name: Set(name.to_string()),
        creator_id: Set(creator_id),
        is_public: Set(false),
        source_provider: Set(source_provider),
        ..entities::playlist::ActiveModel::new()
    }
    .insert(&db.conn)
    .await
    .unwrap()
}

pub async fn seed_song(
    db: &Database,
    playlist_id: i64,
    position: i32,
    title: &str,
    artist: &str,
    duration_seconds: Option<i32>,
    spotify_id: Option<&str>,
) -> entities::playlist_song::Model {
    entities::playlist_song::ActiveModel {
        playlist_id: Set(playlist_id),
        position: Set(position),
        title: Set(title.to_string()),
        artist: Set(artist.to_string()),
        duration_seconds: Set(duration_seconds),
        spotify_id: Set(spotify_id.map(str::to_string)),
        ..entities::playlist_song::ActiveModel::new()
    }
    .insert(&db.conn)
    .await
    .unwrap()
}
