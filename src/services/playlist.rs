use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr};
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;

use crate::database::Database;
use crate::entities;
use crate::entities::notification::NotificationKind;
use crate::ports::provider::ProviderKind;
use crate::services::error::ServiceError;
use crate::services::notification::{NotificationEvent, NotificationService};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSong {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<i32>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub spotify_id: Option<String>,
    #[serde(default)]
    pub apple_music_id: Option<String>,
    #[serde(default)]
    pub amazon_music_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlaylist {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub songs: Vec<NewSong>,
    #[serde(default)]
    pub is_public: bool,
}

/// Partial update; absent fields keep their current value. A provided song
/// list replaces the playlist contents wholesale.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlaylist {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
    pub songs: Option<Vec<NewSong>>,
    pub is_public: Option<bool>,
}

pub struct PlaylistService {
    db: Arc<Database>,
}

impl PlaylistService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        creator_id: i64,
        input: CreatePlaylist,
    ) -> Result<(entities::playlist::Model, Vec<entities::playlist_song::Model>)> {
        if input.name.trim().is_empty() {
            return Err(ServiceError::invalid_input("Playlist name is required").into());
        }
        validate_songs(&input.songs)?;

        let playlist = entities::playlist::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            cover_image_url: Set(input.cover_image_url),
            creator_id: Set(creator_id),
            is_public: Set(input.is_public),
            source_provider: Set(ProviderKind::Custom),
            ..entities::playlist::ActiveModel::new()
        }
        .insert(&self.db.conn)
        .await
        .wrap_err("Failed to create playlist")?;

        let songs = self.insert_songs(playlist.id, 0, &input.songs).await?;

        log::info!("Playlist created: '{}' (ID: {})", playlist.name, playlist.id);
        Ok((playlist, songs))
    }

    pub async fn list_created_by(&self, user_id: i64) -> Result<Vec<entities::playlist::Model>> {
        entities::playlist::Entity::find()
            .filter(entities::playlist::Column::CreatorId.eq(user_id))
            .order_by_desc(entities::playlist::Column::CreatedAt)
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch playlists")
    }

    pub async fn list_shared_with(&self, user_id: i64) -> Result<Vec<entities::playlist::Model>> {
        let shares = entities::playlist_share::Entity::find()
            .filter(entities::playlist_share::Column::UserId.eq(user_id))
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch playlist shares")?;

        let ids: Vec<i64> = shares.iter().map(|share| share.playlist_id).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        entities::playlist::Entity::find()
            .filter(entities::playlist::Column::Id.is_in(ids))
            .order_by_desc(entities::playlist::Column::CreatedAt)
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch shared playlists")
    }

    /// Fetch a playlist the user may read: creator, shared-with, or public.
    pub async fn get_authorized(
        &self,
        user_id: i64,
        playlist_id: i64,
    ) -> Result<(entities::playlist::Model, Vec<entities::playlist_song::Model>)> {
        let playlist = self.find(playlist_id).await?;

        if playlist.creator_id != user_id
            && !playlist.is_public
            && !self.is_shared_with(playlist_id, user_id).await?
        {
            return Err(
                ServiceError::forbidden("You do not have access to this playlist").into(),
            );
        }

        let songs = self.songs(playlist_id).await?;
        Ok((playlist, songs))
    }

    pub async fn update(
        &self,
        user_id: i64,
        playlist_id: i64,
        input: UpdatePlaylist,
    ) -> Result<(entities::playlist::Model, Vec<entities::playlist_song::Model>)> {
        let playlist = self.require_creator(user_id, playlist_id).await?;

        if let Some(songs) = &input.songs {
            validate_songs(songs)?;
        }
        if let Some(name) = &input.name
            && name.trim().is_empty()
        {
            return Err(ServiceError::invalid_input("Playlist name is required").into());
        }

        let mut active: entities::playlist::ActiveModel = playlist.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(cover_image_url) = input.cover_image_url {
            active.cover_image_url = Set(Some(cover_image_url));
        }
        if let Some(is_public) = input.is_public {
            active.is_public = Set(is_public);
        }
        let playlist = active
            .update(&self.db.conn)
            .await
            .wrap_err("Failed to update playlist")?;

        if let Some(songs) = &input.songs {
            entities::playlist_song::Entity::delete_many()
                .filter(entities::playlist_song::Column::PlaylistId.eq(playlist_id))
                .exec(&self.db.conn)
                .await
                .wrap_err("Failed to clear playlist songs")?;
            self.insert_songs(playlist_id, 0, songs).await?;
        }

        // Everyone holding the playlist hears about the edit
        let shared = self.shared_user_ids(playlist_id).await?;
        if !shared.is_empty() {
            NotificationService::new(self.db.clone())
                .notify(NotificationEvent {
                    kind: NotificationKind::PlaylistUpdated,
                    actor_user_id: user_id,
                    affected_user_ids: shared,
                    payload: serde_json::json!({
                        "playlistId": playlist.id,
                        "playlistName": playlist.name,
                    }),
                })
                .await?;
        }

        let songs = self.songs(playlist_id).await?;
        Ok((playlist, songs))
    }

    pub async fn delete(&self, user_id: i64, playlist_id: i64) -> Result<()> {
        let playlist = self.require_creator(user_id, playlist_id).await?;

        entities::playlist::Entity::delete_by_id(playlist.id)
            .exec(&self.db.conn)
            .await
            .wrap_err("Failed to delete playlist")?;

        log::info!("Playlist deleted: '{}' (ID: {})", playlist.name, playlist.id);
        Ok(())
    }

    /// Share with a set of users. A user already holding the playlist is
    /// skipped, so `shared_with` keeps set semantics.
    pub async fn share(
        &self,
        user_id: i64,
        playlist_id: i64,
        user_ids: &[i64],
    ) -> Result<Vec<i64>> {
        if user_ids.is_empty() {
            return Err(ServiceError::invalid_input("User IDs are required").into());
        }

        let playlist = self.require_creator(user_id, playlist_id).await?;

        let known = entities::user::Entity::find()
            .filter(entities::user::Column::Id.is_in(user_ids.to_vec()))
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch users to share with")?;
        if known.len() != user_ids.iter().collect::<std::collections::HashSet<_>>().len() {
            return Err(ServiceError::not_found("One or more users not found").into());
        }

        let mut newly_shared = Vec::new();
        for &recipient_id in user_ids {
            if recipient_id == user_id {
                continue;
            }
            let existing = entities::playlist_share::Entity::find()
                .filter(
                    Condition::all()
                        .add(entities::playlist_share::Column::PlaylistId.eq(playlist_id))
                        .add(entities::playlist_share::Column::UserId.eq(recipient_id)),
                )
                .one(&self.db.conn)
                .await
                .wrap_err("Failed to check existing share")?;
            if existing.is_some() {
                continue;
            }

            entities::playlist_share::ActiveModel {
                playlist_id: Set(playlist_id),
                user_id: Set(recipient_id),
                ..entities::playlist_share::ActiveModel::new()
            }
            .insert(&self.db.conn)
            .await
            .wrap_err("Failed to share playlist")?;
            newly_shared.push(recipient_id);
        }

        if !newly_shared.is_empty() {
            NotificationService::new(self.db.clone())
                .notify(NotificationEvent {
                    kind: NotificationKind::PlaylistShared,
                    actor_user_id: user_id,
                    affected_user_ids: newly_shared.clone(),
                    payload: serde_json::json!({
                        "playlistId": playlist.id,
                        "playlistName": playlist.name,
                    }),
                })
                .await?;
        }

        Ok(newly_shared)
    }

    pub async fn songs(&self, playlist_id: i64) -> Result<Vec<entities::playlist_song::Model>> {
        entities::playlist_song::Entity::find()
            .filter(entities::playlist_song::Column::PlaylistId.eq(playlist_id))
            .order_by_asc(entities::playlist_song::Column::Position)
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch playlist songs")
    }

    pub async fn shared_user_ids(&self, playlist_id: i64) -> Result<Vec<i64>> {
        let shares = entities::playlist_share::Entity::find()
            .filter(entities::playlist_share::Column::PlaylistId.eq(playlist_id))
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch playlist shares")?;
        Ok(shares.into_iter().map(|share| share.user_id).collect())
    }

    pub async fn find(&self, playlist_id: i64) -> Result<entities::playlist::Model> {
        entities::playlist::Entity::find_by_id(playlist_id)
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch playlist")?
            .ok_or_else(|| ServiceError::not_found("Playlist not found").into())
    }

    pub async fn require_creator(
        &self,
        user_id: i64,
        playlist_id: i64,
    ) -> Result<entities::playlist::Model> {
        let playlist = self.find(playlist_id).await?;
        if playlist.creator_id != user_id {
            return Err(
                ServiceError::forbidden("You can only modify your own playlists").into(),
            );
        }
        Ok(playlist)
    }

    pub async fn is_shared_with(&self, playlist_id: i64, user_id: i64) -> Result<bool> {
        let share = entities::playlist_share::Entity::find()
            .filter(
                Condition::all()
                    .add(entities::playlist_share::Column::PlaylistId.eq(playlist_id))
                    .add(entities::playlist_share::Column::UserId.eq(user_id)),
            )
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to check playlist share")?;
        Ok(share.is_some())
    }

    async fn insert_songs(
        &self,
        playlist_id: i64,
        start_position: i32,
        songs: &[NewSong],
    ) -> Result<Vec<entities::playlist_song::Model>> {
        let mut inserted = Vec::with_capacity(songs.len());
        for (offset, song) in songs.iter().enumerate() {
            let model = entities::playlist_song::ActiveModel {
                playlist_id: Set(playlist_id),
                position: Set(start_position + offset as i32),
                title: Set(song.title.clone()),
                artist: Set(song.artist.clone()),
                album: Set(song.album.clone()),
                duration_seconds: Set(song.duration_seconds),
                cover_image_url: Set(song.cover_image_url.clone()),
                spotify_id: Set(song.spotify_id.clone()),
                apple_music_id: Set(song.apple_music_id.clone()),
                amazon_music_id: Set(song.amazon_music_id.clone()),
                ..entities::playlist_song::ActiveModel::new()
            }
            .insert(&self.db.conn)
            .await
            .wrap_err("Failed to insert playlist song")?;
            inserted.push(model);
        }
        Ok(inserted)
    }
}

fn validate_songs(songs: &[NewSong]) -> Result<()> {
    for song in songs {
        if song.title.trim().is_empty() || song.artist.trim().is_empty() {
            return Err(
                ServiceError::invalid_input("Song title and artist are required").into(),
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notification::NotificationService;
    use crate::test_utils::{seed_user, test_db};

    fn sample_songs() -> Vec<NewSong> {
        vec![
            NewSong {
                title: "First Song".to_string(),
                artist: "Band".to_string(),
                album: None,
                duration_seconds: Some(180),
                cover_image_url: None,
                spotify_id: None,
                apple_music_id: None,
                amazon_music_id: None,
            },
            NewSong {
                title: "Second Song".to_string(),
                artist: "Band".to_string(),
                album: Some("Record".to_string()),
                duration_seconds: Some(240),
                cover_image_url: None,
                spotify_id: Some("sp-2".to_string()),
                apple_music_id: None,
                amazon_music_id: None,
            },
        ]
    }

    #[tokio::test]
    async fn create_preserves_song_order() {
        let db = test_db().await;
        let user = seed_user(&db, "creator").await;
        let service = PlaylistService::new(db.clone());

        let (playlist, songs) = service
            .create(
                user.id,
                CreatePlaylist {
                    name: "Road Trip".to_string(),
                    description: None,
                    cover_image_url: None,
                    songs: sample_songs(),
                    is_public: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(playlist.source_provider, ProviderKind::Custom);
        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0].position, 0);
        assert_eq!(songs[0].title, "First Song");
        assert_eq!(songs[1].position, 1);
    }

    #[tokio::test]
    async fn sharing_with_two_users_notifies_both_excluding_sharer() {
        let db = test_db().await;
        let creator = seed_user(&db, "creator").await;
        let friend_a = seed_user(&db, "friend_a").await;
        let friend_b = seed_user(&db, "friend_b").await;

        let service = PlaylistService::new(db.clone());
        let (playlist, _) = service
            .create(
                creator.id,
                CreatePlaylist {
                    name: "Mix".to_string(),
                    description: None,
                    cover_image_url: None,
                    songs: Vec::new(),
                    is_public: false,
                },
            )
            .await
            .unwrap();

        let shared = service
            .share(creator.id, playlist.id, &[friend_a.id, friend_b.id])
            .await
            .unwrap();
        assert_eq!(shared.len(), 2);

        let notifications = NotificationService::new(db.clone());
        assert_eq!(notifications.list_for_user(friend_a.id).await.unwrap().len(), 1);
        assert_eq!(notifications.list_for_user(friend_b.id).await.unwrap().len(), 1);
        assert!(notifications.list_for_user(creator.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sharing_twice_keeps_set_semantics() {
        let db = test_db().await;
        let creator = seed_user(&db, "creator").await;
        let friend = seed_user(&db, "friend").await;

        let service = PlaylistService::new(db.clone());
        let (playlist, _) = service
            .create(
                creator.id,
                CreatePlaylist {
                    name: "Mix".to_string(),
                    description: None,
                    cover_image_url: None,
                    songs: Vec::new(),
                    is_public: false,
                },
            )
            .await
            .unwrap();

        service.share(creator.id, playlist.id, &[friend.id]).await.unwrap();
        let second = service.share(creator.id, playlist.id, &[friend.id]).await.unwrap();
        assert!(second.is_empty());

        assert_eq!(service.shared_user_ids(playlist.id).await.unwrap(), vec![friend.id]);
    }

    #[tokio::test]
    async fn access_rules_cover_creator_shared_and_public() {
        let db = test_db().await;
        let creator = seed_user(&db, "creator").await;
        let friend = seed_user(&db, "friend").await;
        let outsider = seed_user(&db, "outsider").await;

        let service = PlaylistService::new(db.clone());
        let (playlist, _) = service
            .create(
                creator.id,
                CreatePlaylist {
                    name: "Private Mix".to_string(),
                    description: None,
                    cover_image_url: None,
                    songs: Vec::new(),
                    is_public: false,
                },
            )
            .await
            .unwrap();
        service.share(creator.id, playlist.id, &[friend.id]).await.unwrap();

        assert!(service.get_authorized(creator.id, playlist.id).await.is_ok());
        assert!(service.get_authorized(friend.id, playlist.id).await.is_ok());

        let error = service
            .get_authorized(outsider.id, playlist.id)
            .await
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ServiceError>(),
            Some(ServiceError::Forbidden(_))
        ));

        service
            .update(
                creator.id,
                playlist.id,
                UpdatePlaylist {
                    is_public: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(service.get_authorized(outsider.id, playlist.id).await.is_ok());
    }

    #[tokio::test]
    async fn update_notifies_shared_users_and_only_creator_may_edit() {
        let db = test_db().await;
        let creator = seed_user(&db, "creator").await;
        let friend = seed_user(&db, "friend").await;

        let service = PlaylistService::new(db.clone());
        let (playlist, _) = service
            .create(
                creator.id,
                CreatePlaylist {
                    name: "Mix".to_string(),
                    description: None,
                    cover_image_url: None,
                    songs: sample_songs(),
                    is_public: false,
                },
            )
            .await
            .unwrap();
        service.share(creator.id, playlist.id, &[friend.id]).await.unwrap();

        let error = service
            .update(friend.id, playlist.id, UpdatePlaylist::default())
            .await
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ServiceError>(),
            Some(ServiceError::Forbidden(_))
        ));

        service
            .update(
                creator.id,
                playlist.id,
                UpdatePlaylist {
                    name: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let notifications = NotificationService::new(db.clone())
            .list_for_user(friend.id)
            .await
            .unwrap();
        // One share notification plus one update notification
        assert_eq!(notifications.len(), 2);
    }
}
