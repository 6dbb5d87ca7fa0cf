//! Import: provider playlist -> local playlist.
//!
//! Provider-native ids carry over directly (confidence 1.0 by
//! construction); no resolution is needed. A song that fails validation is
//! recorded and processing continues.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use color_eyre::eyre::{Result, WrapErr};
use sea_orm::{ActiveModelBehavior, ActiveModelTrait, Set};
use tracing::instrument;

use crate::entities;
use crate::entities::job_song_failure::FailureReason;
use crate::entities::reconciliation_job::{JobOperation, JobStatus};
use crate::ports::provider::{ProviderClient, ProviderKind, ProviderTrack};
use crate::services::error::ServiceError;
use crate::services::reconciliation::job::{self, JobOutcome, NewJob};
use crate::services::reconciliation::{BackoffGate, ReconciliationService, with_rate_limit_backoff};

impl ReconciliationService {
    /// Import a provider playlist into a new local playlist owned by
    /// `user_id`. Runs to a terminal job status within this call.
    #[instrument(skip(self))]
    pub async fn import(
        &self,
        user_id: i64,
        source: ProviderKind,
        provider_playlist_id: &str,
    ) -> Result<JobOutcome> {
        let adapter = self.adapter(source)?;

        let job = job::create(
            &self.db,
            NewJob {
                operation: JobOperation::Import,
                user_id,
                source_provider: Some(source),
                target_provider: None,
                playlist_id: None,
                provider_playlist_id: Some(provider_playlist_id.to_string()),
            },
        )
        .await?;
        let job = job::start(&self.db, job).await?;
        let job_id = job.id;
        let cancel = self.jobs.register(job_id);

        let result = self
            .run_import(job, adapter, user_id, source, provider_playlist_id, cancel)
            .await;
        self.jobs.finish(job_id);
        result
    }

    async fn run_import(
        &self,
        job: entities::reconciliation_job::Model,
        adapter: Arc<dyn ProviderClient>,
        user_id: i64,
        source: ProviderKind,
        provider_playlist_id: &str,
        cancel: Arc<AtomicBool>,
    ) -> Result<JobOutcome> {
        // Token refresh and the fetch sequence share the (user, provider)
        // budget, so the whole run holds the pair lock.
        let _provider_guard = self.provider_locks.acquire((user_id, source)).await;

        let token = match self.connections().valid_token_locked(user_id, source).await {
            Ok(token) => token,
            Err(error) => {
                job::finish(&self.db, job, JobStatus::Failed).await?;
                return Err(error);
            }
        };

        let gate = BackoffGate::new();
        let remote = match with_rate_limit_backoff(&gate, || {
            adapter.fetch_playlist(provider_playlist_id, &token)
        })
        .await
        {
            Ok(remote) => remote,
            Err(error) => {
                job::finish(&self.db, job, JobStatus::Failed).await?;
                return Err(ServiceError::Provider(error).into());
            }
        };

        tracing::info!(
            "Importing {} songs from {source} playlist {provider_playlist_id}",
            remote.tracks.len()
        );

        let mut job = job::record_totals(&self.db, job, remote.tracks.len() as i32).await?;

        let playlist = entities::playlist::ActiveModel {
            name: Set(remote.name),
            description: Set(remote.description),
            cover_image_url: Set(remote.cover_image_url),
            creator_id: Set(user_id),
            is_public: Set(false),
            source_provider: Set(source),
            source_playlist_id: Set(Some(provider_playlist_id.to_string())),
            ..entities::playlist::ActiveModel::new()
        }
        .insert(&self.db.conn)
        .await
        .wrap_err("Failed to create imported playlist")?;
        job = job::set_playlist(&self.db, job, playlist.id).await?;

        let mut processed = 0i32;
        let mut successes = 0usize;
        let mut failures = 0usize;
        let mut position = 0i32;

        for (index, track) in remote.tracks.into_iter().enumerate() {
            processed += 1;

            if cancel.load(Ordering::Relaxed) {
                job::record_failure(
                    &self.db,
                    job.id,
                    Some(index as i32),
                    &track.title,
                    &track.artist,
                    FailureReason::Cancelled,
                    None,
                )
                .await?;
                failures += 1;
                job = job::record_progress(&self.db, job, processed).await?;
                continue;
            }

            if track.title.trim().is_empty() || track.artist.trim().is_empty() {
                job::record_failure(
                    &self.db,
                    job.id,
                    Some(index as i32),
                    &track.title,
                    &track.artist,
                    FailureReason::InvalidTrack,
                    Some("missing title or artist".to_string()),
                )
                .await?;
                failures += 1;
            } else {
                insert_imported_song(self, playlist.id, position, source, &track).await?;
                successes += 1;
                position += 1;
            }

            job = job::record_progress(&self.db, job, processed).await?;
        }

        let status = if failures == 0 {
            JobStatus::Completed
        } else if successes > 0 {
            JobStatus::PartiallyFailed
        } else {
            JobStatus::Failed
        };
        let job = job::finish(&self.db, job, status).await?;

        tracing::info!(
            "Import finished: job={} status={:?} ok={successes} failed={failures}",
            job.id,
            job.status
        );

        let failures = job::failures(&self.db, job.id).await?;
        Ok(JobOutcome { job, failures })
    }
}

async fn insert_imported_song(
    service: &ReconciliationService,
    playlist_id: i64,
    position: i32,
    source: ProviderKind,
    track: &ProviderTrack,
) -> Result<entities::playlist_song::Model> {
    let mut song = entities::playlist_song::ActiveModel {
        playlist_id: Set(playlist_id),
        position: Set(position),
        title: Set(track.title.clone()),
        artist: Set(track.artist.clone()),
        album: Set(track.album.clone()),
        duration_seconds: Set(track.duration_seconds),
        cover_image_url: Set(track.cover_image_url.clone()),
        ..entities::playlist_song::ActiveModel::new()
    };
    match source {
        ProviderKind::Spotify => song.spotify_id = Set(Some(track.id.clone())),
        ProviderKind::AppleMusic => song.apple_music_id = Set(Some(track.id.clone())),
        ProviderKind::AmazonMusic => song.amazon_music_id = Set(Some(track.id.clone())),
        // The registry never hands out an adapter for Custom
        ProviderKind::Custom => {}
    }
    song.insert(&service.db.conn)
        .await
        .wrap_err("Failed to insert imported song")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration as ChronoDuration, Utc};
    use sea_orm::EntityTrait;

    use super::*;
    use crate::ports::provider::{MockProviderClient, ProviderPlaylist};
    use crate::providers::ProviderRegistry;
    use crate::services::locks::{PlaylistLocks, ProviderLocks};
    use crate::services::reconciliation::job::JobRegistry;
    use crate::test_utils::{seed_connection, seed_user, test_db};

    fn track(id: &str, title: &str, artist: &str) -> ProviderTrack {
        ProviderTrack {
            id: id.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            album: Some("Example Album".to_string()),
            duration_seconds: Some(180),
            cover_image_url: None,
        }
    }

    fn service_with(adapter: MockProviderClient, db: Arc<crate::database::Database>) -> ReconciliationService {
        let mut registry = ProviderRegistry::empty();
        registry.register(Arc::new(adapter));
        ReconciliationService::new(
            db,
            Arc::new(registry),
            Arc::new(ProviderLocks::new()),
            Arc::new(PlaylistLocks::new()),
            Arc::new(JobRegistry::new()),
        )
    }

    fn fetching_adapter(tracks: Vec<ProviderTrack>) -> MockProviderClient {
        let mut adapter = MockProviderClient::new();
        adapter.expect_kind().return_const(ProviderKind::Spotify);
        adapter.expect_fetch_playlist().times(1).returning(move |id, _| {
            Ok(ProviderPlaylist {
                id: id.to_string(),
                name: "Imported from Spotify".to_string(),
                description: None,
                cover_image_url: None,
                tracks: tracks.clone(),
            })
        });
        adapter
    }

    #[tokio::test]
    async fn clean_import_completes_and_preserves_order() {
        let db = test_db().await;
        let user = seed_user(&db, "alice").await;
        seed_connection(
            &db,
            user.id,
            ProviderKind::Spotify,
            Some(Utc::now() + ChronoDuration::hours(1)),
        )
        .await;

        let service = service_with(
            fetching_adapter(vec![
                track("sp-1", "First Song", "Band"),
                track("sp-2", "Second Song", "Band"),
            ]),
            db.clone(),
        );

        let outcome = service
            .import(user.id, ProviderKind::Spotify, "remote-1")
            .await
            .unwrap();

        assert_eq!(outcome.job.status, JobStatus::Completed);
        assert_eq!(outcome.job.songs_total, 2);
        assert_eq!(outcome.job.songs_processed, 2);
        assert!(outcome.failures.is_empty());

        let playlist = entities::playlist::Entity::find_by_id(outcome.job.playlist_id.unwrap())
            .one(&db.conn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(playlist.source_provider, ProviderKind::Spotify);
        assert_eq!(playlist.source_playlist_id.as_deref(), Some("remote-1"));
        assert_eq!(playlist.creator_id, user.id);

        let songs = service.playlists().songs(playlist.id).await.unwrap();
        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0].title, "First Song");
        assert_eq!(songs[0].spotify_id.as_deref(), Some("sp-1"));
        assert_eq!(songs[1].position, 1);
    }

    #[tokio::test]
    async fn bad_song_is_recorded_and_the_rest_survive() {
        let db = test_db().await;
        let user = seed_user(&db, "alice").await;
        seed_connection(
            &db,
            user.id,
            ProviderKind::Spotify,
            Some(Utc::now() + ChronoDuration::hours(1)),
        )
        .await;

        let service = service_with(
            fetching_adapter(vec![
                track("sp-1", "Good Song", "Band"),
                track("sp-2", "", "Band"),
            ]),
            db.clone(),
        );

        let outcome = service
            .import(user.id, ProviderKind::Spotify, "remote-1")
            .await
            .unwrap();

        assert_eq!(outcome.job.status, JobStatus::PartiallyFailed);
        assert_eq!(outcome.job.songs_processed, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].reason, FailureReason::InvalidTrack);

        let songs = service
            .playlists()
            .songs(outcome.job.playlist_id.unwrap())
            .await
            .unwrap();
        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].title, "Good Song");
    }

    #[tokio::test]
    async fn disconnected_user_fails_structurally() {
        let db = test_db().await;
        let user = seed_user(&db, "alice").await;

        let mut adapter = MockProviderClient::new();
        adapter.expect_kind().return_const(ProviderKind::Spotify);
        adapter.expect_fetch_playlist().times(0);
        let service = service_with(adapter, db.clone());

        let error = service
            .import(user.id, ProviderKind::Spotify, "remote-1")
            .await
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ServiceError>(),
            Some(ServiceError::ServiceNotConnected { .. })
        ));

        // The job record still documents the structural failure
        let jobs = entities::reconciliation_job::Entity::find()
            .all(&db.conn)
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert_eq!(jobs[0].songs_processed, 0);
    }
}
