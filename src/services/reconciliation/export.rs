//! Export: local playlist -> provider playlist.
//!
//! Song-level idempotence: per-song "added to target" state is persisted,
//! so a re-run resolves nothing it already knows and re-adds nothing the
//! target already confirmed. Unmatched songs never abort the export.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use color_eyre::eyre::{Result, WrapErr};
use futures::stream::{self, StreamExt};
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, Set,
};
use tracing::instrument;

use crate::entities;
use crate::entities::job_song_failure::FailureReason;
use crate::entities::notification::NotificationKind;
use crate::entities::reconciliation_job::{JobOperation, JobStatus};
use crate::matching::resolver::{self, SongCandidate};
use crate::ports::provider::{
    CreatePlaylistRequest, ProviderClient, ProviderError, ProviderKind,
};
use crate::services::error::ServiceError;
use crate::services::notification::NotificationEvent;
use crate::services::reconciliation::job::{self, JobOutcome, NewJob};
use crate::services::reconciliation::{
    BackoffGate, ReconciliationService, SONG_CONCURRENCY, with_rate_limit_backoff,
};

enum SongOutcome {
    /// A prior run already confirmed this song on the target playlist.
    AlreadyPresent,
    Matched { provider_id: String },
    NoMatch,
    Cancelled,
    ResolveFailed(ProviderError),
}

/// Resolve a single song to a provider match. Extracted to a free function
/// with a unified lifetime so the closure passed to `stream::map` is properly
/// higher-ranked over the borrowed song (works around a HRTB inference limit).
async fn resolve_song<'a>(
    song: entities::playlist_song::Model,
    adapter: Arc<dyn ProviderClient>,
    token: String,
    cancel: Arc<AtomicBool>,
    gate: &'a BackoffGate,
    exported: &'a HashSet<i64>,
) -> SongOutcome {
    if exported.contains(&song.id) {
        return SongOutcome::AlreadyPresent;
    }
    if cancel.load(Ordering::Relaxed) {
        return SongOutcome::Cancelled;
    }
    let candidate = SongCandidate::from(&song);
    match with_rate_limit_backoff(gate, || {
        resolver::resolve(adapter.as_ref(), &token, &candidate)
    })
    .await
    {
        Ok(result) => match result.provider_id {
            Some(provider_id) => SongOutcome::Matched { provider_id },
            None => SongOutcome::NoMatch,
        },
        Err(error) => SongOutcome::ResolveFailed(error),
    }
}

impl ReconciliationService {
    /// Export a local playlist to the target provider. The caller must own
    /// the playlist or have it shared with them.
    #[instrument(skip(self))]
    pub async fn export(
        &self,
        user_id: i64,
        playlist_id: i64,
        target: ProviderKind,
    ) -> Result<JobOutcome> {
        let adapter = self.adapter(target)?;

        let playlists = self.playlists();
        let playlist = playlists.find(playlist_id).await?;
        if playlist.creator_id != user_id && !playlists.is_shared_with(playlist_id, user_id).await? {
            return Err(ServiceError::forbidden("You do not have access to this playlist").into());
        }

        let job = job::create(
            &self.db,
            NewJob {
                operation: JobOperation::Export,
                user_id,
                source_provider: None,
                target_provider: Some(target),
                playlist_id: Some(playlist_id),
                provider_playlist_id: None,
            },
        )
        .await?;
        let job = job::start(&self.db, job).await?;
        let job_id = job.id;
        let cancel = self.jobs.register(job_id);

        let result = self
            .run_export(job, adapter, user_id, playlist, target, cancel)
            .await;
        self.jobs.finish(job_id);
        result
    }

    async fn run_export(
        &self,
        job: entities::reconciliation_job::Model,
        adapter: Arc<dyn ProviderClient>,
        user_id: i64,
        playlist: entities::playlist::Model,
        target: ProviderKind,
        cancel: Arc<AtomicBool>,
    ) -> Result<JobOutcome> {
        let _provider_guard = self.provider_locks.acquire((user_id, target)).await;
        let _playlist_guard = self.playlist_locks.acquire(playlist.id).await;

        let token = match self.connections().valid_token_locked(user_id, target).await {
            Ok(token) => token,
            Err(error) => {
                job::finish(&self.db, job, JobStatus::Failed).await?;
                return Err(error);
            }
        };

        let songs = self.playlists().songs(playlist.id).await?;
        let mut job = job::record_totals(&self.db, job, songs.len() as i32).await?;
        let gate = BackoffGate::new();

        let target_playlist_id = match self
            .target_playlist_id(&gate, adapter.as_ref(), &token, &playlist)
            .await
        {
            Ok(id) => id,
            Err(error) => {
                job::finish(&self.db, job, JobStatus::Failed).await?;
                return Err(error);
            }
        };
        job = job::set_provider_playlist(&self.db, job, &target_playlist_id).await?;

        tracing::info!(
            "Exporting {} songs to {target} playlist {target_playlist_id}",
            songs.len()
        );

        let exported = self.exported_song_ids(&songs, target, &target_playlist_id).await?;

        // Resolve with bounded concurrency; order is preserved so the
        // provider playlist ends up in play order.
        let outcomes: Vec<SongOutcome> = stream::iter(songs.iter().cloned().collect::<Vec<_>>())
            .map(|song| {
                resolve_song(song, adapter.clone(), token.clone(), cancel.clone(), &gate, &exported)
            })
            .buffered(SONG_CONCURRENCY)
            .collect()
            .await;

        let mut processed = 0i32;
        let mut confirmed = 0usize;
        let mut failures = 0usize;
        let mut to_add: Vec<(&entities::playlist_song::Model, String)> = Vec::new();

        for (song, outcome) in songs.iter().zip(outcomes) {
            processed += 1;
            match outcome {
                SongOutcome::AlreadyPresent => confirmed += 1,
                SongOutcome::Matched { provider_id } => {
                    self.confirm_provider_id(song, target, &provider_id).await?;
                    to_add.push((song, provider_id));
                }
                SongOutcome::NoMatch => {
                    job::record_failure(
                        &self.db,
                        job.id,
                        Some(song.position),
                        &song.title,
                        &song.artist,
                        FailureReason::NoMatchFound,
                        None,
                    )
                    .await?;
                    failures += 1;
                }
                SongOutcome::Cancelled => {
                    job::record_failure(
                        &self.db,
                        job.id,
                        Some(song.position),
                        &song.title,
                        &song.artist,
                        FailureReason::Cancelled,
                        None,
                    )
                    .await?;
                    failures += 1;
                }
                SongOutcome::ResolveFailed(error) => {
                    let reason = match error {
                        ProviderError::RateLimited { .. } => FailureReason::RateLimited,
                        _ => FailureReason::ProviderUnavailable,
                    };
                    job::record_failure(
                        &self.db,
                        job.id,
                        Some(song.position),
                        &song.title,
                        &song.artist,
                        reason,
                        Some(error.to_string()),
                    )
                    .await?;
                    failures += 1;
                }
            }
            job = job::record_progress(&self.db, job, processed).await?;
        }

        if !to_add.is_empty() {
            let track_ids: Vec<String> = to_add.iter().map(|(_, id)| id.clone()).collect();
            match with_rate_limit_backoff(&gate, || {
                adapter.add_tracks(&target_playlist_id, &track_ids, &token)
            })
            .await
            {
                Ok(()) => {
                    for (song, _) in &to_add {
                        self.record_export_state(song.id, target, &target_playlist_id)
                            .await?;
                        confirmed += 1;
                    }
                }
                Err(ProviderError::PartialWrite { added, source }) => {
                    // Batches are sequential, so exactly the first `added`
                    // songs are on the target.
                    for (index, (song, _)) in to_add.iter().enumerate() {
                        if index < added {
                            self.record_export_state(song.id, target, &target_playlist_id)
                                .await?;
                            confirmed += 1;
                        } else {
                            job::record_failure(
                                &self.db,
                                job.id,
                                Some(song.position),
                                &song.title,
                                &song.artist,
                                FailureReason::PartialWrite,
                                Some(source.to_string()),
                            )
                            .await?;
                            failures += 1;
                        }
                    }
                }
                Err(error) => {
                    let reason = match error {
                        ProviderError::RateLimited { .. } => FailureReason::RateLimited,
                        _ => FailureReason::ProviderUnavailable,
                    };
                    for (song, _) in &to_add {
                        job::record_failure(
                            &self.db,
                            job.id,
                            Some(song.position),
                            &song.title,
                            &song.artist,
                            reason,
                            Some(error.to_string()),
                        )
                        .await?;
                        failures += 1;
                    }
                }
            }
        }

        let status = if failures == 0 {
            JobStatus::Completed
        } else {
            // Export always completes with whatever matched
            JobStatus::PartiallyFailed
        };
        let job = job::finish(&self.db, job, status).await?;

        tracing::info!(
            "Export finished: job={} status={:?} confirmed={confirmed} failed={failures}",
            job.id,
            job.status
        );

        let mut affected = self.playlists().shared_user_ids(playlist.id).await?;
        affected.push(playlist.creator_id);
        self.notifications()
            .notify(NotificationEvent {
                kind: NotificationKind::PlaylistExported,
                actor_user_id: user_id,
                affected_user_ids: affected,
                payload: serde_json::json!({
                    "playlistId": playlist.id,
                    "playlistName": playlist.name,
                    "provider": target.api_name(),
                }),
            })
            .await?;

        let failures = job::failures(&self.db, job.id).await?;
        Ok(JobOutcome { job, failures })
    }

    /// Reuse the provider playlist from a prior export, or create one.
    async fn target_playlist_id(
        &self,
        gate: &BackoffGate,
        adapter: &dyn ProviderClient,
        token: &str,
        playlist: &entities::playlist::Model,
    ) -> Result<String> {
        let existing = entities::playlist_export_target::Entity::find()
            .filter(
                Condition::all()
                    .add(entities::playlist_export_target::Column::PlaylistId.eq(playlist.id))
                    .add(entities::playlist_export_target::Column::Provider.eq(adapter.kind())),
            )
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch export target")?;

        if let Some(target) = existing {
            return Ok(target.provider_playlist_id);
        }

        let request = CreatePlaylistRequest {
            name: playlist.name.clone(),
            description: playlist.description.clone(),
            is_public: playlist.is_public,
        };
        let created = with_rate_limit_backoff(gate, || adapter.create_playlist(token, &request))
            .await
            .map_err(ServiceError::Provider)?;

        entities::playlist_export_target::ActiveModel {
            playlist_id: Set(playlist.id),
            provider: Set(adapter.kind()),
            provider_playlist_id: Set(created.clone()),
            ..entities::playlist_export_target::ActiveModel::new()
        }
        .insert(&self.db.conn)
        .await
        .wrap_err("Failed to record export target")?;

        Ok(created)
    }

    async fn exported_song_ids(
        &self,
        songs: &[entities::playlist_song::Model],
        target: ProviderKind,
        target_playlist_id: &str,
    ) -> Result<HashSet<i64>> {
        let ids: Vec<i64> = songs.iter().map(|song| song.id).collect();
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let states = entities::song_export_state::Entity::find()
            .filter(entities::song_export_state::Column::PlaylistSongId.is_in(ids))
            .filter(entities::song_export_state::Column::Provider.eq(target))
            .filter(entities::song_export_state::Column::ProviderPlaylistId.eq(target_playlist_id))
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch export states")?;
        Ok(states.into_iter().map(|state| state.playlist_song_id).collect())
    }

    /// Persist a confirmed match. Existing ids are never overwritten: they
    /// were confirmed at equal or higher confidence.
    async fn confirm_provider_id(
        &self,
        song: &entities::playlist_song::Model,
        target: ProviderKind,
        provider_id: &str,
    ) -> Result<()> {
        if song.provider_id(target).is_some() {
            return Ok(());
        }
        let mut active: entities::playlist_song::ActiveModel = song.clone().into();
        match target {
            ProviderKind::Spotify => active.spotify_id = Set(Some(provider_id.to_string())),
            ProviderKind::AppleMusic => active.apple_music_id = Set(Some(provider_id.to_string())),
            ProviderKind::AmazonMusic => {
                active.amazon_music_id = Set(Some(provider_id.to_string()))
            }
            ProviderKind::Custom => return Ok(()),
        }
        active
            .update(&self.db.conn)
            .await
            .wrap_err("Failed to persist confirmed provider id")?;
        Ok(())
    }

    async fn record_export_state(
        &self,
        playlist_song_id: i64,
        target: ProviderKind,
        target_playlist_id: &str,
    ) -> Result<()> {
        entities::song_export_state::ActiveModel {
            playlist_song_id: Set(playlist_song_id),
            provider: Set(target),
            provider_playlist_id: Set(target_playlist_id.to_string()),
            ..entities::song_export_state::ActiveModel::new()
        }
        .insert(&self.db.conn)
        .await
        .wrap_err("Failed to record export state")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};

    use super::*;
    use crate::ports::provider::{MockProviderClient, ProviderTrack};
    use crate::providers::ProviderRegistry;
    use crate::services::locks::{PlaylistLocks, ProviderLocks};
    use crate::services::notification::NotificationService;
    use crate::services::reconciliation::job::JobRegistry;
    use crate::test_utils::{seed_connection, seed_playlist, seed_song, seed_user, test_db};

    fn service_with(
        adapter: MockProviderClient,
        db: Arc<crate::database::Database>,
    ) -> ReconciliationService {
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

    fn found(id: &str, title: &str, artist: &str, duration: i32) -> ProviderTrack {
        ProviderTrack {
            id: id.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            album: None,
            duration_seconds: Some(duration),
            cover_image_url: None,
        }
    }

    #[tokio::test]
    async fn export_pushes_matches_and_records_no_match() {
        let db = test_db().await;
        let creator = seed_user(&db, "creator").await;
        let friend = seed_user(&db, "friend").await;
        seed_connection(
            &db,
            creator.id,
            ProviderKind::Spotify,
            Some(Utc::now() + ChronoDuration::hours(1)),
        )
        .await;

        let playlist = seed_playlist(&db, creator.id, "Mix", ProviderKind::Custom).await;
        // Known id: resolves without a search call
        seed_song(&db, playlist.id, 0, "First Song", "Band", Some(180), Some("sp-known")).await;
        seed_song(&db, playlist.id, 1, "Second Song", "Band", Some(200), None).await;
        seed_song(&db, playlist.id, 2, "Obscure B-Side", "Band", Some(90), None).await;

        let mut adapter = MockProviderClient::new();
        adapter.expect_kind().return_const(ProviderKind::Spotify);
        adapter
            .expect_create_playlist()
            .times(1)
            .returning(|_, _| Ok("remote-playlist".to_string()));
        adapter.expect_search().times(2).returning(|query, _, _| {
            if query.contains("second song") {
                Ok(vec![found("sp-found", "Second Song", "Band", 201)])
            } else {
                // Nothing close to the b-side
                Ok(vec![found("sp-junk", "Different Tune", "Other People", 400)])
            }
        });
        adapter
            .expect_add_tracks()
            .times(1)
            .withf(|_, ids, _| ids == ["sp-known".to_string(), "sp-found".to_string()])
            .returning(|_, _, _| Ok(()));

        let service = service_with(adapter, db.clone());
        service
            .playlists()
            .share(creator.id, playlist.id, &[friend.id])
            .await
            .unwrap();

        let outcome = service
            .export(creator.id, playlist.id, ProviderKind::Spotify)
            .await
            .unwrap();

        assert_eq!(outcome.job.status, JobStatus::PartiallyFailed);
        assert_eq!(outcome.job.songs_total, 3);
        assert_eq!(outcome.job.songs_processed, 3);
        assert_eq!(outcome.job.provider_playlist_id.as_deref(), Some("remote-playlist"));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].reason, FailureReason::NoMatchFound);
        assert_eq!(outcome.failures[0].title, "Obscure B-Side");

        // The confirmed match was persisted for future runs
        let songs = service.playlists().songs(playlist.id).await.unwrap();
        assert_eq!(songs[1].spotify_id.as_deref(), Some("sp-found"));

        // Share notification plus export notification for the friend,
        // nothing for the acting creator
        let notifications = NotificationService::new(db.clone());
        assert_eq!(notifications.list_for_user(friend.id).await.unwrap().len(), 2);
        assert!(notifications.list_for_user(creator.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_export_issues_no_further_provider_calls() {
        let db = test_db().await;
        let creator = seed_user(&db, "creator").await;
        seed_connection(
            &db,
            creator.id,
            ProviderKind::Spotify,
            Some(Utc::now() + ChronoDuration::hours(1)),
        )
        .await;

        let playlist = seed_playlist(&db, creator.id, "Mix", ProviderKind::Custom).await;
        seed_song(&db, playlist.id, 0, "First Song", "Band", Some(180), Some("sp-1")).await;
        seed_song(&db, playlist.id, 1, "Second Song", "Band", Some(200), Some("sp-2")).await;

        let mut adapter = MockProviderClient::new();
        adapter.expect_kind().return_const(ProviderKind::Spotify);
        // Exactly one playlist creation and one batch add across BOTH runs
        adapter
            .expect_create_playlist()
            .times(1)
            .returning(|_, _| Ok("remote-playlist".to_string()));
        adapter.expect_search().times(0);
        adapter
            .expect_add_tracks()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let service = service_with(adapter, db.clone());

        let first = service
            .export(creator.id, playlist.id, ProviderKind::Spotify)
            .await
            .unwrap();
        assert_eq!(first.job.status, JobStatus::Completed);
        assert_eq!(first.job.songs_processed, 2);

        let second = service
            .export(creator.id, playlist.id, ProviderKind::Spotify)
            .await
            .unwrap();
        assert_eq!(second.job.status, JobStatus::Completed);
        assert_eq!(second.job.songs_processed, 2);
        assert!(second.failures.is_empty());
    }

    #[tokio::test]
    async fn partial_write_records_the_unwritten_tail() {
        let db = test_db().await;
        let creator = seed_user(&db, "creator").await;
        seed_connection(
            &db,
            creator.id,
            ProviderKind::Spotify,
            Some(Utc::now() + ChronoDuration::hours(1)),
        )
        .await;

        let playlist = seed_playlist(&db, creator.id, "Mix", ProviderKind::Custom).await;
        let first_song =
            seed_song(&db, playlist.id, 0, "First Song", "Band", Some(180), Some("sp-1")).await;
        let second_song =
            seed_song(&db, playlist.id, 1, "Second Song", "Band", Some(200), Some("sp-2")).await;

        let mut adapter = MockProviderClient::new();
        adapter.expect_kind().return_const(ProviderKind::Spotify);
        adapter
            .expect_create_playlist()
            .times(1)
            .returning(|_, _| Ok("remote-playlist".to_string()));
        adapter.expect_add_tracks().times(1).returning(|_, _, _| {
            Err(ProviderError::PartialWrite {
                added: 1,
                source: Box::new(ProviderError::Unavailable("boom".to_string())),
            })
        });

        let service = service_with(adapter, db.clone());
        let outcome = service
            .export(creator.id, playlist.id, ProviderKind::Spotify)
            .await
            .unwrap();

        assert_eq!(outcome.job.status, JobStatus::PartiallyFailed);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].reason, FailureReason::PartialWrite);
        assert_eq!(outcome.failures[0].title, "Second Song");

        // Only the written song carries export state
        let states = entities::song_export_state::Entity::find()
            .all(&db.conn)
            .await
            .unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].playlist_song_id, first_song.id);
        assert_ne!(states[0].playlist_song_id, second_song.id);
    }

    #[tokio::test]
    async fn outsider_cannot_export() {
        let db = test_db().await;
        let creator = seed_user(&db, "creator").await;
        let outsider = seed_user(&db, "outsider").await;
        let playlist = seed_playlist(&db, creator.id, "Mix", ProviderKind::Custom).await;

        let mut adapter = MockProviderClient::new();
        adapter.expect_kind().return_const(ProviderKind::Spotify);
        let service = service_with(adapter, db.clone());

        let error = service
            .export(outsider.id, playlist.id, ProviderKind::Spotify)
            .await
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ServiceError>(),
            Some(ServiceError::Forbidden(_))
        ));
    }
}
