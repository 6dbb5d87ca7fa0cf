//! Reconciliation job records: creation, forward-only status transitions,
//! per-song failure rows, and the in-process cancellation registry.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex as StdMutex};

use color_eyre::eyre::{Result, WrapErr, eyre};
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;

use crate::database::Database;
use crate::entities;
use crate::entities::job_song_failure::FailureReason;
use crate::entities::reconciliation_job::{JobOperation, JobStatus};
use crate::ports::provider::ProviderKind;

#[derive(Debug, Clone)]
pub struct NewJob {
    pub operation: JobOperation,
    pub user_id: i64,
    pub source_provider: Option<ProviderKind>,
    pub target_provider: Option<ProviderKind>,
    pub playlist_id: Option<i64>,
    pub provider_playlist_id: Option<String>,
}

/// What a finished (or structurally failed) job hands back to the caller.
#[derive(Debug, Serialize)]
pub struct JobOutcome {
    pub job: entities::reconciliation_job::Model,
    pub failures: Vec<entities::job_song_failure::Model>,
}

pub async fn create(db: &Database, new_job: NewJob) -> Result<entities::reconciliation_job::Model> {
    entities::reconciliation_job::ActiveModel {
        operation: Set(new_job.operation),
        user_id: Set(new_job.user_id),
        source_provider: Set(new_job.source_provider),
        target_provider: Set(new_job.target_provider),
        playlist_id: Set(new_job.playlist_id),
        provider_playlist_id: Set(new_job.provider_playlist_id),
        songs_total: Set(0),
        songs_processed: Set(0),
        ..entities::reconciliation_job::ActiveModel::new()
    }
    .insert(&db.conn)
    .await
    .wrap_err("Failed to create reconciliation job")
}

pub async fn start(
    db: &Database,
    job: entities::reconciliation_job::Model,
) -> Result<entities::reconciliation_job::Model> {
    transition(db, job, JobStatus::InProgress).await
}

pub async fn finish(
    db: &Database,
    job: entities::reconciliation_job::Model,
    status: JobStatus,
) -> Result<entities::reconciliation_job::Model> {
    transition(db, job, status).await
}

async fn transition(
    db: &Database,
    job: entities::reconciliation_job::Model,
    next: JobStatus,
) -> Result<entities::reconciliation_job::Model> {
    if !job.status.can_transition_to(next) {
        return Err(eyre!(
            "Invalid job transition: {:?} -> {:?} (job {})",
            job.status,
            next,
            job.id
        ));
    }
    let mut active: entities::reconciliation_job::ActiveModel = job.into();
    active.status = Set(next);
    active
        .update(&db.conn)
        .await
        .wrap_err("Failed to update job status")
}

pub async fn record_totals(
    db: &Database,
    job: entities::reconciliation_job::Model,
    songs_total: i32,
) -> Result<entities::reconciliation_job::Model> {
    let mut active: entities::reconciliation_job::ActiveModel = job.into();
    active.songs_total = Set(songs_total);
    active
        .update(&db.conn)
        .await
        .wrap_err("Failed to update job totals")
}

pub async fn record_progress(
    db: &Database,
    job: entities::reconciliation_job::Model,
    songs_processed: i32,
) -> Result<entities::reconciliation_job::Model> {
    debug_assert!(songs_processed >= job.songs_processed);
    let mut active: entities::reconciliation_job::ActiveModel = job.into();
    active.songs_processed = Set(songs_processed);
    active
        .update(&db.conn)
        .await
        .wrap_err("Failed to update job progress")
}

pub async fn set_playlist(
    db: &Database,
    job: entities::reconciliation_job::Model,
    playlist_id: i64,
) -> Result<entities::reconciliation_job::Model> {
    let mut active: entities::reconciliation_job::ActiveModel = job.into();
    active.playlist_id = Set(Some(playlist_id));
    active
        .update(&db.conn)
        .await
        .wrap_err("Failed to link job to playlist")
}

pub async fn set_provider_playlist(
    db: &Database,
    job: entities::reconciliation_job::Model,
    provider_playlist_id: &str,
) -> Result<entities::reconciliation_job::Model> {
    let mut active: entities::reconciliation_job::ActiveModel = job.into();
    active.provider_playlist_id = Set(Some(provider_playlist_id.to_string()));
    active
        .update(&db.conn)
        .await
        .wrap_err("Failed to record provider playlist id")
}

pub async fn record_failure(
    db: &Database,
    job_id: i64,
    position: Option<i32>,
    title: &str,
    artist: &str,
    reason: FailureReason,
    detail: Option<String>,
) -> Result<entities::job_song_failure::Model> {
    entities::job_song_failure::ActiveModel {
        job_id: Set(job_id),
        position: Set(position),
        title: Set(title.to_string()),
        artist: Set(artist.to_string()),
        reason: Set(reason),
        detail: Set(detail),
        ..entities::job_song_failure::ActiveModel::new()
    }
    .insert(&db.conn)
    .await
    .wrap_err("Failed to record song failure")
}

pub async fn get(db: &Database, job_id: i64) -> Result<Option<entities::reconciliation_job::Model>> {
    entities::reconciliation_job::Entity::find_by_id(job_id)
        .one(&db.conn)
        .await
        .wrap_err("Failed to fetch job")
}

pub async fn failures(db: &Database, job_id: i64) -> Result<Vec<entities::job_song_failure::Model>> {
    entities::job_song_failure::Entity::find()
        .filter(entities::job_song_failure::Column::JobId.eq(job_id))
        .order_by_asc(entities::job_song_failure::Column::Position)
        .all(&db.conn)
        .await
        .wrap_err("Failed to fetch job failures")
}

/// Tracks running jobs so a caller can request cancellation between song
/// batches. Process-local: jobs run within the invoking request.
pub struct JobRegistry {
    inner: StdMutex<HashMap<i64, Arc<AtomicBool>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            inner: StdMutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, job_id: i64) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        self.inner
            .lock()
            .expect("job registry poisoned")
            .insert(job_id, flag.clone());
        flag
    }

    /// Returns false when the job is not running (already finished or never
    /// started here).
    pub fn cancel(&self, job_id: i64) -> bool {
        match self.inner.lock().expect("job registry poisoned").get(&job_id) {
            Some(flag) => {
                flag.store(true, std::sync::atomic::Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn finish(&self, job_id: i64) {
        self.inner
            .lock()
            .expect("job registry poisoned")
            .remove(&job_id);
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::test_utils::{seed_user, test_db};

    #[tokio::test]
    async fn job_lifecycle_enforces_forward_transitions() {
        let db = test_db().await;
        let user = seed_user(&db, "alice").await;

        let job = create(
            &db,
            NewJob {
                operation: JobOperation::Import,
                user_id: user.id,
                source_provider: Some(ProviderKind::Spotify),
                target_provider: None,
                playlist_id: None,
                provider_playlist_id: Some("sp-playlist".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        // Pending cannot jump straight to a terminal state
        let error = finish(&db, job.clone(), JobStatus::Completed).await;
        assert!(error.is_err());

        let job = start(&db, job).await.unwrap();
        assert_eq!(job.status, JobStatus::InProgress);

        let job = finish(&db, job, JobStatus::Completed).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        // Terminal states stay terminal
        let error = start(&db, job).await;
        assert!(error.is_err());
    }

    #[tokio::test]
    async fn registry_cancellation_round_trip() {
        let registry = JobRegistry::new();
        assert!(!registry.cancel(7));

        let flag = registry.register(7);
        assert!(!flag.load(Ordering::Relaxed));
        assert!(registry.cancel(7));
        assert!(flag.load(Ordering::Relaxed));

        registry.finish(7);
        assert!(!registry.cancel(7));
    }
}
