use std::sync::Arc;

use crate::config::Config;
use crate::database::Database;
use crate::providers::ProviderRegistry;
use crate::services::connection::ConnectionService;
use crate::services::locks::{PlaylistLocks, ProviderLocks};
use crate::services::music::MusicService;
use crate::services::notification::NotificationService;
use crate::services::playlist::PlaylistService;
use crate::services::reconciliation::ReconciliationService;
use crate::services::reconciliation::job::JobRegistry;

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub providers: Arc<ProviderRegistry>,
    pub provider_locks: Arc<ProviderLocks>,
    pub playlist_locks: Arc<PlaylistLocks>,
    pub jobs: Arc<JobRegistry>,
}

impl AppState {
    pub fn new(database: Database, config: Config, providers: ProviderRegistry) -> Self {
        Self {
            db: Arc::new(database),
            config,
            providers: Arc::new(providers),
            provider_locks: Arc::new(ProviderLocks::new()),
            playlist_locks: Arc::new(PlaylistLocks::new()),
            jobs: Arc::new(JobRegistry::new()),
        }
    }

    pub fn connections(&self) -> ConnectionService {
        ConnectionService::new(
            self.db.clone(),
            self.providers.clone(),
            self.provider_locks.clone(),
        )
    }

    pub fn playlists(&self) -> PlaylistService {
        PlaylistService::new(self.db.clone())
    }

    pub fn notifications(&self) -> NotificationService {
        NotificationService::new(self.db.clone())
    }

    pub fn music(&self) -> MusicService {
        MusicService::new(
            self.db.clone(),
            self.providers.clone(),
            self.provider_locks.clone(),
        )
    }

    pub fn reconciliation(&self) -> ReconciliationService {
        ReconciliationService::new(
            self.db.clone(),
            self.providers.clone(),
            self.provider_locks.clone(),
            self.playlist_locks.clone(),
            self.jobs.clone(),
        )
    }
}
