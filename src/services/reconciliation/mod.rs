//! Cross-service playlist reconciliation: import, export, and the job
//! bookkeeping both share.

pub mod export;
pub mod import;
pub mod job;

use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::Result;
use tokio::sync::Mutex as TokioMutex;

use crate::database::Database;
use crate::ports::provider::{ProviderClient, ProviderError, ProviderKind};
use crate::providers::{ProviderRegistry, with_provider_retry};
use crate::services::connection::ConnectionService;
use crate::services::error::ServiceError;
use crate::services::locks::{PlaylistLocks, ProviderLocks};
use crate::services::notification::NotificationService;
use crate::services::playlist::PlaylistService;

use self::job::JobRegistry;

/// Songs resolved concurrently within one job. Kept small so one job cannot
/// exhaust a provider's rate budget on its own.
pub(crate) const SONG_CONCURRENCY: usize = 4;

/// Rate-limit pauses attempted before a call is recorded as failed.
const RATE_LIMIT_RETRIES: u32 = 3;

pub struct ReconciliationService {
    db: Arc<Database>,
    registry: Arc<ProviderRegistry>,
    provider_locks: Arc<ProviderLocks>,
    playlist_locks: Arc<PlaylistLocks>,
    jobs: Arc<JobRegistry>,
}

impl ReconciliationService {
    pub fn new(
        db: Arc<Database>,
        registry: Arc<ProviderRegistry>,
        provider_locks: Arc<ProviderLocks>,
        playlist_locks: Arc<PlaylistLocks>,
        jobs: Arc<JobRegistry>,
    ) -> Self {
        Self {
            db,
            registry,
            provider_locks,
            playlist_locks,
            jobs,
        }
    }

    pub(crate) fn connections(&self) -> ConnectionService {
        ConnectionService::new(
            self.db.clone(),
            self.registry.clone(),
            self.provider_locks.clone(),
        )
    }

    pub(crate) fn playlists(&self) -> PlaylistService {
        PlaylistService::new(self.db.clone())
    }

    pub(crate) fn notifications(&self) -> NotificationService {
        NotificationService::new(self.db.clone())
    }

    pub(crate) fn adapter(&self, provider: ProviderKind) -> Result<Arc<dyn ProviderClient>> {
        self.registry.get(provider).ok_or_else(|| {
            ServiceError::invalid_input(format!("no adapter configured for {provider}")).into()
        })
    }
}

/// Pauses every in-flight provider call of one job while a rate-limit
/// backoff sleeps. Callers pass through `checkpoint` before each call; the
/// rate-limited task holds the gate for the duration of the pause.
pub(crate) struct BackoffGate {
    inner: TokioMutex<()>,
}

impl BackoffGate {
    pub(crate) fn new() -> Self {
        Self {
            inner: TokioMutex::new(()),
        }
    }

    pub(crate) async fn checkpoint(&self) {
        drop(self.inner.lock().await);
    }

    pub(crate) async fn pause(&self, delay: Duration) {
        let _held = self.inner.lock().await;
        tokio::time::sleep(delay).await;
    }
}

/// Run a provider call with the full retry discipline: transient
/// unavailability retried with bounded exponential backoff, rate limiting
/// pausing the whole job through the gate before the call is retried.
pub(crate) async fn with_rate_limit_backoff<T, Fut, F>(
    gate: &BackoffGate,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;
    loop {
        gate.checkpoint().await;
        match with_provider_retry(&mut operation).await {
            Err(ProviderError::RateLimited { retry_after }) if attempt < RATE_LIMIT_RETRIES => {
                attempt += 1;
                let delay = retry_after
                    .unwrap_or_else(|| Duration::from_millis(500 * u64::from(2u32.pow(attempt))));
                log::warn!("Rate limited, pausing job work for {delay:?}");
                gate.pause(delay).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn rate_limit_backoff_retries_then_succeeds() {
        tokio::time::pause();
        let gate = BackoffGate::new();
        let calls = AtomicU32::new(0);

        let result = with_rate_limit_backoff(&gate, || async {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Err(ProviderError::RateLimited {
                    retry_after: Some(Duration::from_secs(1)),
                })
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rate_limit_backoff_gives_up_after_bounded_attempts() {
        tokio::time::pause();
        let gate = BackoffGate::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), ProviderError> = with_rate_limit_backoff(&gate, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::RateLimited {
                retry_after: Some(Duration::from_millis(10)),
            })
        })
        .await;

        assert!(matches!(result, Err(ProviderError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), RATE_LIMIT_RETRIES + 1);
    }
}
