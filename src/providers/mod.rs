pub mod amazon_music;
pub mod apple_music;
pub mod spotify;

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::config::Config;
use crate::ports::provider::{ProviderClient, ProviderError, ProviderKind};

pub(crate) type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Outbound requests allowed per second, per adapter.
const REQUESTS_PER_SECOND: u32 = 10;

pub(crate) fn outbound_limiter() -> DirectRateLimiter {
    let per_second = NonZeroU32::new(REQUESTS_PER_SECOND).expect("nonzero request rate");
    RateLimiter::direct(Quota::per_second(per_second))
}

/// Map a transport-level failure into the provider taxonomy.
pub(crate) fn request_error(error: reqwest::Error) -> ProviderError {
    ProviderError::Unavailable(error.to_string())
}

/// Translate non-success statuses: 401 means the token is no longer usable,
/// 429 carries a retry-after hint, 5xx is transient.
pub(crate) async fn check_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ProviderError::TokenExpired);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(ProviderError::RateLimited { retry_after });
    }
    if status.is_server_error() {
        return Err(ProviderError::Unavailable(status.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::InvalidResponse(format!("{status}: {body}")))
}

/// Retry a provider call on transient unavailability, bounded exponential
/// backoff. Rate limiting is not retried here: the reconciliation engine
/// pauses the whole job through its backoff gate instead.
pub async fn with_provider_retry<T, Fut, F>(operation: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    operation
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(250))
                .with_max_times(3),
        )
        .when(|error| matches!(error, ProviderError::Unavailable(_)))
        .notify(|error, delay| {
            log::warn!("Transient provider failure, retrying in {delay:?}: {error}");
        })
        .await
}

/// Adapters constructed once per process from configuration and injected by
/// reference, never looked up from ambient scope.
pub struct ProviderRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self {
            adapters: HashMap::new(),
        };

        if let Some(spotify) = config.spotify() {
            registry.register(Arc::new(spotify::SpotifyProvider::new(spotify)));
        }
        if let Some(apple) = config.apple_music() {
            registry.register(Arc::new(apple_music::AppleMusicProvider::new(apple)));
        }
        if let Some(amazon) = config.amazon_music() {
            registry.register(Arc::new(amazon_music::AmazonMusicProvider::new(amazon)));
        }

        registry
    }

    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderClient>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn ProviderClient>> {
        self.adapters.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = self.adapters.keys().copied().collect();
        kinds.sort_by_key(|kind| kind.api_name());
        kinds
    }
}
