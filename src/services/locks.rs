use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};

use crate::ports::provider::ProviderKind;

/// Async mutual exclusion keyed by an arbitrary id.
///
/// Provider tokens and rate-limit budgets are shared per (user, provider),
/// so token refresh and a job's provider-call sequence must never run
/// concurrently for the same pair. Playlist song lists get the same
/// treatment keyed by playlist id.
pub struct KeyedLocks<K> {
    inner: StdMutex<HashMap<K, Arc<TokioMutex<()>>>>,
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            inner: StdMutex::new(HashMap::new()),
        }
    }

    /// Acquire the lock for `key`, waiting if another task holds it.
    pub async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().expect("keyed lock map poisoned");
            map.entry(key)
                .or_insert_with(|| Arc::new(TokioMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// One lock per (user, provider) pair.
pub type ProviderLocks = KeyedLocks<(i64, ProviderKind)>;

/// One lock per local playlist.
pub type PlaylistLocks = KeyedLocks<i64>;

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn same_key_serializes() {
        let locks = Arc::new(ProviderLocks::new());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire((1, ProviderKind::Spotify)).await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_are_independent() {
        let locks = Arc::new(ProviderLocks::new());
        let _spotify = locks.acquire((1, ProviderKind::Spotify)).await;
        // Must not deadlock: a different pair has its own lock.
        let _apple = locks.acquire((1, ProviderKind::AppleMusic)).await;
        let _other_user = locks.acquire((2, ProviderKind::Spotify)).await;
    }
}
