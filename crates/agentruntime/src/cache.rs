use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Read-through cache with time-based expiry only.
///
/// The window is passed per call so callers keep it visible next to the
/// fetch it guards. Concurrent misses on the same key may both fetch; the
/// later write wins.
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return a fresh cached value or fetch, store and return a new one.
    /// Fetch errors are returned as-is and nothing is cached.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, ttl: Duration, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        {
            let entries = self.entries.lock().await;
            if let Some((stored_at, value)) = entries.get(&key) {
                if stored_at.elapsed() < ttl {
                    return Ok(value.clone());
                }
            }
        }

        let value = fetch().await?;
        self.entries
            .lock()
            .await
            .insert(key, (Instant::now(), value.clone()));
        Ok(value)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
