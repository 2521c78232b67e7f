//! Injected get-or-create cache for transport clients.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

/// Shared instances keyed by `K`, created on first request.
///
/// At most one load runs per key at a time: concurrent callers for the same
/// key wait on the in-flight load and share its result. A failed load leaves
/// the key empty, so the next caller tries again. Different keys load
/// independently.
pub struct TransportCache<K, V: ?Sized> {
    entries: Mutex<HashMap<K, Arc<OnceCell<Arc<V>>>>>,
}

impl<K, V> TransportCache<K, V>
where
    K: Eq + Hash + Clone,
    V: ?Sized,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the instance for `key`, running `load` if none exists yet.
    pub async fn get_or_try_init<F, Fut, E>(&self, key: &K, load: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<V>, E>>,
    {
        let cell = {
            let mut entries = self.entries.lock().expect("lock poisoned");
            Arc::clone(entries.entry(key.clone()).or_default())
        };
        cell.get_or_try_init(load).await.map(Arc::clone)
    }

    /// The instance for `key`, if one has finished loading.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries
            .lock()
            .expect("lock poisoned")
            .get(key)
            .and_then(|cell| cell.get().cloned())
    }

    /// Forget `key`. Holders of the old instance keep it.
    pub fn invalidate(&self, key: &K) -> bool {
        self.entries
            .lock()
            .expect("lock poisoned")
            .remove(key)
            .is_some()
    }

    /// Number of keys with a loaded instance.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("lock poisoned")
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for TransportCache<K, V>
where
    K: Eq + Hash + Clone,
    V: ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V: ?Sized> std::fmt::Debug for TransportCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock().map(|e| e.len()).unwrap_or_default();
        f.debug_struct("TransportCache").field("entries", &entries).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_share_one_load() {
        let cache: Arc<TransportCache<String, str>> = Arc::new(TransportCache::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let loads = Arc::clone(&loads);
                tokio::spawn(async move {
                    cache
                        .get_or_try_init(&"eu-west-1".to_string(), || async move {
                            loads.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(30)).await;
                            Ok::<_, String>(Arc::from("client-eu"))
                        })
                        .await
                        .unwrap()
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(&*task.await.unwrap(), "client-eu");
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn distinct_keys_load_separately() {
        let cache: TransportCache<&str, String> = TransportCache::new();
        let a = cache
            .get_or_try_init(&"a", || async { Ok::<_, ()>(Arc::new("A".to_string())) })
            .await
            .unwrap();
        let b = cache
            .get_or_try_init(&"b", || async { Ok::<_, ()>(Arc::new("B".to_string())) })
            .await
            .unwrap();
        assert_eq!((a.as_str(), b.as_str()), ("A", "B"));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn failed_load_is_retried() {
        let cache: TransportCache<u8, u32> = TransportCache::new();
        let err = cache
            .get_or_try_init(&1, || async { Err::<Arc<u32>, _>("unreachable") })
            .await
            .unwrap_err();
        assert_eq!(err, "unreachable");
        assert!(cache.get(&1).is_none());

        let value = cache
            .get_or_try_init(&1, || async { Ok::<_, &str>(Arc::new(7)) })
            .await
            .unwrap();
        assert_eq!(*value, 7);
        assert_eq!(cache.get(&1).as_deref(), Some(&7));
    }

    #[tokio::test]
    async fn invalidate_forces_a_reload() {
        let cache: TransportCache<u8, u32> = TransportCache::new();
        cache
            .get_or_try_init(&1, || async { Ok::<_, ()>(Arc::new(1)) })
            .await
            .unwrap();
        assert!(cache.invalidate(&1));
        let reloaded = cache
            .get_or_try_init(&1, || async { Ok::<_, ()>(Arc::new(2)) })
            .await
            .unwrap();
        assert_eq!(*reloaded, 2);
    }
}
