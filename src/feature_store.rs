//! A thread-safe in-memory store for the currently published feature map. [`FeatureStore`]
//! provides concurrent access for readers (flag evaluation) and writers (the background refresh
//! thread).

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::model::FeatureMap;

/// `FeatureStore` provides thread-safe (`Sync`) storage for the feature map.
///
/// The published map is immutable and can only be replaced fully, so readers hold a consistent
/// snapshot for as long as they keep the `Arc`.
#[derive(Default)]
pub(crate) struct FeatureStore {
    inner: RwLock<Published>,
}

#[derive(Default)]
struct Published {
    features: Arc<FeatureMap>,
    last_fetch: Option<Instant>,
}

impl FeatureStore {
    pub fn new() -> FeatureStore {
        FeatureStore::default()
    }

    /// Snapshot of the current feature map.
    pub fn get_features(&self) -> Arc<FeatureMap> {
        // self.inner.read() should always return Ok(). Err() is possible only if the lock is
        // poisoned (writer panicked while holding the lock), which should never happen.
        let inner = self
            .inner
            .read()
            .expect("thread holding feature store lock should not panic");

        Arc::clone(&inner.features)
    }

    /// Publish a new feature map, stamping the fetch time.
    pub fn set_features(&self, features: FeatureMap) {
        let mut inner = self
            .inner
            .write()
            .expect("thread holding feature store lock should not panic");

        inner.features = Arc::new(features);
        inner.last_fetch = Some(Instant::now());
    }

    /// Whether the published map is older than `ttl`. A store that has never been filled is not
    /// stale: the initial fetch is already on its way.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        let inner = self
            .inner
            .read()
            .expect("thread holding feature store lock should not panic");

        match inner.last_fetch {
            Some(at) => at.elapsed() > ttl,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::FeatureStore;
    use crate::model::Feature;

    #[test]
    fn can_set_features_from_another_thread() {
        let store = Arc::new(FeatureStore::new());
        assert!(store.get_features().is_empty());

        {
            let store = store.clone();
            let _ = std::thread::spawn(move || {
                store.set_features(
                    [("flag".to_owned(), Feature::default())].into_iter().collect(),
                );
            })
            .join();
        }

        assert!(store.get_features().contains_key("flag"));
    }

    #[test]
    fn snapshots_outlive_republication() {
        let store = FeatureStore::new();
        store.set_features(
            [(
                "flag".to_owned(),
                serde_json::from_value(json!({"defaultValue": 1})).unwrap(),
            )]
            .into_iter()
            .collect(),
        );

        let snapshot = store.get_features();
        store.set_features(
            [(
                "flag".to_owned(),
                serde_json::from_value(json!({"defaultValue": 2})).unwrap(),
            )]
            .into_iter()
            .collect(),
        );

        assert_eq!(snapshot["flag"].default_value, json!(1));
        assert_eq!(store.get_features()["flag"].default_value, json!(2));
    }

    #[test]
    fn staleness_tracks_the_last_publication() {
        let store = FeatureStore::new();
        // Never filled: not stale.
        assert!(!store.is_stale(Duration::ZERO));

        store.set_features(Default::default());
        assert!(!store.is_stale(Duration::from_secs(60)));

        std::thread::sleep(Duration::from_millis(10));
        assert!(store.is_stale(Duration::from_millis(1)));
    }
}
