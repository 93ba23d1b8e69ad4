//! Background-refreshing repository of feature definitions.
//!
//! The repository wires the store, fetcher, and refresh thread together and is the only
//! component with mutable state. Readers never block on HTTP: a stale read returns the cached
//! snapshot and kicks a refresh in the background (stale-while-revalidate).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::feature_fetcher::FeatureFetcher;
use crate::feature_store::FeatureStore;
use crate::model::FeatureMap;
use crate::refresh_poller::{RefreshPoller, RefreshPollerConfig};

/// When the repository refreshes its feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshStrategy {
    /// Refresh on a timer every TTL, plus on stale reads and explicit requests.
    #[default]
    Periodic,
    /// Refresh only on stale reads and explicit requests.
    Manual,
}

/// Handle for a refresh subscription, to pass to
/// [`FeatureRepository::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u64);

type SubscriberFn = dyn Fn(&FeatureMap) + Send + Sync;

/// Registry of refresh callbacks. Each successful refresh notifies every subscriber once,
/// strictly after the new map has been published.
#[derive(Default)]
pub(crate) struct SubscriberSet {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, Arc<SubscriberFn>)>>,
}

impl SubscriberSet {
    pub fn new() -> SubscriberSet {
        SubscriberSet::default()
    }

    pub fn subscribe(
        &self,
        subscriber: impl Fn(&FeatureMap) + Send + Sync + 'static,
    ) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .expect("thread holding subscriber lock should not panic")
            .push((id, Arc::new(subscriber)));
        SubscriberId(id)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers
            .lock()
            .expect("thread holding subscriber lock should not panic")
            .retain(|(existing, _)| *existing != id.0);
    }

    /// Invoke every subscriber with the new map. A panicking subscriber is logged and does not
    /// affect its peers or the refresh thread.
    pub fn notify(&self, features: &Arc<FeatureMap>) {
        let subscribers: Vec<Arc<SubscriberFn>> = self
            .subscribers
            .lock()
            .expect("thread holding subscriber lock should not panic")
            .iter()
            .map(|(_, subscriber)| Arc::clone(subscriber))
            .collect();

        for subscriber in subscribers {
            if catch_unwind(AssertUnwindSafe(|| subscriber(features))).is_err() {
                log::warn!(target: "growthbook", "feature refresh subscriber panicked");
            }
        }
    }
}

/// A long-lived, concurrently accessible cache of feature definitions.
///
/// Construction validates the configuration, spawns the refresh thread, and kicks off the initial
/// fetch. Use [`await_initialization`](FeatureRepository::await_initialization) to block until
/// that fetch settles.
///
/// A failed refresh never clears the cache: evaluators keep seeing the last good map.
pub struct FeatureRepository {
    store: Arc<FeatureStore>,
    subscribers: Arc<SubscriberSet>,
    poller: RefreshPoller,
    ttl: Duration,
    initialization_timeout: Duration,
}

impl FeatureRepository {
    /// Validate `config`, spawn the refresh thread, and start the initial fetch.
    pub fn new(config: &ClientConfig) -> Result<FeatureRepository> {
        if config.client_key.is_empty() {
            return Err(Error::InvalidConfiguration(
                "client_key must not be empty".to_owned(),
            ));
        }
        if config.api_host.is_empty() {
            return Err(Error::InvalidConfiguration(
                "api_host must not be empty".to_owned(),
            ));
        }

        let fetcher = FeatureFetcher::new(
            &config.api_host,
            &config.client_key,
            config.decryption_key.clone(),
        )?;
        let store = Arc::new(FeatureStore::new());
        let subscribers = Arc::new(SubscriberSet::new());

        let poller = RefreshPoller::start(
            fetcher,
            Arc::clone(&store),
            Arc::clone(&subscribers),
            RefreshPollerConfig {
                interval: config.ttl,
                // Capped so that short TTLs (tests, aggressive configs) don't jitter away the
                // whole interval.
                jitter: DEFAULT_JITTER.min(config.ttl / 10),
                periodic: config.refresh_strategy == RefreshStrategy::Periodic,
            },
        )?;

        Ok(FeatureRepository {
            store,
            subscribers,
            poller,
            ttl: config.ttl,
            initialization_timeout: config.initialization_timeout,
        })
    }

    /// Snapshot of the current feature map.
    ///
    /// Never blocks on HTTP: when the snapshot is older than the TTL, it is returned as-is and a
    /// background refresh is requested.
    pub fn get_features(&self) -> Arc<FeatureMap> {
        if self.store.is_stale(self.ttl) {
            log::debug!(target: "growthbook", "features are stale; refreshing in the background");
            self.poller.request_refresh();
        }
        self.store.get_features()
    }

    /// Request an asynchronous refresh of the feature map.
    pub fn refresh(&self) {
        self.poller.request_refresh();
    }

    /// Register a callback invoked after every successful refresh, with the new map.
    pub fn subscribe(
        &self,
        subscriber: impl Fn(&FeatureMap) + Send + Sync + 'static,
    ) -> SubscriberId {
        self.subscribers.subscribe(subscriber)
    }

    /// Remove a previously registered callback.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.unsubscribe(id);
    }

    /// Block until the initial fetch settles or the configured initialization timeout elapses.
    ///
    /// An error state is not final: the repository keeps refreshing and becomes ready on the
    /// first successful fetch.
    pub fn await_initialization(&self) -> Result<()> {
        self.await_initialization_for(self.initialization_timeout)
    }

    /// [`await_initialization`](FeatureRepository::await_initialization) with an explicit
    /// timeout.
    pub fn await_initialization_for(&self, timeout: Duration) -> Result<()> {
        self.poller.wait_for_initialization(timeout)
    }

    /// Stop the refresh thread and fail any pending initialization waiters. Blocks until the
    /// thread exits; in-flight evaluations are unaffected and keep their snapshots.
    pub fn shutdown(&self) -> Result<()> {
        self.poller.shutdown()
    }
}

impl Drop for FeatureRepository {
    fn drop(&mut self) {
        self.poller.stop();
    }
}

const DEFAULT_JITTER: Duration = Duration::from_secs(3);
