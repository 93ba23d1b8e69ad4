//! A background thread that fetches feature definitions and publishes them to the store.
//!
//! The thread owns the HTTP fetcher and a current-thread tokio runtime. It fetches immediately on
//! start, then waits on a command mailbox: `Refresh` commands trigger an immediate fetch (queued
//! duplicates collapse into one), `Stop` ends the thread, and under the periodic strategy the
//! mailbox timeout doubles as the refresh timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{RecvTimeoutError, SyncSender};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use rand::{thread_rng, Rng};

use crate::error::{Error, Result};
use crate::feature_fetcher::FeatureFetcher;
use crate::feature_store::FeatureStore;
use crate::repository::SubscriberSet;

/// Mailbox depth. Commands are only ever dropped when an equivalent command is already queued.
const COMMAND_BUFFER: usize = 8;

/// How often a manual-strategy thread wakes to check for shutdown.
const MANUAL_WAKE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollerCommand {
    Refresh,
    Stop,
}

#[derive(Debug, Clone)]
pub(crate) struct RefreshPollerConfig {
    /// Time between periodic refreshes; also the staleness TTL.
    pub interval: Duration,
    /// Subtractive jitter applied to `interval`, to avoid multiple service instances
    /// synchronizing and producing spiky fetch load.
    pub jitter: Duration,
    /// Whether the timer fires refreshes at all; manual-strategy pollers only refresh on command.
    pub periodic: bool,
}

/// Handle to the background refresh thread.
pub(crate) struct RefreshPoller {
    join_handle: Mutex<Option<std::thread::JoinHandle<()>>>,
    command_sender: SyncSender<PollerCommand>,
    stopped: Arc<AtomicBool>,
    /// Holds `None` until the first fetch settles. Holds `Some(Ok(()))` once any fetch has
    /// succeeded. Holds `Some(Err(...))` if the first fetch failed; a later success overwrites it.
    result: Arc<(Mutex<Option<Result<()>>>, Condvar)>,
}

impl RefreshPoller {
    /// Start the refresh thread. The first fetch begins immediately.
    pub fn start(
        fetcher: FeatureFetcher,
        store: Arc<FeatureStore>,
        subscribers: Arc<SubscriberSet>,
        config: RefreshPollerConfig,
    ) -> std::io::Result<RefreshPoller> {
        // Using `sync_channel` as it makes the sender `Sync` (shareable between threads).
        let (command_sender, command_receiver) =
            std::sync::mpsc::sync_channel::<PollerCommand>(COMMAND_BUFFER);
        let stopped = Arc::new(AtomicBool::new(false));
        let result = Arc::new((Mutex::new(None), Condvar::new()));

        let join_handle = {
            // Cloning Arcs for move into the thread.
            let result = Arc::clone(&result);
            let stopped = Arc::clone(&stopped);

            std::thread::Builder::new()
                .name("growthbook-refresh".to_owned())
                .spawn(move || {
                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        let runtime = match tokio::runtime::Builder::new_current_thread()
                            .enable_all()
                            .build()
                        {
                            Ok(runtime) => runtime,
                            Err(err) => {
                                update_result(&result, Err(Error::from(err)));
                                return;
                            }
                        };

                        loop {
                            if stopped.load(Ordering::Relaxed) {
                                return;
                            }

                            log::debug!(target: "growthbook", "refreshing features");
                            match runtime.block_on(fetcher.fetch_features()) {
                                Ok(features) => {
                                    store.set_features(features);
                                    update_result(&result, Ok(()));
                                    // Published first, notified second: subscribers always
                                    // observe at least the map they're told about.
                                    subscribers.notify(&store.get_features());
                                }
                                Err(err) => {
                                    // The cache is left untouched: stale features beat none.
                                    log::warn!(target: "growthbook", "failed to refresh features: {err}");
                                    fail_if_pending(&result, err);
                                }
                            }

                            let timeout = if config.periodic {
                                jittered(config.interval, config.jitter)
                            } else {
                                MANUAL_WAKE_INTERVAL
                            };
                            loop {
                                match command_receiver.recv_timeout(timeout) {
                                    Ok(PollerCommand::Refresh) => {
                                        // Collapse queued duplicates into a single fetch.
                                        let mut stop = false;
                                        while let Ok(command) = command_receiver.try_recv() {
                                            if command == PollerCommand::Stop {
                                                stop = true;
                                            }
                                        }
                                        if stop {
                                            return;
                                        }
                                        break;
                                    }
                                    Ok(PollerCommand::Stop) => {
                                        log::debug!(target: "growthbook", "refresh thread received stop command");
                                        return;
                                    }
                                    Err(RecvTimeoutError::Timeout) => {
                                        if stopped.load(Ordering::Relaxed) {
                                            return;
                                        }
                                        if config.periodic {
                                            // Timed out: fetch a fresh feature map.
                                            break;
                                        }
                                        // Manual strategy: keep waiting for commands.
                                    }
                                    Err(RecvTimeoutError::Disconnected) => {
                                        log::debug!(target: "growthbook", "refresh thread disconnected");
                                        return;
                                    }
                                }
                            }
                        }
                    }));

                    // If catch_unwind returns Err, a panic occurred. Record it so waiters are not
                    // stranded.
                    if outcome.is_err() {
                        update_result(&result, Err(Error::RefreshThreadPanicked));
                    }
                })?
        };

        Ok(RefreshPoller {
            join_handle: Mutex::new(Some(join_handle)),
            command_sender,
            stopped,
            result,
        })
    }

    /// Ask the thread to refresh as soon as possible. Never blocks: a full mailbox means a
    /// refresh is already queued.
    pub fn request_refresh(&self) {
        let _ = self.command_sender.try_send(PollerCommand::Refresh);
    }

    /// Block until the first fetch settles or `timeout` elapses. The in-flight fetch is not
    /// cancelled on timeout.
    pub fn wait_for_initialization(&self, timeout: Duration) -> Result<()> {
        let (lock, condvar) = &*self.result;
        let guard = lock.lock().map_err(|_| Error::RefreshThreadPanicked)?;
        let (guard, _) = condvar
            .wait_timeout_while(guard, timeout, |slot| slot.is_none())
            .map_err(|_| Error::RefreshThreadPanicked)?;

        match &*guard {
            Some(result) => result.clone(),
            None => Err(Error::InitializationTimeout),
        }
    }

    /// Ask the thread to stop and fail any waiters still blocked on the first fetch. Does not
    /// wait for the thread to exit.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        // A full mailbox is fine: the thread drains it and re-checks the stop flag.
        let _ = self.command_sender.try_send(PollerCommand::Stop);

        if let Ok(mut slot) = self.result.0.lock() {
            if slot.is_none() {
                *slot = Some(Err(Error::ShutdownInProgress));
                self.result.1.notify_all();
            }
        }
    }

    /// Stop the thread and block waiting for it to exit.
    pub fn shutdown(&self) -> Result<()> {
        self.stop();

        let handle = self
            .join_handle
            .lock()
            .map_err(|_| Error::RefreshThreadPanicked)?
            .take();
        if let Some(handle) = handle {
            handle.join().map_err(|_| Error::RefreshThreadPanicked)?;
        }
        Ok(())
    }
}

fn update_result(result: &(Mutex<Option<Result<()>>>, Condvar), value: Result<()>) {
    if let Ok(mut slot) = result.0.lock() {
        *slot = Some(value);
        result.1.notify_all();
    }
}

/// Record a fetch failure only while the first fetch is still pending; later failures keep the
/// ready state and the cached features.
fn fail_if_pending(result: &(Mutex<Option<Result<()>>>, Condvar), err: Error) {
    if let Ok(mut slot) = result.0.lock() {
        if slot.is_none() {
            *slot = Some(Err(err));
            result.1.notify_all();
        }
    }
}

/// Shorten `interval` by a random amount in `[0, max_jitter)`, so that a fleet of instances with
/// the same TTL spreads its fetches out instead of hitting the endpoint in lockstep.
fn jittered(interval: Duration, max_jitter: Duration) -> Duration {
    let jitter = max_jitter.mul_f64(thread_rng().gen::<f64>());
    interval.saturating_sub(jitter)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::jittered;

    #[test]
    fn jittered_wait_stays_within_one_jitter_of_the_interval() {
        let interval = Duration::from_secs(60);
        let max_jitter = Duration::from_secs(6);

        for _ in 0..100 {
            let wait = jittered(interval, max_jitter);
            assert!(wait <= interval, "wait {wait:?} longer than the interval");
            assert!(
                wait >= interval - max_jitter,
                "wait {wait:?} shortened by more than {max_jitter:?}"
            );
        }
    }

    #[test]
    fn jittered_wait_saturates_at_zero() {
        // A jitter larger than the interval must not underflow the subtraction.
        assert_eq!(jittered(Duration::ZERO, Duration::from_secs(30)), Duration::ZERO);
    }

    #[test]
    fn zero_jitter_keeps_the_full_interval() {
        assert_eq!(
            jittered(Duration::from_secs(60), Duration::ZERO),
            Duration::from_secs(60)
        );
    }
}
