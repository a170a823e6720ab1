//! Sync Scheduler
//!
//! Keeps a PolicyStore fresh: a fixed-interval heartbeat plus an immediate
//! reload whenever another consumer broadcasts a successful write.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use super::broadcast::{ChangeBroadcaster, Subscription};
use super::defaults::DefaultPolicyProvider;
use super::loader::{LoadOutcome, PolicyLoader};
use super::store::PolicyStore;

/// Shortest accepted refresh period
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// What a single refresh did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Fresh matrix swapped in
    Updated,
    /// Load failed; store holds last good matrix or defaults
    Degraded,
    /// Another refresh was already running
    Skipped,
    /// A newer matrix was saved locally while this load was in flight;
    /// the loaded result was discarded
    Superseded,
}

/// Clears the in-flight flag on every exit path
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The single load-and-apply path shared by timer, broadcast and manual reloads
#[derive(Clone)]
pub struct Refresher {
    loader: PolicyLoader,
    store: PolicyStore,
    in_flight: Arc<AtomicBool>,
}

impl Refresher {
    pub fn new(loader: PolicyLoader, store: PolicyStore) -> Self {
        Self {
            loader,
            store,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn store(&self) -> &PolicyStore {
        &self.store
    }

    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            tracing::debug!("permission refresh already in flight, skipping");
            return RefreshOutcome::Skipped;
        };

        if !self.store.has_loaded() {
            self.store.mark_loading();
        }

        let seen = self.store.generation();
        let outcome = self.loader.load().await;
        self.apply(outcome, seen)
    }

    /// `seen` is the store generation when the fetch began. A save that
    /// landed since then wins over whatever this load produced.
    fn apply(&self, outcome: LoadOutcome, seen: u64) -> RefreshOutcome {
        let applied = match outcome.error {
            None => self
                .store
                .replace_if_current(outcome.matrix, seen)
                .then_some(RefreshOutcome::Updated),
            Some(err) => self
                .apply_failure(&err.to_string(), seen)
                .then_some(RefreshOutcome::Degraded),
        };

        applied.unwrap_or_else(|| {
            tracing::debug!(seen, current = self.store.generation(), "discarding stale permission load");
            RefreshOutcome::Superseded
        })
    }

    fn apply_failure(&self, reason: &str, seen: u64) -> bool {
        if self.store.generation() != seen {
            return false;
        }
        if self.store.has_loaded() {
            // Keep serving the last good matrix
            self.store.mark_error(reason);
            return true;
        }
        self.store
            .replace_degraded_if_current(DefaultPolicyProvider::defaults(), reason, seen)
    }
}

struct Running {
    task: JoinHandle<()>,
    subscription: Option<Subscription>,
}

/// Owns the refresh task and broadcast subscription for one consumer
pub struct SyncScheduler {
    refresher: Refresher,
    broadcaster: ChangeBroadcaster,
    instance_id: Uuid,
    reload_on_broadcast: bool,
    running: Option<Running>,
}

impl SyncScheduler {
    pub fn new(refresher: Refresher, broadcaster: ChangeBroadcaster, instance_id: Uuid) -> Self {
        Self {
            refresher,
            broadcaster,
            instance_id,
            reload_on_broadcast: true,
            running: None,
        }
    }

    pub fn with_broadcast_reload(mut self, enabled: bool) -> Self {
        self.reload_on_broadcast = enabled;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Begin periodic refreshes. Must be called inside a tokio runtime.
    /// Calling it again while running is a no-op.
    pub fn start(&mut self, interval: Duration) {
        if self.running.is_some() {
            tracing::debug!("sync scheduler already running");
            return;
        }

        let interval = interval.max(MIN_REFRESH_INTERVAL);
        let wake = Arc::new(Notify::new());

        let subscription = if self.reload_on_broadcast {
            let wake = Arc::clone(&wake);
            let own_id = self.instance_id;
            Some(self.broadcaster.subscribe(move |event| {
                // Our own writes are already applied locally
                if event.origin != own_id {
                    wake.notify_one();
                }
            }))
        } else {
            None
        };

        let task = tokio::spawn(run_sync_loop(self.refresher.clone(), interval, wake));
        tracing::info!(interval_ms = interval.as_millis() as u64, "permission sync started");

        self.running = Some(Running { task, subscription });
    }

    /// Cancel the timer and unsubscribe. Once this returns the store is
    /// never replaced by this scheduler again.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        drop(running.subscription);
        running.task.abort();
        // Wait until the task is gone so no apply can still be pending
        let _ = running.task.await;

        tracing::info!("permission sync stopped");
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.task.abort();
        }
    }
}

async fn run_sync_loop(refresher: Refresher, interval: Duration, wake: Arc<Notify>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let trigger = tokio::select! {
            _ = ticker.tick() => "interval",
            _ = wake.notified() => "broadcast",
        };

        let outcome = refresher.refresh().await;
        tracing::debug!(trigger, ?outcome, "permission refresh finished");
    }
}
