//! Incremental status fetcher.
//!
//! One cycle walks the roster in order and awaits one request at a time.
//! Each result is merged into the snapshot as soon as it arrives, so
//! readers see the list fill in progressively. Overlapping cycles are
//! refused by a reentrancy guard; cancellation is checked before every
//! mutation.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::{Channel, ChannelStatus, Snapshot};
use crate::notify::Notifier;
use crate::roster::{Roster, RosterEntry};
use crate::store::SnapshotStore;

/// Per-channel upstream failure. Recorded on that channel only; the cycle
/// carries on with the next one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("channel {0} not found")]
    NotFound(String),
    #[error("upstream returned {status} for {username}")]
    Status { username: String, status: u16 },
    #[error("response for {0} has no user object")]
    MissingUser(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Fetch one channel's status given a username.
#[async_trait]
pub trait ChannelSource: Send + Sync {
    async fn fetch_channel(&self, username: &str) -> Result<ChannelStatus, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Another cycle held the guard.
    Skipped,
    Completed { succeeded: usize, failed: usize },
    Cancelled,
}

/// Clears the running flag when the cycle ends, however it ends.
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Fetcher {
    roster: Arc<Roster>,
    snapshots: Arc<SnapshotStore>,
    source: Arc<dyn ChannelSource>,
    notifier: Arc<dyn Notifier>,
    request_delay: Duration,
    cancel: CancellationToken,
    running: AtomicBool,
    generation: AtomicU64,
    trigger: Notify,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl Fetcher {
    pub fn new(
        roster: Arc<Roster>,
        snapshots: Arc<SnapshotStore>,
        source: Arc<dyn ChannelSource>,
        notifier: Arc<dyn Notifier>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            roster,
            snapshots,
            source,
            notifier,
            request_delay: Duration::from_millis(250),
            cancel,
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            trigger: Notify::new(),
            in_flight: Mutex::new(None),
        }
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of cycles started so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Ask the [`run`](Self::run) loop for an extra cycle.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// One sequential pass over the roster.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_guard) = CycleGuard::acquire(&self.running) else {
            debug!("[fetch] cycle already running, skipping");
            return CycleOutcome::Skipped;
        };
        if self.cancel.is_cancelled() {
            return CycleOutcome::Cancelled;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            "[fetch] cycle {} started for {} channels",
            generation,
            self.roster.len()
        );

        self.snapshots
            .apply(|s| {
                let mut next = s.clone();
                for c in &mut next.data {
                    c.is_loading = true;
                }
                next
            })
            .await;

        let (mut succeeded, mut failed) = (0, 0);
        let total = self.roster.len();

        for (i, entry) in self.roster.channels.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return self.cancelled(generation);
            }

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.cancelled(generation),
                r = self.source.fetch_channel(&entry.username) => r,
            };
            if self.cancel.is_cancelled() {
                return self.cancelled(generation);
            }

            match result {
                Ok(status) => {
                    succeeded += 1;
                    self.merge_success(entry, status).await;
                }
                Err(e) => {
                    failed += 1;
                    warn!("[fetch] {}: {}", entry.username, e);
                    self.merge_failure(entry).await;
                }
            }

            if i + 1 < total {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return self.cancelled(generation),
                    _ = tokio::time::sleep(self.request_delay) => {}
                }
            }
        }

        info!(
            "[fetch] cycle {} done: {} ok, {} failed",
            generation, succeeded, failed
        );
        CycleOutcome::Completed { succeeded, failed }
    }

    fn cancelled(&self, generation: u64) -> CycleOutcome {
        info!("[fetch] cycle {} cancelled", generation);
        CycleOutcome::Cancelled
    }

    async fn merge_success(&self, entry: &RosterEntry, status: ChannelStatus) {
        let now = Utc::now();
        let fresh = Channel::from_status(entry, status, now);
        let mut previous: Option<Channel> = None;

        let next = self
            .snapshots
            .apply(|s| {
                previous = s.find(&entry.username).cloned();
                s.with_channel(fresh.clone(), now)
            })
            .await;
        self.persist(&next);

        // First observation of a channel is not a transition.
        let went_live = fresh.is_live
            && previous
                .as_ref()
                .is_some_and(|p| !p.is_live && p.last_synced_at.is_some());
        if went_live {
            info!("[fetch] {} went live", entry.username);
            self.notifier.went_live(&fresh).await;
        }
    }

    async fn merge_failure(&self, entry: &RosterEntry) {
        let now = Utc::now();
        let next = self
            .snapshots
            .apply(|s| {
                let mut failed = s
                    .find(&entry.username)
                    .cloned()
                    .unwrap_or_else(|| Channel::placeholder(entry));
                failed.mark_failed(now);
                s.with_channel(failed, now)
            })
            .await;
        self.persist(&next);
    }

    fn persist(&self, snapshot: &Snapshot) {
        if let Err(e) = self.snapshots.persist(snapshot) {
            warn!("[fetch] failed to persist snapshot: {}", e);
        }
    }

    /// Poll until cancelled: one cycle immediately, then one per `interval`
    /// measured from cycle start, plus one per [`trigger`](Self::trigger).
    /// Cycles run as their own task so the loop keeps listening; a tick or
    /// trigger that lands mid-cycle is refused by the guard.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        // tokio rejects a zero period
        let interval = interval.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("[fetch] polling every {:?}", interval);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => self.spawn_cycle("interval").await,
                _ = self.trigger.notified() => self.spawn_cycle("manual").await,
            }
        }

        if let Some(handle) = self.in_flight.lock().await.take() {
            let _ = handle.await;
        }
        info!("[fetch] poller stopped");
    }

    async fn spawn_cycle(self: &Arc<Self>, reason: &'static str) {
        let mut in_flight = self.in_flight.lock().await;
        if self.is_running() || in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("[fetch] {} refresh refused, cycle in progress", reason);
            return;
        }
        debug!("[fetch] {} refresh", reason);
        let this = Arc::clone(self);
        *in_flight = Some(tokio::spawn(async move {
            this.run_cycle().await;
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        let first = CycleGuard::acquire(&flag);
        assert!(first.is_some());
        assert!(CycleGuard::acquire(&flag).is_none());
        drop(first);
        assert!(CycleGuard::acquire(&flag).is_some());
    }
}
