//! Application state controller. Owns the snapshot store, preferences,
//! schedule store and share board; every mutation goes through a method
//! here and is persisted before it returns.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::layout::{
    self, BoardError, DecodedLayout, Expiry, LayoutCodeError, ShareBoard, WindowData, WindowUpdate,
};
use crate::model::{Channel, EnrichedScheduledStream, ScheduledStream, Snapshot};
use crate::notify::{LiveNotification, LiveNotifier, NotificationCenter, NotificationPermission, Notifier};
use crate::persist::JsonStore;
use crate::prefs::{Preferences, PrefsError, SavedLayout, UiFlags};
use crate::roster::Roster;
use crate::schedule::{self, NewSchedule, ScheduleSort, ScheduleStats, ScheduleStore};
use crate::store::SnapshotStore;
use crate::views::{self, ChannelFilter, FavoritesView, LinksView, LiveView, SortMode};

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Prefs(#[from] PrefsError),
    #[error(transparent)]
    Layout(#[from] LayoutCodeError),
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error("{0} is not on the roster")]
    UnknownChannel(String),
    #[error("no scheduled stream with id {0}")]
    UnknownSchedule(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardState {
    pub rev: u64,
    pub snapshot: Arc<Snapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleView {
    pub entries: Vec<EnrichedScheduledStream>,
    pub stats: ScheduleStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct MultiStream {
    pub channels: Vec<Channel>,
    pub link: Option<String>,
}

pub struct Dashboard {
    roster: Arc<Roster>,
    snapshots: Arc<SnapshotStore>,
    prefs: Arc<RwLock<Preferences>>,
    schedules: ScheduleStore,
    alerts: Arc<NotificationCenter>,
    board: RwLock<ShareBoard>,
}

impl Dashboard {
    pub fn open(store: JsonStore, roster: Roster, permission: NotificationPermission) -> Self {
        let snapshots = Arc::new(SnapshotStore::load(store.clone(), &roster));
        let prefs = Preferences::load(store.clone(), permission);
        let schedules = ScheduleStore::new(store, roster.seeded_schedules.clone());
        info!(
            "[dashboard] {} channels, {} favorites, permission {:?}",
            roster.len(),
            prefs.favorites().len(),
            permission
        );
        Self {
            roster: Arc::new(roster),
            snapshots,
            prefs: Arc::new(RwLock::new(prefs)),
            schedules,
            alerts: Arc::new(NotificationCenter::new()),
            board: RwLock::new(ShareBoard::new()),
        }
    }

    pub fn roster(&self) -> Arc<Roster> {
        Arc::clone(&self.roster)
    }

    pub fn snapshots(&self) -> Arc<SnapshotStore> {
        Arc::clone(&self.snapshots)
    }

    /// Notifier for the fetcher, gated on these preferences.
    pub fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::new(LiveNotifier::new(Arc::clone(&self.prefs), self.alerts.clone()))
    }

    pub async fn state(&self) -> DashboardState {
        DashboardState {
            rev: self.snapshots.rev(),
            snapshot: self.snapshots.current().await,
        }
    }

    pub async fn live_view(&self, filter: &ChannelFilter, sort: SortMode, now: DateTime<Utc>) -> LiveView {
        let snapshot = self.snapshots.current().await;
        views::live_view(&self.roster, &snapshot, filter, sort, now)
    }

    // ── Schedule ────────────────────────────────────────────────────────────

    async fn enriched_schedules(&self, now: DateTime<Utc>) -> Vec<EnrichedScheduledStream> {
        let snapshot = self.snapshots.current().await;
        schedule::enrich(&self.schedules.upcoming(now), &snapshot)
    }

    pub async fn schedule(&self, query: &str, sort: ScheduleSort, now: DateTime<Utc>) -> ScheduleView {
        let enriched = self.enriched_schedules(now).await;
        ScheduleView {
            stats: ScheduleStats::of(&enriched, now),
            entries: schedule::schedule_view(&enriched, query, sort, now),
        }
    }

    pub fn add_schedule(&self, mut new: NewSchedule, now: DateTime<Utc>) -> Result<ScheduledStream, DashboardError> {
        let entry = self
            .roster
            .find(&new.streamer_username)
            .ok_or_else(|| DashboardError::UnknownChannel(new.streamer_username.clone()))?;
        new.streamer_username = entry.username.clone();
        Ok(self.schedules.add(new, now)?)
    }

    pub fn delete_schedule(&self, id: &str, now: DateTime<Utc>) -> Result<(), DashboardError> {
        if self.schedules.delete(id, now)? {
            Ok(())
        } else {
            Err(DashboardError::UnknownSchedule(id.to_string()))
        }
    }

    // ── Favorites ───────────────────────────────────────────────────────────

    pub async fn favorites(&self, now: DateTime<Utc>) -> FavoritesView {
        let snapshot = self.snapshots.current().await;
        let enriched = self.enriched_schedules(now).await;
        let prefs = self.prefs.read().await;
        views::favorites_view(&snapshot, &enriched, prefs.favorites())
    }

    pub async fn toggle_favorite(&self, username: &str) -> Result<bool, DashboardError> {
        let entry = self
            .roster
            .find(username)
            .ok_or_else(|| DashboardError::UnknownChannel(username.to_string()))?;
        let now_favorite = self.prefs.write().await.toggle_favorite(&entry.username)?;
        debug!("[dashboard] favorite {} = {}", entry.username, now_favorite);
        Ok(now_favorite)
    }

    pub async fn clear_favorites(&self) -> Result<(), DashboardError> {
        Ok(self.prefs.write().await.clear_favorites()?)
    }

    // ── Notifications ───────────────────────────────────────────────────────

    pub async fn permission(&self) -> NotificationPermission {
        self.prefs.read().await.permission()
    }

    pub async fn notification_settings(&self) -> BTreeMap<String, bool> {
        self.prefs.read().await.notification_settings().clone()
    }

    pub async fn set_notification(&self, username: &str, enabled: bool) -> Result<(), DashboardError> {
        let entry = self
            .roster
            .find(username)
            .ok_or_else(|| DashboardError::UnknownChannel(username.to_string()))?;
        Ok(self
            .prefs
            .write()
            .await
            .set_notification(&entry.username, enabled)?)
    }

    pub async fn set_all_notifications(&self, enabled: bool) -> Result<(), DashboardError> {
        let usernames = self.roster.channels.iter().map(|c| c.username.as_str());
        Ok(self
            .prefs
            .write()
            .await
            .set_all_notifications(usernames, enabled)?)
    }

    pub async fn alerts(&self) -> Vec<LiveNotification> {
        self.alerts.active().await
    }

    pub async fn dismiss_alert(&self, tag: &str) -> bool {
        self.alerts.dismiss(tag).await
    }

    // ── Links ───────────────────────────────────────────────────────────────

    pub async fn multistream(&self, selection: &[String]) -> MultiStream {
        let snapshot = self.snapshots.current().await;
        let channels = views::resolve_selection(&snapshot, selection);
        let names: Vec<String> = channels.iter().map(|c| c.username.clone()).collect();
        MultiStream {
            link: views::multistream_link(&names),
            channels,
        }
    }

    pub async fn copy_links(
        &self,
        view: LinksView,
        filter: &ChannelFilter,
        now: DateTime<Utc>,
    ) -> Option<String> {
        match view {
            LinksView::Live => {
                let live = self.live_view(filter, SortMode::Status, now).await;
                views::live_links(&live.channels)
            }
            LinksView::Scheduled => {
                let enriched = self.enriched_schedules(now).await;
                views::scheduled_links(&ScheduleStats::of(&enriched, now))
            }
            LinksView::Favorites => views::favorite_links(&self.favorites(now).await),
        }
    }

    // ── Share board ─────────────────────────────────────────────────────────

    pub async fn board(&self) -> ShareBoard {
        self.board.read().await.clone()
    }

    pub async fn add_window(&self) -> Result<WindowData, DashboardError> {
        let snapshot = self.snapshots.current().await;
        let live: Vec<String> = snapshot
            .data
            .iter()
            .filter(|c| c.is_live)
            .map(|c| c.username.clone())
            .collect();
        let mut board = self.board.write().await;
        Ok(board.add_window(&live)?.clone())
    }

    pub async fn update_window(&self, id: &str, update: WindowUpdate) -> Result<(), DashboardError> {
        Ok(self.board.write().await.update(id, update)?)
    }

    pub async fn close_window(&self, id: &str) -> Result<(), DashboardError> {
        Ok(self.board.write().await.close(id)?)
    }

    pub async fn bring_to_front(&self, id: &str) -> Result<(), DashboardError> {
        Ok(self.board.write().await.bring_to_front(id)?)
    }

    pub async fn add_space(&self) {
        self.board.write().await.add_space();
    }

    /// Code for the current board. A blank name becomes a timestamped one.
    pub async fn encode_layout(&self, name: &str, expiry: Expiry, now: DateTime<Utc>) -> Result<String, DashboardError> {
        let name = match name.trim() {
            "" => format!("Layout @ {}", now.format("%H:%M:%S")),
            n => n.to_string(),
        };
        let layout = self.board.read().await.layout();
        Ok(layout::encode(&layout, &name, now, expiry.deadline(now))?)
    }

    /// Decode `code` and, when valid, replace the board with it.
    pub async fn apply_code(&self, code: &str, now: DateTime<Utc>) -> Result<DecodedLayout, DashboardError> {
        let decoded = layout::decode(code, now)?;
        self.board.write().await.apply_layout(decoded.layout.clone());
        info!(
            "[dashboard] applied layout {:?} ({} windows)",
            decoded.name,
            decoded.layout.windows.len()
        );
        Ok(decoded)
    }

    pub async fn saved_layouts(&self) -> Vec<SavedLayout> {
        self.prefs.read().await.saved_layouts().to_vec()
    }

    /// Save the current board under `name`. Saved codes never expire.
    pub async fn save_layout(&self, name: &str, now: DateTime<Utc>) -> Result<SavedLayout, DashboardError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(PrefsError::EmptyLayoutName.into());
        }
        let layout = self.board.read().await.layout();
        let code = layout::encode(&layout, trimmed, now, None)?;
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(5)
            .map(|c| char::from(c).to_ascii_lowercase())
            .collect();
        let id = format!("layout-{}-{}", now.timestamp_millis(), suffix);
        Ok(self.prefs.write().await.save_layout(id, trimmed, code)?)
    }

    pub async fn delete_layout(&self, id: &str) -> Result<(), DashboardError> {
        Ok(self.prefs.write().await.delete_layout(id)?)
    }

    // ── UI flags ────────────────────────────────────────────────────────────

    pub async fn ui_flags(&self) -> UiFlags {
        self.prefs.read().await.ui_flags().clone()
    }

    pub async fn dismiss_tutorial(&self) -> Result<(), DashboardError> {
        Ok(self.prefs.write().await.dismiss_tutorial()?)
    }

    pub async fn record_seen_version(&self, version: &str) -> Result<bool, DashboardError> {
        Ok(self.prefs.write().await.record_seen_version(version)?)
    }
}
