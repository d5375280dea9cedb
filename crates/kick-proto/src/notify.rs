//! Live-transition notifications.
//!
//! The fetcher reports every not-live → live edge to a [`Notifier`].
//! [`LiveNotifier`] gates those reports on the global permission and the
//! per-channel opt-in, then hands a [`LiveNotification`] to a sink.
//! [`NotificationCenter`] is the in-process sink: one active notification
//! per username, a newer one replaces the older.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::model::{Channel, DEFAULT_PROFILE_PIC};
use crate::prefs::Preferences;

/// Global permission to show notifications at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    #[default]
    Granted,
    Denied,
    /// Not decided yet; treated as not granted.
    Default,
}

impl NotificationPermission {
    pub fn is_granted(self) -> bool {
        self == Self::Granted
    }
}

/// Receives "went live" edges from the fetcher.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn went_live(&self, channel: &Channel);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveNotification {
    /// Username; a second notification with the same tag replaces the first.
    pub tag: String,
    pub title: String,
    pub body: String,
    pub icon: String,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LiveNotification {
    pub fn for_channel(channel: &Channel, now: DateTime<Utc>) -> Self {
        let body = channel
            .live_title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("{} is now live", channel.display_name));
        Self {
            tag: channel.username.clone(),
            title: channel.display_name.clone(),
            body,
            icon: channel
                .profile_pic
                .clone()
                .unwrap_or_else(|| DEFAULT_PROFILE_PIC.to_string()),
            url: channel.live_url.clone(),
            created_at: now,
        }
    }
}

/// Where notifications are displayed.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn show(&self, notification: LiveNotification);
}

#[derive(Default)]
pub struct NotificationCenter {
    active: RwLock<HashMap<String, LiveNotification>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active notifications, newest first.
    pub async fn active(&self) -> Vec<LiveNotification> {
        let mut list: Vec<_> = self.active.read().await.values().cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    pub async fn dismiss(&self, tag: &str) -> bool {
        self.active.write().await.remove(tag).is_some()
    }
}

#[async_trait]
impl NotificationSink for NotificationCenter {
    async fn show(&self, notification: LiveNotification) {
        info!(
            "[notify] {} is live: {}",
            notification.title, notification.body
        );
        self.active
            .write()
            .await
            .insert(notification.tag.clone(), notification);
    }
}

pub struct LiveNotifier {
    prefs: Arc<RwLock<Preferences>>,
    sink: Arc<dyn NotificationSink>,
}

impl LiveNotifier {
    pub fn new(prefs: Arc<RwLock<Preferences>>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { prefs, sink }
    }
}

#[async_trait]
impl Notifier for LiveNotifier {
    async fn went_live(&self, channel: &Channel) {
        let allowed = {
            let prefs = self.prefs.read().await;
            prefs.permission().is_granted() && prefs.notifications_enabled(&channel.username)
        };
        if !allowed {
            debug!("[notify] {} went live, notifications off", channel.username);
            return;
        }
        self.sink
            .show(LiveNotification::for_channel(channel, Utc::now()))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::JsonStore;
    use crate::roster::RosterEntry;

    fn live_channel(name: &str, title: Option<&str>) -> Channel {
        let mut c = Channel::placeholder(&RosterEntry {
            username: name.to_string(),
            tags: vec![],
            character: None,
        });
        c.is_live = true;
        c.live_title = title.map(str::to_string);
        c
    }

    #[test]
    fn body_falls_back_to_name() {
        let n = LiveNotification::for_channel(&live_channel("SXB", None), Utc::now());
        assert_eq!(n.body, "SXB is now live");
        assert_eq!(n.tag, "SXB");
        let n = LiveNotification::for_channel(&live_channel("SXB", Some("MTRP")), Utc::now());
        assert_eq!(n.body, "MTRP");
    }

    #[tokio::test]
    async fn same_tag_replaces() {
        let center = NotificationCenter::new();
        center
            .show(LiveNotification::for_channel(&live_channel("SXB", Some("a")), Utc::now()))
            .await;
        center
            .show(LiveNotification::for_channel(&live_channel("SXB", Some("b")), Utc::now()))
            .await;
        let active = center.active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].body, "b");
        assert!(center.dismiss("SXB").await);
        assert!(center.active().await.is_empty());
    }

    #[tokio::test]
    async fn gated_on_permission_and_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let mut prefs = Preferences::load(store.clone(), NotificationPermission::Granted);
        prefs.set_notification("SXB", true).unwrap();
        let prefs = Arc::new(RwLock::new(prefs));
        let center = Arc::new(NotificationCenter::new());
        let notifier = LiveNotifier::new(prefs.clone(), center.clone());

        notifier.went_live(&live_channel("Vilon", None)).await;
        assert!(center.active().await.is_empty());

        notifier.went_live(&live_channel("SXB", None)).await;
        assert_eq!(center.active().await.len(), 1);

        let denied = Arc::new(RwLock::new(Preferences::load(
            store,
            NotificationPermission::Denied,
        )));
        let center = Arc::new(NotificationCenter::new());
        let notifier = LiveNotifier::new(denied, center.clone());
        notifier.went_live(&live_channel("SXB", None)).await;
        assert!(center.active().await.is_empty());
    }
}
