use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::model::{Channel, Snapshot};
use crate::persist::{JsonStore, KEY_LAST_SNAPSHOT};
use crate::roster::Roster;

/// Current snapshot behind a single swap point.
///
/// Readers clone the `Arc` and never observe a half-merged list; the
/// fetcher is the only writer and replaces the whole value on each merge.
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
    rev: AtomicU64,
    store: JsonStore,
}

impl SnapshotStore {
    pub fn new(store: JsonStore, initial: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            rev: AtomicU64::new(1),
            store,
        }
    }

    /// Pre-populate from the cached snapshot so the first response does
    /// not start from a blank list.
    pub fn load(store: JsonStore, roster: &Roster) -> Self {
        let cached = store.load_opt::<Snapshot>(KEY_LAST_SNAPSHOT);
        match &cached {
            Some(s) => info!("[snapshot] restored {} cached entries", s.data.len()),
            None => info!("[snapshot] no cached snapshot, starting from roster"),
        }
        let initial = reconcile(cached, roster, Utc::now());
        Self::new(store, initial)
    }

    pub async fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.current.read().await)
    }

    pub fn rev(&self) -> u64 {
        self.rev.load(Ordering::SeqCst)
    }

    pub async fn replace(&self, next: Snapshot) -> Arc<Snapshot> {
        self.apply(|_| next).await
    }

    /// Compute the next snapshot from the current one and swap it in
    /// while holding the write lock.
    pub async fn apply<F>(&self, f: F) -> Arc<Snapshot>
    where
        F: FnOnce(&Snapshot) -> Snapshot,
    {
        let mut guard = self.current.write().await;
        let next = Arc::new(f(&guard));
        *guard = Arc::clone(&next);
        self.rev.fetch_add(1, Ordering::SeqCst);
        next
    }

    /// Write-through of the given snapshot under `last_snapshot`.
    pub fn persist(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        self.store.save(KEY_LAST_SNAPSHOT, snapshot)?;
        debug!("[snapshot] persisted {} entries", snapshot.data.len());
        Ok(())
    }
}

/// One entry per roster username, in roster order. Cached entries keep
/// their last known status with roster tags/character re-applied; unknown
/// cached usernames are dropped and missing ones become placeholders.
pub fn reconcile(cached: Option<Snapshot>, roster: &Roster, now: DateTime<Utc>) -> Snapshot {
    let (checked_at, mut cached_data) = match cached {
        Some(s) => (s.checked_at, s.data),
        None => (now, Vec::new()),
    };

    let data = roster
        .channels
        .iter()
        .map(|entry| {
            let pos = cached_data
                .iter()
                .position(|c| c.matches_username(&entry.username));
            match pos {
                Some(i) => {
                    let mut c: Channel = cached_data.swap_remove(i);
                    c.username = entry.username.clone();
                    c.display_name = entry.username.clone();
                    c.tags = entry.tags.clone();
                    c.character = entry.character.clone();
                    c.is_loading = false;
                    // A cached entry is stale; the first fetch after restart
                    // must not count as a transition.
                    c.last_synced_at = None;
                    c
                }
                None => Channel::placeholder(entry),
            }
        })
        .collect();

    Snapshot::new(checked_at, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChannelStatus;
    use crate::roster::RosterEntry;

    fn entry(name: &str, tags: &[&str]) -> RosterEntry {
        RosterEntry {
            username: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            character: None,
        }
    }

    #[test]
    fn reconcile_matches_roster() {
        let now = Utc::now();
        let roster = Roster::new(vec![entry("SXB", &["police"]), entry("Vilon", &[])]);
        let cached = Snapshot::new(
            now,
            vec![
                Channel::from_status(
                    &entry("sxb", &[]),
                    ChannelStatus {
                        is_live: true,
                        viewer_count: Some(7),
                        ..Default::default()
                    },
                    now,
                ),
                Channel::placeholder(&entry("Removed", &[])),
            ],
        );

        let snap = reconcile(Some(cached), &roster, now);
        assert_eq!(snap.data.len(), 2);
        assert_eq!(snap.data[0].username, "SXB");
        assert_eq!(snap.data[0].viewer_count, Some(7));
        assert_eq!(snap.data[0].tags, vec!["police"]);
        assert!(snap.data[0].last_synced_at.is_none());
        assert!(snap.data[1].is_loading);
        assert!(snap.find("Removed").is_none());
    }

    #[tokio::test]
    async fn replace_bumps_rev_and_swaps() {
        let dir = tempfile::tempdir().unwrap();
        let roster = Roster::new(vec![entry("SXB", &[])]);
        let store = SnapshotStore::load(JsonStore::new(dir.path()), &roster);
        let before = store.current().await;
        let rev = store.rev();

        let next = store
            .apply(|s| {
                let mut c = s.data[0].clone();
                c.is_live = true;
                s.with_channel(c, Utc::now())
            })
            .await;
        store.persist(&next).unwrap();

        assert!(!before.data[0].is_live);
        assert!(store.current().await.data[0].is_live);
        assert_eq!(store.rev(), rev + 1);

        let reloaded = SnapshotStore::load(JsonStore::new(dir.path()), &roster);
        assert!(reloaded.current().await.data[0].is_live);
    }
}
