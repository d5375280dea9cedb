//! On-disk JSON blobs under well-known keys, one `<key>.json` per key.
//!
//! Reads never fail: a missing key yields the default, a malformed one is
//! removed and replaced by the default. Writes are last-write-wins.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const KEY_LAST_SNAPSHOT: &str = "last_snapshot";
pub const KEY_NOTIFICATIONS: &str = "streamer_notifications";
pub const KEY_FAVORITES: &str = "favorite_streamers";
pub const KEY_SCHEDULES: &str = "scheduled_streams";
pub const KEY_SAVED_LAYOUTS: &str = "saved_layouts";
pub const KEY_UI_FLAGS: &str = "ui_flags";

#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Read `key`, or `None` when absent or unreadable.
    pub fn load_opt<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("[store] failed to read {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<T>(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("[store] malformed {} ({}), clearing key", key, e);
                self.remove(key);
                None
            }
        }
    }

    pub fn load<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.load_opt(key).unwrap_or_default()
    }

    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(self.path_for(key), json)?;
        debug!("[store] wrote {}", key);
        Ok(())
    }

    pub fn remove(&self, key: &str) {
        let path = self.path_for(key);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("[store] failed to remove {}: {}", path.display(), e);
            }
        }
    }
}
