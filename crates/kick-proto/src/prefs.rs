//! User preferences persisted through [`JsonStore`]: favorites,
//! per-channel notification opt-in, saved layout codes and one-shot UI
//! flags. Every mutation writes through immediately.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::notify::NotificationPermission;
use crate::persist::{
    JsonStore, KEY_FAVORITES, KEY_NOTIFICATIONS, KEY_SAVED_LAYOUTS, KEY_UI_FLAGS,
};

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("notification permission is not granted")]
    PermissionNotGranted,
    #[error("layout name must not be empty")]
    EmptyLayoutName,
    #[error("no saved layout with id {0}")]
    UnknownLayout(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedLayout {
    pub id: String,
    pub name: String,
    /// Opaque share code, see [`crate::layout`].
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiFlags {
    #[serde(default)]
    pub tutorial_dismissed: bool,
    #[serde(default)]
    pub last_seen_version: Option<String>,
}

pub struct Preferences {
    store: JsonStore,
    permission: NotificationPermission,
    favorites: Vec<String>,
    notifications: BTreeMap<String, bool>,
    saved_layouts: Vec<SavedLayout>,
    ui_flags: UiFlags,
}

impl Preferences {
    pub fn load(store: JsonStore, permission: NotificationPermission) -> Self {
        Self {
            favorites: store.load(KEY_FAVORITES),
            notifications: store.load(KEY_NOTIFICATIONS),
            saved_layouts: store.load(KEY_SAVED_LAYOUTS),
            ui_flags: store.load(KEY_UI_FLAGS),
            store,
            permission,
        }
    }

    pub fn permission(&self) -> NotificationPermission {
        self.permission
    }

    // ── Favorites ───────────────────────────────────────────────────────────

    pub fn favorites(&self) -> &[String] {
        &self.favorites
    }

    pub fn is_favorite(&self, username: &str) -> bool {
        self.favorites.iter().any(|f| f == username)
    }

    pub fn has_favorites(&self) -> bool {
        !self.favorites.is_empty()
    }

    /// Returns whether `username` is a favorite afterwards.
    pub fn toggle_favorite(&mut self, username: &str) -> Result<bool, PrefsError> {
        let now_favorite = if self.is_favorite(username) {
            self.favorites.retain(|f| f != username);
            false
        } else {
            self.favorites.push(username.to_string());
            true
        };
        self.store.save(KEY_FAVORITES, &self.favorites)?;
        Ok(now_favorite)
    }

    pub fn clear_favorites(&mut self) -> Result<(), PrefsError> {
        self.favorites.clear();
        self.store.save(KEY_FAVORITES, &self.favorites)?;
        Ok(())
    }

    // ── Notifications ───────────────────────────────────────────────────────

    pub fn notification_settings(&self) -> &BTreeMap<String, bool> {
        &self.notifications
    }

    pub fn notifications_enabled(&self, username: &str) -> bool {
        self.notifications.get(username).copied().unwrap_or(false)
    }

    pub fn any_notifications_enabled(&self) -> bool {
        self.notifications.values().any(|v| *v)
    }

    /// Enabling requires a granted permission; disabling always works.
    pub fn set_notification(&mut self, username: &str, enabled: bool) -> Result<(), PrefsError> {
        if enabled && !self.permission.is_granted() {
            return Err(PrefsError::PermissionNotGranted);
        }
        self.notifications.insert(username.to_string(), enabled);
        self.store.save(KEY_NOTIFICATIONS, &self.notifications)?;
        Ok(())
    }

    pub fn set_all_notifications<'a>(
        &mut self,
        usernames: impl IntoIterator<Item = &'a str>,
        enabled: bool,
    ) -> Result<(), PrefsError> {
        if enabled && !self.permission.is_granted() {
            return Err(PrefsError::PermissionNotGranted);
        }
        for username in usernames {
            self.notifications.insert(username.to_string(), enabled);
        }
        self.store.save(KEY_NOTIFICATIONS, &self.notifications)?;
        Ok(())
    }

    // ── Saved layouts ───────────────────────────────────────────────────────

    pub fn saved_layouts(&self) -> &[SavedLayout] {
        &self.saved_layouts
    }

    pub fn save_layout(&mut self, id: String, name: &str, code: String) -> Result<SavedLayout, PrefsError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PrefsError::EmptyLayoutName);
        }
        let layout = SavedLayout {
            id,
            name: name.to_string(),
            code,
        };
        self.saved_layouts.push(layout.clone());
        self.store.save(KEY_SAVED_LAYOUTS, &self.saved_layouts)?;
        Ok(layout)
    }

    pub fn delete_layout(&mut self, id: &str) -> Result<(), PrefsError> {
        let before = self.saved_layouts.len();
        self.saved_layouts.retain(|l| l.id != id);
        if self.saved_layouts.len() == before {
            return Err(PrefsError::UnknownLayout(id.to_string()));
        }
        self.store.save(KEY_SAVED_LAYOUTS, &self.saved_layouts)?;
        Ok(())
    }

    // ── UI flags ────────────────────────────────────────────────────────────

    pub fn ui_flags(&self) -> &UiFlags {
        &self.ui_flags
    }

    pub fn dismiss_tutorial(&mut self) -> Result<(), PrefsError> {
        if !self.ui_flags.tutorial_dismissed {
            self.ui_flags.tutorial_dismissed = true;
            self.store.save(KEY_UI_FLAGS, &self.ui_flags)?;
        }
        Ok(())
    }

    /// Record the running version. Returns true when it differs from the
    /// last one seen (i.e. "what's new" should be shown).
    pub fn record_seen_version(&mut self, version: &str) -> Result<bool, PrefsError> {
        if self.ui_flags.last_seen_version.as_deref() == Some(version) {
            return Ok(false);
        }
        self.ui_flags.last_seen_version = Some(version.to_string());
        self.store.save(KEY_UI_FLAGS, &self.ui_flags)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs(dir: &tempfile::TempDir, permission: NotificationPermission) -> Preferences {
        Preferences::load(JsonStore::new(dir.path()), permission)
    }

    #[test]
    fn favorites_toggle_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = prefs(&dir, NotificationPermission::Granted);
        assert!(!p.has_favorites());
        assert!(p.toggle_favorite("SXB").unwrap());
        assert!(p.toggle_favorite("Vilon").unwrap());
        assert!(!p.toggle_favorite("SXB").unwrap());

        let reloaded = prefs(&dir, NotificationPermission::Granted);
        assert_eq!(reloaded.favorites().to_vec(), vec!["Vilon".to_string()]);

        let mut p = reloaded;
        p.clear_favorites().unwrap();
        assert!(!prefs(&dir, NotificationPermission::Granted).has_favorites());
    }

    #[test]
    fn enabling_notifications_needs_permission() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = prefs(&dir, NotificationPermission::Default);
        assert!(matches!(
            p.set_notification("SXB", true),
            Err(PrefsError::PermissionNotGranted)
        ));
        p.set_notification("SXB", false).unwrap();
        assert!(!p.any_notifications_enabled());

        let mut p = prefs(&dir, NotificationPermission::Granted);
        p.set_all_notifications(["SXB", "Vilon"], true).unwrap();
        assert!(p.notifications_enabled("SXB"));
        assert!(p.notifications_enabled("Vilon"));
        assert!(!p.notifications_enabled("Zeeyadx"));
        assert!(prefs(&dir, NotificationPermission::Granted).any_notifications_enabled());
    }

    #[test]
    fn saved_layouts_require_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = prefs(&dir, NotificationPermission::Granted);
        assert!(matches!(
            p.save_layout("layout-1".into(), "  ", "code".into()),
            Err(PrefsError::EmptyLayoutName)
        ));
        p.save_layout("layout-1".into(), " Raid night ", "code".into())
            .unwrap();
        assert_eq!(p.saved_layouts()[0].name, "Raid night");
        assert!(matches!(
            p.delete_layout("missing"),
            Err(PrefsError::UnknownLayout(_))
        ));
        p.delete_layout("layout-1").unwrap();
        assert!(prefs(&dir, NotificationPermission::Granted)
            .saved_layouts()
            .is_empty());
    }

    #[test]
    fn seen_version_reports_change_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = prefs(&dir, NotificationPermission::Granted);
        assert!(p.record_seen_version("0.1.0").unwrap());
        assert!(!p.record_seen_version("0.1.0").unwrap());
        p.dismiss_tutorial().unwrap();
        let reloaded = prefs(&dir, NotificationPermission::Granted);
        assert!(reloaded.ui_flags().tutorial_dismissed);
        assert_eq!(reloaded.ui_flags().last_seen_version.as_deref(), Some("0.1.0"));
    }
}
