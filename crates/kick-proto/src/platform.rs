//! Where kickwatch keeps its files.
//!
//! Unix hosts (macOS included) get the XDG layout: snapshots and prefs
//! under `~/.local/share/kickwatch`, `config.toml` under
//! `~/.config/kickwatch`. Windows uses the per-user app dirs unless the
//! executable sits next to a `data/` dir or a `config.toml`.

use std::path::PathBuf;

const APP_DIR: &str = "kickwatch";

/// Directory holding the executable, if `marker` exists inside it.
#[cfg(windows)]
fn beside_exe(marker: &str) -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let dir = exe.parent()?;
    dir.join(marker).exists().then(|| dir.to_path_buf())
}

pub fn data_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        if let Some(dir) = beside_exe("data") {
            return dir.join("data");
        }
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        if let Some(dir) = beside_exe("config.toml") {
            return dir;
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}
