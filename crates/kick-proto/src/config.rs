use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use super::notify::NotificationPermission;
use super::platform;

/// Accepted range for `[polling] interval_secs`.
pub const INTERVAL_SECS_RANGE: (u64, u64) = (5, 86_400);
/// Accepted range for `[api] request_timeout_secs`.
pub const REQUEST_TIMEOUT_SECS_RANGE: (u64, u64) = (1, 300);
pub const MAX_REQUEST_DELAY_MS: u64 = 60_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub roster: RosterConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Upstream channel API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Optional relay prefix for the videos endpoint. The target URL is
    /// percent-encoded and appended, e.g. `https://corsproxy.io/?`.
    #[serde(default)]
    pub videos_relay: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Time between cycle starts.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Pause after each channel request.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub permission: NotificationPermission,
}

/// Where the channel roster lives.
/// Defaults to `$XDG_CONFIG_HOME/kickwatch/roster.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterConfig {
    #[serde(default = "default_roster_toml")]
    pub roster_toml: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Persisted snapshot, preferences and the log file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            videos_relay: None,
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            request_delay_ms: default_request_delay_ms(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            roster_toml: default_roster_toml(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_base_url() -> String {
    "https://kick.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("kickwatch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_interval_secs() -> u64 {
    120
}

fn default_request_delay_ms() -> u64 {
    250
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_roster_toml() -> PathBuf {
    platform::config_dir().join("roster.toml")
}

fn default_data_dir() -> PathBuf {
    platform::data_dir()
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::parse_toml_str(&content)
    }

    /// Parse a config file and clamp timing values into their usable range.
    pub fn parse_toml_str(content: &str) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.clamp_timings();
        Ok(config)
    }

    fn clamp_timings(&mut self) {
        let (lo, hi) = INTERVAL_SECS_RANGE;
        let interval = self.polling.interval_secs.clamp(lo, hi);
        if interval != self.polling.interval_secs {
            warn!(
                "[config] polling.interval_secs {} out of range, using {}",
                self.polling.interval_secs, interval
            );
            self.polling.interval_secs = interval;
        }

        let (lo, hi) = REQUEST_TIMEOUT_SECS_RANGE;
        let timeout = self.api.request_timeout_secs.clamp(lo, hi);
        if timeout != self.api.request_timeout_secs {
            warn!(
                "[config] api.request_timeout_secs {} out of range, using {}",
                self.api.request_timeout_secs, timeout
            );
            self.api.request_timeout_secs = timeout;
        }

        if self.polling.request_delay_ms > MAX_REQUEST_DELAY_MS {
            warn!(
                "[config] polling.request_delay_ms {} too large, using {}",
                self.polling.request_delay_ms, MAX_REQUEST_DELAY_MS
            );
            self.polling.request_delay_ms = MAX_REQUEST_DELAY_MS;
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    /// Upper bound for one sequential pass: every channel may issue a
    /// status request and a videos request, each up to the timeout.
    pub fn worst_case_cycle(&self, roster_len: usize) -> Duration {
        let per_channel = self
            .request_timeout()
            .saturating_mul(2)
            .saturating_add(self.polling.request_delay());
        per_channel.saturating_mul(u32::try_from(roster_len).unwrap_or(u32::MAX))
    }

    /// Whether the polling interval safely exceeds a full sequential cycle.
    pub fn interval_covers_cycle(&self, roster_len: usize) -> bool {
        self.polling.interval() > self.worst_case_cycle(roster_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.http.enabled);
        assert_eq!(config.http.port, 8990);
        assert_eq!(config.http.bind_address, "127.0.0.1");
        assert_eq!(config.api.base_url, "https://kick.com");
        assert!(config.api.videos_relay.is_none());
        assert_eq!(config.notifications.permission, NotificationPermission::Granted);
        assert!(config.roster.roster_toml.ends_with("kickwatch/roster.toml"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [polling]
            interval_secs = 30

            [notifications]
            permission = "denied"
            "#,
        )
        .unwrap();
        assert_eq!(config.polling.interval_secs, 30);
        assert_eq!(config.polling.request_delay_ms, 250);
        assert_eq!(config.notifications.permission, NotificationPermission::Denied);
        assert_eq!(config.http.port, 8990);
    }

    #[test]
    fn out_of_range_timings_are_clamped() {
        let config = Config::parse_toml_str(
            r#"
            [polling]
            interval_secs = 0
            request_delay_ms = 9223372036854775807

            [api]
            request_timeout_secs = 9223372036854775807
            "#,
        )
        .unwrap();
        assert_eq!(config.polling.interval_secs, INTERVAL_SECS_RANGE.0);
        assert_eq!(config.polling.request_delay_ms, MAX_REQUEST_DELAY_MS);
        assert_eq!(config.api.request_timeout_secs, REQUEST_TIMEOUT_SECS_RANGE.1);
        assert!(config.polling.interval() > Duration::ZERO);

        let sane = Config::parse_toml_str("[polling]\ninterval_secs = 30\n").unwrap();
        assert_eq!(sane.polling.interval_secs, 30);
    }

    #[test]
    fn worst_case_cycle_saturates() {
        let mut config = Config::default();
        config.api.request_timeout_secs = u64::MAX;
        assert_eq!(config.worst_case_cycle(usize::MAX), Duration::MAX);
    }

    #[test]
    fn worst_case_cycle_scales_with_roster() {
        let config = Config::default();
        // (10s * 2 + 250ms) per channel
        assert_eq!(config.worst_case_cycle(4), Duration::from_millis(81_000));
        assert!(config.interval_covers_cycle(5));
        assert!(!config.interval_covers_cycle(6));
    }
}
