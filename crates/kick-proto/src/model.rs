use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::roster::RosterEntry;

/// Avatar shown when the platform returns none.
pub const DEFAULT_PROFILE_PIC: &str = "https://i.postimg.cc/QNW4B8KQ/00WZrbng.png";

/// Public profile / watch page for a username.
pub fn channel_url(username: &str) -> String {
    format!("https://kick.com/{}", username)
}

/// One roster member: static roster metadata plus the latest known status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub username: String,
    pub display_name: String,
    pub profile_pic: Option<String>,
    pub is_live: bool,
    pub live_title: Option<String>,
    pub viewer_count: Option<u64>,
    /// ISO-8601 start of the current stream.
    pub live_since: Option<String>,
    /// ISO-8601 start of the most recent stream while offline.
    pub last_stream_start_time: Option<String>,
    pub live_url: Option<String>,
    pub profile_url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free text, `|`-separated when a streamer plays several characters.
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub followers_count: Option<u64>,
    #[serde(default)]
    pub banner_image: Option<String>,
    #[serde(default)]
    pub live_category: Option<String>,
    #[serde(default)]
    pub social_links: BTreeMap<String, String>,
    /// No result has arrived for this channel in the running cycle.
    #[serde(default)]
    pub is_loading: bool,
    /// The last fetch attempt failed; the other fields are stale.
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub last_checked_at: Option<String>,
    /// Time of the last successful fetch. `None` until the first one.
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Channel {
    /// Entry for a roster member whose status has never been fetched.
    pub fn placeholder(entry: &RosterEntry) -> Self {
        Self {
            username: entry.username.clone(),
            display_name: entry.username.clone(),
            profile_pic: Some(DEFAULT_PROFILE_PIC.to_string()),
            is_live: false,
            live_title: None,
            viewer_count: None,
            live_since: None,
            last_stream_start_time: None,
            live_url: Some(channel_url(&entry.username)),
            profile_url: channel_url(&entry.username),
            tags: entry.tags.clone(),
            character: entry.character.clone(),
            bio: None,
            followers_count: None,
            banner_image: None,
            live_category: None,
            social_links: BTreeMap::new(),
            is_loading: true,
            error: false,
            last_checked_at: None,
            last_synced_at: None,
        }
    }

    /// Build the merged entry from a fresh status record.
    pub fn from_status(entry: &RosterEntry, status: ChannelStatus, now: DateTime<Utc>) -> Self {
        Self {
            username: entry.username.clone(),
            display_name: entry.username.clone(),
            profile_pic: Some(
                status
                    .profile_pic
                    .unwrap_or_else(|| DEFAULT_PROFILE_PIC.to_string()),
            ),
            is_live: status.is_live,
            live_title: status.live_title,
            viewer_count: status.viewer_count,
            live_since: status.live_since,
            last_stream_start_time: status.last_stream_start_time,
            live_url: Some(channel_url(&entry.username)),
            profile_url: channel_url(&entry.username),
            tags: entry.tags.clone(),
            character: entry.character.clone(),
            bio: status.bio,
            followers_count: status.followers_count,
            banner_image: status.banner_image,
            live_category: status.live_category,
            social_links: status.social_links,
            is_loading: false,
            error: false,
            last_checked_at: Some(now.to_rfc3339()),
            last_synced_at: Some(now),
        }
    }

    /// Flag a failed attempt, keeping every previously known field.
    pub fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.error = true;
        self.is_loading = false;
        self.last_checked_at = Some(now.to_rfc3339());
    }

    pub fn matches_username(&self, username: &str) -> bool {
        self.username.eq_ignore_ascii_case(username)
    }

    /// First segment of the pipe-separated character label.
    pub fn first_character(&self) -> Option<&str> {
        self.character
            .as_deref()
            .and_then(|c| c.split('|').next())
            .map(str::trim)
    }

    pub fn live_since_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.live_since.as_deref())
    }

    pub fn last_stream_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.last_stream_start_time.as_deref())
    }
}

/// Parse an ISO-8601 timestamp as sent by the platform. Accepts RFC 3339
/// and the space-separated `YYYY-MM-DD HH:MM:SS` form (read as UTC).
pub fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Normalized result of one successful status request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub profile_pic: Option<String>,
    pub is_live: bool,
    pub live_title: Option<String>,
    pub viewer_count: Option<u64>,
    pub live_since: Option<String>,
    pub last_stream_start_time: Option<String>,
    pub bio: Option<String>,
    pub followers_count: Option<u64>,
    pub banner_image: Option<String>,
    pub live_category: Option<String>,
    #[serde(default)]
    pub social_links: BTreeMap<String, String>,
}

/// Checked-at time plus the full channel list. Never mutated in place;
/// every merge produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub checked_at: DateTime<Utc>,
    pub data: Vec<Channel>,
}

impl Snapshot {
    pub fn new(checked_at: DateTime<Utc>, data: Vec<Channel>) -> Self {
        Self { checked_at, data }
    }

    pub fn find(&self, username: &str) -> Option<&Channel> {
        self.data.iter().find(|c| c.matches_username(username))
    }

    /// Copy of this snapshot with the entry for `channel.username`
    /// replaced. All other entries are carried over untouched.
    pub fn with_channel(&self, channel: Channel, checked_at: DateTime<Utc>) -> Self {
        let data = self
            .data
            .iter()
            .map(|existing| {
                if existing.matches_username(&channel.username) {
                    channel.clone()
                } else {
                    existing.clone()
                }
            })
            .collect();
        Self { checked_at, data }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledStream {
    pub id: String,
    pub streamer_username: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub characters: Vec<String>,
}

/// A schedule joined with the streamer's current channel record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedScheduledStream {
    #[serde(flatten)]
    pub schedule: ScheduledStream,
    pub streamer: Channel,
}

/// An item of the favorites view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FavoriteEntry {
    Channel(Channel),
    Scheduled(EnrichedScheduledStream),
}

impl FavoriteEntry {
    pub fn channel(&self) -> &Channel {
        match self {
            Self::Channel(c) => c,
            Self::Scheduled(s) => &s.streamer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> RosterEntry {
        RosterEntry {
            username: name.to_string(),
            tags: vec!["police".to_string()],
            character: Some("Agent Hunter | Doc".to_string()),
        }
    }

    #[test]
    fn placeholder_is_loading_with_roster_metadata() {
        let c = Channel::placeholder(&entry("Zeeyadx"));
        assert!(c.is_loading);
        assert!(!c.error);
        assert!(c.last_synced_at.is_none());
        assert_eq!(c.profile_url, "https://kick.com/Zeeyadx");
        assert_eq!(c.tags, vec!["police"]);
        assert_eq!(c.first_character(), Some("Agent Hunter"));
    }

    #[test]
    fn mark_failed_keeps_known_fields() {
        let now = Utc::now();
        let mut c = Channel::from_status(
            &entry("sxb"),
            ChannelStatus {
                is_live: true,
                viewer_count: Some(42),
                live_title: Some("rp".to_string()),
                ..Default::default()
            },
            now,
        );
        c.mark_failed(now);
        assert!(c.error);
        assert!(!c.is_loading);
        assert!(c.is_live);
        assert_eq!(c.viewer_count, Some(42));
    }

    #[test]
    fn with_channel_matches_case_insensitively() {
        let now = Utc::now();
        let snap = Snapshot::new(
            now,
            vec![Channel::placeholder(&entry("SXB")), Channel::placeholder(&entry("Vilon"))],
        );
        let updated = Channel::from_status(&entry("sxb"), ChannelStatus::default(), now);
        let next = snap.with_channel(updated.clone(), now);
        assert_eq!(next.data[0], updated);
        assert_eq!(next.data[1], snap.data[1]);
    }

    #[test]
    fn parses_both_timestamp_shapes() {
        assert!(parse_timestamp(Some("2025-11-09T21:00:00Z")).is_some());
        assert!(parse_timestamp(Some("2025-11-09 21:00:00")).is_some());
        assert!(parse_timestamp(Some("yesterday")).is_none());
        assert!(parse_timestamp(None).is_none());
    }

    #[test]
    fn favorite_entry_carries_discriminant() {
        let c = Channel::placeholder(&entry("sxb"));
        let json = serde_json::to_value(FavoriteEntry::Channel(c)).unwrap();
        assert_eq!(json["kind"], "channel");
    }
}
