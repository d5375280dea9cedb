//! Derived view models over a snapshot. Everything here is a pure function
//! of its inputs; "now" is always passed in.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use crate::model::{channel_url, Channel, EnrichedScheduledStream, FavoriteEntry, Snapshot};
use crate::roster::Roster;
use crate::schedule::ScheduleStats;

const INACTIVE_AFTER_DAYS: i64 = 7;
const MULTISTREAM_BASE: &str = "https://multikick.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Live first by viewers, then offline by most recent stream.
    #[default]
    Status,
    /// Longest-live first, then offline by most recent stream.
    LiveDurationDesc,
    ViewersDesc,
    /// Live counts as "now"; offline by last stream start.
    LastSeenDesc,
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status" => Ok(Self::Status),
            "live_duration_desc" => Ok(Self::LiveDurationDesc),
            "viewers_desc" => Ok(Self::ViewersDesc),
            "last_seen_desc" => Ok(Self::LastSeenDesc),
            other => Err(format!("unknown sort mode: {}", other)),
        }
    }
}

/// Millis of the last stream start; missing or unparseable counts as epoch.
fn last_stream_millis(c: &Channel) -> i64 {
    c.last_stream_at().map(|t| t.timestamp_millis()).unwrap_or(0)
}

fn viewers(c: &Channel) -> u64 {
    c.viewer_count.unwrap_or(0)
}

fn by_recency(a: &Channel, b: &Channel) -> Ordering {
    last_stream_millis(b).cmp(&last_stream_millis(a))
}

/// Stable sort; ties keep snapshot order.
pub fn sort_channels(channels: &[Channel], mode: SortMode, now: DateTime<Utc>) -> Vec<Channel> {
    let mut sorted = channels.to_vec();
    match mode {
        SortMode::Status | SortMode::ViewersDesc => sorted.sort_by(|a, b| {
            match (a.is_live, b.is_live) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (true, true) => viewers(b).cmp(&viewers(a)),
                (false, false) => by_recency(a, b),
            }
        }),
        SortMode::LiveDurationDesc => sorted.sort_by(|a, b| match (a.is_live, b.is_live) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (true, true) => {
                let since = |c: &Channel| {
                    c.live_since_at()
                        .map(|t| t.timestamp_millis())
                        .unwrap_or(i64::MAX)
                };
                since(a).cmp(&since(b))
            }
            (false, false) => by_recency(a, b),
        }),
        SortMode::LastSeenDesc => {
            let seen = |c: &Channel| {
                if c.is_live {
                    now.timestamp_millis()
                } else {
                    last_stream_millis(c)
                }
            };
            sorted.sort_by(|a, b| seen(b).cmp(&seen(a)));
        }
    }
    sorted
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelFilter {
    #[serde(default)]
    pub query: String,
    /// OR over tags; empty selects everything.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ChannelFilter {
    pub fn new(query: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            query: query.into(),
            tags,
        }
    }

    pub fn matches(&self, channel: &Channel) -> bool {
        if !self.tags.is_empty() && !channel.tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }

        let query = self.query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        if channel.username.to_lowercase().contains(&query) {
            return true;
        }
        if channel
            .first_character()
            .is_some_and(|c| c.to_lowercase().contains(&query))
        {
            return true;
        }
        channel.is_live
            && channel
                .live_title
                .as_deref()
                .is_some_and(|t| t.to_lowercase().contains(&query))
    }

    pub fn apply(&self, channels: &[Channel]) -> Vec<Channel> {
        channels.iter().filter(|c| self.matches(c)).cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCounts {
    pub live: usize,
    pub offline: usize,
    /// Offline with a parseable last stream older than a week.
    pub inactive: usize,
}

impl ChannelCounts {
    pub fn of(channels: &[Channel], now: DateTime<Utc>) -> Self {
        let cutoff = now - Duration::days(INACTIVE_AFTER_DAYS);
        let mut counts = Self::default();
        for c in channels {
            if c.is_live {
                counts.live += 1;
                continue;
            }
            counts.offline += 1;
            if c.last_stream_at().is_some_and(|t| t < cutoff) {
                counts.inactive += 1;
            }
        }
        counts
    }
}

/// Per tag, how many roster channels are present in the snapshot.
pub fn tag_counts(roster: &Roster, snapshot: &Snapshot) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for entry in &roster.channels {
        if snapshot.find(&entry.username).is_none() {
            continue;
        }
        for tag in &entry.tags {
            *counts.entry(tag.clone()).or_insert(0) += 1;
        }
    }
    counts
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveView {
    pub channels: Vec<Channel>,
    pub counts: ChannelCounts,
    pub tag_counts: BTreeMap<String, usize>,
    pub all_tags: Vec<String>,
    pub sort: SortMode,
    pub checked_at: DateTime<Utc>,
}

/// Sorted then filtered channel grid. Errored entries are kept.
pub fn live_view(
    roster: &Roster,
    snapshot: &Snapshot,
    filter: &ChannelFilter,
    sort: SortMode,
    now: DateTime<Utc>,
) -> LiveView {
    let sorted = sort_channels(&snapshot.data, sort, now);
    let channels = filter.apply(&sorted);
    LiveView {
        counts: ChannelCounts::of(&channels, now),
        channels,
        tag_counts: tag_counts(roster, snapshot),
        all_tags: roster.all_tags(),
        sort,
        checked_at: snapshot.checked_at,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoritesView {
    pub entries: Vec<FavoriteEntry>,
    pub live: usize,
    pub offline: usize,
}

/// Favorite channels plus favorite upcoming schedules, one entry per
/// username (a schedule wins over the plain channel), ordered live first,
/// then scheduled by start time, then offline by most recent stream.
pub fn favorites_view(
    snapshot: &Snapshot,
    schedules: &[EnrichedScheduledStream],
    favorites: &[String],
) -> FavoritesView {
    let is_fav = |username: &str| favorites.iter().any(|f| f == username);

    let fav_channels: Vec<&Channel> = snapshot.data.iter().filter(|c| is_fav(&c.username)).collect();

    let mut scheduled_names = HashSet::new();
    let fav_schedules: Vec<&EnrichedScheduledStream> = schedules
        .iter()
        .filter(|s| is_fav(&s.streamer.username))
        .filter(|s| scheduled_names.insert(s.streamer.username.to_lowercase()))
        .collect();

    let live = fav_channels.iter().filter(|c| c.is_live).count();
    let offline = fav_channels.iter().filter(|c| !c.is_live).count() + fav_schedules.len();

    let mut entries: Vec<FavoriteEntry> = fav_channels
        .into_iter()
        .filter(|c| !scheduled_names.contains(&c.username.to_lowercase()))
        .map(|c| FavoriteEntry::Channel(c.clone()))
        .chain(
            fav_schedules
                .into_iter()
                .map(|s| FavoriteEntry::Scheduled(s.clone())),
        )
        .collect();
    entries.sort_by(compare_favorites);

    FavoritesView {
        entries,
        live,
        offline,
    }
}

fn compare_favorites(a: &FavoriteEntry, b: &FavoriteEntry) -> Ordering {
    let (ca, cb) = (a.channel(), b.channel());
    match (ca.is_live, cb.is_live) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (true, true) => return viewers(cb).cmp(&viewers(ca)),
        (false, false) => {}
    }
    match (a, b) {
        (FavoriteEntry::Scheduled(sa), FavoriteEntry::Scheduled(sb)) => {
            sa.schedule.start_time.cmp(&sb.schedule.start_time)
        }
        (FavoriteEntry::Scheduled(_), FavoriteEntry::Channel(_)) => Ordering::Less,
        (FavoriteEntry::Channel(_), FavoriteEntry::Scheduled(_)) => Ordering::Greater,
        (FavoriteEntry::Channel(_), FavoriteEntry::Channel(_)) => by_recency(ca, cb),
    }
}

/// Selected channels in selection order, matched case-insensitively;
/// unknown usernames are dropped.
pub fn resolve_selection(snapshot: &Snapshot, selection: &[String]) -> Vec<Channel> {
    selection
        .iter()
        .filter_map(|u| snapshot.find(u).cloned())
        .collect()
}

pub fn multistream_link(selection: &[String]) -> Option<String> {
    if selection.is_empty() {
        return None;
    }
    Some(format!("{}/{}", MULTISTREAM_BASE, selection.join("/")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinksView {
    #[default]
    Live,
    Scheduled,
    Favorites,
}

impl FromStr for LinksView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(Self::Live),
            "scheduled" => Ok(Self::Scheduled),
            "favorites" => Ok(Self::Favorites),
            other => Err(format!("unknown view: {}", other)),
        }
    }
}

/// Newline-joined links for the grid of the live view: live URLs when
/// anything in the filtered set is live, profile URLs otherwise.
pub fn live_links(filtered: &[Channel]) -> Option<String> {
    let live: Vec<String> = filtered
        .iter()
        .filter(|c| c.is_live)
        .map(|c| c.live_url.clone().unwrap_or_else(|| channel_url(&c.username)))
        .collect();
    if !live.is_empty() {
        return join_links(live);
    }
    join_links(filtered.iter().map(|c| c.profile_url.clone()).collect())
}

pub fn scheduled_links(stats: &ScheduleStats) -> Option<String> {
    join_links(stats.live_soon_links.clone())
}

pub fn favorite_links(view: &FavoritesView) -> Option<String> {
    join_links(
        view.entries
            .iter()
            .map(|e| e.channel().profile_url.clone())
            .collect(),
    )
}

fn join_links(links: Vec<String>) -> Option<String> {
    let links: Vec<String> = links.into_iter().filter(|l| !l.is_empty()).collect();
    (!links.is_empty()).then(|| links.join("\n"))
}
