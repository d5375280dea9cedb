//! Upcoming scheduled streams: seeded entries from the roster file plus
//! user-added ones persisted under `scheduled_streams`.

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use crate::model::{EnrichedScheduledStream, ScheduledStream, Snapshot};
use crate::persist::{JsonStore, KEY_SCHEDULES};

/// Schedules starting within this window are "live soon".
pub const LIVE_SOON_MINUTES: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSchedule {
    pub streamer_username: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub characters: Vec<String>,
}

pub struct ScheduleStore {
    store: JsonStore,
    seeded: Vec<ScheduledStream>,
}

impl ScheduleStore {
    pub fn new(store: JsonStore, seeded: Vec<ScheduledStream>) -> Self {
        Self { store, seeded }
    }

    /// Persisted user entries still in the future, soonest first.
    pub fn user_entries(&self, now: DateTime<Utc>) -> Vec<ScheduledStream> {
        let stored: Vec<ScheduledStream> = self.store.load(KEY_SCHEDULES);
        upcoming(&stored, now)
    }

    /// Seeded plus user entries starting strictly after `now`, soonest first.
    pub fn upcoming(&self, now: DateTime<Utc>) -> Vec<ScheduledStream> {
        let mut all = self.seeded.clone();
        all.extend(self.user_entries(now));
        upcoming(&all, now)
    }

    pub fn add(&self, new: NewSchedule, now: DateTime<Utc>) -> anyhow::Result<ScheduledStream> {
        let entry = ScheduledStream {
            id: generate_id(now),
            streamer_username: new.streamer_username,
            start_time: new.start_time,
            notes: new.notes,
            characters: new.characters,
        };
        let mut entries = self.user_entries(now);
        entries.push(entry.clone());
        entries.sort_by_key(|s| s.start_time);
        self.store.save(KEY_SCHEDULES, &entries)?;
        debug!("[schedule] added {} for {}", entry.id, entry.streamer_username);
        Ok(entry)
    }

    /// Returns whether a user entry with `id` existed. Seeded entries are
    /// read-only.
    pub fn delete(&self, id: &str, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let mut entries = self.user_entries(now);
        let before = entries.len();
        entries.retain(|s| s.id != id);
        self.store.save(KEY_SCHEDULES, &entries)?;
        Ok(entries.len() != before)
    }
}

fn generate_id(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{}{}", now.to_rfc3339(), suffix)
}

pub fn upcoming(schedules: &[ScheduledStream], now: DateTime<Utc>) -> Vec<ScheduledStream> {
    let mut list: Vec<_> = schedules
        .iter()
        .filter(|s| s.start_time > now)
        .cloned()
        .collect();
    list.sort_by_key(|s| s.start_time);
    list
}

/// Join each schedule with its streamer's channel; schedules whose
/// streamer is not in the snapshot are dropped.
pub fn enrich(schedules: &[ScheduledStream], snapshot: &Snapshot) -> Vec<EnrichedScheduledStream> {
    schedules
        .iter()
        .filter_map(|s| {
            snapshot
                .find(&s.streamer_username)
                .map(|c| EnrichedScheduledStream {
                    schedule: s.clone(),
                    streamer: c.clone(),
                })
        })
        .collect()
}

pub fn is_live_soon(schedule: &ScheduledStream, now: DateTime<Utc>) -> bool {
    let until = schedule.start_time - now;
    until > Duration::zero() && until <= Duration::minutes(LIVE_SOON_MINUTES)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleStats {
    pub live_soon: usize,
    pub scheduled: usize,
    pub live_soon_links: Vec<String>,
    pub soonest: Option<EnrichedScheduledStream>,
}

impl ScheduleStats {
    /// `enriched` is expected soonest-first.
    pub fn of(enriched: &[EnrichedScheduledStream], now: DateTime<Utc>) -> Self {
        let live_soon: Vec<_> = enriched
            .iter()
            .filter(|s| is_live_soon(&s.schedule, now))
            .collect();
        let scheduled = enriched
            .iter()
            .filter(|s| s.schedule.start_time - now > Duration::minutes(LIVE_SOON_MINUTES))
            .count();
        Self {
            live_soon: live_soon.len(),
            scheduled,
            live_soon_links: live_soon.iter().map(|s| s.streamer.profile_url.clone()).collect(),
            soonest: enriched.first().cloned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleSort {
    #[default]
    Soonest,
    /// Live-soon entries first, then by start time.
    Status,
}

impl FromStr for ScheduleSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "soonest" => Ok(Self::Soonest),
            "status" => Ok(Self::Status),
            other => Err(format!("unknown schedule sort: {}", other)),
        }
    }
}

/// Filter by display name, notes or characters, then sort.
pub fn schedule_view(
    enriched: &[EnrichedScheduledStream],
    query: &str,
    sort: ScheduleSort,
    now: DateTime<Utc>,
) -> Vec<EnrichedScheduledStream> {
    let query = query.trim().to_lowercase();
    let mut list: Vec<_> = enriched
        .iter()
        .filter(|s| {
            query.is_empty()
                || s.streamer.display_name.to_lowercase().contains(&query)
                || s.schedule.notes.to_lowercase().contains(&query)
                || s.schedule.characters.join(" ").to_lowercase().contains(&query)
        })
        .cloned()
        .collect();

    if sort == ScheduleSort::Status {
        list.sort_by(|a, b| {
            let soon_a = is_live_soon(&a.schedule, now);
            let soon_b = is_live_soon(&b.schedule, now);
            soon_b
                .cmp(&soon_a)
                .then(a.schedule.start_time.cmp(&b.schedule.start_time))
        });
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Channel;
    use crate::roster::RosterEntry;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 9, 12, 0, 0).unwrap()
    }

    fn sched(id: &str, who: &str, minutes: i64) -> ScheduledStream {
        ScheduledStream {
            id: id.into(),
            streamer_username: who.into(),
            start_time: now() + Duration::minutes(minutes),
            notes: format!("notes {}", id),
            characters: vec!["Agent Hunter".into()],
        }
    }

    fn snapshot(names: &[&str]) -> Snapshot {
        Snapshot::new(
            now(),
            names
                .iter()
                .map(|n| {
                    Channel::placeholder(&RosterEntry {
                        username: n.to_string(),
                        tags: vec![],
                        character: None,
                    })
                })
                .collect(),
        )
    }

    #[test]
    fn upcoming_drops_past_and_sorts() {
        let list = upcoming(
            &[sched("a", "x", 90), sched("b", "x", -5), sched("c", "x", 10), sched("d", "x", 0)],
            now(),
        );
        let ids: Vec<_> = list.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn enrich_is_case_insensitive_and_drops_unknown() {
        let enriched = enrich(
            &[sched("a", "sxb", 10), sched("b", "ghost", 20)],
            &snapshot(&["SXB"]),
        );
        assert_eq!(enriched.len(), 1);
        assert_eq!(enriched[0].streamer.username, "SXB");
    }

    #[test]
    fn stats_split_at_thirty_minutes() {
        let enriched = enrich(
            &[sched("a", "SXB", 10), sched("b", "Vilon", 30), sched("c", "SXB", 31)],
            &snapshot(&["SXB", "Vilon"]),
        );
        let stats = ScheduleStats::of(&enriched, now());
        assert_eq!(stats.live_soon, 2);
        assert_eq!(stats.scheduled, 1);
        assert_eq!(
            stats.live_soon_links,
            vec!["https://kick.com/SXB", "https://kick.com/Vilon"]
        );
        assert_eq!(stats.soonest.unwrap().schedule.id, "a");
    }

    #[test]
    fn status_sort_puts_live_soon_first() {
        let enriched = enrich(
            &[sched("far", "SXB", 120), sched("soon", "Vilon", 20)],
            &snapshot(&["SXB", "Vilon"]),
        );
        let view = schedule_view(&enriched, "", ScheduleSort::Status, now());
        assert_eq!(view[0].schedule.id, "soon");

        let found = schedule_view(&enriched, "notes far", ScheduleSort::Soonest, now());
        assert_eq!(found.len(), 1);
        assert_eq!(schedule_view(&enriched, "hunter", ScheduleSort::Soonest, now()).len(), 2);
    }

    #[test]
    fn store_add_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(JsonStore::new(dir.path()), vec![sched("seed", "SXB", 60)]);
        let added = store
            .add(
                NewSchedule {
                    streamer_username: "Vilon".into(),
                    start_time: now() + Duration::minutes(15),
                    notes: "raid".into(),
                    characters: vec![],
                },
                now(),
            )
            .unwrap();
        assert!(added.id.starts_with("2025-11-09T12:00:00"));

        let ids: Vec<_> = store.upcoming(now()).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![added.id.clone(), "seed".to_string()]);

        assert!(!store.delete("seed", now()).unwrap());
        assert!(store.delete(&added.id, now()).unwrap());
        assert_eq!(store.upcoming(now()).len(), 1);
        // expired user entries vanish on read
        store
            .add(
                NewSchedule {
                    streamer_username: "Vilon".into(),
                    start_time: now() + Duration::minutes(5),
                    notes: String::new(),
                    characters: vec![],
                },
                now(),
            )
            .unwrap();
        assert!(store.user_entries(now() + Duration::minutes(10)).is_empty());
    }
}
