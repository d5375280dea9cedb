//! Channel roster: the fixed list of channels to track, loaded from TOML.
//!
//! ```toml
//! [[channel]]
//! username = "SXB"
//! tags = ["police", "gang"]
//! character = "Abdulsamad Alqurashi"
//!
//! [[schedule]]
//! id = "1"
//! streamer = "SXB"
//! start_time = "2025-11-09T18:00:00Z"
//! notes = "Just Chatting"
//! characters = ["Abdulsamad Alqurashi"]
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::model::ScheduledStream;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub username: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub character: Option<String>,
}

/// Ordered roster plus the schedule entries seeded alongside it.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub channels: Vec<RosterEntry>,
    pub seeded_schedules: Vec<ScheduledStream>,
}

/// Intermediate structs matching the TOML tables. Kept apart from
/// `RosterEntry` / `ScheduledStream` so the file schema can evolve on its own.
#[derive(Debug, Deserialize)]
struct TomlRosterFile {
    #[serde(default)]
    channel: Vec<TomlChannel>,
    #[serde(default)]
    schedule: Vec<TomlSchedule>,
}

#[derive(Debug, Deserialize)]
struct TomlChannel {
    username: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    character: String,
}

#[derive(Debug, Deserialize)]
struct TomlSchedule {
    id: String,
    streamer: String,
    start_time: DateTime<Utc>,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    characters: Vec<String>,
}

/// Accepts either a bare username or a full channel URL such as
/// `https://kick.com/SXB?ref=x`.
pub fn extract_username(input: &str) -> String {
    let input = input.trim();
    if input.contains("kick.com/") {
        let last = input
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(input);
        let clean = last
            .split(['?', '#'])
            .next()
            .unwrap_or(last);
        if !clean.is_empty() {
            return clean.to_string();
        }
    }
    input.to_string()
}

impl Roster {
    pub fn new(channels: Vec<RosterEntry>) -> Self {
        Self {
            channels,
            seeded_schedules: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_toml_str(&content)
    }

    pub fn parse_toml_str(content: &str) -> anyhow::Result<Self> {
        let file: TomlRosterFile = toml::from_str(content)?;

        let mut seen = BTreeSet::new();
        let mut channels = Vec::with_capacity(file.channel.len());
        for c in file.channel {
            let username = extract_username(&c.username);
            if username.is_empty() {
                anyhow::bail!("roster entry with empty username");
            }
            if !seen.insert(username.to_ascii_lowercase()) {
                anyhow::bail!("duplicate roster username: {}", username);
            }
            let character = c.character.trim();
            channels.push(RosterEntry {
                username,
                tags: c.tags,
                character: (!character.is_empty()).then(|| character.to_string()),
            });
        }

        let seeded_schedules = file
            .schedule
            .into_iter()
            .map(|s| ScheduledStream {
                id: s.id,
                streamer_username: extract_username(&s.streamer),
                start_time: s.start_time,
                notes: s.notes,
                characters: s.characters,
            })
            .collect();

        Ok(Self {
            channels,
            seeded_schedules,
        })
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn find(&self, username: &str) -> Option<&RosterEntry> {
        self.channels
            .iter()
            .find(|c| c.username.eq_ignore_ascii_case(username))
    }

    /// Sorted, de-duplicated tags across the roster.
    pub fn all_tags(&self) -> Vec<String> {
        self.channels
            .iter()
            .flat_map(|c| c.tags.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[channel]]
        username = "https://kick.com/SXB?ref=home"
        tags = ["police", "gang"]
        character = "Abdulsamad Alqurashi"

        [[channel]]
        username = "Zeeyadx"
        tags = ["cia"]

        [[schedule]]
        id = "2"
        streamer = "Zeeyadx"
        start_time = "2025-11-09T12:30:00Z"
        notes = "CIA Academy Trainings, DO"
        characters = ["Agent Hunter"]
    "#;

    #[test]
    fn parses_channels_and_schedules() {
        let roster = Roster::parse_toml_str(SAMPLE).unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.channels[0].username, "SXB");
        assert_eq!(
            roster.channels[0].character.as_deref(),
            Some("Abdulsamad Alqurashi")
        );
        assert_eq!(roster.channels[1].character, None);
        assert_eq!(roster.seeded_schedules.len(), 1);
        assert_eq!(roster.seeded_schedules[0].streamer_username, "Zeeyadx");
    }

    #[test]
    fn rejects_duplicate_usernames() {
        let err = Roster::parse_toml_str(
            r#"
            [[channel]]
            username = "sxb"
            [[channel]]
            username = "SXB"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn extracts_username_from_urls() {
        assert_eq!(extract_username("SXB"), "SXB");
        assert_eq!(extract_username("https://kick.com/Vilon"), "Vilon");
        assert_eq!(extract_username("kick.com/Vilon/"), "Vilon");
        assert_eq!(extract_username("https://kick.com/Vilon#chat"), "Vilon");
    }

    #[test]
    fn all_tags_sorted_unique() {
        let roster = Roster::parse_toml_str(SAMPLE).unwrap();
        assert_eq!(roster.all_tags(), vec!["cia", "gang", "police"]);
        assert!(roster.find("sxb").is_some());
    }
}
