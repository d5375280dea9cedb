//! Share-board windows and the shareable layout code.
//!
//! A code is `base64(zlib(json))`. Version 2 payloads minify every window
//! key (`windows` → `w`, `zIndex` → `z`, ...); version 1 payloads carry
//! the full names and no name/creation time.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, TimeZone, Utc};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use thiserror::Error;

pub const CURRENT_VERSION: u64 = 2;
pub const LEGACY_LAYOUT_NAME: &str = "Legacy Layout";

const FIRST_Z_INDEX: u32 = 100;
const DEFAULT_WIDTH: f64 = 640.0;
const DEFAULT_HEIGHT: f64 = 480.0;
const EXTRA_SPACE_STEP: u32 = 300;

#[derive(Debug, Error)]
pub enum LayoutCodeError {
    #[error("layout code is not valid base64")]
    Base64(#[from] base64::DecodeError),
    #[error("layout code could not be decompressed")]
    Inflate(#[source] std::io::Error),
    #[error("layout code is not a valid payload")]
    Json(#[from] serde_json::Error),
    #[error("unsupported layout code version {0}")]
    UnsupportedVersion(u64),
    #[error("layout code has no layout")]
    MissingLayout,
    #[error("layout code has expired")]
    Expired,
    #[error("failed to compress layout: {0}")]
    Deflate(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowData {
    pub id: String,
    pub z_index: u32,
    pub position: Position,
    pub size: Size,
    pub streamer_username: Option<String>,
    pub is_chat_visible: bool,
    pub is_player_maximized: bool,
    pub is_window_maximized: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub windows: Vec<WindowData>,
    #[serde(default)]
    pub extra_space: u32,
}

/// What a code decodes to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedLayout {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub layout: Layout,
}

/// When a generated code stops being accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expiry {
    #[default]
    Never,
    Minutes(u32),
}

impl Expiry {
    pub fn deadline(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Never => None,
            Self::Minutes(m) => Some(now + Duration::minutes(i64::from(m))),
        }
    }
}

// ── Wire format ─────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct WirePosition {
    x: f64,
    y: f64,
}

#[derive(Serialize, Deserialize)]
struct WireSize {
    #[serde(rename = "wd")]
    width: f64,
    #[serde(rename = "ht")]
    height: f64,
}

#[derive(Serialize, Deserialize)]
struct WireWindow {
    #[serde(rename = "i")]
    id: String,
    #[serde(rename = "z")]
    z_index: u32,
    #[serde(rename = "p")]
    position: WirePosition,
    #[serde(rename = "s")]
    size: WireSize,
    #[serde(rename = "u")]
    streamer_username: Option<String>,
    #[serde(rename = "c")]
    is_chat_visible: bool,
    #[serde(rename = "pm")]
    is_player_maximized: bool,
    #[serde(rename = "wm")]
    is_window_maximized: bool,
}

#[derive(Serialize, Deserialize)]
struct WireLayout {
    #[serde(rename = "w")]
    windows: Vec<WireWindow>,
    #[serde(rename = "es")]
    extra_space: u32,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadV2 {
    v: u64,
    name: String,
    /// Unix millis.
    created_at: i64,
    layout: Option<WireLayout>,
    #[serde(default)]
    expires_at: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadV1 {
    layout: Option<Layout>,
    #[serde(default)]
    expires_at: Option<i64>,
}

#[derive(Deserialize)]
struct VersionTag {
    #[serde(default)]
    v: Option<u64>,
}

impl From<&WindowData> for WireWindow {
    fn from(w: &WindowData) -> Self {
        Self {
            id: w.id.clone(),
            z_index: w.z_index,
            position: WirePosition {
                x: w.position.x,
                y: w.position.y,
            },
            size: WireSize {
                width: w.size.width,
                height: w.size.height,
            },
            streamer_username: w.streamer_username.clone(),
            is_chat_visible: w.is_chat_visible,
            is_player_maximized: w.is_player_maximized,
            is_window_maximized: w.is_window_maximized,
        }
    }
}

impl From<WireWindow> for WindowData {
    fn from(w: WireWindow) -> Self {
        Self {
            id: w.id,
            z_index: w.z_index,
            position: Position {
                x: w.position.x,
                y: w.position.y,
            },
            size: Size {
                width: w.size.width,
                height: w.size.height,
            },
            streamer_username: w.streamer_username,
            is_chat_visible: w.is_chat_visible,
            is_player_maximized: w.is_player_maximized,
            is_window_maximized: w.is_window_maximized,
        }
    }
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

// ── Codec ───────────────────────────────────────────────────────────────────

pub fn encode(
    layout: &Layout,
    name: &str,
    now: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<String, LayoutCodeError> {
    let payload = PayloadV2 {
        v: CURRENT_VERSION,
        name: name.to_string(),
        created_at: now.timestamp_millis(),
        layout: Some(WireLayout {
            windows: layout.windows.iter().map(WireWindow::from).collect(),
            extra_space: layout.extra_space,
        }),
        expires_at: expires_at.map(|t| t.timestamp_millis()),
    };
    let json = serde_json::to_vec(&payload)?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json).map_err(LayoutCodeError::Deflate)?;
    let compressed = encoder.finish().map_err(LayoutCodeError::Deflate)?;

    Ok(general_purpose::STANDARD.encode(compressed))
}

/// Decode a code produced by [`encode`] (or a legacy v1 code). An expiry
/// strictly before `now` is rejected.
pub fn decode(code: &str, now: DateTime<Utc>) -> Result<DecodedLayout, LayoutCodeError> {
    let compressed = general_purpose::STANDARD.decode(code.trim())?;
    let mut json = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .read_to_end(&mut json)
        .map_err(LayoutCodeError::Inflate)?;

    let tag: VersionTag = serde_json::from_slice(&json)?;
    let decoded = match tag.v {
        Some(2) => {
            let p: PayloadV2 = serde_json::from_slice(&json)?;
            let wire = p.layout.ok_or(LayoutCodeError::MissingLayout)?;
            DecodedLayout {
                name: p.name,
                created_at: from_millis(p.created_at).unwrap_or(now),
                expires_at: p.expires_at.and_then(from_millis),
                layout: Layout {
                    windows: wire.windows.into_iter().map(WindowData::from).collect(),
                    extra_space: wire.extra_space,
                },
            }
        }
        Some(1) => {
            let p: PayloadV1 = serde_json::from_slice(&json)?;
            DecodedLayout {
                name: LEGACY_LAYOUT_NAME.to_string(),
                created_at: now,
                expires_at: p.expires_at.and_then(from_millis),
                layout: p.layout.ok_or(LayoutCodeError::MissingLayout)?,
            }
        }
        other => return Err(LayoutCodeError::UnsupportedVersion(other.unwrap_or(0))),
    };

    if decoded.expires_at.is_some_and(|t| t < now) {
        return Err(LayoutCodeError::Expired);
    }
    Ok(decoded)
}

// ── Share board ─────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoardError {
    #[error("no live channels to open a window for")]
    NoLiveChannels,
    #[error("no window with id {0}")]
    UnknownWindow(String),
}

/// Partial window update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowUpdate {
    pub position: Option<Position>,
    pub size: Option<Size>,
    pub streamer_username: Option<String>,
    pub is_chat_visible: Option<bool>,
    pub is_player_maximized: Option<bool>,
    pub is_window_maximized: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareBoard {
    windows: Vec<WindowData>,
    next_z_index: u32,
    extra_space: u32,
    #[serde(default)]
    windows_opened: u64,
}

impl Default for ShareBoard {
    fn default() -> Self {
        Self {
            windows: Vec::new(),
            next_z_index: FIRST_Z_INDEX,
            extra_space: 0,
            windows_opened: 0,
        }
    }
}

impl ShareBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn windows(&self) -> &[WindowData] {
        &self.windows
    }

    pub fn next_z_index(&self) -> u32 {
        self.next_z_index
    }

    pub fn extra_space(&self) -> u32 {
        self.extra_space
    }

    pub fn layout(&self) -> Layout {
        Layout {
            windows: self.windows.clone(),
            extra_space: self.extra_space,
        }
    }

    /// Open a window on the first live username, cascaded from the others.
    pub fn add_window(&mut self, live_usernames: &[String]) -> Result<&WindowData, BoardError> {
        let first = live_usernames.first().ok_or(BoardError::NoLiveChannels)?;
        let n = self.windows.len() as f64;
        let id = self.next_window_id();
        self.windows.push(WindowData {
            id,
            z_index: self.next_z_index,
            position: Position {
                x: 50.0 + (n * 40.0) % 300.0,
                y: 50.0 + (n * 40.0) % 200.0,
            },
            size: Size {
                width: DEFAULT_WIDTH,
                height: DEFAULT_HEIGHT,
            },
            streamer_username: Some(first.clone()),
            is_chat_visible: true,
            is_player_maximized: false,
            is_window_maximized: false,
        });
        self.next_z_index = self.next_z_index.saturating_add(1);
        Ok(&self.windows[self.windows.len() - 1])
    }

    /// `window-N` not used by any open window, including ones loaded from
    /// a layout code.
    fn next_window_id(&mut self) -> String {
        loop {
            self.windows_opened += 1;
            let id = format!("window-{}", self.windows_opened);
            if !self.windows.iter().any(|w| w.id == id) {
                return id;
            }
        }
    }

    pub fn close(&mut self, id: &str) -> Result<(), BoardError> {
        let before = self.windows.len();
        self.windows.retain(|w| w.id != id);
        if self.windows.len() == before {
            return Err(BoardError::UnknownWindow(id.to_string()));
        }
        Ok(())
    }

    pub fn update(&mut self, id: &str, update: WindowUpdate) -> Result<(), BoardError> {
        let window = self
            .windows
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| BoardError::UnknownWindow(id.to_string()))?;
        if let Some(p) = update.position {
            window.position = p;
        }
        if let Some(s) = update.size {
            window.size = s;
        }
        if let Some(u) = update.streamer_username {
            window.streamer_username = Some(u);
        }
        if let Some(c) = update.is_chat_visible {
            window.is_chat_visible = c;
        }
        if let Some(m) = update.is_player_maximized {
            window.is_player_maximized = m;
        }
        if let Some(m) = update.is_window_maximized {
            window.is_window_maximized = m;
        }
        Ok(())
    }

    /// No-op when the window is already on top.
    pub fn bring_to_front(&mut self, id: &str) -> Result<(), BoardError> {
        let top = self.next_z_index.saturating_sub(1);
        let window = self
            .windows
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| BoardError::UnknownWindow(id.to_string()))?;
        if window.z_index != top {
            window.z_index = self.next_z_index;
            self.next_z_index = self.next_z_index.saturating_add(1);
        }
        Ok(())
    }

    pub fn add_space(&mut self) {
        self.extra_space += EXTRA_SPACE_STEP;
    }

    pub fn apply_layout(&mut self, layout: Layout) {
        let max_z = layout
            .windows
            .iter()
            .map(|w| w.z_index)
            .max()
            .unwrap_or(FIRST_Z_INDEX)
            .max(FIRST_Z_INDEX);
        let highest_id = layout
            .windows
            .iter()
            .filter_map(|w| w.id.strip_prefix("window-")?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        self.windows = layout.windows;
        self.extra_space = layout.extra_space;
        self.next_z_index = max_z.saturating_add(1);
        self.windows_opened = self.windows_opened.max(highest_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 9, 21, 0, 0).unwrap()
    }

    fn board_with(n: usize) -> ShareBoard {
        let mut board = ShareBoard::new();
        for _ in 0..n {
            board.add_window(&["SXB".to_string()]).unwrap();
        }
        board
    }

    fn raw_code(json: &str) -> String {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(json.as_bytes()).unwrap();
        general_purpose::STANDARD.encode(enc.finish().unwrap())
    }

    #[test]
    fn round_trip_preserves_windows() {
        let mut board = board_with(3);
        board.add_space();
        board
            .update(
                "window-2",
                WindowUpdate {
                    position: Some(Position { x: 12.5, y: 300.0 }),
                    streamer_username: Some("Vilon".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let code = encode(&board.layout(), "Raid", now(), None).unwrap();
        let decoded = decode(&code, now() + Duration::days(365)).unwrap();
        assert_eq!(decoded.layout, board.layout());
        assert_eq!(decoded.name, "Raid");
        assert_eq!(decoded.created_at, now());
    }

    #[test]
    fn wire_keys_are_minified() {
        let code = encode(&board_with(1).layout(), "x", now(), None).unwrap();
        let bytes = general_purpose::STANDARD.decode(code).unwrap();
        let mut json = String::new();
        ZlibDecoder::new(bytes.as_slice()).read_to_string(&mut json).unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["v"], 2);
        assert_eq!(v["layout"]["w"][0]["s"]["wd"], 640.0);
        assert_eq!(v["layout"]["w"][0]["u"], "SXB");
        assert!(v["layout"]["es"].is_number());
    }

    #[test]
    fn expired_code_is_rejected() {
        let deadline = Expiry::Minutes(5).deadline(now());
        let code = encode(&board_with(1).layout(), "x", now(), deadline).unwrap();
        assert!(decode(&code, now() + Duration::minutes(4)).is_ok());
        assert!(matches!(
            decode(&code, now() + Duration::minutes(6)),
            Err(LayoutCodeError::Expired)
        ));
    }

    #[test]
    fn legacy_and_bad_codes() {
        let legacy = raw_code(
            r#"{"v":1,"layout":{"windows":[{"id":"w1","zIndex":101,"position":{"x":1,"y":2},
            "size":{"width":640,"height":480},"streamerUsername":null,"isChatVisible":false,
            "isPlayerMaximized":false,"isWindowMaximized":true}],"extraSpace":300}}"#,
        );
        let decoded = decode(&legacy, now()).unwrap();
        assert_eq!(decoded.name, LEGACY_LAYOUT_NAME);
        assert_eq!(decoded.layout.windows[0].z_index, 101);
        assert_eq!(decoded.layout.extra_space, 300);

        assert!(matches!(
            decode(&raw_code(r#"{"v":3}"#), now()),
            Err(LayoutCodeError::UnsupportedVersion(3))
        ));
        assert!(matches!(
            decode(&raw_code(r#"{"v":2,"name":"x","createdAt":0}"#), now()),
            Err(LayoutCodeError::MissingLayout)
        ));
        assert!(matches!(decode("%%%", now()), Err(LayoutCodeError::Base64(_))));
        assert!(matches!(
            decode(&general_purpose::STANDARD.encode(b"plain"), now()),
            Err(LayoutCodeError::Inflate(_))
        ));
        assert!(matches!(decode(&raw_code("not json"), now()), Err(LayoutCodeError::Json(_))));
    }

    #[test]
    fn board_cascades_and_tracks_z() {
        let mut board = ShareBoard::new();
        assert_eq!(board.add_window(&[]), Err(BoardError::NoLiveChannels));

        let board = {
            let mut b = board_with(8);
            b.add_space();
            b
        };
        let w = &board.windows()[7];
        assert_eq!(w.position, Position { x: 50.0 + 280.0, y: 50.0 + 80.0 });
        assert_eq!(w.z_index, 107);
        assert_eq!(board.next_z_index(), 108);
        assert_eq!(board.extra_space(), 300);
    }

    #[test]
    fn ids_stay_unique_after_applying_a_code() {
        let shared = board_with(2).layout();
        let mut board = ShareBoard::new();
        board.apply_layout(shared);
        let added = board.add_window(&["Vilon".to_string()]).unwrap().id.clone();
        assert_eq!(added, "window-3");

        let mut foreign = board_with(1).layout();
        foreign.windows[0].id = "window-7x".into();
        foreign.windows.push(WindowData {
            id: "window-1".into(),
            ..foreign.windows[0].clone()
        });
        let mut board = ShareBoard::new();
        board.apply_layout(foreign);
        board.add_window(&["SXB".to_string()]).unwrap();
        let mut ids: Vec<_> = board.windows().iter().map(|w| w.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);

        board.close("window-1").unwrap();
        assert_eq!(board.windows().len(), 2);
    }

    #[test]
    fn huge_z_index_from_a_code_does_not_overflow() {
        let mut layout = board_with(1).layout();
        layout.windows[0].z_index = u32::MAX;
        let code = encode(&layout, "x", now(), None).unwrap();
        let decoded = decode(&code, now()).unwrap();

        let mut board = ShareBoard::new();
        board.apply_layout(decoded.layout);
        assert_eq!(board.next_z_index(), u32::MAX);
        board.add_window(&["SXB".to_string()]).unwrap();
        board.bring_to_front("window-1").unwrap();
        board.bring_to_front("window-2").unwrap();
        assert_eq!(board.next_z_index(), u32::MAX);
    }

    #[test]
    fn bring_to_front_and_apply() {
        let mut board = board_with(2);
        board.bring_to_front("window-2").unwrap();
        assert_eq!(board.next_z_index(), 102);
        board.bring_to_front("window-1").unwrap();
        assert_eq!(board.windows()[0].z_index, 102);
        assert_eq!(board.next_z_index(), 103);
        assert!(board.close("window-9").is_err());
        board.close("window-1").unwrap();

        let mut other = ShareBoard::new();
        other.apply_layout(board.layout());
        assert_eq!(other.next_z_index(), 102);
        other.apply_layout(Layout::default());
        assert_eq!(other.next_z_index(), 101);
    }
}
