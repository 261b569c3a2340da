//! # Data Model
//!
//! Songs, sections, arrangements, participants and the synchronized
//! performance position.
//!
//! ## Type Hierarchy
//! ```text
//! Setlist
//!   └── song_ids (ordered)
//!
//! Song
//!   ├── current_key, tempo, time_signature, theme (Plain | ChordGrid)
//!   ├── Vec<Section>       content blocks (verse, chorus, ...)
//!   └── Vec<Arrangement>   play order: position + repeat_count -> Section
//!
//! Session roster
//!   └── Vec<Participant>   role + is_owner, recomputed from presence
//!
//! PerformancePosition       the single-writer synchronized state
//! ```
//!
//! ## Key Concepts
//!
//! ### Arrangement order
//! Arrangements are stored in any order; play order is defined by
//! `position`. Every lookup goes through [`Song::ordered_arrangements`].
//!
//! ### Section content
//! `Section::content` is either interleaved chord/lyric text or, for
//! `ContentTheme::ChordGrid` songs, a JSON payload of bars (see `chord_grid`).
//!
//! ### Position ownership
//! Only the session owner mutates [`PerformancePosition`]. Viewers hold a
//! mirror that changes exclusively through inbound deltas.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::error::Result;

/// Lowest allowed auto-scroll speed multiplier.
pub const MIN_SCROLL_SPEED: f32 = 0.1;
/// Highest allowed auto-scroll speed multiplier.
pub const MAX_SCROLL_SPEED: f32 = 3.0;

/// Performer role assigned to a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Vocalist,
    Guitarist,
    Bassist,
    Keyboardist,
    Drummer,
    #[default]
    None,
}

impl ParticipantRole {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vocalist" => Some(Self::Vocalist),
            "guitarist" => Some(Self::Guitarist),
            "bassist" => Some(Self::Bassist),
            "keyboardist" => Some(Self::Keyboardist),
            "drummer" => Some(Self::Drummer),
            "none" | "" => Some(Self::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vocalist => "vocalist",
            Self::Guitarist => "guitarist",
            Self::Bassist => "bassist",
            Self::Keyboardist => "keyboardist",
            Self::Drummer => "drummer",
            Self::None => "none",
        }
    }

    /// Guitarists and keyboardists can tap individual chords.
    pub fn chords_clickable(&self) -> bool {
        matches!(self, Self::Guitarist | Self::Keyboardist)
    }
}

/// How a song's section content is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContentTheme {
    #[default]
    #[serde(rename = "plain", alias = "default")]
    Plain,
    #[serde(rename = "chord_grid")]
    ChordGrid,
}

/// Time signature (e.g., 4/4, 3/4, 6/8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSignature {
    pub beats: u8,
    pub beat_type: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            beats: 4,
            beat_type: 4,
        }
    }
}

impl TimeSignature {
    /// Parse "N/M". Returns `None` for anything else, including zero values.
    pub fn from_str(s: &str) -> Option<Self> {
        let (beats, beat_type) = s.trim().split_once('/')?;
        let beats: u8 = beats.trim().parse().ok()?;
        let beat_type: u8 = beat_type.trim().parse().ok()?;
        if beats == 0 || beat_type == 0 {
            return None;
        }
        Some(Self { beats, beat_type })
    }

    /// Parse "N/M", falling back to 4/4.
    pub fn parse_or_default(s: &str) -> Self {
        Self::from_str(s).unwrap_or_default()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats, self.beat_type)
    }
}

impl TryFrom<String> for TimeSignature {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::from_str(&value).ok_or_else(|| format!("time signature must be N/M, got '{}'", value))
    }
}

impl From<TimeSignature> for String {
    fn from(ts: TimeSignature) -> Self {
        ts.to_string()
    }
}

/// A named content block of a song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    #[serde(default)]
    pub section_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_signature: Option<TimeSignature>,
}

impl Section {
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.section_type
        } else {
            &self.name
        }
    }
}

/// New content for one section, as carried by `transpose_change`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionContent {
    pub id: String,
    pub content: String,
}

/// Ordered, repeatable reference to a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrangement {
    pub id: String,
    pub section_id: String,
    pub position: u32,
    #[serde(default = "default_repeat_count")]
    pub repeat_count: u32,
}

fn default_repeat_count() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    pub current_key: String,
    #[serde(default = "default_tempo")]
    pub tempo: u32,
    #[serde(default)]
    pub time_signature: TimeSignature,
    #[serde(default)]
    pub theme: ContentTheme,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub arrangements: Vec<Arrangement>,
}

fn default_tempo() -> u32 {
    120
}

impl Song {
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Arrangements in play order.
    pub fn ordered_arrangements(&self) -> Vec<&Arrangement> {
        let mut sorted: Vec<&Arrangement> = self.arrangements.iter().collect();
        sorted.sort_by_key(|a| a.position);
        sorted
    }

    /// Play-order index of an arrangement id.
    pub fn arrangement_index(&self, arrangement_id: &str) -> Option<usize> {
        self.ordered_arrangements()
            .iter()
            .position(|a| a.id == arrangement_id)
    }

    pub fn arrangement(&self, arrangement_id: &str) -> Option<&Arrangement> {
        self.arrangements.iter().find(|a| a.id == arrangement_id)
    }

    pub fn arrangement_at(&self, index: usize) -> Option<&Arrangement> {
        self.ordered_arrangements().get(index).copied()
    }

    pub fn section(&self, section_id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == section_id)
    }

    pub fn section_mut(&mut self, section_id: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.id == section_id)
    }

    /// Section referenced by an arrangement, if both exist.
    pub fn section_for_arrangement(&self, arrangement_id: &str) -> Option<&Section> {
        self.arrangement(arrangement_id)
            .and_then(|a| self.section(&a.section_id))
    }
}

/// Ordered list of songs performed in one session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Setlist {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub song_ids: Vec<String>,
}

impl Setlist {
    pub fn song_index(&self, song_id: &str) -> Option<usize> {
        self.song_ids.iter().position(|id| id == song_id)
    }
}

/// A connected device and its presence metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub role: ParticipantRole,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub last_seen_ms: u64,
}

impl Participant {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, role: ParticipantRole) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_url: None,
            role,
            is_owner: false,
            last_seen_ms: now_millis(),
        }
    }

    /// A participant with a freshly generated device id.
    pub fn generated(display_name: impl Into<String>, role: ParticipantRole) -> Self {
        Self::new(Uuid::new_v4().to_string(), display_name, role)
    }

    pub fn owner(mut self) -> Self {
        self.is_owner = true;
        self
    }
}

/// The synchronized performance state.
///
/// Every field is overwritten wholesale by deltas; there are no
/// increment-style updates, so replaying a delta is harmless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformancePosition {
    pub current_song_index: usize,
    pub current_song_id: Option<String>,
    pub setlist_id: Option<String>,
    pub current_section_id: Option<String>,
    pub current_arrangement_id: Option<String>,
    pub tempo: u32,
    pub is_playing: bool,
    pub show_all_sections: bool,
    pub is_auto_scrolling: bool,
    pub scroll_speed_multiplier: f32,
}

impl Default for PerformancePosition {
    fn default() -> Self {
        Self {
            current_song_index: 0,
            current_song_id: None,
            setlist_id: None,
            current_section_id: None,
            current_arrangement_id: None,
            tempo: default_tempo(),
            is_playing: false,
            show_all_sections: false,
            is_auto_scrolling: false,
            scroll_speed_multiplier: 1.0,
        }
    }
}

/// Local-only browsing position held by a non-owner.
pub type IndependentPosition = PerformancePosition;

impl PerformancePosition {
    /// Fill in the section id from the arrangement once the song is known.
    ///
    /// Unknown arrangement ids are left in place; they resolve when the song
    /// that contains them arrives.
    pub fn resolve_against(&mut self, song: &Song) {
        match self.current_arrangement_id.as_deref() {
            Some(arrangement_id) => {
                if let Some(arrangement) = song.arrangement(arrangement_id) {
                    self.current_section_id = Some(arrangement.section_id.clone());
                }
            }
            None => {
                if let Some(first) = song.arrangement_at(0) {
                    self.current_arrangement_id = Some(first.id.clone());
                    self.current_section_id = Some(first.section_id.clone());
                }
            }
        }
    }
}

/// Clamp a scroll speed multiplier into its allowed domain.
pub fn clamp_scroll_speed(multiplier: f32) -> f32 {
    if multiplier.is_nan() {
        return 1.0;
    }
    multiplier.clamp(MIN_SCROLL_SPEED, MAX_SCROLL_SPEED)
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_song;

    #[test]
    fn test_song_from_yaml() {
        let song = sample_song();
        assert_eq!(song.time_signature, TimeSignature { beats: 3, beat_type: 4 });
        assert_eq!(song.theme, ContentTheme::Plain);
        assert_eq!(song.arrangements[0].repeat_count, 1);
        assert_eq!(song.arrangements[2].repeat_count, 2);
    }

    #[test]
    fn test_arrangements_ordered_by_position() {
        let song = sample_song();
        let ids: Vec<&str> = song.ordered_arrangements().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2", "a3"]);
        assert_eq!(song.arrangement_index("a2"), Some(1));
        assert_eq!(song.arrangement_index("missing"), None);
    }

    #[test]
    fn test_section_display_name_falls_back_to_type() {
        let song = sample_song();
        assert_eq!(song.section("verse").unwrap().display_name(), "Verse 1");
        assert_eq!(song.section("chorus").unwrap().display_name(), "chorus");
    }

    #[test]
    fn test_time_signature_parsing() {
        assert_eq!(TimeSignature::from_str("6/8"), Some(TimeSignature { beats: 6, beat_type: 8 }));
        assert_eq!(TimeSignature::from_str("0/4"), None);
        assert_eq!(TimeSignature::from_str("four"), None);
        assert_eq!(TimeSignature::parse_or_default("x"), TimeSignature::default());
    }

    #[test]
    fn test_resolve_keeps_unknown_arrangement() {
        let song = sample_song();
        let mut pos = PerformancePosition {
            current_arrangement_id: Some("not-loaded".to_string()),
            ..Default::default()
        };
        pos.resolve_against(&song);
        assert_eq!(pos.current_arrangement_id.as_deref(), Some("not-loaded"));
        assert_eq!(pos.current_section_id, None);

        pos.current_arrangement_id = Some("a2".to_string());
        pos.resolve_against(&song);
        assert_eq!(pos.current_section_id.as_deref(), Some("chorus"));
    }

    #[test]
    fn test_resolve_defaults_to_first_arrangement() {
        let song = sample_song();
        let mut pos = PerformancePosition::default();
        pos.resolve_against(&song);
        assert_eq!(pos.current_arrangement_id.as_deref(), Some("a1"));
        assert_eq!(pos.current_section_id.as_deref(), Some("verse"));
    }

    #[test]
    fn test_scroll_speed_clamped() {
        assert_eq!(clamp_scroll_speed(5.0), MAX_SCROLL_SPEED);
        assert_eq!(clamp_scroll_speed(0.0), MIN_SCROLL_SPEED);
        assert_eq!(clamp_scroll_speed(f32::NAN), 1.0);
    }

    #[test]
    fn test_generated_participants_get_distinct_ids() {
        let a = Participant::generated("Ana", ParticipantRole::Vocalist);
        let b = Participant::generated("Ana", ParticipantRole::Vocalist);
        assert_ne!(a.id, b.id);
        assert!(!a.is_owner);
        assert!(a.owner().is_owner);
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(ParticipantRole::from_str("Bassist"), Some(ParticipantRole::Bassist));
        assert_eq!(ParticipantRole::from_str("tuba"), None);
        assert!(ParticipantRole::Keyboardist.chords_clickable());
        assert!(!ParticipantRole::Drummer.chords_clickable());
    }
}
