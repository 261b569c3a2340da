//! Wire vocabulary and the pure reducer.
//!
//! Every delta is a flat JSON record tagged by `type`, payload fields in
//! camelCase:
//!
//! ```text
//! {"type":"section-change","sectionId":"verse","arrangementId":"a1",
//!  "isPlaying":true,"showAllSections":false,"songId":"s1","setlistId":"l1"}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{clamp_scroll_speed, PerformancePosition, SectionContent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Delta {
    #[serde(rename = "section-change", rename_all = "camelCase")]
    SectionChange {
        section_id: Option<String>,
        arrangement_id: Option<String>,
        is_playing: bool,
        show_all_sections: bool,
        #[serde(default)]
        song_id: Option<String>,
        #[serde(default)]
        setlist_id: Option<String>,
    },

    #[serde(rename = "tempo-change", rename_all = "camelCase")]
    TempoChange {
        tempo: u32,
        #[serde(default)]
        song_id: Option<String>,
        #[serde(default)]
        setlist_id: Option<String>,
    },

    #[serde(rename = "auto_scroll_change", rename_all = "camelCase")]
    AutoScrollChange { is_scrolling: bool, scroll_speed: f32 },

    #[serde(rename = "show_all_sections_change", rename_all = "camelCase")]
    ShowAllSectionsChange { show_all_sections: bool },

    #[serde(rename = "transpose_change", rename_all = "camelCase")]
    TransposeChange {
        new_key: String,
        old_key: String,
        sections: Vec<SectionContent>,
        timestamp: u64,
    },

    #[serde(rename = "song-change", rename_all = "camelCase")]
    SongChange {
        song_id: String,
        song_index: usize,
        #[serde(default)]
        setlist_id: Option<String>,
    },

    /// Full state for a subscriber that just joined.
    #[serde(rename = "setlist-sync", rename_all = "camelCase")]
    SetlistSync {
        active_song_id: Option<String>,
        current_song_index: usize,
        current_arrangement_id: Option<String>,
        is_playing: bool,
        tempo: u32,
        show_all_sections: bool,
        #[serde(default)]
        setlist_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_section_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_auto_scrolling: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scroll_speed: Option<f32>,
    },
}

impl Delta {
    /// Wire tag of this delta.
    pub fn kind(&self) -> &'static str {
        match self {
            Delta::SectionChange { .. } => "section-change",
            Delta::TempoChange { .. } => "tempo-change",
            Delta::AutoScrollChange { .. } => "auto_scroll_change",
            Delta::ShowAllSectionsChange { .. } => "show_all_sections_change",
            Delta::TransposeChange { .. } => "transpose_change",
            Delta::SongChange { .. } => "song-change",
            Delta::SetlistSync { .. } => "setlist-sync",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Snapshot of a position as a `setlist-sync` delta.
    pub fn full_sync(position: &PerformancePosition) -> Self {
        Delta::SetlistSync {
            active_song_id: position.current_song_id.clone(),
            current_song_index: position.current_song_index,
            current_arrangement_id: position.current_arrangement_id.clone(),
            is_playing: position.is_playing,
            tempo: position.tempo,
            show_all_sections: position.show_all_sections,
            setlist_id: position.setlist_id.clone(),
            current_section_id: position.current_section_id.clone(),
            is_auto_scrolling: Some(position.is_auto_scrolling),
            scroll_speed: Some(position.scroll_speed_multiplier),
        }
    }
}

/// Apply a delta to a position.
///
/// Each field a delta carries is overwritten outright, so applying the same
/// delta twice leaves the same state as applying it once. Ids that do not
/// resolve against the local song are stored anyway.
///
/// `transpose_change` does not touch the position; it rewrites song content.
pub fn apply(position: &mut PerformancePosition, delta: &Delta) {
    match delta {
        Delta::SectionChange {
            section_id,
            arrangement_id,
            is_playing,
            show_all_sections,
            song_id,
            setlist_id,
        } => {
            position.current_section_id = section_id.clone();
            position.current_arrangement_id = arrangement_id.clone();
            position.is_playing = *is_playing;
            position.show_all_sections = *show_all_sections;
            if song_id.is_some() {
                position.current_song_id = song_id.clone();
            }
            if setlist_id.is_some() {
                position.setlist_id = setlist_id.clone();
            }
        }
        Delta::TempoChange { tempo, .. } => {
            position.tempo = *tempo;
        }
        Delta::AutoScrollChange {
            is_scrolling,
            scroll_speed,
        } => {
            position.is_auto_scrolling = *is_scrolling;
            position.scroll_speed_multiplier = clamp_scroll_speed(*scroll_speed);
        }
        Delta::ShowAllSectionsChange { show_all_sections } => {
            position.show_all_sections = *show_all_sections;
        }
        Delta::TransposeChange { .. } => {}
        Delta::SongChange {
            song_id,
            song_index,
            setlist_id,
        } => {
            position.current_song_id = Some(song_id.clone());
            position.current_song_index = *song_index;
            if setlist_id.is_some() {
                position.setlist_id = setlist_id.clone();
            }
            position.current_section_id = None;
            position.current_arrangement_id = None;
            position.is_auto_scrolling = false;
        }
        Delta::SetlistSync {
            active_song_id,
            current_song_index,
            current_arrangement_id,
            is_playing,
            tempo,
            show_all_sections,
            setlist_id,
            current_section_id,
            is_auto_scrolling,
            scroll_speed,
        } => {
            if position.current_song_id != *active_song_id {
                position.current_section_id = None;
            }
            position.current_song_id = active_song_id.clone();
            position.current_song_index = *current_song_index;
            position.current_arrangement_id = current_arrangement_id.clone();
            position.is_playing = *is_playing;
            position.tempo = *tempo;
            position.show_all_sections = *show_all_sections;
            if setlist_id.is_some() {
                position.setlist_id = setlist_id.clone();
            }
            if current_section_id.is_some() {
                position.current_section_id = current_section_id.clone();
            }
            if let Some(scrolling) = is_auto_scrolling {
                position.is_auto_scrolling = *scrolling;
            }
            if let Some(speed) = scroll_speed {
                position.scroll_speed_multiplier = clamp_scroll_speed(*speed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section_change(section: &str, arrangement: &str) -> Delta {
        Delta::SectionChange {
            section_id: Some(section.to_string()),
            arrangement_id: Some(arrangement.to_string()),
            is_playing: true,
            show_all_sections: false,
            song_id: Some("song-1".to_string()),
            setlist_id: Some("set-1".to_string()),
        }
    }

    #[test]
    fn test_wire_tags() {
        let json = section_change("verse", "a1").to_json().unwrap();
        assert!(json.contains(r#""type":"section-change""#));
        assert!(json.contains(r#""arrangementId":"a1""#));
        assert!(json.contains(r#""showAllSections":false"#));

        let scroll = Delta::AutoScrollChange {
            is_scrolling: true,
            scroll_speed: 1.5,
        };
        let json = scroll.to_json().unwrap();
        assert!(json.contains(r#""type":"auto_scroll_change""#));
        assert!(json.contains(r#""isScrolling":true"#));
        assert_eq!(scroll.kind(), "auto_scroll_change");
    }

    #[test]
    fn test_parse_inbound() {
        let delta = Delta::from_json(r#"{"type":"song-change","songId":"s2","songIndex":1}"#).unwrap();
        assert_eq!(
            delta,
            Delta::SongChange {
                song_id: "s2".to_string(),
                song_index: 1,
                setlist_id: None
            }
        );
        assert!(Delta::from_json(r#"{"type":"bar_update"}"#).is_err());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let delta = section_change("chorus", "a2");
        let mut once = PerformancePosition::default();
        apply(&mut once, &delta);
        let mut twice = once.clone();
        apply(&mut twice, &delta);
        assert_eq!(once, twice);
        assert_eq!(once.current_arrangement_id.as_deref(), Some("a2"));
        assert!(once.is_playing);
    }

    #[test]
    fn test_song_change_resets_scrolling() {
        let mut position = PerformancePosition {
            is_auto_scrolling: true,
            current_section_id: Some("verse".to_string()),
            current_arrangement_id: Some("a1".to_string()),
            ..Default::default()
        };
        apply(
            &mut position,
            &Delta::SongChange {
                song_id: "s2".to_string(),
                song_index: 1,
                setlist_id: None,
            },
        );
        assert!(!position.is_auto_scrolling);
        assert_eq!(position.current_arrangement_id, None);
        assert_eq!(position.current_song_index, 1);
    }

    #[test]
    fn test_full_sync_round_trip() {
        let position = PerformancePosition {
            current_song_index: 2,
            current_song_id: Some("s3".to_string()),
            setlist_id: Some("set-1".to_string()),
            current_section_id: Some("bridge".to_string()),
            current_arrangement_id: Some("a7".to_string()),
            tempo: 84,
            is_playing: true,
            show_all_sections: true,
            is_auto_scrolling: true,
            scroll_speed_multiplier: 1.25,
        };
        let delta = Delta::from_json(&Delta::full_sync(&position).to_json().unwrap()).unwrap();
        let mut mirror = PerformancePosition::default();
        apply(&mut mirror, &delta);
        assert_eq!(mirror, position);
    }

    #[test]
    fn test_scroll_speed_clamped_on_apply() {
        let mut position = PerformancePosition::default();
        apply(
            &mut position,
            &Delta::AutoScrollChange {
                is_scrolling: true,
                scroll_speed: 9.0,
            },
        );
        assert_eq!(position.scroll_speed_multiplier, 3.0);
    }
}
