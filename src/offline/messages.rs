use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::now_millis;

/// Message kinds spoken on the local link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    StateUpdate,
    SongChange,
    SectionChange,
    BarUpdate,
    TransposeChange,
    Play,
    Pause,
    Stop,
    SyncRequest,
    SyncResponse,
    ClientConnected,
    ClientDisconnected,
}

/// Partial session state. Only the fields that changed are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setlist_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setlist_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_song_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_song_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_section_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_bar: Option<u32>,
    /// Semitones relative to the stored key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transpose: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_playing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl SyncState {
    /// Overwrite every field `update` carries.
    pub fn merge(&mut self, update: &SyncState) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if update.$field.is_some() {
                    self.$field = update.$field.clone();
                })*
            };
        }
        take!(
            setlist_id,
            setlist_name,
            current_song_index,
            current_song_id,
            song_title,
            current_section_index,
            current_bar,
            transpose,
            is_playing,
            tempo,
            timestamp
        );
    }

    /// Message kind that best describes this update.
    ///
    /// A song index wins over a section index, which wins over a play flag.
    pub fn message_type(&self) -> MessageType {
        if self.current_song_index.is_some() {
            MessageType::SongChange
        } else if self.current_section_index.is_some() {
            MessageType::SectionChange
        } else if let Some(playing) = self.is_playing {
            if playing {
                MessageType::Play
            } else {
                MessageType::Pause
            }
        } else {
            MessageType::StateUpdate
        }
    }
}

/// One frame on the local link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub payload: SyncState,
    pub sender_id: String,
    pub timestamp: u64,
}

impl SyncMessage {
    pub fn new(kind: MessageType, payload: SyncState, sender_id: impl Into<String>) -> Self {
        Self {
            kind,
            payload,
            sender_id: sender_id.into(),
            timestamp: now_millis(),
        }
    }

    /// Build a message whose kind follows from the payload.
    pub fn update(payload: SyncState, sender_id: impl Into<String>) -> Self {
        Self::new(payload.message_type(), payload, sender_id)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(frame: &str) -> Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }
}
