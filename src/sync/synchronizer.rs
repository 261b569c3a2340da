use tracing::{debug, info};

use super::delta::{apply, Delta};
use crate::error::{LiveError, Result};
use crate::model::{
    clamp_scroll_speed, now_millis, IndependentPosition, PerformancePosition, Setlist, Song,
};
use crate::transpose::transpose_song;

/// Something the owner does on their controller.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnerCommand {
    NextSection,
    PreviousSection,
    JumpTo { arrangement_id: String },
    SetTempo(u32),
    TogglePlay,
    SetAutoScroll(bool),
    SetScrollSpeed(f32),
    SetShowAllSections(bool),
    NextSong,
    PreviousSong,
    ChangeSong { song_index: usize },
    Transpose { to_key: String, prefer_sharps: bool },
}

/// Result of an owner command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Applied locally; send this to everyone.
    Broadcast(Delta),
    /// Already on the first section or song. Informational.
    AtFirst,
    /// Already on the last section or song. Informational.
    AtLast,
    /// This device does not own the session.
    NotOwner,
}

/// Result of moving a local browsing position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    Moved,
    AtFirst,
    AtLast,
}

/// Holds the canonical position (owner) or its mirror (everyone else).
///
/// Owner commands build a delta and apply it through the same reducer that
/// viewers run on inbound deltas, so the owner and every mirror converge on
/// the same state for the same delta sequence.
#[derive(Debug, Clone)]
pub struct StateSynchronizer {
    local_id: String,
    owner_id: String,
    position: PerformancePosition,
    independent: Option<IndependentPosition>,
    song: Option<Song>,
    setlist: Option<Setlist>,
}

impl StateSynchronizer {
    pub fn new(local_id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            owner_id: owner_id.into(),
            position: PerformancePosition::default(),
            independent: None,
            song: None,
            setlist: None,
        }
    }

    pub fn is_owner(&self) -> bool {
        self.local_id == self.owner_id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn position(&self) -> &PerformancePosition {
        &self.position
    }

    pub fn song(&self) -> Option<&Song> {
        self.song.as_ref()
    }

    pub fn setlist(&self) -> Option<&Setlist> {
        self.setlist.as_ref()
    }

    pub fn set_setlist(&mut self, setlist: Setlist) {
        if self.position.setlist_id.is_none() {
            self.position.setlist_id = Some(setlist.id.clone());
        }
        self.setlist = Some(setlist);
    }

    /// Install the song the position points at and resolve pending ids.
    ///
    /// On the owner a newly installed song also sets the session tempo; the
    /// returned `tempo-change` must be broadcast so mirrors follow.
    pub fn load_song(&mut self, song: Song) -> Option<Delta> {
        let fresh = self.song.as_ref().map_or(true, |current| current.id != song.id);
        if self.position.current_song_id.is_none() {
            self.position.current_song_id = Some(song.id.clone());
            if let Some(index) = self.setlist.as_ref().and_then(|s| s.song_index(&song.id)) {
                self.position.current_song_index = index;
            }
        }
        self.position.resolve_against(&song);
        if let Some(independent) = self.independent.as_mut() {
            independent.resolve_against(&song);
        }

        let mut tempo = None;
        if self.is_owner() && fresh && self.position.tempo != song.tempo {
            debug!("Adopting tempo {} from {}", song.tempo, song.id);
            let delta = Delta::TempoChange {
                tempo: song.tempo,
                song_id: Some(song.id.clone()),
                setlist_id: self.position.setlist_id.clone(),
            };
            apply(&mut self.position, &delta);
            tempo = Some(delta);
        }
        self.song = Some(song);
        tempo
    }

    /// Hand ownership to `owner_id`, e.g. once an offline guest learns who
    /// the music director is.
    pub fn set_owner(&mut self, owner_id: impl Into<String>) {
        self.owner_id = owner_id.into();
    }

    /// Start the owner's scroll speed from a remembered preference. Mirrors
    /// take theirs from the owner.
    pub fn seed_scroll_speed(&mut self, speed: f32) {
        if self.is_owner() {
            self.position.scroll_speed_multiplier = clamp_scroll_speed(speed);
        }
    }

    /// Apply a delta received from `from`. Deltas from anyone but the owner
    /// are ignored. Returns whether the delta was applied.
    pub fn receive(&mut self, from: &str, delta: &Delta) -> bool {
        if from != self.owner_id {
            debug!("Ignoring {} from non-owner {}", delta.kind(), from);
            return false;
        }
        self.apply_local(delta);
        true
    }

    fn apply_local(&mut self, delta: &Delta) {
        apply(&mut self.position, delta);

        match delta {
            Delta::TransposeChange { new_key, sections, .. } => {
                if let Some(song) = self.song.as_mut() {
                    song.current_key = new_key.clone();
                    for update in sections {
                        if let Some(section) = song.section_mut(&update.id) {
                            section.content = update.content.clone();
                        }
                    }
                }
            }
            Delta::SongChange { song_id, .. } | Delta::SetlistSync { active_song_id: Some(song_id), .. } => {
                if self.song.as_ref().is_some_and(|s| &s.id != song_id) {
                    self.song = None;
                }
            }
            _ => {}
        }

        if let Some(song) = self.song.as_ref() {
            self.position.resolve_against(song);
        }
    }

    /// Run an owner command.
    pub fn act(&mut self, command: OwnerCommand) -> Result<Outcome> {
        if !self.is_owner() {
            return Ok(Outcome::NotOwner);
        }

        let delta = match command {
            OwnerCommand::NextSection => match self.step_section(1)? {
                Step::To(index) => self.section_change_to(index)?,
                Step::AtFirst => return Ok(Outcome::AtFirst),
                Step::AtLast => return Ok(Outcome::AtLast),
            },
            OwnerCommand::PreviousSection => match self.step_section(-1)? {
                Step::To(index) => self.section_change_to(index)?,
                Step::AtFirst => return Ok(Outcome::AtFirst),
                Step::AtLast => return Ok(Outcome::AtLast),
            },
            OwnerCommand::JumpTo { arrangement_id } => {
                let song = self.require_song()?;
                let index = song
                    .arrangement_index(&arrangement_id)
                    .ok_or_else(|| LiveError::not_found("arrangement", arrangement_id))?;
                self.section_change_to(index)?
            }
            OwnerCommand::SetTempo(tempo) => Delta::TempoChange {
                tempo,
                song_id: self.position.current_song_id.clone(),
                setlist_id: self.position.setlist_id.clone(),
            },
            OwnerCommand::TogglePlay => Delta::SectionChange {
                section_id: self.position.current_section_id.clone(),
                arrangement_id: self.position.current_arrangement_id.clone(),
                is_playing: !self.position.is_playing,
                show_all_sections: self.position.show_all_sections,
                song_id: self.position.current_song_id.clone(),
                setlist_id: self.position.setlist_id.clone(),
            },
            OwnerCommand::SetAutoScroll(enabled) => Delta::AutoScrollChange {
                is_scrolling: enabled,
                scroll_speed: self.position.scroll_speed_multiplier,
            },
            OwnerCommand::SetScrollSpeed(speed) => Delta::AutoScrollChange {
                is_scrolling: self.position.is_auto_scrolling,
                scroll_speed: clamp_scroll_speed(speed),
            },
            OwnerCommand::SetShowAllSections(show) => Delta::ShowAllSectionsChange {
                show_all_sections: show,
            },
            OwnerCommand::NextSong => match self.step_song(1)? {
                Step::To(index) => self.song_change_to(index)?,
                Step::AtFirst => return Ok(Outcome::AtFirst),
                Step::AtLast => return Ok(Outcome::AtLast),
            },
            OwnerCommand::PreviousSong => match self.step_song(-1)? {
                Step::To(index) => self.song_change_to(index)?,
                Step::AtFirst => return Ok(Outcome::AtFirst),
                Step::AtLast => return Ok(Outcome::AtLast),
            },
            OwnerCommand::ChangeSong { song_index } => self.song_change_to(song_index)?,
            OwnerCommand::Transpose { to_key, prefer_sharps } => {
                let song = self.require_song()?;
                let transposed = transpose_song(song, &to_key, prefer_sharps)?;
                info!(
                    "Transposing {} from {} to {}",
                    song.id, transposed.old_key, transposed.new_key
                );
                Delta::TransposeChange {
                    new_key: transposed.new_key,
                    old_key: transposed.old_key,
                    sections: transposed.sections,
                    timestamp: now_millis(),
                }
            }
        };

        self.apply_local(&delta);
        Ok(Outcome::Broadcast(delta))
    }

    /// Full-state delta for a late joiner.
    pub fn full_sync(&self) -> Delta {
        Delta::full_sync(&self.position)
    }

    /// The loaded song. A position that names a song still loading is a
    /// stale reference rather than missing data.
    fn require_song(&self) -> Result<&Song> {
        match (self.song.as_ref(), self.position.current_song_id.as_deref()) {
            (Some(song), _) => Ok(song),
            (None, Some(id)) => Err(LiveError::StaleReference(format!("song {}", id))),
            (None, None) => Err(LiveError::not_found("song", "")),
        }
    }

    fn step_section(&self, direction: isize) -> Result<Step> {
        let song = self.require_song()?;
        Ok(step_arrangement(song, self.position.current_arrangement_id.as_deref(), direction))
    }

    fn section_change_to(&self, index: usize) -> Result<Delta> {
        let song = self.require_song()?;
        let arrangement = song
            .arrangement_at(index)
            .ok_or_else(|| LiveError::not_found("arrangement", index.to_string()))?;
        Ok(Delta::SectionChange {
            section_id: Some(arrangement.section_id.clone()),
            arrangement_id: Some(arrangement.id.clone()),
            is_playing: self.position.is_playing,
            show_all_sections: false,
            song_id: Some(song.id.clone()),
            setlist_id: self.position.setlist_id.clone(),
        })
    }

    fn step_song(&self, direction: isize) -> Result<Step> {
        let setlist = self
            .setlist
            .as_ref()
            .ok_or_else(|| LiveError::not_found("setlist", self.position.setlist_id.clone().unwrap_or_default()))?;
        let current = self.position.current_song_index as isize;
        let target = current + direction;
        if target < 0 {
            Ok(Step::AtFirst)
        } else if target as usize >= setlist.song_ids.len() {
            Ok(Step::AtLast)
        } else {
            Ok(Step::To(target as usize))
        }
    }

    fn song_change_to(&self, index: usize) -> Result<Delta> {
        let setlist = self
            .setlist
            .as_ref()
            .ok_or_else(|| LiveError::not_found("setlist", self.position.setlist_id.clone().unwrap_or_default()))?;
        let song_id = setlist
            .song_ids
            .get(index)
            .ok_or_else(|| LiveError::not_found("song", format!("{}#{}", setlist.id, index)))?;
        Ok(Delta::SongChange {
            song_id: song_id.clone(),
            song_index: index,
            setlist_id: Some(setlist.id.clone()),
        })
    }

    // Independent browsing

    pub fn is_independent(&self) -> bool {
        self.independent.is_some()
    }

    /// Start browsing locally from the current shared position.
    pub fn enter_independent(&mut self) {
        if self.independent.is_none() {
            self.independent = Some(self.position.clone());
        }
    }

    pub fn exit_independent(&mut self) {
        self.independent = None;
    }

    /// Move the local browsing position. Never produces a delta.
    pub fn browse(&mut self, direction: isize) -> NavigationOutcome {
        let Some(song) = self.song.as_ref() else {
            return if direction < 0 { NavigationOutcome::AtFirst } else { NavigationOutcome::AtLast };
        };
        let independent = self.independent.get_or_insert_with(|| self.position.clone());
        match step_arrangement(song, independent.current_arrangement_id.as_deref(), direction) {
            Step::To(index) => {
                if let Some(arrangement) = song.arrangement_at(index) {
                    independent.current_arrangement_id = Some(arrangement.id.clone());
                    independent.current_section_id = Some(arrangement.section_id.clone());
                }
                NavigationOutcome::Moved
            }
            Step::AtFirst => NavigationOutcome::AtFirst,
            Step::AtLast => NavigationOutcome::AtLast,
        }
    }

    /// Position to render: the independent one while browsing, else the shared one.
    pub fn display_position(&self) -> &PerformancePosition {
        self.independent.as_ref().unwrap_or(&self.position)
    }
}

enum Step {
    To(usize),
    AtFirst,
    AtLast,
}

fn step_arrangement(song: &Song, current: Option<&str>, direction: isize) -> Step {
    let count = song.arrangements.len();
    let current = current.and_then(|id| song.arrangement_index(id));
    let target = match current {
        Some(index) => index as isize + direction,
        // unresolved: moving forward starts at the top
        None if direction > 0 => 0,
        None => -1,
    };
    if target < 0 {
        Step::AtFirst
    } else if target as usize >= count {
        Step::AtLast
    } else {
        Step::To(target as usize)
    }
}
