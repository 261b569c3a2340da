//! # Song Data and Preferences
//!
//! Read access to songs and setlists, the single write made after a
//! transpose, and the small per-user preference record.
//!
//! ## On-disk layout of [`LocalStore`]
//! ```text
//! <root>/
//!   songs/<song-id>.yaml
//!   setlists/<setlist-id>.yaml
//! ```
//!
//! ## Cancellable loads
//! Navigation can outrun a fetch. [`LoadTracker`] hands out a ticket per
//! load; finishing with a ticket that a newer load superseded yields
//! `LiveError::AbortedLoad`, which callers discard silently.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LiveError, Result};
use crate::model::{clamp_scroll_speed, SectionContent, Setlist, Song};

/// Smallest zoom factor a song can be shown at.
pub const MIN_ZOOM: f32 = 0.3;
/// Largest zoom factor.
pub const MAX_ZOOM: f32 = 1.0;

/// Where songs and setlists come from.
pub trait DataProvider: Send + Sync {
    fn fetch_song(&self, song_id: &str) -> Result<Song>;

    fn fetch_setlist(&self, setlist_id: &str) -> Result<Setlist>;

    /// Persist a transpose. Writing the same key and content twice is harmless.
    fn update_key_and_sections(&self, song_id: &str, new_key: &str, sections: &[SectionContent]) -> Result<()>;
}

fn apply_update(song: &mut Song, new_key: &str, sections: &[SectionContent]) {
    song.current_key = new_key.to_string();
    for update in sections {
        match song.section_mut(&update.id) {
            Some(section) => section.content = update.content.clone(),
            None => debug!("Skipping update for unknown section {}", update.id),
        }
    }
}

/// Songs and setlists held in memory.
#[derive(Default)]
pub struct MemoryProvider {
    songs: RwLock<HashMap<String, Song>>,
    setlists: RwLock<HashMap<String, Setlist>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_song(&self, song: Song) {
        self.songs.write().insert(song.id.clone(), song);
    }

    pub fn insert_setlist(&self, setlist: Setlist) {
        self.setlists.write().insert(setlist.id.clone(), setlist);
    }
}

impl DataProvider for MemoryProvider {
    fn fetch_song(&self, song_id: &str) -> Result<Song> {
        self.songs
            .read()
            .get(song_id)
            .cloned()
            .ok_or_else(|| LiveError::not_found("song", song_id))
    }

    fn fetch_setlist(&self, setlist_id: &str) -> Result<Setlist> {
        self.setlists
            .read()
            .get(setlist_id)
            .cloned()
            .ok_or_else(|| LiveError::not_found("setlist", setlist_id))
    }

    fn update_key_and_sections(&self, song_id: &str, new_key: &str, sections: &[SectionContent]) -> Result<()> {
        let mut songs = self.songs.write();
        let song = songs
            .get_mut(song_id)
            .ok_or_else(|| LiveError::not_found("song", song_id))?;
        apply_update(song, new_key, sections);
        Ok(())
    }
}

/// Directory of YAML files, used by the offline music director.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn song_path(&self, song_id: &str) -> PathBuf {
        self.root.join("songs").join(format!("{}.yaml", song_id))
    }

    fn setlist_path(&self, setlist_id: &str) -> PathBuf {
        self.root.join("setlists").join(format!("{}.yaml", setlist_id))
    }

    fn read(path: &Path, kind: &'static str, id: &str) -> Result<String> {
        match fs::read_to_string(path) {
            Ok(source) => Ok(source),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(LiveError::not_found(kind, id)),
            Err(err) => Err(err.into()),
        }
    }

    fn write(path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn save_song(&self, song: &Song) -> Result<()> {
        Self::write(&self.song_path(&song.id), &serde_yaml::to_string(song)?)
    }

    pub fn save_setlist(&self, setlist: &Setlist) -> Result<()> {
        Self::write(&self.setlist_path(&setlist.id), &serde_yaml::to_string(setlist)?)
    }
}

impl DataProvider for LocalStore {
    fn fetch_song(&self, song_id: &str) -> Result<Song> {
        let source = Self::read(&self.song_path(song_id), "song", song_id)?;
        Song::from_yaml_str(&source)
    }

    fn fetch_setlist(&self, setlist_id: &str) -> Result<Setlist> {
        let source = Self::read(&self.setlist_path(setlist_id), "setlist", setlist_id)?;
        Ok(serde_yaml::from_str(&source)?)
    }

    fn update_key_and_sections(&self, song_id: &str, new_key: &str, sections: &[SectionContent]) -> Result<()> {
        let mut song = self.fetch_song(song_id)?;
        apply_update(&mut song, new_key, sections);
        self.save_song(&song)
    }
}

/// Per-user display preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default = "default_scroll_speed")]
    pub auto_scroll_speed: f32,
    #[serde(default)]
    pub simplify_chords: bool,
    /// Song id to zoom factor.
    #[serde(default)]
    pub zoom: HashMap<String, f32>,
    /// Setlist id to the ids of songs already played.
    #[serde(default)]
    pub completed_songs: HashMap<String, BTreeSet<String>>,
}

fn default_scroll_speed() -> f32 {
    1.0
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            auto_scroll_speed: default_scroll_speed(),
            simplify_chords: false,
            zoom: HashMap::new(),
            completed_songs: HashMap::new(),
        }
    }
}

impl Preferences {
    pub fn set_auto_scroll_speed(&mut self, speed: f32) {
        self.auto_scroll_speed = clamp_scroll_speed(speed);
    }

    pub fn zoom_for(&self, song_id: &str) -> f32 {
        self.zoom.get(song_id).copied().unwrap_or(MAX_ZOOM)
    }

    /// Store a zoom factor, clamped to [`MIN_ZOOM`]..=[`MAX_ZOOM`].
    pub fn set_zoom(&mut self, song_id: &str, zoom: f32) {
        let zoom = if zoom.is_nan() { MAX_ZOOM } else { zoom.clamp(MIN_ZOOM, MAX_ZOOM) };
        self.zoom.insert(song_id.to_string(), zoom);
    }

    pub fn mark_completed(&mut self, setlist_id: &str, song_id: &str) {
        self.completed_songs
            .entry(setlist_id.to_string())
            .or_default()
            .insert(song_id.to_string());
    }

    pub fn is_completed(&self, setlist_id: &str, song_id: &str) -> bool {
        self.completed_songs
            .get(setlist_id)
            .is_some_and(|songs| songs.contains(song_id))
    }

    pub fn clear_completed(&mut self, setlist_id: &str) {
        self.completed_songs.remove(setlist_id);
    }
}

pub trait PreferenceStore: Send + Sync {
    /// Current preferences; defaults when nothing was stored.
    fn load(&self) -> Preferences;

    fn save(&self, preferences: &Preferences) -> Result<()>;

    /// Load, change and save in one step.
    fn update(&self, change: &mut dyn FnMut(&mut Preferences)) -> Result<Preferences> {
        let mut preferences = self.load();
        change(&mut preferences);
        self.save(&preferences)?;
        Ok(preferences)
    }
}

#[derive(Default)]
pub struct MemoryPreferences {
    inner: RwLock<Preferences>,
}

impl PreferenceStore for MemoryPreferences {
    fn load(&self) -> Preferences {
        self.inner.read().clone()
    }

    fn save(&self, preferences: &Preferences) -> Result<()> {
        *self.inner.write() = preferences.clone();
        Ok(())
    }
}

/// Preferences kept in a JSON file.
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PreferenceStore for FilePreferences {
    fn load(&self) -> Preferences {
        let source = match fs::read_to_string(&self.path) {
            Ok(source) => source,
            Err(_) => return Preferences::default(),
        };
        match serde_json::from_str(&source) {
            Ok(preferences) => preferences,
            Err(err) => {
                warn!("Ignoring unreadable preferences {}: {}", self.path.display(), err);
                Preferences::default()
            }
        }
    }

    fn save(&self, preferences: &Preferences) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(preferences)?)?;
        Ok(())
    }
}

/// Ticket for one in-flight load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    song_id: String,
}

impl LoadTicket {
    pub fn song_id(&self) -> &str {
        &self.song_id
    }
}

/// Discards responses of loads that a newer load superseded.
#[derive(Debug, Default)]
pub struct LoadTracker {
    generation: AtomicU64,
}

impl LoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a load, superseding every earlier one.
    pub fn begin(&self, song_id: &str) -> LoadTicket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        LoadTicket {
            generation,
            song_id: song_id.to_string(),
        }
    }

    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.generation
    }

    /// Pass `result` through if `ticket` is still the latest load.
    pub fn finish<T>(&self, ticket: &LoadTicket, result: Result<T>) -> Result<T> {
        if !self.is_current(ticket) {
            debug!("Discarding superseded load of {}", ticket.song_id);
            return Err(LiveError::AbortedLoad {
                song_id: ticket.song_id.clone(),
            });
        }
        result
    }

    /// Supersede every in-flight load without starting a new one.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_song;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("chordflow-test-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_memory_provider() {
        let provider = MemoryProvider::new();
        provider.insert_song(sample_song());
        assert_eq!(provider.fetch_song("song-1").unwrap().title, "Amazing Grace");

        let err = provider.fetch_song("missing").unwrap_err();
        assert!(matches!(err, LiveError::DataNotFound { kind: "song", .. }));
        assert!(provider.fetch_setlist("none").is_err());
    }

    #[test]
    fn test_update_is_idempotent() {
        let provider = MemoryProvider::new();
        provider.insert_song(sample_song());
        let sections = vec![SectionContent {
            id: "verse".to_string(),
            content: "A D A".to_string(),
        }];
        provider.update_key_and_sections("song-1", "A", &sections).unwrap();
        let once = provider.fetch_song("song-1").unwrap();
        provider.update_key_and_sections("song-1", "A", &sections).unwrap();
        assert_eq!(provider.fetch_song("song-1").unwrap(), once);
        assert_eq!(once.current_key, "A");
        assert_eq!(once.section("verse").unwrap().content, "A D A");
    }

    #[test]
    fn test_local_store_round_trip() {
        let dir = scratch_dir();
        let store = LocalStore::new(&dir);
        store.save_song(&sample_song()).unwrap();
        store
            .save_setlist(&Setlist {
                id: "set-1".to_string(),
                name: "Sunday".to_string(),
                song_ids: vec!["song-1".to_string()],
            })
            .unwrap();

        assert_eq!(store.fetch_song("song-1").unwrap(), sample_song());
        assert_eq!(store.fetch_setlist("set-1").unwrap().song_ids, vec!["song-1"]);
        assert!(matches!(
            store.fetch_song("nope").unwrap_err(),
            LiveError::DataNotFound { .. }
        ));

        store
            .update_key_and_sections(
                "song-1",
                "A",
                &[SectionContent {
                    id: "chorus".to_string(),
                    content: "D A E".to_string(),
                }],
            )
            .unwrap();
        let song = store.fetch_song("song-1").unwrap();
        assert_eq!(song.current_key, "A");
        assert_eq!(song.section("chorus").unwrap().content, "D A E");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_preferences_clamp_and_completed() {
        let mut prefs = Preferences::default();
        prefs.set_zoom("song-1", 0.1);
        prefs.set_zoom("song-2", 4.0);
        assert_eq!(prefs.zoom_for("song-1"), MIN_ZOOM);
        assert_eq!(prefs.zoom_for("song-2"), MAX_ZOOM);
        assert_eq!(prefs.zoom_for("song-3"), MAX_ZOOM);

        prefs.set_auto_scroll_speed(0.0);
        assert_eq!(prefs.auto_scroll_speed, 0.1);

        prefs.mark_completed("set-1", "song-1");
        prefs.mark_completed("set-1", "song-1");
        assert!(prefs.is_completed("set-1", "song-1"));
        assert!(!prefs.is_completed("set-2", "song-1"));
        prefs.clear_completed("set-1");
        assert!(!prefs.is_completed("set-1", "song-1"));
    }

    #[test]
    fn test_file_preferences() {
        let dir = scratch_dir();
        let store = FilePreferences::new(dir.join("prefs.json"));
        assert_eq!(store.load(), Preferences::default());

        store
            .update(&mut |prefs: &mut Preferences| {
                prefs.simplify_chords = true;
                prefs.set_zoom("song-1", 0.5);
            })
            .unwrap();
        let loaded = store.load();
        assert!(loaded.simplify_chords);
        assert_eq!(loaded.zoom_for("song-1"), 0.5);

        fs::write(dir.join("prefs.json"), "not json").unwrap();
        assert_eq!(store.load(), Preferences::default());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_superseded_load_is_aborted() {
        let tracker = LoadTracker::new();
        let first = tracker.begin("song-1");
        let second = tracker.begin("song-2");

        let stale = tracker.finish(&first, Ok(1));
        assert!(matches!(stale, Err(LiveError::AbortedLoad { ref song_id }) if song_id == "song-1"));
        assert_eq!(tracker.finish(&second, Ok(2)).unwrap(), 2);

        tracker.cancel();
        assert!(!tracker.is_current(&second));
    }
}
