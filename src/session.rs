//! # Live Session
//!
//! One device's view of a live performance: the synchronizer, the channel,
//! song loading, auto-scroll and rendering wired together.
//!
//! ```text
//!            act(command)                        next_event().await
//!                │                                      │
//!                ▼                                      ▼
//!   StateSynchronizer ◄── receive(from, delta) ◄── ChannelEvents
//!        │    │                                         │
//!        │    └── broadcast ──► ChannelManager          └── Roster: owner schedules
//!        │                                                  a setlist-sync after
//!        ├── song id changed ──► load task (LoadTracker)     the settle delay
//!        └── AutoScroller::sync
//! ```
//!
//! Transport, provider and load failures never end the session. They are
//! logged and queued as notices, see [`LiveSession::take_notices`].

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, ChannelEvents, ChannelManager, Transport};
use crate::config::LiveConfig;
use crate::error::{LiveError, Result};
use crate::model::{Participant, ParticipantRole, Song};
use crate::offline::{select_link, LinkOpener, OfflineRole, OfflineRoute, OfflineTransport, SyncState};
use crate::render::{DisplayModel, RenderOptions, Renderer};
use crate::scroll::{AutoScroller, ScrollState, ScrollTarget};
use crate::store::{DataProvider, LoadTicket, LoadTracker, PreferenceStore, Preferences};
use crate::sync::{Delta, NavigationOutcome, Outcome, OwnerCommand, StateSynchronizer};

/// Who is joining which session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub session_id: String,
    pub owner_id: String,
    pub local: Participant,
    pub setlist_id: Option<String>,
}

/// What [`LiveSession::next_event`] reports.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Roster(Vec<Participant>),
    /// An inbound delta from the owner was applied.
    Applied(Delta),
    SongLoaded(String),
    /// A transient problem worth showing briefly.
    Notice(String),
}

enum Internal {
    Resync,
    Loaded { ticket: LoadTicket, result: Result<Song> },
}

pub struct LiveSession {
    session_id: String,
    config: LiveConfig,
    sync: Arc<Mutex<StateSynchronizer>>,
    channel: ChannelManager,
    events: ChannelEvents,
    provider: Arc<dyn DataProvider>,
    preferences: Arc<dyn PreferenceStore>,
    offline: Option<Arc<OfflineTransport>>,
    renderer: Renderer,
    scroller: AutoScroller,
    scroll_target: ScrollTarget,
    loads: LoadTracker,
    pending_load: Option<String>,
    internal_tx: UnboundedSender<Internal>,
    internal_rx: UnboundedReceiver<Internal>,
    tasks: Vec<JoinHandle<()>>,
    notices: Vec<String>,
}

impl LiveSession {
    /// Join a session over `transport`. Must be called inside a tokio runtime.
    pub fn join(
        options: SessionOptions,
        transport: Arc<dyn Transport>,
        provider: Arc<dyn DataProvider>,
        preferences: Arc<dyn PreferenceStore>,
        config: LiveConfig,
    ) -> Result<Self> {
        let SessionOptions {
            session_id,
            owner_id,
            local,
            setlist_id,
        } = options;

        let mut synchronizer = StateSynchronizer::new(local.id.clone(), owner_id.clone());
        synchronizer.seed_scroll_speed(preferences.load().auto_scroll_speed);
        let mut notices = Vec::new();
        let mut first_song = None;
        if let Some(setlist_id) = setlist_id.as_deref() {
            match provider.fetch_setlist(setlist_id) {
                Ok(setlist) => {
                    first_song = setlist.song_ids.first().cloned();
                    synchronizer.set_setlist(setlist);
                }
                Err(err) => {
                    warn!("Setlist {} unavailable: {}", setlist_id, err);
                    notices.push(err.to_string());
                }
            }
        }
        let is_owner = synchronizer.is_owner();

        let (channel, events) = ChannelManager::join(transport, &session_id, &owner_id, local)?;
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let mut session = Self {
            session_id,
            renderer: Renderer::new().with_bars_per_line(config.bars_per_line),
            scroller: AutoScroller::new(config.line_height_px, config.tick()),
            config,
            sync: Arc::new(Mutex::new(synchronizer)),
            channel,
            events,
            provider,
            preferences,
            offline: None,
            scroll_target: ScrollTarget::default(),
            loads: LoadTracker::new(),
            pending_load: None,
            internal_tx,
            internal_rx,
            tasks: Vec::new(),
            notices,
        };
        if is_owner {
            if let Some(song_id) = first_song {
                session.start_load(song_id);
            }
        }
        Ok(session)
    }

    /// Join on the local link instead of the messaging service.
    ///
    /// Hosting elects this device music director and makes it the session
    /// owner; its initial state comes from `provider`. Link candidates are
    /// tried in order.
    pub fn join_offline(
        mut options: SessionOptions,
        route: OfflineRoute,
        links: Vec<(&'static str, LinkOpener)>,
        provider: Arc<dyn DataProvider>,
        preferences: Arc<dyn PreferenceStore>,
        config: LiveConfig,
    ) -> Result<Self> {
        let role = OfflineRole::elect(route);
        if role == OfflineRole::Md {
            options.owner_id = options.local.id.clone();
        }
        let opened = select_link(links)?;
        let transport = Arc::new(OfflineTransport::new(
            role,
            options.local.id.clone(),
            opened,
            config.offline_retry(),
        ));

        if let Some(setlist_id) = options.setlist_id.as_deref() {
            match provider.fetch_setlist(setlist_id) {
                Ok(setlist) => {
                    if role == OfflineRole::Md {
                        transport.set_state(SyncState {
                            setlist_id: Some(setlist.id.clone()),
                            setlist_name: Some(setlist.name.clone()),
                            current_song_index: Some(0),
                            current_song_id: setlist.song_ids.first().cloned(),
                            current_section_index: Some(0),
                            is_playing: Some(false),
                            tempo: Some(config.default_tempo),
                            ..Default::default()
                        });
                    }
                    transport.set_setlist(setlist);
                }
                Err(err) => debug!("No local setlist {}: {}", setlist_id, err),
            }
        }
        info!("Offline session as {:?} on {}", role, config.offline_channel);

        let mut session = Self::join(options, transport.clone(), provider, preferences, config)?;
        session.offline = Some(transport);
        Ok(session)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    pub fn is_owner(&self) -> bool {
        self.channel.is_owner()
    }

    pub fn local(&self) -> &Participant {
        self.channel.local()
    }

    pub fn roster(&self) -> Vec<Participant> {
        self.channel.roster()
    }

    /// Shared handle to the synchronizer, for readers on other tasks.
    pub fn synchronizer(&self) -> Arc<Mutex<StateSynchronizer>> {
        Arc::clone(&self.sync)
    }

    pub fn scroll_offset(&self) -> f64 {
        self.scroller.offset()
    }

    pub fn scroll_offsets(&self) -> tokio::sync::watch::Receiver<f64> {
        self.scroller.subscribe()
    }

    /// Drain queued notices.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    fn notice(&mut self, err: &LiveError) {
        warn!("{}", err);
        self.notices.push(err.to_string());
    }

    /// Run an owner command and broadcast the result.
    pub fn act(&mut self, command: OwnerCommand) -> Result<Outcome> {
        let persist_speed = match command {
            OwnerCommand::SetScrollSpeed(speed) => Some(speed),
            _ => None,
        };
        let outcome = self.sync.lock().act(command)?;
        let Outcome::Broadcast(delta) = &outcome else {
            return Ok(outcome);
        };

        if let Err(err) = self.channel.broadcast(delta) {
            self.notice(&err);
        }
        if let Delta::TransposeChange { new_key, sections, .. } = delta {
            let song_id = self.sync.lock().song().map(|s| s.id.clone());
            if let Some(song_id) = song_id {
                if let Err(err) = self.provider.update_key_and_sections(&song_id, new_key, sections) {
                    self.notice(&err);
                }
            }
        }
        if let Some(speed) = persist_speed {
            if let Err(err) = self.preferences
                .update(&mut |prefs: &mut Preferences| prefs.set_auto_scroll_speed(speed)) {
                self.notice(&err);
            }
        }
        self.after_change();
        Ok(outcome)
    }

    /// Wait for the next thing worth reporting. `None` once the channel closed.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            tokio::select! {
                event = self.events.next() => {
                    let event = event?;
                    if let Some(out) = self.handle_channel_event(event) {
                        return Some(out);
                    }
                }
                Some(internal) = self.internal_rx.recv() => {
                    if let Some(out) = self.handle_internal(internal) {
                        return Some(out);
                    }
                }
            }
        }
    }

    fn handle_channel_event(&mut self, event: ChannelEvent) -> Option<SessionEvent> {
        match event {
            ChannelEvent::Roster { participants, joined } => {
                let local_id = self.channel.local().id.clone();
                let newcomers = joined.iter().filter(|id| **id != local_id).count();
                if self.is_owner() && newcomers > 0 {
                    self.schedule_resync();
                }
                Some(SessionEvent::Roster(participants))
            }
            ChannelEvent::Delta { from, delta } => {
                if !self.sync.lock().receive(&from, &delta) {
                    return None;
                }
                self.after_change();
                Some(SessionEvent::Applied(delta))
            }
            ChannelEvent::OwnerChanged { owner_id, participants } => {
                self.sync.lock().set_owner(owner_id);
                Some(SessionEvent::Roster(participants))
            }
        }
    }

    fn handle_internal(&mut self, internal: Internal) -> Option<SessionEvent> {
        match internal {
            Internal::Resync => {
                let delta = self.sync.lock().full_sync();
                debug!("Sending setlist-sync to new subscribers");
                if let Err(err) = self.channel.broadcast(&delta) {
                    self.notice(&err);
                }
                None
            }
            Internal::Loaded { ticket, result } => match self.loads.finish(&ticket, result) {
                Ok(song) => {
                    self.pending_load = None;
                    let song_id = song.id.clone();
                    if let Some(offline) = self.offline.as_ref() {
                        offline.set_song(song.clone());
                    }
                    let tempo = self.sync.lock().load_song(song);
                    if let Some(delta) = tempo {
                        if let Err(err) = self.channel.broadcast(&delta) {
                            self.notice(&err);
                        }
                    }
                    self.after_change();
                    Some(SessionEvent::SongLoaded(song_id))
                }
                Err(LiveError::AbortedLoad { .. }) => None,
                Err(err) => {
                    self.pending_load = None;
                    self.notice(&err);
                    Some(SessionEvent::Notice(err.to_string()))
                }
            },
        }
    }

    fn schedule_resync(&mut self) {
        let tx = self.internal_tx.clone();
        let settle = self.config.resync_settle();
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let _ = tx.send(Internal::Resync);
        }));
    }

    fn start_load(&mut self, song_id: String) {
        if self.pending_load.as_deref() == Some(song_id.as_str()) {
            return;
        }
        let ticket = self.loads.begin(&song_id);
        self.pending_load = Some(song_id.clone());
        let provider = Arc::clone(&self.provider);
        let tx = self.internal_tx.clone();
        debug!("Loading song {}", song_id);
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(tokio::spawn(async move {
            let result = match tokio::task::spawn_blocking(move || provider.fetch_song(&song_id)).await {
                Ok(result) => result,
                Err(err) => Err(LiveError::TransportUnavailable(format!("song load failed: {}", err))),
            };
            let _ = tx.send(Internal::Loaded { ticket, result });
        }));
    }

    /// Follow up on a position change: fetch a newly referenced song and
    /// bring the scroller in line.
    fn after_change(&mut self) {
        let (wanted, loaded) = {
            let sync = self.sync.lock();
            (
                sync.position().current_song_id.clone(),
                sync.song().map(|s| s.id.clone()),
            )
        };
        if let Some(song_id) = wanted {
            if loaded.as_deref() != Some(song_id.as_str()) {
                self.start_load(song_id);
            }
        }
        self.refresh_scroll();
    }

    fn refresh_scroll(&mut self) {
        let state = {
            let sync = self.sync.lock();
            let position = sync.position();
            let time_signature = sync.song().map(|s| s.time_signature).unwrap_or_default();
            ScrollState {
                enabled: position.is_auto_scrolling && sync.song().is_some(),
                tempo: position.tempo,
                time_signature,
                multiplier: position.scroll_speed_multiplier,
                song_id: position.current_song_id.clone(),
                target: self.scroll_target,
            }
        };
        self.scroller.sync(&state);
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        self.scroll_target = if fullscreen {
            ScrollTarget::Fullscreen
        } else {
            ScrollTarget::Inline
        };
        self.refresh_scroll();
    }

    /// Change the local performer role; peers see it through presence.
    pub fn set_role(&mut self, role: ParticipantRole) {
        if let Err(err) = self.channel.set_role(role) {
            self.notice(&err);
        }
    }

    pub fn set_simplify_chords(&mut self, simplify: bool) -> Result<()> {
        self.preferences
            .update(&mut |prefs: &mut Preferences| prefs.simplify_chords = simplify)
            .map(|_| ())
    }

    /// Current display for the local role.
    pub fn display(&self) -> DisplayModel {
        let simplify_chords = self.preferences.load().simplify_chords;
        let role = self.channel.local().role;
        let sync = self.sync.lock();
        let Some(song) = sync.song() else {
            return DisplayModel::no_section_selected();
        };
        let position = sync.display_position();
        let options = RenderOptions {
            theme: song.theme,
            simplify_chords,
            show_all_sections: position.show_all_sections,
        };
        self.renderer.render_song(song, position, role, &options)
    }

    pub fn enter_independent(&mut self) {
        self.sync.lock().enter_independent();
    }

    pub fn exit_independent(&mut self) {
        self.sync.lock().exit_independent();
    }

    pub fn browse(&mut self, direction: isize) -> NavigationOutcome {
        self.sync.lock().browse(direction)
    }

    /// Stop timers, cancel loads and leave the channel.
    pub fn leave(&mut self) {
        self.scroller.stop();
        self.loads.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.channel.leave();
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.leave();
    }
}
