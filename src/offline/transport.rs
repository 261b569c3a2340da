use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::link::{LocalLink, OpenedLink};
use super::messages::{MessageType, SyncMessage, SyncState};
use crate::channel::{Transport, TransportEvent};
use crate::error::{LiveError, Result};
use crate::model::{Participant, ParticipantRole, PerformancePosition, Setlist, Song};
use crate::sync::Delta;

/// How the device entered offline mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineRoute {
    /// Hosting the session from this device.
    Host,
    /// Joining a nearby host.
    Join,
}

/// Offline part played by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineRole {
    /// Music director: the offline session owner.
    Md,
    Guest,
}

impl OfflineRole {
    pub fn elect(route: OfflineRoute) -> Self {
        match route {
            OfflineRoute::Host => OfflineRole::Md,
            OfflineRoute::Join => OfflineRole::Guest,
        }
    }
}

/// Whether a session should start on the local link instead of the
/// messaging service.
pub fn use_offline(online: bool, explicit_offline_route: bool) -> bool {
    !online || explicit_offline_route
}

#[derive(Default)]
struct Shared {
    setlist: Option<Setlist>,
    song: Option<Song>,
    state: SyncState,
    local: Option<Participant>,
    peers: Vec<Participant>,
    events: Option<UnboundedSender<TransportEvent>>,
    synced: bool,
    md_id: Option<String>,
}

impl Shared {
    fn presence(&self) -> Vec<Participant> {
        self.local.iter().chain(self.peers.iter()).cloned().collect()
    }

    fn emit(&mut self, event: TransportEvent) {
        if let Some(tx) = self.events.as_ref() {
            if tx.send(event).is_err() {
                self.events = None;
            }
        }
    }

    fn emit_presence(&mut self) {
        let presence = self.presence();
        self.emit(TransportEvent::PresenceSync(presence));
    }

    fn add_peer(&mut self, id: &str) -> bool {
        if self.peers.iter().any(|p| p.id == id) {
            return false;
        }
        self.peers.push(Participant::new(id, id, ParticipantRole::None));
        true
    }

    fn song_id_at(&self, index: usize) -> Option<String> {
        self.setlist.as_ref()?.song_ids.get(index).cloned()
    }

    /// Song the stored state points at, if it is loaded.
    fn current_song(&self) -> Option<&Song> {
        let song = self.song.as_ref()?;
        match self.state.current_song_id.as_deref() {
            Some(id) if id != song.id => None,
            _ => Some(song),
        }
    }

    fn section_change_delta(&self) -> Option<Delta> {
        let song = self.current_song()?;
        let arrangement = song.arrangement_at(self.state.current_section_index.unwrap_or(0))?;
        Some(Delta::SectionChange {
            section_id: Some(arrangement.section_id.clone()),
            arrangement_id: Some(arrangement.id.clone()),
            is_playing: self.state.is_playing.unwrap_or(false),
            show_all_sections: false,
            song_id: Some(song.id.clone()),
            setlist_id: self.state.setlist_id.clone(),
        })
    }

    fn full_sync_delta(&self) -> Delta {
        let index = self.state.current_song_index.unwrap_or(0);
        let active_song_id = self.state.current_song_id.clone().or_else(|| self.song_id_at(index));
        let arrangement = self
            .current_song()
            .and_then(|song| song.arrangement_at(self.state.current_section_index.unwrap_or(0)));
        Delta::SetlistSync {
            active_song_id,
            current_song_index: index,
            current_arrangement_id: arrangement.map(|a| a.id.clone()),
            is_playing: self.state.is_playing.unwrap_or(false),
            tempo: self
                .state
                .tempo
                .unwrap_or_else(|| PerformancePosition::default().tempo),
            show_all_sections: false,
            setlist_id: self.state.setlist_id.clone(),
            current_section_id: arrangement.map(|a| a.section_id.clone()),
            is_auto_scrolling: None,
            scroll_speed: None,
        }
    }
}

/// [`Transport`] over a local link.
///
/// The music director translates outbound deltas into link messages; guests
/// translate inbound link messages back into deltas, so the synchronizer on
/// either side never sees offline-specific types. Only section, song, play
/// state and full-state messages travel; other deltas are dropped.
///
/// `subscribe` spawns tasks and must run inside a tokio runtime.
pub struct OfflineTransport {
    device_id: String,
    role: OfflineRole,
    link: Arc<dyn LocalLink>,
    frames: Mutex<Option<UnboundedReceiver<String>>>,
    shared: Arc<Mutex<Shared>>,
    retry_delay: Duration,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl OfflineTransport {
    pub fn new(role: OfflineRole, device_id: impl Into<String>, opened: OpenedLink, retry_delay: Duration) -> Self {
        let OpenedLink { link, frames } = opened;
        Self {
            device_id: device_id.into(),
            role,
            link: Arc::from(link),
            frames: Mutex::new(Some(frames)),
            shared: Arc::new(Mutex::new(Shared::default())),
            retry_delay,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn role(&self) -> OfflineRole {
        self.role
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn set_setlist(&self, setlist: Setlist) {
        let mut shared = self.shared.lock();
        if shared.state.setlist_id.is_none() {
            shared.state.setlist_id = Some(setlist.id.clone());
            shared.state.setlist_name = Some(setlist.name.clone());
        }
        shared.setlist = Some(setlist);
    }

    /// Install the song section indices refer to.
    ///
    /// A guest that already holds a synced position for this song re-emits
    /// it, so a section index that arrived before the song now resolves.
    pub fn set_song(&self, song: Song) {
        let mut shared = self.shared.lock();
        shared.song = Some(song);
        if self.role != OfflineRole::Guest || !shared.synced {
            return;
        }
        let Some(from) = shared.md_id.clone() else {
            return;
        };
        if let Some(delta) = shared.section_change_delta() {
            shared.emit(TransportEvent::Delta { from, delta });
        }
    }

    /// Replace the state a music director hands to joining guests.
    pub fn set_state(&self, state: SyncState) {
        self.shared.lock().state = state;
    }

    /// Last known session state.
    pub fn state(&self) -> SyncState {
        self.shared.lock().state.clone()
    }

    /// Guests currently known to the music director.
    pub fn connected_clients(&self) -> usize {
        self.shared.lock().peers.len()
    }

    fn send_message(&self, message: &SyncMessage) -> Result<()> {
        self.link.send(&message.encode()?)
    }

    fn request_sync(&self) -> Result<()> {
        let setlist_id = self.shared.lock().state.setlist_id.clone();
        let request = SyncMessage::new(
            MessageType::SyncRequest,
            SyncState {
                setlist_id,
                ..Default::default()
            },
            self.device_id.clone(),
        );
        self.send_message(&request)
    }

    /// Map an outbound delta to the link message that carries it.
    fn outbound(&self, delta: &Delta) -> Option<SyncMessage> {
        let mut shared = self.shared.lock();
        let update = match delta {
            Delta::SectionChange {
                arrangement_id,
                is_playing,
                song_id,
                ..
            } => {
                let song = shared.song.as_ref()?;
                let index = arrangement_id.as_deref().and_then(|id| song.arrangement_index(id))?;
                SyncState {
                    current_section_index: Some(index),
                    current_song_id: song_id.clone(),
                    is_playing: Some(*is_playing),
                    ..Default::default()
                }
            }
            Delta::SongChange {
                song_id,
                song_index,
                setlist_id,
            } => SyncState {
                current_song_index: Some(*song_index),
                current_song_id: Some(song_id.clone()),
                setlist_id: setlist_id.clone(),
                ..Default::default()
            },
            Delta::TempoChange { tempo, .. } => {
                // kept for sync responses, not sent on its own
                shared.state.tempo = Some(*tempo);
                return None;
            }
            Delta::SetlistSync { .. } => {
                let state = shared.state.clone();
                return Some(SyncMessage::new(MessageType::SyncResponse, state, self.device_id.clone()));
            }
            _ => return None,
        };

        shared.state.merge(&update);
        if update.current_song_index.is_some() {
            shared.state.current_section_index = Some(0);
        }
        shared.state.timestamp = Some(crate::model::now_millis());
        Some(SyncMessage::update(update, self.device_id.clone()))
    }

    fn spawn_pump(&self, mut frames: UnboundedReceiver<String>) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let link = Arc::clone(&self.link);
        let device_id = self.device_id.clone();
        let role = self.role;
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let message = match SyncMessage::decode(&frame) {
                    Ok(message) => message,
                    Err(err) => {
                        debug!("Dropping malformed frame: {}", err);
                        continue;
                    }
                };
                if message.sender_id == device_id {
                    continue;
                }
                let reply = handle_inbound(&mut shared.lock(), role, &device_id, message);
                if let Some(reply) = reply {
                    match reply.encode() {
                        Ok(frame) => {
                            if let Err(err) = link.send(&frame) {
                                warn!("Failed to answer sync request: {}", err);
                            }
                        }
                        Err(err) => warn!("Failed to encode reply: {}", err),
                    }
                }
            }
        })
    }
}

/// Apply one inbound message. Returns a reply for the link, if any.
fn handle_inbound(shared: &mut Shared, role: OfflineRole, device_id: &str, message: SyncMessage) -> Option<SyncMessage> {
    let from = message.sender_id.clone();
    match (role, message.kind) {
        (OfflineRole::Md, MessageType::SyncRequest) => {
            if shared.add_peer(&from) {
                info!("Guest {} connected ({} total)", from, shared.peers.len());
                shared.emit_presence();
            }
            let mut state = shared.state.clone();
            state.timestamp = Some(crate::model::now_millis());
            Some(SyncMessage::new(MessageType::SyncResponse, state, device_id))
        }
        (OfflineRole::Md, MessageType::ClientDisconnected) => {
            let before = shared.peers.len();
            shared.peers.retain(|p| p.id != from);
            if shared.peers.len() != before {
                info!("Guest {} disconnected", from);
                shared.emit_presence();
            }
            None
        }
        (OfflineRole::Md, _) => None,
        (OfflineRole::Guest, MessageType::SyncResponse) => {
            shared.state = message.payload;
            shared.synced = true;
            if shared.md_id.as_deref() != Some(from.as_str()) {
                info!("Music director is {}", from);
                shared.md_id = Some(from.clone());
                shared.emit(TransportEvent::OwnerChanged(from.clone()));
            }
            if shared.add_peer(&from) {
                shared.emit_presence();
            }
            let delta = shared.full_sync_delta();
            shared.emit(TransportEvent::Delta { from, delta });
            None
        }
        (OfflineRole::Guest, MessageType::SongChange) => {
            shared.state.merge(&message.payload);
            shared.state.current_section_index = Some(0);
            let index = message.payload.current_song_index.unwrap_or(0);
            let song_id = message
                .payload
                .current_song_id
                .clone()
                .or_else(|| shared.song_id_at(index));
            match song_id {
                Some(song_id) => {
                    shared.state.current_song_id = Some(song_id.clone());
                    let delta = Delta::SongChange {
                        song_id,
                        song_index: index,
                        setlist_id: shared.state.setlist_id.clone(),
                    };
                    shared.emit(TransportEvent::Delta { from, delta });
                }
                None => debug!("song_change for unknown index {}", index),
            }
            None
        }
        (OfflineRole::Guest, MessageType::SectionChange | MessageType::Play | MessageType::Pause) => {
            shared.state.merge(&message.payload);
            match shared.section_change_delta() {
                Some(delta) => shared.emit(TransportEvent::Delta { from, delta }),
                None => debug!("{:?} before the song is loaded", message.kind),
            }
            None
        }
        (OfflineRole::Guest, MessageType::StateUpdate) => {
            shared.state.merge(&message.payload);
            None
        }
        (OfflineRole::Guest, _) => None,
    }
}

impl Transport for OfflineTransport {
    fn subscribe(&self, _channel: &str, _device_id: &str) -> Result<UnboundedReceiver<TransportEvent>> {
        let frames = self
            .frames
            .lock()
            .take()
            .ok_or_else(|| LiveError::TransportUnavailable("local link already subscribed".to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.lock().events = Some(tx);

        let mut tasks = self.tasks.lock();
        tasks.push(self.spawn_pump(frames));

        if self.role == OfflineRole::Guest {
            self.request_sync()?;
            // one more request in case the first was missed
            let shared = Arc::clone(&self.shared);
            let link = Arc::clone(&self.link);
            let device_id = self.device_id.clone();
            let delay = self.retry_delay;
            tasks.push(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let setlist_id = {
                    let shared = shared.lock();
                    if shared.synced {
                        return;
                    }
                    shared.state.setlist_id.clone()
                };
                let request = SyncMessage::new(
                    MessageType::SyncRequest,
                    SyncState {
                        setlist_id,
                        ..Default::default()
                    },
                    device_id,
                );
                debug!("Repeating sync request");
                if let Err(err) = request.encode().and_then(|frame| link.send(&frame)) {
                    warn!("Secondary sync request failed: {}", err);
                }
            }));
        }
        Ok(rx)
    }

    fn unsubscribe(&self, _channel: &str, _device_id: &str) -> Result<()> {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.shared.lock().events = None;
        self.link.close();
        Ok(())
    }

    fn track(&self, _channel: &str, participant: &Participant) -> Result<()> {
        let mut shared = self.shared.lock();
        shared.local = Some(participant.clone());
        shared.emit_presence();
        Ok(())
    }

    fn untrack(&self, _channel: &str, device_id: &str) -> Result<()> {
        if self.role == OfflineRole::Guest {
            let goodbye = SyncMessage::new(MessageType::ClientDisconnected, SyncState::default(), device_id);
            self.send_message(&goodbye)?;
        }
        let mut shared = self.shared.lock();
        shared.local = None;
        shared.emit_presence();
        Ok(())
    }

    fn send(&self, _channel: &str, _from: &str, delta: &Delta) -> Result<()> {
        if self.role != OfflineRole::Md {
            debug!("Guest link is receive-only; dropping {}", delta.kind());
            return Ok(());
        }
        match self.outbound(delta) {
            Some(message) => self.send_message(&message),
            None => {
                debug!("{} has no offline form", delta.kind());
                Ok(())
            }
        }
    }
}

impl Drop for OfflineTransport {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::LoopbackBus;
    use crate::test_support::{sample_song, second_song};

    fn setlist() -> Setlist {
        Setlist {
            id: "set-1".to_string(),
            name: "Sunday".to_string(),
            song_ids: vec!["song-1".to_string(), "song-2".to_string()],
        }
    }

    fn pair(bus: &LoopbackBus) -> (OfflineTransport, OfflineTransport) {
        let md = OfflineTransport::new(OfflineRole::Md, "md", bus.connect().unwrap(), Duration::from_secs(1));
        md.set_setlist(setlist());
        md.set_song(sample_song());
        let guest = OfflineTransport::new(OfflineRole::Guest, "guest", bus.connect().unwrap(), Duration::from_secs(1));
        guest.set_setlist(setlist());
        guest.set_song(sample_song());
        (md, guest)
    }

    async fn next_delta(rx: &mut UnboundedReceiver<TransportEvent>) -> (String, Delta) {
        loop {
            match rx.recv().await {
                Some(TransportEvent::Delta { from, delta }) => return (from, delta),
                Some(_) => continue,
                None => panic!("channel closed"),
            }
        }
    }

    #[test]
    fn test_election() {
        assert_eq!(OfflineRole::elect(OfflineRoute::Host), OfflineRole::Md);
        assert_eq!(OfflineRole::elect(OfflineRoute::Join), OfflineRole::Guest);
        assert!(use_offline(false, false));
        assert!(use_offline(true, true));
        assert!(!use_offline(true, false));
    }

    #[tokio::test]
    async fn test_guest_receives_sync_response() {
        let bus = LoopbackBus::new();
        let (md, guest) = pair(&bus);
        md.set_state(SyncState {
            setlist_id: Some("set-1".to_string()),
            current_song_index: Some(0),
            current_song_id: Some("song-1".to_string()),
            current_section_index: Some(1),
            is_playing: Some(true),
            tempo: Some(90),
            ..Default::default()
        });
        let _md_rx = md.subscribe("live", "md").unwrap();
        let mut guest_rx = guest.subscribe("live", "guest").unwrap();

        let (from, delta) = next_delta(&mut guest_rx).await;
        assert_eq!(from, "md");
        let Delta::SetlistSync {
            active_song_id,
            current_arrangement_id,
            is_playing,
            tempo,
            ..
        } = delta
        else {
            panic!("expected setlist-sync");
        };
        assert_eq!(active_song_id.as_deref(), Some("song-1"));
        assert_eq!(current_arrangement_id.as_deref(), Some("a2"));
        assert!(is_playing);
        assert_eq!(tempo, 90);
        assert_eq!(md.connected_clients(), 1);
    }

    #[tokio::test]
    async fn test_guest_learns_music_director_before_first_delta() {
        let bus = LoopbackBus::new();
        let md = OfflineTransport::new(
            OfflineRole::Md,
            "md-device-7f3",
            bus.connect().unwrap(),
            Duration::from_secs(1),
        );
        md.set_setlist(setlist());
        let guest = OfflineTransport::new(OfflineRole::Guest, "guest", bus.connect().unwrap(), Duration::from_secs(1));
        guest.set_setlist(setlist());
        let _md_rx = md.subscribe("live", "md-device-7f3").unwrap();
        let mut guest_rx = guest.subscribe("live", "guest").unwrap();

        let owner = loop {
            match guest_rx.recv().await {
                Some(TransportEvent::OwnerChanged(id)) => break id,
                Some(TransportEvent::PresenceSync(_)) => continue,
                other => panic!("expected the owner first, got {:?}", other),
            }
        };
        assert_eq!(owner, "md-device-7f3");
        let (from, delta) = next_delta(&mut guest_rx).await;
        assert_eq!(from, "md-device-7f3");
        assert!(matches!(delta, Delta::SetlistSync { .. }));
    }

    #[tokio::test]
    async fn test_section_and_song_changes_translate() {
        let bus = LoopbackBus::new();
        let (md, guest) = pair(&bus);
        let _md_rx = md.subscribe("live", "md").unwrap();
        let mut guest_rx = guest.subscribe("live", "guest").unwrap();
        next_delta(&mut guest_rx).await;

        md.send(
            "live",
            "md",
            &Delta::SectionChange {
                section_id: Some("verse".to_string()),
                arrangement_id: Some("a3".to_string()),
                is_playing: false,
                show_all_sections: false,
                song_id: Some("song-1".to_string()),
                setlist_id: Some("set-1".to_string()),
            },
        )
        .unwrap();
        let (_, delta) = next_delta(&mut guest_rx).await;
        assert!(matches!(
            delta,
            Delta::SectionChange { ref arrangement_id, .. } if arrangement_id.as_deref() == Some("a3")
        ));

        md.send(
            "live",
            "md",
            &Delta::SongChange {
                song_id: "song-2".to_string(),
                song_index: 1,
                setlist_id: Some("set-1".to_string()),
            },
        )
        .unwrap();
        let (_, delta) = next_delta(&mut guest_rx).await;
        assert_eq!(
            delta,
            Delta::SongChange {
                song_id: "song-2".to_string(),
                song_index: 1,
                setlist_id: Some("set-1".to_string()),
            }
        );
        assert_eq!(md.state().current_section_index, Some(0));

        guest.set_song(second_song());
        md.set_song(second_song());
        md.send(
            "live",
            "md",
            &Delta::SectionChange {
                section_id: Some("bridge".to_string()),
                arrangement_id: Some("b2".to_string()),
                is_playing: true,
                show_all_sections: false,
                song_id: Some("song-2".to_string()),
                setlist_id: None,
            },
        )
        .unwrap();
        let (_, delta) = next_delta(&mut guest_rx).await;
        assert!(matches!(delta, Delta::SectionChange { is_playing: true, .. }));
    }

    #[tokio::test]
    async fn test_guest_cannot_send_and_drops_unmapped() {
        let bus = LoopbackBus::new();
        let (md, guest) = pair(&bus);
        let mut md_rx = md.subscribe("live", "md").unwrap();
        guest
            .send("live", "guest", &Delta::ShowAllSectionsChange { show_all_sections: true })
            .unwrap();
        md.send("live", "md", &Delta::TempoChange { tempo: 77, song_id: None, setlist_id: None })
            .unwrap();
        assert_eq!(md.state().tempo, Some(77));
        while let Ok(event) = md_rx.try_recv() {
            assert!(matches!(event, TransportEvent::PresenceSync(_)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_request_repeated_once() {
        let bus = LoopbackBus::new();
        let mut listener = bus.connect().unwrap();
        let guest = OfflineTransport::new(OfflineRole::Guest, "guest", bus.connect().unwrap(), Duration::from_secs(1));
        let _rx = guest.subscribe("live", "guest").unwrap();

        let first = SyncMessage::decode(&listener.frames.recv().await.unwrap()).unwrap();
        assert_eq!(first.kind, MessageType::SyncRequest);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let second = SyncMessage::decode(&listener.frames.recv().await.unwrap()).unwrap();
        assert_eq!(second.kind, MessageType::SyncRequest);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(listener.frames.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_guest_disconnect_updates_presence() {
        let bus = LoopbackBus::new();
        let (md, guest) = pair(&bus);
        let _md_rx = md.subscribe("live", "md").unwrap();
        let mut guest_rx = guest.subscribe("live", "guest").unwrap();
        next_delta(&mut guest_rx).await;
        assert_eq!(md.connected_clients(), 1);

        guest.untrack("live", "guest").unwrap();
        for _ in 0..50 {
            if md.connected_clients() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(md.connected_clients(), 0);
    }
}
