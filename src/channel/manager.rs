use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use super::transport::{Transport, TransportEvent};
use crate::error::Result;
use crate::model::{now_millis, Participant, ParticipantRole};
use crate::sync::Delta;

/// Events surfaced to the session after roster bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The roster was recomputed. `joined` lists ids absent from the
    /// previous roster.
    Roster {
        participants: Vec<Participant>,
        joined: Vec<String>,
    },
    Delta { from: String, delta: Delta },
    /// Ownership moved to `owner_id`; `participants` carries the re-flagged
    /// roster.
    OwnerChanged {
        owner_id: String,
        participants: Vec<Participant>,
    },
}

/// Rebuild the roster from a full presence snapshot.
///
/// One entry per participant id, the most recently seen one winning, with
/// `is_owner` set exactly for `owner_id`.
pub fn recompute_roster(presence: &[Participant], owner_id: &str) -> Vec<Participant> {
    let mut roster: Vec<Participant> = Vec::with_capacity(presence.len());
    for entry in presence {
        match roster.iter_mut().find(|p| p.id == entry.id) {
            Some(existing) if entry.last_seen_ms >= existing.last_seen_ms => {
                *existing = entry.clone();
            }
            Some(_) => {}
            None => roster.push(entry.clone()),
        }
    }
    for participant in roster.iter_mut() {
        participant.is_owner = participant.id == owner_id;
    }
    roster
}

/// A joined session channel.
///
/// Created by [`ChannelManager::join`] together with the [`ChannelEvents`]
/// stream that delivers what other participants do.
pub struct ChannelManager {
    transport: Arc<dyn Transport>,
    channel: String,
    owner_id: Arc<RwLock<String>>,
    local: Participant,
    roster: Arc<RwLock<Vec<Participant>>>,
    joined: bool,
}

/// Inbound side of a joined channel.
pub struct ChannelEvents {
    rx: UnboundedReceiver<TransportEvent>,
    owner_id: Arc<RwLock<String>>,
    roster: Arc<RwLock<Vec<Participant>>>,
    known: HashSet<String>,
}

impl ChannelManager {
    /// Subscribe to the session's channel and announce `local` in presence.
    pub fn join(
        transport: Arc<dyn Transport>,
        session_id: &str,
        owner_id: &str,
        mut local: Participant,
    ) -> Result<(Self, ChannelEvents)> {
        let channel = channel_name(session_id);
        local.is_owner = local.id == owner_id;
        local.last_seen_ms = now_millis();

        let rx = transport.subscribe(&channel, &local.id)?;
        if let Err(err) = transport.track(&channel, &local) {
            let _ = transport.unsubscribe(&channel, &local.id);
            return Err(err);
        }
        info!("{} joined {} as {}", local.id, channel, local.role.as_str());

        let roster = Arc::new(RwLock::new(Vec::new()));
        let owner_id = Arc::new(RwLock::new(owner_id.to_string()));
        let events = ChannelEvents {
            rx,
            owner_id: Arc::clone(&owner_id),
            roster: Arc::clone(&roster),
            known: HashSet::new(),
        };
        let manager = Self {
            transport,
            channel,
            owner_id,
            local,
            roster,
            joined: true,
        };
        Ok((manager, events))
    }

    pub fn local(&self) -> &Participant {
        &self.local
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_owner(&self) -> bool {
        self.local.id == *self.owner_id.read()
    }

    pub fn owner_id(&self) -> String {
        self.owner_id.read().clone()
    }

    /// Latest roster snapshot.
    pub fn roster(&self) -> Vec<Participant> {
        self.roster.read().clone()
    }

    /// Send a delta to everyone else. Dropped unless this device owns the
    /// session.
    pub fn broadcast(&self, delta: &Delta) -> Result<()> {
        if !self.is_owner() {
            debug!("Dropping {} from non-owner {}", delta.kind(), self.local.id);
            return Ok(());
        }
        self.transport.send(&self.channel, &self.local.id, delta)
    }

    /// Change the local role and re-track presence so peers see it.
    pub fn set_role(&mut self, role: ParticipantRole) -> Result<()> {
        self.local.role = role;
        self.local.last_seen_ms = now_millis();
        self.transport.track(&self.channel, &self.local)
    }

    /// Untrack and unsubscribe. Failures are logged and otherwise ignored.
    pub fn leave(&mut self) {
        if !self.joined {
            return;
        }
        self.joined = false;
        if let Err(err) = self.transport.untrack(&self.channel, &self.local.id) {
            warn!("Failed to untrack {} from {}: {}", self.local.id, self.channel, err);
        }
        if let Err(err) = self.transport.unsubscribe(&self.channel, &self.local.id) {
            warn!("Failed to unsubscribe {} from {}: {}", self.local.id, self.channel, err);
        }
        info!("{} left {}", self.local.id, self.channel);
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        self.leave();
    }
}

impl ChannelEvents {
    /// Next event, or `None` once the subscription is closed.
    pub async fn next(&mut self) -> Option<ChannelEvent> {
        let event = self.rx.recv().await?;
        Some(self.process(event))
    }

    /// Non-blocking variant of [`ChannelEvents::next`].
    pub fn try_next(&mut self) -> Option<ChannelEvent> {
        let event = self.rx.try_recv().ok()?;
        Some(self.process(event))
    }

    fn process(&mut self, event: TransportEvent) -> ChannelEvent {
        match event {
            TransportEvent::PresenceSync(presence) => {
                let participants = recompute_roster(&presence, &self.owner_id.read());
                let joined: Vec<String> = participants
                    .iter()
                    .filter(|p| !self.known.contains(&p.id))
                    .map(|p| p.id.clone())
                    .collect();
                self.known = participants.iter().map(|p| p.id.clone()).collect();
                *self.roster.write() = participants.clone();
                ChannelEvent::Roster {
                    participants,
                    joined,
                }
            }
            TransportEvent::Delta { from, delta } => ChannelEvent::Delta { from, delta },
            TransportEvent::OwnerChanged(owner_id) => {
                info!("Session owner is now {}", owner_id);
                *self.owner_id.write() = owner_id.clone();
                let participants = recompute_roster(&self.roster.read(), &owner_id);
                *self.roster.write() = participants.clone();
                ChannelEvent::OwnerChanged {
                    owner_id,
                    participants,
                }
            }
        }
    }
}

/// Channel name for a live session.
pub fn channel_name(session_id: &str) -> String {
    format!("live-session:{}", session_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryHub;

    fn seen(id: &str, role: ParticipantRole, at: u64) -> Participant {
        let mut participant = Participant::new(id, id, role);
        participant.last_seen_ms = at;
        participant
    }

    #[test]
    fn test_recompute_roster_dedupes_and_forces_owner() {
        let mut liar = seen("viewer", ParticipantRole::Drummer, 5);
        liar.is_owner = true;
        let presence = vec![
            seen("owner", ParticipantRole::Guitarist, 1),
            seen("viewer", ParticipantRole::Vocalist, 9),
            liar,
        ];
        let roster = recompute_roster(&presence, "owner");
        assert_eq!(roster.len(), 2);
        assert!(roster[0].is_owner);
        assert!(!roster[1].is_owner);
        assert_eq!(roster[1].role, ParticipantRole::Vocalist);
        assert_eq!(roster.iter().filter(|p| p.is_owner).count(), 1);
    }

    #[test]
    fn test_join_reports_new_participants() {
        let hub = Arc::new(MemoryHub::new());
        let (_owner, mut owner_events) = ChannelManager::join(
            hub.clone(),
            "s1",
            "owner",
            Participant::new("owner", "Olive", ParticipantRole::Guitarist),
        )
        .unwrap();
        let (_viewer, _) = ChannelManager::join(
            hub.clone(),
            "s1",
            "owner",
            Participant::new("viewer", "Vic", ParticipantRole::Bassist),
        )
        .unwrap();

        let mut last = None;
        while let Some(event) = owner_events.try_next() {
            last = Some(event);
        }
        let Some(ChannelEvent::Roster { participants, joined }) = last else {
            panic!("expected a roster event");
        };
        assert_eq!(participants.len(), 2);
        assert_eq!(joined, vec!["viewer".to_string()]);
    }

    #[test]
    fn test_non_owner_broadcast_dropped() {
        let hub = Arc::new(MemoryHub::new());
        let (_owner, mut owner_events) = ChannelManager::join(
            hub.clone(),
            "s1",
            "owner",
            Participant::new("owner", "Olive", ParticipantRole::None),
        )
        .unwrap();
        let (viewer, _) = ChannelManager::join(
            hub.clone(),
            "s1",
            "owner",
            Participant::new("viewer", "Vic", ParticipantRole::None),
        )
        .unwrap();
        while owner_events.try_next().is_some() {}

        viewer
            .broadcast(&Delta::ShowAllSectionsChange {
                show_all_sections: true,
            })
            .unwrap();
        assert!(owner_events.try_next().is_none());
    }

    #[test]
    fn test_role_change_retracks() {
        let hub = Arc::new(MemoryHub::new());
        let (owner, mut owner_events) = ChannelManager::join(
            hub.clone(),
            "s1",
            "owner",
            Participant::new("owner", "Olive", ParticipantRole::None),
        )
        .unwrap();
        let (mut viewer, _) = ChannelManager::join(
            hub.clone(),
            "s1",
            "owner",
            Participant::new("viewer", "Vic", ParticipantRole::None),
        )
        .unwrap();
        viewer.set_role(ParticipantRole::Drummer).unwrap();
        while owner_events.try_next().is_some() {}

        let roster = owner.roster();
        let vic = roster.iter().find(|p| p.id == "viewer").unwrap();
        assert_eq!(vic.role, ParticipantRole::Drummer);
    }

    #[test]
    fn test_owner_change_reflags_roster() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let owner_id = Arc::new(RwLock::new("guessed".to_string()));
        let mut events = ChannelEvents {
            rx,
            owner_id: Arc::clone(&owner_id),
            roster: Arc::new(RwLock::new(Vec::new())),
            known: HashSet::new(),
        };
        tx.send(TransportEvent::PresenceSync(vec![
            seen("guest", ParticipantRole::Bassist, 1),
            seen("md-device-7f3", ParticipantRole::None, 2),
        ]))
        .unwrap();
        tx.send(TransportEvent::OwnerChanged("md-device-7f3".into()))
            .unwrap();

        let Some(ChannelEvent::Roster { participants, .. }) = events.try_next() else {
            panic!("expected a roster event");
        };
        assert!(participants.iter().all(|p| !p.is_owner));

        let Some(ChannelEvent::OwnerChanged {
            owner_id: announced,
            participants,
        }) = events.try_next()
        else {
            panic!("expected an owner change");
        };
        assert_eq!(announced, "md-device-7f3");
        assert_eq!(*owner_id.read(), "md-device-7f3");
        let owners: Vec<&str> = participants
            .iter()
            .filter(|p| p.is_owner)
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(owners, vec!["md-device-7f3"]);
    }

    #[test]
    fn test_leave_is_best_effort() {
        let hub = Arc::new(MemoryHub::new());
        let (mut viewer, _) = ChannelManager::join(
            hub.clone(),
            "s1",
            "owner",
            Participant::new("viewer", "Vic", ParticipantRole::None),
        )
        .unwrap();
        hub.set_available(false);
        viewer.leave();
        viewer.leave();
        hub.set_available(true);
        assert_eq!(hub.subscriber_count(&channel_name("s1")), 1);
    }
}
