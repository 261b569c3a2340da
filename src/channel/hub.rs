use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use super::transport::{Transport, TransportEvent};
use crate::error::{LiveError, Result};
use crate::model::Participant;
use crate::sync::Delta;

#[derive(Default)]
struct ChannelState {
    subscribers: HashMap<String, UnboundedSender<TransportEvent>>,
    /// Insertion-ordered presence entries, one per device.
    presence: Vec<Participant>,
}

impl ChannelState {
    fn publish_presence(&mut self) {
        let snapshot = self.presence.clone();
        self.subscribers
            .retain(|_, tx| tx.send(TransportEvent::PresenceSync(snapshot.clone())).is_ok());
    }
}

/// In-process messaging service.
///
/// Cheap to clone; clones share the same channels. Deltas travel as JSON so
/// every delivery exercises the wire format.
#[derive(Clone, Default)]
pub struct MemoryHub {
    channels: Arc<Mutex<HashMap<String, ChannelState>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the service going away (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LiveError::TransportUnavailable(
                "messaging service unreachable".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map_or(0, |state| state.subscribers.len())
    }
}

impl Transport for MemoryHub {
    fn subscribe(&self, channel: &str, device_id: &str) -> Result<UnboundedReceiver<TransportEvent>> {
        self.ensure_available()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut channels = self.channels.lock();
        let state = channels.entry(channel.to_string()).or_default();
        // new subscribers see the current presence set straight away
        let _ = tx.send(TransportEvent::PresenceSync(state.presence.clone()));
        state.subscribers.insert(device_id.to_string(), tx);
        debug!("{} subscribed to {}", device_id, channel);
        Ok(rx)
    }

    fn unsubscribe(&self, channel: &str, device_id: &str) -> Result<()> {
        self.ensure_available()?;
        let mut channels = self.channels.lock();
        if let Some(state) = channels.get_mut(channel) {
            state.subscribers.remove(device_id);
            if state.subscribers.is_empty() && state.presence.is_empty() {
                channels.remove(channel);
            }
        }
        Ok(())
    }

    fn track(&self, channel: &str, participant: &Participant) -> Result<()> {
        self.ensure_available()?;
        let mut channels = self.channels.lock();
        let state = channels.entry(channel.to_string()).or_default();
        match state.presence.iter_mut().find(|p| p.id == participant.id) {
            Some(existing) => *existing = participant.clone(),
            None => state.presence.push(participant.clone()),
        }
        state.publish_presence();
        Ok(())
    }

    fn untrack(&self, channel: &str, device_id: &str) -> Result<()> {
        self.ensure_available()?;
        let mut channels = self.channels.lock();
        if let Some(state) = channels.get_mut(channel) {
            let before = state.presence.len();
            state.presence.retain(|p| p.id != device_id);
            if state.presence.len() != before {
                state.publish_presence();
            }
        }
        Ok(())
    }

    fn send(&self, channel: &str, from: &str, delta: &Delta) -> Result<()> {
        self.ensure_available()?;
        let json = delta.to_json()?;
        let mut channels = self.channels.lock();
        let Some(state) = channels.get_mut(channel) else {
            return Ok(());
        };
        state.subscribers.retain(|device_id, tx| {
            if device_id == from {
                return true;
            }
            match Delta::from_json(&json) {
                Ok(delta) => tx
                    .send(TransportEvent::Delta {
                        from: from.to_string(),
                        delta,
                    })
                    .is_ok(),
                Err(_) => true,
            }
        });
        Ok(())
    }
}
