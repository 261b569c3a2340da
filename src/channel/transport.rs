use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::Result;
use crate::model::Participant;
use crate::sync::Delta;

/// Something a subscriber hears on a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The full presence set as the service currently sees it.
    PresenceSync(Vec<Participant>),
    /// A delta broadcast by another subscriber.
    Delta { from: String, delta: Delta },
    /// The transport learned who owns the session, as an offline guest does
    /// from the music director's sync response.
    OwnerChanged(String),
}

/// A named publish/subscribe channel with presence.
///
/// Implementations never echo a broadcast back to its sender. Calls are
/// non-blocking; delivery happens through the receiver returned by
/// [`Transport::subscribe`].
pub trait Transport: Send + Sync {
    /// Open a subscription for `device_id` on `channel`.
    fn subscribe(&self, channel: &str, device_id: &str) -> Result<UnboundedReceiver<TransportEvent>>;

    /// Close the subscription. Pending events are dropped.
    fn unsubscribe(&self, channel: &str, device_id: &str) -> Result<()>;

    /// Publish or replace this device's presence entry.
    fn track(&self, channel: &str, participant: &Participant) -> Result<()>;

    fn untrack(&self, channel: &str, device_id: &str) -> Result<()>;

    /// Send a delta to every other subscriber.
    fn send(&self, channel: &str, from: &str, delta: &Delta) -> Result<()>;
}
