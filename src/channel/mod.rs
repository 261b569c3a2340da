//! # Session Channel
//!
//! Named publish/subscribe channel per live session, with presence.
//!
//! ```text
//! ChannelManager::join ──► Transport::subscribe + track
//!        │
//!        ├── broadcast(delta)   owner only; everyone else is dropped here
//!        ├── set_role(role)     re-tracks presence
//!        └── leave()            best effort, never fails
//!
//! ChannelEvents::next ◄── PresenceSync(full set) ──► recompute_roster
//!                     ◄── Delta{from, delta}
//! ```
//!
//! The roster is always rebuilt from the complete presence set. Patching it
//! incrementally would let a missed leave event leave a ghost behind.
//!
//! [`MemoryHub`] is the in-process messaging service; the offline adapter in
//! `crate::offline` implements the same [`Transport`] contract.

mod hub;
mod manager;
mod transport;

pub use hub::MemoryHub;
pub use manager::{channel_name, recompute_roster, ChannelEvent, ChannelEvents, ChannelManager};
pub use transport::{Transport, TransportEvent};
