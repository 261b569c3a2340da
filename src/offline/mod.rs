//! # Offline Session Link
//!
//! Runs a live session without the messaging service. One device, the
//! music director (MD), hosts; guests only listen.
//!
//! ## Link selection
//! Strategies are tried in order and the first that opens wins:
//!
//! ```text
//! short-range radio (platform LocalLink) ──fail──► LAN UDP broadcast :8765
//!                                          └─fail──► TransportUnavailable
//! ```
//!
//! ## Handshake
//! ```text
//! guest                               MD
//!   │── sync_request{setlistId} ────►  │  (repeated once after 1 s)
//!   │◄─── sync_response{full state} ── │
//!   │◄─── section_change / song_change │
//!   │── client_disconnected ─────────► │
//! ```
//!
//! Every frame is a JSON [`SyncMessage`]: `{type, payload, senderId,
//! timestamp}`. [`OfflineTransport`] hides this vocabulary behind the
//! ordinary [`crate::channel::Transport`] contract.

mod link;
mod messages;
mod transport;

pub use link::{select_link, LinkOpener, LocalLink, LoopbackBus, LoopbackLink, OpenedLink, UdpBroadcastLink};
pub use messages::{MessageType, SyncMessage, SyncState};
pub use transport::{use_offline, OfflineRole, OfflineRoute, OfflineTransport};

/// Default UDP port for the LAN broadcast link.
pub const DEFAULT_PORT: u16 = 8765;

/// Channel name shared by every offline session, so guests can join
/// without knowing the setlist.
pub const GUEST_SYNC_CHANNEL: &str = "chordflow-local-guest-sync";
