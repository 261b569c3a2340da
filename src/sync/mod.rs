//! # State Synchronization
//!
//! Single-writer synchronization of the performance position.
//!
//! ## Sub-modules
//! - `delta` - the seven wire deltas and the pure reducer [`apply`]
//! - `synchronizer` - [`StateSynchronizer`]: owner commands, inbound deltas,
//!   independent browsing
//!
//! ## Flow
//! ```text
//! owner:   OwnerCommand ──► StateSynchronizer::act ──► Delta ──► apply(own copy)
//!                                                        │
//!                                                  broadcast
//!                                                        ▼
//! viewer:                       StateSynchronizer::receive ──► apply(mirror)
//! ```
//!
//! ## Invariants
//! - Only the owner's synchronizer produces deltas; `act` on a viewer
//!   returns [`Outcome::NotOwner`].
//! - Inbound deltas from anyone but the owner are ignored.
//! - Every delta overwrites the fields it carries. Replaying a delta sequence
//!   from the same start state always yields the same position.
//! - An independent browsing position is never broadcast and never touched
//!   by inbound deltas.
//!
//! ## Example
//! ```rust
//! use chordflow::sync::{OwnerCommand, Outcome, StateSynchronizer};
//!
//! let mut owner = StateSynchronizer::new("owner", "owner");
//! let mut viewer = StateSynchronizer::new("viewer", "owner");
//!
//! let Outcome::Broadcast(delta) = owner.act(OwnerCommand::SetTempo(96)).unwrap() else {
//!     panic!("owner commands broadcast");
//! };
//! assert!(viewer.receive("owner", &delta));
//! assert_eq!(viewer.position().tempo, 96);
//!
//! // viewers cannot drive the session
//! assert_eq!(viewer.act(OwnerCommand::TogglePlay).unwrap(), Outcome::NotOwner);
//! ```

mod delta;
mod synchronizer;


pub use delta::{apply, Delta};
pub use synchronizer::{NavigationOutcome, Outcome, OwnerCommand, StateSynchronizer};
