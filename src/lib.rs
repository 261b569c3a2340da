pub mod channel;
pub mod chord;
pub mod chord_grid;
pub mod classify;
pub mod config;
pub mod error;
pub mod model;
pub mod offline;
pub mod render;
pub mod scroll;
pub mod session;
pub mod store;
pub mod sync;
pub mod transpose;

#[cfg(test)]
mod test_support;

pub use error::{LiveError, Result};
pub use model::{
    Arrangement, ContentTheme, Participant, ParticipantRole, PerformancePosition, Section, Setlist, Song,
    TimeSignature,
};
pub use render::{render, render_song, DisplayModel, RenderOptions, Renderer};
pub use session::{LiveSession, SessionEvent, SessionOptions};
pub use sync::{Delta, OwnerCommand, StateSynchronizer};
pub use transpose::{transpose, transpose_song};
