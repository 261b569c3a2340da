//! Chord grid sections.

use tracing::debug;

use super::{DisplayBody, RenderOptions, Renderer};
use crate::chord_grid::{layout, map_chords, parse_grid};
use crate::model::{ParticipantRole, Section};

/// Lay out a grid section for a role.
///
/// Returns `None` when the payload does not parse, so the caller can show the
/// raw content as text instead.
pub(super) fn render_grid(
    renderer: &Renderer,
    section: &Section,
    role: ParticipantRole,
    options: &RenderOptions,
) -> Option<DisplayBody> {
    // Grids carry no lyrics
    if role == ParticipantRole::Vocalist {
        return Some(DisplayBody::Placeholder(section.display_name().to_string()));
    }

    let bars = match parse_grid(&section.content) {
        Ok(bars) => bars,
        Err(err) => {
            debug!("Section {} grid payload unreadable, showing text: {}", section.id, err);
            return None;
        }
    };

    let mut lines = layout(&bars, renderer.bars_per_line);
    map_chords(&mut lines, |chord| renderer.display_chord(chord, role, options));

    Some(DisplayBody::Grid {
        lines,
        clickable: role.chords_clickable(),
    })
}
