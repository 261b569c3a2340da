//! # Role-Based Content Rendering
//!
//! Turns section content into a [`DisplayModel`] for one performer role.
//!
//! ## Pipeline
//! ```text
//! Section content
//!     │
//!     ├── theme = Plain ──────► lines ──► classify ──► chord / lyric / tag lines
//!     │                                                    │
//!     └── theme = ChordGrid ──► parse_grid ──► layout ─────┤
//!                                                          ▼
//!                                     simplify (optional) ──► role filter
//! ```
//!
//! ## Roles
//! | role                    | display                                          |
//! |-------------------------|--------------------------------------------------|
//! | vocalist                | lyric lines only; section name when none remain  |
//! | bassist                 | slash chords `X/Y` show only `Y`                 |
//! | guitarist / keyboardist | everything, chords clickable                     |
//! | drummer / none          | everything                                       |
//!
//! Rendering never fails. Malformed grid payloads degrade to plain text and an
//! unresolved position renders [`DisplayModel::no_section_selected`].

mod grid;
mod simplify;
mod text;
mod types;

pub use simplify::{ChordSimplifier, NoSimplifier, TriadSimplifier};
pub use text::{grid_to_text, to_text};
pub use types::{
    ChordSegment, DisplayBody, DisplayLine, DisplayModel, DisplaySection, NO_SECTION_SELECTED,
};

use crate::chord::ChordSymbol;
use crate::chord_grid::DEFAULT_BARS_PER_LINE;
use crate::classify::{classify, classify_bar_line, split_bar_edges, strip_section_tags, LineKind};
use crate::model::{ContentTheme, ParticipantRole, PerformancePosition, Section, Song};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOptions {
    pub theme: ContentTheme,
    pub simplify_chords: bool,
    pub show_all_sections: bool,
}

/// Renderer configured with a chord simplifier and grid line width.
pub struct Renderer {
    simplifier: Box<dyn ChordSimplifier>,
    bars_per_line: usize,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            simplifier: Box::new(TriadSimplifier),
            bars_per_line: DEFAULT_BARS_PER_LINE,
        }
    }

    pub fn with_simplifier(mut self, simplifier: impl ChordSimplifier + 'static) -> Self {
        self.simplifier = Box::new(simplifier);
        self
    }

    pub fn with_bars_per_line(mut self, bars_per_line: usize) -> Self {
        self.bars_per_line = bars_per_line.max(1);
        self
    }

    /// Render a single section.
    pub fn render(&self, section: &Section, role: ParticipantRole, options: &RenderOptions) -> DisplayModel {
        DisplayModel {
            title: None,
            sections: vec![self.render_section(section, 1, true, role, options)],
            notice: None,
        }
    }

    /// Render a song at a position: every arrangement in play order when
    /// `show_all_sections` is set, otherwise only the current one.
    pub fn render_song(
        &self,
        song: &Song,
        position: &PerformancePosition,
        role: ParticipantRole,
        options: &RenderOptions,
    ) -> DisplayModel {
        let options = RenderOptions {
            theme: song.theme,
            ..*options
        };
        let current_arrangement = position.current_arrangement_id.as_deref();

        let sections: Vec<DisplaySection> = if options.show_all_sections {
            song.ordered_arrangements()
                .into_iter()
                .filter_map(|arrangement| {
                    let section = song.section(&arrangement.section_id)?;
                    let is_current = current_arrangement == Some(arrangement.id.as_str());
                    Some(self.render_section(section, arrangement.repeat_count, is_current, role, &options))
                })
                .collect()
        } else {
            let resolved = match current_arrangement {
                Some(id) => song
                    .arrangement(id)
                    .and_then(|a| song.section(&a.section_id).map(|s| (s, a.repeat_count))),
                None => position
                    .current_section_id
                    .as_deref()
                    .and_then(|id| song.section(id))
                    .map(|s| (s, 1)),
            };
            match resolved {
                Some((section, repeat_count)) => {
                    vec![self.render_section(section, repeat_count, true, role, &options)]
                }
                None => return DisplayModel::no_section_selected(),
            }
        };

        if sections.is_empty() {
            return DisplayModel::no_section_selected();
        }
        DisplayModel {
            title: Some(song.title.clone()),
            sections,
            notice: None,
        }
    }

    fn render_section(
        &self,
        section: &Section,
        repeat_count: u32,
        is_current: bool,
        role: ParticipantRole,
        options: &RenderOptions,
    ) -> DisplaySection {
        let body = match options.theme {
            ContentTheme::ChordGrid => grid::render_grid(self, section, role, options)
                .unwrap_or_else(|| self.render_text(section, role, options)),
            ContentTheme::Plain => self.render_text(section, role, options),
        };
        DisplaySection {
            section_id: section.id.clone(),
            title: section.display_name().to_string(),
            repeat_count,
            is_current,
            body,
        }
    }

    fn render_text(&self, section: &Section, role: ParticipantRole, options: &RenderOptions) -> DisplayBody {
        let lines: Vec<DisplayLine> = section
            .content
            .lines()
            .map(|line| self.render_line(line, role, options))
            .collect();

        if role == ParticipantRole::Vocalist {
            return vocal_lines(lines, section);
        }
        DisplayBody::Text(lines)
    }

    fn render_line(&self, line: &str, role: ParticipantRole, options: &RenderOptions) -> DisplayLine {
        if line.trim().is_empty() {
            return DisplayLine::Blank;
        }
        if strip_section_tags(line).trim().is_empty() {
            return DisplayLine::Tag(line.trim().to_string());
        }
        let kind = if line.contains('|') {
            classify_bar_line(line)
        } else {
            classify(line)
        };
        match kind {
            LineKind::Lyric => DisplayLine::Lyric(line.to_string()),
            LineKind::Chord => DisplayLine::Chords(
                split_segments(line)
                    .into_iter()
                    .map(|(leading, token)| {
                        let is_chord = ChordSymbol::parse(token).is_some();
                        ChordSegment {
                            leading: leading.to_string(),
                            text: self.display_chord(token, role, options),
                            is_chord,
                            clickable: is_chord && role.chords_clickable(),
                        }
                    })
                    .collect(),
            ),
        }
    }

    /// Chord text as shown to `role`, after optional simplification.
    pub fn display_chord(&self, token: &str, role: ParticipantRole, options: &RenderOptions) -> String {
        let (open, core, close) = split_bar_edges(token);
        if !open.is_empty() || !close.is_empty() {
            return format!("{}{}{}", open, self.display_chord(core, role, options), close);
        }
        if ChordSymbol::parse(token).is_none() {
            return token.to_string();
        }
        let chord = if options.simplify_chords {
            self.simplifier.simplify(token)
        } else {
            token.to_string()
        };
        if role == ParticipantRole::Bassist {
            if let Some(bass) = ChordSymbol::parse(&chord).and_then(|c| c.bass) {
                return bass.to_string();
            }
        }
        chord
    }
}

/// Keep lyric lines only; fall back to the section name when none carry text.
fn vocal_lines(lines: Vec<DisplayLine>, section: &Section) -> DisplayBody {
    let mut kept: Vec<DisplayLine> = lines
        .into_iter()
        .filter(|l| matches!(l, DisplayLine::Lyric(_) | DisplayLine::Blank))
        .collect();
    while matches!(kept.first(), Some(DisplayLine::Blank)) {
        kept.remove(0);
    }
    while matches!(kept.last(), Some(DisplayLine::Blank)) {
        kept.pop();
    }
    if kept.iter().any(|l| matches!(l, DisplayLine::Lyric(_))) {
        DisplayBody::Text(kept)
    } else {
        DisplayBody::Placeholder(section.display_name().to_string())
    }
}

/// Split a chord line into (leading whitespace, token) pairs.
///
/// `[tags]` stay whole; hyphen-joined chords (`C-G-Am`) split into chords
/// and `-` separators.
fn split_segments(line: &str) -> Vec<(&str, &str)> {
    let mut segments = Vec::new();
    let mut rest = line;
    loop {
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            break;
        }
        let leading = &rest[..rest.len() - trimmed.len()];
        let end = if trimmed.starts_with('[') {
            trimmed.find(']').map(|i| i + 1).unwrap_or(trimmed.len())
        } else {
            trimmed.find(char::is_whitespace).unwrap_or(trimmed.len())
        };
        let token = &trimmed[..end];
        rest = &trimmed[end..];
        if token.starts_with('[') {
            segments.push((leading, token));
            continue;
        }

        // bar lines glued to a chord become their own segments
        let (open, core, close) = split_bar_edges(token);
        let mut lead = leading;
        if !open.is_empty() {
            segments.push((lead, open));
            lead = "";
        }
        if ChordSymbol::parse(core).is_none() && core.contains('-') {
            let mut part_rest = core;
            while !part_rest.is_empty() {
                match part_rest.find('-') {
                    Some(0) => {
                        segments.push((lead, "-"));
                        part_rest = &part_rest[1..];
                    }
                    Some(i) => {
                        segments.push((lead, &part_rest[..i]));
                        part_rest = &part_rest[i..];
                    }
                    None => {
                        segments.push((lead, part_rest));
                        part_rest = "";
                    }
                }
                lead = "";
            }
        } else if !core.is_empty() {
            segments.push((lead, core));
        }
        if !close.is_empty() {
            segments.push(("", close));
        }
    }
    segments
}

/// Render one section with the default renderer.
///
/// # Example
/// ```
/// use chordflow::model::{ParticipantRole, Section};
/// use chordflow::render::{render, RenderOptions};
///
/// let section = Section {
///     id: "v1".to_string(),
///     section_type: "verse".to_string(),
///     name: "Verse".to_string(),
///     content: "C/E F#m7/A".to_string(),
///     time_signature: None,
/// };
/// let model = render(&section, ParticipantRole::Bassist, &RenderOptions::default());
/// assert_eq!(model.sections[0].lines(), vec!["E A".to_string()]);
/// ```
pub fn render(section: &Section, role: ParticipantRole, options: &RenderOptions) -> DisplayModel {
    Renderer::new().render(section, role, options)
}

/// Render a song at a position with the default renderer.
pub fn render_song(
    song: &Song,
    position: &PerformancePosition,
    role: ParticipantRole,
    options: &RenderOptions,
) -> DisplayModel {
    Renderer::new().render_song(song, position, role, options)
}
