//! Display model produced by the renderer.

use crate::chord_grid::GridLine;

/// Notice shown when the position does not resolve to a section.
pub const NO_SECTION_SELECTED: &str = "No section selected";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DisplayModel {
    pub title: Option<String>,
    pub sections: Vec<DisplaySection>,
    /// Set instead of sections when there is nothing to show.
    pub notice: Option<String>,
}

impl DisplayModel {
    pub fn no_section_selected() -> Self {
        Self {
            title: None,
            sections: Vec::new(),
            notice: Some(NO_SECTION_SELECTED.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySection {
    pub section_id: String,
    pub title: String,
    pub repeat_count: u32,
    /// This is the section the position points at.
    pub is_current: bool,
    pub body: DisplayBody,
}

impl DisplaySection {
    /// Header text, with the repeat count when the section plays more than once.
    pub fn header(&self) -> String {
        if self.repeat_count > 1 {
            format!("{} x{}", self.title, self.repeat_count)
        } else {
            self.title.clone()
        }
    }

    /// Text of every line of a text body.
    pub fn lines(&self) -> Vec<String> {
        match &self.body {
            DisplayBody::Text(lines) => lines.iter().map(DisplayLine::text).collect(),
            DisplayBody::Grid { .. } => Vec::new(),
            DisplayBody::Placeholder(text) => vec![text.clone()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayBody {
    Text(Vec<DisplayLine>),
    Grid { lines: Vec<GridLine>, clickable: bool },
    /// Nothing to show for this role; the section name stands in.
    Placeholder(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayLine {
    Chords(Vec<ChordSegment>),
    Lyric(String),
    /// A line holding only bracketed section tags.
    Tag(String),
    Blank,
}

impl DisplayLine {
    pub fn text(&self) -> String {
        match self {
            DisplayLine::Chords(segments) => segments
                .iter()
                .map(|s| format!("{}{}", s.leading, s.text))
                .collect(),
            DisplayLine::Lyric(text) | DisplayLine::Tag(text) => text.clone(),
            DisplayLine::Blank => String::new(),
        }
    }

    pub fn is_chord_line(&self) -> bool {
        matches!(self, DisplayLine::Chords(_))
    }
}

/// One token of a chord line, with the whitespace that preceded it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordSegment {
    pub leading: String,
    pub text: String,
    pub is_chord: bool,
    /// The chord can be tapped to show a diagram.
    pub clickable: bool,
}
