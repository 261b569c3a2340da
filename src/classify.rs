//! # Chord/Lyric Classification
//!
//! Decides whether a line of section content is a chord line or a lyric line.
//!
//! ## Rules
//! 1. Bracketed section tags (`[Verse]`, `[Chorus 2]`) are removed first.
//! 2. The rest is split on whitespace and hyphens.
//! 3. The line is [`LineKind::Chord`] iff it has at least one token and every
//!    token is one of:
//!    - a chord symbol (see [`crate::chord::ChordSymbol::parse`])
//!    - a special token: `N.C.`, `NC`, `Tacet`, `STOP` (any case)
//!    - a scale degree with optional accidental: `4`, `b7`, `5#`
//!    - a solfège-style note name: `Fis`, `Bes`, `Es`
//!
//! Everything else is [`LineKind::Lyric`]. Classification is a pure function
//! of the line text, so classifying the same line twice always agrees.
//!
//! Bar-structure lines (`| . . . |`) are not chords on their own; they only
//! count as chord content inside bar formatting, see [`classify_bar_line`].

use crate::chord::ChordSymbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Chord,
    Lyric,
}

/// Classify a single line.
///
/// # Example
/// ```
/// use chordflow::classify::{classify, LineKind};
///
/// assert_eq!(classify("G  D/F#  Em7"), LineKind::Chord);
/// assert_eq!(classify("[Chorus] C - G - Am"), LineKind::Chord);
/// assert_eq!(classify("Amazing grace how sweet"), LineKind::Lyric);
/// assert_eq!(classify(""), LineKind::Lyric);
/// ```
pub fn classify(line: &str) -> LineKind {
    let stripped = strip_section_tags(line);
    let tokens = tokenize(&stripped);
    if !tokens.is_empty() && tokens.iter().all(|t| is_chord_like(t)) {
        LineKind::Chord
    } else {
        LineKind::Lyric
    }
}

pub fn is_chord_line(line: &str) -> bool {
    classify(line) == LineKind::Chord
}

/// Classify a line that appears inside bar formatting.
///
/// Bar-line markers are ignored; a line that consists solely of bar structure
/// (`|`, `.`, whitespace) counts as chord content.
pub fn classify_bar_line(line: &str) -> LineKind {
    if is_bar_structure_line(line) {
        return LineKind::Chord;
    }
    let stripped = strip_section_tags(line);
    let tokens: Vec<&str> = tokenize(&stripped)
        .into_iter()
        .map(|t| t.trim_matches(|c| c == '|' || c == ':'))
        .filter(|t| !t.is_empty() && !is_bar_marker(t))
        .collect();
    if !tokens.is_empty() && tokens.iter().all(|t| is_chord_like(t) || is_beat_marker(t)) {
        LineKind::Chord
    } else {
        LineKind::Lyric
    }
}

/// A non-empty line made only of `|`, `.` and whitespace, with at least one `|`.
pub fn is_bar_structure_line(line: &str) -> bool {
    line.contains('|') && line.chars().all(|c| c == '|' || c == '.' || c.is_whitespace())
}

/// Remove `[ ... ]` tags. An unterminated `[` is kept as text.
pub fn strip_section_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(open) = rest.find('[') {
        match rest[open..].find(']') {
            Some(close) => {
                out.push_str(&rest[..open]);
                out.push(' ');
                rest = &rest[open + close + 1..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

/// Split on whitespace and hyphens, dropping empty pieces.
///
/// A trailing `-` that belongs to a chord (`C-`, `Bm7-5`) is a minor/flat
/// marker, so hyphens only separate when they stand between two tokens or
/// are surrounded by whitespace.
pub fn tokenize(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    for word in line.split_whitespace() {
        if ChordSymbol::parse(word).is_some() {
            tokens.push(word);
            continue;
        }
        tokens.extend(word.split('-').filter(|t| !t.is_empty()));
    }
    tokens
}

/// True when a token is accepted by any of the chord-line rules.
pub fn is_chord_like(token: &str) -> bool {
    ChordSymbol::parse(token).is_some()
        || is_special_token(token)
        || is_scale_degree(token)
        || is_solfege(token)
}

pub fn is_special_token(token: &str) -> bool {
    ["N.C.", "NC", "TACET", "STOP"]
        .iter()
        .any(|s| token.eq_ignore_ascii_case(s))
}

/// `4`, `b7`, `#4`, `5b`: a single digit with at most one accidental.
pub fn is_scale_degree(token: &str) -> bool {
    let chars: Vec<char> = token.chars().collect();
    let is_acc = |c: char| c == 'b' || c == '#';
    match chars.as_slice() {
        [d] => d.is_ascii_digit(),
        [a, d] if is_acc(*a) => d.is_ascii_digit(),
        [d, a] if is_acc(*a) => d.is_ascii_digit(),
        _ => false,
    }
}

/// German/solfège-style names: `Fis`, `Cis`, `Bes`, `Es`, `As`.
pub fn is_solfege(token: &str) -> bool {
    let mut chars = token.chars();
    let Some(letter) = chars.next() else {
        return false;
    };
    if !('A'..='G').contains(&letter) {
        return false;
    }
    let suffix = chars.as_str().to_ascii_lowercase();
    matches!(suffix.as_str(), "is" | "es" | "s")
}

/// Bar-line markers that may appear in chord text.
pub fn is_bar_marker(token: &str) -> bool {
    matches!(
        token,
        "|" | "||" | "|:" | ":|" | "||:" | ":||" | "|." | "://" | "/:." | ":"
    )
}

/// Split bar-line characters off both ends of a token.
///
/// `|G` gives `("|", "G", "")`, `G/B:|` gives `("", "G/B", ":|")` and a bare
/// marker like `||` is all opening edge.
pub fn split_bar_edges(token: &str) -> (&str, &str, &str) {
    let is_edge = |c: char| c == '|' || c == ':';
    let rest = token.trim_start_matches(is_edge);
    let open = &token[..token.len() - rest.len()];
    let core = rest.trim_end_matches(is_edge);
    (open, core, &rest[core.len()..])
}

/// Beat fillers used in bar notation.
fn is_beat_marker(token: &str) -> bool {
    matches!(token, "." | "/" | "%" | "//" | "/.")
}
