//! Chord simplification.
//!
//! The renderer only needs "give me an easier chord"; how that is decided is
//! pluggable through [`ChordSimplifier`].

use crate::chord::ChordSymbol;

pub trait ChordSimplifier: Send + Sync {
    /// Return a simpler spelling of `chord`. Non-chords come back unchanged.
    fn simplify(&self, chord: &str) -> String;
}

/// Reduces every chord to its triad quality, keeping the bass note.
///
/// `Cmaj7` → `C`, `F#m7b5/E` → `F#dim/E`, `Gsus4add9` → `Gsus4`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriadSimplifier;

impl ChordSimplifier for TriadSimplifier {
    fn simplify(&self, chord: &str) -> String {
        let Some(mut symbol) = ChordSymbol::parse(chord) else {
            return chord.to_string();
        };
        symbol.suffix = triad_quality(&symbol.suffix).to_string();
        symbol.to_string()
    }
}

fn triad_quality(suffix: &str) -> &'static str {
    let is_minor = !suffix.starts_with("ma")
        && (suffix.starts_with('m') || suffix.starts_with('-'));

    if suffix.contains("dim") || suffix.contains('°') || suffix.contains('ø') || suffix.starts_with('o') {
        "dim"
    } else if suffix.contains("aug") || suffix.starts_with('+') || suffix.contains("#5") {
        "aug"
    } else if is_minor {
        if suffix.contains("b5") || suffix.contains("-5") {
            "dim"
        } else {
            "m"
        }
    } else if suffix.contains("sus2") {
        "sus2"
    } else if suffix.contains("sus") {
        "sus4"
    } else {
        ""
    }
}

/// Leaves every chord as written.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSimplifier;

impl ChordSimplifier for NoSimplifier {
    fn simplify(&self, chord: &str) -> String {
        chord.to_string()
    }
}
