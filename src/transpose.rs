//! # Transposition
//!
//! Shifts chord roots and slash basses by the semitone interval between two
//! keys. Spelling of the result is chosen by `prefer_sharps`; identical keys
//! are an identity (the input is returned as written).
//!
//! Tokens that are not chords are never touched. Rest symbols (`WR`, `HR`,
//! `QR`, `ER`, `SR` and dotted forms), repeat/simile marks (`%`, `//`, `/.`,
//! `/`) and bar-line markers pass through unchanged.
//!
//! ## Content forms
//! - plain text: only lines classified as chord lines change
//! - chord grid JSON: only each bar's `chord` field changes; a payload that is
//!   not a bar list falls back to transposing every chord-shaped token in the
//!   raw string

use serde_json::Value;
use tracing::debug;

use crate::chord::{ChordSymbol, Pitch};
use crate::classify::{classify_bar_line, is_bar_marker, split_bar_edges, LineKind};
use crate::error::{LiveError, Result};
use crate::model::{ContentTheme, SectionContent, Song};

/// Parse a key name to its tonic pitch. Accepts minor keys ("Am", "F#m",
/// "Ebmin") and double accidentals ("C##").
pub fn parse_key(key: &str) -> Result<Pitch> {
    let key = key.trim();
    let (pitch, used) =
        Pitch::parse_prefix(key).ok_or_else(|| LiveError::InvalidKey(key.to_string()))?;
    match &key[used..] {
        "" | "m" | "min" | "minor" | "maj" | "major" => Ok(pitch),
        _ => Err(LiveError::InvalidKey(key.to_string())),
    }
}

/// Upward interval in semitones (0-11) from one key to another.
///
/// # Example
/// ```
/// use chordflow::transpose::semitone_interval;
///
/// assert_eq!(semitone_interval("C", "D").unwrap(), 2);
/// assert_eq!(semitone_interval("D", "C").unwrap(), 10);
/// assert_eq!(semitone_interval("Am", "Bbm").unwrap(), 1);
/// assert!(semitone_interval("C", "H").is_err());
/// ```
pub fn semitone_interval(from_key: &str, to_key: &str) -> Result<i8> {
    let from = parse_key(from_key)?;
    let to = parse_key(to_key)?;
    Ok((to.semitone() - from.semitone()).rem_euclid(12))
}

/// True for tokens that must never be rewritten.
pub fn is_passthrough(token: &str) -> bool {
    let rest = token.trim_end_matches('.');
    if matches!(rest, "WR" | "HR" | "QR" | "ER" | "SR") {
        return true;
    }
    matches!(token, "%" | "//" | "/." | "/" | ".") || is_bar_marker(token)
}

/// Transpose a single token by a semitone interval.
pub fn transpose_chord(token: &str, semitones: i8, prefer_sharps: bool) -> String {
    if semitones.rem_euclid(12) == 0 || is_passthrough(token) {
        return token.to_string();
    }
    let (open, core, close) = split_bar_edges(token);
    if !open.is_empty() || !close.is_empty() {
        return format!("{}{}{}", open, transpose_chord(core, semitones, prefer_sharps), close);
    }
    match ChordSymbol::parse(token) {
        Some(chord) => chord.transposed(semitones, prefer_sharps).to_string(),
        None => token.to_string(),
    }
}

/// Transpose a chord token from one key to another.
///
/// Unknown key names leave the token unchanged. Spelling follows
/// `prefer_sharps`, not the input, so a round trip back to the starting key
/// can re-spell an enharmonic (`A#` comes back as `Bb` with flats preferred).
///
/// # Example
/// ```
/// use chordflow::transpose::transpose;
///
/// assert_eq!(transpose("Bb", "C", "D", true), "C");
/// assert_eq!(transpose("G/B", "C", "D", true), "A/C#");
/// assert_eq!(transpose("WR", "C", "D", true), "WR");
/// ```
pub fn transpose(token: &str, from_key: &str, to_key: &str, prefer_sharps: bool) -> String {
    match semitone_interval(from_key, to_key) {
        Ok(semitones) => transpose_chord(token, semitones, prefer_sharps),
        Err(err) => {
            debug!("Leaving '{}' untransposed: {}", token, err);
            token.to_string()
        }
    }
}

/// Transpose every token of a line, preserving spacing and `[tags]`.
pub fn transpose_line(line: &str, semitones: i8, prefer_sharps: bool) -> String {
    let mut out = String::with_capacity(line.len() + 8);
    let mut token = String::new();
    let mut in_tag = false;

    let flush = |token: &mut String, out: &mut String| {
        if !token.is_empty() {
            out.push_str(&transpose_token_with_hyphens(token, semitones, prefer_sharps));
            token.clear();
        }
    };

    for c in line.chars() {
        if in_tag {
            out.push(c);
            if c == ']' {
                in_tag = false;
            }
        } else if c == '[' {
            flush(&mut token, &mut out);
            out.push(c);
            in_tag = true;
        } else if c.is_whitespace() {
            flush(&mut token, &mut out);
            out.push(c);
        } else {
            token.push(c);
        }
    }
    flush(&mut token, &mut out);
    out
}

/// "C-G-Am" is three chords; "C-" or "Bm7-5" is one.
fn transpose_token_with_hyphens(token: &str, semitones: i8, prefer_sharps: bool) -> String {
    let (open, core, close) = split_bar_edges(token);
    if ChordSymbol::parse(core).is_some() || !core.contains('-') {
        return transpose_chord(token, semitones, prefer_sharps);
    }
    let parts = core
        .split('-')
        .map(|part| transpose_chord(part, semitones, prefer_sharps))
        .collect::<Vec<_>>()
        .join("-");
    format!("{}{}{}", open, parts, close)
}

/// Transpose the chord lines of a text block; lyric lines are untouched.
pub fn transpose_text(content: &str, semitones: i8, prefer_sharps: bool) -> String {
    content
        .split('\n')
        .map(|line| match classify_bar_line(line) {
            LineKind::Chord => transpose_line(line, semitones, prefer_sharps),
            LineKind::Lyric => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Transpose the `chord` field of every bar in a chord grid payload.
///
/// Accepts either a bare array of bars or an object with a `bars` array.
/// All other fields are carried through unchanged.
pub fn transpose_grid_payload(payload: &str, semitones: i8, prefer_sharps: bool) -> Result<String> {
    let mut value: Value = serde_json::from_str(payload)
        .map_err(|e| LiveError::TransposeParseFailure(e.to_string()))?;

    let bars = match &mut value {
        Value::Array(bars) => bars,
        Value::Object(map) => match map.get_mut("bars") {
            Some(Value::Array(bars)) => bars,
            _ => {
                return Err(LiveError::TransposeParseFailure(
                    "object payload without a bars array".to_string(),
                ))
            }
        },
        _ => {
            return Err(LiveError::TransposeParseFailure(
                "payload is not a bar list".to_string(),
            ))
        }
    };

    for bar in bars.iter_mut() {
        if let Some(Value::String(chord)) = bar.get_mut("chord") {
            *chord = transpose_line(chord, semitones, prefer_sharps);
        }
    }

    serde_json::to_string(&value).map_err(|e| LiveError::TransposeParseFailure(e.to_string()))
}

/// Transpose every chord-shaped run in a raw string, regardless of lines.
///
/// Used when a grid payload cannot be parsed. Runs are delimited by
/// whitespace and JSON punctuation.
pub fn transpose_raw(content: &str, semitones: i8, prefer_sharps: bool) -> String {
    let is_delim = |c: char| c.is_whitespace() || matches!(c, '"' | ',' | ':' | '{' | '}' | '[' | ']');
    let mut out = String::with_capacity(content.len());
    let mut run = String::new();
    for c in content.chars() {
        if is_delim(c) {
            if !run.is_empty() {
                out.push_str(&transpose_chord(&run, semitones, prefer_sharps));
                run.clear();
            }
            out.push(c);
        } else {
            run.push(c);
        }
    }
    if !run.is_empty() {
        out.push_str(&transpose_chord(&run, semitones, prefer_sharps));
    }
    out
}

fn looks_like_json(content: &str) -> bool {
    let trimmed = content.trim_start();
    (trimmed.starts_with('[') && trimmed.contains('{')) || trimmed.starts_with('{')
}

/// Transpose one section's content according to the song theme.
pub fn transpose_section_content(
    content: &str,
    theme: ContentTheme,
    semitones: i8,
    prefer_sharps: bool,
) -> String {
    if theme == ContentTheme::ChordGrid || looks_like_json(content) {
        match transpose_grid_payload(content, semitones, prefer_sharps) {
            Ok(payload) => return payload,
            Err(err) if theme == ContentTheme::ChordGrid => {
                debug!("Grid payload fallback to raw transposition: {}", err);
                return transpose_raw(content, semitones, prefer_sharps);
            }
            Err(_) => {}
        }
    }
    transpose_text(content, semitones, prefer_sharps)
}

/// Result of transposing a whole song.
#[derive(Debug, Clone, PartialEq)]
pub struct TransposedSong {
    pub song: Song,
    pub old_key: String,
    pub new_key: String,
    /// New content of every section, for the provider write and the delta.
    pub sections: Vec<SectionContent>,
}

/// Transpose all sections of a song to a new key.
pub fn transpose_song(song: &Song, to_key: &str, prefer_sharps: bool) -> Result<TransposedSong> {
    let semitones = semitone_interval(&song.current_key, to_key)?;
    let mut transposed = song.clone();
    transposed.current_key = to_key.trim().to_string();

    let mut sections = Vec::with_capacity(transposed.sections.len());
    for section in transposed.sections.iter_mut() {
        section.content =
            transpose_section_content(&section.content, song.theme, semitones, prefer_sharps);
        sections.push(SectionContent {
            id: section.id.clone(),
            content: section.content.clone(),
        });
    }

    Ok(TransposedSong {
        song: transposed,
        old_key: song.current_key.clone(),
        new_key: to_key.trim().to_string(),
        sections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{grid_song, sample_song};

    #[test]
    fn test_scenario_c() {
        assert_eq!(transpose("Bb", "C", "D", true), "C");
        assert_eq!(transpose("G/B", "C", "D", true), "A/C#");
    }

    #[test]
    fn test_flat_spelling() {
        assert_eq!(transpose("C", "C", "Bb", false), "Bb");
        assert_eq!(transpose("C", "C", "Bb", true), "A#");
        assert_eq!(transpose("F#m7b5", "C", "Eb", false), "Am7b5");
    }

    #[test]
    fn test_identity() {
        for token in ["A#", "Gb/Db", "Cmaj7", "N.C."] {
            assert_eq!(transpose(token, "E", "E", true), token);
            assert_eq!(transpose(token, "Am", "A", false), token);
        }
    }

    #[test]
    fn test_composability() {
        let chords = ["C", "D", "Em7", "F#m", "G/B", "A7sus4", "B"];
        for chord in chords {
            let two_step = transpose(&transpose(chord, "C", "E", true), "E", "G", true);
            assert_eq!(two_step, transpose(chord, "C", "G", true), "{}", chord);
        }
    }

    #[test]
    fn test_composability_flat_keys() {
        let chords = ["F", "Bb", "Ebmaj7", "Gm/Bb", "Ab", "Db7", "C"];
        for chord in chords {
            let two_step = transpose(&transpose(chord, "F", "Eb", false), "Eb", "Ab", false);
            assert_eq!(two_step, transpose(chord, "F", "Ab", false), "{}", chord);
        }
        assert_eq!(transpose("Gm/Bb", "F", "Ab", false), "Bbm/Db");
    }

    #[test]
    fn test_round_trip_respells() {
        // back to the starting key the pitch is unchanged but spelled by preference
        let there = transpose("A#", "C", "D", false);
        assert_eq!(there, "C");
        assert_eq!(transpose(&there, "D", "C", false), "Bb");
        assert_eq!(transpose(&there, "D", "C", true), "A#");
    }

    #[test]
    fn test_chords_against_bar_lines() {
        assert_eq!(transpose_text("| C . . . |G . . . |", 2, true), "| D . . . |A . . . |");
        assert_eq!(transpose_line("|:C/E . . . | Am:|", 2, true), "|:D/F# . . . | Bm:|");
        assert_eq!(transpose_line("|C-G-Am|", 2, true), "|D-A-Bm|");
        assert_eq!(transpose_chord("||", 2, true), "||");
    }

    #[test]
    fn test_grid_chord_field_with_bar_lines() {
        let payload = r#"[{"id":"b1","chord":"|G . C/E .:|"}]"#;
        let result = transpose_grid_payload(payload, 2, true).unwrap();
        let bars: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(bars[0]["chord"], "|A . D/F# .:|");
    }

    #[test]
    fn test_passthrough_tokens() {
        for token in ["WR", "HR", "QR", "ER", "SR", "HR.", "%", "//", "/.", "/", "|:", ":||"] {
            assert_eq!(transpose(token, "C", "F", true), token);
        }
    }

    #[test]
    fn test_unknown_key_leaves_token() {
        assert_eq!(transpose("C", "C", "X", true), "C");
        assert!(parse_key("Cmix").is_err());
        assert_eq!(parse_key("F#m").unwrap().to_string(), "F#");
    }

    #[test]
    fn test_transpose_text_only_touches_chord_lines() {
        let text = "[Verse]\nG  C/G  D\nAmazing grace how sweet\nA - D";
        let result = transpose_text(text, 2, true);
        assert_eq!(result, "[Verse]\nA  D/A  E\nAmazing grace how sweet\nB - E");
    }

    #[test]
    fn test_transpose_line_keeps_tags_and_hyphens() {
        assert_eq!(transpose_line("[C] C-G-Am", 2, true), "[C] D-A-Bm");
        assert_eq!(transpose_line("Bm7-5 E7", 2, true), "C#m7-5 F#7");
    }

    #[test]
    fn test_grid_only_chord_field_changes() {
        let payload = r#"[{"id":"b1","chord":"C . G/B .","melody":{"notAngka":"1 2 3 4"},"restType":"QR"},{"id":"b2","chord":"WR"}]"#;
        let result = transpose_grid_payload(payload, 2, true).unwrap();
        let bars: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(bars[0]["chord"], "D . A/C# .");
        assert_eq!(bars[0]["melody"]["notAngka"], "1 2 3 4");
        assert_eq!(bars[0]["restType"], "QR");
        assert_eq!(bars[1]["chord"], "WR");
    }

    #[test]
    fn test_grid_object_form() {
        let payload = r#"{"bars":[{"chord":"F"}],"title":"x"}"#;
        let result = transpose_grid_payload(payload, 7, true).unwrap();
        let value: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(value["bars"][0]["chord"], "C");
        assert_eq!(value["title"], "x");
    }

    #[test]
    fn test_malformed_grid_falls_back() {
        let broken = r#"[{"chord":"C G"#;
        assert!(matches!(
            transpose_grid_payload(broken, 2, true),
            Err(LiveError::TransposeParseFailure(_))
        ));
        let result = transpose_section_content(broken, ContentTheme::ChordGrid, 2, true);
        assert_eq!(result, r#"[{"chord":"D A"#);
    }

    #[test]
    fn test_transpose_song() {
        let song = sample_song();
        let result = transpose_song(&song, "A", true).unwrap();
        assert_eq!(result.old_key, "G");
        assert_eq!(result.new_key, "A");
        assert_eq!(result.song.current_key, "A");
        let verse = result.song.section("verse").unwrap();
        assert_eq!(verse.content, "A D A\nAmazing grace how sweet the sound");
        assert_eq!(result.sections.len(), 2);
    }

    #[test]
    fn test_transpose_grid_song() {
        let song = grid_song();
        let result = transpose_song(&song, "D", true).unwrap();
        let bars: Value = serde_json::from_str(&result.song.sections[0].content).unwrap();
        assert_eq!(bars[0]["chord"], "|: D . A/C# .");
        assert_eq!(bars[1]["ending"]["type"], "1");
        assert_eq!(bars[2]["chord"], "WR");
    }
}
