//! # Chord Grid
//!
//! Structured bar-by-bar chord charts. A section of a `chord_grid` song holds a
//! JSON payload: either a bare array of bars or `{ "bars": [...] }`.
//!
//! ## Bar payload
//! ```text
//! {
//!   "id": "b1",
//!   "chord": "|: C . G/B .",           beat tokens, space separated
//!   "restType": "QR",                    extra beat columns, in this order:
//!   "chordAfter": "F",                   chord, restType, chordAfter,
//!   "trailingRestType": "ER",            trailingRestType, chordEnd
//!   "chordEnd": "G",
//!   "melody": { "notAngka": "1 2 3 4" },
//!   "notes": [{ "type": "quarter", "beat": "2", "tied": true }],
//!   "musicalSigns": { "segno": true, "coda": false, "dsAlCoda": false, ... },
//!   "ending": { "type": "1", "isStart": true, "isEnd": false },
//!   "timeSignatureOverride": "3/4"
//! }
//! ```
//!
//! ## Layout
//! [`layout`] groups bars into lines of `bars_per_line`, lifts repeat markers
//! out of the chord text into bar lines, places rhythm notes on beat columns
//! and measures tie spans. A payload with exactly one non-empty bar collapses
//! to that bar.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{LiveError, Result};
use crate::model::TimeSignature;

/// Default number of bars on one grid line.
pub const DEFAULT_BARS_PER_LINE: usize = 4;

/// Beat tokens that are rests or simile marks rather than chords.
const NON_CHORD_BEATS: &[&str] = &[
    "WR", "HR", "QR", "ER", "SR", "WR.", "HR.", "QR.", "ER.", "SR.", "%", "//", "/.", "/",
];

/// Whole-bar simile marks, shown alone in the bar.
const SIMILE_MARKS: &[&str] = &["%", "//", "/."];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordGridBar {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub chord: String,
    #[serde(default)]
    pub rest_type: Option<String>,
    #[serde(default)]
    pub chord_after: Option<String>,
    #[serde(default)]
    pub trailing_rest_type: Option<String>,
    #[serde(default)]
    pub chord_end: Option<String>,
    #[serde(default)]
    pub beats: Option<u32>,
    #[serde(default)]
    pub melody: Option<Melody>,
    #[serde(default)]
    pub notes: Vec<RhythmNote>,
    #[serde(default)]
    pub musical_signs: Option<MusicalSigns>,
    #[serde(default)]
    pub ending: Option<Ending>,
    #[serde(default)]
    pub time_signature_override: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Melody {
    #[serde(default)]
    pub not_angka: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicalSigns {
    #[serde(default)]
    pub segno: bool,
    #[serde(default)]
    pub coda: bool,
    #[serde(default)]
    pub ds_al_coda: bool,
    #[serde(default)]
    pub dc_al_coda: bool,
    #[serde(default)]
    pub ds: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ending {
    #[serde(rename = "type", deserialize_with = "string_or_number", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub is_start: bool,
    #[serde(default)]
    pub is_end: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    Whole,
    Half,
    #[default]
    Quarter,
    Eighth,
    Sixteenth,
    WholeRest,
    HalfRest,
    QuarterRest,
    EighthRest,
    #[serde(other)]
    Other,
}

impl NoteType {
    pub fn symbol(&self) -> &'static str {
        match self {
            NoteType::Whole => "○",
            NoteType::Half => "𝅗𝅥",
            NoteType::Quarter | NoteType::Other => "♩",
            NoteType::Eighth => "♪",
            NoteType::Sixteenth => "𝅘𝅥𝅯",
            NoteType::WholeRest => "WR",
            NoteType::HalfRest => "HR",
            NoteType::QuarterRest => "QR",
            NoteType::EighthRest => "ER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RhythmNote {
    #[serde(rename = "type", default)]
    pub note_type: NoteType,
    #[serde(default, deserialize_with = "string_or_number")]
    pub beat: Option<String>,
    #[serde(default)]
    pub chord: Option<String>,
    #[serde(default)]
    pub tied: bool,
    #[serde(default)]
    pub dotted: bool,
    #[serde(default)]
    pub tie_to: Option<Value>,
}

/// Ids, beats and ending types arrive as either strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl ChordGridBar {
    pub fn is_empty(&self) -> bool {
        self.chord.trim().is_empty()
    }

    /// Beat columns: chord tokens, then restType, chordAfter,
    /// trailingRestType and chordEnd.
    pub fn chord_beats(&self) -> Vec<String> {
        let mut beats: Vec<String> = split_beats(&self.chord);
        if let Some(rest) = non_blank(&self.rest_type) {
            beats.push(rest.to_string());
        }
        if let Some(after) = non_blank(&self.chord_after) {
            beats.extend(split_beats(after));
        }
        if let Some(rest) = non_blank(&self.trailing_rest_type) {
            beats.push(rest.to_string());
        }
        if let Some(end) = non_blank(&self.chord_end) {
            beats.extend(split_beats(end));
        }
        beats
    }

    pub fn melody_beats(&self) -> Vec<String> {
        self.melody
            .as_ref()
            .and_then(|m| m.not_angka.as_deref())
            .map(split_beats)
            .unwrap_or_default()
    }

    fn has_melody(&self) -> bool {
        self.melody
            .as_ref()
            .and_then(|m| m.not_angka.as_deref())
            .is_some_and(|s| !s.trim().is_empty())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn split_beats(s: &str) -> Vec<String> {
    s.split(' ').filter(|t| !t.is_empty()).map(str::to_string).collect()
}

/// Parse a grid payload into bars.
pub fn parse_grid(payload: &str) -> Result<Vec<ChordGridBar>> {
    let value: Value = serde_json::from_str(payload.trim())?;
    let bars = match value {
        Value::Array(bars) => Value::Array(bars),
        Value::Object(mut map) => map
            .remove("bars")
            .ok_or_else(|| LiveError::not_found("bars", "chord grid payload"))?,
        _ => return Err(LiveError::not_found("bars", "chord grid payload")),
    };
    Ok(serde_json::from_value(bars)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarLine {
    Single,
    RepeatStart,
    RepeatEnd,
}

impl BarLine {
    pub fn symbol(&self) -> &'static str {
        match self {
            BarLine::Single => "|",
            BarLine::RepeatStart => "||:",
            BarLine::RepeatEnd => ":||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicalSign {
    Segno,
    Coda,
    DsAlCoda,
    Ds,
    DcAlCoda,
}

impl MusicalSign {
    pub fn label(&self) -> &'static str {
        match self {
            MusicalSign::Segno => "𝄋",
            MusicalSign::Coda => "𝄌",
            MusicalSign::DsAlCoda => "D.S. al coda",
            MusicalSign::Ds => "D.S.",
            MusicalSign::DcAlCoda => "D.C.",
        }
    }
}

/// How far a tie arc reaches from its note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TieSpan {
    pub columns: usize,
    pub cross_bar: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedNote {
    pub note_type: NoteType,
    pub dotted: bool,
    pub tie: Option<TieSpan>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridBeat {
    pub chord: Option<String>,
    pub melody: Option<String>,
    pub notes: Vec<PlacedNote>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndingMark {
    /// "1st ending", only on the bar that starts the bracket.
    pub label: Option<String>,
    pub is_start: bool,
    pub is_end: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridBar {
    pub id: Option<String>,
    pub beats: Vec<GridBeat>,
    /// `%`, `//` or `/.` shown alone in place of beats.
    pub simile: Option<String>,
    pub signs: Vec<MusicalSign>,
    pub ending: Option<EndingMark>,
    pub time_signature: Option<TimeSignature>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridLine {
    pub bars: Vec<GridBar>,
    /// One more than `bars`: the line before each bar and the closing one.
    pub bar_lines: Vec<BarLine>,
    pub has_melody: bool,
    pub has_endings: bool,
    pub has_signs: bool,
    /// Fewer bars than the line holds; drawn left-aligned at fixed width.
    pub is_partial: bool,
}

/// Ordinal suffix for ending labels: 1st, 2nd, 3rd, 4th, 11th, 21st.
pub fn ordinal_suffix(n: &str) -> &'static str {
    let Ok(n) = n.trim().parse::<u64>() else {
        return "";
    };
    let v = n % 100;
    if (11..=13).contains(&v) {
        return "th";
    }
    match v % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

/// Lay bars out into lines.
pub fn layout(bars: &[ChordGridBar], bars_per_line: usize) -> Vec<GridLine> {
    let bars_per_line = bars_per_line.max(1);
    let non_empty: Vec<&ChordGridBar> = bars.iter().filter(|b| !b.is_empty()).collect();
    let bars: Vec<&ChordGridBar> = if non_empty.len() == 1 {
        non_empty
    } else {
        bars.iter().collect()
    };

    bars.chunks(bars_per_line)
        .map(|chunk| layout_line(chunk, bars_per_line))
        .collect()
}

fn layout_line(chunk: &[&ChordGridBar], bars_per_line: usize) -> GridLine {
    let mut bar_lines = vec![BarLine::Single; chunk.len() + 1];
    let mut bars = Vec::with_capacity(chunk.len());

    for (index, source) in chunk.iter().enumerate() {
        let mut bar = (*source).clone();
        let (start, chord, end) = lift_repeat_markers(&bar.chord);
        if let Some(marker) = start {
            bar_lines[index] = marker;
        }
        if let Some(marker) = end {
            bar_lines[index + 1] = marker;
        }
        bar.chord = chord;
        bars.push(layout_bar(&bar));
    }

    GridLine {
        has_melody: chunk.iter().any(|b| b.has_melody()),
        has_endings: chunk.iter().any(|b| b.ending.is_some()),
        has_signs: bars.iter().any(|b| !b.signs.is_empty()),
        is_partial: chunk.len() < bars_per_line,
        bars,
        bar_lines,
    }
}

/// Split leading `|:`, `||:`, `/:.` and trailing `:||`, `://` off the chord text.
fn lift_repeat_markers(chord: &str) -> (Option<BarLine>, String, Option<BarLine>) {
    let mut text = chord.trim();
    let mut start = None;
    let mut end = None;
    for prefix in ["||:", "|:", "/:."] {
        if let Some(rest) = text.strip_prefix(prefix) {
            start = Some(BarLine::RepeatStart);
            text = rest.trim();
            break;
        }
    }
    for suffix in [":||", "://"] {
        if let Some(rest) = text.strip_suffix(suffix) {
            end = Some(BarLine::RepeatEnd);
            text = rest.trim();
            break;
        }
    }
    (start, text.to_string(), end)
}

fn layout_bar(bar: &ChordGridBar) -> GridBar {
    let signs = bar
        .musical_signs
        .as_ref()
        .map(|s| {
            let mut signs = Vec::new();
            if s.segno {
                signs.push(MusicalSign::Segno);
            }
            if s.coda {
                signs.push(MusicalSign::Coda);
            }
            if s.ds_al_coda {
                signs.push(MusicalSign::DsAlCoda);
            }
            if s.ds {
                signs.push(MusicalSign::Ds);
            }
            if s.dc_al_coda {
                signs.push(MusicalSign::DcAlCoda);
            }
            signs
        })
        .unwrap_or_default();

    let ending = bar.ending.as_ref().map(|e| {
        let kind = e.kind.clone().unwrap_or_default();
        EndingMark {
            label: e
                .is_start
                .then(|| format!("{}{} ending", kind, ordinal_suffix(&kind))),
            is_start: e.is_start,
            is_end: e.is_end,
        }
    });

    let time_signature = bar
        .time_signature_override
        .as_deref()
        .and_then(TimeSignature::from_str);

    let trimmed = bar.chord.trim();
    if SIMILE_MARKS.contains(&trimmed) {
        return GridBar {
            id: bar.id.clone(),
            beats: Vec::new(),
            simile: Some(trimmed.to_string()),
            signs,
            ending,
            time_signature,
        };
    }

    let chord_beats = bar.chord_beats();
    let melody_beats = bar.melody_beats();
    let num_beats = chord_beats.len().max(melody_beats.len()).max(1);

    let mut beats: Vec<GridBeat> = (0..num_beats)
        .map(|i| GridBeat {
            chord: chord_beats.get(i).cloned(),
            melody: melody_beats.get(i).cloned(),
            notes: Vec::new(),
        })
        .collect();

    for (note_index, note) in bar.notes.iter().enumerate() {
        let Some(column) = note_column(note, note_index, &chord_beats) else {
            continue;
        };
        if column == 0 || column > num_beats {
            continue;
        }
        let tie = note.tied.then(|| tie_span(column, &chord_beats, num_beats));
        beats[column - 1].notes.push(PlacedNote {
            note_type: note.note_type,
            dotted: note.dotted,
            tie,
        });
    }

    GridBar {
        id: bar.id.clone(),
        beats,
        simile: None,
        signs,
        ending,
        time_signature,
    }
}

/// 1-based beat column of a rhythm note.
///
/// A note naming a chord sits on that chord's column. Otherwise its `beat`
/// (or its position in the list) counts chord beats, skipping rests.
pub fn note_column(note: &RhythmNote, note_index: usize, chord_beats: &[String]) -> Option<usize> {
    if let Some(chord) = note.chord.as_deref() {
        if let Some(found) = chord_beats.iter().position(|c| c == chord) {
            return Some(found + 1);
        }
    }

    let explicit = note
        .beat
        .as_deref()
        .and_then(|b| b.trim().parse::<usize>().ok())
        .filter(|b| *b > 0)
        .unwrap_or(note_index + 1);

    chord_beats
        .iter()
        .enumerate()
        .filter(|(_, beat)| !NON_CHORD_BEATS.contains(&beat.as_str()))
        .nth(explicit - 1)
        .map(|(column, _)| column + 1)
}

/// Columns covered by a tie starting at 1-based `column`.
///
/// Within the bar the arc reaches the next real chord; with no chord after
/// it the arc crosses into the next bar: remaining columns plus one.
pub fn tie_span(column: usize, chord_beats: &[String], num_beats: usize) -> TieSpan {
    let next = chord_beats
        .iter()
        .enumerate()
        .skip(column)
        .find(|(_, beat)| {
            let beat = beat.as_str();
            beat != "." && beat != "/" && !NON_CHORD_BEATS.contains(&beat)
        })
        .map(|(j, _)| j + 1);

    match next {
        Some(next) => TieSpan {
            columns: next - column,
            cross_bar: false,
        },
        None => TieSpan {
            columns: num_beats.saturating_sub(column) + 1,
            cross_bar: true,
        },
    }
}

/// Apply a transform to every chord beat of laid-out lines.
pub fn map_chords(lines: &mut [GridLine], mut transform: impl FnMut(&str) -> String) {
    for line in lines.iter_mut() {
        for bar in line.bars.iter_mut() {
            for beat in bar.beats.iter_mut() {
                if let Some(chord) = beat.chord.as_mut() {
                    *chord = transform(chord);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(chord: &str) -> ChordGridBar {
        ChordGridBar {
            chord: chord.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_array_and_object_forms() {
        let bars = parse_grid(r#"[{"id":1,"chord":"C"},{"chord":"G"}]"#).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].id.as_deref(), Some("1"));

        let bars = parse_grid(r#"{"bars":[{"chord":"Am","ending":{"type":2,"isStart":true}}]}"#).unwrap();
        assert_eq!(bars[0].ending.as_ref().unwrap().kind.as_deref(), Some("2"));

        assert!(parse_grid("not json").is_err());
        assert!(parse_grid(r#"{"title":"x"}"#).is_err());
    }

    #[test]
    fn test_auxiliary_beat_fields() {
        let b = ChordGridBar {
            chord: "C".to_string(),
            rest_type: Some("QR".to_string()),
            chord_after: Some("F G".to_string()),
            trailing_rest_type: Some("ER".to_string()),
            chord_end: Some("Am".to_string()),
            ..Default::default()
        };
        assert_eq!(b.chord_beats(), vec!["C", "QR", "F", "G", "ER", "Am"]);
    }

    #[test]
    fn test_repeat_markers_become_bar_lines() {
        let lines = layout(&[bar("|: C . . ."), bar("G . . . :||"), bar("Am")], 4);
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line.bar_lines[0], BarLine::RepeatStart);
        assert_eq!(line.bar_lines[2], BarLine::RepeatEnd);
        assert_eq!(line.bar_lines[3], BarLine::Single);
        assert_eq!(line.bars[0].beats[0].chord.as_deref(), Some("C"));
        assert_eq!(line.bars[2].beats.len(), 1);
        assert!(line.is_partial);

        let (start, chord, end) = lift_repeat_markers("/:. Am . F . ://");
        assert_eq!(start, Some(BarLine::RepeatStart));
        assert_eq!(chord, "Am . F .");
        assert_eq!(end, Some(BarLine::RepeatEnd));
    }

    #[test]
    fn test_lines_of_four() {
        let bars: Vec<ChordGridBar> = ["C", "F", "G", "C", "Am", "F"].iter().map(|c| bar(c)).collect();
        let lines = layout(&bars, DEFAULT_BARS_PER_LINE);
        assert_eq!(lines.len(), 2);
        assert!(!lines[0].is_partial);
        assert_eq!(lines[1].bars.len(), 2);
        assert!(lines[1].is_partial);
    }

    #[test]
    fn test_single_non_empty_bar_collapses() {
        let lines = layout(&[bar(""), bar("D"), bar("  ")], 4);
        assert_eq!(lines[0].bars.len(), 1);
        assert_eq!(lines[0].bars[0].beats[0].chord.as_deref(), Some("D"));
    }

    #[test]
    fn test_simile_bar() {
        let lines = layout(&[bar("C"), bar("%")], 4);
        assert_eq!(lines[0].bars[1].simile.as_deref(), Some("%"));
        assert!(lines[0].bars[1].beats.is_empty());
    }

    #[test]
    fn test_melody_widens_bar() {
        let mut b = bar("C G");
        b.melody = Some(Melody {
            not_angka: Some("1 2 3 4".to_string()),
        });
        let lines = layout(&[b], 4);
        assert!(lines[0].has_melody);
        let beats = &lines[0].bars[0].beats;
        assert_eq!(beats.len(), 4);
        assert_eq!(beats[3].chord, None);
        assert_eq!(beats[3].melody.as_deref(), Some("4"));
    }

    #[test]
    fn test_ending_labels() {
        assert_eq!(ordinal_suffix("1"), "st");
        assert_eq!(ordinal_suffix("2"), "nd");
        assert_eq!(ordinal_suffix("3"), "rd");
        assert_eq!(ordinal_suffix("4"), "th");
        assert_eq!(ordinal_suffix("11"), "th");
        assert_eq!(ordinal_suffix("22"), "nd");
        assert_eq!(ordinal_suffix("x"), "");

        let mut first = bar("C");
        first.ending = Some(Ending { kind: Some("1".to_string()), is_start: true, is_end: false });
        let mut cont = bar("G");
        cont.ending = Some(Ending { kind: Some("1".to_string()), is_start: false, is_end: true });
        let lines = layout(&[first, cont], 4);
        assert!(lines[0].has_endings);
        let e0 = lines[0].bars[0].ending.as_ref().unwrap();
        assert_eq!(e0.label.as_deref(), Some("1st ending"));
        assert_eq!(lines[0].bars[1].ending.as_ref().unwrap().label, None);
    }

    #[test]
    fn test_signs_collected() {
        let mut b = bar("C");
        b.musical_signs = Some(MusicalSigns { segno: true, ds_al_coda: true, ..Default::default() });
        let lines = layout(&[b], 4);
        assert!(lines[0].has_signs);
        assert_eq!(lines[0].bars[0].signs, vec![MusicalSign::Segno, MusicalSign::DsAlCoda]);
    }

    #[test]
    fn test_note_column_by_chord_and_beat() {
        let beats: Vec<String> = ["QR", "C", ".", "G"].iter().map(|s| s.to_string()).collect();
        let by_chord = RhythmNote {
            note_type: NoteType::Quarter,
            beat: None,
            chord: Some("G".to_string()),
            tied: false,
            dotted: false,
            tie_to: None,
        };
        assert_eq!(note_column(&by_chord, 0, &beats), Some(4));

        // beat counts chord columns only, skipping the leading rest
        let by_beat = RhythmNote { chord: None, beat: Some("1".to_string()), ..by_chord.clone() };
        assert_eq!(note_column(&by_beat, 5, &beats), Some(2));

        let implicit = RhythmNote { chord: None, beat: None, ..by_chord };
        assert_eq!(note_column(&implicit, 0, &beats), Some(2));
    }

    #[test]
    fn test_tie_within_bar() {
        let beats: Vec<String> = ["C", ".", "G", "."].iter().map(|s| s.to_string()).collect();
        assert_eq!(tie_span(1, &beats, 4), TieSpan { columns: 2, cross_bar: false });
    }

    #[test]
    fn test_tie_crosses_bar_boundary() {
        let beats: Vec<String> = ["C", ".", "G", "."].iter().map(|s| s.to_string()).collect();
        // from beat 3 nothing follows: one remaining column plus one into the next bar
        assert_eq!(tie_span(3, &beats, 4), TieSpan { columns: 2, cross_bar: true });
        assert_eq!(tie_span(4, &beats, 4), TieSpan { columns: 1, cross_bar: true });
    }

    #[test]
    fn test_tied_note_placed() {
        let payload = r#"[{"chord":"C . . G","notes":[{"type":"half","beat":"1","tied":true,"dotted":true},{"type":"quarter","chord":"G"}]}]"#;
        let bars = parse_grid(payload).unwrap();
        let lines = layout(&bars, 4);
        let beats = &lines[0].bars[0].beats;
        let note = &beats[0].notes[0];
        assert_eq!(note.note_type, NoteType::Half);
        assert!(note.dotted);
        assert_eq!(note.tie, Some(TieSpan { columns: 3, cross_bar: false }));
        assert_eq!(beats[3].notes[0].tie, None);
    }

    #[test]
    fn test_map_chords() {
        let mut lines = layout(&[bar("C/E G")], 4);
        map_chords(&mut lines, |c| c.to_lowercase());
        assert_eq!(lines[0].bars[0].beats[0].chord.as_deref(), Some("c/e"));
    }
}
