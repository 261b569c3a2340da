//! Plain-text output of a display model, for terminals and logs.

use crate::chord_grid::{BarLine, GridLine};

use super::{DisplayBody, DisplayModel};

/// Width of each bar on a partial grid line.
const FIXED_BAR_WIDTH: usize = 16;
/// Width a full grid line is stretched to.
const LINE_WIDTH: usize = 72;
/// Bar-line symbols are padded to this width.
const BAR_LINE_WIDTH: usize = 3;

pub fn to_text(model: &DisplayModel) -> String {
    let mut out = Vec::new();
    if let Some(title) = &model.title {
        out.push(title.clone());
        out.push("=".repeat(title.chars().count()));
    }
    if let Some(notice) = &model.notice {
        out.push(notice.clone());
    }

    let mark_current = model.sections.len() > 1;
    for (i, section) in model.sections.iter().enumerate() {
        if i > 0 {
            out.push(String::new());
        }
        let marker = if mark_current && section.is_current { "> " } else { "" };
        out.push(format!("{}[{}]", marker, section.header()));
        match &section.body {
            DisplayBody::Text(lines) => out.extend(lines.iter().map(|l| l.text())),
            DisplayBody::Grid { lines, .. } => out.push(grid_to_text(lines)),
            DisplayBody::Placeholder(name) => out.push(format!("({})", name)),
        }
    }
    out.join("\n")
}

/// Draw grid lines as text rows: signs, endings, rhythm, chords, melody.
pub fn grid_to_text(lines: &[GridLine]) -> String {
    lines.iter().map(draw_line).collect::<Vec<_>>().join("\n")
}

struct Canvas {
    rows: Vec<Vec<char>>,
}

impl Canvas {
    fn new(rows: usize) -> Self {
        Self {
            rows: vec![Vec::new(); rows],
        }
    }

    fn put(&mut self, row: usize, x: usize, text: &str) {
        let row = &mut self.rows[row];
        for (i, c) in text.chars().enumerate() {
            let at = x + i;
            if row.len() <= at {
                row.resize(at + 1, ' ');
            }
            row[at] = c;
        }
    }

    fn fill(&mut self, row: usize, from: usize, to: usize, c: char) {
        for x in from..to {
            self.put(row, x, &c.to_string());
        }
    }
}

const SIGNS: usize = 0;
const ENDINGS: usize = 1;
const RHYTHM: usize = 2;
const CHORDS: usize = 3;
const MELODY: usize = 4;

fn bar_width(line: &GridLine) -> usize {
    let needed = line
        .bars
        .iter()
        .map(|bar| {
            let widest = bar
                .beats
                .iter()
                .map(|b| b.chord.as_deref().unwrap_or("").chars().count().max(
                    b.melody.as_deref().unwrap_or("").chars().count(),
                ))
                .max()
                .unwrap_or(1);
            (widest + 1) * bar.beats.len().max(1)
        })
        .max()
        .unwrap_or(FIXED_BAR_WIDTH);

    if line.is_partial {
        needed.max(FIXED_BAR_WIDTH)
    } else {
        let share = ((LINE_WIDTH - BAR_LINE_WIDTH) / line.bars.len().max(1)).saturating_sub(BAR_LINE_WIDTH);
        needed.max(share)
    }
}

fn draw_line(line: &GridLine) -> String {
    let width = bar_width(line);
    let mut canvas = Canvas::new(5);
    let mut x = 0;

    for (index, bar) in line.bars.iter().enumerate() {
        canvas.put(CHORDS, x, line.bar_lines[index].symbol());
        let start = x + BAR_LINE_WIDTH;

        if line.has_signs {
            let labels: Vec<&str> = bar.signs.iter().map(|s| s.label()).collect();
            canvas.put(SIGNS, start, &labels.join(" "));
        }

        if let Some(ending) = &bar.ending {
            canvas.fill(ENDINGS, start, start + width, '─');
            if ending.is_start {
                canvas.put(ENDINGS, start, "┌");
            }
            if let Some(label) = &ending.label {
                canvas.put(ENDINGS, start + 1, label);
            }
            if ending.is_end {
                canvas.put(ENDINGS, start + width - 1, "┐");
            }
        }

        if let Some(simile) = &bar.simile {
            canvas.put(CHORDS, start + width / 2, simile);
        } else {
            let beat_width = width / bar.beats.len().max(1);
            for (b, beat) in bar.beats.iter().enumerate() {
                let bx = start + b * beat_width;
                if let Some(chord) = &beat.chord {
                    canvas.put(CHORDS, bx, chord);
                }
                if let Some(melody) = &beat.melody {
                    canvas.put(MELODY, bx, melody);
                }
                for note in &beat.notes {
                    let symbol = format!("{}{}", note.note_type.symbol(), if note.dotted { "." } else { "" });
                    let used = symbol.chars().count();
                    if let Some(tie) = note.tie {
                        let mut reach = tie.columns * beat_width;
                        if tie.cross_bar {
                            reach += BAR_LINE_WIDTH;
                        }
                        canvas.fill(RHYTHM, bx + used, bx + reach.max(used), '‿');
                    }
                    canvas.put(RHYTHM, bx, &symbol);
                }
            }
        }
        x = start + width;
    }
    let closing = line.bar_lines.last().copied().unwrap_or(BarLine::Single);
    canvas.put(CHORDS, x, closing.symbol());

    let mut rows = Vec::new();
    for (row, include) in [
        (SIGNS, line.has_signs),
        (ENDINGS, line.has_endings),
        (RHYTHM, !canvas.rows[RHYTHM].is_empty()),
        (CHORDS, true),
        (MELODY, line.has_melody),
    ] {
        if include {
            let text: String = canvas.rows[row].iter().collect();
            rows.push(text.trim_end().to_string());
        }
    }
    rows.join("\n")
}
