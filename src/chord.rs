//! Chord symbol parsing
//!
//! Parses chord symbols (C, Am, G7, F#m7b5, Bb/D, C(add9), ...) into a root
//! pitch, a raw quality/extension suffix and an optional bass note. The suffix
//! is kept verbatim so that `parse(s).to_string() == s` for every accepted
//! symbol; only the pitches are ever rewritten.

use std::fmt;

/// Note letter plus accidental count (+1 per sharp, -1 per flat).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pitch {
    pub letter: char,
    pub accidental: i8,
}

impl Pitch {
    /// Parse a pitch prefix of `s`, returning the pitch and the bytes consumed.
    ///
    /// Accepts `#`, `##`, `b`, `bb` after an uppercase letter A-G.
    pub fn parse_prefix(s: &str) -> Option<(Pitch, usize)> {
        let mut chars = s.chars();
        let letter = chars.next()?;
        if !('A'..='G').contains(&letter) {
            return None;
        }
        let rest = &s[1..];
        let (accidental, len) = if rest.starts_with("##") {
            (2, 2)
        } else if rest.starts_with('#') {
            (1, 1)
        } else if rest.starts_with("bb") {
            (-2, 2)
        } else if rest.starts_with('b') {
            (-1, 1)
        } else {
            (0, 0)
        };
        Some((Pitch { letter, accidental }, 1 + len))
    }

    /// Parse a complete pitch such as "F#" or "Eb".
    pub fn parse(s: &str) -> Option<Pitch> {
        let (pitch, used) = Self::parse_prefix(s.trim())?;
        if used == s.trim().len() {
            Some(pitch)
        } else {
            None
        }
    }

    /// Semitone offset from C (0-11).
    pub fn semitone(&self) -> i8 {
        let base: i8 = match self.letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            _ => 11,
        };
        (base + self.accidental).rem_euclid(12)
    }

    /// Spell a semitone (taken mod 12) as a pitch.
    ///
    /// 0=C, 1=C#/Db, 2=D, 3=D#/Eb, 4=E, 5=F, 6=F#/Gb, 7=G, 8=G#/Ab, 9=A, 10=A#/Bb, 11=B
    pub fn from_semitone(semitone: i8, prefer_sharps: bool) -> Pitch {
        let (letter, accidental) = match semitone.rem_euclid(12) {
            0 => ('C', 0),
            1 => if prefer_sharps { ('C', 1) } else { ('D', -1) },
            2 => ('D', 0),
            3 => if prefer_sharps { ('D', 1) } else { ('E', -1) },
            4 => ('E', 0),
            5 => ('F', 0),
            6 => if prefer_sharps { ('F', 1) } else { ('G', -1) },
            7 => ('G', 0),
            8 => if prefer_sharps { ('G', 1) } else { ('A', -1) },
            9 => ('A', 0),
            10 => if prefer_sharps { ('A', 1) } else { ('B', -1) },
            _ => ('B', 0),
        };
        Pitch { letter, accidental }
    }

    pub fn transposed(&self, semitones: i8, prefer_sharps: bool) -> Pitch {
        Pitch::from_semitone(self.semitone() + semitones.rem_euclid(12), prefer_sharps)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter)?;
        let symbol = if self.accidental > 0 { "#" } else { "b" };
        for _ in 0..self.accidental.unsigned_abs() {
            write!(f, "{}", symbol)?;
        }
        Ok(())
    }
}

/// A parsed chord symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChordSymbol {
    pub root: Pitch,
    /// Quality and extensions exactly as written ("m7b5", "(add9)", "sus4").
    pub suffix: String,
    pub bass: Option<Pitch>,
}

/// Quality/extension words, longest first so "maj" wins over "ma" and "m".
const MODIFIERS: &[&str] = &[
    "maj", "min", "dim", "aug", "sus", "add", "alt", "dom", "ma", "M", "m", "-", "o", "°", "ø",
    "+", "Δ", "△", "b", "#",
];

impl ChordSymbol {
    /// Parse a chord token. Returns `None` for anything that is not a chord.
    ///
    /// # Examples
    /// ```
    /// use chordflow::chord::ChordSymbol;
    ///
    /// let chord = ChordSymbol::parse("F#m7/A").unwrap();
    /// assert_eq!(chord.root.to_string(), "F#");
    /// assert_eq!(chord.suffix, "m7");
    /// assert_eq!(chord.bass.unwrap().to_string(), "A");
    ///
    /// assert!(ChordSymbol::parse("Hello").is_none());
    /// assert_eq!(ChordSymbol::parse("C(add9)").unwrap().to_string(), "C(add9)");
    /// ```
    pub fn parse(token: &str) -> Option<ChordSymbol> {
        let (root, mut idx) = Pitch::parse_prefix(token)?;
        let suffix_start = idx;

        // Quality and extension words, digits, accidentals
        loop {
            let rest = &token[idx..];
            if rest.is_empty() || rest.starts_with('/') || rest.starts_with('(') {
                break;
            }
            let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
            if digits > 0 {
                idx += digits;
                continue;
            }
            match MODIFIERS.iter().find(|m| rest.starts_with(**m)) {
                Some(m) => idx += m.len(),
                None => return None,
            }
        }

        // Optional parenthetical such as (add9) or (b5,#9)
        if token[idx..].starts_with('(') {
            let close = token[idx..].find(')')?;
            let inner = &token[idx + 1..idx + close];
            if inner.chars().any(|c| c.is_whitespace() || c == '(') {
                return None;
            }
            idx += close + 1;
        }

        let mut suffix_end = idx;
        let mut bass = None;
        if let Some(after_slash) = token[idx..].strip_prefix('/') {
            if let Some(pitch) = Pitch::parse(after_slash) {
                bass = Some(pitch);
            } else if is_degree_bass(after_slash) {
                // "C/9" style: keep the degree as part of the written suffix
                suffix_end = token.len();
            } else {
                return None;
            }
        } else if idx != token.len() {
            return None;
        }

        Some(ChordSymbol {
            root,
            suffix: token[suffix_start..suffix_end].to_string(),
            bass,
        })
    }

    pub fn is_slash_chord(&self) -> bool {
        self.bass.is_some()
    }

    pub fn transposed(&self, semitones: i8, prefer_sharps: bool) -> ChordSymbol {
        ChordSymbol {
            root: self.root.transposed(semitones, prefer_sharps),
            suffix: self.suffix.clone(),
            bass: self.bass.map(|b| b.transposed(semitones, prefer_sharps)),
        }
    }
}

fn is_degree_bass(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit() || c == '#' || c == 'b')
        && s.chars().any(|c| c.is_ascii_digit())
}

impl fmt::Display for ChordSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.root, self.suffix)?;
        if let Some(bass) = &self.bass {
            write!(f, "/{}", bass)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chord_parsing() {
        let c = ChordSymbol::parse("C").unwrap();
        assert_eq!(c.root, Pitch { letter: 'C', accidental: 0 });
        assert_eq!(c.suffix, "");

        let bbm = ChordSymbol::parse("Bbm").unwrap();
        assert_eq!(bbm.root.to_string(), "Bb");
        assert_eq!(bbm.suffix, "m");

        let half_dim = ChordSymbol::parse("F#m7b5").unwrap();
        assert_eq!(half_dim.root.to_string(), "F#");
        assert_eq!(half_dim.suffix, "m7b5");

        let slash = ChordSymbol::parse("G/B").unwrap();
        assert_eq!(slash.bass.unwrap().to_string(), "B");
    }

    #[test]
    fn test_rejects_words() {
        for word in ["Amazing", "Grace", "Bless", "Hello", "the", "Go", "Dad"] {
            assert!(ChordSymbol::parse(word).is_none(), "{} parsed as chord", word);
        }
    }

    #[test]
    fn test_display_round_trips_written_form() {
        for token in ["C", "Dm7", "Ebmaj7", "Gsus4", "Cadd9", "C(add9)", "A7/C#", "C##", "Bm7-5", "C/9"] {
            assert_eq!(ChordSymbol::parse(token).unwrap().to_string(), token);
        }
    }

    #[test]
    fn test_semitones() {
        assert_eq!(Pitch::parse("C").unwrap().semitone(), 0);
        assert_eq!(Pitch::parse("Cb").unwrap().semitone(), 11);
        assert_eq!(Pitch::parse("B#").unwrap().semitone(), 0);
        assert_eq!(Pitch::parse("Ebb").unwrap().semitone(), 2);
        assert_eq!(Pitch::from_semitone(10, false).to_string(), "Bb");
        assert_eq!(Pitch::from_semitone(10, true).to_string(), "A#");
        assert_eq!(Pitch::from_semitone(-1, true).to_string(), "B");
    }
}
