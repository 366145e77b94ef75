//! # Musical Primitives (C6)
//!
//! Exact rational arithmetic, pitch parsing/transposition, and
//! duration-to-tick conversion. Kept separate from the evaluator so the
//! arithmetic can be unit-tested without any scope/AST machinery.

use crate::error::{MfsError, Position};
use num_rational::Ratio;

/// Exact musical time as a reduced fraction. A thin wrapper over
/// `Ratio<i64>` so call sites read in domain terms (`Rat::new(1, 4)`)
/// rather than the generic `num_rational` API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Rat(Ratio<i64>);

impl Rat {
    pub fn new(n: i64, d: i64, position: Position) -> Result<Self, MfsError> {
        if d == 0 {
            return Err(MfsError::NumericError {
                message: "rational with zero denominator".to_string(),
                position,
            });
        }
        Ok(Rat(Ratio::new(n, d)))
    }

    pub fn numer(&self) -> i64 {
        *self.0.numer()
    }

    pub fn denom(&self) -> i64 {
        *self.0.denom()
    }

    pub fn add(&self, other: &Rat, position: Position) -> Result<Rat, MfsError> {
        self.0
            .checked_add(&other.0)
            .map(Rat)
            .ok_or_else(|| MfsError::NumericError {
                message: "rational addition overflowed".to_string(),
                position,
            })
    }

    pub fn mul(&self, other: &Rat, position: Position) -> Result<Rat, MfsError> {
        self.0
            .checked_mul(&other.0)
            .map(Rat)
            .ok_or_else(|| MfsError::NumericError {
                message: "rational multiplication overflowed".to_string(),
                position,
            })
    }

    pub fn to_f64(&self) -> f64 {
        *self.0.numer() as f64 / *self.0.denom() as f64
    }
}

/// `{ midi, cents }`. `midi` follows the MIDI convention: C-1 = 0, middle C
/// (C4) = 60. `cents` is a fine-tuning offset that survives transposition
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Pitch {
    pub midi: i32,
    pub cents: i32,
}

impl Pitch {
    pub fn transpose(&self, semitones: i32) -> Pitch {
        Pitch {
            midi: self.midi + semitones,
            cents: self.cents,
        }
    }

    /// Parse a lexeme matching `^[A-G][#b]?-?\d+(?:[+-]\d+c)?$`.
    pub fn parse(raw: &str, position: Position) -> Result<Pitch, MfsError> {
        let bytes = raw.as_bytes();
        let bad = || MfsError::TypeError {
            expected: "pitch literal".to_string(),
            got: raw.to_string(),
            position,
        };
        if bytes.is_empty() {
            return Err(bad());
        }
        let letter = bytes[0] as char;
        let base = match letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(bad()),
        };
        let mut i = 1;
        let mut accidental = 0i32;
        if let Some(&b) = bytes.get(i) {
            match b as char {
                '#' => {
                    accidental = 1;
                    i += 1;
                }
                'b' => {
                    accidental = -1;
                    i += 1;
                }
                _ => {}
            }
        }
        let mut sign = 1i32;
        if bytes.get(i) == Some(&b'-') {
            sign = -1;
            i += 1;
        }
        let octave_start = i;
        while bytes.get(i).is_some_and(|b| b.is_ascii_digit()) {
            i += 1;
        }
        if i == octave_start {
            return Err(bad());
        }
        let octave: i32 = raw[octave_start..i].parse().map_err(|_| bad())?;
        let octave = sign * octave;

        let mut cents = 0i32;
        if i < bytes.len() {
            let cent_sign = match bytes[i] as char {
                '+' => 1,
                '-' => -1,
                _ => return Err(bad()),
            };
            i += 1;
            let digits_start = i;
            while bytes.get(i).is_some_and(|b| b.is_ascii_digit()) {
                i += 1;
            }
            if i == digits_start || bytes.get(i) != Some(&b'c') {
                return Err(bad());
            }
            let value: i32 = raw[digits_start..i].parse().map_err(|_| bad())?;
            cents = cent_sign * value;
            i += 1;
        }
        if i != bytes.len() {
            return Err(bad());
        }

        // midi 60 = C4, so octave offset is (octave + 1) * 12.
        let midi = (octave + 1) * 12 + base + accidental;
        Ok(Pitch { midi, cents })
    }
}

/// Default pulses-per-quarter-note resolution of the emitted IR.
pub const DEFAULT_PPQ: i64 = 480;

/// A parsed duration literal: base symbol, dot count, optional tuplet `N`,
/// and the trailing tie flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationSpec {
    pub base: DurationBase,
    pub dots: u32,
    pub tuplet: Option<u32>,
    pub tie: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationBase {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
    SixtyFourth,
}

impl DurationBase {
    /// Fraction of a whole note this base symbol represents.
    fn fraction(self) -> (i64, i64) {
        match self {
            DurationBase::Whole => (1, 1),
            DurationBase::Half => (1, 2),
            DurationBase::Quarter => (1, 4),
            DurationBase::Eighth => (1, 8),
            DurationBase::Sixteenth => (1, 16),
            DurationBase::ThirtySecond => (1, 32),
            DurationBase::SixtyFourth => (1, 64),
        }
    }
}

impl DurationSpec {
    /// Parse a lexeme matching `^(?:w|h|q|e|s|32|64)\.*(?:t\d+)?~?$`.
    pub fn parse(raw: &str, position: Position) -> Result<DurationSpec, MfsError> {
        let bad = || MfsError::TypeError {
            expected: "duration literal".to_string(),
            got: raw.to_string(),
            position,
        };
        let tie = raw.ends_with('~');
        let without_tie = raw.strip_suffix('~').unwrap_or(raw);

        let (base, rest) = if let Some(rest) = without_tie.strip_prefix("32") {
            (DurationBase::ThirtySecond, rest)
        } else if let Some(rest) = without_tie.strip_prefix("64") {
            (DurationBase::SixtyFourth, rest)
        } else {
            let mut chars = without_tie.chars();
            let base = match chars.next() {
                Some('w') => DurationBase::Whole,
                Some('h') => DurationBase::Half,
                Some('q') => DurationBase::Quarter,
                Some('e') => DurationBase::Eighth,
                Some('s') => DurationBase::Sixteenth,
                _ => return Err(bad()),
            };
            (base, chars.as_str())
        };

        let mut dots = 0u32;
        let mut rest = rest;
        while let Some(stripped) = rest.strip_prefix('.') {
            dots += 1;
            rest = stripped;
        }

        let tuplet = if let Some(stripped) = rest.strip_prefix('t') {
            let n: u32 = stripped.parse().map_err(|_| bad())?;
            rest = "";
            Some(n)
        } else {
            None
        };
        if !rest.is_empty() {
            return Err(bad());
        }

        Ok(DurationSpec {
            base,
            dots,
            tuplet,
            tie,
        })
    }

    /// `ticks(D) = PPQ * 4 * numerator(D) / denominator(D)`, with dot and
    /// tuplet multipliers applied before rounding. Non-integer results round
    /// to nearest and the caller should emit a `TimingApproximation`
    /// warning.
    pub fn to_ticks(&self, ppq: i64, position: Position) -> Result<(i64, bool), MfsError> {
        let (n, d) = self.base.fraction();
        let mut num = ppq.checked_mul(4).and_then(|v| v.checked_mul(n)).ok_or_else(|| {
            MfsError::NumericError {
                message: "duration tick numerator overflowed".to_string(),
                position,
            }
        })?;
        let mut den = d;

        // Dotted rhythm: multiply by (2 - 1/2^n) = (2^(n+1) - 1) / 2^n.
        if self.dots > 0 {
            let pow: i64 = 1i64
                .checked_shl(self.dots)
                .ok_or_else(|| MfsError::NumericError {
                    message: "dot count overflowed".to_string(),
                    position,
                })?;
            let dot_num = pow
                .checked_mul(2)
                .and_then(|v| v.checked_sub(1))
                .ok_or_else(|| MfsError::NumericError {
                    message: "dot multiplier overflowed".to_string(),
                    position,
                })?;
            num = num.checked_mul(dot_num).ok_or_else(|| MfsError::NumericError {
                message: "duration numerator overflowed applying dots".to_string(),
                position,
            })?;
            den = den.checked_mul(pow).ok_or_else(|| MfsError::NumericError {
                message: "duration denominator overflowed applying dots".to_string(),
                position,
            })?;
        }

        // Tuplet tN multiplies by 2/N.
        if let Some(n_tuplet) = self.tuplet {
            if n_tuplet == 0 {
                return Err(MfsError::NumericError {
                    message: "tuplet divisor cannot be zero".to_string(),
                    position,
                });
            }
            num = num.checked_mul(2).ok_or_else(|| MfsError::NumericError {
                message: "duration numerator overflowed applying tuplet".to_string(),
                position,
            })?;
            den = den
                .checked_mul(n_tuplet as i64)
                .ok_or_else(|| MfsError::NumericError {
                    message: "duration denominator overflowed applying tuplet".to_string(),
                    position,
                })?;
        }

        if den == 0 {
            return Err(MfsError::NumericError {
                message: "duration denominator was zero".to_string(),
                position,
            });
        }

        let ticks = num / den;
        let remainder = num % den;
        let approximated = remainder != 0;
        let rounded = if approximated && remainder * 2 >= den {
            ticks + 1
        } else {
            ticks
        };
        if rounded <= 0 {
            return Err(MfsError::NumericError {
                message: "duration resolved to a non-positive tick count".to_string(),
                position,
            });
        }
        Ok((rounded, approximated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Position {
        Position::start()
    }

    #[test]
    fn pitch_middle_c() {
        let p = Pitch::parse("C4", pos()).unwrap();
        assert_eq!(p.midi, 60);
        assert_eq!(p.cents, 0);
    }

    #[test]
    fn pitch_with_sharp_and_cents() {
        let p = Pitch::parse("F#3+15c", pos()).unwrap();
        assert_eq!(p.midi, 54);
        assert_eq!(p.cents, 15);
    }

    #[test]
    fn pitch_flat() {
        let p = Pitch::parse("Bb5", pos()).unwrap();
        assert_eq!(p.midi, 82);
    }

    #[test]
    fn transpose_round_trip() {
        let p = Pitch::parse("D5", pos()).unwrap();
        let transposed = p.transpose(7).transpose(-7);
        assert_eq!(transposed, p);
    }

    #[test]
    fn quarter_note_is_ppq_ticks() {
        let d = DurationSpec::parse("q", pos()).unwrap();
        let (ticks, approx) = d.to_ticks(DEFAULT_PPQ, pos()).unwrap();
        assert_eq!(ticks, 480);
        assert!(!approx);
    }

    #[test]
    fn dotted_half_note() {
        let d = DurationSpec::parse("h.", pos()).unwrap();
        let (ticks, _) = d.to_ticks(DEFAULT_PPQ, pos()).unwrap();
        assert_eq!(ticks, 1440); // half=960, dotted = 960 * 1.5
    }

    #[test]
    fn tied_eighth_flag() {
        let d = DurationSpec::parse("e~", pos()).unwrap();
        assert!(d.tie);
    }

    #[test]
    fn triplet_eighth_approximates() {
        let d = DurationSpec::parse("et3", pos()).unwrap();
        let (ticks, approx) = d.to_ticks(DEFAULT_PPQ, pos()).unwrap();
        // eighth = 240 ticks, triplet multiplies by 2/3 -> 160 exactly.
        assert_eq!(ticks, 160);
        assert!(!approx);
    }

    #[test]
    fn quintuplet_sixteenth_rounds() {
        let d = DurationSpec::parse("st5", pos()).unwrap();
        let (ticks, approx) = d.to_ticks(DEFAULT_PPQ, pos()).unwrap();
        // sixteenth = 120 ticks, quintuplet multiplies by 2/5 -> 48 exactly.
        assert_eq!(ticks, 48);
        assert!(!approx);
    }

    #[test]
    fn rat_add_reduces() {
        let a = Rat::new(1, 4, pos()).unwrap();
        let b = Rat::new(1, 4, pos()).unwrap();
        let sum = a.add(&b, pos()).unwrap();
        assert_eq!(sum.numer(), 1);
        assert_eq!(sum.denom(), 2);
    }
}
