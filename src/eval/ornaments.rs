//! Ornament expansion (trill, mordent, arpeggio, glissando, tremolo).
//!
//! Ornament calls are cursor-coupled: each one consumes a `duration`
//! argument and advances the track cursor by exactly that many ticks,
//! regardless of how many sub-events it emits. That makes them a special
//! case of `Element::Call` handled directly here rather than generic
//! value-returning native functions.

use super::TrackState;
use crate::error::{MfsError, Position};
use crate::music::{DurationSpec, Pitch, DEFAULT_PPQ};
use crate::value::Value;

/// The five reserved ornament names. Anything else reaching `Element::Call`
/// is not an ornament and is rejected by the caller.
pub const ORNAMENT_NAMES: [&str; 5] = ["trill", "mordent", "arpeggio", "glissando", "tremolo"];

pub fn is_ornament(name: &str) -> bool {
    ORNAMENT_NAMES.contains(&name)
}

fn duration_ticks(args: &[Value], index: usize, ppq: i64, position: Position) -> Result<i64, MfsError> {
    let raw = args
        .get(index)
        .ok_or_else(|| MfsError::TypeError {
            expected: "duration argument".to_string(),
            got: "missing".to_string(),
            position,
        })?;
    match raw {
        Value::Duration(d) => d.to_ticks(ppq, position).map(|(t, _)| t),
        other => Err(MfsError::TypeError {
            expected: "duration".to_string(),
            got: other.kind_name().to_string(),
            position,
        }),
    }
}

fn int_arg(args: &[Value], index: usize, default: i64, position: Position) -> Result<i64, MfsError> {
    match args.get(index) {
        Some(v) => v.as_int(position),
        None => Ok(default),
    }
}

fn bool_arg(args: &[Value], index: usize, default: bool) -> bool {
    match args.get(index) {
        Some(Value::Bool(b)) => *b,
        _ => default,
    }
}

/// Expand `name(args)` against `track`, starting at the track's current
/// cursor. Returns `Ok(None)` if `name` is not an ornament; otherwise `Ok`
/// wraps the number of ticks the cursor advanced.
pub fn expand(
    name: &str,
    args: &[Value],
    position: Position,
    ppq: i64,
    track: &mut TrackState,
) -> Result<Option<()>, MfsError> {
    match name {
        "trill" => trill(args, position, ppq, track).map(Some),
        "mordent" => mordent(args, position, ppq, track).map(Some),
        "arpeggio" => arpeggio(args, position, ppq, track).map(Some),
        "glissando" => glissando(args, position, ppq, track).map(Some),
        "tremolo" => tremolo(args, position, ppq, track).map(Some),
        _ => Ok(None),
    }
}

fn trill(args: &[Value], position: Position, ppq: i64, track: &mut TrackState) -> Result<(), MfsError> {
    let pitch = args
        .first()
        .ok_or_else(|| missing("pitch", position))?
        .as_pitch(position)?;
    let total = duration_ticks(args, 1, ppq, position)?;
    let interval = int_arg(args, 2, 2, position)? as i32;

    let sub_dur = ppq / 8;
    let sub_dur = sub_dur.max(1);
    let start = track.cursor;
    let mut offset = 0i64;
    let mut toggle = false;
    while offset < total {
        let remaining = total - offset;
        let dur = sub_dur.min(remaining);
        let p = if toggle { pitch.transpose(interval) } else { pitch };
        track.emit_note(start + offset, dur, p, None, position)?;
        offset += dur;
        toggle = !toggle;
    }
    track.cursor = start + total;
    Ok(())
}

fn mordent(args: &[Value], position: Position, ppq: i64, track: &mut TrackState) -> Result<(), MfsError> {
    let _ = ppq;
    let pitch = args
        .first()
        .ok_or_else(|| missing("pitch", position))?
        .as_pitch(position)?;
    let total = duration_ticks(args, 1, ppq, position)?;
    let upper = bool_arg(args, 2, true);
    let aux = pitch.transpose(if upper { 2 } else { -2 });

    let start = track.cursor;
    let sub_dur = (total / 4).max(1);
    let main_dur = sub_dur;
    let aux_dur = sub_dur;
    let last_dur = (total - main_dur - aux_dur).max(1);

    track.emit_note(start, main_dur, pitch, None, position)?;
    track.emit_note(start + main_dur, aux_dur, aux, None, position)?;
    track.emit_note(start + main_dur + aux_dur, last_dur, pitch, None, position)?;
    track.cursor = start + total;
    Ok(())
}

fn arpeggio(args: &[Value], position: Position, ppq: i64, track: &mut TrackState) -> Result<(), MfsError> {
    let pitches_value = args.first().ok_or_else(|| missing("pitches", position))?;
    let pitches: Vec<Pitch> = pitches_value
        .as_array(position)?
        .iter()
        .map(|v| v.as_pitch(position))
        .collect::<Result<_, _>>()?;
    let total = duration_ticks(args, 1, ppq, position)?;
    let spread = int_arg(args, 2, ppq / 8, position)?.max(1);

    let start = track.cursor;
    for (i, pitch) in pitches.iter().enumerate() {
        let onset = i as i64 * spread;
        let remaining = total - onset;
        if remaining <= 0 {
            continue;
        }
        track.emit_note(start + onset, remaining, *pitch, None, position)?;
    }
    track.cursor = start + total;
    Ok(())
}

fn glissando(args: &[Value], position: Position, ppq: i64, track: &mut TrackState) -> Result<(), MfsError> {
    let start_pitch = args
        .first()
        .ok_or_else(|| missing("startPitch", position))?
        .as_pitch(position)?;
    let end_pitch = args
        .get(1)
        .ok_or_else(|| missing("endPitch", position))?
        .as_pitch(position)?;
    let total = duration_ticks(args, 2, ppq, position)?;

    let span = (end_pitch.midi - start_pitch.midi).abs();
    let steps = (span + 1).max(1);
    let sub_dur = (total / steps as i64).max(1);
    let direction = if end_pitch.midi >= start_pitch.midi { 1 } else { -1 };

    let start_tick = track.cursor;
    for i in 0..steps {
        let onset = i as i64 * sub_dur;
        if onset >= total {
            break;
        }
        let dur = if i == steps - 1 { total - onset } else { sub_dur };
        let pitch = start_pitch.transpose(direction * i as i32);
        track.emit_note(start_tick + onset, dur, pitch, None, position)?;
    }
    track.cursor = start_tick + total;
    Ok(())
}

fn tremolo(args: &[Value], position: Position, ppq: i64, track: &mut TrackState) -> Result<(), MfsError> {
    let pitch = args
        .first()
        .ok_or_else(|| missing("pitch", position))?
        .as_pitch(position)?;
    let total = duration_ticks(args, 1, ppq, position)?;
    let speed = int_arg(args, 2, 4, position)?.max(1);

    let sub_dur = (4 * ppq / speed).max(1);
    let start = track.cursor;
    let mut offset = 0i64;
    while offset < total {
        let remaining = total - offset;
        let dur = sub_dur.min(remaining);
        track.emit_note(start + offset, dur, pitch, None, position)?;
        offset += dur;
    }
    track.cursor = start + total;
    Ok(())
}

fn missing(what: &str, position: Position) -> MfsError {
    MfsError::TypeError {
        expected: what.to_string(),
        got: "missing".to_string(),
        position,
    }
}

/// Parse a `DurationLit` AST node into a runtime `Value::Duration`. Small
/// helper shared by the evaluator when it builds ornament call arguments.
pub fn duration_literal_value(raw: &str, position: Position) -> Result<Value, MfsError> {
    DurationSpec::parse(raw, position).map(Value::Duration)
}

pub const DEFAULT_TRILL_SUBDIVISION: i64 = DEFAULT_PPQ / 8;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::TrackState;
    use crate::ir::TrackKind;

    fn pos() -> Position {
        Position::start()
    }

    fn track() -> TrackState {
        TrackState::new("t".to_string(), TrackKind::Midi, "t".to_string())
    }

    #[test]
    fn trill_advances_cursor_by_full_duration() {
        let mut t = track();
        let pitch = Pitch::parse("C4", pos()).unwrap();
        let args = vec![Value::Pitch(pitch), Value::Duration(DurationSpec::parse("q", pos()).unwrap())];
        trill(&args, pos(), DEFAULT_PPQ, &mut t).unwrap();
        assert_eq!(t.cursor, 480);
        assert!(t.events.len() >= 2);
    }

    #[test]
    fn mordent_emits_three_notes() {
        let mut t = track();
        let pitch = Pitch::parse("C4", pos()).unwrap();
        let args = vec![Value::Pitch(pitch), Value::Duration(DurationSpec::parse("q", pos()).unwrap())];
        mordent(&args, pos(), DEFAULT_PPQ, &mut t).unwrap();
        assert_eq!(t.events.len(), 3);
        assert_eq!(t.cursor, 480);
    }

    #[test]
    fn arpeggio_drops_pitches_with_no_remaining_duration() {
        let mut t = track();
        let pitches = vec![
            Value::Pitch(Pitch::parse("C4", pos()).unwrap()),
            Value::Pitch(Pitch::parse("E4", pos()).unwrap()),
            Value::Pitch(Pitch::parse("G4", pos()).unwrap()),
        ];
        let args = vec![
            Value::Array(pitches),
            Value::Duration(DurationSpec::parse("q", pos()).unwrap()),
            Value::Int(200),
        ];
        arpeggio(&args, pos(), DEFAULT_PPQ, &mut t).unwrap();
        assert_eq!(t.cursor, 480);
        assert!(t.events.len() <= 3);
    }

    #[test]
    fn glissando_spans_start_to_end_inclusive() {
        let mut t = track();
        let args = vec![
            Value::Pitch(Pitch::parse("C4", pos()).unwrap()),
            Value::Pitch(Pitch::parse("E4", pos()).unwrap()),
            Value::Duration(DurationSpec::parse("q", pos()).unwrap()),
        ];
        glissando(&args, pos(), DEFAULT_PPQ, &mut t).unwrap();
        assert_eq!(t.events.len(), 5); // C4, C#4, D4, D#4, E4
        assert_eq!(t.cursor, 480);
    }

    #[test]
    fn tremolo_truncates_last_note() {
        let mut t = track();
        let args = vec![
            Value::Pitch(Pitch::parse("C4", pos()).unwrap()),
            Value::Duration(DurationSpec::parse("q", pos()).unwrap()),
            Value::Int(8),
        ];
        tremolo(&args, pos(), DEFAULT_PPQ, &mut t).unwrap();
        assert_eq!(t.cursor, 480);
    }
}
