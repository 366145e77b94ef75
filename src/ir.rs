//! # IR Builder & Diagnostics (C7)
//!
//! The `ScoreIr` types mirror the JSON shape in the external interface
//! exactly (`schemaVersion`, `ppq`, `tempos`, `timeSigs`, `tracks`). Building
//! one is a two-step process: the evaluator appends tempo/time-signature
//! entries and per-track events as it walks the AST, then
//! [`ScoreIrBuilder::finish`] sorts everything, fills in the required
//! defaults, and hands back `{ ir, diagnostics }`.

use crate::error::Diagnostic;
use crate::music::DEFAULT_PPQ;
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: &str = "0.1";
pub const DEFAULT_TEMPO_BPM: f64 = 120.0;
pub const DEFAULT_TIME_SIG: (u32, u32) = (4, 4);
/// `vel` defaults to 96 when a note omits it.
pub const DEFAULT_VELOCITY: u8 = 96;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoEntry {
    pub tick: i64,
    pub bpm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSigEntry {
    pub tick: i64,
    pub numerator: u32,
    pub denominator: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LyricSpanKind {
    Syllable,
    Extend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricSpan {
    pub text: String,
    pub kind: LyricSpanKind,
}

impl LyricSpan {
    pub fn syllable(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: LyricSpanKind::Syllable,
        }
    }

    pub fn extend() -> Self {
        Self {
            text: String::new(),
            kind: LyricSpanKind::Extend,
        }
    }
}

/// One emitted timeline event. `tick` is used as the primary sort key for
/// every variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "camelCase")]
pub enum Event {
    #[serde(rename = "note")]
    Note {
        tick: i64,
        dur: i64,
        key: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        vel: Option<u8>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lyric: Option<LyricSpan>,
        #[serde(skip_serializing_if = "Option::is_none")]
        articulation: Option<String>,
        /// Sort-stability key: insertion order within equal ticks.
        #[serde(skip)]
        seq: u64,
    },
    #[serde(rename = "rest")]
    Rest {
        tick: i64,
        dur: i64,
        #[serde(skip)]
        seq: u64,
    },
    #[serde(rename = "cc")]
    Cc {
        tick: i64,
        controller: u8,
        value: i32,
        #[serde(skip)]
        seq: u64,
    },
    #[serde(rename = "pitchBend")]
    PitchBend {
        tick: i64,
        value: i32,
        #[serde(skip)]
        seq: u64,
    },
}

impl Event {
    pub fn tick(&self) -> i64 {
        match self {
            Event::Note { tick, .. }
            | Event::Rest { tick, .. }
            | Event::Cc { tick, .. }
            | Event::PitchBend { tick, .. } => *tick,
        }
    }

    fn seq(&self) -> u64 {
        match self {
            Event::Note { seq, .. } | Event::Rest { seq, .. } | Event::Cc { seq, .. } | Event::PitchBend { seq, .. } => {
                *seq
            }
        }
    }
}

/// `seq` is a sort-stability key, not part of the wire format (`#[serde(skip)]`
/// above) — it is excluded here too, so a value round-tripped through JSON
/// (which loses its original `seq`) still compares equal to the original.
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        use Event::*;
        match (self, other) {
            (
                Note { tick: t1, dur: d1, key: k1, vel: v1, lyric: l1, articulation: a1, .. },
                Note { tick: t2, dur: d2, key: k2, vel: v2, lyric: l2, articulation: a2, .. },
            ) => t1 == t2 && d1 == d2 && k1 == k2 && v1 == v2 && l1 == l2 && a1 == a2,
            (Rest { tick: t1, dur: d1, .. }, Rest { tick: t2, dur: d2, .. }) => t1 == t2 && d1 == d2,
            (
                Cc { tick: t1, controller: c1, value: v1, .. },
                Cc { tick: t2, controller: c2, value: v2, .. },
            ) => t1 == t2 && c1 == c2 && v1 == v2,
            (PitchBend { tick: t1, value: v1, .. }, PitchBend { tick: t2, value: v2, .. }) => t1 == t2 && v1 == v2,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Vocal,
    Midi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VocalMeta {
    pub engine: Option<String>,
    pub voice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackIr {
    pub id: String,
    pub kind: TrackKind,
    pub name: String,
    pub events: Vec<Event>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "defaultVel")]
    pub default_vel: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<VocalMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreIr {
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    pub title: Option<String>,
    pub ppq: i64,
    pub tempos: Vec<TempoEntry>,
    #[serde(rename = "timeSigs")]
    pub time_sigs: Vec<TimeSigEntry>,
    pub tracks: Vec<TrackIr>,
}

/// Accumulates tempo/time-sig/track data during evaluation, then produces
/// the final, validated `ScoreIr`.
pub struct ScoreIrBuilder {
    title: Option<String>,
    ppq: i64,
    tempos: Vec<TempoEntry>,
    time_sigs: Vec<TimeSigEntry>,
    tracks: Vec<TrackIr>,
    pub diagnostics: Vec<Diagnostic>,
    next_seq: u64,
}

impl ScoreIrBuilder {
    pub fn new(title: Option<String>) -> Self {
        Self {
            title,
            ppq: DEFAULT_PPQ,
            tempos: Vec::new(),
            time_sigs: Vec::new(),
            tracks: Vec::new(),
            diagnostics: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn ppq(&self) -> i64 {
        self.ppq
    }

    pub fn push_tempo(&mut self, tick: i64, bpm: f64) {
        self.tempos.push(TempoEntry { tick, bpm });
    }

    pub fn push_time_sig(&mut self, tick: i64, numerator: u32, denominator: u32) {
        self.time_sigs.push(TimeSigEntry {
            tick,
            numerator,
            denominator,
        });
    }

    pub fn push_track(&mut self, track: TrackIr) {
        self.tracks.push(track);
    }

    /// Monotonic counter used to break ties stably when sorting events that
    /// share a tick.
    pub fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn has_error_diagnostic(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == crate::error::Severity::Error)
    }

    /// Sort each track's events by tick (stable), fill default tempo/meter
    /// if none were given, and return the finished IR alongside
    /// diagnostics. Returns `None` for `ir` if any diagnostic is
    /// error-severity.
    pub fn finish(mut self) -> (Option<ScoreIr>, Vec<Diagnostic>) {
        if self.tempos.is_empty() {
            self.tempos.push(TempoEntry {
                tick: 0,
                bpm: DEFAULT_TEMPO_BPM,
            });
        }
        if self.time_sigs.is_empty() {
            self.time_sigs.push(TimeSigEntry {
                tick: 0,
                numerator: DEFAULT_TIME_SIG.0,
                denominator: DEFAULT_TIME_SIG.1,
            });
        }
        self.tempos.sort_by_key(|t| t.tick);
        self.time_sigs.sort_by_key(|t| t.tick);
        for track in &mut self.tracks {
            track.events.sort_by(|a, b| a.tick().cmp(&b.tick()).then(a.seq().cmp(&b.seq())));
        }

        if self.has_error_diagnostic() {
            return (None, self.diagnostics);
        }

        let ir = ScoreIr {
            schema_version: SCHEMA_VERSION.to_string(),
            title: self.title,
            ppq: self.ppq,
            tempos: self.tempos,
            time_sigs: self.time_sigs,
            tracks: self.tracks,
        };
        (Some(ir), self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_tempo_and_time_sig() {
        let builder = ScoreIrBuilder::new(Some("T".to_string()));
        let (ir, diagnostics) = builder.finish();
        let ir = ir.unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(ir.tempos[0].tick, 0);
        assert_eq!(ir.tempos[0].bpm, DEFAULT_TEMPO_BPM);
        assert_eq!(ir.time_sigs[0].numerator, 4);
        assert_eq!(ir.time_sigs[0].denominator, 4);
    }

    #[test]
    fn error_diagnostic_suppresses_ir() {
        let mut builder = ScoreIrBuilder::new(None);
        builder.diagnostics.push(Diagnostic::error("test_error", "boom", None));
        let (ir, diagnostics) = builder.finish();
        assert!(ir.is_none());
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn events_sort_by_tick_then_insertion() {
        let mut builder = ScoreIrBuilder::new(None);
        let seq_a = builder.next_seq();
        let seq_b = builder.next_seq();
        let mut track = TrackIr {
            id: "t".to_string(),
            kind: TrackKind::Midi,
            name: "t".to_string(),
            events: vec![
                Event::Note {
                    tick: 480,
                    dur: 480,
                    key: 60,
                    vel: None,
                    lyric: None,
                    articulation: None,
                    seq: seq_b,
                },
                Event::Note {
                    tick: 0,
                    dur: 480,
                    key: 62,
                    vel: None,
                    lyric: None,
                    articulation: None,
                    seq: seq_a,
                },
            ],
            channel: None,
            program: None,
            default_vel: None,
            meta: None,
        };
        track.events.sort_by(|a, b| a.tick().cmp(&b.tick()).then(a.seq().cmp(&b.seq())));
        builder.push_track(track);
        let (ir, _) = builder.finish();
        let ir = ir.unwrap();
        assert_eq!(ir.tracks[0].events[0].tick(), 0);
        assert_eq!(ir.tracks[0].events[1].tick(), 480);
    }
}
