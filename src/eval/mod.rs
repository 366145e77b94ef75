//! # Evaluator (C5)
//!
//! Walks a parsed [`Score`] in two phases. The *global phase* processes the
//! score header (tempo, time signature, backend hint, imports, top-level
//! assignments) against the score's root scope; it closes permanently the
//! moment the first `part` is reached. The *track phase* then evaluates each
//! part independently into its own [`TrackState`], advancing a per-track
//! cursor in ticks as bars and phrases are walked left to right.
//!
//! Tied notes coalesce: a note/chord written `X~` followed by a matching
//! `X` extends the already-emitted event's `dur` rather than emitting a
//! second one. Lyrics in a `phrase` are zipped against that *post-coalescing*
//! event sequence, one token per slot, so a five-note phrase with one tie
//! still lines up against five lyric tokens, not four underlying notes.

pub mod ornaments;

use crate::ast::{
    Assignment, Backend, BackendKind, Bar, Element, HeaderStmt, Import, LyricLine, LyricTok,
    Part, PartBody, Phrase, Score,
};
use crate::error::{Diagnostic, ImportErrorKind, MfsError, Position};
use crate::ir::{Event, LyricSpan, ScoreIr, ScoreIrBuilder, TrackIr, TrackKind, VocalMeta};
use crate::lexer::Lexer;
use crate::music::{DurationSpec, Pitch};
use crate::parser;
use crate::resolver::{ResolvedModule, Resolver};
use crate::value::{Scope, ScopeRef, Value};
use std::path::{Path, PathBuf};

/// A tied-but-not-yet-closed note or chord, kept on the track so the next
/// bar element can either extend it (matching pitch set) or leave it
/// dangling (a `TrackError` warning).
struct PendingTie {
    /// Sorted MIDI key(s) the tie is waiting to match.
    pitches: Vec<i32>,
    /// Event index (or indices, for a midi chord — one per pitch, in the
    /// same sorted order as `pitches`) to extend on a match.
    event_indices: Vec<usize>,
    position: Position,
}

/// Per-part evaluation state: identity, cursor, and the events built so far.
pub struct TrackState {
    pub id: String,
    pub kind: TrackKind,
    pub name: String,
    pub cursor: i64,
    pub channel: Option<u8>,
    pub program: Option<u8>,
    pub default_vel: Option<u8>,
    pub vocal_meta: Option<VocalMeta>,
    pub events: Vec<Event>,
    seq_counter: u64,
    /// Vocal-only: tick at which the last emitted note/rest ends, used to
    /// enforce the no-overlap invariant.
    last_tick_end: i64,
    pending_tie: Option<PendingTie>,
}

impl TrackState {
    pub fn new(id: String, kind: TrackKind, name: String) -> Self {
        Self {
            id,
            kind,
            name,
            cursor: 0,
            channel: None,
            program: None,
            default_vel: None,
            vocal_meta: None,
            events: Vec::new(),
            seq_counter: 0,
            last_tick_end: 0,
            pending_tie: None,
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.seq_counter;
        self.seq_counter += 1;
        seq
    }

    /// Emit a single-pitch note at `tick` lasting `dur` ticks. Checked
    /// against the vocal no-overlap invariant; midi tracks have no such
    /// constraint (multiple voices may legitimately overlap).
    pub fn emit_note(
        &mut self,
        tick: i64,
        dur: i64,
        pitch: Pitch,
        lyric: Option<LyricSpan>,
        position: Position,
    ) -> Result<usize, MfsError> {
        if matches!(self.kind, TrackKind::Vocal) && tick < self.last_tick_end {
            return Err(MfsError::TrackError {
                message: format!(
                    "vocal note at tick {tick} overlaps the previous note ending at {}",
                    self.last_tick_end
                ),
                position,
            });
        }
        let key = pitch.midi.clamp(0, 127) as u8;
        let seq = self.next_seq();
        let index = self.events.len();
        self.events.push(Event::Note {
            tick,
            dur,
            key,
            vel: self.default_vel.or(Some(crate::ir::DEFAULT_VELOCITY)),
            lyric,
            articulation: None,
            seq,
        });
        if matches!(self.kind, TrackKind::Vocal) {
            self.last_tick_end = tick + dur;
        }
        Ok(index)
    }

    pub fn emit_rest(&mut self, tick: i64, dur: i64) {
        if matches!(self.kind, TrackKind::Vocal) {
            let seq = self.next_seq();
            self.events.push(Event::Rest { tick, dur, seq });
            self.last_tick_end = tick + dur;
        }
    }

    fn extend_event(&mut self, index: usize, extra_ticks: i64) {
        if let Some(Event::Note { dur, .. }) = self.events.get_mut(index) {
            *dur += extra_ticks;
        }
    }

    fn set_lyric(&mut self, index: usize, lyric: LyricSpan) {
        if let Some(Event::Note { lyric: slot, .. }) = self.events.get_mut(index) {
            *slot = Some(lyric);
        }
    }

    fn into_ir(self) -> TrackIr {
        TrackIr {
            id: self.id,
            kind: self.kind,
            name: self.name,
            events: self.events,
            channel: self.channel,
            program: self.program,
            default_vel: self.default_vel,
            meta: self.vocal_meta,
        }
    }
}

/// Holds the IR under construction and the seeded RNG shared by `random`
/// stdlib calls for the duration of one compile.
pub struct Evaluator {
    pub ir: ScoreIrBuilder,
    pub rng: rand::rngs::StdRng,
    pub native_root: ScopeRef,
}

impl Evaluator {
    pub fn new(title: Option<String>, seed: u64, native_root: ScopeRef) -> Self {
        use rand::SeedableRng;
        Self {
            ir: ScoreIrBuilder::new(title),
            rng: rand::rngs::StdRng::seed_from_u64(seed),
            native_root,
        }
    }

    fn diag(&mut self, d: Diagnostic) {
        self.ir.diagnostics.push(d);
    }
}

fn is_catastrophic(err: &MfsError) -> bool {
    matches!(err, MfsError::ImportError { .. } | MfsError::InternalError { .. })
}

// ---------------------------------------------------------------------
// Expression evaluation
// ---------------------------------------------------------------------

fn eval_literal(
    lit: &crate::ast::Literal,
    scope: &ScopeRef,
    evaluator: &mut Evaluator,
    position: Position,
) -> Result<Value, MfsError> {
    use crate::ast::Literal;
    match lit {
        Literal::Int(n) => Ok(Value::Int(*n)),
        Literal::Decimal(n) => Ok(Value::Number(*n)),
        Literal::String(s) => Ok(Value::String(s.clone())),
        Literal::Pitch(raw) => Pitch::parse(raw, position).map(Value::Pitch),
        Literal::Duration(raw) => DurationSpec::parse(raw, position).map(Value::Duration),
        Literal::Array(items) => {
            let values = items
                .iter()
                .map(|e| eval_expr(e, scope, evaluator, position))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(values))
        }
    }
}

pub fn eval_expr(
    expr: &crate::ast::Expr,
    scope: &ScopeRef,
    evaluator: &mut Evaluator,
    position: Position,
) -> Result<Value, MfsError> {
    use crate::ast::Expr;
    match expr {
        Expr::Literal(lit) => eval_literal(lit, scope, evaluator, position),
        Expr::Identifier(id) => scope.borrow().lookup(&id.name).ok_or_else(|| MfsError::TypeError {
            expected: "a defined name".to_string(),
            got: format!("undefined '{}'", id.name),
            position: id.position,
        }),
        Expr::Call(call) => eval_call(call, scope, evaluator),
    }
}

fn eval_call(call: &crate::ast::Call, scope: &ScopeRef, evaluator: &mut Evaluator) -> Result<Value, MfsError> {
    let args = call
        .args
        .iter()
        .map(|a| eval_expr(a, scope, evaluator, call.position))
        .collect::<Result<Vec<_>, _>>()?;

    let first = call.path.first().ok_or_else(|| MfsError::InternalError {
        message: "call with empty path".to_string(),
    })?;
    let mut current = scope.borrow().lookup(first).ok_or_else(|| MfsError::TypeError {
        expected: "a defined function".to_string(),
        got: format!("undefined '{first}'"),
        position: call.position,
    })?;
    for segment in &call.path[1..] {
        current = match current {
            Value::Object(obj) => obj.get(segment).cloned().ok_or_else(|| MfsError::TypeError {
                expected: format!("member '{segment}'"),
                got: "missing".to_string(),
                position: call.position,
            })?,
            other => {
                return Err(MfsError::TypeError {
                    expected: "object".to_string(),
                    got: other.kind_name().to_string(),
                    position: call.position,
                })
            }
        };
    }
    match current {
        Value::NativeFunction(f) => (f.func)(evaluator, &args, call.position),
        other => Err(MfsError::TypeError {
            expected: "function".to_string(),
            got: other.kind_name().to_string(),
            position: call.position,
        }),
    }
}

// ---------------------------------------------------------------------
// Header (global phase) evaluation
// ---------------------------------------------------------------------

fn eval_header(
    header: &[HeaderStmt],
    evaluator: &mut Evaluator,
    scope: &ScopeRef,
    resolver: &mut Resolver,
    current_dir: &Path,
) -> Result<(), MfsError> {
    for stmt in header {
        match stmt {
            HeaderStmt::Tempo(t) => match eval_expr(&t.bpm, scope, evaluator, t.position) {
                Ok(v) => match v.as_number(t.position) {
                    Ok(bpm) => evaluator.ir.push_tempo(0, bpm),
                    Err(e) => evaluator.diag(Diagnostic::from_error(&e)),
                },
                Err(e) => evaluator.diag(Diagnostic::from_error(&e)),
            },
            HeaderStmt::TimeSig(t) => evaluator.ir.push_time_sig(0, t.numerator, t.denominator),
            HeaderStmt::Backend(_) => {
                // A score-level backend hint has no dedicated slot in the
                // emitted IR; it is only meaningful on a part header.
            }
            HeaderStmt::Import(imp) => eval_import(imp, current_dir, resolver, evaluator, scope)?,
            HeaderStmt::Assignment(a) => eval_assignment(a, scope, evaluator),
        }
    }
    Ok(())
}

fn eval_assignment(a: &Assignment, scope: &ScopeRef, evaluator: &mut Evaluator) {
    match eval_expr(&a.value, scope, evaluator, a.position) {
        Ok(v) => scope.borrow_mut().define(a.name.name.clone(), v, a.mutable),
        Err(e) => evaluator.diag(Diagnostic::from_error(&e)),
    }
}

fn eval_import(
    imp: &Import,
    current_dir: &Path,
    resolver: &mut Resolver,
    evaluator: &mut Evaluator,
    scope: &ScopeRef,
) -> Result<(), MfsError> {
    match resolver.resolve(&imp.path, current_dir)? {
        ResolvedModule::Std(name) => {
            let module = crate::stdlib::std_module(&name).ok_or_else(|| MfsError::InternalError {
                message: format!("stdlib module '{name}' missing from registry"),
            })?;
            scope.borrow_mut().define(name, module, false);
            Ok(())
        }
        ResolvedModule::File(path) => {
            if let Some(bindings) = resolver.cached_bindings(&path) {
                for (name, value) in bindings.clone() {
                    scope.borrow_mut().define(name, value, false);
                }
                return Ok(());
            }
            resolver.enter(&path)?;
            let result = eval_file_import(&path, resolver, evaluator);
            resolver.leave(&path);
            let bindings = result?;
            resolver.cache_bindings(path.clone(), bindings.clone());
            for (name, value) in bindings {
                scope.borrow_mut().define(name, value, false);
            }
            Ok(())
        }
    }
}

/// Evaluate a relatively-imported file's header in an isolated scope (child
/// of the shared native root, so `std:*` lookups still work), returning its
/// top-level bindings. The caller both merges them into the importing scope
/// and caches them on `Resolver`, so the same file imported a second time
/// replays its evaluated scope instead of a silent no-op. There is no "as"
/// clause in the grammar, so imports are always a flat merge; later imports
/// naturally shadow earlier ones because they run, and `define`, later.
fn eval_file_import(
    path: &Path,
    resolver: &mut Resolver,
    evaluator: &mut Evaluator,
) -> Result<Vec<(String, Value)>, MfsError> {
    let source = std::fs::read_to_string(path).map_err(|e| MfsError::ImportError {
        kind: ImportErrorKind::FileNotFound,
        message: format!("failed to read {}: {e}", path.display()),
        chain: Vec::new(),
    })?;
    let tokens = Lexer::new(&source).tokenize()?;
    let (file_score, parse_errors) = parser::parse(tokens)?;
    for e in &parse_errors {
        evaluator.diag(Diagnostic::from_error(e).with_file(path.display().to_string()));
    }

    let file_scope = Scope::child(&evaluator.native_root);
    let file_dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    eval_header(&file_score.header, evaluator, &file_scope, resolver, &file_dir)?;

    Ok(file_scope.borrow().local_bindings())
}

// ---------------------------------------------------------------------
// Track phase: parts, phrases, bars
// ---------------------------------------------------------------------

fn infer_track_kind(part: &Part) -> (TrackKind, Option<&Backend>) {
    let backend = part.header.iter().find_map(|h| match h {
        HeaderStmt::Backend(b) => Some(b),
        _ => None,
    });
    if let Some(b) = backend {
        let kind = match b.kind {
            BackendKind::Midi => TrackKind::Midi,
            BackendKind::Vocal => TrackKind::Vocal,
        };
        return (kind, Some(b));
    }
    let has_phrase = part.body.iter().any(|b| matches!(b, PartBody::Phrase(_)));
    (if has_phrase { TrackKind::Vocal } else { TrackKind::Midi }, None)
}

fn apply_backend_settings(backend: &Backend, track: &mut TrackState, scope: &ScopeRef, evaluator: &mut Evaluator) {
    let mut engine = None;
    let mut voice = None;
    for (key, expr) in &backend.settings {
        let value = match eval_expr(expr, scope, evaluator, backend.position) {
            Ok(v) => v,
            Err(e) => {
                evaluator.diag(Diagnostic::from_error(&e));
                continue;
            }
        };
        match key.as_str() {
            "ch" | "channel" => {
                if let Ok(n) = value.as_int(backend.position) {
                    track.channel = Some(n.clamp(0, 15) as u8);
                }
            }
            "program" => {
                if let Ok(n) = value.as_int(backend.position) {
                    track.program = Some(n.clamp(0, 127) as u8);
                }
            }
            "vel" | "velocity" => {
                if let Ok(n) = value.as_int(backend.position) {
                    track.default_vel = Some(n.clamp(0, 127) as u8);
                }
            }
            "engine" => {
                if let Ok(s) = value.as_string(backend.position) {
                    engine = Some(s.to_string());
                }
            }
            "voice" => {
                if let Ok(s) = value.as_string(backend.position) {
                    voice = Some(s.to_string());
                }
            }
            _ => {}
        }
    }
    if matches!(track.kind, TrackKind::Vocal) && (engine.is_some() || voice.is_some()) {
        track.vocal_meta = Some(VocalMeta { engine, voice });
    }
}

/// Evaluate one bar's elements against `track`, returning the event index
/// of every note/chord slot emitted (in source order) for lyric alignment.
fn eval_bar_elements(
    bar: &Bar,
    evaluator: &mut Evaluator,
    scope: &ScopeRef,
    track: &mut TrackState,
) -> Result<Vec<usize>, MfsError> {
    let ppq = evaluator.ir.ppq();
    let mut slots = Vec::new();
    for element in &bar.elements {
        match element {
            Element::Note(n) => {
                let pitch = Pitch::parse(&n.pitch.raw, n.pitch.position)?;
                let dur_spec = DurationSpec::parse(&n.duration.raw, n.duration.position)?;
                let (ticks, approximated) = dur_spec.to_ticks(ppq, n.duration.position)?;
                if approximated {
                    evaluator.diag(Diagnostic::warning(
                        "timing_approximation",
                        format!("duration '{}' does not divide evenly at ppq {ppq}; rounded", n.duration.raw),
                        Some(n.duration.position),
                    ));
                }
                let index = place_single_pitch(track, evaluator, pitch.midi, ticks, pitch, dur_spec.tie, n.position)?;
                slots.push(index);
            }
            Element::Chord(c) => {
                let pitches = c
                    .pitches
                    .iter()
                    .map(|p| Pitch::parse(&p.raw, p.position))
                    .collect::<Result<Vec<_>, _>>()?;
                let dur_spec = DurationSpec::parse(&c.duration.raw, c.duration.position)?;
                let (ticks, approximated) = dur_spec.to_ticks(ppq, c.duration.position)?;
                if approximated {
                    evaluator.diag(Diagnostic::warning(
                        "timing_approximation",
                        format!("duration '{}' does not divide evenly at ppq {ppq}; rounded", c.duration.raw),
                        Some(c.duration.position),
                    ));
                }
                if matches!(track.kind, TrackKind::Vocal) {
                    evaluator.diag(Diagnostic::warning(
                        "chord_collapsed_in_vocal_track",
                        "a vocal track is monophonic; only the chord's first pitch is sung",
                        Some(c.position),
                    ));
                    let first = pitches[0];
                    let index = place_single_pitch(track, evaluator, first.midi, ticks, first, dur_spec.tie, c.position)?;
                    slots.push(index);
                } else {
                    let index = place_chord(track, evaluator, &pitches, ticks, dur_spec.tie, c.position)?;
                    slots.push(index);
                }
            }
            Element::Rest(r) => {
                let dur_spec = DurationSpec::parse(&r.duration.raw, r.duration.position)?;
                let (ticks, approximated) = dur_spec.to_ticks(ppq, r.duration.position)?;
                if approximated {
                    evaluator.diag(Diagnostic::warning(
                        "timing_approximation",
                        format!("duration '{}' does not divide evenly at ppq {ppq}; rounded", r.duration.raw),
                        Some(r.duration.position),
                    ));
                }
                close_dangling_tie(track, evaluator);
                track.emit_rest(track.cursor, ticks);
                track.cursor += ticks;
            }
            Element::Call(ec) => {
                let name = ec.call.path.first().map(|s| s.as_str()).unwrap_or("");
                if ornaments::is_ornament(name) {
                    close_dangling_tie(track, evaluator);
                    let args = ec
                        .call
                        .args
                        .iter()
                        .map(|a| eval_expr(a, scope, evaluator, ec.call.position))
                        .collect::<Result<Vec<_>, _>>()?;
                    ornaments::expand(name, &args, ec.call.position, ppq, track)?;
                } else {
                    eval_call(&ec.call, scope, evaluator)?;
                }
            }
        }
    }
    Ok(slots)
}

fn close_dangling_tie(track: &mut TrackState, evaluator: &mut Evaluator) {
    if let Some(pending) = track.pending_tie.take() {
        evaluator.diag(Diagnostic::from_error(&MfsError::TrackError {
            message: "dangling tie: no matching note followed".to_string(),
            position: pending.position,
        }));
    }
}

/// Place a single-pitch note, coalescing into a pending tie if the previous
/// element left one open with a matching pitch.
fn place_single_pitch(
    track: &mut TrackState,
    evaluator: &mut Evaluator,
    midi: i32,
    ticks: i64,
    pitch: Pitch,
    tie: bool,
    position: Position,
) -> Result<usize, MfsError> {
    if let Some(pending) = track.pending_tie.take() {
        if pending.pitches == [midi] {
            let index = pending.event_indices[0];
            track.extend_event(index, ticks);
            track.cursor += ticks;
            if matches!(track.kind, TrackKind::Vocal) {
                track.last_tick_end = track.cursor;
            }
            if tie {
                track.pending_tie = Some(PendingTie {
                    pitches: vec![midi],
                    event_indices: vec![index],
                    position,
                });
            }
            return Ok(index);
        }
        evaluator.diag(Diagnostic::from_error(&MfsError::TrackError {
            message: "dangling tie: no matching note followed".to_string(),
            position: pending.position,
        }));
    }
    let index = track.emit_note(track.cursor, ticks, pitch, None, position)?;
    track.cursor += ticks;
    if tie {
        track.pending_tie = Some(PendingTie {
            pitches: vec![midi],
            event_indices: vec![index],
            position,
        });
    }
    Ok(index)
}

/// Place a (midi-only) chord, coalescing into a pending tie if the previous
/// chord left one open with the exact same pitch set.
fn place_chord(
    track: &mut TrackState,
    evaluator: &mut Evaluator,
    pitches: &[Pitch],
    ticks: i64,
    tie: bool,
    position: Position,
) -> Result<usize, MfsError> {
    let mut sorted: Vec<(i32, Pitch)> = pitches.iter().map(|p| (p.midi, *p)).collect();
    sorted.sort_by_key(|(m, _)| *m);
    let sorted_midis: Vec<i32> = sorted.iter().map(|(m, _)| *m).collect();

    if let Some(pending) = track.pending_tie.take() {
        if pending.pitches == sorted_midis {
            for &index in &pending.event_indices {
                track.extend_event(index, ticks);
            }
            track.cursor += ticks;
            let representative = pending.event_indices[0];
            if tie {
                track.pending_tie = Some(PendingTie {
                    pitches: sorted_midis,
                    event_indices: pending.event_indices,
                    position,
                });
            }
            return Ok(representative);
        }
        evaluator.diag(Diagnostic::from_error(&MfsError::TrackError {
            message: "dangling tie: no matching chord followed".to_string(),
            position: pending.position,
        }));
    }

    let mut indices = Vec::with_capacity(sorted.len());
    for (midi, pitch) in &sorted {
        let index = track.emit_note(track.cursor, ticks, *pitch, None, position)?;
        indices.push(index);
        let _ = midi;
    }
    let representative = indices[0];
    track.cursor += ticks;
    if tie {
        track.pending_tie = Some(PendingTie {
            pitches: sorted_midis,
            event_indices: indices,
            position,
        });
    }
    Ok(representative)
}

fn align_lyrics(line: &LyricLine, slots: &[usize], track: &mut TrackState, evaluator: &mut Evaluator) {
    for (i, &slot_index) in slots.iter().enumerate() {
        match line.tokens.get(i) {
            Some(LyricTok::Word(w)) => track.set_lyric(slot_index, LyricSpan::syllable(w.clone())),
            Some(LyricTok::Quoted(w)) => track.set_lyric(slot_index, LyricSpan::syllable(w.clone())),
            Some(LyricTok::Extend) => track.set_lyric(slot_index, LyricSpan::extend()),
            None => {}
        }
    }
    if line.tokens.len() > slots.len() {
        evaluator.diag(Diagnostic::warning(
            "lyric_overflow",
            format!(
                "{} trailing lyric token(s) have no note to attach to",
                line.tokens.len() - slots.len()
            ),
            Some(line.position),
        ));
    }
}

fn eval_phrase(phrase: &Phrase, evaluator: &mut Evaluator, scope: &ScopeRef, track: &mut TrackState) -> Result<(), MfsError> {
    let mut slots = Vec::new();
    for bar in &phrase.bars {
        if bar.recovered {
            continue;
        }
        let bar_slots = eval_bar_elements(bar, evaluator, scope, track)?;
        slots.extend(bar_slots);
    }
    close_dangling_tie(track, evaluator);
    align_lyrics(&phrase.lyrics, &slots, track, evaluator);
    Ok(())
}

fn eval_part(
    part: &Part,
    evaluator: &mut Evaluator,
    root_scope: &ScopeRef,
    resolver: &mut Resolver,
    current_dir: &Path,
) -> Result<(), MfsError> {
    let scope = Scope::child(root_scope);
    for stmt in &part.header {
        match stmt {
            HeaderStmt::Tempo(t) => evaluator.diag(Diagnostic::from_error(&MfsError::PhaseError {
                message: "tempo may only appear in the score header".to_string(),
                position: t.position,
            })),
            HeaderStmt::TimeSig(t) => evaluator.diag(Diagnostic::from_error(&MfsError::PhaseError {
                message: "time signature may only appear in the score header".to_string(),
                position: t.position,
            })),
            HeaderStmt::Backend(_) => {}
            HeaderStmt::Import(imp) => eval_import(imp, current_dir, resolver, evaluator, &scope)?,
            HeaderStmt::Assignment(a) => eval_assignment(a, &scope, evaluator),
        }
    }

    let (kind, backend) = infer_track_kind(part);
    let mut track = TrackState::new(part.name.name.clone(), kind, part.name.name.clone());
    if let Some(b) = backend {
        apply_backend_settings(b, &mut track, &scope, evaluator);
    }

    for body in &part.body {
        let outcome = match body {
            PartBody::Bar(bar) => {
                if bar.recovered {
                    Ok(())
                } else {
                    eval_bar_elements(bar, evaluator, &scope, &mut track).map(|_| ())
                }
            }
            PartBody::Phrase(phrase) => eval_phrase(phrase, evaluator, &scope, &mut track),
        };
        if let Err(e) = outcome {
            if is_catastrophic(&e) {
                return Err(e);
            }
            evaluator.diag(Diagnostic::from_error(&e));
            // A per-statement failure aborts the rest of this part; the
            // evaluator moves on to the next one.
            break;
        }
    }

    close_dangling_tie(&mut track, evaluator);
    evaluator.ir.push_track(track.into_ir());
    Ok(())
}

/// Evaluate a fully parsed score against `base_dir` (used to resolve
/// relative imports) and a shared, already natively-seeded root scope.
/// Returns the finished IR (or `None` if any diagnostic is error-severity)
/// alongside every diagnostic collected along the way.
pub fn evaluate_score(
    score: &Score,
    base_dir: &Path,
    seed: u64,
    native_root: &ScopeRef,
) -> (Option<ScoreIr>, Vec<Diagnostic>) {
    let mut evaluator = Evaluator::new(Some(score.title.clone()), seed, native_root.clone());
    let mut resolver = Resolver::new();
    let scope = Scope::child(native_root);
    let base_dir: PathBuf = base_dir.to_path_buf();

    if let Err(e) = eval_header(&score.header, &mut evaluator, &scope, &mut resolver, &base_dir) {
        evaluator.diag(Diagnostic::from_error(&e));
        return evaluator.ir.finish();
    }

    for part in &score.parts {
        if let Err(e) = eval_part(part, &mut evaluator, &scope, &mut resolver, &base_dir) {
            evaluator.diag(Diagnostic::from_error(&e));
            return evaluator.ir.finish();
        }
    }

    evaluator.ir.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Position;

    fn pos() -> Position {
        Position::start()
    }

    fn midi_track() -> TrackState {
        TrackState::new("t".to_string(), TrackKind::Midi, "t".to_string())
    }

    fn vocal_track() -> TrackState {
        TrackState::new("v".to_string(), TrackKind::Vocal, "v".to_string())
    }

    #[test]
    fn tied_notes_merge_into_one_event() {
        let mut evaluator = Evaluator::new(None, 0, Scope::root());
        let mut track = midi_track();
        let c4 = Pitch::parse("C4", pos()).unwrap();
        place_single_pitch(&mut track, &mut evaluator, c4.midi, 480, c4, true, pos()).unwrap();
        place_single_pitch(&mut track, &mut evaluator, c4.midi, 240, c4, false, pos()).unwrap();
        assert_eq!(track.events.len(), 1);
        match &track.events[0] {
            Event::Note { dur, .. } => assert_eq!(*dur, 720),
            _ => panic!("expected note"),
        }
    }

    #[test]
    fn mismatched_tie_target_warns_and_emits_both() {
        let mut evaluator = Evaluator::new(None, 0, Scope::root());
        let mut track = midi_track();
        let c4 = Pitch::parse("C4", pos()).unwrap();
        let d4 = Pitch::parse("D4", pos()).unwrap();
        place_single_pitch(&mut track, &mut evaluator, c4.midi, 480, c4, true, pos()).unwrap();
        place_single_pitch(&mut track, &mut evaluator, d4.midi, 480, d4, false, pos()).unwrap();
        assert_eq!(track.events.len(), 2);
        assert_eq!(evaluator.ir.diagnostics.len(), 1);
        assert_eq!(evaluator.ir.diagnostics[0].code, "track_error");
        assert_eq!(evaluator.ir.diagnostics[0].severity, crate::error::Severity::Warning);
    }

    #[test]
    fn vocal_overlap_is_an_error() {
        let mut evaluator = Evaluator::new(None, 0, Scope::root());
        let mut track = vocal_track();
        let c4 = Pitch::parse("C4", pos()).unwrap();
        track.emit_note(0, 480, c4, None, pos()).unwrap();
        let err = track.emit_note(240, 480, c4, None, pos()).unwrap_err();
        assert!(matches!(err, MfsError::TrackError { .. }));
    }

    #[test]
    fn lyric_alignment_zips_against_post_tie_slots() {
        let mut evaluator = Evaluator::new(None, 0, Scope::root());
        let mut track = vocal_track();
        let c4 = Pitch::parse("C4", pos()).unwrap();
        let d4 = Pitch::parse("D4", pos()).unwrap();
        let e4 = Pitch::parse("E4", pos()).unwrap();
        let idx_c = place_single_pitch(&mut track, &mut evaluator, c4.midi, 240, c4, true, pos()).unwrap();
        place_single_pitch(&mut track, &mut evaluator, c4.midi, 240, c4, false, pos()).unwrap();
        let idx_d = place_single_pitch(&mut track, &mut evaluator, d4.midi, 240, d4, false, pos()).unwrap();
        let idx_e = place_single_pitch(&mut track, &mut evaluator, e4.midi, 240, e4, false, pos()).unwrap();
        let slots = vec![idx_c, idx_d, idx_e];
        let line = LyricLine {
            mode: crate::ast::LyricMode::Text,
            tokens: vec![
                LyricTok::Word("la".to_string()),
                LyricTok::Word("li".to_string()),
                LyricTok::Word("lu".to_string()),
            ],
            position: pos(),
        };
        align_lyrics(&line, &slots, &mut track, &mut evaluator);
        match &track.events[idx_c] {
            Event::Note { lyric: Some(l), .. } => assert_eq!(l.text, "la"),
            _ => panic!("expected lyric"),
        }
        assert_eq!(track.events.len(), 3);
    }

    #[test]
    fn track_kind_inferred_from_phrase_presence() {
        let part = Part {
            name: crate::ast::Identifier {
                name: "P".to_string(),
                position: pos(),
            },
            header: vec![],
            body: vec![PartBody::Phrase(Phrase {
                bars: vec![],
                lyrics: LyricLine {
                    mode: crate::ast::LyricMode::Text,
                    tokens: vec![],
                    position: pos(),
                },
                position: pos(),
            })],
            position: pos(),
        };
        let (kind, backend) = infer_track_kind(&part);
        assert!(matches!(kind, TrackKind::Vocal));
        assert!(backend.is_none());
    }
}
