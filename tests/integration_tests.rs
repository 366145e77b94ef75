//! End-to-end compilation tests, one per scenario in the external
//! interface contract, plus direct coverage of the emitted-IR invariants.

use mfs::compile_source;
use pretty_assertions::assert_eq;
use std::path::Path;

fn compile_ok(source: &str) -> mfs::ScoreIr {
    let result = compile_source(source, Path::new("."));
    assert!(
        result.diagnostics.iter().all(|d| d.severity != mfs::Severity::Error),
        "unexpected error diagnostics: {:?}",
        result.diagnostics
    );
    result.ir.expect("compile produced no IR despite no error diagnostics")
}

#[test]
fn simple_midi_bar() {
    let ir = compile_ok(
        r#"score "Test"{ tempo 120 time 4/4 part Piano { midi ch:1 program:0 | C4 q D4 q E4 q F4 q | } }"#,
    );
    assert_eq!(ir.ppq, 480);
    assert_eq!(ir.tempos[0].bpm, 120.0);
    assert_eq!(ir.time_sigs[0].numerator, 4);
    assert_eq!(ir.time_sigs[0].denominator, 4);
    assert_eq!(ir.tracks.len(), 1);
    let track = &ir.tracks[0];
    assert_eq!(track.channel, Some(1));
    assert_eq!(track.program, Some(0));
    let ticks: Vec<i64> = track.events.iter().map(|e| e.tick()).collect();
    assert_eq!(ticks, vec![0, 480, 960, 1440]);
    let keys: Vec<u8> = track
        .events
        .iter()
        .map(|e| match e {
            mfs::ir::Event::Note { key, .. } => *key,
            _ => panic!("expected note"),
        })
        .collect();
    assert_eq!(keys, vec![60, 62, 64, 65]);
}

#[test]
fn vocal_phrase_with_four_mora() {
    let ir = compile_ok(
        r#"score "V"{ tempo 120 time 4/4 part Vocal { phrase { notes: | C4 q D4 q E4 q F4 q |; lyrics mora: ha ji me ma; } } }"#,
    );
    assert_eq!(ir.tracks.len(), 1);
    let track = &ir.tracks[0];
    assert!(matches!(track.kind, mfs::ir::TrackKind::Vocal));
    assert_eq!(track.events.len(), 4);
    for event in &track.events {
        match event {
            mfs::ir::Event::Note { lyric, .. } => assert!(lyric.is_some()),
            _ => panic!("expected note"),
        }
    }
}

#[test]
fn multi_part_score_preserves_source_order() {
    let ir = compile_ok(
        r#"score "M"{ tempo 100 time 4/4
            part Vocal { phrase { notes: | C4 q D4 q E4 q F4 q |; lyrics: la li lu lo; } }
            part Piano { midi ch:1 | C3 q D3 q E3 q F3 q | }
            part Bass { midi ch:2 | C2 q D2 q E2 q F2 q | }
        }"#,
    );
    assert_eq!(ir.tracks.len(), 3);
    assert!(matches!(ir.tracks[0].kind, mfs::ir::TrackKind::Vocal));
    assert!(matches!(ir.tracks[1].kind, mfs::ir::TrackKind::Midi));
    assert!(matches!(ir.tracks[2].kind, mfs::ir::TrackKind::Midi));
}

#[test]
fn tied_notes_merge_and_carry_extend_lyric() {
    let ir = compile_ok(
        r#"score "Tie"{ tempo 120 time 4/4 part Vocal { phrase { notes: | C4 h~ C4 h | D4 q E4 q F4 q G4 q |; lyrics: a i _ u e; } } }"#,
    );
    let track = &ir.tracks[0];
    assert_eq!(track.events.len(), 5);
    match &track.events[0] {
        mfs::ir::Event::Note { dur, .. } => assert_eq!(*dur, 1920),
        _ => panic!("expected note"),
    }
    match &track.events[2] {
        mfs::ir::Event::Note { lyric: Some(l), .. } => assert_eq!(l.kind, mfs::ir::LyricSpanKind::Extend),
        _ => panic!("expected an extend lyric on the third slot"),
    }
}

#[test]
fn stdlib_import_resolves_known_module() {
    assert!(mfs::resolver::is_stdlib_import("std:theory"));
    assert!(!mfs::resolver::is_stdlib_import("./x.mf"));
    let resolver = mfs::resolver::Resolver::new();
    let resolved = resolver.resolve("std:theory", Path::new(".")).unwrap();
    assert_eq!(resolved, mfs::resolver::ResolvedModule::Std("theory".to_string()));
}

#[test]
fn sibling_phrases_share_one_continuous_cursor() {
    let result = compile_source(
        r#"score "Overlap"{ tempo 120 time 4/4 part V { phrase { notes: | C4 w |; lyrics: a; } phrase { notes: | C4 q |; lyrics: a; } } }"#,
        Path::new("."),
    );
    // Two sibling phrases on the same part share one cursor — the second
    // phrase does not restart at tick 0, it continues from where the first
    // left off, so this does not overlap (the quarter note starts exactly
    // when the whole note ends).
    assert!(result.diagnostics.iter().all(|d| d.severity != mfs::Severity::Error));
    let ir = result.ir.unwrap();
    let ticks: Vec<i64> = ir.tracks[0].events.iter().map(|e| e.tick()).collect();
    assert_eq!(ticks, vec![0, 1920]);
}

#[test]
fn tempo_inside_part_header_is_a_phase_error() {
    let result = compile_source(
        r#"score "Bad"{ part P { tempo 90 midi ch:1 | C4 q | } }"#,
        Path::new("."),
    );
    assert!(result.ir.is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.code == "phase_error" && d.severity == mfs::Severity::Error));
}

#[test]
fn unknown_std_module_import_is_an_import_error() {
    let result = compile_source(
        r#"score "Bad"{ import "std:nonexistent" part P { midi ch:1 | C4 q | } }"#,
        Path::new("."),
    );
    assert!(result.ir.is_none());
    assert!(result.diagnostics.iter().any(|d| d.code == "import_error"));
}

#[test]
fn default_tempo_and_time_sig_are_filled_when_absent() {
    let ir = compile_ok(r#"score "NoHeader"{ part P { midi ch:1 | C4 q | } }"#);
    assert_eq!(ir.tempos[0].bpm, 120.0);
    assert_eq!(ir.time_sigs[0].numerator, 4);
    assert_eq!(ir.time_sigs[0].denominator, 4);
}

#[test]
fn midi_rests_advance_cursor_without_emitting_an_event() {
    let ir = compile_ok(r#"score "Rest"{ tempo 120 time 4/4 part P { midi ch:1 | C4 q q D4 q | } }"#);
    let ticks: Vec<i64> = ir.tracks[0].events.iter().map(|e| e.tick()).collect();
    assert_eq!(ticks, vec![0, 960]);
}

#[test]
fn score_ir_round_trips_through_json() {
    let ir = compile_ok(
        r#"score "RoundTrip"{ tempo 120 time 4/4
            part Piano { midi ch:1 | C4 q D4 q E4 q F4 q | }
            part Vocal { phrase { notes: | C4 h~ C4 h |; lyrics: la u; } }
        }"#,
    );
    let json = serde_json::to_string(&ir).expect("ScoreIr always serializes");
    let round_tripped: mfs::ScoreIr = serde_json::from_str(&json).expect("ScoreIr always deserializes");
    assert_eq!(ir, round_tripped);
}

#[test]
fn a_dangling_tie_at_the_end_of_a_phrase_warns_instead_of_being_dropped_silently() {
    let result = compile_source(
        r#"score "Dangling"{ tempo 120 time 4/4 part V { phrase { notes: | C4 h~ |;  lyrics: a; } } }"#,
        Path::new("."),
    );
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.code == "track_error" && d.severity == mfs::Severity::Warning));
    let ir = result.ir.expect("a dangling tie is a warning, not an error");
    assert_eq!(ir.tracks[0].events.len(), 1);
}

#[test]
fn vocal_overlap_across_phrases_is_fatal_for_the_part() {
    let result = compile_source(
        r#"score "Overlap"{ tempo 120 time 4/4 part V {
            phrase { notes: | arpeggio([C4 E4 G4], q, 60) |; lyrics: a; }
        } }"#,
        Path::new("."),
    );
    // An arpeggio's later notes start partway through its total duration
    // while the first note still spans the whole thing, so on a vocal
    // track the second onset lands before the first note's end — a
    // genuine overlap on the per-part vocal cursor.
    assert!(result.ir.is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.code == "track_error" && d.severity == mfs::Severity::Error));
}

#[test]
fn importing_the_same_file_twice_replays_its_bindings() {
    // "./a.mf" resolves (and caches) "./shared.mf" as a nested import first;
    // the score header's own direct "./shared.mf" import then has to hit
    // that cache. If the cache only remembered "visited" rather than the
    // file's bindings, `x` would never reach the score's root scope and the
    // `tempo x` lookup below would fail.
    let dir = std::env::temp_dir().join(format!("mfs_shared_import_test_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("shared.mf"), r#"score "Shared" { x = 3 }"#).unwrap();
    std::fs::write(dir.join("a.mf"), r#"score "A" { import "./shared.mf" }"#).unwrap();

    let source = r#"score "TwoImports"{
        import "./a.mf"
        import "./shared.mf"
        tempo x
        time 4/4
        part P { midi ch:1 | C4 q | }
    }"#;
    let result = compile_source(source, &dir);
    assert!(
        result.diagnostics.iter().all(|d| d.severity != mfs::Severity::Error),
        "unexpected error diagnostics: {:?}",
        result.diagnostics
    );
    let ir = result.ir.expect("both imports of the shared file should succeed");
    assert_eq!(ir.tempos[0].bpm, 3.0);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn import_cycle_between_two_files_is_an_import_error() {
    let dir = std::env::temp_dir().join(format!("mfs_import_cycle_test_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let a_path = dir.join("a.mf");
    let b_path = dir.join("b.mf");
    std::fs::write(&a_path, r#"score "A" { import "./b.mf" }"#).unwrap();
    std::fs::write(&b_path, r#"score "B" { import "./a.mf" }"#).unwrap();

    let source = r#"score "Cycle"{ import "./a.mf" part P { midi ch:1 | C4 q | } }"#;
    let result = compile_source(source, &dir);
    assert!(result.ir.is_none());
    let cycle_diag = result
        .diagnostics
        .iter()
        .find(|d| d.code == "import_error")
        .expect("expected an import_error diagnostic");
    assert!(cycle_diag.message.contains("cycle"));
    assert!(cycle_diag.message.contains("a.mf"));
    assert!(cycle_diag.message.contains("b.mf"));

    std::fs::remove_dir_all(&dir).ok();
}
