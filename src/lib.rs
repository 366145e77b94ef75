//! # MFS Compiler Front End
//!
//! A compiler toolchain for the MFS domain-specific musical notation
//! language. Source files describe scores declaratively — tempo and meter,
//! named parts (vocal and MIDI-like), bars of notes with durations, tied
//! notes, chords, lyrics, ornaments, and phrase-level structures — and this
//! crate lowers them into a validated Score Intermediate Representation
//! (IR) with tick-accurate timing, suitable for downstream renderers
//! (MIDI writers, vocal-synth projects, DAW import plugins).
//!
//! ## Compilation Pipeline
//!
//! ```text
//! .mf source → Lexer → Parser → Resolver/Evaluator → Score IR (+ diagnostics)
//! ```
//!
//! 1. **Lexer** ([`lexer`]) - tokenizes source with `(line, column, offset)` positions
//! 2. **Parser** ([`parser`]) - recognizes the score/part/phrase/bar grammar, with
//!    best-effort recovery at bar boundaries
//! 3. **Resolver** ([`resolver`]) - resolves `import` statements (`std:*` or relative
//!    file), with cycle detection
//! 4. **Evaluator** ([`eval`]) - walks the AST in a global header phase then a
//!    per-part track phase, threading a musical cursor, coalescing tied notes,
//!    and zipping lyrics against the emitted event sequence
//! 5. **IR Builder** ([`ir`]) - assembles the final `ScoreIr` and collects
//!    diagnostics with source positions
//!
//! A compile is a pure function from (root file path, base directory) to
//! `(ir, diagnostics)` — see [`api::compile`].
//!
//! ## Quick Start
//!
//! ```rust
//! use mfs::api::compile_source;
//! use std::path::Path;
//!
//! let source = r#"score "Test" { tempo 120 time 4/4
//!     part Piano { midi ch:1 program:0 | C4 q D4 q E4 q F4 q | }
//! }"#;
//!
//! let result = compile_source(source, Path::new("."));
//! let ir = result.ir.expect("no error diagnostics");
//! assert_eq!(ir.tracks[0].events.len(), 4);
//! ```
//!
//! ## Module Structure
//!
//! - [`error`] - error kinds and the `Diagnostic` envelope
//! - [`lexer`] - tokenization
//! - [`ast`] - abstract syntax tree types
//! - [`parser`] - AST construction with recoverable bar-level errors
//! - [`resolver`] - `std:`/relative import resolution and cycle detection
//! - [`music`] - rational time, pitch, and duration-to-tick arithmetic
//! - [`value`] - the runtime `Value` tagged union and lexical `Scope`
//! - [`eval`] - the two-phase evaluator and ornament expansion
//! - [`stdlib`] - the native standard-library modules
//! - [`ir`] - the Score IR types, builder, and diagnostics
//! - [`api`] - the public `compile` entry point

pub mod ast;
pub mod error;
pub mod eval;
pub mod ir;
pub mod lexer;
pub mod music;
pub mod parser;
pub mod resolver;
pub mod stdlib;
pub mod value;

pub mod api;

pub use api::{compile, compile_source, CompileResult};
pub use error::{Diagnostic, MfsError, Position, Severity};
pub use ir::ScoreIr;
