//! # Abstract Syntax Tree (AST) Types (C2)
//!
//! ## Type Hierarchy
//! ```text
//! Score
//!   ├── title: String
//!   ├── header: Vec<HeaderStmt>   (Tempo | TimeSig | Backend | Import | Assignment)
//!   └── parts: Vec<Part>
//!         ├── name: Identifier
//!         ├── header: Vec<HeaderStmt>  (midi ch:/program:, or vocal-specific settings)
//!         └── body: Vec<PartBody>      (Phrase | Bar)
//!
//! Bar
//!   └── elements: Vec<Element>   (Note | Chord | Rest | Call)
//!
//! Phrase
//!   ├── bars: Vec<Bar>
//!   └── lyrics: LyricLine
//! ```
//!
//! Every node carries a [`Position`] so diagnostics can always point back at
//! source text.

use crate::error::Position;

/// A bare name reference, e.g. a part name or a stdlib function path segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub position: Position,
}

/// Literal values that can appear in expression position (assignment RHS,
/// call arguments).
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Decimal(f64),
    String(String),
    Pitch(String),
    Duration(String),
    Array(Vec<Expr>),
}

/// The small expression language used in header assignments and call
/// arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Identifier(Identifier),
    Call(Call),
}

/// `name(args...)`, possibly a dotted path (`theory.majorTriad(...)`).
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub path: Vec<String>,
    pub args: Vec<Expr>,
    pub position: Position,
}

/// `name = expr` or `name := expr` (mutable), appearing in score/part headers.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: Identifier,
    pub mutable: bool,
    pub value: Expr,
    pub position: Position,
}

/// `import "X"` — `path` is the raw string, e.g. `"std:theory"` or `"./x.mf"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub path: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tempo {
    pub bpm: Expr,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSig {
    pub numerator: u32,
    pub denominator: u32,
    pub position: Position,
}

/// `midi ch:1 program:0`, or the plain `vocal` keyword for a vocal part.
#[derive(Debug, Clone, PartialEq)]
pub struct Backend {
    pub kind: BackendKind,
    pub settings: Vec<(String, Expr)>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum BackendKind {
    Midi,
    Vocal,
}

/// A statement that may only appear in a score header or a part header.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderStmt {
    Tempo(Tempo),
    TimeSig(TimeSig),
    Backend(Backend),
    Import(Import),
    Assignment(Assignment),
}

/// Raw pitch + duration literal pair, not yet resolved into `music` types.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchLit {
    pub raw: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DurationLit {
    pub raw: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub pitch: PitchLit,
    pub duration: DurationLit,
    pub tie: bool,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chord {
    pub pitches: Vec<PitchLit>,
    pub duration: DurationLit,
    pub tie: bool,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rest {
    pub duration: DurationLit,
    pub position: Position,
}

/// A `name(args)` element appearing inside a bar, e.g. an ornament call.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementCall {
    pub call: Call,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Note(Note),
    Chord(Chord),
    Rest(Rest),
    Call(ElementCall),
}

impl Element {
    pub fn position(&self) -> Position {
        match self {
            Element::Note(n) => n.position,
            Element::Chord(c) => c.position,
            Element::Rest(r) => r.position,
            Element::Call(c) => c.call.position,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub elements: Vec<Element>,
    pub position: Position,
    /// Set by the parser's top-level resynchronisation; the evaluator skips
    /// any bar marked recovered.
    pub recovered: bool,
}

/// One lyric token: a plain word, a quoted string, or the `_` extend marker.
#[derive(Debug, Clone, PartialEq)]
pub enum LyricTok {
    Word(String),
    Quoted(String),
    Extend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LyricMode {
    Text,
    Mora,
    Phonemes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LyricLine {
    pub mode: LyricMode,
    pub tokens: Vec<LyricTok>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Phrase {
    pub bars: Vec<Bar>,
    pub lyrics: LyricLine,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartBody {
    Phrase(Phrase),
    Bar(Bar),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub name: Identifier,
    pub header: Vec<HeaderStmt>,
    pub body: Vec<PartBody>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub title: String,
    pub header: Vec<HeaderStmt>,
    pub parts: Vec<Part>,
    pub position: Position,
}
