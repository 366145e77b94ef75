//! # Public API
//!
//! [`compile`] is the single entry point the rest of the toolchain (CLI,
//! file-watch loop, renderer plugins) drives: a pure function from a root
//! `.mf` file path to `{ ir, diagnostics }`. A compile never panics on
//! malformed input — parse/lex/evaluation failures are folded into
//! `diagnostics`, and `ir` is `None` whenever any of them is error-severity.

use crate::error::Diagnostic;
use crate::eval;
use crate::ir::ScoreIr;
use crate::lexer::Lexer;
use crate::parser;
use crate::stdlib;
use std::path::Path;

/// The result of one compile: the finished IR, if nothing fatal went wrong,
/// plus every diagnostic collected along the way.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CompileResult {
    pub ir: Option<ScoreIr>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Compile the `.mf` file at `root_file_path`, resolving relative imports
/// against `base_dir`. Random number generation inside `random` is seeded
/// from the score's own `seed` assignment if present, otherwise `0`, so two
/// compiles of identical source always produce identical IR.
pub fn compile(root_file_path: &Path, base_dir: &Path) -> CompileResult {
    let source = match std::fs::read_to_string(root_file_path) {
        Ok(s) => s,
        Err(e) => {
            return CompileResult {
                ir: None,
                diagnostics: vec![Diagnostic::error(
                    "file_not_found",
                    format!("failed to read {}: {e}", root_file_path.display()),
                    None,
                )
                .with_file(root_file_path.display().to_string())],
            }
        }
    };
    compile_source(&source, base_dir)
}

/// Compile already-loaded source text. Used by `compile` and directly by
/// callers (tests, editor integrations) that already hold the text in
/// memory and don't want a filesystem round-trip.
pub fn compile_source(source: &str, base_dir: &Path) -> CompileResult {
    let tokens = match Lexer::new(source).tokenize() {
        Ok(t) => t,
        Err(e) => {
            return CompileResult {
                ir: None,
                diagnostics: vec![Diagnostic::from_error(&e)],
            }
        }
    };

    let (score, parse_errors) = match parser::parse(tokens) {
        Ok(r) => r,
        Err(e) => {
            return CompileResult {
                ir: None,
                diagnostics: vec![Diagnostic::from_error(&e)],
            }
        }
    };

    let seed = score_seed(&score);
    let native_root = stdlib::build_native_root();
    let (ir, mut diagnostics) = eval::evaluate_score(&score, base_dir, seed, &native_root);
    diagnostics.splice(0..0, parse_errors.iter().map(Diagnostic::from_error));

    let has_error = diagnostics.iter().any(|d| d.severity == crate::error::Severity::Error);
    CompileResult {
        ir: if has_error { None } else { ir },
        diagnostics,
    }
}

/// `seed = <int>` at the score header, or `0` if absent. Read directly off
/// the AST rather than the scope, since it must be known before the
/// evaluator (and its RNG) are constructed.
fn score_seed(score: &crate::ast::Score) -> u64 {
    for stmt in &score.header {
        if let crate::ast::HeaderStmt::Assignment(a) = stmt {
            if a.name.name == "seed" {
                if let crate::ast::Expr::Literal(crate::ast::Literal::Int(n)) = &a.value {
                    return *n as u64;
                }
            }
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn simple_midi_bar_compiles() {
        let source = r#"score "Test" { tempo 120 time 4/4 part Piano { midi ch:1 program:0 | C4 q D4 q E4 q F4 q | } }"#;
        let result = compile_source(source, Path::new("."));
        assert!(result.diagnostics.iter().all(|d| d.severity != crate::error::Severity::Error));
        let ir = result.ir.unwrap();
        assert_eq!(ir.ppq, 480);
        assert_eq!(ir.tempos[0].bpm, 120.0);
        assert_eq!(ir.tracks[0].events.len(), 4);
    }

    #[test]
    fn seed_defaults_to_zero() {
        let score = crate::ast::Score {
            title: "T".to_string(),
            header: vec![],
            parts: vec![],
            position: crate::error::Position::start(),
        };
        assert_eq!(score_seed(&score), 0);
    }
}
