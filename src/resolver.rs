//! # Module Resolver (C3)
//!
//! Resolves `import "X"` statements two ways: `std:*` names look up a fixed
//! standard-library table; anything else resolves relative to the importing
//! file's directory. A stack of currently-resolving absolute paths detects
//! import cycles; completed files are memoised by absolute path so a file
//! imported twice is only parsed and evaluated once per compile.

use crate::error::{ImportErrorKind, MfsError};
use crate::value::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The fixed `std:` namespace (§6). Each entry names a stdlib module
/// constructed natively in `crate::stdlib` — there is no on-disk file to
/// resolve to, but callers may still want the nominal path for diagnostics,
/// which is why `std_module_path` returns a synthetic `std:<name>` path
/// rather than `None`.
pub const STD_MODULES: [&str; 12] = [
    "theory",
    "patterns",
    "rhythm",
    "dynamics",
    "expression",
    "articulation",
    "ornaments",
    "notation",
    "genres",
    "composition",
    "curves",
    "utils",
];

pub fn is_std_module(name: &str) -> bool {
    STD_MODULES.contains(&name)
}

/// `isStdlib("std:theory")` => true, `isStdlib("./x.mf")` => false.
pub fn is_stdlib_import(path: &str) -> bool {
    path.starts_with("std:")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedModule {
    /// A native standard-library module; evaluated by binding to
    /// `crate::stdlib`'s in-code table rather than by reading a file.
    Std(String),
    /// A `.mf` file on disk, resolved to an absolute path.
    File(PathBuf),
}

/// Tracks the currently-resolving import chain (for cycle detection) and a
/// cache of already-resolved file imports, keyed by absolute path. The cache
/// holds the file's evaluated top-level scope (its `local_bindings()`), not
/// just a visited marker, so a second import of the same file still yields
/// usable bindings instead of a silent no-op. Discarded between compiles,
/// per the single-threaded synchronous resource model.
#[derive(Default)]
pub struct Resolver {
    resolving: Vec<PathBuf>,
    cache: HashMap<PathBuf, Vec<(String, Value)>>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `import_path` (the raw string after `import`) relative to
    /// `importing_dir` (the directory of the file containing the import).
    pub fn resolve(
        &self,
        import_path: &str,
        importing_dir: &Path,
    ) -> Result<ResolvedModule, MfsError> {
        if let Some(name) = import_path.strip_prefix("std:") {
            if is_std_module(name) {
                return Ok(ResolvedModule::Std(name.to_string()));
            }
            return Err(MfsError::ImportError {
                kind: ImportErrorKind::UnknownStdModule,
                message: format!("unknown standard library module '{name}'"),
                chain: Vec::new(),
            });
        }

        let candidate = importing_dir.join(import_path);
        if !candidate.exists() {
            return Err(MfsError::ImportError {
                kind: ImportErrorKind::FileNotFound,
                message: format!("import target not found: {}", candidate.display()),
                chain: Vec::new(),
            });
        }
        let absolute = candidate.canonicalize().unwrap_or(candidate);
        Ok(ResolvedModule::File(absolute))
    }

    /// Push `path` onto the resolving stack, failing with
    /// `ImportError(Cycle, chain)` if it's already present.
    pub fn enter(&mut self, path: &Path) -> Result<(), MfsError> {
        if let Some(idx) = self.resolving.iter().position(|p| p == path) {
            let mut chain: Vec<String> = self.resolving[idx..]
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            chain.push(path.display().to_string());
            return Err(MfsError::ImportError {
                kind: ImportErrorKind::Cycle,
                message: format!("import cycle detected: {}", chain.join(" -> ")),
                chain,
            });
        }
        self.resolving.push(path.to_path_buf());
        Ok(())
    }

    /// Pop `path` off the resolving stack once it has been fully evaluated.
    pub fn leave(&mut self, path: &Path) {
        self.resolving.retain(|p| p != path);
    }

    /// Record `path`'s evaluated top-level bindings so a later import of the
    /// same file can replay them instead of re-reading and re-evaluating it.
    pub fn cache_bindings(&mut self, path: PathBuf, bindings: Vec<(String, Value)>) {
        self.cache.insert(path, bindings);
    }

    /// The cached bindings for `path`, if it was imported earlier in this
    /// compile.
    pub fn cached_bindings(&self, path: &Path) -> Option<&Vec<(String, Value)>> {
        self.cache.get(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdlib_detection() {
        assert!(is_stdlib_import("std:theory"));
        assert!(!is_stdlib_import("./x.mf"));
    }

    #[test]
    fn resolve_known_std_module() {
        let resolver = Resolver::new();
        let resolved = resolver.resolve("std:theory", Path::new(".")).unwrap();
        assert_eq!(resolved, ResolvedModule::Std("theory".to_string()));
    }

    #[test]
    fn resolve_unknown_std_module_fails() {
        let resolver = Resolver::new();
        let err = resolver.resolve("std:nonexistent", Path::new(".")).unwrap_err();
        assert!(matches!(
            err,
            MfsError::ImportError {
                kind: ImportErrorKind::UnknownStdModule,
                ..
            }
        ));
    }

    #[test]
    fn resolve_missing_file_fails() {
        let resolver = Resolver::new();
        let err = resolver
            .resolve("./does-not-exist.mf", Path::new("."))
            .unwrap_err();
        assert!(matches!(
            err,
            MfsError::ImportError {
                kind: ImportErrorKind::FileNotFound,
                ..
            }
        ));
    }

    #[test]
    fn cycle_detection() {
        let mut resolver = Resolver::new();
        let a = PathBuf::from("/tmp/a.mf");
        let b = PathBuf::from("/tmp/b.mf");
        resolver.enter(&a).unwrap();
        resolver.enter(&b).unwrap();
        let err = resolver.enter(&a).unwrap_err();
        match err {
            MfsError::ImportError {
                kind: ImportErrorKind::Cycle,
                chain,
                ..
            } => assert_eq!(chain.len(), 3),
            _ => panic!("expected cycle error"),
        }
    }

    #[test]
    fn leave_allows_reentry() {
        let mut resolver = Resolver::new();
        let a = PathBuf::from("/tmp/a.mf");
        resolver.enter(&a).unwrap();
        resolver.leave(&a);
        resolver.enter(&a).unwrap();
    }

    #[test]
    fn cache_bindings_round_trip() {
        let mut resolver = Resolver::new();
        let a = PathBuf::from("/tmp/a.mf");
        assert!(resolver.cached_bindings(&a).is_none());
        resolver.cache_bindings(a.clone(), vec![("x".to_string(), Value::Int(1))]);
        let cached = resolver.cached_bindings(&a).unwrap();
        assert_eq!(cached, &vec![("x".to_string(), Value::Int(1))]);
    }
}
