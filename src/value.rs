//! # Value & Scope Model (C4)
//!
//! Runtime values are a closed tagged union; every built-in pattern-matches
//! on the tag and rejects unexpected variants with a `TypeError`. Values are
//! immutable once constructed except for `array`/`object` contents that
//! native functions mutate explicitly during score construction (e.g.
//! pushing events onto a clip).

use crate::error::{MfsError, Position};
use crate::music::{DurationSpec, Pitch, Rat};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A single lyric token as produced by phrase lyric alignment.
#[derive(Debug, Clone, PartialEq)]
pub enum LyricToken {
    Word(String),
    Extend,
}

/// An automation curve: a sequence of `(position-in-beats, value)` control
/// points, sampled by the `curves` stdlib module when emitting `cc` /
/// `pitchBend` events.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    pub points: Vec<(Rat, f64)>,
}

/// A reusable, named sequence of already-built note/rest values, as produced
/// by `composition`/`patterns` helpers that assemble fragments before they
/// are spliced into a track.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub events: Vec<Value>,
}

/// An insertion-order-preserving string-keyed map, used for `object` values
/// and stdlib module namespaces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectMap {
    entries: Vec<(String, Value)>,
}

impl ObjectMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert or overwrite `key`, preserving the original position on overwrite.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A built-in function implemented in Rust. Takes the evaluator (for IR/track
/// access and diagnostics) and the already-evaluated argument list.
pub type NativeFn =
    Rc<dyn Fn(&mut crate::eval::Evaluator, &[Value], Position) -> Result<Value, MfsError>>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub func: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Rc::ptr_eq(&self.func, &other.func)
    }
}

/// A user-defined function closure. The source language has no literal
/// function-definition syntax (only `Call`/`Assignment`); values of this
/// kind are produced exclusively by stdlib composition helpers that curry or
/// partially apply a native function.
#[derive(Clone)]
pub struct UserFunction {
    pub params: Vec<String>,
    pub body: Rc<crate::ast::Expr>,
    pub closure: ScopeRef,
}

impl fmt::Debug for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserFunction({:?})", self.params)
    }
}

impl PartialEq for UserFunction {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params && Rc::ptr_eq(&self.body, &other.body)
    }
}

/// The closed tagged union of every runtime value kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Number(f64),
    Rat(Rat),
    String(String),
    Pitch(Pitch),
    Duration(DurationSpec),
    Array(Vec<Value>),
    Object(ObjectMap),
    Lyric(String),
    LyricToken(LyricToken),
    Clip(Clip),
    Curve(Curve),
    Pos(Rat),
    NativeFunction(NativeFunction),
    UserFunction(UserFunction),
}

impl Value {
    /// Human-readable kind name, used in `TypeError` diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Number(_) => "number",
            Value::Rat(_) => "rat",
            Value::String(_) => "string",
            Value::Pitch(_) => "pitch",
            Value::Duration(_) => "duration",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Lyric(_) => "lyric",
            Value::LyricToken(_) => "lyric-token",
            Value::Clip(_) => "clip",
            Value::Curve(_) => "curve",
            Value::Pos(_) => "pos",
            Value::NativeFunction(_) => "native-function",
            Value::UserFunction(_) => "user-function",
        }
    }

    pub fn as_int(&self, position: Position) -> Result<i64, MfsError> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(MfsError::TypeError {
                expected: "int".to_string(),
                got: other.kind_name().to_string(),
                position,
            }),
        }
    }

    pub fn as_number(&self, position: Position) -> Result<f64, MfsError> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Number(n) => Ok(*n),
            Value::Rat(r) => Ok(r.to_f64()),
            other => Err(MfsError::TypeError {
                expected: "number".to_string(),
                got: other.kind_name().to_string(),
                position,
            }),
        }
    }

    pub fn as_pitch(&self, position: Position) -> Result<Pitch, MfsError> {
        match self {
            Value::Pitch(p) => Ok(*p),
            other => Err(MfsError::TypeError {
                expected: "pitch".to_string(),
                got: other.kind_name().to_string(),
                position,
            }),
        }
    }

    pub fn as_string(&self, position: Position) -> Result<&str, MfsError> {
        match self {
            Value::String(s) => Ok(s.as_str()),
            other => Err(MfsError::TypeError {
                expected: "string".to_string(),
                got: other.kind_name().to_string(),
                position,
            }),
        }
    }

    pub fn as_array(&self, position: Position) -> Result<&[Value], MfsError> {
        match self {
            Value::Array(items) => Ok(items.as_slice()),
            other => Err(MfsError::TypeError {
                expected: "array".to_string(),
                got: other.kind_name().to_string(),
                position,
            }),
        }
    }
}

struct Binding {
    value: Value,
    mutable: bool,
}

/// A lexical scope: name -> binding, with a parent pointer. Lookups walk the
/// parent chain; `define` always writes to the innermost scope.
pub struct Scope {
    bindings: std::collections::HashMap<String, Binding>,
    parent: Option<ScopeRef>,
}

/// Shared handle to a `Scope`. Scopes are reference-counted rather than
/// owned by the evaluator directly so that closures captured by
/// `UserFunction` values can outlive the statement that created them.
pub type ScopeRef = Rc<RefCell<Scope>>;

impl Scope {
    pub fn root() -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            bindings: std::collections::HashMap::new(),
            parent: None,
        }))
    }

    pub fn child(parent: &ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            bindings: std::collections::HashMap::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }

    /// Define `name` in this scope. Re-defining a name already present in
    /// *this* scope as immutable is an internal error: the evaluator should
    /// have checked via `lookup` before calling `define` a second time.
    pub fn define(&mut self, name: impl Into<String>, value: Value, mutable: bool) {
        self.bindings.insert(name.into(), Binding { value, mutable });
    }

    /// Reassign an existing binding. Fails if the name is undefined in the
    /// visible chain or was defined immutable.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), String> {
        if let Some(binding) = self.bindings.get_mut(name) {
            if !binding.mutable {
                return Err(format!("cannot reassign immutable binding '{name}'"));
            }
            binding.value = value;
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.borrow_mut().assign(name, value),
            None => Err(format!("undefined name '{name}'")),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(binding) = self.bindings.get(name) {
            return Some(binding.value.clone());
        }
        self.parent.as_ref().and_then(|p| p.borrow().lookup(name))
    }

    /// Whether `name` is defined in this scope specifically (not an ancestor).
    pub fn defined_locally(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Bindings defined directly in this scope (not the parent chain). Used
    /// to collect a relatively-imported file's top-level definitions so they
    /// can be merged into the importing scope.
    pub fn local_bindings(&self) -> Vec<(String, Value)> {
        self.bindings.iter().map(|(k, b)| (k.clone(), b.value.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_scope_sees_parent_bindings() {
        let root = Scope::root();
        root.borrow_mut().define("x", Value::Int(1), false);
        let child = Scope::child(&root);
        assert_eq!(child.borrow().lookup("x"), Some(Value::Int(1)));
    }

    #[test]
    fn define_shadows_in_child_without_touching_parent() {
        let root = Scope::root();
        root.borrow_mut().define("x", Value::Int(1), false);
        let child = Scope::child(&root);
        child.borrow_mut().define("x", Value::Int(2), false);
        assert_eq!(child.borrow().lookup("x"), Some(Value::Int(2)));
        assert_eq!(root.borrow().lookup("x"), Some(Value::Int(1)));
    }

    #[test]
    fn assign_rejects_immutable_binding() {
        let root = Scope::root();
        root.borrow_mut().define("x", Value::Int(1), false);
        let err = root.borrow_mut().assign("x", Value::Int(2)).unwrap_err();
        assert!(err.contains("immutable"));
    }

    #[test]
    fn assign_through_parent_chain() {
        let root = Scope::root();
        root.borrow_mut().define("x", Value::Int(1), true);
        let child = Scope::child(&root);
        child.borrow_mut().assign("x", Value::Int(9)).unwrap();
        assert_eq!(root.borrow().lookup("x"), Some(Value::Int(9)));
    }

    #[test]
    fn object_map_preserves_insertion_order() {
        let mut obj = ObjectMap::new();
        obj.set("b", Value::Int(2));
        obj.set("a", Value::Int(1));
        let keys: Vec<&str> = obj.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }
}
