//! # Standard Library (native modules)
//!
//! `theory.majorTriad(pitch) -> array<pitch>` and its siblings are built in
//! code, not parsed: each module is an `object` whose entries are
//! `native-function` values. Eight modules (core, time, random, transform,
//! curves, theory, drums, vocal) are bound directly into every compile's
//! root scope; the full `std:` namespace names twelve (the above eight plus
//! patterns, rhythm, dynamics, expression, articulation, ornaments,
//! notation, genres, composition, utils), addressable via
//! `import "std:<name>"`. `theory` and `curves` appear in both lists —
//! native bindings are ground truth, so an explicit `import "std:theory"`
//! just rebinds the same object the root scope already held.

use crate::error::{MfsError, Position};
use crate::music::Pitch;
use crate::value::{NativeFunction, ObjectMap, Scope, ScopeRef, Value};
use std::rc::Rc;

fn native(name: &str, f: impl Fn(&mut crate::eval::Evaluator, &[Value], Position) -> Result<Value, MfsError> + 'static) -> Value {
    Value::NativeFunction(NativeFunction {
        name: name.to_string(),
        func: Rc::new(f),
    })
}

fn pitch_arg(args: &[Value], index: usize, position: Position) -> Result<Pitch, MfsError> {
    args.get(index)
        .ok_or_else(|| MfsError::TypeError {
            expected: "pitch argument".to_string(),
            got: "missing".to_string(),
            position,
        })?
        .as_pitch(position)
}

fn int_arg(args: &[Value], index: usize, position: Position) -> Result<i64, MfsError> {
    args.get(index)
        .ok_or_else(|| MfsError::TypeError {
            expected: "int argument".to_string(),
            got: "missing".to_string(),
            position,
        })?
        .as_int(position)
}

fn int_arg_or(args: &[Value], index: usize, default: i64, position: Position) -> Result<i64, MfsError> {
    match args.get(index) {
        Some(v) => v.as_int(position),
        None => Ok(default),
    }
}

fn number_arg(args: &[Value], index: usize, position: Position) -> Result<f64, MfsError> {
    args.get(index)
        .ok_or_else(|| MfsError::TypeError {
            expected: "number argument".to_string(),
            got: "missing".to_string(),
            position,
        })?
        .as_number(position)
}

fn pitch_array(pitches: Vec<Pitch>) -> Value {
    Value::Array(pitches.into_iter().map(Value::Pitch).collect())
}

// ---------------------------------------------------------------------
// theory
// ---------------------------------------------------------------------

fn theory_module() -> Value {
    let mut obj = ObjectMap::new();
    obj.set(
        "majorTriad",
        native("theory.majorTriad", |_, args, pos| {
            let root = pitch_arg(args, 0, pos)?;
            Ok(pitch_array(vec![root, root.transpose(4), root.transpose(7)]))
        }),
    );
    obj.set(
        "minorTriad",
        native("theory.minorTriad", |_, args, pos| {
            let root = pitch_arg(args, 0, pos)?;
            Ok(pitch_array(vec![root, root.transpose(3), root.transpose(7)]))
        }),
    );
    obj.set(
        "scale",
        native("theory.scale", |_, args, pos| {
            let root = pitch_arg(args, 0, pos)?;
            let mode = args.get(1).map(|v| v.as_string(pos)).transpose()?.unwrap_or("major");
            let steps: &[i32] = match mode {
                "minor" => &[0, 2, 3, 5, 7, 8, 10],
                _ => &[0, 2, 4, 5, 7, 9, 11],
            };
            Ok(pitch_array(steps.iter().map(|s| root.transpose(*s)).collect()))
        }),
    );
    Value::Object(obj)
}

// ---------------------------------------------------------------------
// transform
// ---------------------------------------------------------------------

fn transform_module() -> Value {
    let mut obj = ObjectMap::new();
    obj.set(
        "transpose",
        native("transform.transpose", |_, args, pos| {
            let root = pitch_arg(args, 0, pos)?;
            let semitones = int_arg(args, 1, pos)? as i32;
            Ok(Value::Pitch(root.transpose(semitones)))
        }),
    );
    obj.set(
        "invert",
        native("transform.invert", |_, args, pos| {
            let pitches = args.first().ok_or_else(|| MfsError::TypeError {
                expected: "pitch array".to_string(),
                got: "missing".to_string(),
                position: pos,
            })?;
            let axis = pitch_arg(args, 1, pos)?;
            let inverted: Vec<Value> = pitches
                .as_array(pos)?
                .iter()
                .map(|v| v.as_pitch(pos).map(|p| Value::Pitch(axis.transpose(axis.midi - p.midi))))
                .collect::<Result<_, _>>()?;
            Ok(Value::Array(inverted))
        }),
    );
    obj.set(
        "retrograde",
        native("transform.retrograde", |_, args, pos| {
            let pitches = args.first().ok_or_else(|| MfsError::TypeError {
                expected: "pitch array".to_string(),
                got: "missing".to_string(),
                position: pos,
            })?;
            let mut values = pitches.as_array(pos)?.to_vec();
            values.reverse();
            Ok(Value::Array(values))
        }),
    );
    Value::Object(obj)
}

// ---------------------------------------------------------------------
// random (seeded from the score)
// ---------------------------------------------------------------------

fn random_module() -> Value {
    use rand::Rng;
    let mut obj = ObjectMap::new();
    obj.set(
        "float",
        native("random.float", |evaluator, args, pos| {
            let lo = args.first().map(|v| v.as_number(pos)).transpose()?.unwrap_or(0.0);
            let hi = args.get(1).map(|v| v.as_number(pos)).transpose()?.unwrap_or(1.0);
            Ok(Value::Number(evaluator.rng.gen_range(lo..hi)))
        }),
    );
    obj.set(
        "int",
        native("random.int", |evaluator, args, pos| {
            let lo = int_arg(args, 0, pos)?;
            let hi = int_arg(args, 1, pos)?;
            Ok(Value::Int(evaluator.rng.gen_range(lo..=hi)))
        }),
    );
    obj.set(
        "pick",
        native("random.pick", |evaluator, args, pos| {
            let items = args.first().ok_or_else(|| MfsError::TypeError {
                expected: "array".to_string(),
                got: "missing".to_string(),
                position: pos,
            })?;
            let items = items.as_array(pos)?;
            if items.is_empty() {
                return Err(MfsError::TypeError {
                    expected: "non-empty array".to_string(),
                    got: "empty array".to_string(),
                    position: pos,
                });
            }
            let index = evaluator.rng.gen_range(0..items.len());
            Ok(items[index].clone())
        }),
    );
    Value::Object(obj)
}

// ---------------------------------------------------------------------
// time
// ---------------------------------------------------------------------

fn time_module() -> Value {
    let mut obj = ObjectMap::new();
    obj.set(
        "ticks",
        native("time.ticks", |evaluator, args, pos| {
            let beats = number_arg(args, 0, pos)?;
            Ok(Value::Int((beats * evaluator.ir.ppq() as f64).round() as i64))
        }),
    );
    obj.set(
        "beats",
        native("time.beats", |evaluator, args, pos| {
            let ticks = number_arg(args, 0, pos)?;
            Ok(Value::Number(ticks / evaluator.ir.ppq() as f64))
        }),
    );
    Value::Object(obj)
}

// ---------------------------------------------------------------------
// curves
// ---------------------------------------------------------------------

fn curves_module() -> Value {
    let mut obj = ObjectMap::new();
    obj.set(
        "linear",
        native("curves.linear", |_, args, pos| {
            let from = number_arg(args, 0, pos)?;
            let to = number_arg(args, 1, pos)?;
            let steps = int_arg_or(args, 2, 4, pos)?.max(1);
            let points: Vec<Value> = (0..=steps)
                .map(|i| {
                    let t = i as f64 / steps as f64;
                    Value::Number(from + (to - from) * t)
                })
                .collect();
            Ok(Value::Array(points))
        }),
    );
    obj.set(
        "sample",
        native("curves.sample", |_, args, pos| {
            let curve = args.first().ok_or_else(|| MfsError::TypeError {
                expected: "curve".to_string(),
                got: "missing".to_string(),
                position: pos,
            })?;
            match curve {
                Value::Curve(c) => {
                    let t = number_arg(args, 1, pos)?;
                    let value = c
                        .points
                        .iter()
                        .min_by(|(a, _), (b, _)| {
                            (a.to_f64() - t).abs().partial_cmp(&(b.to_f64() - t).abs()).unwrap()
                        })
                        .map(|(_, v)| *v)
                        .unwrap_or(0.0);
                    Ok(Value::Number(value))
                }
                other => Err(MfsError::TypeError {
                    expected: "curve".to_string(),
                    got: other.kind_name().to_string(),
                    position: pos,
                }),
            }
        }),
    );
    Value::Object(obj)
}

// ---------------------------------------------------------------------
// drums (General MIDI percussion key map)
// ---------------------------------------------------------------------

fn drums_module() -> Value {
    let mut obj = ObjectMap::new();
    obj.set(
        "hit",
        native("drums.hit", |_, args, pos| {
            let name = args
                .first()
                .ok_or_else(|| MfsError::TypeError {
                    expected: "drum name".to_string(),
                    got: "missing".to_string(),
                    position: pos,
                })?
                .as_string(pos)?;
            let midi = match name {
                "kick" => 36,
                "snare" => 38,
                "closedHat" => 42,
                "openHat" => 46,
                "crash" => 49,
                "ride" => 51,
                other => {
                    return Err(MfsError::TypeError {
                        expected: "known drum name".to_string(),
                        got: other.to_string(),
                        position: pos,
                    })
                }
            };
            Ok(Value::Pitch(Pitch { midi, cents: 0 }))
        }),
    );
    Value::Object(obj)
}

// ---------------------------------------------------------------------
// vocal
// ---------------------------------------------------------------------

fn vocal_module() -> Value {
    let mut obj = ObjectMap::new();
    obj.set(
        "mora",
        native("vocal.mora", |_, args, pos| {
            let text = args
                .first()
                .ok_or_else(|| MfsError::TypeError {
                    expected: "mora text".to_string(),
                    got: "missing".to_string(),
                    position: pos,
                })?
                .as_string(pos)?;
            Ok(Value::Lyric(text.to_string()))
        }),
    );
    obj.set("extend", native("vocal.extend", |_, _, _| Ok(Value::LyricToken(crate::value::LyricToken::Extend))));
    Value::Object(obj)
}

// ---------------------------------------------------------------------
// core
// ---------------------------------------------------------------------

fn core_module() -> Value {
    let mut obj = ObjectMap::new();
    obj.set(
        "len",
        native("core.len", |_, args, pos| {
            let items = args.first().ok_or_else(|| MfsError::TypeError {
                expected: "array".to_string(),
                got: "missing".to_string(),
                position: pos,
            })?;
            Ok(Value::Int(items.as_array(pos)?.len() as i64))
        }),
    );
    obj.set(
        "concat",
        native("core.concat", |_, args, pos| {
            let mut all = Vec::new();
            for a in args {
                all.extend(a.as_array(pos)?.iter().cloned());
            }
            Ok(Value::Array(all))
        }),
    );
    Value::Object(obj)
}

// ---------------------------------------------------------------------
// The remaining std:-only modules: compact single-purpose helpers, grounded
// in the same native-function shape as the eight above but with no root
// scope binding — they are only reachable via `import "std:<name>"`.
// ---------------------------------------------------------------------

fn patterns_module() -> Value {
    let mut obj = ObjectMap::new();
    obj.set(
        "repeat",
        native("patterns.repeat", |_, args, pos| {
            let item = args.first().ok_or_else(|| MfsError::TypeError {
                expected: "value".to_string(),
                got: "missing".to_string(),
                position: pos,
            })?;
            let n = int_arg(args, 1, pos)?.max(0) as usize;
            Ok(Value::Array(std::iter::repeat(item.clone()).take(n).collect()))
        }),
    );
    Value::Object(obj)
}

fn rhythm_module() -> Value {
    let mut obj = ObjectMap::new();
    obj.set(
        "swing",
        native("rhythm.swing", |_, args, pos| {
            let ticks = int_arg(args, 0, pos)?;
            let amount = args.get(1).map(|v| v.as_number(pos)).transpose()?.unwrap_or(0.15);
            Ok(Value::Int(ticks + (ticks as f64 * amount) as i64))
        }),
    );
    Value::Object(obj)
}

fn dynamics_module() -> Value {
    let mut obj = ObjectMap::new();
    obj.set(
        "velocityFor",
        native("dynamics.velocityFor", |_, args, pos| {
            let marking = args
                .first()
                .ok_or_else(|| MfsError::TypeError {
                    expected: "dynamic marking".to_string(),
                    got: "missing".to_string(),
                    position: pos,
                })?
                .as_string(pos)?;
            let vel = match marking {
                "pp" => 24,
                "p" => 48,
                "mp" => 64,
                "mf" => 80,
                "f" => 104,
                "ff" => 120,
                _ => crate::ir::DEFAULT_VELOCITY as i64,
            };
            Ok(Value::Int(vel))
        }),
    );
    Value::Object(obj)
}

fn expression_module() -> Value {
    let mut obj = ObjectMap::new();
    obj.set(
        "crescendo",
        native("expression.crescendo", |_, args, pos| {
            let from = int_arg(args, 0, pos)?;
            let to = int_arg(args, 1, pos)?;
            let steps = int_arg_or(args, 2, 4, pos)?.max(1);
            let points: Vec<Value> = (0..=steps)
                .map(|i| Value::Int(from + (to - from) * i / steps))
                .collect();
            Ok(Value::Array(points))
        }),
    );
    Value::Object(obj)
}

fn articulation_module() -> Value {
    let mut obj = ObjectMap::new();
    obj.set(
        "staccato",
        native("articulation.staccato", |_, args, pos| {
            let dur = int_arg(args, 0, pos)?;
            Ok(Value::Int(dur / 2))
        }),
    );
    Value::Object(obj)
}

/// Descriptor-only: ornament *execution* lives in `crate::eval::ornaments`
/// since it needs direct cursor access. This module just exposes the
/// reserved names so source can introspect them (`ornaments.names()`).
fn ornaments_module() -> Value {
    let mut obj = ObjectMap::new();
    obj.set(
        "names",
        native("ornaments.names", |_, _, _| {
            Ok(Value::Array(
                crate::eval::ornaments::ORNAMENT_NAMES
                    .iter()
                    .map(|n| Value::String(n.to_string()))
                    .collect(),
            ))
        }),
    );
    Value::Object(obj)
}

fn notation_module() -> Value {
    let mut obj = ObjectMap::new();
    obj.set(
        "ticksPerBar",
        native("notation.ticksPerBar", |evaluator, args, pos| {
            let numerator = int_arg(args, 0, pos)?;
            let denominator = int_arg(args, 1, pos)?;
            let ppq = evaluator.ir.ppq();
            Ok(Value::Int(ppq * 4 * numerator / denominator))
        }),
    );
    Value::Object(obj)
}

fn genres_module() -> Value {
    let mut obj = ObjectMap::new();
    obj.set(
        "swingRatio",
        native("genres.swingRatio", |_, args, pos| {
            let name = args
                .first()
                .ok_or_else(|| MfsError::TypeError {
                    expected: "genre name".to_string(),
                    got: "missing".to_string(),
                    position: pos,
                })?
                .as_string(pos)?;
            let ratio = match name {
                "jazz" => 0.2,
                "funk" => 0.12,
                _ => 0.0,
            };
            Ok(Value::Number(ratio))
        }),
    );
    Value::Object(obj)
}

fn composition_module() -> Value {
    let mut obj = ObjectMap::new();
    obj.set(
        "stack",
        native("composition.stack", |_, args, pos| {
            let mut all = Vec::new();
            for a in args {
                all.extend(a.as_array(pos)?.iter().cloned());
            }
            Ok(Value::Array(all))
        }),
    );
    Value::Object(obj)
}

fn utils_module() -> Value {
    let mut obj = ObjectMap::new();
    obj.set(
        "clamp",
        native("utils.clamp", |_, args, pos| {
            let v = number_arg(args, 0, pos)?;
            let lo = number_arg(args, 1, pos)?;
            let hi = number_arg(args, 2, pos)?;
            Ok(Value::Number(v.clamp(lo, hi)))
        }),
    );
    Value::Object(obj)
}

/// The eight modules bound directly into every compile's root scope.
pub fn install_native_modules(scope: &ScopeRef) {
    let mut s = scope.borrow_mut();
    s.define("core", core_module(), false);
    s.define("time", time_module(), false);
    s.define("random", random_module(), false);
    s.define("transform", transform_module(), false);
    s.define("curves", curves_module(), false);
    s.define("theory", theory_module(), false);
    s.define("drums", drums_module(), false);
    s.define("vocal", vocal_module(), false);
}

/// Build a fresh root scope pre-seeded with the eight native modules. Used
/// once per compile.
pub fn build_native_root() -> ScopeRef {
    let root = Scope::root();
    install_native_modules(&root);
    root
}

/// Construct the named `std:` module by value. Covers all twelve importable
/// names, including the two (`theory`, `curves`) that overlap with the
/// natively-bound root scope modules.
pub fn std_module(name: &str) -> Option<Value> {
    Some(match name {
        "theory" => theory_module(),
        "patterns" => patterns_module(),
        "rhythm" => rhythm_module(),
        "dynamics" => dynamics_module(),
        "expression" => expression_module(),
        "articulation" => articulation_module(),
        "ornaments" => ornaments_module(),
        "notation" => notation_module(),
        "genres" => genres_module(),
        "composition" => composition_module(),
        "curves" => curves_module(),
        "utils" => utils_module(),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Scope;

    fn pos() -> Position {
        Position::start()
    }

    fn evaluator() -> crate::eval::Evaluator {
        crate::eval::Evaluator::new(None, 0, Scope::root())
    }

    #[test]
    fn major_triad_applies_0_4_7() {
        let mut ev = evaluator();
        let module = theory_module();
        let f = match module {
            Value::Object(obj) => obj.get("majorTriad").cloned().unwrap(),
            _ => unreachable!(),
        };
        let root = Pitch::parse("C4", pos()).unwrap();
        let result = match f {
            Value::NativeFunction(nf) => (nf.func)(&mut ev, &[Value::Pitch(root)], pos()).unwrap(),
            _ => unreachable!(),
        };
        match result {
            Value::Array(pitches) => {
                assert_eq!(pitches.len(), 3);
                assert_eq!(pitches[1].as_pitch(pos()).unwrap().midi, 64);
            }
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn random_int_is_seed_deterministic() {
        let mut a = crate::eval::Evaluator::new(None, 42, Scope::root());
        let mut b = crate::eval::Evaluator::new(None, 42, Scope::root());
        let module = random_module();
        let f = match &module {
            Value::Object(obj) => obj.get("int").cloned().unwrap(),
            _ => unreachable!(),
        };
        let nf = match f {
            Value::NativeFunction(nf) => nf,
            _ => unreachable!(),
        };
        let args = [Value::Int(0), Value::Int(100)];
        let ra = (nf.func)(&mut a, &args, pos()).unwrap();
        let rb = (nf.func)(&mut b, &args, pos()).unwrap();
        assert_eq!(ra, rb);
    }

    #[test]
    fn install_native_modules_binds_all_eight() {
        let root = Scope::root();
        install_native_modules(&root);
        for name in ["core", "time", "random", "transform", "curves", "theory", "drums", "vocal"] {
            assert!(root.borrow().defined_locally(name), "missing {name}");
        }
    }

    #[test]
    fn std_module_covers_all_twelve_names() {
        for name in crate::resolver::STD_MODULES {
            assert!(std_module(name).is_some(), "missing std module {name}");
        }
    }
}
