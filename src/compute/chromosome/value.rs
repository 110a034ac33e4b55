//! Primitive literal values and their mutation.

use std::fmt;

use crate::compute::evolution::SearchRng;
use crate::schema::{ConstantDescriptor, FloatTy, IntTy, Prim, PrimitiveConfig, Type, UintTy};

/// Probability of each per-character string edit.
const P_STRING_EDIT: f64 = 0.33;

/// A literal of a primitive type.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimValue {
    Bool(bool),
    Char(char),
    Str(String),
    Int(IntTy, i128),
    Uint(UintTy, u128),
    Float(FloatTy, f64),
}

impl PrimValue {
    /// Sample a fresh value of `prim`.
    pub fn random(prim: Prim, config: &PrimitiveConfig, rng: &mut SearchRng) -> Self {
        let max_int = config.max_int as i128;
        match prim {
            Prim::Bool => PrimValue::Bool(rng.chance(0.5)),
            Prim::Char => PrimValue::Char(rng.alpha_char()),
            Prim::Str => {
                let len = rng.index(config.max_string_length + 1);
                PrimValue::Str((0..len).map(|_| rng.alpha_char()).collect())
            }
            Prim::Int(width) => {
                let (low, high) = width.bounds();
                let value = rng.range_i128((-max_int).max(low), max_int.min(high));
                PrimValue::Int(width, value)
            }
            Prim::Uint(width) => {
                let high = (config.max_int as u128).min(width.max());
                PrimValue::Uint(width, rng.range_u128(0, high))
            }
            Prim::Float(width) => {
                let bound = config.max_int as f64;
                let value = if bound > 0.0 {
                    rng.range_f64(-bound, bound)
                } else {
                    0.0
                };
                PrimValue::Float(width, narrow(width, value))
            }
        }
    }

    /// Convert a harvested constant, clamping integers into their width.
    pub fn from_constant(constant: &ConstantDescriptor) -> Option<Self> {
        let prim = match constant.ty.deref() {
            Type::Prim(prim) => *prim,
            _ => return None,
        };
        let val = &constant.val;
        let text = val.as_str().map(str::to_string).unwrap_or_else(|| val.to_string());
        match prim {
            Prim::Bool => val
                .as_bool()
                .or_else(|| text.parse().ok())
                .map(PrimValue::Bool),
            Prim::Char => text.chars().next().map(PrimValue::Char),
            Prim::Str => Some(PrimValue::Str(text)),
            Prim::Int(width) => {
                let (low, high) = width.bounds();
                let value: i128 = text.trim().parse().ok()?;
                Some(PrimValue::Int(width, value.clamp(low, high)))
            }
            Prim::Uint(width) => {
                let value: u128 = text.trim().parse().ok()?;
                Some(PrimValue::Uint(width, value.min(width.max())))
            }
            Prim::Float(width) => {
                let value: f64 = text.trim().parse().ok()?;
                value.is_finite().then(|| PrimValue::Float(width, narrow(width, value)))
            }
        }
    }

    pub fn prim(&self) -> Prim {
        match self {
            PrimValue::Bool(_) => Prim::Bool,
            PrimValue::Char(_) => Prim::Char,
            PrimValue::Str(_) => Prim::Str,
            PrimValue::Int(width, _) => Prim::Int(*width),
            PrimValue::Uint(width, _) => Prim::Uint(*width),
            PrimValue::Float(width, _) => Prim::Float(*width),
        }
    }

    /// Type of the variable holding this literal; strings are `&str`.
    pub fn ty(&self) -> Type {
        match self {
            PrimValue::Str(_) => Type::str_ref(),
            other => Type::Prim(other.prim()),
        }
    }

    /// Resample with probability `p_random_perturbation`, otherwise apply a small delta.
    pub fn mutate(&mut self, config: &PrimitiveConfig, rng: &mut SearchRng) {
        if rng.chance(config.p_random_perturbation) {
            *self = PrimValue::random(self.prim(), config, rng);
            return;
        }
        let max_delta = config.max_delta;
        match self {
            PrimValue::Bool(b) => *b = !*b,
            PrimValue::Char(c) => {
                let span = max_delta.max(1.0);
                let delta = rng.range_f64(-span, span).floor() as i64;
                let code = (*c as i64 + delta).clamp(0, char::MAX as i64) as u32;
                if let Some(next) = char::from_u32(code) {
                    *c = next;
                }
            }
            PrimValue::Str(s) => *s = mutate_string(s, config.max_string_length, rng),
            PrimValue::Int(width, value) => {
                let (low, high) = width.bounds();
                let delta = (rng.gaussian() * max_delta).floor() as i128;
                *value = value.saturating_add(delta).clamp(low, high);
            }
            PrimValue::Uint(width, value) => {
                let delta = (rng.gaussian() * max_delta).floor() as i128;
                let next = if delta < 0 {
                    value.saturating_sub(delta.unsigned_abs())
                } else {
                    value.saturating_add(delta as u128)
                };
                *value = next.min(UintTy::max(*width));
            }
            PrimValue::Float(width, value) => {
                *value = narrow(*width, *value + rng.gaussian() * max_delta);
            }
        }
    }
}

fn narrow(width: FloatTy, value: f64) -> f64 {
    match width {
        FloatTy::F32 => value as f32 as f64,
        FloatTy::F64 => value,
    }
}

/// Per-character replace, remove or insert edits.
fn mutate_string(value: &str, max_len: usize, rng: &mut SearchRng) -> String {
    let mut chars: Vec<char> = value.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if rng.chance(P_STRING_EDIT) {
            chars[i] = rng.alpha_char();
            i += 1;
        } else if rng.chance(P_STRING_EDIT) {
            chars.remove(i);
        } else if rng.chance(P_STRING_EDIT) && chars.len() < max_len {
            chars.insert(i, rng.alpha_char());
            i += 2;
        } else {
            i += 1;
        }
    }
    if chars.is_empty() && max_len > 0 && rng.chance(P_STRING_EDIT) {
        chars.push(rng.alpha_char());
    }
    chars.into_iter().collect()
}

impl fmt::Display for PrimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimValue::Bool(b) => write!(f, "{b}"),
            PrimValue::Char(c) => write!(f, "{c:?}"),
            PrimValue::Str(s) => write!(f, "{s:?}"),
            PrimValue::Int(width, v) => write!(f, "{v}{}", width.keyword()),
            PrimValue::Uint(width, v) => write!(f, "{v}{}", width.keyword()),
            PrimValue::Float(width, v) => write!(f, "{v:?}{}", width.keyword()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_values_respect_width() {
        let config = PrimitiveConfig {
            max_int: 100_000,
            ..PrimitiveConfig::default()
        };
        let mut rng = SearchRng::new(5);
        for _ in 0..200 {
            match PrimValue::random(Prim::Int(IntTy::I8), &config, &mut rng) {
                PrimValue::Int(_, v) => assert!((-128..=127).contains(&v)),
                other => panic!("unexpected value {other:?}"),
            }
            match PrimValue::random(Prim::Uint(UintTy::U8), &config, &mut rng) {
                PrimValue::Uint(_, v) => assert!(v <= 255),
                other => panic!("unexpected value {other:?}"),
            }
        }
    }

    #[test]
    fn test_mutation_keeps_kind_and_bounds() {
        let config = PrimitiveConfig::default();
        let mut rng = SearchRng::new(9);
        let mut value = PrimValue::Uint(UintTy::U8, 250);
        for _ in 0..200 {
            value.mutate(&config, &mut rng);
            match value {
                PrimValue::Uint(UintTy::U8, v) => assert!(v <= 255),
                ref other => panic!("unexpected value {other:?}"),
            }
        }
    }

    #[test]
    fn test_string_mutation_respects_max_length() {
        let mut rng = SearchRng::new(2);
        let mut s = "hello".to_string();
        for _ in 0..100 {
            s = mutate_string(&s, 8, &mut rng);
            assert!(s.chars().count() <= 8);
        }
    }

    #[test]
    fn test_display_renders_suffixed_literals() {
        assert_eq!(PrimValue::Int(IntTy::I32, -5).to_string(), "-5i32");
        assert_eq!(PrimValue::Uint(UintTy::Usize, 3).to_string(), "3usize");
        assert_eq!(PrimValue::Float(FloatTy::F64, 1.0).to_string(), "1.0f64");
        assert_eq!(PrimValue::Str("a\"b".into()).to_string(), "\"a\\\"b\"");
        assert_eq!(PrimValue::Char('x').to_string(), "'x'");
    }

    #[test]
    fn test_constants_are_clamped() {
        let constant = ConstantDescriptor {
            val: serde_json::json!(300),
            ty: Type::Prim(Prim::Uint(UintTy::U8)),
        };
        assert_eq!(
            PrimValue::from_constant(&constant),
            Some(PrimValue::Uint(UintTy::U8, 255))
        );
        let text = ConstantDescriptor {
            val: serde_json::json!("-7"),
            ty: Type::Prim(Prim::Int(IntTy::I16)),
        };
        assert_eq!(
            PrimValue::from_constant(&text),
            Some(PrimValue::Int(IntTy::I16, -7))
        );
        let s = ConstantDescriptor {
            val: serde_json::json!("key"),
            ty: Type::str_ref(),
        };
        assert_eq!(PrimValue::from_constant(&s), Some(PrimValue::Str("key".into())));
    }

    #[test]
    fn test_string_literal_is_a_str_reference() {
        assert_eq!(PrimValue::Str("x".into()).ty(), Type::str_ref());
        assert_eq!(PrimValue::Bool(true).ty(), Type::Prim(Prim::Bool));
    }
}
