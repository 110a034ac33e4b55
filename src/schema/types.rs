//! Type model for the program under test.
//!
//! Types are loaded once from the catalog and never mutated afterwards;
//! binding generics always produces a fresh [`Type`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Trait bound that every generic parameter satisfies implicitly.
pub const SIZED: &str = "std::marker::Sized";

/// Signed integer widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntTy {
    Isize,
    I8,
    I16,
    I32,
    I64,
    I128,
}

impl IntTy {
    pub const ALL: [IntTy; 6] = [
        IntTy::Isize,
        IntTy::I8,
        IntTy::I16,
        IntTy::I32,
        IntTy::I64,
        IntTy::I128,
    ];

    /// Inclusive value range of this width.
    pub fn bounds(self) -> (i128, i128) {
        match self {
            IntTy::Isize | IntTy::I64 => (i64::MIN as i128, i64::MAX as i128),
            IntTy::I8 => (i8::MIN as i128, i8::MAX as i128),
            IntTy::I16 => (i16::MIN as i128, i16::MAX as i128),
            IntTy::I32 => (i32::MIN as i128, i32::MAX as i128),
            IntTy::I128 => (i128::MIN, i128::MAX),
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            IntTy::Isize => "isize",
            IntTy::I8 => "i8",
            IntTy::I16 => "i16",
            IntTy::I32 => "i32",
            IntTy::I64 => "i64",
            IntTy::I128 => "i128",
        }
    }
}

/// Unsigned integer widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UintTy {
    Usize,
    U8,
    U16,
    U32,
    U64,
    U128,
}

impl UintTy {
    pub const ALL: [UintTy; 6] = [
        UintTy::Usize,
        UintTy::U8,
        UintTy::U16,
        UintTy::U32,
        UintTy::U64,
        UintTy::U128,
    ];

    /// Largest representable value.
    pub fn max(self) -> u128 {
        match self {
            UintTy::Usize | UintTy::U64 => u64::MAX as u128,
            UintTy::U8 => u8::MAX as u128,
            UintTy::U16 => u16::MAX as u128,
            UintTy::U32 => u32::MAX as u128,
            UintTy::U128 => u128::MAX,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            UintTy::Usize => "usize",
            UintTy::U8 => "u8",
            UintTy::U16 => "u16",
            UintTy::U32 => "u32",
            UintTy::U64 => "u64",
            UintTy::U128 => "u128",
        }
    }
}

/// Floating point widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FloatTy {
    F32,
    F64,
}

impl FloatTy {
    pub fn keyword(self) -> &'static str {
        match self {
            FloatTy::F32 => "f32",
            FloatTy::F64 => "f64",
        }
    }
}

/// Primitive types. `Str` stands for the string slice behind `&str`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Prim {
    Bool,
    Char,
    Str,
    Int(IntTy),
    Uint(UintTy),
    Float(FloatTy),
}

const NUMERIC_TRAITS: &[&str] = &[
    "std::marker::Copy",
    "std::clone::Clone",
    "std::hash::Hash",
    "std::cmp::Ord",
    "std::cmp::PartialOrd",
    "std::cmp::Eq",
    "std::cmp::PartialEq",
    "std::default::Default",
    "std::fmt::Debug",
];

const FLOAT_TRAITS: &[&str] = &[
    "std::marker::Copy",
    "std::clone::Clone",
    "std::cmp::PartialOrd",
    "std::cmp::PartialEq",
    "std::default::Default",
    "std::fmt::Debug",
];

const STR_TRAITS: &[&str] = &[
    "std::hash::Hash",
    "std::cmp::Ord",
    "std::cmp::PartialOrd",
    "std::cmp::Eq",
    "std::cmp::PartialEq",
    "std::default::Default",
    "std::fmt::Debug",
];

impl Prim {
    /// Every primitive the generators can produce.
    pub fn all() -> Vec<Prim> {
        let mut prims = vec![Prim::Bool, Prim::Char, Prim::Str];
        prims.extend(IntTy::ALL.iter().map(|&i| Prim::Int(i)));
        prims.extend(UintTy::ALL.iter().map(|&u| Prim::Uint(u)));
        prims.push(Prim::Float(FloatTy::F32));
        prims.push(Prim::Float(FloatTy::F64));
        prims
    }

    /// Built-in trait set of this primitive.
    pub fn implemented_traits(self) -> &'static [&'static str] {
        match self {
            Prim::Float(_) => FLOAT_TRAITS,
            Prim::Str => STR_TRAITS,
            _ => NUMERIC_TRAITS,
        }
    }

    pub fn implements(self, trait_name: &str) -> bool {
        trait_name == SIZED || self.implemented_traits().contains(&trait_name)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Prim::Bool => "bool",
            Prim::Char => "char",
            Prim::Str => "str",
            Prim::Int(i) => i.keyword(),
            Prim::Uint(u) => u.keyword(),
            Prim::Float(f) => f.keyword(),
        }
    }
}

/// A named trait, optionally with generic arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Trait {
    pub name: String,
    #[serde(default)]
    pub generics: Vec<Type>,
    #[serde(default)]
    pub associated_types: Vec<AssociatedType>,
}

impl Trait {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generics: Vec::new(),
            associated_types: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssociatedType {
    pub name: String,
    pub ty: Type,
}

/// A generic parameter with its trait bounds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Generic {
    pub name: String,
    #[serde(default)]
    pub bounds: Vec<Trait>,
}

impl Generic {
    pub fn new(name: impl Into<String>, bounds: Vec<Trait>) -> Self {
        Self {
            name: name.into(),
            bounds,
        }
    }

    /// Bounds that actually constrain the choice of a concrete type.
    pub fn effective_bounds(&self) -> Vec<&Trait> {
        self.bounds.iter().filter(|b| b.name != SIZED).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructType {
    pub name: String,
    #[serde(default)]
    pub generics: Vec<Type>,
    #[serde(default)]
    pub is_local: bool,
}

/// Enum type. Equality ignores the variant list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumType {
    pub name: String,
    #[serde(default)]
    pub generics: Vec<Type>,
    #[serde(default)]
    pub variants: Vec<EnumVariant>,
    #[serde(default)]
    pub is_local: bool,
}

impl PartialEq for EnumType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.generics == other.generics && self.is_local == other.is_local
    }
}

impl Eq for EnumType {}

impl std::hash::Hash for EnumType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.generics.hash(state);
        self.is_local.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnumVariant {
    Struct(String, Vec<Param>),
    Tuple(String, Vec<Param>),
    Unit(String),
}

impl EnumVariant {
    pub fn name(&self) -> &str {
        match self {
            EnumVariant::Struct(name, _) | EnumVariant::Tuple(name, _) | EnumVariant::Unit(name) => {
                name
            }
        }
    }

    pub fn params(&self) -> &[Param] {
        match self {
            EnumVariant::Struct(_, params) | EnumVariant::Tuple(_, params) => params,
            EnumVariant::Unit(_) => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleType {
    pub types: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrayType {
    pub ty: Type,
    pub length: usize,
}

/// A callable parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    pub ty: Type,
    #[serde(default)]
    pub mutable: bool,
    #[serde(default)]
    pub name: Option<String>,
}

impl Param {
    pub fn new(ty: Type) -> Self {
        Self {
            ty,
            mutable: false,
            name: None,
        }
    }

    pub fn named(name: impl Into<String>, ty: Type) -> Self {
        Self {
            ty,
            mutable: false,
            name: Some(name.into()),
        }
    }

    /// Whether the argument is passed by reference.
    pub fn by_reference(&self) -> bool {
        matches!(self.ty, Type::Ref(..))
    }
}

/// A type of the program under test.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Prim(Prim),
    #[serde(alias = "Complex")]
    Struct(StructType),
    Enum(EnumType),
    Generic(Generic),
    /// Reference to the inner type, `true` when mutable.
    Ref(Box<Type>, bool),
    Tuple(TupleType),
    Array(Box<ArrayType>),
}

impl Type {
    pub fn structure(name: impl Into<String>, generics: Vec<Type>, is_local: bool) -> Self {
        Type::Struct(StructType {
            name: name.into(),
            generics,
            is_local,
        })
    }

    pub fn generic(name: impl Into<String>) -> Self {
        Type::Generic(Generic::new(name, Vec::new()))
    }

    pub fn reference(inner: Type, mutable: bool) -> Self {
        Type::Ref(Box::new(inner), mutable)
    }

    pub fn str_ref() -> Self {
        Type::reference(Type::Prim(Prim::Str), false)
    }

    /// Name without generic arguments.
    pub fn base_name(&self) -> String {
        match self {
            Type::Prim(p) => p.keyword().to_string(),
            Type::Struct(s) => s.name.clone(),
            Type::Enum(e) => e.name.clone(),
            Type::Generic(g) => g.name.clone(),
            Type::Ref(inner, _) => inner.base_name(),
            Type::Tuple(_) => "tuple".to_string(),
            Type::Array(_) => "array".to_string(),
        }
    }

    /// Direct generic arguments of structs and enums.
    pub fn generics(&self) -> &[Type] {
        match self {
            Type::Struct(s) => &s.generics,
            Type::Enum(e) => &e.generics,
            _ => &[],
        }
    }

    pub fn is_prim(&self) -> bool {
        matches!(self, Type::Prim(_))
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, Type::Ref(..))
    }

    pub fn is_local(&self) -> bool {
        match self {
            Type::Struct(s) => s.is_local,
            Type::Enum(e) => e.is_local,
            Type::Ref(inner, _) => inner.is_local(),
            _ => false,
        }
    }

    /// Strips one level of reference.
    pub fn deref(&self) -> &Type {
        match self {
            Type::Ref(inner, _) => inner,
            other => other,
        }
    }

    /// Values of this type are copied instead of moved.
    pub fn is_copy(&self) -> bool {
        match self {
            Type::Prim(_) => true,
            Type::Ref(_, mutable) => !mutable,
            Type::Tuple(t) => t.types.iter().all(Type::is_copy),
            Type::Array(a) => a.ty.is_copy(),
            Type::Struct(_) | Type::Enum(_) | Type::Generic(_) => false,
        }
    }

    /// Structural compatibility. A generic slot on either side matches anything.
    pub fn can_be_same_as(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Generic(_), _) | (_, Type::Generic(_)) => true,
            (Type::Prim(a), Type::Prim(b)) => a == b,
            (Type::Struct(a), Type::Struct(b)) => {
                a.name == b.name
                    && a.is_local == b.is_local
                    && all_compatible(&a.generics, &b.generics)
            }
            (Type::Enum(a), Type::Enum(b)) => {
                a.name == b.name
                    && a.is_local == b.is_local
                    && all_compatible(&a.generics, &b.generics)
            }
            (Type::Ref(a, ma), Type::Ref(b, mb)) => ma == mb && a.can_be_same_as(b),
            (Type::Tuple(a), Type::Tuple(b)) => all_compatible(&a.types, &b.types),
            (Type::Array(a), Type::Array(b)) => a.length == b.length && a.ty.can_be_same_as(&b.ty),
            _ => false,
        }
    }

    /// Position of the component that can hold `target`, if this type wraps it.
    ///
    /// Enums wrap their first generic argument (`Option<T>`, `Result<T, E>`),
    /// tuples wrap any of their elements.
    pub fn wraps(&self, target: &Type) -> Option<usize> {
        match self {
            Type::Enum(e) => e
                .generics
                .first()
                .filter(|g| g.can_be_same_as(target))
                .map(|_| 0),
            Type::Tuple(t) => t.types.iter().position(|ty| ty.can_be_same_as(target)),
            _ => None,
        }
    }

    /// The wrapped component at `index`, see [`Type::wraps`].
    pub fn wrapped(&self, index: usize) -> Option<&Type> {
        match self {
            Type::Enum(e) if index == 0 => e.generics.first(),
            Type::Tuple(t) => t.types.get(index),
            _ => None,
        }
    }

    /// All generic parameters occurring anywhere in this type, first occurrence first.
    pub fn deep_generics(&self) -> Vec<Generic> {
        let mut out = Vec::new();
        self.collect_generics(&mut out);
        out
    }

    fn collect_generics(&self, out: &mut Vec<Generic>) {
        match self {
            Type::Prim(_) => {}
            Type::Generic(g) => {
                if !out.iter().any(|o| o.name == g.name) {
                    out.push(g.clone());
                }
            }
            Type::Struct(s) => s.generics.iter().for_each(|g| g.collect_generics(out)),
            Type::Enum(e) => e.generics.iter().for_each(|g| g.collect_generics(out)),
            Type::Ref(inner, _) => inner.collect_generics(out),
            Type::Tuple(t) => t.types.iter().for_each(|ty| ty.collect_generics(out)),
            Type::Array(a) => a.ty.collect_generics(out),
        }
    }

    pub fn has_generics(&self) -> bool {
        !self.deep_generics().is_empty()
    }

    /// Replaces every bound generic with its binding.
    pub fn bind_generics(&self, binding: &TypeBinding) -> Type {
        match self {
            Type::Generic(g) => binding.get(&g.name).cloned().unwrap_or_else(|| self.clone()),
            Type::Prim(_) => self.clone(),
            Type::Struct(s) => Type::Struct(StructType {
                name: s.name.clone(),
                generics: s.generics.iter().map(|g| g.bind_generics(binding)).collect(),
                is_local: s.is_local,
            }),
            Type::Enum(e) => Type::Enum(EnumType {
                name: e.name.clone(),
                generics: e.generics.iter().map(|g| g.bind_generics(binding)).collect(),
                variants: e.variants.clone(),
                is_local: e.is_local,
            }),
            Type::Ref(inner, mutable) => Type::Ref(Box::new(inner.bind_generics(binding)), *mutable),
            Type::Tuple(t) => Type::Tuple(TupleType {
                types: t.types.iter().map(|ty| ty.bind_generics(binding)).collect(),
            }),
            Type::Array(a) => Type::Array(Box::new(ArrayType {
                ty: a.ty.bind_generics(binding),
                length: a.length,
            })),
        }
    }
}

fn all_compatible(a: &[Type], b: &[Type]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.can_be_same_as(y))
}

fn write_generics(f: &mut fmt::Formatter<'_>, generics: &[Type]) -> fmt::Result {
    if generics.is_empty() {
        return Ok(());
    }
    write!(f, "<")?;
    for (i, g) in generics.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{g}")?;
    }
    write!(f, ">")
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Prim(p) => write!(f, "{}", p.keyword()),
            Type::Struct(s) => {
                write!(f, "{}", s.name)?;
                write_generics(f, &s.generics)
            }
            Type::Enum(e) => {
                write!(f, "{}", e.name)?;
                write_generics(f, &e.generics)
            }
            Type::Generic(g) => write!(f, "{}", g.name),
            Type::Ref(inner, true) => write!(f, "&mut {inner}"),
            Type::Ref(inner, false) => write!(f, "&{inner}"),
            Type::Tuple(t) => {
                write!(f, "(")?;
                for (i, ty) in t.types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ty}")?;
                }
                if t.types.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Type::Array(a) => write!(f, "[{}; {}]", a.ty, a.length),
        }
    }
}

/// Errors raised while binding generics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BindingError {
    #[error("Generic {generic} cannot be bound to the generic {target}")]
    GenericTarget { generic: String, target: String },

    #[error("Generic {generic} is bound to {existing}, cannot rebind it to {requested}")]
    Conflict {
        generic: String,
        existing: String,
        requested: String,
    },
}

/// Assignment of concrete types to generic parameters.
///
/// Once a parameter is bound, every later bind of it must agree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeBinding {
    entries: Vec<(Generic, Option<Type>)>,
}

impl TypeBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unifies `pattern` against `concrete`, binding every generic of the pattern
    /// that lines up with a concrete component.
    pub fn from_types(pattern: &Type, concrete: &Type) -> Result<Self, BindingError> {
        let mut binding = Self::new();
        binding.unify(pattern, concrete)?;
        Ok(binding)
    }

    fn unify(&mut self, pattern: &Type, concrete: &Type) -> Result<(), BindingError> {
        match (pattern, concrete) {
            (_, Type::Generic(_)) => Ok(()),
            (Type::Generic(g), other) => self.bind(g, other.clone()),
            (Type::Struct(a), Type::Struct(b)) => self.unify_all(&a.generics, &b.generics),
            (Type::Enum(a), Type::Enum(b)) => self.unify_all(&a.generics, &b.generics),
            (Type::Ref(a, _), Type::Ref(b, _)) => self.unify(a, b),
            (Type::Tuple(a), Type::Tuple(b)) => self.unify_all(&a.types, &b.types),
            (Type::Array(a), Type::Array(b)) => self.unify(&a.ty, &b.ty),
            _ => Ok(()),
        }
    }

    fn unify_all(&mut self, patterns: &[Type], concretes: &[Type]) -> Result<(), BindingError> {
        for (p, c) in patterns.iter().zip(concretes) {
            self.unify(p, c)?;
        }
        Ok(())
    }

    /// Registers generics without binding them. Known names are left untouched.
    pub fn add_generics(&mut self, generics: impl IntoIterator<Item = Generic>) {
        for generic in generics {
            if !self.entries.iter().any(|(g, _)| g.name == generic.name) {
                self.entries.push((generic, None));
            }
        }
    }

    pub fn bind(&mut self, generic: &Generic, ty: Type) -> Result<(), BindingError> {
        if let Type::Generic(target) = &ty {
            return Err(BindingError::GenericTarget {
                generic: generic.name.clone(),
                target: target.name.clone(),
            });
        }
        match self.entries.iter_mut().find(|(g, _)| g.name == generic.name) {
            Some((_, Some(existing))) if *existing != ty => Err(BindingError::Conflict {
                generic: generic.name.clone(),
                existing: existing.to_string(),
                requested: ty.to_string(),
            }),
            Some((_, slot)) => {
                *slot = Some(ty);
                Ok(())
            }
            None => {
                self.entries.push((generic.clone(), Some(ty)));
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.entries
            .iter()
            .find(|(g, _)| g.name == name)
            .and_then(|(_, ty)| ty.as_ref())
    }

    /// Generics registered but not yet bound.
    pub fn unbound(&self) -> Vec<Generic> {
        self.entries
            .iter()
            .filter(|(_, ty)| ty.is_none())
            .map(|(g, _)| g.clone())
            .collect()
    }

    /// Takes over every binding of `other`, failing on disagreement.
    pub fn merge(&mut self, other: &TypeBinding) -> Result<(), BindingError> {
        for (generic, ty) in &other.entries {
            match ty {
                Some(ty) => self.bind(generic, ty.clone())?,
                None => self.add_generics([generic.clone()]),
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
