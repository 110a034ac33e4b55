//! Callables of the program under test, as delivered by the static analysis.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::{EnumVariant, Generic, Param, Type};

/// Inherent or trait method taking `self` as its first parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodItem {
    pub name: String,
    #[serde(default)]
    pub generics: Vec<Type>,
    /// Includes the receiver at index 0.
    pub params: Vec<Param>,
    #[serde(default)]
    pub return_type: Option<Type>,
    pub parent: Type,
    #[serde(default)]
    pub of_trait: Option<String>,
    #[serde(default)]
    pub src_file_path: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub global_id: Option<String>,
}

/// Associated function without a receiver, such as `Point::new`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StaticMethodItem {
    pub name: String,
    #[serde(default)]
    pub generics: Vec<Type>,
    pub params: Vec<Param>,
    #[serde(default)]
    pub return_type: Option<Type>,
    pub parent: Type,
    #[serde(default)]
    pub of_trait: Option<String>,
    #[serde(default)]
    pub src_file_path: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub global_id: Option<String>,
}

/// Free function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionItem {
    pub name: String,
    #[serde(default)]
    pub generics: Vec<Type>,
    pub params: Vec<Param>,
    #[serde(default)]
    pub return_type: Option<Type>,
    #[serde(default)]
    pub src_file_path: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub global_id: Option<String>,
}

/// Struct literal; every param names a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructInitItem {
    pub params: Vec<Param>,
    pub return_type: Type,
    #[serde(default)]
    pub src_file_path: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

/// Enum variant construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumInitItem {
    pub return_type: Type,
    pub variant: EnumVariant,
    #[serde(default)]
    pub src_file_path: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

/// Read of a public field, `parent.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldAccessItem {
    pub name: String,
    pub parent: Type,
    pub ty: Type,
    #[serde(default)]
    pub src_file_path: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

/// Anything a test statement can invoke.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Callable {
    StaticFunction(StaticMethodItem),
    Method(MethodItem),
    Function(FunctionItem),
    StructInit(StructInitItem),
    EnumInit(EnumInitItem),
    FieldAccess(FieldAccessItem),
}

impl Callable {
    /// Synthetic `unwrap` for an enum wrapping its first generic argument.
    pub fn unwrap_of(wrapper: &Type) -> Option<Callable> {
        let Type::Enum(e) = wrapper else {
            return None;
        };
        let inner = e.generics.first()?.clone();
        Some(Callable::Method(MethodItem {
            name: "unwrap".to_string(),
            generics: Vec::new(),
            params: vec![Param::named("self", wrapper.clone())],
            return_type: Some(inner),
            parent: wrapper.clone(),
            of_trait: None,
            src_file_path: None,
            is_public: true,
            global_id: None,
        }))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Callable::StaticFunction(_) => "StaticFunction",
            Callable::Method(_) => "Method",
            Callable::Function(_) => "Function",
            Callable::StructInit(_) => "StructInit",
            Callable::EnumInit(_) => "EnumInit",
            Callable::FieldAccess(_) => "FieldAccess",
        }
    }

    pub fn name(&self) -> Cow<'_, str> {
        match self {
            Callable::StaticFunction(c) => Cow::Borrowed(&c.name),
            Callable::Method(c) => Cow::Borrowed(&c.name),
            Callable::Function(c) => Cow::Borrowed(&c.name),
            Callable::StructInit(c) => Cow::Owned(c.return_type.base_name()),
            Callable::EnumInit(c) => Cow::Borrowed(c.variant.name()),
            Callable::FieldAccess(c) => Cow::Borrowed(&c.name),
        }
    }

    /// Ordered parameters; a method's receiver comes first.
    pub fn params(&self) -> Cow<'_, [Param]> {
        match self {
            Callable::StaticFunction(c) => Cow::Borrowed(&c.params),
            Callable::Method(c) => Cow::Borrowed(&c.params),
            Callable::Function(c) => Cow::Borrowed(&c.params),
            Callable::StructInit(c) => Cow::Borrowed(&c.params),
            Callable::EnumInit(c) => Cow::Borrowed(c.variant.params()),
            Callable::FieldAccess(c) => Cow::Owned(vec![Param::named("self", c.parent.clone())]),
        }
    }

    pub fn return_type(&self) -> Option<&Type> {
        match self {
            Callable::StaticFunction(c) => c.return_type.as_ref(),
            Callable::Method(c) => c.return_type.as_ref(),
            Callable::Function(c) => c.return_type.as_ref(),
            Callable::StructInit(c) => Some(&c.return_type),
            Callable::EnumInit(c) => Some(&c.return_type),
            Callable::FieldAccess(c) => Some(&c.ty),
        }
    }

    pub fn returns_value(&self) -> bool {
        self.return_type().is_some()
    }

    /// Owning type of methods, constructors and fields.
    pub fn parent(&self) -> Option<&Type> {
        match self {
            Callable::StaticFunction(c) => Some(&c.parent),
            Callable::Method(c) => Some(&c.parent),
            Callable::Function(_) => None,
            Callable::StructInit(c) => Some(&c.return_type),
            Callable::EnumInit(c) => Some(&c.return_type),
            Callable::FieldAccess(c) => Some(&c.parent),
        }
    }

    pub fn is_public(&self) -> bool {
        match self {
            Callable::StaticFunction(c) => c.is_public,
            Callable::Method(c) => c.is_public,
            Callable::Function(c) => c.is_public,
            Callable::StructInit(c) => c.is_public,
            Callable::EnumInit(c) => c.is_public,
            Callable::FieldAccess(c) => c.is_public,
        }
    }

    /// Declaring source file, `None` for callables of external crates.
    pub fn src_file_path(&self) -> Option<&str> {
        match self {
            Callable::StaticFunction(c) => c.src_file_path.as_deref(),
            Callable::Method(c) => c.src_file_path.as_deref(),
            Callable::Function(c) => c.src_file_path.as_deref(),
            Callable::StructInit(c) => c.src_file_path.as_deref(),
            Callable::EnumInit(c) => c.src_file_path.as_deref(),
            Callable::FieldAccess(c) => c.src_file_path.as_deref(),
        }
    }

    /// Identity of the instrumented function body, if any.
    pub fn global_id(&self) -> Option<&str> {
        match self {
            Callable::StaticFunction(c) => c.global_id.as_deref(),
            Callable::Method(c) => c.global_id.as_deref(),
            Callable::Function(c) => c.global_id.as_deref(),
            _ => None,
        }
    }

    pub fn is_method(&self) -> bool {
        matches!(self, Callable::Method(_))
    }

    pub fn self_param(&self) -> Option<&Param> {
        match self {
            Callable::Method(c) => c.params.first(),
            _ => None,
        }
    }

    /// Every generic parameter occurring in the signature.
    pub fn generics(&self) -> Vec<Generic> {
        let mut all: Vec<Generic> = Vec::new();
        let declared = match self {
            Callable::StaticFunction(c) => c.generics.as_slice(),
            Callable::Method(c) => c.generics.as_slice(),
            Callable::Function(c) => c.generics.as_slice(),
            _ => &[],
        };
        let params = self.params();
        let types = declared
            .iter()
            .chain(params.iter().map(|p| &p.ty))
            .chain(self.return_type())
            .chain(self.parent());
        for ty in types {
            for g in ty.deep_generics() {
                if !all.iter().any(|a| a.name == g.name) {
                    all.push(g);
                }
            }
        }
        all
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = self.parent() {
            write!(f, "{}::", parent.base_name())?;
        }
        write!(f, "{}(", self.name())?;
        for (i, p) in self.params().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p.ty)?;
        }
        write!(f, ")")?;
        if let Some(ret) = self.return_type() {
            write!(f, " -> {ret}")?;
        }
        Ok(())
    }
}

/// Static analysis output for one crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HirObject {
    #[serde(default)]
    pub name: String,
    pub callables: Vec<Callable>,
    /// Trait implementations, keyed by type name.
    #[serde(default)]
    pub impls: BTreeMap<String, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{EnumType, IntTy, Prim};

    #[test]
    fn test_deserializes_method() {
        let json = r#"{"Method": {
            "name": "len",
            "params": [{"ty": {"Ref": [{"Struct": {"name": "Stack", "is_local": true}}, false]}}],
            "return_type": {"Prim": {"Uint": "Usize"}},
            "parent": {"Struct": {"name": "Stack", "is_local": true}},
            "src_file_path": "src/stack.rs",
            "is_public": true,
            "global_id": "stack_len"
        }}"#;
        let callable: Callable = serde_json::from_str(json).unwrap();
        assert!(callable.is_method());
        assert_eq!(callable.name(), "len");
        assert!(callable.self_param().unwrap().by_reference());
        assert_eq!(callable.global_id(), Some("stack_len"));
        assert_eq!(callable.src_file_path(), Some("src/stack.rs"));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let json = r#"{"Closure": {"name": "f"}}"#;
        assert!(serde_json::from_str::<Callable>(json).is_err());
    }

    #[test]
    fn test_unwrap_of_option() {
        let option = Type::Enum(EnumType {
            name: "std::option::Option".into(),
            generics: vec![Type::Prim(Prim::Int(IntTy::I32))],
            variants: vec![],
            is_local: false,
        });
        let unwrap = Callable::unwrap_of(&option).unwrap();
        assert_eq!(unwrap.params().len(), 1);
        assert_eq!(unwrap.return_type(), Some(&Type::Prim(Prim::Int(IntTy::I32))));
        assert!(Callable::unwrap_of(&Type::Prim(Prim::Bool)).is_none());
    }

    #[test]
    fn test_generics_cover_the_whole_signature() {
        let callable = Callable::Function(FunctionItem {
            name: "first".into(),
            generics: vec![],
            params: vec![Param::new(Type::structure(
                "std::vec::Vec",
                vec![Type::generic("T")],
                false,
            ))],
            return_type: Some(Type::generic("U")),
            src_file_path: None,
            is_public: true,
            global_id: None,
        });
        let names: Vec<_> = callable.generics().into_iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["T", "U"]);
    }
}
