//! Shared catalog for operator tests.

use crate::compute::catalog::{Catalog, CallableUsage};
use crate::compute::coverage::ConstantPool;
use crate::compute::evolution::SearchRng;
use crate::schema::{
    Callable, EnumType, FunctionItem, Generic, HirObject, IntTy, MethodItem, Param, Prim,
    SearchConfig, StaticMethodItem, StructInitItem, Trait, Type, UintTy,
};

use super::generate::GenContext;

pub fn point() -> Type {
    Type::structure("geom::Point", vec![], true)
}

pub fn line() -> Type {
    Type::structure("geom::Line", vec![], true)
}

pub fn option_of(inner: Type) -> Type {
    Type::Enum(EnumType {
        name: "std::option::Option".into(),
        generics: vec![inner],
        variants: vec![],
        is_local: false,
    })
}

fn i32_ty() -> Type {
    Type::Prim(Prim::Int(IntTy::I32))
}

fn method(name: &str, receiver: Type, params: Vec<Param>, ret: Option<Type>) -> Callable {
    let mut all = vec![Param::named("self", receiver)];
    all.extend(params);
    Callable::Method(MethodItem {
        name: name.into(),
        generics: vec![],
        params: all,
        return_type: ret,
        parent: point(),
        of_trait: None,
        src_file_path: Some("src/geom.rs".into()),
        is_public: true,
        global_id: Some(format!("geom_point_{name}")),
    })
}

/// `geom::Point`/`geom::Line` plus a parser, a private helper and a generic function.
pub fn catalog() -> Catalog {
    let callables = vec![
        Callable::StaticFunction(StaticMethodItem {
            name: "new".into(),
            generics: vec![],
            params: vec![Param::named("x", i32_ty()), Param::named("y", i32_ty())],
            return_type: Some(point()),
            parent: point(),
            of_trait: None,
            src_file_path: Some("src/geom.rs".into()),
            is_public: true,
            global_id: Some("geom_point_new".into()),
        }),
        method(
            "translate",
            Type::reference(point(), true),
            vec![Param::named("dx", i32_ty())],
            None,
        ),
        method(
            "norm",
            Type::reference(point(), false),
            vec![],
            Some(Type::Prim(Prim::Uint(UintTy::U64))),
        ),
        Callable::StructInit(StructInitItem {
            params: vec![Param::named("a", point()), Param::named("b", point())],
            return_type: line(),
            src_file_path: Some("src/geom.rs".into()),
            is_public: true,
        }),
        Callable::Function(FunctionItem {
            name: "parse".into(),
            generics: vec![],
            params: vec![Param::named("s", Type::str_ref())],
            return_type: Some(option_of(point())),
            src_file_path: Some("src/parse.rs".into()),
            is_public: true,
            global_id: Some("parse_parse".into()),
        }),
        Callable::Function(FunctionItem {
            name: "is_origin".into(),
            generics: vec![],
            params: vec![Param::named("p", Type::reference(point(), false))],
            return_type: Some(Type::Prim(Prim::Bool)),
            src_file_path: Some("src/geom.rs".into()),
            is_public: false,
            global_id: Some("geom_is_origin".into()),
        }),
        Callable::Function(FunctionItem {
            name: "checked".into(),
            generics: vec![],
            params: vec![Param::named("v", i32_ty())],
            return_type: Some(i32_ty()),
            src_file_path: Some("src/parse.rs".into()),
            is_public: false,
            global_id: Some("parse_checked".into()),
        }),
        Callable::Function(FunctionItem {
            name: "describe".into(),
            generics: vec![Type::Generic(Generic::new(
                "T",
                vec![Trait::new("std::fmt::Debug")],
            ))],
            params: vec![Param::named(
                "value",
                Type::Generic(Generic::new("T", vec![Trait::new("std::fmt::Debug")])),
            )],
            return_type: Some(Type::str_ref()),
            src_file_path: Some("src/lib.rs".into()),
            is_public: true,
            global_id: Some("lib_describe".into()),
        }),
    ];
    Catalog::new(HirObject {
        name: "geom".into(),
        callables,
        impls: Default::default(),
    })
}

/// Owns everything a [`GenContext`] borrows.
pub struct Fixture {
    pub catalog: Catalog,
    pub config: SearchConfig,
    pub constants: ConstantPool,
    pub usage: CallableUsage,
    pub rng: SearchRng,
}

impl Fixture {
    pub fn new(seed: u64) -> Self {
        Self {
            catalog: catalog(),
            config: SearchConfig::default(),
            constants: ConstantPool::default(),
            usage: CallableUsage::default(),
            rng: SearchRng::new(seed),
        }
    }

    pub fn ctx(&mut self) -> GenContext<'_> {
        GenContext::new(
            &self.catalog,
            &self.config,
            &self.constants,
            &self.usage,
            &mut self.rng,
        )
    }
}
