//! Registry of the callables and types a test may use.
//!
//! The catalog is built once from the static analysis output and is read-only
//! afterwards. All queries are pure; an empty result is not an error.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::compute::evolution::SearchRng;
use crate::schema::{Callable, HirObject, Param, Prim, SIZED, StaticMethodItem, Trait, Type};

/// Errors raised while loading or querying the catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Malformed catalog: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Callables and types of the program under test.
#[derive(Debug, Clone)]
pub struct Catalog {
    name: String,
    callables: Vec<Arc<Callable>>,
    types: Vec<Type>,
    impls: BTreeMap<String, BTreeSet<String>>,
}

impl Catalog {
    /// Build a catalog from an analysis record.
    pub fn new(hir: HirObject) -> Self {
        let mut callables: Vec<Arc<Callable>> = builtin_callables().into_iter().map(Arc::new).collect();
        callables.extend(hir.callables.into_iter().map(Arc::new));

        let mut types = Vec::new();
        for callable in &callables {
            let params = callable.params();
            let signature = params
                .iter()
                .map(|p| &p.ty)
                .chain(callable.parent())
                .chain(callable.return_type());
            for ty in signature {
                collect_type(ty, &mut types);
            }
        }

        let impls = hir
            .impls
            .into_iter()
            .map(|(ty, traits)| (ty, traits.into_iter().collect()))
            .collect();

        let catalog = Self {
            name: hir.name,
            callables,
            types,
            impls,
        };
        log::info!(
            "Loaded catalog {:?}: {} callables, {} types",
            catalog.name,
            catalog.callables.len(),
            catalog.types.len()
        );
        catalog
    }

    /// Parse either a full analysis object or a bare array of callables.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let hir = if value.is_array() {
            HirObject {
                callables: serde_json::from_value(value)?,
                ..HirObject::default()
            }
        } else {
            serde_json::from_value(value)?
        };
        Ok(Self::new(hir))
    }

    /// Load a catalog file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn callables(&self) -> &[Arc<Callable>] {
        &self.callables
    }

    /// Structs and enums seen anywhere in a signature.
    pub fn types(&self) -> &[Type] {
        &self.types
    }

    /// Callables a test bound to `file_path` may invoke.
    ///
    /// With `local_only`, callables of external crates are skipped.
    pub fn callables_in_scope(&self, file_path: Option<&str>, local_only: bool) -> Vec<Arc<Callable>> {
        self.callables
            .iter()
            .filter(|c| in_scope(c, file_path))
            .filter(|c| !local_only || c.src_file_path().is_some())
            .cloned()
            .collect()
    }

    /// Callables producing `ty` directly or a container wrapping it.
    ///
    /// Without a file binding, callables of the crate under test are preferred
    /// whenever at least one exists.
    pub fn generators_of(
        &self,
        ty: &Type,
        file_path: Option<&str>,
    ) -> Result<Vec<Arc<Callable>>, CatalogError> {
        check_named(ty)?;
        let generators: Vec<Arc<Callable>> = self
            .callables
            .iter()
            .filter(|c| {
                c.return_type()
                    .is_some_and(|ret| ret.can_be_same_as(ty) || ret.wraps(ty).is_some())
            })
            .filter(|c| in_scope(c, file_path))
            .cloned()
            .collect();
        if file_path.is_some() {
            return Ok(generators);
        }
        let local: Vec<Arc<Callable>> = generators
            .iter()
            .filter(|c| c.src_file_path().is_some())
            .cloned()
            .collect();
        Ok(if local.is_empty() { generators } else { local })
    }

    /// Callables accepting a parameter compatible with `ty`.
    pub fn callables_with_param(
        &self,
        ty: &Type,
        file_path: Option<&str>,
        only_by_reference: bool,
    ) -> Result<Vec<Arc<Callable>>, CatalogError> {
        check_named(ty)?;
        Ok(self
            .callables
            .iter()
            .filter(|c| {
                c.params()
                    .iter()
                    .find(|p| p.ty.can_be_same_as(ty) || p.ty.deref().can_be_same_as(ty))
                    .is_some_and(|p| !only_by_reference || p.by_reference())
            })
            .filter(|c| in_scope(c, file_path))
            .cloned()
            .collect())
    }

    /// Methods whose receiver can be a value of `ty`.
    pub fn methods_for(&self, ty: &Type, file_path: Option<&str>) -> Vec<Arc<Callable>> {
        self.callables
            .iter()
            .filter(|c| c.is_method())
            .filter(|c| c.parent().is_some_and(|parent| parent.can_be_same_as(ty.deref())))
            .filter(|c| in_scope(c, file_path))
            .cloned()
            .collect()
    }

    /// Concrete catalog types implementing every bound.
    pub fn types_implementing(&self, bounds: &[Trait]) -> Result<Vec<Type>, CatalogError> {
        if bounds.is_empty() {
            return Err(CatalogError::InvalidArgument("trait bounds must not be empty"));
        }
        Ok(self
            .types
            .iter()
            .filter(|ty| !ty.has_generics())
            .filter(|ty| bounds.iter().all(|b| self.implements(ty, &b.name)))
            .cloned()
            .collect())
    }

    /// Primitives implementing every bound.
    pub fn prims_implementing(&self, bounds: &[Trait]) -> Vec<Prim> {
        Prim::all()
            .into_iter()
            .filter(|p| bounds.iter().all(|b| p.implements(&b.name)))
            .collect()
    }

    pub fn implements(&self, ty: &Type, trait_name: &str) -> bool {
        if trait_name == SIZED {
            return true;
        }
        match ty {
            Type::Prim(p) => p.implements(trait_name),
            Type::Struct(_) | Type::Enum(_) => self
                .impls
                .get(&ty.base_name())
                .is_some_and(|traits| traits.contains(trait_name)),
            _ => false,
        }
    }
}

fn in_scope(callable: &Callable, file_path: Option<&str>) -> bool {
    match file_path {
        None => true,
        Some(path) => callable.is_public() || callable.src_file_path() == Some(path),
    }
}

fn check_named(ty: &Type) -> Result<(), CatalogError> {
    match ty {
        Type::Struct(_) | Type::Enum(_) | Type::Generic(_) if ty.base_name().is_empty() => {
            Err(CatalogError::InvalidArgument("type name must not be empty"))
        }
        _ => Ok(()),
    }
}

fn collect_type(ty: &Type, out: &mut Vec<Type>) {
    match ty {
        Type::Prim(_) | Type::Generic(_) => {}
        Type::Ref(inner, _) => collect_type(inner, out),
        Type::Tuple(t) => t.types.iter().for_each(|ty| collect_type(ty, out)),
        Type::Array(a) => collect_type(&a.ty, out),
        Type::Struct(_) | Type::Enum(_) => {
            if !out.contains(ty) {
                out.push(ty.clone());
            }
        }
    }
}

/// Constructors every crate can use regardless of its analysis output.
fn builtin_callables() -> Vec<Callable> {
    let string = Type::structure("std::string::String", Vec::new(), false);
    vec![Callable::StaticFunction(StaticMethodItem {
        name: "from".to_string(),
        generics: Vec::new(),
        params: vec![Param::named("s", Type::str_ref())],
        return_type: Some(string.clone()),
        parent: string,
        of_trait: Some("std::convert::From".to_string()),
        src_file_path: None,
        is_public: true,
        global_id: None,
    })]
}

/// Usage counts of callables over the archived tests.
///
/// Selection prefers rarely used callables so the search keeps exploring.
#[derive(Debug, Clone, Default)]
pub struct CallableUsage {
    counts: HashMap<Arc<Callable>, usize>,
}

impl CallableUsage {
    pub fn from_callables<'a>(callables: impl IntoIterator<Item = &'a Arc<Callable>>) -> Self {
        let mut counts = HashMap::new();
        for callable in callables {
            *counts.entry(Arc::clone(callable)).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn count(&self, callable: &Callable) -> usize {
        self.counts.get(callable).copied().unwrap_or(0)
    }

    /// Pick a candidate, biased toward the least used ones.
    pub fn select(&self, candidates: &[Arc<Callable>], rng: &mut SearchRng) -> Option<Arc<Callable>> {
        if candidates.is_empty() {
            return None;
        }
        if self.counts.is_empty() {
            return rng.choose(candidates).cloned();
        }
        let mut sorted: Vec<&Arc<Callable>> = candidates.iter().collect();
        sorted.sort_by_key(|c| self.count(c));
        let p = 1.0 / sorted.len() as f64;
        sorted
            .iter()
            .find(|_| rng.chance(p))
            .or_else(|| sorted.first())
            .map(|c| Arc::clone(c))
    }
}
