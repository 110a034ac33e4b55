//! Statement construction: argument resolution and fresh value generation.
//!
//! Every public operation is transactional. When a value cannot be produced
//! under the current constraints the test case is restored and the operation
//! reports failure.

use std::sync::Arc;

use super::statement::{Statement, VarId};
use super::test_case::TestCase;
use super::value::PrimValue;
use crate::compute::catalog::{Catalog, CallableUsage};
use crate::compute::coverage::ConstantPool;
use crate::compute::evolution::SearchRng;
use crate::schema::{Callable, Generic, IntTy, Prim, SearchConfig, Trait, Type, TypeBinding};

/// Nesting limit when generating a value through its constructors.
pub const MAX_GENERATION_DEPTH: usize = 6;

/// Generators tried for one type before giving up.
const MAX_GENERATOR_ATTEMPTS: usize = 4;

/// Chance of reusing an existing variable for a non-primitive parameter.
const P_REUSE_VARIABLE: f64 = 0.5;

/// Borrowed state shared by generators and operators.
pub struct GenContext<'a> {
    pub catalog: &'a Catalog,
    pub config: &'a SearchConfig,
    pub constants: &'a ConstantPool,
    pub usage: &'a CallableUsage,
    pub rng: &'a mut SearchRng,
}

/// Pre-set argument of a call under construction.
#[derive(Clone, Copy)]
struct FixedArg {
    index: usize,
    var: VarId,
}

impl<'a> GenContext<'a> {
    pub fn new(
        catalog: &'a Catalog,
        config: &'a SearchConfig,
        constants: &'a ConstantPool,
        usage: &'a CallableUsage,
        rng: &'a mut SearchRng,
    ) -> Self {
        Self {
            catalog,
            config,
            constants,
            usage,
            rng,
        }
    }

    /// Append a call to `callable`, reusing or generating its arguments.
    pub fn insert_callable(&mut self, tc: &mut TestCase, callable: &Arc<Callable>) -> bool {
        let snapshot = tc.clone();
        let mut pending = Vec::new();
        if self
            .call(tc, callable, TypeBinding::new(), None, true, &mut pending)
            .is_some()
        {
            return true;
        }
        log::debug!("Test {}: cannot insert a call to {}", tc.id(), callable);
        *tc = snapshot;
        false
    }

    /// Append a call of `callable` passing `var` as the parameter at `param_index`.
    pub fn insert_call_using(
        &mut self,
        tc: &mut TestCase,
        var: VarId,
        callable: &Arc<Callable>,
        param_index: usize,
    ) -> bool {
        let snapshot = tc.clone();
        let fixed = FixedArg {
            index: param_index,
            var,
        };
        let mut pending = Vec::new();
        if self
            .call(tc, callable, TypeBinding::new(), Some(fixed), true, &mut pending)
            .is_some()
        {
            return true;
        }
        log::debug!("Test {}: cannot pass {} to {}", tc.id(), var, callable);
        *tc = snapshot;
        false
    }

    /// Append either a method call on an existing variable or a call of a
    /// random in-scope callable.
    pub fn insert_random_stmt(&mut self, tc: &mut TestCase) -> bool {
        if self.rng.chance(self.config.mutation.p_local_variables) {
            let candidates = self.methods_on_existing(tc);
            if let Some((var, method)) = self.rng.choose(&candidates).cloned() {
                return self.insert_call_using(tc, var, &method, 0);
            }
        }
        let binding = tc.file_path_binding();
        let mut callables = self.catalog.callables_in_scope(binding.as_deref(), true);
        if callables.is_empty() {
            callables = self.catalog.callables_in_scope(binding.as_deref(), false);
        }
        match self.usage.select(&callables, self.rng) {
            Some(callable) => self.insert_callable(tc, &callable),
            None => false,
        }
    }

    /// Methods whose receiver can be an existing variable at the end of `tc`.
    pub fn methods_on_existing(&self, tc: &TestCase) -> Vec<(VarId, Arc<Callable>)> {
        let end = tc.len();
        let binding = tc.file_path_binding();
        let mut out = Vec::new();
        for var in tc.usable_vars(end) {
            let Some(ty) = tc.var_type(var) else {
                continue;
            };
            if ty.deref().is_prim() {
                continue;
            }
            for method in self.catalog.methods_for(ty, binding.as_deref()) {
                let Some(receiver) = method.self_param() else {
                    continue;
                };
                let usable = match (receiver.by_reference(), ty.is_ref()) {
                    (true, true) => tc.is_consumable_at(var, end),
                    (true, false) => {
                        let mutable = matches!(receiver.ty, Type::Ref(_, true));
                        tc.is_borrowable_at(var, end, mutable)
                    }
                    (false, false) => tc.is_consumable_at(var, end),
                    (false, true) => false,
                };
                if usable {
                    out.push((var, method));
                }
            }
        }
        out
    }

    /// Callables that accept `var`, with the index of the accepting parameter.
    pub fn callables_accepting(&self, tc: &TestCase, var: VarId) -> Vec<(Arc<Callable>, usize)> {
        let Some(ty) = tc.var_type(var) else {
            return Vec::new();
        };
        let binding = tc.file_path_binding();
        let callables = self
            .catalog
            .callables_with_param(ty.deref(), binding.as_deref(), false)
            .unwrap_or_default();
        callables
            .into_iter()
            .filter_map(|c| {
                let index = c
                    .params()
                    .iter()
                    .position(|p| p.ty.deref().can_be_same_as(ty.deref()))?;
                Some((c, index))
            })
            .collect()
    }

    /// Generate a fresh value of `ty` ahead of the existing statements' uses.
    pub fn generate_value(&mut self, tc: &mut TestCase, ty: &Type) -> Option<VarId> {
        let snapshot = tc.clone();
        let mut pending = Vec::new();
        let var = self.generate_arg(tc, ty, None, &mut pending);
        if var.is_none() {
            log::debug!("Test {}: cannot generate a value of {}", tc.id(), ty);
            *tc = snapshot;
        }
        var
    }

    /// A variable usable as an argument of type `ty` by a statement at `before`.
    ///
    /// Existing variables are preferred; references to owned variables are
    /// inserted at `before`. Falls back to generating a fresh value. Statements
    /// are only ever inserted at or before `before`.
    pub fn arg_for(
        &mut self,
        tc: &mut TestCase,
        ty: &Type,
        before: usize,
        exclude: &[VarId],
    ) -> Option<VarId> {
        if let Some(var) = self.reuse(tc, ty, before, exclude) {
            return Some(var);
        }
        self.generate_value(tc, ty)
    }

    /// An owned variable of `ty` that a statement at `before` may borrow.
    pub fn borrowable_arg_for(
        &mut self,
        tc: &mut TestCase,
        ty: &Type,
        before: usize,
        mutable: bool,
        exclude: &[VarId],
    ) -> Option<VarId> {
        let candidates: Vec<VarId> = tc
            .borrowable_vars_of(ty, before, mutable)
            .into_iter()
            .filter(|v| !exclude.contains(v))
            .collect();
        if let Some(&var) = self.rng.choose(&candidates) {
            return Some(var);
        }
        self.generate_value(tc, ty)
    }

    fn reuse(&mut self, tc: &mut TestCase, ty: &Type, before: usize, exclude: &[VarId]) -> Option<VarId> {
        let usable = |candidates: Vec<VarId>| -> Vec<VarId> {
            candidates.into_iter().filter(|v| !exclude.contains(v)).collect()
        };
        match ty {
            Type::Ref(inner, mutable) if !inner.is_prim() => {
                if !mutable {
                    let refs = usable(tc.consumable_vars_of(ty, before));
                    if let Some(&var) = self.rng.choose(&refs) {
                        return Some(var);
                    }
                }
                let owned = usable(tc.borrowable_vars_of(inner, before, *mutable));
                let &target = self.rng.choose(&owned)?;
                let returns = tc.new_var(ty.clone());
                tc.insert_stmt(
                    before,
                    Statement::Ref {
                        target,
                        mutable: *mutable,
                        returns,
                    },
                );
                Some(returns)
            }
            _ => {
                let candidates = usable(tc.consumable_vars_of(ty, before));
                self.rng.choose(&candidates).copied()
            }
        }
    }

    fn in_scope(tc: &TestCase, callable: &Callable) -> bool {
        match tc.file_path_binding() {
            None => true,
            Some(path) => callable.is_public() || callable.src_file_path() == Some(path.as_str()),
        }
    }

    /// Build a call statement. Appended at the end when `append`, otherwise
    /// placed right after its last argument. Returns the produced variable.
    fn call(
        &mut self,
        tc: &mut TestCase,
        callable: &Arc<Callable>,
        mut binding: TypeBinding,
        fixed: Option<FixedArg>,
        append: bool,
        pending: &mut Vec<Type>,
    ) -> Option<Option<VarId>> {
        if !Self::in_scope(tc, callable) {
            return None;
        }
        let params = callable.params().into_owned();
        binding.add_generics(callable.generics());
        if let Some(fixed) = fixed {
            let param = params.get(fixed.index)?;
            let var_ty = tc.var_type(fixed.var)?;
            let unified = TypeBinding::from_types(param.ty.deref(), var_ty.deref()).ok()?;
            binding.merge(&unified).ok()?;
        }
        for generic in binding.unbound() {
            let concrete = self.type_for(&generic)?;
            binding.bind(&generic, concrete).ok()?;
        }

        let global_id = callable.global_id().map(str::to_string);
        let mut args: Vec<VarId> = Vec::with_capacity(params.len());
        for (i, param) in params.iter().enumerate() {
            let ty = param.ty.bind_generics(&binding);
            let arg = match fixed {
                Some(fixed) if fixed.index == i => self.fixed_arg(tc, fixed.var, &ty)?,
                _ => {
                    let reused = if append && !ty.deref().is_prim() && self.rng.chance(P_REUSE_VARIABLE) {
                        let mut exclude = tc.with_borrowed_targets(&args);
                        exclude.extend(fixed.map(|f| f.var));
                        let end = tc.len();
                        self.reuse(tc, &ty, end, &exclude)
                    } else {
                        None
                    };
                    match reused {
                        Some(var) => var,
                        None => self.generate_arg(tc, &ty, global_id.as_deref(), pending)?,
                    }
                }
            };
            args.push(arg);
        }
        // A fresh argument may have bound the test to another source file.
        if !Self::in_scope(tc, callable) {
            return None;
        }

        let returns = callable
            .return_type()
            .map(|ret| tc.new_var(ret.bind_generics(&binding)));
        let stmt = Statement::Invoke {
            callable: Arc::clone(callable),
            args,
            binding,
            returns,
        };
        if append {
            tc.push_stmt(stmt);
        } else {
            tc.add_stmt(stmt);
        }
        Some(returns)
    }

    /// Pass an existing variable, borrowing it when the parameter is a reference.
    fn fixed_arg(&mut self, tc: &mut TestCase, var: VarId, ty: &Type) -> Option<VarId> {
        let end = tc.len();
        let var_ty = tc.var_type(var)?.clone();
        match ty {
            Type::Ref(_, mutable) if !var_ty.is_ref() => {
                if !tc.is_borrowable_at(var, end, *mutable) {
                    return None;
                }
                let returns = tc.new_var(Type::reference(var_ty, *mutable));
                tc.push_stmt(Statement::Ref {
                    target: var,
                    mutable: *mutable,
                    returns,
                });
                Some(returns)
            }
            _ if tc.is_consumable_at(var, end) => Some(var),
            _ => None,
        }
    }

    /// Fresh value of `ty`, placed before every statement that could use it.
    fn generate_arg(
        &mut self,
        tc: &mut TestCase,
        ty: &Type,
        global_id: Option<&str>,
        pending: &mut Vec<Type>,
    ) -> Option<VarId> {
        if pending.len() >= MAX_GENERATION_DEPTH || pending.contains(ty) {
            return None;
        }
        match ty {
            Type::Generic(generic) => {
                let concrete = self.type_for(generic)?;
                self.generate_arg(tc, &concrete, global_id, pending)
            }
            Type::Prim(prim) => Some(self.literal(tc, *prim, global_id)),
            Type::Ref(inner, _) if **inner == Type::Prim(Prim::Str) => {
                Some(self.literal(tc, Prim::Str, global_id))
            }
            Type::Ref(inner, mutable) => {
                pending.push(ty.clone());
                let target = self.generate_arg(tc, inner, global_id, pending);
                pending.pop();
                let target = target?;
                let returns = tc.new_var(ty.clone());
                tc.add_stmt(Statement::Ref {
                    target,
                    mutable: *mutable,
                    returns,
                });
                Some(returns)
            }
            Type::Struct(_) | Type::Enum(_) => {
                pending.push(ty.clone());
                let var = self.construct(tc, ty, pending);
                pending.pop();
                var
            }
            Type::Tuple(tuple) => {
                pending.push(ty.clone());
                let elements = self.generate_all(tc, &tuple.types, global_id, pending);
                pending.pop();
                let returns = tc.new_var(ty.clone());
                tc.add_stmt(Statement::TupleInit {
                    elements: elements?,
                    returns,
                });
                Some(returns)
            }
            Type::Array(array) => {
                pending.push(ty.clone());
                let types = vec![array.ty.clone(); array.length];
                let elements = self.generate_all(tc, &types, global_id, pending);
                pending.pop();
                let returns = tc.new_var(ty.clone());
                tc.add_stmt(Statement::ArrayInit {
                    elements: elements?,
                    returns,
                });
                Some(returns)
            }
        }
    }

    fn generate_all(
        &mut self,
        tc: &mut TestCase,
        types: &[Type],
        global_id: Option<&str>,
        pending: &mut Vec<Type>,
    ) -> Option<Vec<VarId>> {
        types
            .iter()
            .map(|ty| self.generate_arg(tc, ty, global_id, pending))
            .collect()
    }

    /// Literal at the head of the test, drawn from the constant pool of
    /// `global_id` when seeding allows it.
    fn literal(&mut self, tc: &mut TestCase, prim: Prim, global_id: Option<&str>) -> VarId {
        let mut value = None;
        if let Some(id) = global_id {
            if self.config.seeding.use_constant_pool
                && self.rng.chance(self.config.primitives.p_constant_pool)
            {
                value = self.constants.pick(id, prim, self.rng);
            }
        }
        let value = value.unwrap_or_else(|| PrimValue::random(prim, &self.config.primitives, self.rng));
        let returns = tc.new_var(value.ty());
        tc.insert_stmt(0, Statement::Literal { value, returns });
        returns
    }

    /// Call a generator of `ty`, unwrapping its result when it only wraps `ty`.
    fn construct(&mut self, tc: &mut TestCase, ty: &Type, pending: &mut Vec<Type>) -> Option<VarId> {
        let binding = tc.file_path_binding();
        let mut generators = self.catalog.generators_of(ty, binding.as_deref()).ok()?;
        self.rng.shuffle(&mut generators);
        for generator in generators.iter().take(MAX_GENERATOR_ATTEMPTS) {
            let snapshot = tc.clone();
            if let Some(var) = self.construct_with(tc, ty, generator, pending) {
                return Some(var);
            }
            *tc = snapshot;
        }
        None
    }

    fn construct_with(
        &mut self,
        tc: &mut TestCase,
        ty: &Type,
        generator: &Arc<Callable>,
        pending: &mut Vec<Type>,
    ) -> Option<VarId> {
        let ret = generator.return_type()?;
        let (pattern, wrapped) = if ret.can_be_same_as(ty) {
            (ret, None)
        } else {
            let index = ret.wraps(ty)?;
            (ret.wrapped(index)?, Some(index))
        };
        let binding = TypeBinding::from_types(pattern, ty).ok()?;
        let var = self.call(tc, generator, binding, None, false, pending)??;
        match wrapped {
            None => Some(var),
            Some(index) => self.unwrap_to(tc, var, index),
        }
    }

    /// Extract the wrapped component of `var`.
    fn unwrap_to(&mut self, tc: &mut TestCase, var: VarId, index: usize) -> Option<VarId> {
        let wrapper = tc.var_type(var)?.clone();
        let inner = wrapper.wrapped(index)?.clone();
        let stmt = match &wrapper {
            Type::Enum(_) => {
                let unwrap = Arc::new(Callable::unwrap_of(&wrapper)?);
                let returns = tc.new_var(inner);
                Statement::Invoke {
                    callable: unwrap,
                    args: vec![var],
                    binding: TypeBinding::new(),
                    returns: Some(returns),
                }
            }
            Type::Tuple(_) => Statement::TupleAccess {
                tuple: var,
                index,
                returns: tc.new_var(inner),
            },
            _ => return None,
        };
        let returns = stmt.returns();
        tc.add_stmt(stmt);
        returns
    }

    /// Concrete type for an unbound generic parameter.
    ///
    /// Unconstrained generics become `isize`; otherwise a primitive satisfying
    /// every bound is preferred over catalog types.
    pub fn type_for(&mut self, generic: &Generic) -> Option<Type> {
        let bounds: Vec<Trait> = generic.effective_bounds().into_iter().cloned().collect();
        if bounds.is_empty() {
            return Some(Type::Prim(Prim::Int(IntTy::Isize)));
        }
        let prims: Vec<Prim> = self
            .catalog
            .prims_implementing(&bounds)
            .into_iter()
            .filter(|p| *p != Prim::Str)
            .collect();
        if let Some(&prim) = self.rng.choose(&prims) {
            return Some(Type::Prim(prim));
        }
        let types = self.catalog.types_implementing(&bounds).unwrap_or_default();
        let chosen = self.rng.choose(&types).cloned();
        if chosen.is_none() {
            log::debug!("No type satisfies the bounds of {}", generic.name);
        }
        chosen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::chromosome::fixtures::{self, Fixture};

    fn find(fx: &Fixture, name: &str) -> Arc<Callable> {
        fx.catalog
            .callables()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_insert_callable_generates_arguments() {
        let mut fx = Fixture::new(1);
        let line_init = find(&fx, "geom::Line");
        let mut tc = TestCase::new(1);
        assert!(fx.ctx().insert_callable(&mut tc, &line_init));
        assert_eq!(tc.check_invariants(), Ok(()));
        let last = tc.stmts().last().unwrap();
        assert_eq!(last.callable(), Some(&line_init));
        let produced = last.returns().unwrap();
        assert_eq!(tc.var_type(produced), Some(&fixtures::line()));
    }

    #[test]
    fn test_generated_tests_are_acyclic() {
        for seed in 0..30 {
            let mut fx = Fixture::new(seed);
            let mut tc = TestCase::new(seed);
            for _ in 0..8 {
                fx.ctx().insert_random_stmt(&mut tc);
                assert_eq!(tc.check_invariants(), Ok(()));
            }
        }
    }

    #[test]
    fn test_method_call_borrows_receiver() {
        let mut fx = Fixture::new(3);
        let new = find(&fx, "new");
        let norm = find(&fx, "norm");
        let mut tc = TestCase::new(1);
        assert!(fx.ctx().insert_callable(&mut tc, &new));
        let point = tc.stmts().last().unwrap().returns().unwrap();
        assert!(fx.ctx().insert_call_using(&mut tc, point, &norm, 0));
        let n = tc.len();
        assert!(matches!(tc.stmt(n - 2), Some(Statement::Ref { target, .. }) if *target == point));
        assert_eq!(tc.check_invariants(), Ok(()));
        // the point was only borrowed
        assert!(tc.is_consumable_at(point, tc.len()));
    }

    #[test]
    fn test_live_shared_borrow_is_not_borrowed_mutably() {
        for seed in 0..20 {
            let mut fx = Fixture::new(seed);
            let new = find(&fx, "new");
            let norm = find(&fx, "norm");
            // v0 = 1; v1 = Point::new(v0, v0); v2 = &v1; v3 = v2.norm();
            let mut tc = TestCase::new(1);
            let x = tc.new_var(Type::Prim(Prim::Int(IntTy::I32)));
            tc.push_stmt(Statement::Literal {
                value: PrimValue::Int(IntTy::I32, 1),
                returns: x,
            });
            let p = tc.new_var(fixtures::point());
            tc.push_stmt(Statement::Invoke {
                callable: new.clone(),
                args: vec![x, x],
                binding: TypeBinding::new(),
                returns: Some(p),
            });
            let r = tc.new_var(Type::reference(fixtures::point(), false));
            tc.push_stmt(Statement::Ref {
                target: p,
                mutable: false,
                returns: r,
            });
            let n = tc.new_var(Type::Prim(Prim::Uint(crate::schema::UintTy::U64)));
            tc.push_stmt(Statement::Invoke {
                callable: norm.clone(),
                args: vec![r],
                binding: TypeBinding::new(),
                returns: Some(n),
            });

            let ty = Type::reference(fixtures::point(), true);
            let Some(var) = fx.ctx().arg_for(&mut tc, &ty, 3, &[]) else {
                continue;
            };
            assert_eq!(tc.var_type(var), Some(&ty));
            let borrows_p = tc
                .stmts()
                .iter()
                .any(|s| matches!(s, Statement::Ref { target, mutable: true, .. } if *target == p));
            assert!(!borrows_p, "seed {seed}: &mut taken while &p is alive");
            assert_eq!(tc.check_invariants(), Ok(()));
        }
    }

    #[test]
    fn test_wrapped_generator_is_unwrapped() {
        let mut fx = Fixture::new(11);
        // only `parse` produces Option<Point>
        let ty = fixtures::option_of(fixtures::point());
        let mut tc = TestCase::new(1);
        let var = fx.ctx().generate_value(&mut tc, &ty).unwrap();
        assert_eq!(tc.var_type(var), Some(&ty));

        let mut tc = TestCase::new(2);
        for _ in 0..20 {
            let Some(var) = fx.ctx().generate_value(&mut tc, &fixtures::point()) else {
                continue;
            };
            assert_eq!(tc.var_type(var), Some(&fixtures::point()));
        }
        assert_eq!(tc.check_invariants(), Ok(()));
    }

    #[test]
    fn test_private_callable_outside_binding_is_rejected() {
        let mut fx = Fixture::new(5);
        let is_origin = find(&fx, "is_origin");
        let checked = find(&fx, "checked");
        let mut tc = TestCase::new(1);
        assert!(fx.ctx().insert_callable(&mut tc, &is_origin));
        assert_eq!(tc.file_path_binding().as_deref(), Some("src/geom.rs"));
        let before = tc.clone();
        assert!(!fx.ctx().insert_callable(&mut tc, &checked));
        assert_eq!(tc.stmts(), before.stmts());
    }

    #[test]
    fn test_generic_parameter_gets_concrete_type() {
        let mut fx = Fixture::new(8);
        let describe = find(&fx, "describe");
        let mut tc = TestCase::new(1);
        assert!(fx.ctx().insert_callable(&mut tc, &describe));
        let Some(Statement::Invoke { binding, args, .. }) = tc.stmts().last() else {
            panic!("expected a call");
        };
        let bound = binding.get("T").unwrap();
        assert!(bound.is_prim());
        assert_eq!(tc.var_type(args[0]), Some(bound));
    }

    #[test]
    fn test_unbounded_generic_defaults_to_isize() {
        let mut fx = Fixture::new(2);
        let ty = fx.ctx().type_for(&Generic::new("T", vec![])).unwrap();
        assert_eq!(ty, Type::Prim(Prim::Int(IntTy::Isize)));
    }
}
