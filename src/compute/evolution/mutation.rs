//! Mutation: statement deletion, in-place change and insertion.
//!
//! Each phase runs with its own probability, always in that order. An edit
//! that would leave a variable used before its definition is rolled back.

use std::sync::Arc;

use crate::compute::chromosome::{GenContext, Statement, TestCase, VarId};
use crate::schema::{Callable, TypeBinding};

/// Result of deleting one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Later uses had no replacement; the test case is unchanged.
    Rejected { unresolved: usize },
}

/// Mutate `tc` in place. Returns whether anything changed.
pub fn mutate(tc: &mut TestCase, ctx: &mut GenContext<'_>) -> bool {
    let config = &ctx.config.mutation;
    let (p_delete, p_change, p_insert) =
        (config.p_test_delete, config.p_test_change, config.p_test_insert);
    let mut changed = false;
    if ctx.rng.chance(p_delete) {
        changed |= delete_stmts(tc, ctx);
    }
    if ctx.rng.chance(p_change) {
        changed |= change_stmts(tc, ctx);
    }
    if ctx.rng.chance(p_insert) {
        changed |= insert_stmts(tc, ctx);
    }
    changed
}

/// Delete each statement with probability `1/len`, scanning backwards.
pub fn delete_stmts(tc: &mut TestCase, ctx: &mut GenContext<'_>) -> bool {
    let len = tc.len();
    if len == 0 {
        return false;
    }
    let p = 1.0 / len as f64;
    let mut changed = false;
    for pos in (0..len).rev() {
        if pos < tc.len() && ctx.rng.chance(p) {
            changed |= delete_statement(tc, pos, ctx) == DeleteOutcome::Deleted;
        }
    }
    changed
}

/// Remove the statement at `pos`, rewiring later uses of its value to
/// compatible alternatives.
pub fn delete_statement(tc: &mut TestCase, pos: usize, ctx: &mut GenContext<'_>) -> DeleteOutcome {
    let snapshot = tc.clone();
    if let Some(var) = tc.stmt(pos).and_then(Statement::returns) {
        for use_pos in pos + 1..tc.len() {
            let Some(usage) = tc.usage_at(use_pos, var) else {
                continue;
            };
            let alternatives = tc.alternatives_for(var, use_pos, usage);
            if let Some(&alternative) = ctx.rng.choose(&alternatives) {
                if let Some(stmt) = tc.stmt_mut(use_pos) {
                    stmt.replace_var(var, alternative);
                }
            }
        }
    }
    tc.remove_stmt(pos);

    let unresolved = tc.unresolved_uses().len();
    if unresolved > 0 {
        log::debug!("Test {}: deleting statement {} leaves {} unresolved uses", tc.id(), pos, unresolved);
        *tc = snapshot;
        return DeleteOutcome::Rejected { unresolved };
    }
    DeleteOutcome::Deleted
}

/// Change each statement with probability `1/len`, following shifted positions.
pub fn change_stmts(tc: &mut TestCase, ctx: &mut GenContext<'_>) -> bool {
    let mut changed = false;
    let mut pos = 0;
    while pos < tc.len() {
        let p = 1.0 / tc.len() as f64;
        if ctx.rng.chance(p) {
            let before = tc.len();
            if change_statement(tc, pos, ctx) {
                changed = true;
                // statements inserted for new arguments land ahead of `pos`
                pos += tc.len().saturating_sub(before);
            }
        }
        pos += 1;
    }
    changed
}

/// Mutate one statement in place. Rolls back on failure.
pub fn change_statement(tc: &mut TestCase, pos: usize, ctx: &mut GenContext<'_>) -> bool {
    let snapshot = tc.clone();
    let changed = match tc.stmt(pos).cloned() {
        None | Some(Statement::Ref { .. }) | Some(Statement::TupleAccess { .. }) => false,
        Some(Statement::Literal { .. }) => {
            if let Some(Statement::Literal { value, .. }) = tc.stmt_mut(pos) {
                value.mutate(&ctx.config.primitives, ctx.rng);
            }
            true
        }
        Some(Statement::ArrayInit { elements, .. }) | Some(Statement::TupleInit { elements, .. }) => {
            if elements.is_empty() {
                false
            } else {
                let index = ctx.rng.index(elements.len());
                replace_arg(tc, pos, index, ctx).is_some()
            }
        }
        Some(Statement::Invoke { callable, .. }) => {
            if matches!(*callable, Callable::EnumInit(_)) {
                replace_invocation(tc, pos, ctx)
            } else if ctx.rng.chance(ctx.config.mutation.p_change_parameter) {
                replace_invocation(tc, pos, ctx) || change_args(tc, pos, ctx)
            } else {
                change_args(tc, pos, ctx)
            }
        }
    };
    if !changed {
        *tc = snapshot;
    }
    changed
}

/// Replace each argument of the statement at `pos` with probability `1/n`.
fn change_args(tc: &mut TestCase, mut pos: usize, ctx: &mut GenContext<'_>) -> bool {
    let n = tc.stmt(pos).map_or(0, |s| s.args().len());
    if n == 0 {
        return false;
    }
    let p = 1.0 / n as f64;
    let mut changed = false;
    for index in 0..n {
        if ctx.rng.chance(p) {
            if let Some(new_pos) = replace_arg(tc, pos, index, ctx) {
                pos = new_pos;
                changed = true;
            }
        }
    }
    changed
}

/// Swap one argument for another value of the same type.
///
/// Returns the statement's position afterwards.
fn replace_arg(tc: &mut TestCase, pos: usize, index: usize, ctx: &mut GenContext<'_>) -> Option<usize> {
    let args = tc.stmt(pos)?.args();
    let old = *args.get(index)?;
    let ty = tc.var_type(old)?.clone();
    let exclude = tc.with_borrowed_targets(&args);
    let before = tc.len();
    let new = ctx.arg_for(tc, &ty, pos, &exclude)?;
    let pos = pos + (tc.len() - before);
    tc.stmt_mut(pos)?.set_arg(index, new);
    Some(pos)
}

/// Replace the callable at `pos` with another generator of the same value.
fn replace_invocation(tc: &mut TestCase, pos: usize, ctx: &mut GenContext<'_>) -> bool {
    let Some(Statement::Invoke {
        callable,
        returns: Some(returns),
        ..
    }) = tc.stmt(pos).cloned()
    else {
        return false;
    };
    let Some(ty) = tc.var_type(returns).cloned() else {
        return false;
    };
    let binding = tc.file_path_binding();
    let candidates: Vec<Arc<Callable>> = ctx
        .catalog
        .generators_of(&ty, binding.as_deref())
        .unwrap_or_default()
        .into_iter()
        .filter(|c| **c != *callable)
        .filter(|c| c.return_type().is_some_and(|ret| ret.can_be_same_as(&ty)))
        .collect();
    let Some(replacement) = ctx.rng.choose(&candidates).cloned() else {
        return false;
    };

    let Some(ret) = replacement.return_type() else {
        return false;
    };
    let Ok(mut binding) = TypeBinding::from_types(ret, &ty) else {
        return false;
    };
    binding.add_generics(replacement.generics());
    for generic in binding.unbound() {
        let Some(concrete) = ctx.type_for(&generic) else {
            return false;
        };
        if binding.bind(&generic, concrete).is_err() {
            return false;
        }
    }
    if ret.bind_generics(&binding) != ty {
        return false;
    }

    let mut pos = pos;
    let mut args: Vec<VarId> = Vec::new();
    for param in replacement.params().iter() {
        let param_ty = param.ty.bind_generics(&binding);
        let mut exclude = tc.with_borrowed_targets(&args);
        exclude.push(returns);
        let before = tc.len();
        let Some(arg) = ctx.arg_for(tc, &param_ty, pos, &exclude) else {
            return false;
        };
        pos += tc.len() - before;
        args.push(arg);
    }
    tc.replace_stmt(
        pos,
        Statement::Invoke {
            callable: replacement,
            args,
            binding,
            returns: Some(returns),
        },
    );
    tc.resolve_file_binding();
    true
}

/// Insert random statements while `unit() <= alpha^count` and the test is
/// below its maximum length.
pub fn insert_stmts(tc: &mut TestCase, ctx: &mut GenContext<'_>) -> bool {
    let alpha = ctx.config.mutation.p_stmt_insert;
    let max_length = ctx.config.chromosome.max_length;
    let mut changed = false;
    let mut count = 1;
    // every successful attempt adds a statement, so `max_length` attempts can fill the test
    while tc.len() < max_length
        && count as usize <= max_length
        && ctx.rng.unit() <= alpha.powi(count)
    {
        changed |= ctx.insert_random_stmt(tc);
        count += 1;
    }
    tc.truncate_to(max_length);
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::chromosome::fixtures::{self, Fixture};
    use crate::compute::chromosome::PrimValue;
    use crate::schema::{IntTy, Prim, Type};

    fn find(fx: &Fixture, name: &str) -> Arc<Callable> {
        fx.catalog
            .callables()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .unwrap()
    }

    /// Two independent points, then a line over the second one.
    fn two_points(fx: &mut Fixture) -> TestCase {
        let new = find(fx, "new");
        let mut tc = TestCase::new(1);
        let mut ctx = fx.ctx();
        assert!(ctx.insert_callable(&mut tc, &new));
        assert!(ctx.insert_callable(&mut tc, &new));
        tc
    }

    #[test]
    fn test_deleting_unused_statement_succeeds() {
        let mut fx = Fixture::new(1);
        let mut tc = two_points(&mut fx);
        let len = tc.len();
        let last = len - 1;
        assert_eq!(delete_statement(&mut tc, last, &mut fx.ctx()), DeleteOutcome::Deleted);
        assert_eq!(tc.len(), len - 1);
        assert_eq!(tc.check_invariants(), Ok(()));
    }

    #[test]
    fn test_deleting_used_value_rewires_to_alternative() {
        let mut fx = Fixture::new(2);
        let mut tc = TestCase::new(1);
        let int = Type::Prim(Prim::Int(IntTy::I32));
        let a = tc.new_var(int.clone());
        tc.push_stmt(Statement::Literal {
            value: PrimValue::Int(IntTy::I32, 1),
            returns: a,
        });
        let b = tc.new_var(int.clone());
        tc.push_stmt(Statement::Literal {
            value: PrimValue::Int(IntTy::I32, 2),
            returns: b,
        });
        let p = tc.new_var(fixtures::point());
        tc.push_stmt(Statement::Invoke {
            callable: find(&fx, "new"),
            args: vec![a, b],
            binding: TypeBinding::new(),
            returns: Some(p),
        });
        assert_eq!(delete_statement(&mut tc, 1, &mut fx.ctx()), DeleteOutcome::Deleted);
        assert_eq!(tc.stmt(1).unwrap().args(), vec![a, a]);
        assert_eq!(tc.check_invariants(), Ok(()));
    }

    #[test]
    fn test_deleting_without_alternative_is_rejected() {
        let mut fx = Fixture::new(3);
        let mut tc = TestCase::new(1);
        let a = tc.new_var(Type::Prim(Prim::Int(IntTy::I32)));
        tc.push_stmt(Statement::Literal {
            value: PrimValue::Int(IntTy::I32, 1),
            returns: a,
        });
        let p = tc.new_var(fixtures::point());
        tc.push_stmt(Statement::Invoke {
            callable: find(&fx, "new"),
            args: vec![a, a],
            binding: TypeBinding::new(),
            returns: Some(p),
        });
        let before = tc.clone();
        assert_eq!(
            delete_statement(&mut tc, 0, &mut fx.ctx()),
            DeleteOutcome::Rejected { unresolved: 2 }
        );
        assert_eq!(tc.stmts(), before.stmts());
    }

    #[test]
    fn test_literal_change_keeps_type() {
        let mut fx = Fixture::new(4);
        let mut tc = two_points(&mut fx);
        let var = tc.stmt(0).unwrap().returns().unwrap();
        let ty = tc.var_type(var).cloned();
        assert!(change_statement(&mut tc, 0, &mut fx.ctx()));
        assert_eq!(tc.stmt(0).unwrap().returns(), Some(var));
        assert_eq!(tc.var_type(var).cloned(), ty);
    }

    #[test]
    fn test_reference_statements_are_not_changed() {
        let mut fx = Fixture::new(4);
        let mut tc = TestCase::new(1);
        let x = tc.new_var(Type::Prim(Prim::Int(IntTy::I32)));
        tc.push_stmt(Statement::Literal {
            value: PrimValue::Int(IntTy::I32, 3),
            returns: x,
        });
        let p = tc.new_var(fixtures::point());
        tc.push_stmt(Statement::Invoke {
            callable: find(&fx, "new"),
            args: vec![x, x],
            binding: TypeBinding::new(),
            returns: Some(p),
        });
        let r = tc.new_var(Type::reference(fixtures::point(), false));
        let ref_pos = tc.push_stmt(Statement::Ref {
            target: p,
            mutable: false,
            returns: r,
        });
        let n = tc.new_var(Type::Prim(Prim::Uint(crate::schema::UintTy::U64)));
        tc.push_stmt(Statement::Invoke {
            callable: find(&fx, "norm"),
            args: vec![r],
            binding: TypeBinding::new(),
            returns: Some(n),
        });
        let before = tc.clone();
        assert!(!change_statement(&mut tc, ref_pos, &mut fx.ctx()));
        assert_eq!(tc.stmts(), before.stmts());
    }

    #[test]
    fn test_mutation_preserves_invariants() {
        for seed in 0..40 {
            let mut fx = Fixture::new(seed);
            fx.config.mutation.p_test_delete = 1.0;
            fx.config.mutation.p_test_change = 1.0;
            fx.config.mutation.p_test_insert = 1.0;
            fx.config.mutation.p_change_parameter = 0.5;
            let mut tc = two_points(&mut fx);
            for _ in 0..5 {
                mutate(&mut tc, &mut fx.ctx());
                assert_eq!(tc.check_invariants(), Ok(()));
                assert!(tc.len() <= fx.config.chromosome.max_length);
            }
        }
    }

    #[test]
    fn test_insert_respects_max_length() {
        let mut fx = Fixture::new(9);
        fx.config.chromosome.max_length = 5;
        fx.config.mutation.p_stmt_insert = 1.0;
        let mut tc = TestCase::new(1);
        insert_stmts(&mut tc, &mut fx.ctx());
        assert!(tc.len() <= 5);
        assert_eq!(tc.check_invariants(), Ok(()));
    }
}
