//! Single-point crossover over statement sequences.

use std::collections::HashMap;

use crate::compute::chromosome::{GenContext, Statement, TestCase, Usage, VarId};

/// Recombine two parents at a common cut point.
///
/// Parents shorter than two statements are passed through unchanged, as is
/// either child that cannot be re-resolved.
pub fn crossover(
    a: &TestCase,
    b: &TestCase,
    ctx: &mut GenContext<'_>,
    ids: (u64, u64),
) -> (TestCase, TestCase) {
    let parents = [a.id(), b.id()];
    if a.len() < 2 || b.len() < 2 {
        return (
            a.derive(ids.0, "copy", &parents),
            b.derive(ids.1, "copy", &parents),
        );
    }
    let shorter = a.len().min(b.len());
    let cut = 1 + ctx.rng.index(shorter - 1);
    let first = crossover_at(a, b, cut, ctx, ids.0)
        .unwrap_or_else(|| a.derive(ids.0, "copy", &parents));
    let second = crossover_at(b, a, cut, ctx, ids.1)
        .unwrap_or_else(|| b.derive(ids.1, "copy", &parents));
    (first, second)
}

/// `head[..cut]` followed by `tail[cut..]`, with the tail's arguments
/// re-resolved against the head's variables.
pub fn crossover_at(
    head: &TestCase,
    tail: &TestCase,
    cut: usize,
    ctx: &mut GenContext<'_>,
    id: u64,
) -> Option<TestCase> {
    let mut child = head.derive(id, "crossover", &[head.id(), tail.id()]);
    while child.len() > cut {
        child.remove_stmt(child.len() - 1);
    }

    let mut remap: HashMap<VarId, VarId> = HashMap::new();
    for (offset, stmt) in tail.stmts().iter().skip(cut).enumerate() {
        let tail_pos = cut + offset;
        let mut stmt = stmt.clone();
        let mapped: Vec<VarId> = stmt.args().iter().filter_map(|a| remap.get(a)).copied().collect();
        let mut resolved: Vec<VarId> = Vec::new();
        for (index, arg) in stmt.args().into_iter().enumerate() {
            let end = child.len();
            let var = match remap.get(&arg) {
                Some(&var) => {
                    if !usable_at(&child, tail, tail_pos, arg, var) {
                        log::debug!("Test {}: {} is no longer usable after crossover", id, var);
                        return None;
                    }
                    var
                }
                None => {
                    let ty = tail.var_type(arg)?.clone();
                    let mut exclude = child.with_borrowed_targets(&resolved);
                    exclude.extend(child.with_borrowed_targets(&mapped));
                    if let Statement::Ref { mutable, .. } = stmt {
                        ctx.borrowable_arg_for(&mut child, &ty, end, mutable, &exclude)?
                    } else {
                        ctx.arg_for(&mut child, &ty, end, &exclude)?
                    }
                }
            };
            stmt.set_arg(index, var);
            resolved.push(var);
        }
        if let Some(returns) = stmt.returns() {
            let ty = tail.var_type(returns)?.clone();
            let fresh = child.new_var(ty);
            remap.insert(returns, fresh);
            rebind_returns(&mut stmt, fresh);
        }
        child.push_stmt(stmt);
    }

    child.resolve_file_binding();
    child.truncate_to(ctx.config.chromosome.max_length);
    if let Err(e) = child.check_invariants() {
        log::warn!("Discarding crossover child: {}", e);
        return None;
    }
    Some(child)
}

/// Whether `mapped` can take the place of `arg` in the statement at the end of `child`.
fn usable_at(child: &TestCase, tail: &TestCase, tail_pos: usize, arg: VarId, mapped: VarId) -> bool {
    let end = child.len();
    match tail.usage_at(tail_pos, arg) {
        Some(Usage::Borrow) => {
            let mutable = matches!(tail.stmt(tail_pos), Some(Statement::Ref { mutable: true, .. }));
            child.is_borrowable_at(mapped, end, mutable)
        }
        Some(Usage::Consume) | Some(Usage::Read) => child.is_consumable_at(mapped, end),
        None => false,
    }
}

fn rebind_returns(stmt: &mut Statement, var: VarId) {
    match stmt {
        Statement::Invoke { returns, .. } => *returns = Some(var),
        Statement::Literal { returns, .. }
        | Statement::Ref { returns, .. }
        | Statement::ArrayInit { returns, .. }
        | Statement::TupleInit { returns, .. }
        | Statement::TupleAccess { returns, .. } => *returns = var,
    }
}
