//! Arena-backed test case: statements plus the types of their variables.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::statement::{Statement, Usage, VarId};
use crate::compute::coverage::Target;
use crate::schema::{Callable, Type};

/// Lineage entries kept per test case.
const MAX_LINEAGE: usize = 32;

/// Internal invariant violations. These point at a bug in an operator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChromosomeError {
    #[error("Test {test}: statement {position} uses {var} before it is defined")]
    UseBeforeDefinition { test: u64, position: usize, var: VarId },
    #[error("Test {test}: statement {position} passes {args} arguments for {params} parameters")]
    ArityMismatch {
        test: u64,
        position: usize,
        args: usize,
        params: usize,
    },
    #[error("Test {test}: unknown variable {var}")]
    UnknownVariable { test: u64, var: VarId },
    #[error("Test {test}: {var} is defined twice")]
    DuplicateDefinition { test: u64, var: VarId },
}

/// Operator that produced a test case from its parents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    pub operator: &'static str,
    pub parents: Vec<u64>,
}

/// A reference to a variable, alive from `start` through `end`.
#[derive(Debug, Clone, Copy)]
struct Borrow {
    reference: VarId,
    start: usize,
    end: usize,
    mutable: bool,
}

/// An argument whose variable is not defined before the statement using it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnresolvedUse {
    pub position: usize,
    pub var: VarId,
}

/// A candidate test: an ordered statement list over an arena of typed variables.
///
/// Variable ids index `vars` and stay valid when statements move. A variable is
/// defined by the statement returning it; positions are always looked up.
#[derive(Debug, Clone, Default)]
pub struct TestCase {
    id: u64,
    stmts: Vec<Statement>,
    vars: Vec<Type>,
    lineage: Vec<Lineage>,
    coverage: HashMap<Target, f64>,
    fitness: HashMap<Target, f64>,
}

impl TestCase {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Structural copy under a new id. Coverage and cached fitness are not carried.
    pub fn derive(&self, id: u64, operator: &'static str, parents: &[u64]) -> Self {
        let mut lineage = self.lineage.clone();
        lineage.push(Lineage {
            operator,
            parents: parents.to_vec(),
        });
        if lineage.len() > MAX_LINEAGE {
            lineage.drain(..lineage.len() - MAX_LINEAGE);
        }
        Self {
            id,
            stmts: self.stmts.clone(),
            vars: self.vars.clone(),
            lineage,
            coverage: HashMap::new(),
            fitness: HashMap::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    pub fn stmts(&self) -> &[Statement] {
        &self.stmts
    }

    pub fn stmt(&self, pos: usize) -> Option<&Statement> {
        self.stmts.get(pos)
    }

    /// Mutable access drops coverage, since the test no longer matches it.
    pub fn stmt_mut(&mut self, pos: usize) -> Option<&mut Statement> {
        self.invalidate();
        self.stmts.get_mut(pos)
    }

    pub fn lineage(&self) -> &[Lineage] {
        &self.lineage
    }

    pub fn var_type(&self, var: VarId) -> Option<&Type> {
        self.vars.get(var.0)
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    /// Allocate a variable. It is undefined until a statement returns it.
    pub fn new_var(&mut self, ty: Type) -> VarId {
        self.vars.push(ty);
        VarId(self.vars.len() - 1)
    }

    fn invalidate(&mut self) {
        self.coverage.clear();
        self.fitness.clear();
    }

    pub fn position_of(&self, var: VarId) -> Option<usize> {
        self.stmts.iter().position(|s| s.returns() == Some(var))
    }

    pub fn insert_stmt(&mut self, pos: usize, stmt: Statement) {
        let pos = pos.min(self.stmts.len());
        self.stmts.insert(pos, stmt);
        self.invalidate();
    }

    /// Append; returns the position.
    pub fn push_stmt(&mut self, stmt: Statement) -> usize {
        self.stmts.push(stmt);
        self.invalidate();
        self.stmts.len() - 1
    }

    /// Insert right after the last definition among the statement's arguments.
    pub fn add_stmt(&mut self, stmt: Statement) -> usize {
        let pos = stmt
            .args()
            .iter()
            .filter_map(|&v| self.position_of(v))
            .max()
            .map_or(0, |p| p + 1);
        self.insert_stmt(pos, stmt);
        pos
    }

    pub fn remove_stmt(&mut self, pos: usize) -> Option<Statement> {
        if pos >= self.stmts.len() {
            return None;
        }
        self.invalidate();
        Some(self.stmts.remove(pos))
    }

    pub fn replace_stmt(&mut self, pos: usize, stmt: Statement) -> Option<Statement> {
        let slot = self.stmts.get_mut(pos)?;
        let old = std::mem::replace(slot, stmt);
        self.invalidate();
        Some(old)
    }

    /// Remove the statement at `pos` and every later statement depending on it.
    ///
    /// Returns the number of removed statements.
    pub fn remove_with_dependents(&mut self, pos: usize) -> usize {
        let Some(removed) = self.remove_stmt(pos) else {
            return 0;
        };
        let mut dead: HashSet<VarId> = removed.returns().into_iter().collect();
        let mut count = 1;
        let mut i = pos;
        while i < self.stmts.len() {
            if self.stmts[i].args().iter().any(|a| dead.contains(a)) {
                let stmt = self.stmts.remove(i);
                dead.extend(stmt.returns());
                count += 1;
            } else {
                i += 1;
            }
        }
        count
    }

    /// Drop trailing statements, with their dependents, until at most `max_length` remain.
    pub fn truncate_to(&mut self, max_length: usize) {
        while self.stmts.len() > max_length {
            self.remove_with_dependents(self.stmts.len() - 1);
        }
    }

    /// `vars` plus the targets of those that are references taken in this test.
    pub fn with_borrowed_targets(&self, vars: &[VarId]) -> Vec<VarId> {
        let mut out = vars.to_vec();
        for &var in vars {
            if let Some(Statement::Ref { target, .. }) = self.position_of(var).and_then(|p| self.stmt(p)) {
                out.push(*target);
            }
        }
        out
    }

    pub fn usage_at(&self, pos: usize, var: VarId) -> Option<Usage> {
        let ty = self.var_type(var)?;
        self.stmts.get(pos)?.usage(var, ty)
    }

    /// First position moving `var`.
    pub fn consumed_at(&self, var: VarId) -> Option<usize> {
        (0..self.stmts.len()).find(|&p| self.usage_at(p, var) == Some(Usage::Consume))
    }

    pub fn last_use(&self, var: VarId) -> Option<usize> {
        self.stmts.iter().rposition(|s| s.uses(var))
    }

    /// Last position at which a reference to `var` is still alive.
    pub fn borrow_end(&self, var: VarId) -> Option<usize> {
        self.borrows_of(var).map(|b| b.end).max()
    }

    /// Every reference taken to `var`, with the positions it is alive at.
    fn borrows_of(&self, var: VarId) -> impl Iterator<Item = Borrow> + '_ {
        self.stmts.iter().enumerate().filter_map(move |(p, s)| match s {
            Statement::Ref {
                target,
                mutable,
                returns,
            } if *target == var => Some(Borrow {
                reference: *returns,
                start: p,
                end: self.last_use(*returns).map_or(p, |u| u.max(p)),
                mutable: *mutable,
            }),
            _ => None,
        })
    }

    /// Whether a reference to `var` other than `except`, alive somewhere in
    /// `start..=end`, rules out a borrow of the given mutability over that span.
    fn borrow_conflict(
        &self,
        var: VarId,
        start: usize,
        end: usize,
        mutable: bool,
        except: Option<VarId>,
    ) -> bool {
        self.borrows_of(var).any(|b| {
            Some(b.reference) != except
                && b.start <= end
                && b.end >= start
                && (mutable || b.mutable)
        })
    }

    fn defined_before(&self, var: VarId, pos: usize) -> bool {
        self.position_of(var).is_some_and(|def| def < pos)
    }

    /// Whether a statement at `pos` may move `var`.
    pub fn is_consumable_at(&self, var: VarId, pos: usize) -> bool {
        if !self.defined_before(var, pos) {
            return false;
        }
        if self.var_type(var).is_some_and(Type::is_ref) {
            return self.reference_alive_at(var, pos);
        }
        if self.var_type(var).is_some_and(Type::is_copy) {
            return !self.borrow_conflict(var, pos, pos, false, None);
        }
        self.consumed_at(var).is_none() && self.borrow_end(var).is_none_or(|end| end < pos)
    }

    /// A reference taken by a `Ref` statement dies when its target is moved,
    /// and may only be used up to `pos` if no conflicting borrow of its target
    /// starts in between.
    fn reference_alive_at(&self, var: VarId, pos: usize) -> bool {
        let Some(start) = self.position_of(var) else {
            return true;
        };
        match self.stmts.get(start) {
            Some(&Statement::Ref {
                target, mutable, ..
            }) => {
                self.consumed_at(target).is_none_or(|c| c > pos)
                    && !self.borrow_conflict(target, start, pos, mutable, Some(var))
            }
            _ => true,
        }
    }

    /// Whether a reference to `var` created at `pos` and used only there may be
    /// `mutable`. A mutable borrow needs every earlier reference dead, a shared
    /// one every earlier mutable reference.
    pub fn is_borrowable_at(&self, var: VarId, pos: usize, mutable: bool) -> bool {
        self.is_borrowable_over(var, pos, pos, mutable)
    }

    /// Like [`is_borrowable_at`](Self::is_borrowable_at) for a reference alive
    /// from `start` through `end`.
    pub fn is_borrowable_over(&self, var: VarId, start: usize, end: usize, mutable: bool) -> bool {
        self.defined_before(var, start)
            && self.consumed_at(var).is_none_or(|c| end < c)
            && !self.borrow_conflict(var, start, end, mutable, None)
    }

    /// Variables of exactly `ty` defined before `before`.
    pub fn vars_of_type(&self, ty: &Type, before: usize) -> Vec<VarId> {
        self.stmts
            .iter()
            .take(before)
            .filter_map(Statement::returns)
            .filter(|&v| self.var_type(v) == Some(ty))
            .collect()
    }

    pub fn consumable_vars_of(&self, ty: &Type, before: usize) -> Vec<VarId> {
        self.vars_of_type(ty, before)
            .into_iter()
            .filter(|&v| self.is_consumable_at(v, before))
            .collect()
    }

    pub fn borrowable_vars_of(&self, ty: &Type, before: usize, mutable: bool) -> Vec<VarId> {
        self.vars_of_type(ty, before)
            .into_iter()
            .filter(|&v| self.is_borrowable_at(v, before, mutable))
            .collect()
    }

    /// Every variable defined before `pos`.
    pub fn usable_vars(&self, pos: usize) -> Vec<VarId> {
        self.stmts
            .iter()
            .take(pos)
            .filter_map(Statement::returns)
            .collect()
    }

    /// Same-typed replacements for `var` at a use site.
    pub fn alternatives_for(&self, var: VarId, use_pos: usize, usage: Usage) -> Vec<VarId> {
        let Some(ty) = self.var_type(var) else {
            return Vec::new();
        };
        // a replaced borrow keeps the lifetime of the reference it creates
        let borrow = match self.stmts.get(use_pos) {
            Some(&Statement::Ref {
                mutable, returns, ..
            }) => Some((self.last_use(returns).map_or(use_pos, |u| u.max(use_pos)), mutable)),
            _ => None,
        };
        self.vars_of_type(ty, use_pos)
            .into_iter()
            .filter(|&v| v != var)
            .filter(|&v| match (usage, borrow) {
                (Usage::Borrow, Some((end, mutable))) => {
                    self.is_borrowable_over(v, use_pos, end, mutable)
                }
                (Usage::Borrow, None) => false,
                (Usage::Consume | Usage::Read, _) => self.is_consumable_at(v, use_pos),
            })
            .collect()
    }

    /// Arguments not defined strictly earlier than their use.
    pub fn unresolved_uses(&self) -> Vec<UnresolvedUse> {
        let mut defined = HashSet::new();
        let mut out = Vec::new();
        for (position, stmt) in self.stmts.iter().enumerate() {
            for var in stmt.args() {
                if !defined.contains(&var) {
                    out.push(UnresolvedUse { position, var });
                }
            }
            defined.extend(stmt.returns());
        }
        out
    }

    pub fn check_invariants(&self) -> Result<(), ChromosomeError> {
        let mut defined = HashSet::new();
        for (position, stmt) in self.stmts.iter().enumerate() {
            for var in stmt.args() {
                if var.0 >= self.vars.len() {
                    return Err(ChromosomeError::UnknownVariable { test: self.id, var });
                }
                if !defined.contains(&var) {
                    return Err(ChromosomeError::UseBeforeDefinition {
                        test: self.id,
                        position,
                        var,
                    });
                }
            }
            if let Statement::Invoke { callable, args, .. } = stmt {
                let params = callable.params().len();
                if params != args.len() {
                    return Err(ChromosomeError::ArityMismatch {
                        test: self.id,
                        position,
                        args: args.len(),
                        params,
                    });
                }
            }
            if let Some(var) = stmt.returns() {
                if var.0 >= self.vars.len() {
                    return Err(ChromosomeError::UnknownVariable { test: self.id, var });
                }
                if !defined.insert(var) {
                    return Err(ChromosomeError::DuplicateDefinition { test: self.id, var });
                }
            }
        }
        Ok(())
    }

    pub fn callables(&self) -> impl Iterator<Item = &Arc<Callable>> {
        self.stmts.iter().filter_map(Statement::callable)
    }

    /// Source file the test is bound to by its first non-public callable.
    pub fn file_path_binding(&self) -> Option<String> {
        self.callables()
            .find(|c| !c.is_public())
            .and_then(|c| c.src_file_path())
            .map(str::to_string)
    }

    /// Drop private calls from files other than the binding, with their dependents.
    pub fn resolve_file_binding(&mut self) -> usize {
        let Some(binding) = self.file_path_binding() else {
            return 0;
        };
        let mut removed = 0;
        while let Some(pos) = self.stmts.iter().position(|s| {
            s.callable()
                .is_some_and(|c| !c.is_public() && c.src_file_path() != Some(binding.as_str()))
        }) {
            removed += self.remove_with_dependents(pos);
        }
        if removed > 0 {
            log::debug!("Test {}: removed {} statements outside {}", self.id, removed, binding);
        }
        removed
    }

    /// Raw branch distances observed while running this test.
    pub fn coverage(&self) -> &HashMap<Target, f64> {
        &self.coverage
    }

    /// Keep the smallest observed distance.
    pub fn record_distance(&mut self, target: Target, distance: f64) {
        self.coverage
            .entry(target)
            .and_modify(|d| *d = d.min(distance))
            .or_insert(distance);
        self.fitness.clear();
    }

    pub fn cached_fitness(&self, target: &Target) -> Option<f64> {
        self.fitness.get(target).copied()
    }

    /// Store a fitness value unless one is already cached; returns the cached value.
    pub fn cache_fitness(&mut self, target: Target, value: f64) -> f64 {
        *self.fitness.entry(target).or_insert(value)
    }
}
