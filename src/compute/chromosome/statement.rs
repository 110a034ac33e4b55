//! Statements of a test case.

use std::fmt;
use std::sync::Arc;

use super::value::PrimValue;
use crate::schema::{Callable, Type, TypeBinding};

/// Index of a variable in its test case's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// How a statement uses one of its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    /// Copy or reborrow; leaves the variable usable.
    Read,
    /// Takes a reference to the variable.
    Borrow,
    /// Moves the variable.
    Consume,
}

/// One line of a test.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Call of a catalog callable.
    Invoke {
        callable: Arc<Callable>,
        args: Vec<VarId>,
        binding: TypeBinding,
        returns: Option<VarId>,
    },
    /// Primitive literal.
    Literal { value: PrimValue, returns: VarId },
    /// `&target` or `&mut target`.
    Ref {
        target: VarId,
        mutable: bool,
        returns: VarId,
    },
    /// `[a, b, ...]`
    ArrayInit { elements: Vec<VarId>, returns: VarId },
    /// `(a, b, ...)`
    TupleInit { elements: Vec<VarId>, returns: VarId },
    /// `tuple.index`
    TupleAccess {
        tuple: VarId,
        index: usize,
        returns: VarId,
    },
}

impl Statement {
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Invoke { .. } => "invoke",
            Statement::Literal { .. } => "literal",
            Statement::Ref { .. } => "ref",
            Statement::ArrayInit { .. } => "array",
            Statement::TupleInit { .. } => "tuple",
            Statement::TupleAccess { .. } => "tuple access",
        }
    }

    /// Variable produced by this statement.
    pub fn returns(&self) -> Option<VarId> {
        match self {
            Statement::Invoke { returns, .. } => *returns,
            Statement::Literal { returns, .. }
            | Statement::Ref { returns, .. }
            | Statement::ArrayInit { returns, .. }
            | Statement::TupleInit { returns, .. }
            | Statement::TupleAccess { returns, .. } => Some(*returns),
        }
    }

    /// Argument variables in order.
    pub fn args(&self) -> Vec<VarId> {
        match self {
            Statement::Invoke { args, .. } => args.clone(),
            Statement::Literal { .. } => Vec::new(),
            Statement::Ref { target, .. } => vec![*target],
            Statement::ArrayInit { elements, .. } | Statement::TupleInit { elements, .. } => {
                elements.clone()
            }
            Statement::TupleAccess { tuple, .. } => vec![*tuple],
        }
    }

    fn args_mut(&mut self) -> Vec<&mut VarId> {
        match self {
            Statement::Invoke { args, .. } => args.iter_mut().collect(),
            Statement::Literal { .. } => Vec::new(),
            Statement::Ref { target, .. } => vec![target],
            Statement::ArrayInit { elements, .. } | Statement::TupleInit { elements, .. } => {
                elements.iter_mut().collect()
            }
            Statement::TupleAccess { tuple, .. } => vec![tuple],
        }
    }

    pub fn uses(&self, var: VarId) -> bool {
        self.args().contains(&var)
    }

    /// Rewrites every use of `old` to `new`.
    pub fn replace_var(&mut self, old: VarId, new: VarId) {
        for arg in self.args_mut() {
            if *arg == old {
                *arg = new;
            }
        }
    }

    /// Replaces the argument at `index`.
    pub fn set_arg(&mut self, index: usize, var: VarId) {
        if let Some(slot) = self.args_mut().into_iter().nth(index) {
            *slot = var;
        }
    }

    /// How this statement uses `var`, given the variable's type.
    pub fn usage(&self, var: VarId, ty: &Type) -> Option<Usage> {
        if !self.uses(var) {
            return None;
        }
        Some(match self {
            Statement::Ref { .. } => Usage::Borrow,
            _ if ty.is_copy() || ty.is_ref() => Usage::Read,
            _ => Usage::Consume,
        })
    }

    pub fn callable(&self) -> Option<&Arc<Callable>> {
        match self {
            Statement::Invoke { callable, .. } => Some(callable),
            _ => None,
        }
    }
}
