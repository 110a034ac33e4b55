//! Initial population generators.

use std::sync::Arc;

use super::generate::GenContext;
use super::statement::VarId;
use super::test_case::TestCase;
use crate::schema::{Callable, Type};

/// Failed insertions tolerated per requested statement.
const ATTEMPTS_PER_STATEMENT: usize = 3;

/// Chance that the seeded generator extends an interesting variable.
const P_SEED_FROM_VARIABLE: f64 = 0.5;

/// Source of fresh test cases.
pub trait ChromosomeGenerator {
    /// Next test case, or `None` once the generator is exhausted.
    fn next(&mut self, ctx: &mut GenContext<'_>, id: u64) -> Option<TestCase>;
}

/// Random calls until the configured initial length.
#[derive(Debug, Clone, Default)]
pub struct RandomGenerator;

impl ChromosomeGenerator for RandomGenerator {
    fn next(&mut self, ctx: &mut GenContext<'_>, id: u64) -> Option<TestCase> {
        let target = ctx.config.chromosome.initial_length;
        let max_length = ctx.config.chromosome.max_length;
        let mut tc = TestCase::new(id);
        let mut failures = 0;
        while tc.len() < target && failures < target * ATTEMPTS_PER_STATEMENT {
            if !ctx.insert_random_stmt(&mut tc) {
                failures += 1;
            }
        }
        tc.truncate_to(max_length);
        Some(tc)
    }
}

/// Random generation that keeps feeding structs and enums already in the test
/// into further calls, which builds deeper object graphs.
#[derive(Debug, Clone, Default)]
pub struct SeededGenerator;

impl SeededGenerator {
    fn interesting_vars(tc: &TestCase) -> Vec<VarId> {
        tc.usable_vars(tc.len())
            .into_iter()
            .filter(|&v| {
                tc.var_type(v)
                    .is_some_and(|ty| matches!(ty.deref(), Type::Struct(_) | Type::Enum(_)))
            })
            .collect()
    }

    fn extend_variable(ctx: &mut GenContext<'_>, tc: &mut TestCase) -> bool {
        let vars = Self::interesting_vars(tc);
        let Some(&var) = ctx.rng.choose(&vars) else {
            return false;
        };
        let candidates = ctx.callables_accepting(tc, var);
        let Some((callable, index)) = ctx.rng.choose(&candidates).cloned() else {
            return false;
        };
        ctx.insert_call_using(tc, var, &callable, index)
    }
}

impl ChromosomeGenerator for SeededGenerator {
    fn next(&mut self, ctx: &mut GenContext<'_>, id: u64) -> Option<TestCase> {
        let target = ctx.config.chromosome.initial_length;
        let max_length = ctx.config.chromosome.max_length;
        let mut tc = TestCase::new(id);
        let mut failures = 0;
        while tc.len() < target && failures < target * ATTEMPTS_PER_STATEMENT {
            let extended =
                ctx.rng.chance(P_SEED_FROM_VARIABLE) && Self::extend_variable(ctx, &mut tc);
            if !extended && !ctx.insert_random_stmt(&mut tc) {
                failures += 1;
            }
        }
        tc.truncate_to(max_length);
        Some(tc)
    }
}

/// One test per catalog callable, calling it repeatedly.
#[derive(Debug, Clone)]
pub struct AllCallablesGenerator {
    callables: Vec<Arc<Callable>>,
    cursor: usize,
}

impl AllCallablesGenerator {
    pub fn new(callables: Vec<Arc<Callable>>) -> Self {
        Self {
            callables,
            cursor: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.callables.len() - self.cursor
    }
}

impl ChromosomeGenerator for AllCallablesGenerator {
    fn next(&mut self, ctx: &mut GenContext<'_>, id: u64) -> Option<TestCase> {
        let max_length = ctx.config.chromosome.max_length;
        while self.cursor < self.callables.len() {
            let callable = Arc::clone(&self.callables[self.cursor]);
            self.cursor += 1;
            let mut tc = TestCase::new(id);
            while tc.len() < max_length {
                let before = tc.len();
                if !ctx.insert_callable(&mut tc, &callable) {
                    break;
                }
                // one call may bring its arguments along
                if tc.len() + (tc.len() - before) > max_length {
                    break;
                }
            }
            tc.truncate_to(max_length);
            if !tc.is_empty() {
                return Some(tc);
            }
            log::debug!("Cannot seed a test for {callable}");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::chromosome::fixtures::Fixture;

    #[test]
    fn test_random_generator_reaches_initial_length() {
        let mut fx = Fixture::new(21);
        fx.config.chromosome.initial_length = 6;
        let mut ctx = fx.ctx();
        let tc = RandomGenerator.next(&mut ctx, 4).unwrap();
        assert_eq!(tc.id(), 4);
        assert!(tc.len() >= 6);
        assert!(tc.len() <= ctx.config.chromosome.max_length);
        assert_eq!(tc.check_invariants(), Ok(()));
    }

    #[test]
    fn test_seeded_generator_keeps_invariants() {
        for seed in 0..10 {
            let mut fx = Fixture::new(seed);
            let mut ctx = fx.ctx();
            let tc = SeededGenerator.next(&mut ctx, seed).unwrap();
            assert_eq!(tc.check_invariants(), Ok(()));
            assert!(tc.len() <= ctx.config.chromosome.max_length);
        }
    }

    #[test]
    fn test_all_callables_generator_covers_catalog() {
        let mut fx = Fixture::new(4);
        fx.config.chromosome.max_length = 12;
        let callables = fx.catalog.callables_in_scope(None, true);
        let mut generator = AllCallablesGenerator::new(callables.clone());
        let mut ctx = fx.ctx();
        let mut produced = Vec::new();
        let mut id = 0;
        while let Some(tc) = generator.next(&mut ctx, id) {
            assert!(tc.len() <= 12);
            assert_eq!(tc.check_invariants(), Ok(()));
            produced.push(tc);
            id += 1;
        }
        assert_eq!(generator.remaining(), 0);
        for callable in &callables {
            assert!(produced.iter().any(|tc| tc.callables().any(|c| c == callable)));
        }
    }
}
