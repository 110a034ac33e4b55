//! Archive of covering tests.

use std::collections::{BTreeMap, BTreeSet};

use crate::compute::catalog::CallableUsage;
use crate::compute::chromosome::TestCase;
use crate::compute::coverage::Target;

/// Best covering test per covered target.
///
/// Coverage only grows: a covered target keeps a test for the rest of the
/// run, and is only handed to a shorter test covering it too.
#[derive(Debug, Default)]
pub struct CoverageArchive {
    /// Targets the archive tracks.
    targets: BTreeSet<Target>,
    /// Covering test per covered target.
    covered: BTreeMap<Target, TestCase>,
}

impl CoverageArchive {
    /// Create an archive over `targets`.
    pub fn new(targets: BTreeSet<Target>) -> Self {
        Self {
            targets,
            covered: BTreeMap::new(),
        }
    }

    /// Record every target covered by `tests`.
    ///
    /// Returns the number of targets covered for the first time.
    pub fn update(&mut self, tests: &[TestCase]) -> usize {
        let mut newly_covered = 0;
        for tc in tests {
            for (target, &distance) in tc.coverage() {
                if distance != 0.0 || !self.targets.contains(target) {
                    continue;
                }
                match self.covered.get(target) {
                    Some(existing) if existing.len() <= tc.len() => {}
                    Some(existing) => {
                        log::debug!(
                            "Test {} replaces test {} for {} ({} < {} statements)",
                            tc.id(),
                            existing.id(),
                            target,
                            tc.len(),
                            existing.len()
                        );
                        self.covered.insert(target.clone(), tc.clone());
                    }
                    None => {
                        self.covered.insert(target.clone(), tc.clone());
                        newly_covered += 1;
                    }
                }
            }
        }
        if newly_covered > 0 {
            log::info!(
                "Archive covers {}/{} targets ({:.1}%), {} tests",
                self.covered_count(),
                self.total_targets(),
                self.coverage(),
                self.len()
            );
        }
        newly_covered
    }

    /// Distinct covering tests, by id.
    pub fn get(&self) -> Vec<&TestCase> {
        let mut by_id: BTreeMap<u64, &TestCase> = BTreeMap::new();
        for tc in self.covered.values() {
            by_id.entry(tc.id()).or_insert(tc);
        }
        by_id.into_values().collect()
    }

    pub fn is_covered(&self, target: &Target) -> bool {
        self.covered.contains_key(target)
    }

    /// The test covering `target`.
    pub fn covering(&self, target: &Target) -> Option<&TestCase> {
        self.covered.get(target)
    }

    pub fn covered_count(&self) -> usize {
        self.covered.len()
    }

    pub fn total_targets(&self) -> usize {
        self.targets.len()
    }

    /// Targets not covered yet.
    pub fn uncovered(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter().filter(|t| !self.covered.contains_key(*t))
    }

    /// Coverage percentage in [0, 100]; an archive without targets is complete.
    pub fn coverage(&self) -> f64 {
        if self.targets.is_empty() {
            return 100.0;
        }
        100.0 * self.covered.len() as f64 / self.targets.len() as f64
    }

    pub fn is_complete(&self) -> bool {
        self.covered.len() == self.targets.len()
    }

    /// Number of distinct covering tests.
    pub fn len(&self) -> usize {
        self.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.covered.is_empty()
    }

    /// Callable usage over the archived tests.
    pub fn callable_usage(&self) -> CallableUsage {
        let tests = self.get();
        CallableUsage::from_callables(tests.iter().flat_map(|tc| tc.callables()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::chromosome::{PrimValue, Statement};
    use crate::schema::{Prim, Type};

    fn targets() -> BTreeSet<Target> {
        (0..4).map(|b| Target::new("f", b)).collect()
    }

    fn covering(id: u64, len: usize, blocks: &[(u64, f64)]) -> TestCase {
        let mut tc = TestCase::new(id);
        for _ in 0..len {
            let var = tc.new_var(Type::Prim(Prim::Bool));
            tc.push_stmt(Statement::Literal {
                value: PrimValue::Bool(true),
                returns: var,
            });
        }
        for &(block, distance) in blocks {
            tc.record_distance(Target::new("f", block), distance);
        }
        tc
    }

    #[test]
    fn test_update_covers_zero_distance_targets() {
        let mut archive = CoverageArchive::new(targets());
        let added = archive.update(&[covering(1, 3, &[(0, 0.0), (1, 2.0)])]);
        assert_eq!(added, 1);
        assert!(archive.is_covered(&Target::new("f", 0)));
        assert!(!archive.is_covered(&Target::new("f", 1)));
        assert!((archive.coverage() - 25.0).abs() < 1e-9);
        assert_eq!(archive.uncovered().count(), 3);
    }

    #[test]
    fn test_shorter_test_replaces_covering_test() {
        let mut archive = CoverageArchive::new(targets());
        archive.update(&[covering(1, 5, &[(0, 0.0), (2, 0.0)])]);
        let added = archive.update(&[covering(2, 2, &[(0, 0.0)])]);
        assert_eq!(added, 0);
        assert_eq!(archive.covering(&Target::new("f", 0)).unwrap().id(), 2);
        assert_eq!(archive.covering(&Target::new("f", 2)).unwrap().id(), 1);
        let ids: Vec<u64> = archive.get().iter().map(|tc| tc.id()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_coverage_is_monotone() {
        let mut archive = CoverageArchive::new(targets());
        archive.update(&[covering(1, 2, &[(1, 0.0)])]);
        archive.update(&[covering(2, 9, &[(1, 4.0)]), covering(3, 9, &[(1, 0.0)])]);
        assert_eq!(archive.covering(&Target::new("f", 1)).unwrap().id(), 1);
        assert_eq!(archive.covered_count(), 1);
    }

    #[test]
    fn test_unknown_targets_are_ignored() {
        let mut archive = CoverageArchive::new(targets());
        let mut tc = TestCase::new(7);
        tc.record_distance(Target::new("g", 0), 0.0);
        assert_eq!(archive.update(&[tc]), 0);
        assert!(archive.is_empty());
        assert!(!archive.is_complete());
    }
}
