//! Approach level plus normalized branch distance.

use std::collections::HashSet;

use super::cdg::Target;
use super::mir::MirAnalysis;
use crate::compute::chromosome::TestCase;

/// Fitness of a target that was never reached.
pub const MAX_FITNESS: f64 = f64::MAX;

/// Maps a raw branch distance into `[0, 1)`.
pub fn normalize(distance: f64) -> f64 {
    let d = if distance.is_nan() { 0.0 } else { distance.max(0.0) };
    if d.is_infinite() {
        return 1.0 - f64::EPSILON;
    }
    d / (d + 1.0)
}

/// Uncached fitness of `tc` for `target`. Lower is better, 0 means covered.
///
/// Only a distance recorded for the target itself counts; a target whose
/// branch was never reached is `MAX_FITNESS` however close its ancestors got.
pub fn compute(analysis: &MirAnalysis, target: &Target, tc: &TestCase) -> f64 {
    let Ok(cdg) = analysis.cdg(&target.global_id) else {
        return MAX_FITNESS;
    };
    let Some(&distance) = tc.coverage().get(target) else {
        return MAX_FITNESS;
    };
    let reached: HashSet<u64> = tc
        .coverage()
        .keys()
        .filter(|t| t.global_id == target.global_id)
        .map(|t| t.block)
        .collect();
    // zero whenever the target is reached, unless the block is not in the graph
    match cdg.approach_level(target.block, |b| reached.contains(&b)) {
        Some(level) => level as f64 + normalize(distance),
        None => MAX_FITNESS,
    }
}

/// Cached fitness: the first value computed for a pair is kept until the
/// test case changes.
pub fn fitness(analysis: &MirAnalysis, target: &Target, tc: &mut TestCase) -> f64 {
    if let Some(value) = tc.cached_fitness(target) {
        return value;
    }
    let value = compute(analysis, target, tc);
    tc.cache_fitness(target.clone(), value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// root -> {1, 0, 7}, 1 -> {2, 3, 4}, 4 -> {5, 6}
    const GRAPH: &str = r#"{
        "global_id": "f",
        "cdg": {"nodes": [18446744073709551615, 1, 2, 3, 4, 6, 5, 0, 7],
                "edges": [[0,1,1],[0,7,1],[0,8,1],[1,2,1],[1,3,1],[1,4,1],[4,5,1],[4,6,1]]}
    }"#;

    fn analysis() -> MirAnalysis {
        MirAnalysis::from_json(GRAPH).unwrap()
    }

    fn target(block: u64) -> Target {
        Target::new("f", block)
    }

    #[test]
    fn test_normalize_range() {
        assert_eq!(normalize(0.0), 0.0);
        assert_eq!(normalize(1.0), 0.5);
        assert!(normalize(1e300) < 1.0);
        assert!(normalize(f64::INFINITY) < 1.0);
        assert_eq!(normalize(-3.0), 0.0);
    }

    #[test]
    fn test_unreached_target_is_max() {
        let analysis = analysis();
        let tc = TestCase::new(1);
        assert_eq!(compute(&analysis, &target(6), &tc), MAX_FITNESS);
        assert_eq!(compute(&analysis, &Target::new("g", 1), &tc), MAX_FITNESS);
    }

    #[test]
    fn test_reached_target_uses_its_distance() {
        let analysis = analysis();
        let mut tc = TestCase::new(1);
        tc.record_distance(target(1), 0.0);
        tc.record_distance(target(3), 3.0);
        assert_eq!(compute(&analysis, &target(1), &tc), 0.0);
        assert_eq!(compute(&analysis, &target(3), &tc), 0.75);
    }

    #[test]
    fn test_reached_ancestor_does_not_rank_unreached_target() {
        let analysis = analysis();
        let mut tc = TestCase::new(1);
        tc.record_distance(target(1), 1.0);
        // path root -> 1 -> 4 -> 6, only 1 reached
        assert_eq!(compute(&analysis, &target(6), &tc), MAX_FITNESS);
        tc.record_distance(target(4), 0.0);
        assert_eq!(compute(&analysis, &target(6), &tc), MAX_FITNESS);
        tc.record_distance(target(6), 1.0);
        assert_eq!(compute(&analysis, &target(6), &tc), 0.5);
    }

    #[test]
    fn test_cached_value_is_stable() {
        let analysis = analysis();
        let mut tc = TestCase::new(1);
        tc.record_distance(target(1), 4.0);
        let first = fitness(&analysis, &target(1), &mut tc);
        let second = fitness(&analysis, &target(1), &mut tc);
        assert_eq!(first.to_bits(), second.to_bits());
        assert_eq!(tc.cached_fitness(&target(1)), Some(first));
    }

    proptest! {
        #[test]
        fn prop_fitness_bounds(d1 in 0.0f64..1e6, d4 in proptest::option::of(0.0f64..1e6), block in 0u64..8) {
            let analysis = analysis();
            let mut tc = TestCase::new(7);
            tc.record_distance(target(1), d1);
            if let Some(d) = d4 {
                tc.record_distance(target(4), d);
            }
            let value = fitness(&analysis, &target(block), &mut tc);
            prop_assert!((0.0..=MAX_FITNESS).contains(&value));
            let own = tc.coverage().get(&target(block)).copied();
            prop_assert_eq!(value == 0.0, own == Some(0.0));
        }
    }
}
