//! Preference sorting and subvector dominance.
//!
//! Candidates are rows of an objective matrix: `fitness[i][j]` is the
//! (minimized) fitness of candidate `i` on objective `j`. Fronts hold row
//! indices.

use std::cmp::Ordering;

/// `a` is no worse than `b` on every objective and strictly better on one.
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    let mut better = false;
    for (x, y) in a.iter().zip(b) {
        if x > y {
            return false;
        }
        if x < y {
            better = true;
        }
    }
    better
}

/// Preference fronts over `fitness`.
///
/// Front 0 holds, for every objective no candidate covers yet, the candidate
/// closest to it (ties go to the shorter test, then the lower index). The rest
/// are sorted into non-dominated fronts.
pub fn preference_sort(fitness: &[Vec<f64>], lengths: &[usize]) -> Vec<Vec<usize>> {
    let objectives = fitness.first().map_or(0, Vec::len);
    let mut preferred = vec![false; fitness.len()];
    for j in 0..objectives {
        let best = (0..fitness.len()).min_by(|&a, &b| {
            fitness[a][j]
                .total_cmp(&fitness[b][j])
                .then(lengths[a].cmp(&lengths[b]))
                .then(a.cmp(&b))
        });
        if let Some(best) = best {
            if fitness[best][j] > 0.0 {
                preferred[best] = true;
            }
        }
    }

    let front_0: Vec<usize> = (0..fitness.len()).filter(|&i| preferred[i]).collect();
    let rest: Vec<usize> = (0..fitness.len()).filter(|&i| !preferred[i]).collect();
    let mut fronts = vec![front_0];
    fronts.extend(fast_non_dominated_sort(fitness, &rest));
    fronts
}

/// Classic fast non-dominated sorting of the rows in `indices`.
pub fn fast_non_dominated_sort(fitness: &[Vec<f64>], indices: &[usize]) -> Vec<Vec<usize>> {
    let n = indices.len();
    let mut dominated: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut domination_count = vec![0usize; n];
    for p in 0..n {
        for q in p + 1..n {
            let (a, b) = (&fitness[indices[p]], &fitness[indices[q]]);
            if dominates(a, b) {
                dominated[p].push(q);
                domination_count[q] += 1;
            } else if dominates(b, a) {
                dominated[q].push(p);
                domination_count[p] += 1;
            }
        }
    }

    let mut fronts = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&p| domination_count[p] == 0).collect();
    while !current.is_empty() {
        let mut next = Vec::new();
        for &p in &current {
            for &q in &dominated[p] {
                domination_count[q] -= 1;
                if domination_count[q] == 0 {
                    next.push(q);
                }
            }
        }
        next.sort_unstable();
        fronts.push(current.iter().map(|&p| indices[p]).collect());
        current = next;
    }
    fronts
}

/// Subvector dominance score of every member of `front`: the most objectives
/// on which any other member beats it. Lower is better.
pub fn subvector_dominance(fitness: &[Vec<f64>], front: &[usize]) -> Vec<usize> {
    front
        .iter()
        .map(|&a| {
            front
                .iter()
                .filter(|&&b| b != a)
                .map(|&b| {
                    fitness[a]
                        .iter()
                        .zip(&fitness[b])
                        .filter(|(x, y)| y < x)
                        .count()
                })
                .max()
                .unwrap_or(0)
        })
        .collect()
}

/// `front` reordered by ascending subvector dominance; stable on ties.
pub fn sort_by_subvector_dominance(fitness: &[Vec<f64>], front: &[usize]) -> Vec<usize> {
    let scores = subvector_dominance(fitness, front);
    let mut order: Vec<usize> = (0..front.len()).collect();
    order.sort_by(|&a, &b| match scores[a].cmp(&scores[b]) {
        Ordering::Equal => a.cmp(&b),
        other => other,
    });
    order.into_iter().map(|i| front[i]).collect()
}

/// Rank all candidates: fronts in order, each sorted by subvector dominance.
pub fn rank(fitness: &[Vec<f64>], lengths: &[usize]) -> Vec<usize> {
    preference_sort(fitness, lengths)
        .iter()
        .flat_map(|front| sort_by_subvector_dominance(fitness, front))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn matrix() -> impl Strategy<Value = Vec<Vec<f64>>> {
        (1usize..5).prop_flat_map(|m| {
            prop::collection::vec(prop::collection::vec(0.0f64..4.0, m), 1..12)
        })
    }

    #[test]
    fn test_dominance_basics() {
        assert!(dominates(&[0.0, 1.0], &[0.5, 1.0]));
        assert!(!dominates(&[0.0, 1.0], &[0.0, 1.0]));
        assert!(!dominates(&[0.0, 2.0], &[1.0, 1.0]));
    }

    #[test]
    fn test_preference_front_takes_best_per_objective() {
        let fitness = vec![
            vec![0.5, 3.0],
            vec![2.0, 0.2],
            vec![1.0, 1.0],
            vec![3.0, 3.0],
        ];
        let fronts = preference_sort(&fitness, &[1, 1, 1, 1]);
        assert_eq!(fronts[0], vec![0, 1]);
        assert_eq!(fronts[1], vec![2]);
        assert_eq!(fronts[2], vec![3]);
    }

    #[test]
    fn test_preference_ties_prefer_shorter_test() {
        let fitness = vec![vec![0.5], vec![0.5], vec![0.5]];
        let fronts = preference_sort(&fitness, &[4, 2, 2]);
        assert_eq!(fronts[0], vec![1]);
    }

    #[test]
    fn test_covered_objective_needs_no_representative() {
        let fitness = vec![vec![0.0, 2.0], vec![1.0, 1.0]];
        let fronts = preference_sort(&fitness, &[3, 3]);
        assert_eq!(fronts[0], vec![1]);
        assert_eq!(fronts[1], vec![0]);
    }

    #[test]
    fn test_subvector_dominance_orders_front() {
        let fitness = vec![vec![1.0, 1.0, 1.0], vec![0.0, 2.0, 2.0], vec![2.0, 0.0, 0.0]];
        // 2 is beaten on one objective at most, the others on two
        assert_eq!(subvector_dominance(&fitness, &[0, 1, 2]), vec![2, 2, 1]);
        assert_eq!(sort_by_subvector_dominance(&fitness, &[0, 1, 2]), vec![2, 0, 1]);
    }

    #[test]
    fn test_rank_is_permutation() {
        let fitness = vec![vec![1.0, 0.0], vec![0.5, 0.5], vec![2.0, 2.0]];
        let mut order = rank(&fitness, &[1, 2, 3]);
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2]);
    }

    proptest! {
        #[test]
        fn prop_dominance_irreflexive_and_asymmetric(m in matrix()) {
            for a in &m {
                prop_assert!(!dominates(a, a));
                for b in &m {
                    prop_assert!(!(dominates(a, b) && dominates(b, a)));
                }
            }
        }

        #[test]
        fn prop_preference_front_is_complete(m in matrix()) {
            let lengths = vec![1; m.len()];
            let fronts = preference_sort(&m, &lengths);
            for j in 0..m[0].len() {
                let best = m.iter().map(|row| row[j]).fold(f64::INFINITY, f64::min);
                if best > 0.0 {
                    prop_assert!(fronts[0].iter().any(|&i| m[i][j] == best));
                }
            }
        }

        #[test]
        fn prop_fronts_partition_population(m in matrix()) {
            let lengths = vec![1; m.len()];
            let mut all: Vec<usize> = preference_sort(&m, &lengths).concat();
            all.sort_unstable();
            prop_assert_eq!(all, (0..m.len()).collect::<Vec<_>>());
        }

        #[test]
        fn prop_later_fronts_never_dominate_earlier(m in matrix()) {
            let indices: Vec<usize> = (0..m.len()).collect();
            let fronts = fast_non_dominated_sort(&m, &indices);
            for (k, front) in fronts.iter().enumerate() {
                for later in &fronts[k..] {
                    for &a in front {
                        for &b in later {
                            prop_assert!(!dominates(&m[b], &m[a]));
                        }
                    }
                }
            }
        }

        #[test]
        fn prop_svd_sort_is_ascending(m in matrix()) {
            let front: Vec<usize> = (0..m.len()).collect();
            let sorted = sort_by_subvector_dominance(&m, &front);
            let scores = subvector_dominance(&m, &sorted);
            prop_assert!(scores.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
