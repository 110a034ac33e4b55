//! Linear rank-biased parent selection.

use super::rng::SearchRng;

/// Picks positions of a ranked population, best first.
///
/// Rank `i` of `n` has weight `bias - 2 i (bias - 1) / (n - 1)`, so the best
/// rank is drawn `bias` times as often as average and the worst `2 - bias`.
#[derive(Debug, Clone)]
pub struct RankSelection {
    bias: f64,
    /// Cumulative weights for the last population size seen.
    cumulative: Vec<f64>,
}

impl RankSelection {
    pub fn new(bias: f64) -> Self {
        Self {
            bias,
            cumulative: Vec::new(),
        }
    }

    /// Weight of rank `i` among `n`.
    pub fn weight(&self, i: usize, n: usize) -> f64 {
        if n < 2 {
            return 1.0;
        }
        self.bias - 2.0 * i as f64 * (self.bias - 1.0) / (n - 1) as f64
    }

    /// Position in a ranked population of size `n`.
    pub fn select(&mut self, n: usize, rng: &mut SearchRng) -> usize {
        if n < 2 {
            return 0;
        }
        if self.cumulative.len() != n {
            let mut total = 0.0;
            self.cumulative = (0..n)
                .map(|i| {
                    total += self.weight(i, n);
                    total
                })
                .collect();
        }
        let total = self.cumulative[n - 1];
        let r = rng.unit() * total;
        self.cumulative.partition_point(|&c| c <= r).min(n - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_decrease_linearly() {
        let selection = RankSelection::new(1.7);
        let weights: Vec<f64> = (0..5).map(|i| selection.weight(i, 5)).collect();
        assert!((weights[0] - 1.7).abs() < 1e-12);
        assert!((weights[4] - 0.3).abs() < 1e-12);
        assert!(weights.windows(2).all(|w| w[0] > w[1]));
        assert!((weights.iter().sum::<f64>() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_better_ranks_are_drawn_more_often() {
        let mut selection = RankSelection::new(2.0);
        let mut rng = SearchRng::new(3);
        let mut counts = [0usize; 4];
        for _ in 0..4000 {
            counts[selection.select(4, &mut rng)] += 1;
        }
        assert!(counts[0] > counts[1]);
        assert!(counts[1] > counts[2]);
        assert!(counts[2] > counts[3]);
    }

    #[test]
    fn test_single_candidate() {
        let mut selection = RankSelection::new(1.5);
        let mut rng = SearchRng::new(0);
        assert_eq!(selection.select(1, &mut rng), 0);
        assert_eq!(selection.select(0, &mut rng), 0);
    }
}
