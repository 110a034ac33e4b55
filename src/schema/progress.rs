//! Progress, history and statistics records of a search run.

use serde::{Deserialize, Serialize};

/// Progress update emitted after each evaluated generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchProgress {
    /// Current generation number, 0 for the initial population.
    pub generation: usize,
    /// Total generations planned.
    pub max_generations: usize,
    /// Current phase of the algorithm.
    pub phase: SearchPhase,
    /// Targets covered by the archive.
    pub covered_targets: usize,
    /// All known targets.
    pub total_targets: usize,
    /// Coverage percentage in [0, 100].
    pub coverage: f64,
    /// Objectives the population is currently ranked against.
    pub active_targets: usize,
    /// Distinct tests retained by the archive.
    pub archive_size: usize,
    /// Average statement count of the population.
    pub avg_length: f64,
    /// Statistics history for plotting.
    pub history: CoverageHistory,
}

/// Current phase of the search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SearchPhase {
    /// Building the initial population.
    #[default]
    Initializing,
    /// Waiting for a batch to be executed.
    Evaluating,
    /// Preference sorting and survivor selection.
    Ranking,
    /// Creating offspring.
    Reproducing,
    /// Search finished.
    Complete,
    /// Search cancelled.
    Stopped,
}

/// Per-generation history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageHistory {
    /// Coverage percentage per generation.
    pub coverage: Vec<f64>,
    /// Active objective count per generation.
    pub active_targets: Vec<usize>,
    /// Average population length per generation.
    pub avg_length: Vec<f64>,
}

impl CoverageHistory {
    pub fn record(&mut self, coverage: f64, active_targets: usize, avg_length: f64) {
        self.coverage.push(coverage);
        self.active_targets.push(active_targets);
        self.avg_length.push(avg_length);
    }

    pub fn len(&self) -> usize {
        self.coverage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coverage.is_empty()
    }
}

/// Coverage summary written next to every generation snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub generation: usize,
    pub covered_targets: usize,
    pub total_targets: usize,
    /// Coverage percentage in [0, 100].
    pub coverage: f64,
    /// Number of tests in the snapshot.
    pub tests: usize,
    pub avg_length: f64,
}

/// Statistics from a search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchStats {
    /// Generations run after the initial population.
    pub generations: usize,
    /// Test batches submitted to the executor.
    pub total_executions: u64,
    /// Batches rejected by the executor.
    pub failed_executions: u64,
    pub covered_targets: usize,
    pub total_targets: usize,
    /// Coverage percentage in [0, 100].
    pub coverage: f64,
    /// Time taken (in seconds).
    pub elapsed_seconds: f64,
    /// Reason for stopping.
    pub stop_reason: StopReason,
}

/// Reason the search stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Reached maximum generations.
    MaxGenerations,
    /// Every target is covered.
    FullCoverage,
    /// User cancelled.
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_records_in_lockstep() {
        let mut history = CoverageHistory::default();
        assert!(history.is_empty());
        history.record(12.5, 3, 4.0);
        history.record(50.0, 5, 6.5);
        assert_eq!(history.len(), 2);
        assert_eq!(history.active_targets, vec![3, 5]);
    }

    #[test]
    fn test_summary_serializes() {
        let summary = GenerationSummary {
            generation: 3,
            covered_targets: 2,
            total_targets: 4,
            coverage: 50.0,
            tests: 10,
            avg_length: 7.5,
        };
        let json = serde_json::to_string(&summary).unwrap();
        let back: GenerationSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
    }
}
