//! Many-objective search loop (MOSA and DynaMOSA).

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::prelude::*;

use crate::compute::catalog::{CallableUsage, Catalog, CatalogError};
use crate::compute::chromosome::{
    AllCallablesGenerator, ChromosomeError, ChromosomeGenerator, GenContext, RandomGenerator,
    SeededGenerator, TestCase,
};
use crate::compute::coverage::{self, GraphError, MirAnalysis, Target, TargetFrontier, fitness};
use crate::schema::{
    ConfigError, CoverageHistory, GenerationSummary, SearchAlgorithm, SearchConfig, SearchPhase,
    SearchProgress, SearchStats, SeedingStrategy, StopReason,
};

use super::archive::CoverageArchive;
use super::crossover::crossover;
use super::executor::{ExecutionError, ExecutionOutcome, Executor};
use super::mutation::mutate;
use super::ranking;
use super::rng::SearchRng;
use super::selection::RankSelection;
use super::snapshot::SnapshotWriter;

/// Generator calls tolerated per requested test before a batch comes up short.
const BATCH_ATTEMPTS_PER_TEST: usize = 4;

/// Errors that abort a search run.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Invalid test case: {0}")]
    Chromosome(#[from] ChromosomeError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Execution failed {attempts} times in a row")]
    RetriesExhausted { attempts: usize },

    #[error("Could not generate an initial population")]
    EmptyPopulation,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of a finished search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Distinct covering tests of the archive.
    pub tests: Vec<TestCase>,
    pub stats: SearchStats,
    pub history: CoverageHistory,
}

/// Search engine evolving a population of tests against an executor.
pub struct SearchEngine<E: Executor> {
    config: SearchConfig,
    catalog: Catalog,
    analysis: MirAnalysis,
    executor: E,
    rng: SearchRng,
    selection: RankSelection,
    archive: CoverageArchive,
    frontier: TargetFrontier,
    usage: CallableUsage,
    /// Ranked best first.
    population: Vec<TestCase>,
    history: CoverageHistory,
    snapshots: Option<SnapshotWriter>,
    generation: usize,
    phase: SearchPhase,
    next_id: u64,
    total_executions: u64,
    failed_executions: u64,
    cancelled: Arc<AtomicBool>,
}

impl<E: Executor> SearchEngine<E> {
    /// Create a new search engine.
    pub fn new(
        config: SearchConfig,
        catalog: Catalog,
        analysis: MirAnalysis,
        executor: E,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        let seed = config.random_seed.unwrap_or_else(rand::random);
        log::debug!("Search seed: {}", seed);
        let snapshots = match &config.output.snapshot_dir {
            Some(dir) => Some(SnapshotWriter::new(dir, config.output.clone())?),
            None => None,
        };

        Ok(Self {
            rng: SearchRng::new(seed),
            selection: RankSelection::new(config.selection.bias),
            archive: CoverageArchive::new(analysis.targets()),
            frontier: TargetFrontier::new(&analysis),
            usage: CallableUsage::default(),
            population: Vec::new(),
            history: CoverageHistory::default(),
            snapshots,
            generation: 0,
            phase: SearchPhase::Initializing,
            next_id: 0,
            total_executions: 0,
            failed_executions: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
            config,
            catalog,
            analysis,
            executor,
        })
    }

    /// Write a snapshot of every generation below `dir`.
    pub fn with_snapshots<P: AsRef<Path>>(mut self, dir: P) -> io::Result<Self> {
        self.snapshots = Some(SnapshotWriter::new(dir, self.config.output.clone())?);
        Ok(self)
    }

    /// Get cancellation handle.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn archive(&self) -> &CoverageArchive {
        &self.archive
    }

    /// Current population, best ranked first.
    pub fn population(&self) -> &[TestCase] {
        &self.population
    }

    /// Objectives the population is ranked against.
    fn objectives(&self) -> Vec<Target> {
        match self.config.algorithm {
            SearchAlgorithm::Mosa => self.archive.uncovered().cloned().collect(),
            SearchAlgorithm::DynaMosa => self
                .frontier
                .active()
                .iter()
                .filter(|t| !self.archive.is_covered(t))
                .cloned()
                .collect(),
        }
    }

    /// Fresh tests from the seeding generators.
    fn generate_batch(&mut self, size: usize, all_callables: bool) -> Vec<TestCase> {
        let mut ctx = GenContext::new(
            &self.catalog,
            &self.config,
            self.analysis.constants(),
            &self.usage,
            &mut self.rng,
        );
        let mut next_id = self.next_id;
        let mut batch = Vec::with_capacity(size);

        if all_callables {
            let mut generator = AllCallablesGenerator::new(self.catalog.callables().to_vec());
            while batch.len() < size {
                let Some(tc) = generator.next(&mut ctx, next_id) else {
                    break;
                };
                next_id += 1;
                batch.push(tc);
            }
            log::debug!("Seeded {} tests from single callables", batch.len());
        }

        let mut attempts = 0;
        while batch.len() < size && attempts < size * BATCH_ATTEMPTS_PER_TEST {
            attempts += 1;
            let tc = if batch.len() % 2 == 0 {
                RandomGenerator.next(&mut ctx, next_id)
            } else {
                SeededGenerator.next(&mut ctx, next_id)
            };
            match tc {
                Some(tc) if !tc.is_empty() => {
                    next_id += 1;
                    batch.push(tc);
                }
                _ => log::debug!("Generator produced no statements"),
            }
        }
        if batch.len() < size {
            log::warn!("Generated {} of {} requested tests", batch.len(), size);
        }
        self.next_id = next_id;
        batch
    }

    /// Run `batch` and record its distances, regenerating it after failures.
    fn execute(&mut self, batch: &mut Vec<TestCase>) -> Result<(), SearchError> {
        let mut failures = 0;
        loop {
            for tc in batch.iter() {
                tc.check_invariants()?;
            }
            self.total_executions += 1;
            let reason = match self.executor.execute(batch)? {
                ExecutionOutcome::Ok(records) => {
                    let applied = coverage::apply(&records, batch);
                    log::debug!("Applied {} of {} trace records", applied, records.len());
                    return Ok(());
                }
                ExecutionOutcome::CompilationError(message) => message,
                ExecutionOutcome::Timeout => "execution timed out".to_string(),
            };
            self.failed_executions += 1;
            failures += 1;
            log::warn!(
                "Batch execution failed ({}/{} retries): {}",
                failures,
                self.config.execution.max_retries,
                reason
            );
            if failures > self.config.execution.max_retries {
                return Err(SearchError::RetriesExhausted { attempts: failures });
            }
            let size = batch.len();
            *batch = self.generate_batch(size, false);
        }
    }

    /// Archive, usage and target updates after a batch ran.
    fn absorb(&mut self, batch: &[TestCase]) {
        self.archive.update(batch);
        self.usage = self.archive.callable_usage();
        if self.config.algorithm == SearchAlgorithm::DynaMosa {
            self.frontier
                .update(&self.analysis, |t| self.archive.is_covered(t));
        }
    }

    /// Preference fronts with subvector dominance inside each front, cut to
    /// the population size.
    fn select_survivors(&self, mut candidates: Vec<TestCase>) -> Vec<TestCase> {
        let objectives = self.objectives();
        let analysis = &self.analysis;
        let matrix: Vec<Vec<f64>> = candidates
            .par_iter_mut()
            .map(|tc| {
                objectives
                    .iter()
                    .map(|target| fitness::fitness(analysis, target, tc))
                    .collect()
            })
            .collect();
        let lengths: Vec<usize> = candidates.iter().map(TestCase::len).collect();
        let order = ranking::rank(&matrix, &lengths);

        let mut slots: Vec<Option<TestCase>> = candidates.into_iter().map(Some).collect();
        order
            .into_iter()
            .take(self.config.population.size)
            .filter_map(|i| slots[i].take())
            .collect()
    }

    /// Offspring by rank selection, crossover and mutation.
    fn reproduce(&mut self) -> Vec<TestCase> {
        let size = self.config.population.size;
        let parents = self.population.len();
        let mut ctx = GenContext::new(
            &self.catalog,
            &self.config,
            self.analysis.constants(),
            &self.usage,
            &mut self.rng,
        );
        let mut next_id = self.next_id;
        let mut offspring = Vec::with_capacity(size);

        while offspring.len() < size {
            let a = &self.population[self.selection.select(parents, ctx.rng)];
            let b = &self.population[self.selection.select(parents, ctx.rng)];
            let ids = (next_id, next_id + 1);
            next_id += 2;
            let (mut x, mut y) = if ctx.rng.chance(self.config.selection.crossover_rate) {
                crossover(a, b, &mut ctx, ids)
            } else {
                (
                    a.derive(ids.0, "copy", &[a.id()]),
                    b.derive(ids.1, "copy", &[b.id()]),
                )
            };
            mutate(&mut x, &mut ctx);
            mutate(&mut y, &mut ctx);

            if size - offspring.len() == 1 {
                offspring.push(if ctx.rng.chance(0.5) { x } else { y });
            } else {
                offspring.push(x);
                offspring.push(y);
            }
        }
        self.next_id = next_id;
        offspring
    }

    fn avg_length(&self) -> f64 {
        if self.population.is_empty() {
            return 0.0;
        }
        self.population.iter().map(TestCase::len).sum::<usize>() as f64 / self.population.len() as f64
    }

    /// History entry and snapshot for the current generation.
    fn record_generation(&mut self) -> io::Result<()> {
        let active = self.objectives().len();
        let avg_length = self.avg_length();
        self.history.record(self.archive.coverage(), active, avg_length);
        if let Some(writer) = &self.snapshots {
            let summary = GenerationSummary {
                generation: self.generation,
                covered_targets: self.archive.covered_count(),
                total_targets: self.archive.total_targets(),
                coverage: self.archive.coverage(),
                tests: self.population.len(),
                avg_length,
            };
            writer.write(&summary, &self.population)?;
        }
        Ok(())
    }

    /// Get current progress.
    pub fn progress(&self) -> SearchProgress {
        SearchProgress {
            generation: self.generation,
            max_generations: self.config.population.max_generations,
            phase: self.phase,
            covered_targets: self.archive.covered_count(),
            total_targets: self.archive.total_targets(),
            coverage: self.archive.coverage(),
            active_targets: self.objectives().len(),
            archive_size: self.archive.len(),
            avg_length: self.avg_length(),
            history: self.history.clone(),
        }
    }

    /// Check if the search should stop.
    fn should_stop(&self) -> Option<StopReason> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Some(StopReason::Cancelled);
        }

        if self.archive.is_complete() {
            log::info!(
                "All {} targets covered after {} generations, stopping early",
                self.archive.total_targets(),
                self.generation
            );
            return Some(StopReason::FullCoverage);
        }

        if self.generation >= self.config.population.max_generations {
            return Some(StopReason::MaxGenerations);
        }

        None
    }

    /// Run the search with progress callback.
    pub fn run_with_callback<F>(&mut self, callback: F) -> Result<SearchResult, SearchError>
    where
        F: Fn(&SearchProgress),
    {
        let start_time = Instant::now();
        log::info!(
            "Starting {:?} search: population {}, {} generations, {} targets",
            self.config.algorithm,
            self.config.population.size,
            self.config.population.max_generations,
            self.archive.total_targets()
        );

        // Initial population
        self.phase = SearchPhase::Initializing;
        let all_callables = self.config.seeding.strategy == SeedingStrategy::RandomAndAllCallables;
        let mut population = self.generate_batch(self.config.population.size, all_callables);
        if population.is_empty() {
            return Err(SearchError::EmptyPopulation);
        }
        self.phase = SearchPhase::Evaluating;
        self.execute(&mut population)?;
        self.absorb(&population);
        self.phase = SearchPhase::Ranking;
        self.population = self.select_survivors(population);
        self.record_generation()?;
        callback(&self.progress());

        // Evolution loop
        let stop_reason = loop {
            if let Some(reason) = self.should_stop() {
                break reason;
            }

            self.phase = SearchPhase::Reproducing;
            let mut offspring = self.reproduce();

            self.phase = SearchPhase::Evaluating;
            self.execute(&mut offspring)?;
            self.absorb(&offspring);

            self.phase = SearchPhase::Ranking;
            let mut candidates = std::mem::take(&mut self.population);
            candidates.extend(offspring);
            self.population = self.select_survivors(candidates);

            self.generation += 1;
            self.record_generation()?;
            callback(&self.progress());
        };

        self.phase = match stop_reason {
            StopReason::Cancelled => SearchPhase::Stopped,
            _ => SearchPhase::Complete,
        };
        let elapsed = start_time.elapsed().as_secs_f64();
        log::info!(
            "Search finished ({:?}): {}/{} targets, {} tests, {:.1}s",
            stop_reason,
            self.archive.covered_count(),
            self.archive.total_targets(),
            self.archive.len(),
            elapsed
        );

        Ok(SearchResult {
            tests: self.archive.get().into_iter().cloned().collect(),
            stats: SearchStats {
                generations: self.generation,
                total_executions: self.total_executions,
                failed_executions: self.failed_executions,
                covered_targets: self.archive.covered_count(),
                total_targets: self.archive.total_targets(),
                coverage: self.archive.coverage(),
                elapsed_seconds: elapsed,
                stop_reason,
            },
            history: self.history.clone(),
        })
    }

    /// Run the search (blocking).
    pub fn run(&mut self) -> Result<SearchResult, SearchError> {
        self.run_with_callback(|_| {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::compute::chromosome::fixtures;
    use crate::compute::coverage::TraceRecord;
    use crate::schema::PopulationConfig;

    /// `Point::new` has one block; `norm` has block 0 and a block 1 nested in it.
    const ANALYSIS: &str = r#"[
        {"global_id": "geom_point_new",
         "cdg": {"nodes": [18446744073709551615, 0], "edges": [[0, 1, 1]]}},
        {"global_id": "geom_point_norm",
         "cdg": {"nodes": [18446744073709551615, 0, 1], "edges": [[0, 1, 1], [1, 2, 1]]}}
    ]"#;

    /// Reports the root block of every called function, and block 1 of `norm`
    /// once a test calls it twice.
    struct Oracle {
        batches: usize,
    }

    impl Executor for Oracle {
        fn execute(&mut self, tests: &[TestCase]) -> Result<ExecutionOutcome, ExecutionError> {
            self.batches += 1;
            let mut records = Vec::new();
            for tc in tests {
                let mut norm_calls = 0;
                for callable in tc.callables() {
                    let Some(gid) = callable.global_id() else {
                        continue;
                    };
                    if gid == "geom_point_norm" {
                        norm_calls += 1;
                    }
                    records.push(TraceRecord {
                        test_id: tc.id(),
                        target: Target::new(gid, 0),
                        distance: 0.0,
                    });
                }
                if norm_calls > 0 {
                    records.push(TraceRecord {
                        test_id: tc.id(),
                        target: Target::new("geom_point_norm", 1),
                        distance: if norm_calls > 1 { 0.0 } else { 2.0 },
                    });
                }
            }
            Ok(ExecutionOutcome::Ok(records))
        }
    }

    /// Never gets a batch through.
    struct Broken {
        attempts: Cell<usize>,
    }

    impl Executor for Broken {
        fn execute(&mut self, _tests: &[TestCase]) -> Result<ExecutionOutcome, ExecutionError> {
            self.attempts.set(self.attempts.get() + 1);
            Ok(ExecutionOutcome::CompilationError("error[E0308]: mismatched types".into()))
        }
    }

    fn config(algorithm: SearchAlgorithm) -> SearchConfig {
        SearchConfig {
            algorithm,
            population: PopulationConfig {
                size: 6,
                max_generations: 4,
            },
            random_seed: Some(11),
            ..Default::default()
        }
    }

    fn engine<E: Executor>(algorithm: SearchAlgorithm, executor: E) -> SearchEngine<E> {
        let analysis = MirAnalysis::from_json(ANALYSIS).unwrap();
        SearchEngine::new(config(algorithm), fixtures::catalog(), analysis, executor).unwrap()
    }

    #[test]
    fn test_dynamosa_starts_from_independent_targets() {
        let dyna = engine(SearchAlgorithm::DynaMosa, Oracle { batches: 0 });
        let objectives = dyna.objectives();
        assert_eq!(objectives.len(), 2);
        assert!(!objectives.contains(&Target::new("geom_point_norm", 1)));

        let mosa = engine(SearchAlgorithm::Mosa, Oracle { batches: 0 });
        assert_eq!(mosa.objectives().len(), 3);
    }

    #[test]
    fn test_run_keeps_population_size_and_coverage() {
        let mut engine = engine(SearchAlgorithm::DynaMosa, Oracle { batches: 0 });
        let generations = std::sync::Mutex::new(Vec::new());
        let result = engine
            .run_with_callback(|p| generations.lock().unwrap().push(p.generation))
            .unwrap();

        assert!(result.stats.covered_targets >= 1);
        assert!(matches!(
            result.stats.stop_reason,
            StopReason::MaxGenerations | StopReason::FullCoverage
        ));
        assert_eq!(result.history.len(), result.stats.generations + 1);
        assert_eq!(generations.into_inner().unwrap().len(), result.stats.generations + 1);
        assert_eq!(engine.executor.batches as u64, result.stats.total_executions);
        assert!(engine.population().len() <= 6);
        for tc in &result.tests {
            assert_eq!(tc.check_invariants(), Ok(()));
        }
        let covering: Vec<u64> = result.tests.iter().map(TestCase::id).collect();
        for target in MirAnalysis::from_json(ANALYSIS).unwrap().targets() {
            if let Some(tc) = engine.archive().covering(&target) {
                assert!(covering.contains(&tc.id()));
                assert_eq!(tc.coverage().get(&target), Some(&0.0));
            }
        }
    }

    #[test]
    fn test_coverage_history_never_decreases() {
        let mut engine = engine(SearchAlgorithm::Mosa, Oracle { batches: 0 });
        let result = engine.run().unwrap();
        assert!(result.history.coverage.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_failed_batches_are_retried_then_fatal() {
        let mut engine = engine(
            SearchAlgorithm::DynaMosa,
            Broken {
                attempts: Cell::new(0),
            },
        );
        let retries = engine.config.execution.max_retries;
        match engine.run() {
            Err(SearchError::RetriesExhausted { attempts }) => assert_eq!(attempts, retries + 1),
            other => panic!("unexpected result {:?}", other.map(|r| r.stats)),
        }
        assert_eq!(engine.executor.attempts.get(), retries + 1);
        assert_eq!(engine.failed_executions, retries as u64 + 1);
    }

    #[test]
    fn test_cancellation() {
        let mut engine = engine(SearchAlgorithm::DynaMosa, Oracle { batches: 0 });
        let cancel = engine.cancel_handle();

        // Cancel immediately
        cancel.store(true, Ordering::Relaxed);

        let result = engine.run().unwrap();
        assert_eq!(result.stats.stop_reason, StopReason::Cancelled);
        assert_eq!(result.stats.generations, 0);
        assert_eq!(engine.progress().phase, SearchPhase::Stopped);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = config(SearchAlgorithm::Mosa);
        config.population.size = 1;
        let analysis = MirAnalysis::from_json(ANALYSIS).unwrap();
        let result = SearchEngine::new(config, fixtures::catalog(), analysis, Oracle { batches: 0 });
        assert!(matches!(result, Err(SearchError::Config(ConfigError::PopulationTooSmall(1)))));
    }

    #[test]
    fn test_snapshots_are_written_per_generation() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(SearchAlgorithm::DynaMosa, Oracle { batches: 0 })
            .with_snapshots(dir.path())
            .unwrap();
        let result = engine.run().unwrap();
        for generation in 0..=result.stats.generations {
            let folder = dir.path().join(format!("generation_{generation}"));
            assert!(folder.join("coverage.json").exists());
        }
    }
}
