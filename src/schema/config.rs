//! Search configuration.
//!
//! Every section deserializes with defaults, so a config file only has to
//! name the values it changes.

use serde::{Deserialize, Serialize};

/// Top-level configuration of a test generation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search algorithm to use.
    #[serde(default)]
    pub algorithm: SearchAlgorithm,
    /// Population and generation settings.
    #[serde(default)]
    pub population: PopulationConfig,
    /// Chromosome length limits.
    #[serde(default)]
    pub chromosome: ChromosomeConfig,
    /// Mutation probabilities.
    #[serde(default)]
    pub mutation: MutationConfig,
    /// Primitive value generation.
    #[serde(default)]
    pub primitives: PrimitiveConfig,
    /// Parent selection and crossover.
    #[serde(default)]
    pub selection: SelectionConfig,
    /// Initial population strategy.
    #[serde(default)]
    pub seeding: SeedingConfig,
    /// Execution of candidate tests.
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Artifact emission.
    #[serde(default)]
    pub output: OutputConfig,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl SearchConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population.size < 2 {
            return Err(ConfigError::PopulationTooSmall(self.population.size));
        }
        if self.population.max_generations == 0 {
            return Err(ConfigError::NoGenerations);
        }
        if self.chromosome.max_length == 0 {
            return Err(ConfigError::ZeroMaxLength);
        }
        if self.chromosome.initial_length > self.chromosome.max_length {
            return Err(ConfigError::InitialLengthTooLarge {
                initial: self.chromosome.initial_length,
                max: self.chromosome.max_length,
            });
        }
        let probabilities = [
            ("mutation.p_test_delete", self.mutation.p_test_delete),
            ("mutation.p_test_change", self.mutation.p_test_change),
            ("mutation.p_test_insert", self.mutation.p_test_insert),
            ("mutation.p_stmt_insert", self.mutation.p_stmt_insert),
            ("mutation.p_change_parameter", self.mutation.p_change_parameter),
            ("mutation.p_local_variables", self.mutation.p_local_variables),
            (
                "primitives.p_random_perturbation",
                self.primitives.p_random_perturbation,
            ),
            ("primitives.p_constant_pool", self.primitives.p_constant_pool),
            ("selection.crossover_rate", self.selection.crossover_rate),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidProbability { name, value });
            }
        }
        if !(self.selection.bias > 1.0 && self.selection.bias <= 2.0) {
            return Err(ConfigError::InvalidBias(self.selection.bias));
        }
        Ok(())
    }
}

/// Many-objective search variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type")]
pub enum SearchAlgorithm {
    /// Every target is an objective from the first generation on.
    Mosa,
    /// Targets enter the objective set once their control dependencies are covered.
    #[default]
    DynaMosa,
}

/// Population settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Population size.
    #[serde(default = "default_population_size")]
    pub size: usize,
    /// Maximum number of generations.
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: default_population_size(),
            max_generations: default_max_generations(),
        }
    }
}

fn default_population_size() -> usize {
    50
}
fn default_max_generations() -> usize {
    100
}

/// Chromosome length limits, in statements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromosomeConfig {
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    /// Length the random generator grows new tests to.
    #[serde(default = "default_initial_length")]
    pub initial_length: usize,
}

impl Default for ChromosomeConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            initial_length: default_initial_length(),
        }
    }
}

fn default_max_length() -> usize {
    40
}
fn default_initial_length() -> usize {
    10
}

/// Mutation probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationConfig {
    #[serde(default = "default_one_third")]
    pub p_test_delete: f64,
    #[serde(default = "default_one_third")]
    pub p_test_change: f64,
    #[serde(default = "default_one_third")]
    pub p_test_insert: f64,
    /// Decay base of repeated statement insertion.
    #[serde(default = "default_p_stmt_insert")]
    pub p_stmt_insert: f64,
    /// Chance that a changed invocation swaps its callable instead of its arguments.
    #[serde(default = "default_p_change_parameter")]
    pub p_change_parameter: f64,
    /// Chance that an insertion calls a method on an existing variable.
    #[serde(default = "default_p_local_variables")]
    pub p_local_variables: f64,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            p_test_delete: default_one_third(),
            p_test_change: default_one_third(),
            p_test_insert: default_one_third(),
            p_stmt_insert: default_p_stmt_insert(),
            p_change_parameter: default_p_change_parameter(),
            p_local_variables: default_p_local_variables(),
        }
    }
}

fn default_one_third() -> f64 {
    1.0 / 3.0
}
fn default_p_stmt_insert() -> f64 {
    0.5
}
fn default_p_change_parameter() -> f64 {
    0.1
}
fn default_p_local_variables() -> f64 {
    0.5
}

/// Primitive value generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimitiveConfig {
    /// Magnitude bound of random integers.
    #[serde(default = "default_max_int")]
    pub max_int: u64,
    #[serde(default = "default_max_string_length")]
    pub max_string_length: usize,
    /// Scale of numeric perturbations.
    #[serde(default = "default_max_delta")]
    pub max_delta: f64,
    /// Chance that a mutated literal is resampled instead of perturbed.
    #[serde(default = "default_p_random_perturbation")]
    pub p_random_perturbation: f64,
    /// Chance of drawing from the constant pool when one is available.
    #[serde(default = "default_p_constant_pool")]
    pub p_constant_pool: f64,
}

impl Default for PrimitiveConfig {
    fn default() -> Self {
        Self {
            max_int: default_max_int(),
            max_string_length: default_max_string_length(),
            max_delta: default_max_delta(),
            p_random_perturbation: default_p_random_perturbation(),
            p_constant_pool: default_p_constant_pool(),
        }
    }
}

fn default_max_int() -> u64 {
    2048
}
fn default_max_string_length() -> usize {
    20
}
fn default_max_delta() -> f64 {
    20.0
}
fn default_p_random_perturbation() -> f64 {
    0.2
}
fn default_p_constant_pool() -> f64 {
    0.5
}

/// Parent selection and crossover.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Probability of recombining two selected parents.
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    /// Rank selection bias, in (1, 2].
    #[serde(default = "default_bias")]
    pub bias: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            crossover_rate: default_crossover_rate(),
            bias: default_bias(),
        }
    }
}

fn default_crossover_rate() -> f64 {
    0.75
}
fn default_bias() -> f64 {
    1.7
}

/// How the initial population is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SeedingStrategy {
    /// Random tests only.
    #[default]
    Random,
    /// One test per callable, then random tests.
    RandomAndAllCallables,
}

/// Seeding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedingConfig {
    #[serde(default)]
    pub strategy: SeedingStrategy,
    /// Draw primitive arguments from harvested constants.
    #[serde(default = "default_use_constant_pool")]
    pub use_constant_pool: bool,
}

impl Default for SeedingConfig {
    fn default() -> Self {
        Self {
            strategy: SeedingStrategy::default(),
            use_constant_pool: default_use_constant_pool(),
        }
    }
}

fn default_use_constant_pool() -> bool {
    true
}

/// Execution of candidate test batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Failed batches tolerated in a row before the run aborts.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Command compiling and running the rendered tests.
    #[serde(default)]
    pub command: Vec<String>,
    /// Where the rendered test module is written.
    #[serde(default = "default_tests_file")]
    pub tests_file: String,
    /// Where the instrumented binary writes its trace lines.
    #[serde(default = "default_trace_file")]
    pub trace_file: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            command: Vec::new(),
            tests_file: default_tests_file(),
            trace_file: default_trace_file(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_max_retries() -> usize {
    3
}
fn default_tests_file() -> String {
    "tests/covgen_tests.rs".to_string()
}
fn default_trace_file() -> String {
    "covgen_trace.log".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}

/// Artifact emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving one snapshot folder per generation.
    #[serde(default)]
    pub snapshot_dir: Option<String>,
    /// Prefix of generated test function names.
    #[serde(default = "default_test_prefix")]
    pub test_prefix: String,
    /// Function called with the test id at the start of every test, so the
    /// instrumentation can attribute its trace lines.
    #[serde(default = "default_monitor_hook")]
    pub monitor_hook: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: None,
            test_prefix: default_test_prefix(),
            monitor_hook: default_monitor_hook(),
        }
    }
}

fn default_test_prefix() -> String {
    "covgen_test".to_string()
}

fn default_monitor_hook() -> Option<String> {
    Some("covgen_monitor::set_test_id".to_string())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Population size must be at least 2, got {0}")]
    PopulationTooSmall(usize),
    #[error("Maximum generations must be non-zero")]
    NoGenerations,
    #[error("Maximum chromosome length must be non-zero")]
    ZeroMaxLength,
    #[error("Initial length {initial} exceeds maximum length {max}")]
    InitialLengthTooLarge { initial: usize, max: usize },
    #[error("Probability {name} must lie in [0, 1], got {value}")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error("Selection bias must lie in (1, 2], got {0}")]
    InvalidBias(f64),
}
