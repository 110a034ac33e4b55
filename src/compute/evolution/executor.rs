//! Execution of candidate test batches.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::compute::chromosome::{TestCase, render_module};
use crate::compute::coverage::{TraceError, TraceRecord, parse_trace};
use crate::schema::{ExecutionConfig, OutputConfig};

/// Interval between checks on a running command.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lines of captured stderr kept in a compilation error.
const STDERR_TAIL_LINES: usize = 40;

/// Result of running one batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The batch ran; every distance observation it produced.
    Ok(Vec<TraceRecord>),
    /// The batch did not build or run.
    CompilationError(String),
    Timeout,
}

/// Errors that prevent a batch from being attempted at all.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("No execution command configured")]
    EmptyCommand,

    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),
}

/// Compiles and runs a batch of tests, reporting the observed distances.
///
/// Implementations block until the whole batch is done.
pub trait Executor {
    fn execute(&mut self, tests: &[TestCase]) -> Result<ExecutionOutcome, ExecutionError>;
}

/// Runs an external command over the rendered test module.
///
/// The batch is written to `tests_file`, the command runs with a timeout, and
/// the instrumented binary's `trace_file` is read back afterwards.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    execution: ExecutionConfig,
    output: OutputConfig,
    /// Working directory of the command.
    workdir: Option<PathBuf>,
}

impl CommandExecutor {
    pub fn new(execution: ExecutionConfig, output: OutputConfig) -> Self {
        Self {
            execution,
            output,
            workdir: None,
        }
    }

    /// Run the command (and resolve relative paths) inside `dir`.
    pub fn with_workdir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.workdir = Some(dir.as_ref().to_path_buf());
        self
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.workdir {
            Some(dir) => dir.join(path),
            None => PathBuf::from(path),
        }
    }

    fn write_tests(&self, tests: &[TestCase]) -> io::Result<PathBuf> {
        let path = self.resolve(&self.execution.tests_file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, render_module(tests, &self.output))?;
        Ok(path)
    }

    fn stderr_tail(path: &Path) -> String {
        let text = fs::read_to_string(path).unwrap_or_default();
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
        lines[start..].join("\n")
    }
}

impl Executor for CommandExecutor {
    fn execute(&mut self, tests: &[TestCase]) -> Result<ExecutionOutcome, ExecutionError> {
        let (program, args) = self
            .execution
            .command
            .split_first()
            .ok_or(ExecutionError::EmptyCommand)?;

        let tests_path = self.write_tests(tests)?;
        let trace_path = self.resolve(&self.execution.trace_file);
        if trace_path.exists() {
            fs::remove_file(&trace_path)?;
        }
        let stderr_path = tests_path.with_extension("stderr");
        let stderr = fs::File::create(&stderr_path)?;

        log::debug!("Running {} tests with `{}`", tests.len(), self.execution.command.join(" "));
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr));
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }
        let mut child = command.spawn().map_err(|source| ExecutionError::Spawn {
            command: program.clone(),
            source,
        })?;

        let timeout = Duration::from_secs(self.execution.timeout_secs);
        let start = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if start.elapsed() >= timeout {
                log::warn!("Batch exceeded {}s, killing {}", self.execution.timeout_secs, program);
                child.kill()?;
                child.wait()?;
                return Ok(ExecutionOutcome::Timeout);
            }
            thread::sleep(POLL_INTERVAL);
        };

        let records = if trace_path.exists() {
            parse_trace(&fs::read_to_string(&trace_path)?)?
        } else {
            Vec::new()
        };
        // failing generated tests still exit non-zero; only a silent failure means nothing ran
        if !status.success() && records.is_empty() {
            return Ok(ExecutionOutcome::CompilationError(format!(
                "{} exited with {}\n{}",
                program,
                status,
                Self::stderr_tail(&stderr_path)
            )));
        }
        Ok(ExecutionOutcome::Ok(records))
    }
}
