//! Per-generation snapshots of the population.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::compute::chromosome::{TestCase, render_test, test_name};
use crate::schema::{GenerationSummary, OutputConfig};

/// Writes `generation_<g>/` folders with one source file per test and a
/// `coverage.json` summary.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
    output: OutputConfig,
}

impl SnapshotWriter {
    /// Create a writer rooted at `dir`, creating it if needed.
    pub fn new<P: AsRef<Path>>(dir: P, output: OutputConfig) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, output })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one generation. Returns the generation folder.
    pub fn write(&self, summary: &GenerationSummary, tests: &[TestCase]) -> io::Result<PathBuf> {
        let folder = self.dir.join(format!("generation_{}", summary.generation));
        fs::create_dir_all(&folder)?;
        for tc in tests {
            let path = folder.join(format!("{}.rs", test_name(tc, &self.output)));
            fs::write(path, render_test(tc, &self.output))?;
        }
        let json = serde_json::to_string_pretty(summary)
            .map_err(io::Error::other)?;
        fs::write(folder.join("coverage.json"), json)?;
        log::debug!("Saved generation {} snapshot to {:?}", summary.generation, folder);
        Ok(folder)
    }
}
