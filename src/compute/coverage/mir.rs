//! Per-function analysis records: dependency graphs, constants and the
//! dynamic target frontier.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use super::cdg::{Cdg, GraphError, Target};
use crate::compute::chromosome::PrimValue;
use crate::compute::evolution::SearchRng;
use crate::schema::{MirObject, Prim};

/// Analysis files are recognised by this name prefix.
pub const MIR_FILE_PREFIX: &str = "mir";

/// Primitive constants harvested from function bodies.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    by_function: HashMap<String, Vec<PrimValue>>,
}

impl ConstantPool {
    pub fn insert(&mut self, global_id: &str, value: PrimValue) {
        let values = self.by_function.entry(global_id.to_string()).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }

    /// Constants of one function.
    pub fn values(&self, global_id: &str) -> &[PrimValue] {
        self.by_function
            .get(global_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Random constant of the given primitive type from one function.
    pub fn pick(&self, global_id: &str, prim: Prim, rng: &mut SearchRng) -> Option<PrimValue> {
        let matching: Vec<&PrimValue> = self
            .values(global_id)
            .iter()
            .filter(|v| v.prim() == prim)
            .collect();
        rng.choose(&matching).map(|v| (*v).clone())
    }

    pub fn len(&self) -> usize {
        self.by_function.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dependency graphs and constants of every instrumented function.
#[derive(Debug, Clone, Default)]
pub struct MirAnalysis {
    cdgs: BTreeMap<String, Cdg>,
    constants: ConstantPool,
}

impl MirAnalysis {
    pub fn new(objects: Vec<MirObject>) -> Result<Self, GraphError> {
        let mut analysis = Self::default();
        for object in objects {
            let graph = object.cdg.decode()?;
            let cdg = Cdg::parse(&object.global_id, &graph, object.branches, object.assertions)?;
            for constant in &object.constant_pool {
                match PrimValue::from_constant(constant) {
                    Some(value) => analysis.constants.insert(&object.global_id, value),
                    None => log::debug!(
                        "Skipping constant {} of {} with type {}",
                        constant.val,
                        object.global_id,
                        constant.ty
                    ),
                }
            }
            analysis.cdgs.insert(object.global_id, cdg);
        }

        let average_depth = if analysis.cdgs.is_empty() {
            0.0
        } else {
            analysis.cdgs.values().map(Cdg::average_depth).sum::<f64>() / analysis.cdgs.len() as f64
        };
        log::info!(
            "Loaded {} dependency graphs: {} targets, {} independent, average depth {:.2}, {} branches, {} constants",
            analysis.cdgs.len(),
            analysis.targets().len(),
            analysis.independent_targets().len(),
            average_depth,
            analysis.cdgs.values().map(Cdg::branches).sum::<usize>(),
            analysis.constants.len()
        );
        Ok(analysis)
    }

    /// Parse one analysis object or an array of them.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let objects = if value.is_array() {
            serde_json::from_value(value)?
        } else {
            vec![serde_json::from_value(value)?]
        };
        Self::new(objects)
    }

    /// Load every analysis file below `dir`.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self, GraphError> {
        let mut files = Vec::new();
        collect_files(dir.as_ref(), &mut files)?;
        files.sort();
        let mut objects = Vec::with_capacity(files.len());
        for file in files {
            let content = fs::read_to_string(&file)?;
            objects.push(serde_json::from_str(&content)?);
        }
        Self::new(objects)
    }

    pub fn cdg(&self, global_id: &str) -> Result<&Cdg, GraphError> {
        self.cdgs
            .get(global_id)
            .ok_or_else(|| GraphError::UnknownFunction(global_id.to_string()))
    }

    pub fn cdgs(&self) -> impl Iterator<Item = &Cdg> {
        self.cdgs.values()
    }

    pub fn constants(&self) -> &ConstantPool {
        &self.constants
    }

    pub fn targets(&self) -> BTreeSet<Target> {
        self.cdgs.values().flat_map(Cdg::targets).collect()
    }

    pub fn independent_targets(&self) -> BTreeSet<Target> {
        self.cdgs.values().flat_map(Cdg::independent_targets).collect()
    }

    pub fn dependent_targets(&self, target: &Target) -> BTreeSet<Target> {
        self.cdgs
            .get(&target.global_id)
            .map(|cdg| cdg.dependent_targets(target.block))
            .unwrap_or_default()
    }
}

fn collect_files(dir: &Path, out: &mut Vec<std::path::PathBuf>) -> Result<(), GraphError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(MIR_FILE_PREFIX))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Objective set that grows as control dependencies get covered.
#[derive(Debug, Clone, Default)]
pub struct TargetFrontier {
    active: BTreeSet<Target>,
    visited: BTreeSet<Target>,
}

impl TargetFrontier {
    /// Starts from the independent targets.
    pub fn new(analysis: &MirAnalysis) -> Self {
        let active = analysis.independent_targets();
        Self {
            visited: active.clone(),
            active,
        }
    }

    pub fn active(&self) -> &BTreeSet<Target> {
        &self.active
    }

    /// Replaces covered targets by their uncovered dependents.
    ///
    /// Returns the number of targets that entered the frontier.
    pub fn update<F>(&mut self, analysis: &MirAnalysis, is_covered: F) -> usize
    where
        F: Fn(&Target) -> bool,
    {
        let before = self.active.len();
        let covered: Vec<Target> = self.active.iter().filter(|t| is_covered(t)).cloned().collect();
        let mut added = 0;
        for target in covered {
            self.active.remove(&target);
            added += self.expand(analysis, &target, &is_covered);
        }
        log::info!(
            "Targets to cover next: {} ({:+})",
            self.active.len(),
            self.active.len() as i64 - before as i64
        );
        added
    }

    fn expand<F>(&mut self, analysis: &MirAnalysis, target: &Target, is_covered: &F) -> usize
    where
        F: Fn(&Target) -> bool,
    {
        let mut added = 0;
        for child in analysis.dependent_targets(target) {
            if !self.visited.insert(child.clone()) {
                continue;
            }
            if is_covered(&child) {
                added += self.expand(analysis, &child, is_covered);
            } else {
                self.active.insert(child);
                added += 1;
            }
        }
        added
    }
}
