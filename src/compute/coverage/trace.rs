//! Trace lines written by instrumented test binaries.
//!
//! ```text
//! 17 $crate_fn_42$ branch[3 12.5]
//! 17 $crate_fn_42$ root
//! ```

use std::collections::HashMap;

use super::cdg::Target;
use crate::compute::chromosome::TestCase;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TraceError {
    #[error("Malformed trace line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// One distance observation.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub test_id: u64,
    pub target: Target,
    pub distance: f64,
}

/// Parse one line. Lines that do not start with a test id are not ours.
pub fn parse_line(line: &str, number: usize) -> Result<Option<TraceRecord>, TraceError> {
    let malformed = |reason: &str| TraceError::Malformed {
        line: number,
        reason: reason.to_string(),
    };
    let line = line.trim();
    let Some((id, rest)) = line.split_once(char::is_whitespace) else {
        return Ok(None);
    };
    let Ok(test_id) = id.parse::<u64>() else {
        return Ok(None);
    };

    let rest = rest.trim_start();
    let rest = rest
        .strip_prefix('$')
        .ok_or_else(|| malformed("expected `$` before the function id"))?;
    let (global_id, event) = rest
        .split_once('$')
        .ok_or_else(|| malformed("unterminated function id"))?;
    if global_id.is_empty() {
        return Err(malformed("empty function id"));
    }

    let event = event.trim();
    let (block, distance) = if event == "root" {
        (0, 0.0)
    } else {
        let body = event
            .strip_prefix("branch[")
            .and_then(|e| e.strip_suffix(']'))
            .ok_or_else(|| malformed("expected `root` or `branch[<block> <distance>]`"))?;
        let mut parts = body.split_whitespace();
        let block = parts
            .next()
            .and_then(|b| b.parse::<u64>().ok())
            .ok_or_else(|| malformed("bad block id"))?;
        let distance = parts
            .next()
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| !d.is_nan())
            .ok_or_else(|| malformed("bad distance"))?;
        if parts.next().is_some() {
            return Err(malformed("trailing data in branch record"));
        }
        (block, distance)
    };

    Ok(Some(TraceRecord {
        test_id,
        target: Target::new(global_id, block),
        distance,
    }))
}

pub fn parse_trace(text: &str) -> Result<Vec<TraceRecord>, TraceError> {
    let mut records = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if let Some(record) = parse_line(line, i + 1)? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Record each observation on its test case. Returns how many records matched.
pub fn apply(records: &[TraceRecord], tests: &mut [TestCase]) -> usize {
    let index: HashMap<u64, usize> = tests.iter().enumerate().map(|(i, tc)| (tc.id(), i)).collect();
    let mut applied = 0;
    for record in records {
        match index.get(&record.test_id) {
            Some(&i) => {
                tests[i].record_distance(record.target.clone(), record.distance);
                applied += 1;
            }
            None => log::debug!("Trace record for unknown test {}", record.test_id),
        }
    }
    applied
}
