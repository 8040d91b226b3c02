//! Per-scope result aggregation.

use std::fmt;

use lazer_core::{Combination, RepetitionOutcome, StopReason};

/// Outcome of one repetition under one combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinationRecord {
    /// 1-based repetition number.
    pub repetition: u64,
    pub combination: Combination,
    pub outcome: RepetitionOutcome,
    /// Failure message of a failing repetition.
    pub message: Option<String>,
}

impl CombinationRecord {
    pub fn failed(&self) -> bool {
        self.outcome == RepetitionOutcome::Failed
    }
}

/// Aggregated result of one scope's exploration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeReport {
    pub scope: String,
    /// The body picked at least once.
    pub parameterized: bool,
    pub stop: StopReason,
    pub combinations: Vec<CombinationRecord>,
}

impl ScopeReport {
    pub fn attempted(&self) -> usize {
        self.combinations.len()
    }

    pub fn failed(&self) -> usize {
        self.combinations.iter().filter(|record| record.failed()).count()
    }

    pub fn passed(&self) -> usize {
        self.attempted() - self.failed()
    }

    /// Exploration stopped at a configured limit before every combination ran.
    pub fn capped(&self) -> bool {
        self.stop.is_capped()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &CombinationRecord> {
        self.combinations.iter().filter(|record| record.failed())
    }
}

impl fmt::Display for ScopeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.parameterized {
            let status = if self.is_success() { "passed" } else { "failed" };
            return write!(f, "{}: {}", self.scope, status);
        }
        write!(
            f,
            "{}: {} combination(s), {} passed, {} failed ({})",
            self.scope,
            self.attempted(),
            self.passed(),
            self.failed(),
            self.stop
        )
    }
}
