//! Reporting hooks for suite runs.

use std::fmt;
use std::time::Duration;

use crate::engine::{ExecutionResult, UniqueId};
use crate::report::ScopeReport;

/// Trait for reporting suite execution.
///
/// Implement this trait to customize output (console, JSON, TAP, ...). Only completion hooks are required.
pub trait TestReporter {
    /// Called once the statically declared tests have been counted
    fn on_collection_complete(&mut self, _test_count: usize) {}

    /// Called when a test starts its first repetition
    fn on_test_start(&mut self, _test: &TestInfo) {}

    /// Called after every repetition of a test
    fn on_combination_complete(&mut self, _test: &TestInfo, _repetition: u64, _result: &ExecutionResult) {}

    /// Called when a test completes, with the scope report of a test that picked
    fn on_test_complete(&mut self, test: &TestInfo, result: &TestResult, report: Option<&ScopeReport>);

    /// Called when all tests have completed
    fn on_run_complete(&mut self, summary: &TestSummary);
}

/// A test as reported to a [`TestReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestInfo {
    pub id: UniqueId,
    pub name: String,
}

impl TestInfo {
    pub fn new(id: UniqueId, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestResult {
    Passed(Duration),
    /// Duration and the first failure message.
    Failed(Duration, String),
    Skipped(String),
}

impl TestResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, TestResult::Failed(..))
    }
}

/// Summary of a suite run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Failing nodes that are not tests, such as a factory that failed to produce its cases.
    pub errors: usize,
    /// Combinations executed across all tests.
    pub combinations: usize,
    pub failed_combinations: usize,
    pub duration: Duration,
}

impl TestSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }

    pub(crate) fn record(&mut self, result: &TestResult, report: Option<&ScopeReport>) {
        self.total += 1;
        match result {
            TestResult::Passed(_) => self.passed += 1,
            TestResult::Failed(..) => self.failed += 1,
            TestResult::Skipped(_) => {
                self.skipped += 1;
                return;
            }
        }
        match report {
            Some(report) => {
                self.combinations += report.attempted();
                self.failed_combinations += report.failed();
            }
            None => {
                self.combinations += 1;
                self.failed_combinations += usize::from(result.is_failed());
            }
        }
    }
}

impl fmt::Display for TestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.passed > 0 {
            parts.push(format!("{} passed", self.passed));
        }
        if self.failed > 0 {
            parts.push(format!("{} failed", self.failed));
        }
        if self.skipped > 0 {
            parts.push(format!("{} skipped", self.skipped));
        }
        if self.errors > 0 {
            parts.push(format!("{} errors", self.errors));
        }
        if parts.is_empty() {
            parts.push("no tests ran".to_string());
        }
        write!(
            f,
            "{} in {:.2}s ({} combinations, {} failed)",
            parts.join(", "),
            self.duration.as_secs_f64(),
            self.combinations,
            self.failed_combinations
        )
    }
}

/// Reporter emitting structured `tracing` events, one per repetition and one per test.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TracingReporter {
    pub fn new() -> Self {
        Self
    }
}

impl TestReporter for TracingReporter {
    fn on_collection_complete(&mut self, test_count: usize) {
        if test_count == 0 {
            tracing::warn!("no tests collected");
        } else {
            tracing::info!(tests = test_count, "collected");
        }
    }

    fn on_test_start(&mut self, test: &TestInfo) {
        tracing::debug!(test = %test.id, "test started");
    }

    fn on_combination_complete(&mut self, test: &TestInfo, repetition: u64, result: &ExecutionResult) {
        tracing::debug!(
            test = %test.id,
            repetition,
            status = ?result.status,
            failure = result.failure.as_ref().map(|failure| failure.message()),
            "combination finished"
        );
    }

    fn on_test_complete(&mut self, test: &TestInfo, result: &TestResult, report: Option<&ScopeReport>) {
        let combinations = report.map_or(1, ScopeReport::attempted);
        match result {
            TestResult::Passed(duration) => {
                tracing::info!(test = %test.id, combinations, duration_ms = duration.as_millis() as u64, "passed");
            }
            TestResult::Failed(duration, message) => {
                let failed = report.map_or(1, ScopeReport::failed);
                tracing::warn!(
                    test = %test.id,
                    combinations,
                    failed,
                    duration_ms = duration.as_millis() as u64,
                    %message,
                    "failed"
                );
            }
            TestResult::Skipped(reason) => tracing::info!(test = %test.id, %reason, "skipped"),
        }
    }

    fn on_run_complete(&mut self, summary: &TestSummary) {
        if summary.is_success() {
            tracing::info!(%summary, "run complete");
        } else {
            tracing::warn!(%summary, "run complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_display() {
        let summary = TestSummary {
            total: 3,
            passed: 1,
            failed: 1,
            skipped: 1,
            combinations: 9,
            failed_combinations: 2,
            ..TestSummary::default()
        };
        assert_eq!(summary.to_string(), "1 passed, 1 failed, 1 skipped in 0.00s (9 combinations, 2 failed)");
        assert!(!summary.is_success());
    }

    #[test]
    fn test_empty_summary_display() {
        let summary = TestSummary::default();
        assert_eq!(summary.to_string(), "no tests ran in 0.00s (0 combinations, 0 failed)");
        assert!(summary.is_success());
    }

    #[test]
    fn test_skipped_tests_count_no_combinations() {
        let mut summary = TestSummary::default();
        summary.record(&TestResult::Skipped("later".to_string()), None);
        summary.record(&TestResult::Failed(Duration::ZERO, "boom".to_string()), None);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.combinations, 1);
        assert_eq!(summary.failed_combinations, 1);
    }
}
