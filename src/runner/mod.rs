//! Suite runner (pytest-style)
//!
//! Runs a [`TestSuite`] on the reference [`HierarchicalExecutor`] and reports through a [`TestReporter`]:
//!
//! - every test is repeated once per combination of the values it picks;
//! - container limits flow down to the tests inside them;
//! - with `stop_on_fail`, the first failing combination cancels the run. The failing test stops exploring and tests
//!   not yet started are reported as skipped.
//!
//! The installation is installed for the run and uninstalled afterwards, unless it was already installed.

#![deny(clippy::unwrap_used, clippy::expect_used)]

mod reporter;
mod suite;

use std::collections::HashMap;
use std::time::Instant;

use lazer_core::ScopeConfig;
use thiserror::Error;

pub use reporter::{TestInfo, TestReporter, TestResult, TestSummary, TracingReporter};
pub use suite::TestSuite;

use crate::config::{ConfigError, LazerConfig};
use crate::engine::{
    CancellationToken, EngineContext, ExecutionListener, ExecutionResult, ExecutionStatus, HierarchicalExecutor,
    NodeError, NodeOutcome, UniqueId,
};
use crate::install::Installation;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Engine(#[from] NodeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Options for [`run_suite`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Cancel the run at the first failing combination.
    pub stop_on_fail: bool,
    /// Limits for every scope in the run; containers and tests override them.
    pub config: ScopeConfig,
    /// Installation to run in; the global one when unset.
    pub installation: Option<Installation>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &LazerConfig) -> Self {
        Self {
            stop_on_fail: config.stop_on_fail,
            config: config.scope_defaults,
            installation: None,
        }
    }

    /// Options from `LAZER_*` environment variables.
    pub fn from_env() -> Result<Self, RunError> {
        Ok(Self::from_config(&LazerConfig::from_env()?))
    }

    pub fn with_stop_on_fail(mut self, stop: bool) -> Self {
        self.stop_on_fail = stop;
        self
    }

    pub fn with_config(mut self, config: ScopeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_installation(mut self, installation: Installation) -> Self {
        self.installation = Some(installation);
        self
    }
}

/// Run every test in `suite`.
///
/// ## Errors
///
/// Test failures are reported, not returned. An error means the run lost synchronization with the engine (a
/// protocol violation or a lifecycle inconsistency) and was aborted.
#[tracing::instrument(skip_all, fields(suite = %suite.id()))]
pub fn run_suite(
    suite: TestSuite,
    options: &RunOptions,
    reporter: &mut dyn TestReporter,
) -> Result<TestSummary, RunError> {
    let start = Instant::now();
    let installation = options.installation.clone().unwrap_or_else(Installation::global);
    let installed_here = installation.install();
    let cancellation = CancellationToken::new();

    reporter.on_collection_complete(suite.test_count());
    let ctx = EngineContext::new(installation.clone(), options.config).with_cancellation(cancellation.clone());
    let mut bridge = ReporterBridge {
        reporter,
        cancellation: cancellation.clone(),
        stop_on_fail: options.stop_on_fail,
        started: HashMap::new(),
        summary: TestSummary::default(),
    };
    let executed = HierarchicalExecutor::new(cancellation).execute(suite.into_root(), &ctx, &mut bridge);

    if installed_here {
        installation.uninstall();
    }
    executed?;

    let ReporterBridge {
        reporter, mut summary, ..
    } = bridge;
    summary.duration = start.elapsed();
    reporter.on_run_complete(&summary);
    Ok(summary)
}

/// Translates engine events into reporter calls and applies `stop_on_fail`.
struct ReporterBridge<'a> {
    reporter: &'a mut dyn TestReporter,
    cancellation: CancellationToken,
    stop_on_fail: bool,
    started: HashMap<UniqueId, (TestInfo, Instant)>,
    summary: TestSummary,
}

impl ExecutionListener for ReporterBridge<'_> {
    fn node_started(&mut self, id: &UniqueId, name: &str, test: bool) {
        if !test {
            return;
        }
        let info = TestInfo::new(id.clone(), name);
        self.reporter.on_test_start(&info);
        self.started.insert(id.clone(), (info, Instant::now()));
    }

    fn pass_finished(&mut self, id: &UniqueId, pass: u64, result: &ExecutionResult) {
        if let Some((info, _)) = self.started.get(id) {
            self.reporter.on_combination_complete(info, pass, result);
        }
        if self.stop_on_fail && result.is_failed() && !self.cancellation.is_cancelled() {
            tracing::info!(node = %id, "stopping at first failure");
            self.cancellation.cancel();
        }
    }

    fn node_finished(&mut self, outcome: &NodeOutcome) {
        if !outcome.test {
            if outcome.status == ExecutionStatus::Failed {
                tracing::warn!(node = %outcome.id, message = ?outcome.message, "container failed");
                self.summary.errors += 1;
            }
            return;
        }

        let (info, started) = match self.started.remove(&outcome.id) {
            Some((info, started)) => (info, Some(started)),
            None => (TestInfo::new(outcome.id.clone(), outcome.name.clone()), None),
        };
        let duration = started.map(|started| started.elapsed()).unwrap_or_default();
        let result = match (&outcome.skip_reason, outcome.status) {
            (Some(reason), _) => TestResult::Skipped(reason.clone()),
            (None, ExecutionStatus::Failed) => TestResult::Failed(duration, outcome.message.clone().unwrap_or_default()),
            (None, _) => TestResult::Passed(duration),
        };
        self.summary.record(&result, outcome.report.as_ref());
        self.reporter.on_test_complete(&info, &result, outcome.report.as_ref());
    }
}
