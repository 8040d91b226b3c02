//! Repetition of one node per combination.

use std::panic::{self, AssertUnwindSafe};

use lazer_core::{Decision, RepetitionOutcome, ScopeConfig, StopReason};

use super::{
    BoxedNode, Capabilities, DynamicRegistry, EngineContext, ExecutionResult, ExecutionStatus, Failure, LifecycleError,
    Node, NodeError, NodeResult, Reentry, ReentryControl, UniqueId,
};
use crate::driver::RepetitionDriver;
use crate::install::ScopeKey;
use crate::report::ScopeReport;

/// Runs the wrapped node once per combination its body picks.
///
/// - `prepare` claims the scope the first time (keyed by the node's unique id).
/// - `execute` brackets the body with the driver's begin and end, so picks resolve against this node.
/// - `next_execution` records the pass, retires its failure when another repetition follows, and asks the engine to
///   re-enter until the driver stops.
pub struct ParameterizedNode<N> {
    node: N,
    config: ScopeConfig,
    driver: Option<RepetitionDriver>,
    report: Option<ScopeReport>,
}

impl<N: Node<Context = EngineContext>> ParameterizedNode<N> {
    pub fn new(node: N) -> Self {
        Self::with_config(node, ScopeConfig::new())
    }

    /// Limits for this node; unset ones are inherited from the context.
    pub fn with_config(node: N, config: ScopeConfig) -> Self {
        Self {
            node,
            config,
            driver: None,
            report: None,
        }
    }

    pub fn inner(&self) -> &N {
        &self.node
    }

    fn driver(&mut self, operation: &'static str) -> NodeResult<&mut RepetitionDriver> {
        let id = self.node.unique_id();
        self.driver.as_mut().ok_or_else(|| {
            NodeError::Lifecycle(LifecycleError::OutOfOrder {
                id,
                operation,
                phase: "unprepared",
            })
        })
    }

    fn conclude(&mut self) {
        if let Some(driver) = self.driver.take() {
            let report = driver.report();
            tracing::debug!(%report, "parameterized node concluded");
            self.report = Some(report);
        }
    }
}

impl<N: Node<Context = EngineContext>> Node for ParameterizedNode<N> {
    type Context = EngineContext;

    fn unique_id(&self) -> UniqueId {
        self.node.unique_id()
    }

    fn display_name(&self) -> String {
        self.node.display_name()
    }

    fn capabilities(&self) -> Capabilities {
        self.node.capabilities()
    }

    fn skip_reason(&self) -> Option<String> {
        self.node.skip_reason()
    }

    fn prepare(&mut self, parent: &EngineContext) -> NodeResult<EngineContext> {
        let ctx = self.node.prepare(parent)?;
        if self.driver.is_none() {
            let key = ScopeKey::new(self.node.unique_id().as_str());
            let config = self.config.inherit(&ctx.config);
            self.driver = Some(RepetitionDriver::new(ctx.installation.clone(), key, config)?);
            self.report = None;
        }
        Ok(ctx)
    }

    fn before(&mut self, ctx: &EngineContext) -> NodeResult<()> {
        self.node.before(ctx)
    }

    fn execute(&mut self, ctx: &EngineContext, dynamic: &mut dyn DynamicRegistry<EngineContext>) -> NodeResult<()> {
        if !self.driver("execute")?.begin()? {
            let id = self.node.unique_id();
            return Err(Failure::new(format!("exploration of `{id}` was discarded before its repetition began")).into());
        }
        // The activation must be closed before anything else runs on this thread.
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.node.execute(ctx, dynamic)))
            .unwrap_or_else(|payload| Err(Failure::from_panic(payload.as_ref()).into()));
        self.driver("execute")?.end_body()?;
        result
    }

    fn children(&mut self) -> Vec<BoxedNode<EngineContext>> {
        self.node.children()
    }

    fn after(&mut self, ctx: &EngineContext) -> NodeResult<()> {
        self.node.after(ctx)
    }

    fn dynamic_children_finished(&mut self) -> NodeResult<()> {
        self.node.dynamic_children_finished()
    }

    fn cleanup(&mut self, ctx: &EngineContext) -> NodeResult<()> {
        self.node.cleanup(ctx)
    }

    fn next_execution(&mut self, last: &ExecutionResult, control: ReentryControl<'_>) -> NodeResult<Reentry> {
        // Preparation failed before the scope was claimed; nothing ran.
        let Some(driver) = self.driver.as_mut() else {
            return Ok(Reentry::Done);
        };
        if driver.is_stopped() {
            self.conclude();
            return Ok(Reentry::Done);
        }

        let (outcome, message) = match last.status {
            ExecutionStatus::Failed => (
                RepetitionOutcome::Failed,
                last.failure.as_ref().map(|failure| failure.message().to_string()),
            ),
            ExecutionStatus::Successful | ExecutionStatus::Aborted => (RepetitionOutcome::Passed, None),
        };

        let decision = match driver.finish(outcome, message, control.cancelled) {
            Ok(decision) => decision,
            Err(err) => {
                self.conclude();
                return Err(err.into());
            }
        };

        match decision {
            Decision::Repeat => {
                control.retirement.retire(last);
                Ok(Reentry::Again)
            }
            Decision::Stop(reason) => {
                if reason == StopReason::Cancelled {
                    tracing::debug!(node = %self.node.unique_id(), "exploration cancelled");
                }
                self.conclude();
                Ok(Reentry::Done)
            }
        }
    }

    fn scope_report(&self) -> Option<ScopeReport> {
        match &self.driver {
            Some(driver) => Some(driver.report()),
            None => self.report.clone(),
        }
    }
}
