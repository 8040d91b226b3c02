//! Sequential reference engine.
//!
//! ## Per pass
//!
//! 1. `prepare`, then `before`, then `execute` (panics become failures).
//! 2. Static children run, each as its own task.
//! 3. `after`.
//! 4. Dynamically registered children run, then `dynamic_children_finished`.
//! 5. `cleanup`.
//!
//! Step 3 precedes step 4 the way common engines order them, which is why every node is wrapped in a
//! [`PostponingNode`]. Every node is also wrapped in an [`IdentityGuard`], and each task keeps one collector for all
//! of its passes, so repeated nodes depend on [`FailureRetirement`].
//!
//! After each pass the node decides on re-entry. Cancellation is checked before a new pass starts, never during one.

use std::panic::{self, AssertUnwindSafe};

use super::{
    BoxedNode, CancellationToken, ExecutionResult, ExecutionStatus, Failure, FailureCollector, FailureRetirement,
    GuardId, IdentityGuard, Node, NodeError, NodeResult, PostponedAfters, PostponingNode, Reentry, ReentryControl,
    ThrowableCollector, UniqueId,
};
use crate::report::ScopeReport;

/// Final state of one task.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub guard: GuardId,
    pub id: UniqueId,
    pub name: String,
    pub test: bool,
    pub status: ExecutionStatus,
    pub message: Option<String>,
    pub skip_reason: Option<String>,
    /// Passes through the lifecycle.
    pub passes: u64,
    pub report: Option<ScopeReport>,
}

impl NodeOutcome {
    pub fn is_skipped(&self) -> bool {
        self.skip_reason.is_some()
    }
}

/// Observer of an execution.
pub trait ExecutionListener {
    fn node_started(&mut self, _id: &UniqueId, _name: &str, _test: bool) {}

    /// One pass finished with `result`.
    fn pass_finished(&mut self, _id: &UniqueId, _pass: u64, _result: &ExecutionResult) {}

    fn node_finished(&mut self, _outcome: &NodeOutcome) {}
}

#[derive(Debug, Default)]
pub struct NoopListener;

impl ExecutionListener for NoopListener {}

type TaskCollector = FailureRetirement<ThrowableCollector>;

/// Runs a node tree depth-first on the calling thread.
pub struct HierarchicalExecutor<C> {
    postponed: PostponedAfters<C>,
    cancellation: CancellationToken,
    outcomes: Vec<NodeOutcome>,
}

impl<C: Clone + 'static> HierarchicalExecutor<C> {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            postponed: PostponedAfters::new(),
            cancellation,
            outcomes: Vec::new(),
        }
    }

    /// Contexts of `after` calls still waiting for dynamic children.
    pub fn postponed(&self) -> &PostponedAfters<C> {
        &self.postponed
    }

    /// Run `root` and everything below it.
    ///
    /// ## Errors
    ///
    /// The first fatal [`NodeError`]; outcomes collected so far are dropped with the executor.
    pub fn execute(
        mut self,
        root: BoxedNode<C>,
        ctx: &C,
        listener: &mut dyn ExecutionListener,
    ) -> NodeResult<Vec<NodeOutcome>> {
        self.run_task(root, ctx, listener)?;
        Ok(self.outcomes)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(node = %node.unique_id()))]
    fn run_task(&mut self, node: BoxedNode<C>, parent: &C, listener: &mut dyn ExecutionListener) -> NodeResult<()> {
        let mut node = IdentityGuard::new(PostponingNode::new(node, self.postponed.clone()));
        let id = node.unique_id();
        let name = node.display_name();
        let test = node.capabilities().test;

        let skip_reason = match node.skip_reason() {
            Some(reason) => Some(reason),
            None if self.cancellation.is_cancelled() => Some("run cancelled".to_string()),
            None => None,
        };
        if let Some(reason) = skip_reason {
            tracing::debug!(%reason, "node skipped");
            self.finish_task(
                listener,
                NodeOutcome {
                    guard: node.id(),
                    id,
                    name,
                    test,
                    status: ExecutionStatus::Aborted,
                    message: None,
                    skip_reason: Some(reason),
                    passes: 0,
                    report: None,
                },
            );
            return Ok(());
        }

        listener.node_started(&id, &name, test);
        let mut collector = TaskCollector::new(ThrowableCollector::new());
        let mut passes = 0;
        loop {
            passes += 1;
            self.run_pass(&mut node, parent, &mut collector, listener)?;
            let result = ExecutionResult::from_collector(&collector);
            listener.pass_finished(&id, passes, &result);

            let cancelled = self.cancellation.is_cancelled();
            let control = ReentryControl {
                retirement: &mut collector,
                cancelled,
            };
            match node.next_execution(&result, control)? {
                Reentry::Again if !cancelled => tracing::debug!(pass = passes + 1, "re-entering"),
                _ => break,
            }
        }

        let report = node.scope_report();
        let held = collector.held().map(|failure| failure.message().to_string());
        let message = held.or_else(|| {
            report
                .as_ref()
                .and_then(|report| report.failures().next())
                .and_then(|record| record.message.clone())
        });
        let failed = collector.held().is_some() || report.as_ref().is_some_and(|report| !report.is_success());
        let status = if failed {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Successful
        };
        self.finish_task(
            listener,
            NodeOutcome {
                guard: node.id(),
                id,
                name,
                test,
                status,
                message,
                skip_reason: None,
                passes,
                report,
            },
        );
        Ok(())
    }

    fn run_pass<N: Node<Context = C>>(
        &mut self,
        node: &mut N,
        parent: &C,
        collector: &mut TaskCollector,
        listener: &mut dyn ExecutionListener,
    ) -> NodeResult<()> {
        let ctx = match node.prepare(parent) {
            Ok(ctx) => ctx,
            Err(NodeError::Failed(failure)) => {
                collector.record(failure);
                return Ok(());
            }
            Err(fatal) => return Err(fatal),
        };

        let mut dynamic: Vec<BoxedNode<C>> = Vec::new();
        if absorb(collector, node.before(&ctx))? {
            let executed = panic::catch_unwind(AssertUnwindSafe(|| node.execute(&ctx, &mut dynamic)))
                .unwrap_or_else(|payload| Err(NodeError::Failed(Failure::from_panic(payload.as_ref()))));
            if absorb(collector, executed)? {
                for child in node.children() {
                    self.run_task(child, &ctx, listener)?;
                }
            }
        }

        absorb(collector, node.after(&ctx))?;
        if !dynamic.is_empty() {
            tracing::debug!(count = dynamic.len(), "draining dynamic children");
        }
        for child in dynamic {
            self.run_task(child, &ctx, listener)?;
        }
        absorb(collector, node.dynamic_children_finished())?;
        absorb(collector, node.cleanup(&ctx))?;
        Ok(())
    }

    fn finish_task(&mut self, listener: &mut dyn ExecutionListener, outcome: NodeOutcome) {
        tracing::debug!(node = %outcome.id, status = ?outcome.status, passes = outcome.passes, "node finished");
        listener.node_finished(&outcome);
        self.outcomes.push(outcome);
    }
}

/// Collect an ordinary failure; pass fatal errors on. `Ok(true)` when the step succeeded.
fn absorb(collector: &mut TaskCollector, result: NodeResult<()>) -> NodeResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(NodeError::Failed(failure)) => {
            collector.record(failure);
            Ok(false)
        }
        Err(fatal) => Err(fatal),
    }
}
