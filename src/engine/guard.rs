//! Stable identity for mutable nodes.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{
    BoxedNode, Capabilities, DynamicRegistry, ExecutionResult, LifecycleError, Node, NodeResult, Reentry,
    ReentryControl, UniqueId,
};
use crate::report::ScopeReport;

static NEXT_GUARD: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one guard instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GuardId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Prepared,
    Executed,
}

impl Phase {
    fn describe(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Prepared => "prepared",
            Phase::Executed => "executed",
        }
    }
}

/// Wraps a node so engine bookkeeping keyed by node identity survives repetitions.
///
/// - Equality and hashing use the guard's own [`GuardId`]; two guards over the same node are never equal.
/// - Every [`Node`] method is forwarded unchanged, except `unique_id`, which returns the identifier captured at
///   construction. Capturing it is the only call made on the wrapped node while constructing.
/// - Lifecycle calls are checked for order. Preparing again before `cleanup`, or executing an unprepared node, is a
///   [`LifecycleError::OutOfOrder`].
///
/// Not `Clone`: a copy would be a second identity for the same node.
#[derive(Debug)]
pub struct IdentityGuard<N> {
    id: GuardId,
    unique_id: UniqueId,
    phase: Phase,
    node: N,
}

impl<N: Node> IdentityGuard<N> {
    pub fn new(node: N) -> Self {
        let unique_id = node.unique_id();
        Self {
            id: GuardId(NEXT_GUARD.fetch_add(1, Ordering::Relaxed)),
            unique_id,
            phase: Phase::Idle,
            node,
        }
    }

    pub fn id(&self) -> GuardId {
        self.id
    }

    pub fn inner(&self) -> &N {
        &self.node
    }

    pub fn inner_mut(&mut self) -> &mut N {
        &mut self.node
    }

    pub fn into_inner(self) -> N {
        self.node
    }

    fn expect_phase(&self, operation: &'static str, allowed: &[Phase]) -> Result<(), LifecycleError> {
        if allowed.contains(&self.phase) {
            return Ok(());
        }
        Err(LifecycleError::OutOfOrder {
            id: self.unique_id.clone(),
            operation,
            phase: self.phase.describe(),
        })
    }
}

impl<N> PartialEq for IdentityGuard<N> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<N> Eq for IdentityGuard<N> {}

impl<N> Hash for IdentityGuard<N> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<N: Node> Node for IdentityGuard<N> {
    type Context = N::Context;

    fn unique_id(&self) -> UniqueId {
        self.unique_id.clone()
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

    fn prepare(&mut self, parent: &Self::Context) -> NodeResult<Self::Context> {
        self.expect_phase("prepare", &[Phase::Idle])?;
        let ctx = self.node.prepare(parent)?;
        self.phase = Phase::Prepared;
        Ok(ctx)
    }

    fn before(&mut self, ctx: &Self::Context) -> NodeResult<()> {
        self.expect_phase("before", &[Phase::Prepared])?;
        self.node.before(ctx)
    }

    fn execute(&mut self, ctx: &Self::Context, dynamic: &mut dyn DynamicRegistry<Self::Context>) -> NodeResult<()> {
        self.expect_phase("execute", &[Phase::Prepared])?;
        self.phase = Phase::Executed;
        self.node.execute(ctx, dynamic)
    }

    fn children(&mut self) -> Vec<BoxedNode<Self::Context>> {
        self.node.children()
    }

    fn after(&mut self, ctx: &Self::Context) -> NodeResult<()> {
        self.expect_phase("after", &[Phase::Prepared, Phase::Executed])?;
        self.node.after(ctx)
    }

    fn dynamic_children_finished(&mut self) -> NodeResult<()> {
        self.node.dynamic_children_finished()
    }

    fn cleanup(&mut self, ctx: &Self::Context) -> NodeResult<()> {
        self.expect_phase("cleanup", &[Phase::Prepared, Phase::Executed])?;
        self.phase = Phase::Idle;
        self.node.cleanup(ctx)
    }

    fn next_execution(&mut self, last: &ExecutionResult, control: ReentryControl<'_>) -> NodeResult<Reentry> {
        self.expect_phase("next_execution", &[Phase::Idle])?;
        self.node.next_execution(last, control)
    }

    fn scope_report(&self) -> Option<ScopeReport> {
        self.node.scope_report()
    }
}
