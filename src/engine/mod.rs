//! Engine adaptation layer
//!
//! The pick machinery needs a node to run its body more than once. Hierarchical engines run each node through a fixed
//! lifecycle (`prepare` → `before` → `execute` → `after` → `cleanup`), may attach dynamically registered children
//! while executing, and track nodes by identity. This module supplies the pieces that make repetition safe under
//! those rules:
//!
//! - [`Node`]: the lifecycle, as a capability trait an engine adapter implements.
//! - [`IdentityGuard`]: stable identity and lifecycle-order checks around a mutable node.
//! - [`PostponingNode`]: defers `after` until dynamically registered children have run.
//! - [`FailureRetirement`]: keeps a repetition's failure from resurfacing in the next one.
//! - [`ParameterizedNode`]: drives a [`crate::RepetitionDriver`] through the lifecycle.
//! - [`HierarchicalExecutor`]: a sequential reference engine exercising all of the above.
//!
//! ## Errors
//!
//! [`NodeError::Failed`] is an ordinary test failure and is collected. [`NodeError::Protocol`] and
//! [`NodeError::Lifecycle`] mean the adaptation lost synchronization with the engine; they abort the run.

#![deny(clippy::unwrap_used, clippy::expect_used)]

mod collector;
mod executor;
mod guard;
mod nodes;
mod parameterized;
mod postpone;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lazer_core::{LazerError, ScopeConfig};
use thiserror::Error;

use crate::install::Installation;
use crate::report::ScopeReport;

pub use collector::{Failure, FailureCollector, FailureRetirement, RetireFailures, ThrowableCollector};
pub use executor::{ExecutionListener, HierarchicalExecutor, NodeOutcome, NoopListener};
pub use guard::{GuardId, IdentityGuard};
pub use nodes::{ContainerNode, DynamicFactoryNode, Factory, SharedNode, TestBody, TestNode};
pub use parameterized::ParameterizedNode;
pub use postpone::{PostponedAfters, PostponingNode};

// ============================================================================
// Identity
// ============================================================================

/// Engine-assigned identifier of a node, stable across repetitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniqueId(Arc<str>);

impl UniqueId {
    pub fn new(id: impl AsRef<str>) -> Self {
        UniqueId(Arc::from(id.as_ref()))
    }

    /// Identifier of a child named `segment`.
    pub fn child(&self, segment: &str) -> Self {
        UniqueId(Arc::from(format!("{}/{}", self.0, segment)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// The adaptation layer and the engine disagree about where a node is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("`after` of {id} was already postponed")]
    AlreadyPostponed { id: UniqueId },

    #[error("no postponed `after` is stored for {id}")]
    NotPostponed { id: UniqueId },

    #[error("{id}: `{operation}` called while {phase}")]
    OutOfOrder {
        id: UniqueId,
        operation: &'static str,
        phase: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum NodeError {
    /// The node's own code failed. Collected, never fatal.
    #[error("{0}")]
    Failed(Failure),

    #[error(transparent)]
    Protocol(#[from] LazerError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl NodeError {
    /// Whether the error must abort the run instead of failing one node.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, NodeError::Failed(_))
    }
}

impl From<Failure> for NodeError {
    fn from(failure: Failure) -> Self {
        NodeError::Failed(failure)
    }
}

pub type NodeResult<T> = Result<T, NodeError>;

// ============================================================================
// Execution results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Successful,
    Failed,
    /// Not run to completion (skipped or cancelled).
    Aborted,
}

/// Terminal result of one pass through a node's lifecycle.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub failure: Option<Failure>,
}

impl ExecutionResult {
    pub fn successful() -> Self {
        Self {
            status: ExecutionStatus::Successful,
            failure: None,
        }
    }

    pub fn failed(failure: Failure) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            failure: Some(failure),
        }
    }

    pub fn aborted() -> Self {
        Self {
            status: ExecutionStatus::Aborted,
            failure: None,
        }
    }

    /// Result reflecting whatever `collector` reports right now.
    pub fn from_collector(collector: &dyn FailureCollector) -> Self {
        match collector.held() {
            Some(failure) => Self::failed(failure.clone()),
            None => Self::successful(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == ExecutionStatus::Failed
    }
}

// ============================================================================
// Cancellation and context
// ============================================================================

/// Run-wide cancellation flag shared by clones.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.0.swap(true, Ordering::SeqCst) {
            tracing::debug!("run cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Context handed down the node tree by the reference nodes.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub installation: Installation,
    /// Limits inherited from enclosing containers.
    pub config: ScopeConfig,
    pub cancellation: CancellationToken,
    pub depth: usize,
}

impl EngineContext {
    pub fn new(installation: Installation, config: ScopeConfig) -> Self {
        Self {
            installation,
            config,
            cancellation: CancellationToken::new(),
            depth: 0,
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Context for a child that overrides some limits.
    pub fn nested(&self, config: Option<ScopeConfig>) -> Self {
        let mut child = self.clone();
        if let Some(config) = config {
            child.config = config.inherit(&self.config);
        }
        child.depth += 1;
        child
    }
}

// ============================================================================
// Node lifecycle
// ============================================================================

/// What a node can do, fixed for its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// May register children while executing.
    pub dynamic_children: bool,
    /// Counts as a test (as opposed to a container) in reports.
    pub test: bool,
}

/// Whether a node wants another pass through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reentry {
    Done,
    Again,
}

/// What a node may touch when deciding on re-entry.
pub struct ReentryControl<'a> {
    /// The collector holding the finished pass's failure.
    pub retirement: &'a mut dyn RetireFailures,
    /// The run was cancelled; no further pass will start.
    pub cancelled: bool,
}

pub type BoxedNode<C> = Box<dyn Node<Context = C>>;

/// Sink for children a node discovers while executing.
pub trait DynamicRegistry<C> {
    fn register(&mut self, child: BoxedNode<C>);
}

impl<C> DynamicRegistry<C> for Vec<BoxedNode<C>> {
    fn register(&mut self, child: BoxedNode<C>) {
        self.push(child);
    }
}

/// One node of a hierarchical execution model.
///
/// Only [`Node::unique_id`] and [`Node::execute`] are required. Wrappers in this module forward every method,
/// including the defaulted ones.
pub trait Node {
    type Context: Clone;

    fn unique_id(&self) -> UniqueId;

    fn display_name(&self) -> String {
        self.unique_id().to_string()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Reason to skip the node entirely.
    fn skip_reason(&self) -> Option<String> {
        None
    }

    /// Build this node's context from its parent's.
    fn prepare(&mut self, parent: &Self::Context) -> NodeResult<Self::Context> {
        Ok(parent.clone())
    }

    fn before(&mut self, _ctx: &Self::Context) -> NodeResult<()> {
        Ok(())
    }

    fn execute(&mut self, ctx: &Self::Context, dynamic: &mut dyn DynamicRegistry<Self::Context>) -> NodeResult<()>;

    /// Static children, run between `execute` and `after` on every pass.
    fn children(&mut self) -> Vec<BoxedNode<Self::Context>> {
        Vec::new()
    }

    fn after(&mut self, _ctx: &Self::Context) -> NodeResult<()> {
        Ok(())
    }

    /// Every dynamically registered child of the current pass has run.
    fn dynamic_children_finished(&mut self) -> NodeResult<()> {
        Ok(())
    }

    fn cleanup(&mut self, _ctx: &Self::Context) -> NodeResult<()> {
        Ok(())
    }

    /// Decide whether the engine runs the lifecycle again.
    fn next_execution(&mut self, _last: &ExecutionResult, _control: ReentryControl<'_>) -> NodeResult<Reentry> {
        Ok(Reentry::Done)
    }

    /// Combination results, for nodes that explored picks.
    fn scope_report(&self) -> Option<ScopeReport> {
        None
    }
}

impl<N: Node + ?Sized> Node for Box<N> {
    type Context = N::Context;

    fn unique_id(&self) -> UniqueId {
        (**self).unique_id()
    }

    fn display_name(&self) -> String {
        (**self).display_name()
    }

    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    fn skip_reason(&self) -> Option<String> {
        (**self).skip_reason()
    }

    fn prepare(&mut self, parent: &Self::Context) -> NodeResult<Self::Context> {
        (**self).prepare(parent)
    }

    fn before(&mut self, ctx: &Self::Context) -> NodeResult<()> {
        (**self).before(ctx)
    }

    fn execute(&mut self, ctx: &Self::Context, dynamic: &mut dyn DynamicRegistry<Self::Context>) -> NodeResult<()> {
        (**self).execute(ctx, dynamic)
    }

    fn children(&mut self) -> Vec<BoxedNode<Self::Context>> {
        (**self).children()
    }

    fn after(&mut self, ctx: &Self::Context) -> NodeResult<()> {
        (**self).after(ctx)
    }

    fn dynamic_children_finished(&mut self) -> NodeResult<()> {
        (**self).dynamic_children_finished()
    }

    fn cleanup(&mut self, ctx: &Self::Context) -> NodeResult<()> {
        (**self).cleanup(ctx)
    }

    fn next_execution(&mut self, last: &ExecutionResult, control: ReentryControl<'_>) -> NodeResult<Reentry> {
        (**self).next_execution(last, control)
    }

    fn scope_report(&self) -> Option<ScopeReport> {
        (**self).scope_report()
    }
}

/// Shared nodes: the engine and the test author may both hold one.
impl<N: Node + ?Sized> Node for Rc<RefCell<N>> {
    type Context = N::Context;

    fn unique_id(&self) -> UniqueId {
        self.borrow().unique_id()
    }

    fn display_name(&self) -> String {
        self.borrow().display_name()
    }

    fn capabilities(&self) -> Capabilities {
        self.borrow().capabilities()
    }

    fn skip_reason(&self) -> Option<String> {
        self.borrow().skip_reason()
    }

    fn prepare(&mut self, parent: &Self::Context) -> NodeResult<Self::Context> {
        self.borrow_mut().prepare(parent)
    }

    fn before(&mut self, ctx: &Self::Context) -> NodeResult<()> {
        self.borrow_mut().before(ctx)
    }

    fn execute(&mut self, ctx: &Self::Context, dynamic: &mut dyn DynamicRegistry<Self::Context>) -> NodeResult<()> {
        self.borrow_mut().execute(ctx, dynamic)
    }

    fn children(&mut self) -> Vec<BoxedNode<Self::Context>> {
        self.borrow_mut().children()
    }

    fn after(&mut self, ctx: &Self::Context) -> NodeResult<()> {
        self.borrow_mut().after(ctx)
    }

    fn dynamic_children_finished(&mut self) -> NodeResult<()> {
        self.borrow_mut().dynamic_children_finished()
    }

    fn cleanup(&mut self, ctx: &Self::Context) -> NodeResult<()> {
        self.borrow_mut().cleanup(ctx)
    }

    fn next_execution(&mut self, last: &ExecutionResult, control: ReentryControl<'_>) -> NodeResult<Reentry> {
        self.borrow_mut().next_execution(last, control)
    }

    fn scope_report(&self) -> Option<ScopeReport> {
        self.borrow().scope_report()
    }
}
