//! Deferred `after` for nodes with dynamic children.
//!
//! Engines that drain dynamically registered children only after the registering node's `after` ran would tear the
//! node down under its own children. [`PostponingNode`] stores the context of that `after` call and replays it once
//! the engine reports the dynamic children finished. Per node id the state moves `Normal → AfterPostponed → Normal`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::{
    BoxedNode, Capabilities, DynamicRegistry, ExecutionResult, LifecycleError, Node, NodeResult, Reentry,
    ReentryControl, UniqueId,
};
use crate::report::ScopeReport;

/// Contexts of postponed `after` calls, keyed by node id. Clones share storage.
#[derive(Debug)]
pub struct PostponedAfters<C> {
    stored: Rc<RefCell<HashMap<UniqueId, C>>>,
}

impl<C> Clone for PostponedAfters<C> {
    fn clone(&self) -> Self {
        Self {
            stored: Rc::clone(&self.stored),
        }
    }
}

impl<C> Default for PostponedAfters<C> {
    fn default() -> Self {
        Self {
            stored: Rc::new(RefCell::new(HashMap::new())),
        }
    }
}

impl<C> PostponedAfters<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, id: UniqueId, ctx: C) -> Result<(), LifecycleError> {
        let mut stored = self.stored.borrow_mut();
        if stored.contains_key(&id) {
            return Err(LifecycleError::AlreadyPostponed { id });
        }
        tracing::debug!(node = %id, "after postponed");
        stored.insert(id, ctx);
        Ok(())
    }

    /// Remove and return the stored context.
    pub fn retrieve(&self, id: &UniqueId) -> Result<C, LifecycleError> {
        self.stored
            .borrow_mut()
            .remove(id)
            .ok_or_else(|| LifecycleError::NotPostponed { id: id.clone() })
    }

    pub fn is_postponed(&self, id: &UniqueId) -> bool {
        self.stored.borrow().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.stored.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Forwards everything to `N`, except that `after` waits for the dynamic children when `N` registers any.
///
/// Whether to postpone is read from [`Node::capabilities`] once, at construction.
pub struct PostponingNode<N: Node> {
    node: N,
    id: UniqueId,
    postpones: bool,
    afters: PostponedAfters<N::Context>,
}

impl<N: Node> PostponingNode<N> {
    pub fn new(node: N, afters: PostponedAfters<N::Context>) -> Self {
        let id = node.unique_id();
        let postpones = node.capabilities().dynamic_children;
        Self {
            node,
            id,
            postpones,
            afters,
        }
    }

    pub fn postpones(&self) -> bool {
        self.postpones
    }

    pub fn inner(&self) -> &N {
        &self.node
    }

    pub fn into_inner(self) -> N {
        self.node
    }
}

impl<N: Node> Node for PostponingNode<N> {
    type Context = N::Context;

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

    fn prepare(&mut self, parent: &Self::Context) -> NodeResult<Self::Context> {
        self.node.prepare(parent)
    }

    fn before(&mut self, ctx: &Self::Context) -> NodeResult<()> {
        self.node.before(ctx)
    }

    fn execute(&mut self, ctx: &Self::Context, dynamic: &mut dyn DynamicRegistry<Self::Context>) -> NodeResult<()> {
        self.node.execute(ctx, dynamic)
    }

    fn children(&mut self) -> Vec<BoxedNode<Self::Context>> {
        self.node.children()
    }

    fn after(&mut self, ctx: &Self::Context) -> NodeResult<()> {
        if self.postpones {
            self.afters.store(self.id.clone(), ctx.clone())?;
            return Ok(());
        }
        self.node.after(ctx)
    }

    fn dynamic_children_finished(&mut self) -> NodeResult<()> {
        if self.postpones {
            let ctx = self.afters.retrieve(&self.id)?;
            tracing::debug!(node = %self.id, "replaying postponed after");
            self.node.after(&ctx)?;
        }
        self.node.dynamic_children_finished()
    }

    fn cleanup(&mut self, ctx: &Self::Context) -> NodeResult<()> {
        self.node.cleanup(ctx)
    }

    fn next_execution(&mut self, last: &ExecutionResult, control: ReentryControl<'_>) -> NodeResult<Reentry> {
        self.node.next_execution(last, control)
    }

    fn scope_report(&self) -> Option<ScopeReport> {
        self.node.scope_report()
    }
}
