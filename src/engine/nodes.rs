//! Concrete nodes used by the suite runner.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use lazer_core::ScopeConfig;

use super::{BoxedNode, Capabilities, DynamicRegistry, EngineContext, Failure, Node, NodeResult, UniqueId};

pub type TestBody = Box<dyn FnMut() -> Result<(), Failure>>;
pub type SharedNode = Rc<RefCell<BoxedNode<EngineContext>>>;

/// A leaf running a test body.
pub struct TestNode {
    id: UniqueId,
    name: String,
    body: TestBody,
    skip: Option<String>,
}

impl TestNode {
    pub fn new(id: UniqueId, name: impl Into<String>, body: TestBody) -> Self {
        Self {
            id,
            name: name.into(),
            body,
            skip: None,
        }
    }

    pub fn skipped(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }
}

impl fmt::Debug for TestNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestNode")
            .field("id", &self.id)
            .field("skip", &self.skip)
            .finish_non_exhaustive()
    }
}

impl Node for TestNode {
    type Context = EngineContext;

    fn unique_id(&self) -> UniqueId {
        self.id.clone()
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            test: true,
            ..Capabilities::default()
        }
    }

    fn skip_reason(&self) -> Option<String> {
        self.skip.clone()
    }

    fn execute(&mut self, _ctx: &EngineContext, _dynamic: &mut dyn DynamicRegistry<EngineContext>) -> NodeResult<()> {
        (self.body)().map_err(Into::into)
    }
}

/// Groups children and optionally overrides their limits.
pub struct ContainerNode {
    id: UniqueId,
    name: String,
    config: Option<ScopeConfig>,
    children: Vec<SharedNode>,
}

impl ContainerNode {
    pub fn new(id: UniqueId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            config: None,
            children: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: ScopeConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn push(&mut self, child: BoxedNode<EngineContext>) {
        self.children.push(Rc::new(RefCell::new(child)));
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Node for ContainerNode {
    type Context = EngineContext;

    fn unique_id(&self) -> UniqueId {
        self.id.clone()
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn prepare(&mut self, parent: &EngineContext) -> NodeResult<EngineContext> {
        Ok(parent.nested(self.config))
    }

    fn execute(&mut self, _ctx: &EngineContext, _dynamic: &mut dyn DynamicRegistry<EngineContext>) -> NodeResult<()> {
        Ok(())
    }

    fn children(&mut self) -> Vec<BoxedNode<EngineContext>> {
        self.children
            .iter()
            .map(|child| Box::new(Rc::clone(child)) as BoxedNode<EngineContext>)
            .collect()
    }
}

pub type Factory = Box<dyn FnMut(&EngineContext) -> Vec<BoxedNode<EngineContext>>>;

/// Registers its children while executing, like a test factory.
pub struct DynamicFactoryNode {
    id: UniqueId,
    name: String,
    factory: Factory,
}

impl DynamicFactoryNode {
    pub fn new(id: UniqueId, name: impl Into<String>, factory: Factory) -> Self {
        Self {
            id,
            name: name.into(),
            factory,
        }
    }
}

impl Node for DynamicFactoryNode {
    type Context = EngineContext;

    fn unique_id(&self) -> UniqueId {
        self.id.clone()
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            dynamic_children: true,
            ..Capabilities::default()
        }
    }

    fn prepare(&mut self, parent: &EngineContext) -> NodeResult<EngineContext> {
        Ok(parent.nested(None))
    }

    fn execute(&mut self, ctx: &EngineContext, dynamic: &mut dyn DynamicRegistry<EngineContext>) -> NodeResult<()> {
        let children = (self.factory)(ctx);
        tracing::debug!(node = %self.id, count = children.len(), "registering dynamic children");
        for child in children {
            dynamic.register(child);
        }
        Ok(())
    }
}
