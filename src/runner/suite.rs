//! Suite declaration.

use lazer_core::ScopeConfig;

use crate::engine::{
    BoxedNode, ContainerNode, DynamicFactoryNode, EngineContext, Failure, Node, ParameterizedNode, TestBody, TestNode,
    UniqueId,
};

/// A tree of tests, built up front and consumed by [`super::run_suite`].
///
/// Every test runs as a [`ParameterizedNode`], so a body that picks is repeated per combination. Test ids are the
/// `/`-joined names of the enclosing containers and the test.
pub struct TestSuite {
    root: ContainerNode,
    tests: usize,
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            root: ContainerNode::new(UniqueId::new(&name), name),
            tests: 0,
        }
    }

    /// Limits for every test in this container; unset ones are inherited.
    pub fn with_config(mut self, config: ScopeConfig) -> Self {
        self.root = self.root.with_config(config);
        self
    }

    pub fn id(&self) -> UniqueId {
        self.root.unique_id()
    }

    /// Statically declared tests, including nested containers. Factory cases are not known until they run.
    pub fn test_count(&self) -> usize {
        self.tests
    }

    pub fn test<F>(self, name: impl Into<String>, body: F) -> Self
    where
        F: FnMut() -> Result<(), Failure> + 'static,
    {
        self.test_with_config(name, ScopeConfig::new(), body)
    }

    /// A test with its own limits, overriding the container's.
    pub fn test_with_config<F>(mut self, name: impl Into<String>, config: ScopeConfig, body: F) -> Self
    where
        F: FnMut() -> Result<(), Failure> + 'static,
    {
        let name = name.into();
        let test = TestNode::new(self.id().child(&name), name, Box::new(body));
        self.root.push(Box::new(ParameterizedNode::with_config(test, config)));
        self.tests += 1;
        self
    }

    pub fn skip(mut self, name: impl Into<String>, reason: impl Into<String>) -> Self {
        let name = name.into();
        let test = TestNode::new(self.id().child(&name), name, Box::new(|| Ok(()))).skipped(reason);
        self.root.push(Box::new(test));
        self.tests += 1;
        self
    }

    /// A nested container, declared by `build`.
    pub fn container(mut self, name: impl Into<String>, build: impl FnOnce(TestSuite) -> TestSuite) -> Self {
        let name = name.into();
        let nested = build(TestSuite {
            root: ContainerNode::new(self.id().child(&name), name),
            tests: 0,
        });
        self.tests += nested.tests;
        self.root.push(Box::new(nested.root));
        self
    }

    /// Cases produced while the suite runs, each registered as a dynamic child of the factory.
    pub fn factory<F>(mut self, name: impl Into<String>, mut cases: F) -> Self
    where
        F: FnMut() -> Vec<(String, TestBody)> + 'static,
    {
        let name = name.into();
        let id = self.id().child(&name);
        let parent = id.clone();
        let factory = DynamicFactoryNode::new(
            id,
            name,
            Box::new(move |_ctx: &EngineContext| {
                cases()
                    .into_iter()
                    .map(|(case, body)| {
                        let test = TestNode::new(parent.child(&case), case, body);
                        Box::new(ParameterizedNode::new(test)) as BoxedNode<EngineContext>
                    })
                    .collect()
            }),
        );
        self.root.push(Box::new(factory));
        self
    }

    pub(crate) fn into_root(self) -> BoxedNode<EngineContext> {
        Box::new(self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_nested_tests() {
        let suite = TestSuite::new("suite")
            .test("a", || Ok(()))
            .skip("b", "not yet")
            .container("inner", |inner| inner.test("c", || Ok(())))
            .factory("cases", Vec::new);
        assert_eq!(suite.test_count(), 3);
        assert_eq!(suite.id().as_str(), "suite");
    }
}
