//! Failure collection and retirement.
//!
//! A collector keeps the failure of a task. Engines usually keep one collector per task for the task's whole
//! lifetime, so when a node runs again its previous failure would be reported a second time. Retirement marks that
//! failure, by identity, as already accounted for.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::ExecutionResult;
use crate::scope::panic_message;

/// A failure raised by node code. Clones share identity.
#[derive(Clone)]
pub struct Failure(Arc<str>);

impl Failure {
    pub fn new(message: impl AsRef<str>) -> Self {
        Failure(Arc::from(message.as_ref()))
    }

    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::new(panic_message(payload))
    }

    pub fn message(&self) -> &str {
        &self.0
    }

    /// Whether both handles refer to the same failure instance; equal messages are not enough.
    pub fn same_as(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Failure").field(&&*self.0).finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Failure::new(message)
    }
}

impl From<&str> for Failure {
    fn from(message: &str) -> Self {
        Failure::new(message)
    }
}

impl From<lazer_core::LazerError> for Failure {
    fn from(err: lazer_core::LazerError) -> Self {
        Failure::new(err.to_string())
    }
}

pub trait FailureCollector {
    fn record(&mut self, failure: Failure);

    /// The failure that would be raised.
    fn held(&self) -> Option<&Failure>;

    /// Clear the collector, returning the failure it held.
    fn take(&mut self) -> Option<Failure>;

    fn raise(&self) -> Result<(), Failure> {
        match self.held() {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }
}

/// Keeps the first failure; later ones are kept as suppressed.
#[derive(Debug, Default)]
pub struct ThrowableCollector {
    first: Option<Failure>,
    suppressed: Vec<Failure>,
}

impl ThrowableCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suppressed(&self) -> &[Failure] {
        &self.suppressed
    }
}

impl FailureCollector for ThrowableCollector {
    fn record(&mut self, failure: Failure) {
        match &self.first {
            None => self.first = Some(failure),
            Some(_) => self.suppressed.push(failure),
        }
    }

    fn held(&self) -> Option<&Failure> {
        self.first.as_ref()
    }

    fn take(&mut self) -> Option<Failure> {
        self.suppressed.clear();
        self.first.take()
    }
}

/// Object-safe view of retirement for nodes deciding on re-entry.
pub trait RetireFailures {
    /// Mark the failure carried by `result` as accounted for. Returns `false` when the collector does not hold it.
    fn retire(&mut self, result: &ExecutionResult) -> bool;
}

/// A collector whose held failure can be retired.
#[derive(Debug, Default)]
pub struct FailureRetirement<C> {
    inner: C,
    retired: Option<Failure>,
}

impl<C: FailureCollector> FailureRetirement<C> {
    pub fn new(inner: C) -> Self {
        Self { inner, retired: None }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Nothing unretired is held.
    pub fn is_clean(&self) -> bool {
        self.held().is_none()
    }

    fn held_is_retired(&self) -> bool {
        match (self.inner.held(), &self.retired) {
            (Some(held), Some(retired)) => held.same_as(retired),
            _ => false,
        }
    }
}

impl<C: FailureCollector> RetireFailures for FailureRetirement<C> {
    fn retire(&mut self, result: &ExecutionResult) -> bool {
        let (Some(failure), Some(held)) = (&result.failure, self.inner.held()) else {
            return false;
        };
        if !held.same_as(failure) {
            tracing::debug!(%failure, held = %held, "retirement ignored for a failure the collector does not hold");
            return false;
        }
        tracing::debug!(%failure, "failure retired");
        self.retired = Some(failure.clone());
        true
    }
}

impl<C: FailureCollector> FailureCollector for FailureRetirement<C> {
    fn record(&mut self, failure: Failure) {
        if self.held_is_retired() {
            self.inner.take();
            self.retired = None;
        }
        self.inner.record(failure);
    }

    fn held(&self) -> Option<&Failure> {
        if self.held_is_retired() {
            return None;
        }
        self.inner.held()
    }

    fn take(&mut self) -> Option<Failure> {
        let retired = self.held_is_retired();
        self.retired = None;
        let taken = self.inner.take();
        if retired { None } else { taken }
    }
}
