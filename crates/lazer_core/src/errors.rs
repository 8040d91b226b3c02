//! Protocol and usage errors raised by the combination machinery.
//!
//! Every variant here is a hard failure: the current repetition is abandoned and the error propagates to whatever
//! drives the scope. Policy exhaustion is deliberately *not* an error; see [`crate::policy::StopReason`].

use thiserror::Error;

use crate::identity::{ParameterGroup, ParameterIdentity};

/// Errors produced by [`crate::Lazer`], [`crate::ScopePolicy`] and the pick surface built on top of them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LazerError {
    /// The same identity was picked twice within one repetition with a different domain size.
    #[error("unexpected parameter repetition: `{identity}` was picked with {expected} values and then with {actual}")]
    UnexpectedParameterRepetition {
        identity: ParameterIdentity,
        expected: usize,
        actual: usize,
    },

    /// An identity reappeared in a later repetition with a domain size different from the established one.
    #[error("inconsistent domain for `{identity}`: established with {established} values, now offered {actual}")]
    InconsistentDomain {
        identity: ParameterIdentity,
        established: usize,
        actual: usize,
    },

    /// An identity was used both inside and outside an uncombined group (or in two different groups).
    #[error("parameter `{identity}` switched grouping from {established} to {actual}")]
    GroupMismatch {
        identity: ParameterIdentity,
        established: GroupLabel,
        actual: GroupLabel,
    },

    /// A pick offered fewer than two candidate values.
    #[error("parameter `{identity}` offers {size} value(s); a pick needs at least 2")]
    DomainTooSmall { identity: ParameterIdentity, size: usize },

    /// A non-deterministic body reproduced a combination that was already explored.
    #[error("combination {combination} was produced twice")]
    DuplicateCombination { combination: String },

    /// A new repetition was requested although no combination is pending.
    #[error("exploration is exhausted after {repetitions} repetition(s)")]
    ExplorationExhausted { repetitions: u64 },

    /// The scope has concluded; its configuration can no longer change.
    #[error("scope is closed; configuration changes are no longer accepted")]
    ScopeClosed,

    /// A pick or configuration call happened outside any running scope.
    #[error("no parameterized scope is active on this thread")]
    NoActiveScope,

    /// Two live drivers tried to own the same scope key.
    #[error("scope `{scope}` is already being explored by another driver")]
    ScopeAlreadyActive { scope: String },
}

impl LazerError {
    /// The identity an error is about, when it names one.
    pub fn identity(&self) -> Option<&ParameterIdentity> {
        match self {
            LazerError::UnexpectedParameterRepetition { identity, .. }
            | LazerError::InconsistentDomain { identity, .. }
            | LazerError::GroupMismatch { identity, .. }
            | LazerError::DomainTooSmall { identity, .. } => Some(identity),
            _ => None,
        }
    }

    /// Whether this error reports a broken pick protocol (as opposed to misuse of the surrounding API).
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            LazerError::UnexpectedParameterRepetition { .. }
                | LazerError::InconsistentDomain { .. }
                | LazerError::GroupMismatch { .. }
                | LazerError::DomainTooSmall { .. }
                | LazerError::DuplicateCombination { .. }
        )
    }
}

/// Display helper describing how a parameter was grouped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLabel(pub Option<ParameterGroup>);

impl std::fmt::Display for GroupLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(group) => write!(f, "group `{}`", group),
            None => f.write_str("combined"),
        }
    }
}
