//! Parameter identities, groups and pick domains.
//!
//! An identity names "the same pick site" across repetitions of one scope. It must compare equal from one repetition
//! to the next, otherwise the generator sees a brand new parameter every time and never converges.

use std::borrow::Cow;
use std::fmt;
use std::panic::Location;

use crate::errors::LazerError;

/// Key identifying one pick site within a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParameterIdentity {
    /// Explicitly named by the caller.
    Named(Cow<'static, str>),
    /// A name plus a caller-supplied discriminator, for picks made in loops or helpers.
    Keyed { name: Cow<'static, str>, discriminator: u64 },
    /// The n-th identity-less pick of the repetition.
    Ordinal(usize),
    /// The source location of the pick call.
    CallSite { file: &'static str, line: u32, column: u32 },
}

impl ParameterIdentity {
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        ParameterIdentity::Named(name.into())
    }

    pub fn keyed(name: impl Into<Cow<'static, str>>, discriminator: u64) -> Self {
        ParameterIdentity::Keyed {
            name: name.into(),
            discriminator,
        }
    }

    /// Identity derived from the caller's source location.
    #[track_caller]
    pub fn here() -> Self {
        Self::from_location(Location::caller())
    }

    pub fn from_location(location: &'static Location<'static>) -> Self {
        ParameterIdentity::CallSite {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Display for ParameterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterIdentity::Named(name) => f.write_str(name),
            ParameterIdentity::Keyed { name, discriminator } => write!(f, "{}#{}", name, discriminator),
            ParameterIdentity::Ordinal(n) => write!(f, "#{}", n),
            ParameterIdentity::CallSite { file, line, column } => write!(f, "{}:{}:{}", file, line, column),
        }
    }
}

impl From<&'static str> for ParameterIdentity {
    fn from(name: &'static str) -> Self {
        ParameterIdentity::named(name)
    }
}

impl From<String> for ParameterIdentity {
    fn from(name: String) -> Self {
        ParameterIdentity::named(name)
    }
}

/// Name of an uncombined ("qronic") parameter group.
///
/// Members of one group are covered side by side instead of multiplied: the group advances as a single axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterGroup(Cow<'static, str>);

impl ParameterGroup {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        ParameterGroup(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParameterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a pick participates in the exploration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum PickMode {
    /// Full cross product with every other combined axis.
    #[default]
    Combined,
    /// Shares one axis with the other members of the group.
    Uncombined(ParameterGroup),
}

impl PickMode {
    pub fn uncombined(group: impl Into<Cow<'static, str>>) -> Self {
        PickMode::Uncombined(ParameterGroup::new(group))
    }

    pub fn group(&self) -> Option<&ParameterGroup> {
        match self {
            PickMode::Combined => None,
            PickMode::Uncombined(group) => Some(group),
        }
    }
}

/// Ordered, finite set of candidate values offered at one pick call.
#[derive(Debug, Clone, Copy)]
pub struct PickDomain<'a, T> {
    values: &'a [T],
}

impl<'a, T> PickDomain<'a, T> {
    /// Wrap `values`, rejecting domains with fewer than two candidates.
    pub fn new(identity: &ParameterIdentity, values: &'a [T]) -> Result<Self, LazerError> {
        check_domain_size(identity, values.len())?;
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'a T> {
        self.values.get(index)
    }

    pub fn values(&self) -> &'a [T] {
        self.values
    }
}

pub(crate) fn check_domain_size(identity: &ParameterIdentity, size: usize) -> Result<(), LazerError> {
    if size < 2 {
        return Err(LazerError::DomainTooSmall {
            identity: identity.clone(),
            size,
        });
    }
    Ok(())
}
