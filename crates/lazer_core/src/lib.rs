//! Combination generator and scope policy for lazily parameterized tests.
//!
//! A test body asks for values inline ("pick one of these") instead of declaring its parameters upfront. The
//! [`Lazer`] generator decides, pick by pick, which index to hand back and whether another repetition of the body is
//! needed to cover the remaining combinations. [`ScopePolicy`] bounds that exploration per scope.
//!
//! ## Notes
//!
//! - This is the semantic core: **no IO**, no global state, no threads. Process-wide installation, the ambient pick
//!   surface and the engine adaptation layer live in the `lazer` crate.
//! - Every pick is resolved to an index; mapping indices back to values is the caller's business.

pub mod errors;
pub mod generator;
pub mod identity;
pub mod ledger;
pub mod policy;

pub use errors::LazerError;
pub use generator::Lazer;
pub use identity::{ParameterGroup, ParameterIdentity, PickDomain, PickMode};
pub use ledger::{Combination, PickLedger, PickRecord};
pub use policy::{Decision, RepetitionOutcome, ScopeConfig, ScopePolicy, ScopeStatus, StopReason};
