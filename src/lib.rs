#![forbid(unsafe_code)]
//! Lazy, inline test parameterization.
//!
//! A test body picks its parameters where it needs them:
//!
//! ```
//! use lazer::{Scope, pick_named};
//!
//! let report = Scope::new("addition_commutes")
//!     .run(|| -> Result<(), String> {
//!         let a = *pick_named("a", &[1, 2, 3]).map_err(|e| e.to_string())?;
//!         let b = *pick_named("b", &[10, 20]).map_err(|e| e.to_string())?;
//!         assert_eq!(a + b, b + a);
//!         Ok(())
//!     })
//!     .unwrap();
//! assert_eq!(report.attempted(), 6);
//! ```
//!
//! The body is re-executed until every combination of the picks it made has been covered, or until a scope limit
//! (total combinations, tolerated failures) stops the exploration.
//!
//! ## Layers
//!
//! - `lazer_core`: the combination generator and scope policy. Pure, no IO, no global state.
//! - [`install`]: the process-wide installation and the per-thread stack of active scopes.
//! - [`pick`]: the ambient pick surface used from test bodies.
//! - [`driver`] and [`scope`]: repetition of one body per combination.
//! - [`engine`]: adaptation of repetition to hierarchical execution engines.
//! - [`runner`]: a pytest-style suite runner on top of the reference engine.
//!
//! ## Panic Policy
//!
//! - **Production code**: `Result` with `?`. The `driver`, `scope` and `engine` modules enforce
//!   `#![deny(clippy::unwrap_used, clippy::expect_used)]`.
//! - **Test bodies**: panics are caught and counted as failing combinations.
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.

pub mod config;
pub mod driver;
pub mod engine;
pub mod install;
pub mod pick;
pub mod report;
pub mod runner;
pub mod scope;

pub use lazer_core::{
    Combination, Decision, LazerError, ParameterGroup, ParameterIdentity, PickDomain, PickMode, RepetitionOutcome,
    ScopeConfig, StopReason,
};

pub use config::{ConfigError, LazerConfig};
pub use driver::RepetitionDriver;
pub use install::{Installation, ScopeKey, in_scope};
pub use pick::{
    pick, pick_bool, pick_here, pick_index, pick_named, pick_uncombined, pick_with, set_max_failure_count,
    set_max_total_count,
};
pub use report::{CombinationRecord, ScopeReport};
pub use runner::{RunError, RunOptions, TestReporter, TestSuite, TestSummary, TracingReporter, run_suite};
pub use scope::{Scope, explore};
