//! Self-contained exploration loop for plain `#[test]` functions.
//!
//! ```ignore
//! #[test]
//! fn parses_every_radix() {
//!     let report = lazer::explore("parses_every_radix", || {
//!         let radix = lazer::pick_named("radix", &[2, 8, 10, 16])?;
//!         let sign = lazer::pick_named("sign", &["", "-"])?;
//!         check(*radix, sign)
//!     })
//!     .unwrap();
//!     assert!(report.is_success(), "{report}");
//! }
//! ```
//!
//! Panics inside the body count as failing combinations; the remaining combinations still run.

#![deny(clippy::unwrap_used, clippy::expect_used)]

use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};

use lazer_core::{Decision, LazerError, RepetitionOutcome, ScopeConfig};

use crate::config::LazerConfig;
use crate::driver::RepetitionDriver;
use crate::engine::CancellationToken;
use crate::install::{Installation, ScopeKey};
use crate::report::ScopeReport;

/// Builder for one exploration.
#[derive(Debug, Clone)]
pub struct Scope {
    key: ScopeKey,
    config: ScopeConfig,
    defaults: LazerConfig,
    installation: Option<Installation>,
    cancellation: CancellationToken,
}

impl Scope {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            key: ScopeKey::new(name),
            config: ScopeConfig::new(),
            defaults: LazerConfig::ambient(),
            installation: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Limits for this scope; unset ones fall back to the defaults.
    pub fn with_config(mut self, config: ScopeConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the environment defaults.
    pub fn with_defaults(mut self, defaults: LazerConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Explore in `installation` instead of the global one.
    pub fn with_installation(mut self, installation: Installation) -> Self {
        self.installation = Some(installation);
        self
    }

    /// Stop after the running repetition once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Run `body` once per combination until exhausted, capped, or cancelled.
    ///
    /// ## Errors
    ///
    /// Protocol violations, including ones the body swallowed, and [`LazerError::ScopeAlreadyActive`] when the same
    /// name is already being explored.
    #[tracing::instrument(skip_all, fields(scope = %self.key))]
    pub fn run<E, F>(self, mut body: F) -> Result<ScopeReport, LazerError>
    where
        E: Display,
        F: FnMut() -> Result<(), E>,
    {
        let installation = self.installation.unwrap_or_else(Installation::global);
        let config = self.defaults.scope_config(self.config);
        let mut driver = RepetitionDriver::new(installation, self.key, config)?;

        while driver.begin()? {
            let result = panic::catch_unwind(AssertUnwindSafe(&mut body));
            driver.end_body()?;
            let (outcome, message) = match result {
                Ok(Ok(())) => (RepetitionOutcome::Passed, None),
                Ok(Err(err)) => (RepetitionOutcome::Failed, Some(err.to_string())),
                Err(payload) => (RepetitionOutcome::Failed, Some(panic_message(payload.as_ref()))),
            };
            if let Decision::Stop(_) = driver.finish(outcome, message, self.cancellation.is_cancelled())? {
                break;
            }
        }

        let report = driver.report();
        tracing::debug!(%report, "exploration finished");
        Ok(report)
    }
}

/// Explore `body` under `name` in the global installation with the environment defaults.
pub fn explore<E, F>(name: &str, body: F) -> Result<ScopeReport, LazerError>
where
    E: Display,
    F: FnMut() -> Result<(), E>,
{
    Scope::new(name).run(body)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked with a non-string payload".to_string()
    }
}
