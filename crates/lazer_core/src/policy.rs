//! Per-scope repetition limits.
//!
//! A [`ScopePolicy`] is a two-state machine: `Active` until a limit trips or the exploration is exhausted, then
//! `Closed` for good. Reaching a limit is a normal way for a scope to end, not an error.

use std::fmt;

use crate::errors::LazerError;

/// Limits applied to one scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeConfig {
    /// Ceiling on the number of combinations attempted.
    pub max_total_count: Option<u64>,
    /// Ceiling on the number of failing combinations tolerated.
    pub max_failure_count: Option<u64>,
}

impl ScopeConfig {
    /// Create a config with no limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of combinations attempted
    pub fn with_max_total_count(mut self, count: u64) -> Self {
        self.max_total_count = Some(count);
        self
    }

    /// Set the maximum number of failing combinations
    pub fn with_max_failure_count(mut self, count: u64) -> Self {
        self.max_failure_count = Some(count);
        self
    }

    /// Fill unset limits from an enclosing container's config.
    pub fn inherit(self, parent: &ScopeConfig) -> Self {
        Self {
            max_total_count: self.max_total_count.or(parent.max_total_count),
            max_failure_count: self.max_failure_count.or(parent.max_failure_count),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_total_count.is_none() && self.max_failure_count.is_none()
    }
}

/// Result of one repetition, as far as the policy is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepetitionOutcome {
    Passed,
    Failed,
}

/// Why a scope stopped repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// Every combination was produced.
    Exhausted,
    /// `max_total_count` combinations were attempted.
    TotalLimit,
    /// `max_failure_count` combinations failed.
    FailureLimit,
    /// The surrounding run was cancelled.
    Cancelled,
    /// The installation was torn down underneath the scope.
    Uninstalled,
    /// A protocol violation or fatal error ended the scope, or it was abandoned before it concluded.
    Aborted,
}

impl StopReason {
    /// Whether exploration was cut short by a configured limit.
    pub fn is_capped(&self) -> bool {
        matches!(self, StopReason::TotalLimit | StopReason::FailureLimit)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::Exhausted => "exhausted",
            StopReason::TotalLimit => "total limit reached",
            StopReason::FailureLimit => "failure limit reached",
            StopReason::Cancelled => "cancelled",
            StopReason::Uninstalled => "uninstalled",
            StopReason::Aborted => "aborted",
        };
        f.write_str(text)
    }
}

/// What the driver should do after a repetition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Repeat,
    Stop(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeStatus {
    Active,
    Closed(StopReason),
}

/// Limit bookkeeping for one scope instance.
#[derive(Debug, Clone)]
pub struct ScopePolicy {
    config: ScopeConfig,
    attempted: u64,
    failed: u64,
    status: ScopeStatus,
}

impl ScopePolicy {
    pub fn new(config: ScopeConfig) -> Self {
        Self {
            config,
            attempted: 0,
            failed: 0,
            status: ScopeStatus::Active,
        }
    }

    pub fn config(&self) -> ScopeConfig {
        self.config
    }

    pub fn attempted(&self) -> u64 {
        self.attempted
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn status(&self) -> ScopeStatus {
        self.status
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.status, ScopeStatus::Closed(_))
    }

    /// Change the total limit; only allowed while the scope is active.
    pub fn set_max_total_count(&mut self, count: u64) -> Result<(), LazerError> {
        self.ensure_active()?;
        self.config.max_total_count = Some(count);
        Ok(())
    }

    /// Change the failure limit; only allowed while the scope is active.
    pub fn set_max_failure_count(&mut self, count: u64) -> Result<(), LazerError> {
        self.ensure_active()?;
        self.config.max_failure_count = Some(count);
        Ok(())
    }

    /// Count one finished repetition. Ignored once the scope is closed.
    pub fn record(&mut self, outcome: RepetitionOutcome) {
        if self.is_closed() {
            return;
        }
        self.attempted += 1;
        if outcome == RepetitionOutcome::Failed {
            self.failed += 1;
        }
    }

    /// Decide whether another repetition may start, closing the scope when it may not.
    ///
    /// Precedence: cancellation, exhaustion, failure limit, total limit. A closed scope keeps answering with the
    /// reason it closed for.
    pub fn decide(&mut self, pending: bool, cancelled: bool) -> Decision {
        if let ScopeStatus::Closed(reason) = self.status {
            return Decision::Stop(reason);
        }

        let stop = if cancelled {
            Some(StopReason::Cancelled)
        } else if !pending {
            Some(StopReason::Exhausted)
        } else if self.failure_limit_reached() {
            Some(StopReason::FailureLimit)
        } else if self.total_limit_reached() {
            Some(StopReason::TotalLimit)
        } else {
            None
        };

        match stop {
            Some(reason) => {
                self.close(reason);
                Decision::Stop(reason)
            }
            None => Decision::Repeat,
        }
    }

    /// Close the scope for an external reason. The first reason wins.
    pub fn close(&mut self, reason: StopReason) {
        if !self.is_closed() {
            tracing::debug!(%reason, attempted = self.attempted, failed = self.failed, "scope closed");
            self.status = ScopeStatus::Closed(reason);
        }
    }

    // A limit of 0 failures behaves like 1: nothing can stop before the first failure happens.
    fn failure_limit_reached(&self) -> bool {
        self.config
            .max_failure_count
            .is_some_and(|max| self.failed > 0 && self.failed >= max.max(1))
    }

    fn total_limit_reached(&self) -> bool {
        self.config.max_total_count.is_some_and(|max| self.attempted >= max)
    }

    fn ensure_active(&self) -> Result<(), LazerError> {
        if self.is_closed() {
            return Err(LazerError::ScopeClosed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(policy: &mut ScopePolicy, outcomes: &[RepetitionOutcome], total: u64) -> (u64, StopReason) {
        let mut ran = 0;
        loop {
            let outcome = outcomes.get(ran as usize).copied().unwrap_or(RepetitionOutcome::Passed);
            policy.record(outcome);
            ran += 1;
            if let Decision::Stop(reason) = policy.decide(ran < total, false) {
                return (ran, reason);
            }
        }
    }

    use RepetitionOutcome::{Failed, Passed};

    #[test]
    fn unlimited_runs_to_exhaustion() {
        let mut policy = ScopePolicy::new(ScopeConfig::new());
        assert_eq!(run(&mut policy, &[], 6), (6, StopReason::Exhausted));
    }

    #[test]
    fn total_limit_caps_exploration() {
        let mut policy = ScopePolicy::new(ScopeConfig::new().with_max_total_count(1));
        assert_eq!(run(&mut policy, &[], 6), (1, StopReason::TotalLimit));
        assert!(StopReason::TotalLimit.is_capped());
    }

    #[test]
    fn total_limit_zero_still_runs_once() {
        let mut policy = ScopePolicy::new(ScopeConfig::new().with_max_total_count(0));
        assert_eq!(run(&mut policy, &[], 6), (1, StopReason::TotalLimit));
    }

    #[test]
    fn failure_limit_one_stops_at_first_failure() {
        let mut policy = ScopePolicy::new(ScopeConfig::new().with_max_failure_count(1));
        let outcomes = [Passed, Failed, Passed, Passed, Failed, Passed];
        assert_eq!(run(&mut policy, &outcomes, 6), (2, StopReason::FailureLimit));
        assert_eq!(policy.failed(), 1);
    }

    #[test]
    fn failure_limit_zero_stops_at_first_failure() {
        let mut policy = ScopePolicy::new(ScopeConfig::new().with_max_failure_count(0));
        assert_eq!(run(&mut policy, &[Passed, Passed, Failed], 6), (3, StopReason::FailureLimit));
    }

    #[test]
    fn failure_limit_without_failures_does_not_cap() {
        let mut policy = ScopePolicy::new(ScopeConfig::new().with_max_failure_count(1));
        assert_eq!(run(&mut policy, &[], 6), (6, StopReason::Exhausted));
    }

    #[test]
    fn whichever_limit_trips_first_wins() {
        let config = ScopeConfig::new().with_max_total_count(3).with_max_failure_count(2);
        let mut policy = ScopePolicy::new(config);
        assert_eq!(run(&mut policy, &[Failed, Failed], 6), (2, StopReason::FailureLimit));

        let mut policy = ScopePolicy::new(config);
        assert_eq!(run(&mut policy, &[Failed], 6), (3, StopReason::TotalLimit));
    }

    #[test]
    fn cancellation_takes_precedence() {
        let mut policy = ScopePolicy::new(ScopeConfig::new());
        policy.record(Passed);
        assert_eq!(policy.decide(true, true), Decision::Stop(StopReason::Cancelled));
    }

    #[test]
    fn closed_scope_stays_closed() {
        let mut policy = ScopePolicy::new(ScopeConfig::new().with_max_total_count(1));
        policy.record(Passed);
        assert_eq!(policy.decide(true, false), Decision::Stop(StopReason::TotalLimit));
        assert_eq!(policy.decide(true, false), Decision::Stop(StopReason::TotalLimit));
        assert_eq!(policy.set_max_total_count(10), Err(LazerError::ScopeClosed));
        policy.record(Failed);
        assert_eq!(policy.attempted(), 1);
        assert_eq!(policy.status(), ScopeStatus::Closed(StopReason::TotalLimit));
    }

    #[test]
    fn inherit_fills_unset_limits() {
        let parent = ScopeConfig::new().with_max_total_count(10).with_max_failure_count(2);
        let child = ScopeConfig::new().with_max_total_count(3).inherit(&parent);
        assert_eq!(child.max_total_count, Some(3));
        assert_eq!(child.max_failure_count, Some(2));
        assert!(ScopeConfig::new().is_unlimited());
        assert!(!child.is_unlimited());
    }
}
