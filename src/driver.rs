//! Repetition driver: runs one scope's body until its policy says stop.
//!
//! A driver owns exactly one scope slot of an [`Installation`]. Each repetition follows the same protocol:
//!
//! 1. [`RepetitionDriver::begin`] starts the next combination and makes the scope the target of ambient picks on the
//!    calling thread.
//! 2. The body runs and picks.
//! 3. [`RepetitionDriver::end_body`] deactivates the scope and surfaces any protocol violation the body swallowed.
//! 4. [`RepetitionDriver::finish`] records the outcome and decides whether another repetition is needed.
//!
//! The slot is torn down when the driver stops or is dropped, whichever comes first.

#![deny(clippy::unwrap_used, clippy::expect_used)]

use lazer_core::{Combination, Decision, Lazer, LazerError, RepetitionOutcome, ScopeConfig, StopReason};

use crate::install::{Activation, ActiveScope, Installation, ScopeKey};
use crate::report::{CombinationRecord, ScopeReport};

/// What the slot looked like when a repetition finished.
struct Finished {
    combination: Combination,
    picked: bool,
    decision: Decision,
}

/// Drives the repetitions of one scope.
#[derive(Debug)]
pub struct RepetitionDriver {
    installation: Installation,
    key: ScopeKey,
    config: ScopeConfig,
    token: u64,
    activation: Option<Activation>,
    repetition: u64,
    /// The current repetition got past [`RepetitionDriver::begin`].
    started: bool,
    parameterized: bool,
    stop: Option<StopReason>,
    records: Vec<CombinationRecord>,
}

impl RepetitionDriver {
    /// Claim `key` in `installation`.
    ///
    /// ## Errors
    ///
    /// [`LazerError::ScopeAlreadyActive`] when another live driver owns the key.
    pub fn new(installation: Installation, key: ScopeKey, config: ScopeConfig) -> Result<Self, LazerError> {
        let token = installation.register(&key, config)?;
        tracing::debug!(scope = %key, ?config, "scope registered");
        Ok(Self {
            installation,
            key,
            config,
            token,
            activation: None,
            repetition: 0,
            started: false,
            parameterized: false,
            stop: None,
            records: Vec::new(),
        })
    }

    pub fn key(&self) -> &ScopeKey {
        &self.key
    }

    pub fn config(&self) -> ScopeConfig {
        self.config
    }

    /// Number of repetitions begun so far.
    pub fn repetition(&self) -> u64 {
        self.repetition
    }

    /// Why the driver stopped, once it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_some()
    }

    pub fn records(&self) -> &[CombinationRecord] {
        &self.records
    }

    /// Start the next repetition and activate the scope on this thread.
    ///
    /// Returns `Ok(false)` when the installation discarded the scope since the last repetition; the driver is then
    /// stopped with [`StopReason::Uninstalled`].
    ///
    /// ## Errors
    ///
    /// - [`LazerError::ScopeClosed`] when the driver already stopped.
    /// - [`LazerError::ExplorationExhausted`] when asked to repeat past the last combination.
    pub fn begin(&mut self) -> Result<bool, LazerError> {
        if self.stop.is_some() {
            return Err(LazerError::ScopeClosed);
        }

        let begun = self.installation.with_existing_slot(&self.key, self.token, |slot| {
            slot.executing = true;
            slot.violation = None;
            match slot.lazer.as_mut() {
                Some(lazer) => lazer.start_new(),
                None => Ok(()),
            }
        });

        match begun {
            None => {
                tracing::warn!(scope = %self.key, "scope discarded between repetitions");
                self.conclude(StopReason::Uninstalled);
                Ok(false)
            }
            Some(Err(err)) => {
                self.conclude(StopReason::Aborted);
                Err(err)
            }
            Some(Ok(())) => {
                self.repetition += 1;
                self.started = true;
                self.activation = Some(Activation::push(self.active_scope()));
                tracing::debug!(scope = %self.key, repetition = self.repetition, "repetition begun");
                Ok(true)
            }
        }
    }

    /// Deactivate the scope after the body returned.
    ///
    /// ## Errors
    ///
    /// The first protocol violation raised by a pick of this repetition, even if the body caught it. The driver is
    /// stopped with [`StopReason::Aborted`].
    pub fn end_body(&mut self) -> Result<(), LazerError> {
        self.activation = None;
        let violation = self
            .installation
            .with_existing_slot(&self.key, self.token, |slot| {
                slot.executing = false;
                slot.violation.take()
            })
            .flatten();

        match violation {
            Some(err) => {
                tracing::warn!(scope = %self.key, repetition = self.repetition, %err, "protocol violation");
                self.conclude(StopReason::Aborted);
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Record the repetition's outcome and decide whether to repeat.
    ///
    /// A pass that never reached [`RepetitionDriver::begin`] (its engine failed before the body) is recorded against no
    /// combination; the driver stops with [`StopReason::Aborted`].
    ///
    /// ## Errors
    ///
    /// [`LazerError::DuplicateCombination`] when the body did not pick deterministically. The driver is stopped with
    /// [`StopReason::Aborted`].
    pub fn finish(
        &mut self,
        outcome: RepetitionOutcome,
        message: Option<String>,
        cancelled: bool,
    ) -> Result<Decision, LazerError> {
        if let Some(reason) = self.stop {
            return Ok(Decision::Stop(reason));
        }
        if self.activation.is_some() {
            self.end_body()?;
        }
        if !std::mem::take(&mut self.started) {
            // Nothing was picked, so the outcome belongs to no combination.
            tracing::warn!(scope = %self.key, ?outcome, "pass finished without a repetition");
            self.conclude(StopReason::Aborted);
            return Ok(Decision::Stop(StopReason::Aborted));
        }

        let finished = self.installation.with_existing_slot(&self.key, self.token, |slot| {
            if slot.orphaned {
                return None;
            }
            let combination = match slot.lazer.as_mut() {
                Some(lazer) => match lazer.complete_repetition() {
                    Ok(combination) => combination,
                    Err(err) => return Some(Err(err)),
                },
                None => Combination::new(),
            };
            let pending = slot.lazer.as_ref().is_some_and(Lazer::pending_combinations);
            slot.policy.record(outcome);
            Some(Ok(Finished {
                combination,
                picked: slot.lazer.is_some(),
                decision: slot.policy.decide(pending, cancelled),
            }))
        });

        let finished = match finished.flatten() {
            None => {
                tracing::warn!(scope = %self.key, repetition = self.repetition, "scope uninstalled mid-repetition");
                self.conclude(StopReason::Uninstalled);
                return Ok(Decision::Stop(StopReason::Uninstalled));
            }
            Some(Err(err)) => {
                self.conclude(StopReason::Aborted);
                return Err(err);
            }
            Some(Ok(finished)) => finished,
        };

        self.parameterized |= finished.picked;
        tracing::debug!(
            scope = %self.key,
            repetition = self.repetition,
            combination = %finished.combination,
            ?outcome,
            "repetition finished"
        );
        self.records.push(CombinationRecord {
            repetition: self.repetition,
            combination: finished.combination,
            outcome,
            message,
        });

        if let Decision::Stop(reason) = finished.decision {
            self.conclude(reason);
        }
        Ok(finished.decision)
    }

    /// Stop without finishing the running repetition (fatal engine error).
    pub fn abort(&mut self) {
        if self.stop.is_none() {
            self.conclude(StopReason::Aborted);
        }
    }

    /// Aggregate the repetitions recorded so far.
    ///
    /// A driver that never stopped reports [`StopReason::Aborted`].
    pub fn report(&self) -> ScopeReport {
        ScopeReport {
            scope: self.key.to_string(),
            parameterized: self.parameterized,
            stop: self.stop.unwrap_or(StopReason::Aborted),
            combinations: self.records.clone(),
        }
    }

    fn active_scope(&self) -> ActiveScope {
        ActiveScope {
            installation: self.installation.clone(),
            key: self.key.clone(),
            config: self.config,
            token: self.token,
        }
    }

    fn conclude(&mut self, reason: StopReason) {
        self.stop = Some(reason);
        self.teardown();
        tracing::debug!(scope = %self.key, %reason, repetitions = self.repetition, "scope concluded");
    }

    fn teardown(&mut self) {
        self.activation = None;
        self.installation.remove(&self.key, self.token);
    }
}

impl Drop for RepetitionDriver {
    fn drop(&mut self) {
        self.teardown();
    }
}
