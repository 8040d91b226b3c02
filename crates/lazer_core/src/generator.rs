//! The lazy combination generator.
//!
//! ## Algorithm
//!
//! Exploration is a depth-first odometer whose digits are discovered while the body runs:
//!
//! - Every combined parameter owns one digit; every uncombined group shares one digit whose radix is the largest
//!   member domain seen in the repetition.
//! - A repetition replays a *plan* (digit values for a prefix of the previous repetition's digits). Digits not in the
//!   plan start at 0.
//! - When a repetition completes, the right-most digit that can still advance is incremented and everything after it
//!   is dropped from the plan. Digits discovered later in the next repetition start over at 0, so the most recently
//!   discovered parameter varies fastest.
//!
//! Because dropped digits are rediscovered only if the body reaches them again, a parameter that lives inside one
//! branch of an earlier choice never multiplies the combinations of the other branches.

use std::collections::{HashMap, HashSet};

use crate::errors::{GroupLabel, LazerError};
use crate::identity::{ParameterGroup, ParameterIdentity, PickMode, check_domain_size};
use crate::ledger::{Combination, Digit, DigitKey, PickLedger, PickRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No repetition started yet.
    Fresh,
    /// A repetition is collecting picks.
    Running,
    /// The last repetition was completed and recorded.
    Completed,
    /// No further combination exists.
    Exhausted,
}

/// Domain facts fixed the first time an identity is picked.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Established {
    size: usize,
    group: Option<ParameterGroup>,
}

/// Combination generator for one scope.
///
/// A `Lazer` is driven through `start_new` → `pick`* → `complete_repetition`, repeatedly, until
/// [`Lazer::pending_combinations`] turns false.
#[derive(Debug)]
pub struct Lazer {
    domains: HashMap<ParameterIdentity, Established>,
    plan: HashMap<DigitKey, usize>,
    ledger: PickLedger,
    produced: HashSet<Combination>,
    repetitions: u64,
    phase: Phase,
}

impl Default for Lazer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lazer {
    pub fn new() -> Self {
        Self {
            domains: HashMap::new(),
            plan: HashMap::new(),
            ledger: PickLedger::new(),
            produced: HashSet::new(),
            repetitions: 0,
            phase: Phase::Fresh,
        }
    }

    /// Begin the next repetition.
    ///
    /// The in-repetition ledger is reset; cross-repetition state (established domains, produced combinations) is kept.
    /// A repetition that was still running is completed first.
    ///
    /// ## Errors
    ///
    /// - [`LazerError::ExplorationExhausted`] when every combination has been produced.
    /// - Whatever [`Lazer::complete_repetition`] reports for a repetition that was still running.
    #[tracing::instrument(level = "debug", skip_all, fields(repetition = self.repetitions + 1))]
    pub fn start_new(&mut self) -> Result<(), LazerError> {
        if self.phase == Phase::Running {
            self.complete_repetition()?;
        }

        match self.phase {
            Phase::Completed => match next_plan(self.ledger.digits()) {
                Some(plan) => self.plan = plan,
                None => {
                    self.phase = Phase::Exhausted;
                    return Err(self.exhausted());
                }
            },
            Phase::Exhausted => return Err(self.exhausted()),
            Phase::Fresh | Phase::Running => self.plan.clear(),
        }

        self.ledger.clear();
        self.repetitions += 1;
        self.phase = Phase::Running;
        tracing::debug!(planned = self.plan.len(), "repetition started");
        Ok(())
    }

    /// Choose an index into a domain of `size` values for `identity`.
    ///
    /// Picking outside a running repetition implicitly starts the next one.
    ///
    /// ## Errors
    ///
    /// - [`LazerError::DomainTooSmall`] for `size < 2`.
    /// - [`LazerError::UnexpectedParameterRepetition`] when `identity` was already picked in this repetition with a
    ///   different size.
    /// - [`LazerError::InconsistentDomain`] when `identity` was established with a different size earlier in the
    ///   exploration.
    /// - [`LazerError::GroupMismatch`] when `identity` changes between combined and uncombined use.
    pub fn pick(&mut self, identity: ParameterIdentity, size: usize, mode: &PickMode) -> Result<usize, LazerError> {
        check_domain_size(&identity, size)?;
        if self.phase != Phase::Running {
            self.start_new()?;
        }
        let group = mode.group().cloned();

        if let Some(existing) = self.ledger.get(&identity) {
            if existing.size != size {
                return Err(LazerError::UnexpectedParameterRepetition {
                    identity,
                    expected: existing.size,
                    actual: size,
                });
            }
            if existing.group != group {
                return Err(group_mismatch(identity, existing.group.clone(), group));
            }
            return Ok(existing.index);
        }

        match self.domains.get(&identity) {
            Some(established) if established.size != size => {
                return Err(LazerError::InconsistentDomain {
                    identity,
                    established: established.size,
                    actual: size,
                });
            }
            Some(established) if established.group != group => {
                return Err(group_mismatch(identity, established.group.clone(), group));
            }
            Some(_) => {}
            None => {
                self.domains.insert(
                    identity.clone(),
                    Established {
                        size,
                        group: group.clone(),
                    },
                );
            }
        }

        let key = match &group {
            Some(group) => DigitKey::Group(group.clone()),
            None => DigitKey::Param(identity.clone()),
        };
        let index = match self.ledger.digit_mut(&key) {
            Some(digit) => {
                digit.radix = digit.radix.max(size);
                digit.value % size
            }
            None => {
                let value = self.plan.get(&key).copied().unwrap_or(0);
                self.ledger.push_digit(Digit {
                    key,
                    value,
                    radix: size,
                });
                value % size
            }
        };

        tracing::trace!(%identity, index, size, "pick");
        self.ledger.record(PickRecord {
            identity,
            group,
            index,
            size,
        });
        Ok(index)
    }

    /// Pick with the next ordinal identity of this repetition.
    pub fn pick_anonymous(&mut self, size: usize, mode: &PickMode) -> Result<usize, LazerError> {
        if self.phase != Phase::Running {
            self.start_new()?;
        }
        let identity = self.ledger.take_ordinal();
        self.pick(identity, size, mode)
    }

    /// Record the running repetition's combination.
    ///
    /// Calling this again before the next `start_new` returns the same combination without recording it twice.
    ///
    /// ## Errors
    ///
    /// - [`LazerError::DuplicateCombination`] when the combination was already produced earlier (only possible when
    ///   the body does not pick deterministically).
    pub fn complete_repetition(&mut self) -> Result<Combination, LazerError> {
        let combination = self.ledger.combination();
        if self.phase != Phase::Running {
            return Ok(combination);
        }
        self.phase = Phase::Completed;
        if !self.produced.insert(combination.clone()) {
            return Err(LazerError::DuplicateCombination {
                combination: combination.to_string(),
            });
        }
        tracing::debug!(%combination, pending = self.pending_combinations(), "repetition completed");
        Ok(combination)
    }

    /// Whether another combination remains to be produced.
    pub fn pending_combinations(&self) -> bool {
        match self.phase {
            Phase::Fresh => true,
            Phase::Exhausted => false,
            Phase::Running | Phase::Completed => self.ledger.digits().iter().any(Digit::can_advance),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        !self.pending_combinations()
    }

    /// Number of repetitions started so far.
    pub fn repetitions(&self) -> u64 {
        self.repetitions
    }

    /// Number of distinct combinations recorded so far.
    pub fn produced(&self) -> usize {
        self.produced.len()
    }

    /// Number of distinct identities picked over the whole exploration.
    pub fn discovered_parameters(&self) -> usize {
        self.domains.len()
    }

    /// Picks of the current (or last completed) repetition.
    pub fn ledger(&self) -> &PickLedger {
        &self.ledger
    }

    fn exhausted(&self) -> LazerError {
        LazerError::ExplorationExhausted {
            repetitions: self.repetitions,
        }
    }
}

/// Advance the odometer: bump the right-most digit that can advance and keep the prefix before it.
fn next_plan(digits: &[Digit]) -> Option<HashMap<DigitKey, usize>> {
    let pos = digits.iter().rposition(Digit::can_advance)?;
    let mut plan: HashMap<DigitKey, usize> = digits[..pos]
        .iter()
        .map(|digit| (digit.key.clone(), digit.value))
        .collect();
    plan.insert(digits[pos].key.clone(), digits[pos].value + 1);
    Some(plan)
}

fn group_mismatch(
    identity: ParameterIdentity,
    established: Option<ParameterGroup>,
    actual: Option<ParameterGroup>,
) -> LazerError {
    LazerError::GroupMismatch {
        identity,
        established: GroupLabel(established),
        actual: GroupLabel(actual),
    }
}
