//! Property-based tests for the combination generator and scope policy
//!
//! These drive randomly shaped, deterministic pick programs through a `Lazer` until exhaustion and check the
//! counting and uniqueness invariants of the exploration.

use std::collections::HashSet;

use lazer_core::{
    Combination, Decision, Lazer, LazerError, ParameterIdentity, PickMode, RepetitionOutcome, ScopeConfig,
    ScopePolicy, StopReason,
};
use proptest::prelude::*;

/// Run `body` once per combination and return the combinations in production order.
fn exhaust(mut body: impl FnMut(&mut Lazer) -> Result<(), LazerError>) -> Vec<Combination> {
    let mut lazer = Lazer::new();
    let mut produced = Vec::new();
    while lazer.pending_combinations() {
        lazer.start_new().expect("a pending combination must start");
        body(&mut lazer).expect("deterministic body");
        produced.push(lazer.complete_repetition().expect("no duplicates"));
        assert!(produced.len() <= 10_000, "exploration did not terminate");
    }
    produced
}

fn distinct(combinations: &[Combination]) -> usize {
    combinations.iter().collect::<HashSet<_>>().len()
}

fn named(name: &'static str) -> ParameterIdentity {
    ParameterIdentity::named(name)
}

// =============================================================================
// Generator Properties
// =============================================================================

proptest! {
    /// Property: two independent parameters yield exactly m × n distinct combinations.
    #[test]
    fn cross_product_is_complete(m in 2usize..7, n in 2usize..7) {
        let produced = exhaust(|lazer| {
            lazer.pick(named("a"), m, &PickMode::Combined)?;
            lazer.pick(named("b"), n, &PickMode::Combined)?;
            Ok(())
        });
        prop_assert_eq!(produced.len(), m * n);
        prop_assert_eq!(distinct(&produced), m * n);
    }

    /// Property: any number of independent parameters multiply.
    #[test]
    fn independent_parameters_multiply(sizes in prop::collection::vec(2usize..5, 0..5)) {
        let produced = exhaust(|lazer| {
            for (i, &size) in sizes.iter().enumerate() {
                lazer.pick(ParameterIdentity::keyed("p", i as u64), size, &PickMode::Combined)?;
            }
            Ok(())
        });
        let expected: usize = sizes.iter().product();
        prop_assert_eq!(produced.len(), expected);
        prop_assert_eq!(distinct(&produced), expected);
    }

    /// Property: two members of one uncombined group yield max(m, n) combinations, each member covering its domain.
    #[test]
    fn uncombined_group_runs_side_by_side(m in 2usize..8, n in 2usize..8) {
        let group = PickMode::uncombined("pair");
        let mut left = HashSet::new();
        let mut right = HashSet::new();
        let produced = exhaust(|lazer| {
            left.insert(lazer.pick(named("left"), m, &group)?);
            right.insert(lazer.pick(named("right"), n, &group)?);
            Ok(())
        });
        prop_assert_eq!(produced.len(), m.max(n));
        prop_assert_eq!(left.len(), m);
        prop_assert_eq!(right.len(), n);
    }

    /// Property: a parameter picked in only one branch adds its values to that branch alone.
    #[test]
    fn branch_local_parameters_do_not_multiply(m in 2usize..7, n in 2usize..7) {
        let produced = exhaust(|lazer| {
            if lazer.pick(named("branch"), m, &PickMode::Combined)? == 0 {
                lazer.pick(named("inner"), n, &PickMode::Combined)?;
            }
            Ok(())
        });
        prop_assert_eq!(produced.len(), (m - 1) + n);
        prop_assert_eq!(distinct(&produced), produced.len());
    }

    /// Property: a combined axis multiplies with an uncombined group, which counts as one axis.
    #[test]
    fn group_counts_as_one_axis(m in 2usize..5, g1 in 2usize..5, g2 in 2usize..5) {
        let group = PickMode::uncombined("g");
        let produced = exhaust(|lazer| {
            lazer.pick(named("a"), m, &PickMode::Combined)?;
            lazer.pick(named("g1"), g1, &group)?;
            lazer.pick(named("g2"), g2, &group)?;
            Ok(())
        });
        prop_assert_eq!(produced.len(), m * g1.max(g2));
    }

    /// Property: the first combination picks index 0 everywhere.
    #[test]
    fn first_combination_is_all_zero(sizes in prop::collection::vec(2usize..6, 1..4)) {
        let produced = exhaust(|lazer| {
            for &size in &sizes {
                lazer.pick_anonymous(size, &PickMode::Combined)?;
            }
            Ok(())
        });
        prop_assert!(produced[0].iter().all(|(_, index)| index == 0));
    }
}

// =============================================================================
// Policy Properties
// =============================================================================

proptest! {
    /// Property: a total limit of k attempts at most max(k, 1) combinations.
    #[test]
    fn total_limit_bounds_attempts(limit in 0u64..10, failures in prop::collection::vec(any::<bool>(), 1..30)) {
        let mut policy = ScopePolicy::new(ScopeConfig::new().with_max_total_count(limit));
        let mut stop = None;
        for &failed in &failures {
            policy.record(if failed { RepetitionOutcome::Failed } else { RepetitionOutcome::Passed });
            if let Decision::Stop(reason) = policy.decide(true, false) {
                stop = Some(reason);
                break;
            }
        }
        prop_assert!(policy.attempted() <= limit.max(1));
        if failures.len() as u64 >= limit.max(1) {
            prop_assert_eq!(stop, Some(StopReason::TotalLimit));
        }
    }

    /// Property: a failure limit stops exactly at the max(k, 1)-th failure.
    #[test]
    fn failure_limit_stops_at_threshold(limit in 0u64..5, failures in prop::collection::vec(any::<bool>(), 1..30)) {
        let mut policy = ScopePolicy::new(ScopeConfig::new().with_max_failure_count(limit));
        let mut stop = None;
        for &failed in &failures {
            policy.record(if failed { RepetitionOutcome::Failed } else { RepetitionOutcome::Passed });
            if let Decision::Stop(reason) = policy.decide(true, false) {
                stop = Some(reason);
                break;
            }
        }
        let threshold = limit.max(1);
        let total_failures = failures.iter().filter(|&&failed| failed).count() as u64;
        if total_failures >= threshold {
            prop_assert_eq!(stop, Some(StopReason::FailureLimit));
            prop_assert_eq!(policy.failed(), threshold);
        } else {
            prop_assert_eq!(stop, None);
        }
    }
}

// =============================================================================
// Error Cases
// =============================================================================

#[test]
fn exhausted_generator_refuses_to_start() {
    let mut lazer = Lazer::new();
    lazer.start_new().unwrap();
    lazer.pick(named("flag"), 2, &PickMode::Combined).unwrap();
    lazer.complete_repetition().unwrap();
    lazer.start_new().unwrap();
    lazer.pick(named("flag"), 2, &PickMode::Combined).unwrap();
    lazer.complete_repetition().unwrap();
    assert!(lazer.is_exhausted());
    assert!(matches!(
        lazer.start_new(),
        Err(LazerError::ExplorationExhausted { repetitions: 2 })
    ));
}

#[test]
fn non_deterministic_body_is_detected() {
    let mut lazer = Lazer::new();
    lazer.start_new().unwrap();
    lazer.pick(named("x"), 2, &PickMode::Combined).unwrap();
    lazer.complete_repetition().unwrap();

    lazer.start_new().unwrap();
    lazer.pick(named("y"), 2, &PickMode::Combined).unwrap();
    lazer.complete_repetition().unwrap();

    // The plan only covers `y` now, so `x` starts over at 0 and repeats the first combination.
    lazer.start_new().unwrap();
    assert_eq!(lazer.pick(named("x"), 2, &PickMode::Combined).unwrap(), 0);
    assert!(matches!(
        lazer.complete_repetition(),
        Err(LazerError::DuplicateCombination { .. })
    ));
}

#[test]
fn changing_a_domain_size_is_rejected() {
    let mut lazer = Lazer::new();
    lazer.start_new().unwrap();
    lazer.pick(named("a"), 2, &PickMode::Combined).unwrap();
    lazer.complete_repetition().unwrap();
    lazer.start_new().unwrap();
    assert!(matches!(
        lazer.pick(named("a"), 3, &PickMode::Combined),
        Err(LazerError::InconsistentDomain { established: 2, actual: 3, .. })
    ));
}
