//! Ambient pick surface.
//!
//! These functions resolve against the scope active on the calling thread (see [`crate::install`]) and return one of
//! the offered values. Which one is the generator's business: a body that picks deterministically sees every
//! combination exactly once across the scope's repetitions.
//!
//! A protocol violation is returned as an error *and* remembered by the scope, so a body that swallows the error still
//! fails its repetition.

use std::borrow::Cow;

use lazer_core::{Lazer, LazerError, ParameterIdentity, PickMode};

use crate::install::current_scope;

/// Pick one of `values`, identified by the order of identity-less picks within the repetition.
///
/// Ordinal identities are only stable while every repetition takes the same path; use [`pick_named`] inside
/// branches.
pub fn pick<T>(values: &[T]) -> Result<&T, LazerError> {
    let index = resolve(None, values.len(), PickMode::Combined)?;
    Ok(&values[index])
}

/// Pick one of `values` under a stable name.
pub fn pick_named<T>(name: impl Into<Cow<'static, str>>, values: &[T]) -> Result<&T, LazerError> {
    pick_with(ParameterIdentity::named(name), values)
}

pub fn pick_with<T>(identity: ParameterIdentity, values: &[T]) -> Result<&T, LazerError> {
    let index = resolve(Some(identity), values.len(), PickMode::Combined)?;
    Ok(&values[index])
}

/// Pick one of `values`, identified by the caller's source location.
#[track_caller]
pub fn pick_here<T>(values: &[T]) -> Result<&T, LazerError> {
    pick_with(ParameterIdentity::here(), values)
}

/// Pick one of `values` as a member of an uncombined group.
///
/// Members of one group advance together instead of multiplying: a group whose largest member offers `n` values
/// needs `n` repetitions, and a member with fewer values wraps around.
pub fn pick_uncombined<T>(
    group: impl Into<Cow<'static, str>>,
    name: impl Into<Cow<'static, str>>,
    values: &[T],
) -> Result<&T, LazerError> {
    let index = resolve(
        Some(ParameterIdentity::named(name)),
        values.len(),
        PickMode::uncombined(group),
    )?;
    Ok(&values[index])
}

/// Pick `false`, then `true`.
pub fn pick_bool(name: impl Into<Cow<'static, str>>) -> Result<bool, LazerError> {
    pick_named(name, &[false, true]).copied()
}

/// Pick an index in `0..size` without materializing the values.
pub fn pick_index(identity: ParameterIdentity, size: usize) -> Result<usize, LazerError> {
    resolve(Some(identity), size, PickMode::Combined)
}

/// Cap the number of combinations the active scope attempts.
pub fn set_max_total_count(count: u64) -> Result<(), LazerError> {
    let scope = current_scope()?;
    scope
        .installation
        .with_slot(&scope, |slot| slot.policy.set_max_total_count(count))
}

/// Cap the number of failing combinations the active scope tolerates.
pub fn set_max_failure_count(count: u64) -> Result<(), LazerError> {
    let scope = current_scope()?;
    scope
        .installation
        .with_slot(&scope, |slot| slot.policy.set_max_failure_count(count))
}

fn resolve(identity: Option<ParameterIdentity>, size: usize, mode: PickMode) -> Result<usize, LazerError> {
    let scope = current_scope()?;
    scope.installation.with_slot(&scope, |slot| {
        let lazer = slot.lazer.get_or_insert_with(Lazer::new);
        let picked = match identity {
            Some(identity) => lazer.pick(identity, size, &mode),
            None => lazer.pick_anonymous(size, &mode),
        };
        if let Err(err) = &picked {
            if err.is_protocol_violation() && slot.violation.is_none() {
                slot.violation = Some(err.clone());
            }
        }
        picked
    })
}
