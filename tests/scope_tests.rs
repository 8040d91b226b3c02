//! End-to-end exploration through `Scope`, the ambient pick surface and the installation.

mod common;

use std::cell::RefCell;
use std::collections::HashSet;

use lazer::{
    Decision, Installation, LazerConfig, LazerError, RepetitionDriver, RepetitionOutcome, Scope, ScopeConfig,
    ScopeKey, StopReason, pick_bool, pick_named, pick_uncombined, set_max_failure_count, set_max_total_count,
};

fn scope(name: &str) -> Scope {
    common::init_tracing();
    Scope::new(name)
        .with_installation(Installation::new())
        .with_defaults(LazerConfig::new())
}

#[test]
fn unparameterized_body_runs_once() {
    let mut runs = 0;
    let report = scope("plain")
        .run(|| -> Result<(), String> {
            runs += 1;
            Ok(())
        })
        .unwrap();
    assert_eq!(runs, 1);
    assert_eq!(report.attempted(), 1);
    assert!(!report.parameterized);
    assert_eq!(report.stop, StopReason::Exhausted);
    assert_eq!(report.to_string(), "plain: passed");
}

#[test]
fn combined_picks_cover_the_cross_product() {
    let seen = RefCell::new(Vec::new());
    let report = scope("cross")
        .run(|| -> Result<(), LazerError> {
            let a = *pick_named("a", &['x', 'y', 'z'])?;
            let b = *pick_named("b", &[1, 2])?;
            seen.borrow_mut().push((a, b));
            Ok(())
        })
        .unwrap();
    let seen = seen.into_inner();
    assert_eq!(seen.len(), 6);
    assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 6);
    assert_eq!(report.attempted(), 6);
    assert!(report.parameterized);
}

#[test]
fn uncombined_picks_cover_each_axis_once() {
    let seen = RefCell::new(Vec::new());
    let report = scope("qronic")
        .run(|| -> Result<(), LazerError> {
            let browser = *pick_uncombined("env", "browser", &["firefox", "chrome", "safari"])?;
            let locale = *pick_uncombined("env", "locale", &["en", "nl"])?;
            seen.borrow_mut().push((browser, locale));
            Ok(())
        })
        .unwrap();
    assert_eq!(report.attempted(), 3);
    assert_eq!(
        seen.into_inner(),
        vec![("firefox", "en"), ("chrome", "nl"), ("safari", "en")]
    );
}

#[test]
fn replay_with_another_domain_size_is_a_protocol_violation() {
    let result = scope("replay").run(|| -> Result<(), LazerError> {
        pick_named("a", &[1, 2])?;
        // Swallowing the error does not hide it from the scope.
        let _ = pick_named("a", &[1, 2, 3]);
        Ok(())
    });
    match result {
        Err(LazerError::UnexpectedParameterRepetition { expected, actual, .. }) => {
            assert_eq!((expected, actual), (2, 3));
        }
        other => panic!("expected a protocol violation, got {other:?}"),
    }
}

#[test]
fn total_limit_of_one_is_still_parameterized() {
    let mut runs = 0;
    let report = scope("capped")
        .with_config(ScopeConfig::new().with_max_total_count(1))
        .run(|| -> Result<(), LazerError> {
            runs += 1;
            pick_named("n", &[1, 2, 3, 4])?;
            Ok(())
        })
        .unwrap();
    assert_eq!(runs, 1);
    assert!(report.parameterized);
    assert!(report.capped());
    assert_eq!(report.stop, StopReason::TotalLimit);
}

#[test]
fn failure_limit_stops_at_the_first_failure() {
    let report = scope("fail_fast")
        .with_config(ScopeConfig::new().with_max_failure_count(1))
        .run(|| -> Result<(), String> {
            let n = *pick_named("n", &[1, 2, 3, 4, 5, 6]).map_err(|err| err.to_string())?;
            if n == 2 || n == 5 {
                return Err(format!("combination {n} failed"));
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(report.attempted(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.stop, StopReason::FailureLimit);
    assert_eq!(report.combinations[1].message.as_deref(), Some("combination 2 failed"));
}

#[test]
fn failure_limit_without_failures_explores_everything() {
    let report = scope("no_failures")
        .with_config(ScopeConfig::new().with_max_failure_count(1))
        .run(|| pick_named("n", &[1, 2, 3, 4, 5, 6]).map(|_| ()))
        .unwrap();
    assert_eq!(report.attempted(), 6);
    assert_eq!(report.stop, StopReason::Exhausted);
}

#[test]
fn limits_set_from_the_body_apply_to_the_running_scope() {
    let report = scope("self_limiting")
        .run(|| -> Result<(), LazerError> {
            set_max_total_count(3)?;
            set_max_failure_count(10)?;
            pick_named("a", &[1, 2])?;
            pick_named("b", &[1, 2])?;
            Ok(())
        })
        .unwrap();
    assert_eq!(report.attempted(), 3);
    assert_eq!(report.stop, StopReason::TotalLimit);
    assert!(matches!(set_max_total_count(1), Err(LazerError::NoActiveScope)));
}

#[test]
fn panics_are_failing_combinations() {
    let report = scope("panicky")
        .run(|| -> Result<(), LazerError> {
            if pick_bool("explode")? {
                panic!("boom");
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(report.attempted(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures().next().and_then(|r| r.message.as_deref()), Some("boom"));
}

#[test]
fn nested_scopes_explore_independently() {
    let installation = Installation::new();
    let mut inner_runs = 0;
    let outer = Scope::new("outer")
        .with_installation(installation.clone())
        .with_defaults(LazerConfig::new())
        .run(|| -> Result<(), LazerError> {
            pick_named("a", &[1, 2])?;
            let inner = Scope::new("inner")
                .with_installation(installation.clone())
                .with_defaults(LazerConfig::new())
                .run(|| -> Result<(), LazerError> {
                    inner_runs += 1;
                    pick_named("b", &[1, 2, 3])?;
                    Ok(())
                })?;
            assert_eq!(inner.attempted(), 3);
            Ok(())
        })
        .unwrap();
    assert_eq!(outer.attempted(), 2);
    assert_eq!(inner_runs, 6);
    assert!(outer.combinations.iter().all(|record| record.combination.len() == 1));
}

#[test]
fn reinstalling_never_resumes_stale_exploration() {
    common::init_tracing();
    let installation = Installation::new();
    let key = ScopeKey::new("shared");

    let mut first = RepetitionDriver::new(installation.clone(), key.clone(), ScopeConfig::new()).unwrap();
    assert!(first.begin().unwrap());
    assert_eq!(*pick_named("a", &[10, 20, 30]).unwrap(), 10);
    first.end_body().unwrap();
    assert_eq!(first.finish(RepetitionOutcome::Passed, None, false).unwrap(), Decision::Repeat);

    assert_eq!(installation.uninstall(), 1);
    assert!(installation.install());
    drop(first);

    let mut firsts = Vec::new();
    Scope::new("shared")
        .with_installation(installation.clone())
        .with_defaults(LazerConfig::new())
        .run(|| -> Result<(), LazerError> {
            firsts.push(*pick_named("a", &[10, 20, 30])?);
            Ok(())
        })
        .unwrap();
    assert_eq!(firsts, vec![10, 20, 30]);
}

#[test]
fn the_same_scope_name_cannot_be_explored_twice_at_once() {
    let installation = Installation::new();
    let _held = RepetitionDriver::new(installation.clone(), ScopeKey::new("busy"), ScopeConfig::new()).unwrap();
    let result = Scope::new("busy")
        .with_installation(installation)
        .run(|| -> Result<(), String> { Ok(()) });
    assert!(matches!(result, Err(LazerError::ScopeAlreadyActive { .. })));
}

#[test]
fn scopes_on_separate_threads_do_not_interfere() {
    let installation = Installation::new();
    let reports: Vec<_> = std::thread::scope(|threads| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let installation = installation.clone();
                threads.spawn(move || {
                    Scope::new(format!("worker{i}"))
                        .with_installation(installation)
                        .with_defaults(LazerConfig::new())
                        .run(|| -> Result<(), LazerError> {
                            pick_named("a", &[1, 2])?;
                            pick_named("b", &[1, 2, 3])?;
                            Ok(())
                        })
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });
    assert!(reports.iter().all(|report| report.attempted() == 6));
    assert!(installation.active_scopes().is_empty());
}
