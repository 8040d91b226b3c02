//! Snapshot tests pinning the exact order in which combinations are produced.
//!
//! Property tests check counts; these check that the order stays depth-first with the newest parameter varying
//! fastest, including for parameters first discovered partway through an exploration.

mod common;

use lazer::{Installation, LazerConfig, LazerError, Scope, ScopeConfig, pick_bool, pick_named, pick_uncombined};
use lazer_core::{Lazer, ParameterIdentity, PickMode};

/// Run `body` until exhaustion, one rendered combination per line.
fn render(mut body: impl FnMut(&mut Lazer) -> Result<(), LazerError>) -> String {
    let mut lazer = Lazer::new();
    let mut lines = Vec::new();
    while lazer.pending_combinations() {
        lazer.start_new().unwrap();
        body(&mut lazer).unwrap();
        lines.push(lazer.complete_repetition().unwrap().to_string());
    }
    lines.join("\n")
}

fn id(name: &'static str) -> ParameterIdentity {
    ParameterIdentity::named(name)
}

#[test]
fn cross_product_order() {
    let rendered = render(|lazer| {
        lazer.pick(id("a"), 2, &PickMode::Combined)?;
        lazer.pick(id("b"), 3, &PickMode::Combined)?;
        Ok(())
    });
    insta::assert_snapshot!(rendered, @r"
    {a=0, b=0}
    {a=0, b=1}
    {a=0, b=2}
    {a=1, b=0}
    {a=1, b=1}
    {a=1, b=2}
    ");
}

#[test]
fn branch_local_parameter_order() {
    let rendered = render(|lazer| {
        if lazer.pick(id("mode"), 3, &PickMode::Combined)? == 1 {
            lazer.pick(id("detail"), 2, &PickMode::Combined)?;
        }
        Ok(())
    });
    insta::assert_snapshot!(rendered, @r"
    {mode=0}
    {detail=0, mode=1}
    {detail=1, mode=1}
    {mode=2}
    ");
}

#[test]
fn uncombined_group_inside_a_combined_axis() {
    let group = PickMode::uncombined("g");
    let rendered = render(|lazer| {
        lazer.pick(id("a"), 2, &PickMode::Combined)?;
        lazer.pick(id("x"), 2, &group)?;
        lazer.pick(id("y"), 3, &group)?;
        Ok(())
    });
    insta::assert_snapshot!(rendered, @r"
    {a=0, x=0, y=0}
    {a=0, x=1, y=1}
    {a=0, x=0, y=2}
    {a=1, x=0, y=0}
    {a=1, x=1, y=1}
    {a=1, x=0, y=2}
    ");
}

#[test]
fn ordinal_identities_follow_pick_order() {
    let rendered = render(|lazer| {
        lazer.pick_anonymous(2, &PickMode::Combined)?;
        lazer.pick_anonymous(2, &PickMode::Combined)?;
        Ok(())
    });
    insta::assert_snapshot!(rendered, @r"
    {#0=0, #1=0}
    {#0=0, #1=1}
    {#0=1, #1=0}
    {#0=1, #1=1}
    ");
}

#[test]
fn scope_report_of_a_capped_exploration() {
    common::init_tracing();
    let report = Scope::new("login")
        .with_installation(Installation::new())
        .with_defaults(LazerConfig::new())
        .with_config(ScopeConfig::new().with_max_failure_count(2))
        .run(|| -> Result<(), String> {
            let user = *pick_named("user", &["admin", "guest"]).map_err(|err| err.to_string())?;
            let remember = pick_bool("remember").map_err(|err| err.to_string())?;
            let locale = *pick_uncombined("ui", "locale", &["en", "nl"]).map_err(|err| err.to_string())?;
            if user == "guest" && remember {
                return Err(format!("guest cannot be remembered ({locale})"));
            }
            Ok(())
        })
        .unwrap();

    let mut lines = vec![report.to_string()];
    for record in &report.combinations {
        let message = record.message.as_deref().unwrap_or("ok");
        lines.push(format!("#{} {} {}", record.repetition, record.combination, message));
    }
    insta::assert_snapshot!(lines.join("\n"), @r"
    login: 8 combination(s), 6 passed, 2 failed (exhausted)
    #1 {locale=0, remember=0, user=0} ok
    #2 {locale=1, remember=0, user=0} ok
    #3 {locale=0, remember=1, user=0} ok
    #4 {locale=1, remember=1, user=0} ok
    #5 {locale=0, remember=0, user=1} ok
    #6 {locale=1, remember=0, user=1} ok
    #7 {locale=0, remember=1, user=1} guest cannot be remembered (en)
    #8 {locale=1, remember=1, user=1} guest cannot be remembered (nl)
    ");
}
