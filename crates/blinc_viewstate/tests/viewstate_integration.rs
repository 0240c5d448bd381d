//! Integration tests for view-states bound to a scope
//!
//! These tests drive the public API the way a component does:
//! - declare states and flags, finalise against a `Scope`
//! - move between states with `go` inside `Scope::apply`
//! - advance a `ManualScheduler` to let debounced flags land

use std::sync::{Arc, Once};
use std::time::Duration;

use blinc_viewstate::prelude::*;
use blinc_viewstate::{translate, Predicate, ViewStateConfig};
use proptest::prelude::*;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn setup() -> (Arc<ManualScheduler>, Scope, Builder) {
    init_tracing();
    let scheduler = Arc::new(ManualScheduler::new());
    let builder = Builder::new(scheduler.clone());
    (scheduler, Scope::new(), builder)
}

/// LOADING/READY walkthrough: a synchronous flag and a debounced one
#[test]
fn test_loading_ready_walkthrough() {
    let (scheduler, scope, builder) = setup();
    let view = builder
        .state("LOADING")
        .state("READY")
        .flag_with("isLoading", "LOADING")
        .flag_with("isIdle", "READY")
        .delay(Some(10))
        .finalise(Some(scope.shared()));

    scope.apply(|| view.go_to("LOADING")).unwrap();
    assert_eq!(scope.flag("isLoading"), Some(true));
    assert_eq!(scope.flag("isIdle"), None);

    scope.apply(|| view.go_to("READY")).unwrap();
    assert_eq!(scope.flag("isLoading"), Some(false));
    assert_eq!(scope.flag("isIdle"), None);

    scheduler.advance(ms(9));
    assert_eq!(scope.flag("isIdle"), None);
    scheduler.advance(ms(1));
    assert_eq!(scope.flag("isIdle"), Some(true));
}

/// A flag that is asserted only once its state has been stable long enough
#[test]
fn test_assert_reversed_within_window_never_lands() {
    let (scheduler, scope, builder) = setup();
    let view = builder
        .state("READY")
        .state("SAVING")
        .flag_with("isIdle", "READY")
        .delay_assert(Some(10))
        .finalise(Some(scope.shared()));

    scope.apply(|| view.go_to("SAVING")).unwrap();
    assert_eq!(scope.flag("isIdle"), Some(false));

    scope.apply(|| view.go_to("READY")).unwrap();
    scheduler.advance(ms(5));
    scope.apply(|| view.go_to("SAVING")).unwrap();
    scheduler.advance(ms(50));

    assert_eq!(scope.flag("isIdle"), Some(false));
}

#[test]
fn test_compound_expression() {
    let (_, scope, builder) = setup();
    let view = builder
        .state("EDITING")
        .state("SAVING")
        .state("LOCKED")
        .flag_with("canType", "EDITING && !SAVING")
        .flag_with("showSpinner", "SAVING || LOCKED")
        .finalise(Some(scope.shared()));

    scope.apply(|| view.go_to("EDITING")).unwrap();
    assert_eq!(scope.flag("canType"), Some(true));
    assert_eq!(scope.flag("showSpinner"), Some(false));

    scope.apply(|| view.go_to("LOCKED")).unwrap();
    assert_eq!(scope.flag("canType"), Some(false));
    assert_eq!(scope.flag("showSpinner"), Some(true));
}

/// Words inside a statement always test the active state
#[test]
fn test_flag_name_in_statement_tests_state() {
    let (_, scope, builder) = setup();
    let view = builder
        .state("LOADING")
        .flag_with("isLoading", "LOADING")
        .flag_with("notLoading", "!isLoading")
        .finalise(Some(scope.shared()));

    scope.apply(|| view.go_to("LOADING")).unwrap();
    assert_eq!(scope.flag("isLoading"), Some(true));
    // `isLoading` is never the active state, so the negation holds
    assert_eq!(scope.flag("notLoading"), Some(true));
}

#[test]
fn test_translation_shape() {
    assert_eq!(
        translate("A && !B", "viewState"),
        r#"(viewState === "A") && !(viewState === "B")"#
    );
    let predicate = Predicate::compile(Some("A && !B"), "viewState");
    assert!(predicate.evaluate(Some("A")));
    assert!(!predicate.evaluate(Some("B")));
}

#[test]
fn test_malformed_flag_stays_false() {
    let (_, scope, builder) = setup();
    let view = builder
        .state("READY")
        .flag_with("broken", "READY &&")
        .finalise(Some(scope.shared()));

    scope.apply(|| view.go_to("READY")).unwrap();
    assert_eq!(scope.flag("broken"), Some(false));
}

#[test]
fn test_no_writes_after_dispose() {
    let (scheduler, scope, builder) = setup();
    let mut view = builder
        .state("LOADING")
        .state("READY")
        .flag_with("isLoading", "LOADING")
        .flag_with("isIdle", "READY")
        .delay(Some(10))
        .finalise(Some(scope.shared()));

    scope.apply(|| view.go_to("LOADING")).unwrap();
    view.dispose();

    scope.set("viewState", "READY");
    scope.digest().unwrap();
    scheduler.advance(ms(100));

    assert_eq!(scope.flag("isLoading"), Some(true));
    assert_eq!(scope.flag("isIdle"), None);
    assert!(!view.go_to("READY"));
}

#[test]
fn test_double_revive_single_write() {
    let (scheduler, scope, builder) = setup();
    let mut view = builder
        .state("READY")
        .flag_with("isIdle", "READY")
        .delay_assert(Some(10))
        .finalise(Some(scope.shared()));

    view.revive(None);
    view.revive(None);

    scope.apply(|| view.go_to("READY")).unwrap();
    assert_eq!(view.pending_count(), 1);
    assert_eq!(scheduler.pending(), 1);

    assert_eq!(scheduler.advance(ms(10)), 1);
    assert_eq!(scope.flag("isIdle"), Some(true));
}

#[test]
fn test_child_builder_does_not_leak_into_parent() {
    let (_, scope, builder) = setup();
    let base = builder.state("LOADING").flag_with("isLoading", "LOADING");
    let _child = base.create().state("X").flag_with("isX", "X");

    let view = base.finalise(Some(scope.shared()));
    assert_eq!(view.go().names().collect::<Vec<_>>(), vec!["LOADING"]);
    assert_eq!(view.watcher_count(), 1);
    assert_eq!(scope.watcher_count(), 1);
}

#[test]
fn test_unbound_without_context() {
    let (_, _, builder) = setup();
    let view = builder.state("READY").flag_with("f", "READY").finalise(None);
    assert!(!view.is_bound());
    assert!(view.go().is_empty());
    assert!(!view.go_to("READY"));
}

#[test]
fn test_custom_state_field() {
    init_tracing();
    let scheduler = Arc::new(ManualScheduler::new());
    let scope = Scope::new();
    let options = ViewStateOptions {
        state_field: "mode".to_string(),
    };
    let view = Builder::with_options(scheduler, options)
        .state("EDIT")
        .flag_with("editing", "EDIT")
        .finalise(Some(scope.shared()));

    scope.apply(|| view.go_to("EDIT")).unwrap();
    assert_eq!(scope.text("mode").as_deref(), Some("EDIT"));
    assert_eq!(scope.view_state(), None);
    assert_eq!(scope.flag("editing"), Some(true));
}

#[test]
fn test_config_file_roundtrip_into_view() {
    let (scheduler, scope, _) = setup();
    let path = std::env::temp_dir().join(format!("viewstate-{}.toml", std::process::id()));
    std::fs::write(
        &path,
        r#"
            states = ["LOADING", "READY"]

            [flags.isLoading]
            expression = "LOADING"

            [flags.isIdle]
            expression = "READY"
            assert_delay = 20
        "#,
    )
    .unwrap();

    let config = ViewStateConfig::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let view = Builder::from_config(&config, scheduler.clone()).finalise(Some(scope.shared()));
    scope.apply(|| view.go_to("READY")).unwrap();
    assert_eq!(scope.flag("isLoading"), Some(false));
    assert_eq!(scope.flag("isIdle"), None);

    scheduler.advance(ms(20));
    assert_eq!(scope.flag("isIdle"), Some(true));
}

proptest! {
    #[test]
    fn prop_valid_state_gets_transition(name in "[A-Za-z_][A-Za-z0-9_-]{0,12}") {
        let (_, scope, builder) = setup();
        let view = builder.state(&name).finalise(Some(scope.shared()));

        prop_assert!(view.go().contains(&name));
        prop_assert!(view.go_to(&name));
        prop_assert_eq!(scope.view_state(), Some(name.clone()));
    }

    #[test]
    fn prop_invalid_state_is_ignored(
        name in prop_oneof!["[0-9-][A-Za-z0-9_-]{0,12}", Just(String::new())]
    ) {
        let (_, scope, builder) = setup();
        let chain = builder.state("BASE").state(&name);
        prop_assert_eq!(chain.params().states().collect::<Vec<_>>(), vec!["BASE"]);

        let view = chain.finalise(Some(scope.shared()));
        prop_assert!(!view.go().contains(&name));
        prop_assert_eq!(view.go().len(), 1);
    }
}
