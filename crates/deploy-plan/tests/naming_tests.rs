use deploy_plan::construction::PlanBuilder;
use deploy_plan::naming::{
    collision_probability, generate_unique_name, ResourceNamer, MAX_NAME_ATTEMPTS, SUFFIX_LEN,
};
use deploy_plan::session::ConstructionSession;
use deploy_plan::PlanError;
use deploy_plan_test_utils::{test_context, ScriptedSuffix, StuckSuffix};
use std::collections::HashSet;

#[test]
fn test_ten_thousand_names_are_unique() {
    let mut session = ConstructionSession::default();
    let mut namer = ResourceNamer::new();
    let mut seen = HashSet::new();

    for _ in 0..10_000 {
        let name = namer.generate_unique_name(&mut session, "baseline").unwrap();
        assert!(seen.insert(name));
    }
    assert_eq!(seen.len(), 10_000);
}

#[test]
fn test_name_shape() {
    let mut session = ConstructionSession::default();
    let name = generate_unique_name(&mut session, "model-monitor").unwrap();

    let suffix = name.strip_prefix("model-monitor-").unwrap();
    assert_eq!(suffix.len(), SUFFIX_LEN);
    assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert!(session.has_name(&name));
}

#[test]
fn test_collision_is_redrawn() {
    let mut session = ConstructionSession::default();
    let mut namer = ResourceNamer::with_source(ScriptedSuffix::new(["aaaaaaaa", "aaaaaaaa", "bbbbbbbb"]));

    assert_eq!(
        namer.generate_unique_name(&mut session, "stack").unwrap(),
        "stack-aaaaaaaa"
    );
    assert_eq!(
        namer.generate_unique_name(&mut session, "stack").unwrap(),
        "stack-bbbbbbbb"
    );
}

#[test]
fn test_exhaustion_is_reported() {
    let mut session = ConstructionSession::default();
    let mut namer = ResourceNamer::with_source(StuckSuffix("deadbeef"));
    namer.generate_unique_name(&mut session, "stack").unwrap();

    assert_eq!(
        namer.generate_unique_name(&mut session, "stack"),
        Err(PlanError::NameGenerationExhausted {
            prefix: "stack".to_string(),
            attempts: MAX_NAME_ATTEMPTS,
        })
    );
}

#[test]
fn test_attempt_bound_is_configurable() {
    let mut session = ConstructionSession::default();
    let mut namer = ResourceNamer::with_source(StuckSuffix("00000000")).with_max_attempts(3);
    namer.generate_unique_name(&mut session, "s").unwrap();

    assert_eq!(
        namer.generate_unique_name(&mut session, "s"),
        Err(PlanError::NameGenerationExhausted {
            prefix: "s".to_string(),
            attempts: 3,
        })
    );
}

#[test]
fn test_exhausted_script_keeps_drawing() {
    let mut session = ConstructionSession::default();
    let mut namer = ResourceNamer::with_source(ScriptedSuffix::default());

    assert_eq!(
        namer.generate_unique_name(&mut session, "s").unwrap(),
        "s-00000001"
    );
}

#[test]
fn test_same_suffix_under_different_prefixes_is_fine() {
    let mut session = ConstructionSession::default();
    let mut namer = ResourceNamer::with_source(StuckSuffix("deadbeef"));
    namer.generate_unique_name(&mut session, "staging").unwrap();
    namer.generate_unique_name(&mut session, "prod").unwrap();
}

#[test]
fn test_sessions_are_independent() {
    let mut first = PlanBuilder::new(test_context()).with_suffix_source(StuckSuffix("0000cafe"));
    let mut second = PlanBuilder::new(test_context()).with_suffix_source(StuckSuffix("0000cafe"));

    assert_eq!(first.unique_name("monitor").unwrap(), "monitor-0000cafe");
    assert_eq!(second.unique_name("monitor").unwrap(), "monitor-0000cafe");
    assert_ne!(first.session().id(), second.session().id());
}

#[test]
fn test_collision_probability_at_ten_thousand() {
    let p = collision_probability(10_000);
    assert!(p > 0.01 && p < 0.013, "got {p}");
    assert!(collision_probability(1) < 1e-9);
}
