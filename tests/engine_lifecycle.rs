//! Engine state machine, failure surfacing and reset semantics.

mod _fixtures;

use _fixtures::{bitmask, client_input, server_input, EngineFixture, SET_SIM_CFG};
use sealink::{
    BackendError, BooleanSharing, LinkError, LinkErrorKind, LinkageEngine, LoopbackBackend,
};

fn simple_inputs() -> (sealink::ClientInput, sealink::ServerInput) {
    (
        client_input(&[("bm_1", bitmask(&[0x0f]))], 1),
        server_input(&[("bm_1", vec![bitmask(&[0x0f])])]),
    )
}

#[test]
fn run_requires_a_built_circuit() {
    let fixture = EngineFixture::new();
    let mut engine = LinkageEngine::new(fixture.config.clone(), &SET_SIM_CFG).unwrap();
    let (client, _) = simple_inputs();
    let err = engine.run_as_client(&client).unwrap_err();
    assert_eq!(err.kind(), LinkErrorKind::IllegalState);
}

#[test]
fn setup_requires_a_built_circuit() {
    let fixture = EngineFixture::new();
    let mut engine = LinkageEngine::new(fixture.config.clone(), &SET_SIM_CFG).unwrap();
    let err = engine.run_setup().unwrap_err();
    assert_eq!(err.kind(), LinkErrorKind::IllegalState);
}

#[test]
fn building_twice_is_illegal() {
    let fixture = EngineFixture::new();
    let mut engine = LinkageEngine::new(fixture.config.clone(), &SET_SIM_CFG).unwrap();
    engine.build_circuit(1).unwrap();
    let err = engine.build_circuit(1).unwrap_err();
    assert_eq!(err.kind(), LinkErrorKind::IllegalState);
}

#[test]
fn empty_database_is_rejected_at_build() {
    let fixture = EngineFixture::new();
    let mut engine = LinkageEngine::new(fixture.config.clone(), &SET_SIM_CFG).unwrap();
    let err = engine.build_circuit(0).unwrap_err();
    assert_eq!(err.kind(), LinkErrorKind::EmptyDatabase);
}

#[test]
fn missing_division_circuit_is_a_backend_error() {
    let fixture = EngineFixture::without_divider();
    let mut engine = LinkageEngine::new(fixture.config.clone(), &SET_SIM_CFG).unwrap();
    let err = engine.build_circuit(1).unwrap_err();
    assert_eq!(err.kind(), LinkErrorKind::BackendError);
    assert!(matches!(
        err,
        LinkError::Backend(BackendError::MissingSubCircuit { .. })
    ));
}

#[test]
#[cfg(feature = "run-both")]
fn execute_from_built_runs_setup_implicitly() {
    let fixture = EngineFixture::new();
    let mut engine = LinkageEngine::new(fixture.config.clone(), &SET_SIM_CFG).unwrap();
    let (client, server) = simple_inputs();
    engine.build_circuit(1).unwrap();
    // no run_setup(): the engine warns and runs it itself
    let result = engine.run_as_both(&client, &server).unwrap();
    assert_eq!(result.index, 0);
    assert!(result.is_match);
}

#[test]
#[cfg(feature = "run-both")]
fn engine_returns_to_created_after_a_run() {
    let fixture = EngineFixture::new();
    let mut engine = LinkageEngine::new(fixture.config.clone(), &SET_SIM_CFG).unwrap();
    let (client, server) = simple_inputs();

    engine.build_circuit(1).unwrap();
    engine.run_setup().unwrap();
    engine.run_as_both(&client, &server).unwrap();

    // back in *Created*: running again without a build is illegal, and a
    // fresh build succeeds
    let err = engine.run_as_both(&client, &server).unwrap_err();
    assert_eq!(err.kind(), LinkErrorKind::IllegalState);
    engine.build_circuit(1).unwrap();
    engine.run_setup().unwrap();
    let second = engine.run_as_both(&client, &server).unwrap();
    assert_eq!(second.index, 0);
}

#[test]
#[cfg(feature = "run-both")]
fn reset_is_idempotent() {
    let fixture = EngineFixture::new();
    let mut engine = LinkageEngine::new(fixture.config.clone(), &SET_SIM_CFG).unwrap();
    engine.build_circuit(1).unwrap();
    engine.reset();
    engine.reset();

    let (client, server) = simple_inputs();
    engine.build_circuit(1).unwrap();
    engine.run_setup().unwrap();
    assert!(engine.run_as_both(&client, &server).is_ok());
}

#[test]
fn single_sided_run_fails_without_a_peer() {
    let fixture = EngineFixture::new();
    let mut engine = LinkageEngine::new(fixture.config.clone(), &SET_SIM_CFG).unwrap();
    let (client, server) = simple_inputs();

    engine.build_circuit(1).unwrap();
    engine.run_setup().unwrap();
    let err = engine.run_as_client(&client).unwrap_err();
    assert!(matches!(
        err,
        LinkError::Backend(BackendError::PeerUnavailable { .. })
    ));

    // reset recovers the engine
    engine.reset();
    engine.build_circuit(1).unwrap();
    engine.run_setup().unwrap();
    let err = engine.run_as_server(&server).unwrap_err();
    assert_eq!(err.kind(), LinkErrorKind::BackendError);
}

#[test]
#[cfg(feature = "run-both")]
fn circuit_kind_must_match_the_run() {
    let fixture = EngineFixture::new();
    let mut engine = LinkageEngine::new(fixture.config.clone(), &SET_SIM_CFG).unwrap();
    let (client, server) = simple_inputs();

    engine.build_count_circuit(1).unwrap();
    engine.run_setup().unwrap();
    let err = engine.run_as_both(&client, &server).unwrap_err();
    assert_eq!(err.kind(), LinkErrorKind::IllegalState);
}

#[test]
#[cfg(feature = "run-both")]
fn cardinality_mismatch_is_a_shape_error() {
    let fixture = EngineFixture::new();
    let mut engine = LinkageEngine::new(fixture.config.clone(), &SET_SIM_CFG).unwrap();
    let (client, server) = simple_inputs();

    engine.build_circuit(3).unwrap();
    engine.run_setup().unwrap();
    let err = engine.run_as_both(&client, &server).unwrap_err();
    assert_eq!(err.kind(), LinkErrorKind::ShapeMismatch);
}

#[test]
#[cfg(feature = "run-both")]
fn malformed_payload_is_a_shape_error() {
    let fixture = EngineFixture::new();
    let mut engine = LinkageEngine::new(fixture.config.clone(), &SET_SIM_CFG).unwrap();
    let client = client_input(&[("bm_1", bitmask(&[0x0f, 0x00]))], 1);
    let server = server_input(&[("bm_1", vec![bitmask(&[0x0f])])]);

    engine.build_circuit(1).unwrap();
    engine.run_setup().unwrap();
    let err = engine.run_as_both(&client, &server).unwrap_err();
    assert_eq!(err.kind(), LinkErrorKind::ShapeMismatch);
}

#[test]
fn backend_width_must_agree_with_the_configuration() {
    let fixture = EngineFixture::new();
    let backend = LoopbackBackend::new(64, BooleanSharing::Yao);
    let err = LinkageEngine::with_backend(backend, fixture.config.clone(), &SET_SIM_CFG)
        .err()
        .expect("width disagreement");
    assert_eq!(err.kind(), LinkErrorKind::InvalidConfig);
}

#[test]
#[cfg(feature = "run-both")]
fn results_serialize_for_external_callers() {
    let fixture = EngineFixture::new();
    let mut engine = LinkageEngine::new(fixture.config.clone(), &SET_SIM_CFG).unwrap();
    let (client, server) = simple_inputs();
    engine.build_circuit(1).unwrap();
    engine.run_setup().unwrap();
    let result = engine.run_as_both(&client, &server).unwrap();

    let json = serde_json::to_string(&result).unwrap();
    let decoded: sealink::LinkageResult = serde_json::from_str(&json).unwrap();
    assert_eq!(result, decoded);

    let bytes = bincode::serialize(&result).unwrap();
    let decoded: sealink::LinkageResult = bincode::deserialize(&bytes).unwrap();
    assert_eq!(result, decoded);
}
