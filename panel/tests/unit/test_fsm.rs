//! FSM unit tests

use dockyard::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};

#[test]
fn test_fsm_initial_state() {
    let fsm = DeploymentFsm::new();
    assert_eq!(fsm.state(), DeploymentState::Creating);
    assert!(fsm.error().is_none());
}

#[test]
fn test_fsm_pipeline_success_flow() {
    let mut fsm = DeploymentFsm::new();

    // Creating -> Building
    fsm.process(DeploymentEvent::BuildStarted).unwrap();
    assert_eq!(fsm.state(), DeploymentState::Building);

    // Building -> BuildComplete
    fsm.process(DeploymentEvent::BuildSucceeded).unwrap();
    assert_eq!(fsm.state(), DeploymentState::BuildComplete);

    // BuildComplete -> Running
    fsm.process(DeploymentEvent::Provisioned).unwrap();
    assert_eq!(fsm.state(), DeploymentState::Running);
}

#[test]
fn test_fsm_build_failure_is_terminal() {
    let mut fsm = DeploymentFsm::new();

    fsm.process(DeploymentEvent::BuildStarted).unwrap();
    fsm.process(DeploymentEvent::Failed("exit code 1".to_string())).unwrap();

    assert_eq!(fsm.state(), DeploymentState::Failed);
    assert_eq!(fsm.error(), Some("exit code 1"));

    for event in [
        DeploymentEvent::BuildStarted,
        DeploymentEvent::BuildSucceeded,
        DeploymentEvent::Provisioned,
        DeploymentEvent::Start,
        DeploymentEvent::Restart,
    ] {
        assert!(fsm.process(event).is_err());
        assert_eq!(fsm.state(), DeploymentState::Failed);
    }
}

#[test]
fn test_fsm_provisioning_failure() {
    let mut fsm = DeploymentFsm::new();

    fsm.process(DeploymentEvent::BuildStarted).unwrap();
    fsm.process(DeploymentEvent::BuildSucceeded).unwrap();
    fsm.process(DeploymentEvent::Failed("engine refused".to_string())).unwrap();

    assert_eq!(fsm.state(), DeploymentState::Failed);
}

#[test]
fn test_fsm_runtime_controls() {
    let mut fsm = DeploymentFsm::new();
    fsm.process(DeploymentEvent::BuildStarted).unwrap();
    fsm.process(DeploymentEvent::BuildSucceeded).unwrap();
    fsm.process(DeploymentEvent::Provisioned).unwrap();

    // Running -> Stopped -> Running
    fsm.process(DeploymentEvent::Stop).unwrap();
    assert_eq!(fsm.state(), DeploymentState::Stopped);
    fsm.process(DeploymentEvent::Start).unwrap();
    assert_eq!(fsm.state(), DeploymentState::Running);

    // Restart from either runtime state lands in Running
    fsm.process(DeploymentEvent::Restart).unwrap();
    assert_eq!(fsm.state(), DeploymentState::Running);
    fsm.process(DeploymentEvent::Stop).unwrap();
    fsm.process(DeploymentEvent::Restart).unwrap();
    assert_eq!(fsm.state(), DeploymentState::Running);
}

#[test]
fn test_fsm_invalid_transitions() {
    let mut fsm = DeploymentFsm::new();

    // Can't skip the build
    assert!(fsm.process(DeploymentEvent::Provisioned).is_err());
    assert!(fsm.process(DeploymentEvent::BuildSucceeded).is_err());
    // Can't control a container that doesn't exist
    assert!(fsm.process(DeploymentEvent::Stop).is_err());
    assert!(fsm.process(DeploymentEvent::Start).is_err());
    assert_eq!(fsm.state(), DeploymentState::Creating);

    fsm.process(DeploymentEvent::BuildStarted).unwrap();
    // Can't start twice
    assert!(fsm.process(DeploymentEvent::BuildStarted).is_err());
    assert!(fsm.process(DeploymentEvent::Stop).is_err());
    assert_eq!(fsm.state(), DeploymentState::Building);
}

#[test]
fn test_fsm_serialization() {
    let mut fsm = DeploymentFsm::new();
    fsm.process(DeploymentEvent::BuildStarted).unwrap();
    fsm.process(DeploymentEvent::Failed("boom".to_string())).unwrap();

    let json = serde_json::to_value(&fsm).unwrap();
    assert_eq!(json["status"], "FAILED");
    assert_eq!(json["error"], "boom");
}
