//! Observer session binding tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{app, request, FakeEngine, FakeToolchain};
use dockyard::broadcast::Observer;
use dockyard::deploy::executor::BUILD_SUCCEEDED_MESSAGE;
use dockyard::deploy::fsm::DeploymentState;
use dockyard::errors::DockyardError;
use dockyard::server::observer::DEPLOYMENT_NOT_FOUND_REPLY;
use tokio::sync::mpsc::UnboundedReceiver;

async fn collect_until(rx: &mut UnboundedReceiver<String>, last: &str) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        let line = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for build output")
            .expect("observer stream ended");
        let done = line == last;
        lines.push(line);
        if done {
            return lines;
        }
    }
}

async fn wait_for_status(app: &dockyard::app::state::AppState, id: &str, status: DeploymentState) {
    for _ in 0..200 {
        if app.service.get(id).unwrap().status() == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("{} never reached {}", id, status);
}

#[tokio::test]
async fn test_unknown_id_is_rejected_without_registering() {
    let work = tempfile::tempdir().unwrap();
    let app = app(
        work.path(),
        Arc::new(FakeToolchain::building("true")),
        Arc::new(FakeEngine::default()),
        false,
    );

    let (observer, _rx) = Observer::channel();
    let result = app.observers.on_connect("app-unknown", observer);

    assert!(matches!(result, Err(DockyardError::NotFound(_))));
    assert!(app.broadcaster.is_empty());
}

#[tokio::test]
async fn test_observer_start_build_streams_output() {
    let work = tempfile::tempdir().unwrap();
    let app = app(
        work.path(),
        Arc::new(FakeToolchain::building("echo step-1; echo step-2 >&2; echo step-3")),
        Arc::new(FakeEngine::default()),
        false,
    );
    let record = app.service.submit(request("app.example.com", 8080));

    let (observer, mut rx) = Observer::channel();
    app.observers.on_connect(&record.id, observer).unwrap();
    assert!(app.observers.on_message(&record.id, "startBuild").is_none());

    let lines = collect_until(&mut rx, BUILD_SUCCEEDED_MESSAGE).await;
    assert!(lines.contains(&"step-1".to_string()));
    assert!(lines.contains(&"ERROR: step-2".to_string()));
    let one = lines.iter().position(|l| l == "step-1").unwrap();
    let three = lines.iter().position(|l| l == "step-3").unwrap();
    assert!(one < three);

    wait_for_status(&app, &record.id, DeploymentState::Running).await;
}

#[tokio::test]
async fn test_start_build_with_explicit_id() {
    let work = tempfile::tempdir().unwrap();
    let app = app(
        work.path(),
        Arc::new(FakeToolchain::building("echo ok")),
        Arc::new(FakeEngine::default()),
        false,
    );
    let watched = app.service.submit(request("a.example.com", 8080));
    let other = app.service.submit(request("b.example.com", 8080));

    let (observer, _rx) = Observer::channel();
    app.observers.on_connect(&watched.id, observer).unwrap();

    let reply = app
        .observers
        .on_message(&watched.id, &format!("startBuild:{}", other.id));
    assert!(reply.is_none());

    wait_for_status(&app, &other.id, DeploymentState::Running).await;
    assert_eq!(app.service.get(&watched.id).unwrap().status(), DeploymentState::Creating);
}

#[tokio::test]
async fn test_start_build_for_missing_deployment() {
    let work = tempfile::tempdir().unwrap();
    let app = app(
        work.path(),
        Arc::new(FakeToolchain::building("true")),
        Arc::new(FakeEngine::default()),
        false,
    );
    let record = app.service.submit(request("app.example.com", 8080));

    assert_eq!(
        app.observers.on_message(&record.id, "startBuild:app-gone"),
        Some(DEPLOYMENT_NOT_FOUND_REPLY.to_string())
    );
    assert!(app.observers.on_message(&record.id, "hello").is_some());
    assert_eq!(app.service.get(&record.id).unwrap().status(), DeploymentState::Creating);
}

#[tokio::test]
async fn test_repeated_start_build_runs_once() {
    let work = tempfile::tempdir().unwrap();
    let toolchain = Arc::new(FakeToolchain::building("sleep 0.2; echo ok"));
    let app = app(work.path(), toolchain.clone(), Arc::new(FakeEngine::default()), false);
    let record = app.service.submit(request("app.example.com", 8080));

    for _ in 0..5 {
        app.observers.on_message(&record.id, "startBuild");
    }
    wait_for_status(&app, &record.id, DeploymentState::Running).await;
    app.observers.on_message(&record.id, "startBuild");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(toolchain.fetch_count(), 1);
}

#[tokio::test]
async fn test_late_observer_gets_no_backlog() {
    let work = tempfile::tempdir().unwrap();
    let app = app(
        work.path(),
        Arc::new(FakeToolchain::building("echo before")),
        Arc::new(FakeEngine::default()),
        false,
    );
    let record = app.service.submit(request("app.example.com", 8080));
    app.executor.run_pipeline(&record.id).await.unwrap();

    let (observer, mut rx) = Observer::channel();
    app.observers.on_connect(&record.id, observer).unwrap();

    assert!(rx.try_recv().is_err());
    assert!(app
        .service
        .get(&record.id)
        .unwrap()
        .logs
        .contains(&"before".to_string()));
}

#[tokio::test]
async fn test_stale_disconnect_keeps_new_session() {
    let work = tempfile::tempdir().unwrap();
    let app = app(
        work.path(),
        Arc::new(FakeToolchain::building("true")),
        Arc::new(FakeEngine::default()),
        false,
    );
    let record = app.service.submit(request("app.example.com", 8080));

    let (old, _old_rx) = Observer::channel();
    let old_id = old.id();
    let (new, _new_rx) = Observer::channel();

    app.observers.on_connect(&record.id, old).unwrap();
    app.observers.on_connect(&record.id, new).unwrap();

    assert!(!app.observers.on_disconnect(&record.id, old_id));
    assert!(app.broadcaster.is_attached(&record.id));
}
