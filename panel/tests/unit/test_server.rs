//! HTTP and WebSocket surface tests against a live server

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::{app, FakeEngine, FakeToolchain};
use dockyard::app::options::ServerOptions;
use dockyard::app::state::AppState;
use dockyard::deploy::executor::BUILD_SUCCEEDED_MESSAGE;
use dockyard::server::handlers::SUBMITTED_MESSAGE;
use dockyard::server::observer::NOT_FOUND_CLOSE_CODE;
use dockyard::server::serve::serve;
use dockyard_api::models::{DeploymentResponse, SubmitDeploymentResponse};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::{connect_async, tungstenite::Message};

async fn start(app: &AppState) -> SocketAddr {
    let options = ServerOptions {
        host: "127.0.0.1".to_string(),
        port: 0,
    };
    let (addr, _handle) = serve(
        &options,
        Arc::new(app.server_state()),
        std::future::pending::<()>(),
    )
    .await
    .unwrap();
    addr
}

fn test_app(work: &std::path::Path, script: &str) -> AppState {
    app(
        work,
        Arc::new(FakeToolchain::building(script)),
        Arc::new(FakeEngine::default()),
        false,
    )
}

async fn submit(client: &reqwest::Client, addr: SocketAddr, body: serde_json::Value) -> reqwest::Response {
    client
        .post(format!("http://{}/deployments", addr))
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_submit_and_fetch_deployment() {
    let work = tempfile::tempdir().unwrap();
    let app = test_app(work.path(), "echo ok");
    let addr = start(&app).await;
    let client = reqwest::Client::new();

    let response = submit(
        &client,
        addr,
        json!({
            "repo_url": "https://github.com/acme/site.git",
            "credential": "ghp_topsecret",
            "domain": "app.example.com",
            "internal_port": 8080
        }),
    )
    .await;
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    let submitted: SubmitDeploymentResponse = response.json().await.unwrap();
    assert_eq!(submitted.message, SUBMITTED_MESSAGE);

    let response = client
        .get(format!("http://{}/deployments/{}", addr, submitted.deployment_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(!body.contains("ghp_topsecret"));

    let record: DeploymentResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(record.status, "CREATING");
    assert_eq!(record.domain, "app.example.com");
    assert_eq!(record.internal_port, 8080);

    let list: Vec<DeploymentResponse> = client
        .get(format!("http://{}/deployments", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.len(), 1);
}

#[tokio::test]
async fn test_invalid_requests_are_unprocessable() {
    let work = tempfile::tempdir().unwrap();
    let app = test_app(work.path(), "true");
    let addr = start(&app).await;
    let client = reqwest::Client::new();

    for body in [
        json!({"repo_url": "not a url", "domain": "app.example.com", "internal_port": 8080}),
        json!({"repo_url": "https://github.com/a/b.git", "domain": "bad domain!", "internal_port": 8080}),
        json!({"repo_url": "https://github.com/a/b.git", "domain": "app.example.com", "internal_port": 0}),
        json!({"repo_url": "https://github.com/a/b.git", "domain": "app.example.com", "internal_port": 65536}),
    ] {
        let response = submit(&client, addr, body).await;
        assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    }
    assert!(app.service.list().is_empty());
}

#[tokio::test]
async fn test_unknown_deployment_is_not_found() {
    let work = tempfile::tempdir().unwrap();
    let app = test_app(work.path(), "true");
    let addr = start(&app).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{}/deployments/app-missing", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    let response = client
        .post(format!("http://{}/deployments/app-missing/stop", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    let response = client
        .delete(format!("http://{}/deployments/app-missing", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_observer_for_unknown_id_is_closed() {
    let work = tempfile::tempdir().unwrap();
    let app = test_app(work.path(), "true");
    let addr = start(&app).await;

    let (mut socket, _) = connect_async(format!("ws://{}/deployments/app-missing/logs/ws", addr))
        .await
        .unwrap();

    let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match message {
        Message::Close(Some(frame)) => {
            assert_eq!(u16::from(frame.code), NOT_FOUND_CLOSE_CODE);
            assert_eq!(frame.reason.to_string(), "not found");
        }
        other => panic!("expected close frame, got {:?}", other),
    }
    assert!(app.broadcaster.is_empty());
}

#[tokio::test]
async fn test_observer_receives_build_output() {
    let work = tempfile::tempdir().unwrap();
    let app = test_app(work.path(), "echo compiling; echo warning >&2");
    let addr = start(&app).await;

    let record = app.service.submit(common::request("app.example.com", 8080));
    let (mut socket, _) = connect_async(format!("ws://{}/deployments/{}/logs/ws", addr, record.id))
        .await
        .unwrap();

    // attach happens right after the upgrade
    for _ in 0..100 {
        if app.broadcaster.is_attached(&record.id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    socket.send(Message::Text("startBuild".to_string().into())).await.unwrap();

    let mut lines = Vec::new();
    loop {
        let message = tokio::time::timeout(Duration::from_secs(10), socket.next())
            .await
            .expect("timed out waiting for build output")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = message {
            let text = text.to_string();
            let done = text == BUILD_SUCCEEDED_MESSAGE;
            lines.push(text);
            if done {
                break;
            }
        }
    }

    assert!(lines.contains(&"compiling".to_string()));
    assert!(lines.contains(&"ERROR: warning".to_string()));

    let _ = socket.close(None).await;
}

#[tokio::test]
async fn test_health_and_version() {
    let work = tempfile::tempdir().unwrap();
    let app = test_app(work.path(), "true");
    let addr = start(&app).await;
    let client = reqwest::Client::new();

    let health: serde_json::Value = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");

    let response = client
        .get(format!("http://{}/version", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
}
