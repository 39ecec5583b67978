//! Observer sessions: live build output over WebSocket

use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broadcast::{BroadcastRegistry, Observer};
use crate::deploy::executor::PipelineExecutor;
use crate::deploy::fsm::DeploymentState;
use crate::deploy::registry::DeploymentRegistry;
use crate::errors::DockyardError;
use crate::server::state::ServerState;

/// Close code sent when the deployment id is unknown
pub const NOT_FOUND_CLOSE_CODE: u16 = 4404;

pub const START_BUILD: &str = "startBuild";
pub const DEPLOYMENT_NOT_FOUND_REPLY: &str = "Error: Deployment not found";

/// Binds observer connections to deployments
pub struct ObserverSessions {
    registry: Arc<DeploymentRegistry>,
    broadcaster: Arc<BroadcastRegistry>,
    executor: Arc<PipelineExecutor>,
}

impl ObserverSessions {
    pub fn new(
        registry: Arc<DeploymentRegistry>,
        broadcaster: Arc<BroadcastRegistry>,
        executor: Arc<PipelineExecutor>,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            executor,
        }
    }

    /// Attach `observer` to deployment `id`. Unknown ids are rejected
    /// without touching the broadcast registry.
    pub fn on_connect(&self, id: &str, observer: Observer) -> Result<(), DockyardError> {
        if !self.registry.contains(id) {
            return Err(DockyardError::NotFound(id.to_string()));
        }
        info!(deployment_id = %id, observer_id = %observer.id(), "Observer connected");
        self.broadcaster.attach(id, observer);
        Ok(())
    }

    pub fn on_disconnect(&self, id: &str, observer_id: Uuid) -> bool {
        info!(deployment_id = %id, observer_id = %observer_id, "Observer disconnected");
        self.broadcaster.detach(id, observer_id)
    }

    /// Handle a text message from the observer of `id`, returning a reply
    /// for that observer if there is one.
    ///
    /// `startBuild` starts the session's deployment, `startBuild:<id>` a
    /// named one. A deployment already past CREATING is left alone.
    pub fn on_message(&self, id: &str, text: &str) -> Option<String> {
        let text = text.trim();
        let target = match text.split_once(':') {
            Some((START_BUILD, target)) if !target.trim().is_empty() => target.trim(),
            None if text == START_BUILD => id,
            _ => {
                warn!(deployment_id = %id, "Unknown observer message: {}", text);
                return Some(format!("Error: Unknown message '{}'", text));
            }
        };

        let Some(deployment) = self.registry.get(target) else {
            return Some(DEPLOYMENT_NOT_FOUND_REPLY.to_string());
        };

        if deployment.status() == DeploymentState::Creating {
            debug!(deployment_id = %target, "Start-build requested by observer");
            self.executor.spawn(target);
        } else {
            debug!(deployment_id = %target, "Start-build ignored, pipeline already started");
        }
        None
    }
}

/// `GET /deployments/{id}/logs/ws`
pub async fn observer_ws_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    let sessions = state.observers.clone();
    ws.on_upgrade(move |socket| handle_observer(socket, id, sessions))
}

async fn handle_observer(socket: WebSocket, id: String, sessions: Arc<ObserverSessions>) {
    let (mut sender, mut receiver) = socket.split();

    let (observer, mut lines) = Observer::channel();
    let observer_id = observer.id();

    if sessions.on_connect(&id, observer).is_err() {
        debug!(deployment_id = %id, "Rejecting observer for unknown deployment");
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: NOT_FOUND_CLOSE_CODE,
                reason: Utf8Bytes::from_static("not found"),
            })))
            .await;
        return;
    }

    let (reply_tx, mut replies) = mpsc::unbounded_channel::<String>();

    // Broadcast lines and replies -> WebSocket
    let mut send_task = tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                line = lines.recv() => match line {
                    Some(line) => line,
                    // replaced by a newer observer or the deployment was removed
                    None => break,
                },
                reply = replies.recv() => match reply {
                    Some(reply) => reply,
                    None => break,
                },
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    // WebSocket -> session
    let recv_sessions = sessions.clone();
    let recv_id = id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Some(reply) = recv_sessions.on_message(&recv_id, text.as_str()) {
                        if reply_tx.send(reply).is_err() {
                            break;
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    sessions.on_disconnect(&id, observer_id);
}
