//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dockyard_api::models::{
    DeploymentResponse, ErrorResponse, HealthResponse, SubmitDeploymentRequest,
    SubmitDeploymentResponse, VersionResponse,
};
use tracing::error;

use crate::deploy::record::{DeploymentRecord, DeploymentRequest};
use crate::errors::DockyardError;
use crate::server::state::ServerState;
use crate::utils::version_info;

pub const SUBMITTED_MESSAGE: &str = "Deployment initiated. Streaming logs via WebSocket.";

impl IntoResponse for DockyardError {
    fn into_response(self) -> Response {
        let status = match &self {
            DockyardError::NotFound(_) => StatusCode::NOT_FOUND,
            DockyardError::InvalidTransition(_) => StatusCode::CONFLICT,
            DockyardError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DockyardError::EngineError(_) | DockyardError::ExternalTool { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

fn to_response(record: DeploymentRecord) -> DeploymentResponse {
    DeploymentResponse {
        status: record.status().to_string(),
        error: record.error().map(str::to_string),
        id: record.id,
        name: record.name,
        image: record.image,
        domain: record.domain,
        internal_port: record.internal_port,
        container_id: record.container_id,
        logs: record.logs,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "dockyard".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// `POST /deployments`
pub async fn submit_handler(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<SubmitDeploymentRequest>,
) -> Result<impl IntoResponse, DockyardError> {
    let request = DeploymentRequest::new(
        &body.repo_url,
        body.credential,
        &body.domain,
        body.internal_port,
    )?;
    let record = state.service.submit(request);

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitDeploymentResponse {
            deployment_id: record.id,
            message: SUBMITTED_MESSAGE.to_string(),
        }),
    ))
}

/// `GET /deployments`
pub async fn list_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let records: Vec<_> = state.service.list().into_iter().map(to_response).collect();
    Json(records)
}

/// `GET /deployments/{id}`
pub async fn get_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<DeploymentResponse>, DockyardError> {
    Ok(Json(to_response(state.service.get(&id)?)))
}

/// `POST /deployments/{id}/stop`
pub async fn stop_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<DeploymentResponse>, DockyardError> {
    Ok(Json(to_response(state.service.stop(&id).await?)))
}

/// `POST /deployments/{id}/start`
pub async fn start_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<DeploymentResponse>, DockyardError> {
    Ok(Json(to_response(state.service.start(&id).await?)))
}

/// `POST /deployments/{id}/restart`
pub async fn restart_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<DeploymentResponse>, DockyardError> {
    Ok(Json(to_response(state.service.restart(&id).await?)))
}

/// `DELETE /deployments/{id}`
pub async fn remove_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, DockyardError> {
    state.service.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
