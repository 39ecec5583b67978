//! Panel API models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Deployment submission
#[derive(Clone, Serialize, Deserialize)]
pub struct SubmitDeploymentRequest {
    pub repo_url: String,
    /// Access token for private repositories
    #[serde(default)]
    pub credential: Option<String>,
    pub domain: String,
    pub internal_port: u32,
}

impl std::fmt::Debug for SubmitDeploymentRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmitDeploymentRequest")
            .field("repo_url", &self.repo_url)
            .field("credential", &self.credential.as_ref().map(|_| "***"))
            .field("domain", &self.domain)
            .field("internal_port", &self.internal_port)
            .finish()
    }
}

/// Deployment submission acknowledgment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitDeploymentResponse {
    pub deployment_id: String,
    pub message: String,
}

/// Deployment detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResponse {
    pub id: String,
    pub name: String,
    pub image: String,
    pub domain: String,
    pub internal_port: u16,
    pub status: String,
    pub error: Option<String>,
    pub container_id: Option<String>,
    pub logs: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
