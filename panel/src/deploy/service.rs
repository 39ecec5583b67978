//! Deployment operations exposed to the web layer

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::broadcast::BroadcastRegistry;
use crate::deploy::engine::ContainerEngine;
use crate::deploy::executor::PipelineExecutor;
use crate::deploy::fsm::{DeploymentEvent, DeploymentState};
use crate::deploy::record::{Deployment, DeploymentRecord, DeploymentRequest};
use crate::deploy::registry::DeploymentRegistry;
use crate::errors::DockyardError;

/// Submit, inspect and control deployments
pub struct DeploymentService {
    registry: Arc<DeploymentRegistry>,
    broadcaster: Arc<BroadcastRegistry>,
    executor: Arc<PipelineExecutor>,
    engine: Arc<dyn ContainerEngine>,
    stop_timeout: Duration,
    auto_start: bool,
}

impl DeploymentService {
    pub fn new(
        registry: Arc<DeploymentRegistry>,
        broadcaster: Arc<BroadcastRegistry>,
        executor: Arc<PipelineExecutor>,
        engine: Arc<dyn ContainerEngine>,
        stop_timeout: Duration,
        auto_start: bool,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            executor,
            engine,
            stop_timeout,
            auto_start,
        }
    }

    /// Store the deployment and, with auto start on, launch its pipeline.
    /// Never waits for the pipeline.
    pub fn submit(&self, request: DeploymentRequest) -> DeploymentRecord {
        let deployment = self.registry.create(request);
        info!(deployment_id = %deployment.id(), "Deployment accepted for {}", deployment.snapshot().domain);

        if self.auto_start {
            self.executor.spawn(deployment.id());
        }
        deployment.snapshot()
    }

    pub fn get(&self, id: &str) -> Result<DeploymentRecord, DockyardError> {
        Ok(self.lookup(id)?.snapshot())
    }

    pub fn list(&self) -> Vec<DeploymentRecord> {
        self.registry.list().iter().map(|d| d.snapshot()).collect()
    }

    pub async fn stop(&self, id: &str) -> Result<DeploymentRecord, DockyardError> {
        let deployment = self.lookup(id)?;
        let _guard = deployment.lock_control().await;

        let container_id = runtime_of(&deployment, &[DeploymentState::Running], "stop")?;
        self.engine.stop(&container_id, self.stop_timeout).await?;
        deployment.apply(DeploymentEvent::Stop)?;

        info!(deployment_id = %id, "Deployment stopped");
        Ok(deployment.snapshot())
    }

    pub async fn start(&self, id: &str) -> Result<DeploymentRecord, DockyardError> {
        let deployment = self.lookup(id)?;
        let _guard = deployment.lock_control().await;

        let container_id = runtime_of(&deployment, &[DeploymentState::Stopped], "start")?;
        self.engine.start(&container_id).await?;
        deployment.apply(DeploymentEvent::Start)?;

        info!(deployment_id = %id, "Deployment started");
        Ok(deployment.snapshot())
    }

    pub async fn restart(&self, id: &str) -> Result<DeploymentRecord, DockyardError> {
        let deployment = self.lookup(id)?;
        let _guard = deployment.lock_control().await;

        let container_id = runtime_of(
            &deployment,
            &[DeploymentState::Running, DeploymentState::Stopped],
            "restart",
        )?;
        self.engine.restart(&container_id, self.stop_timeout).await?;
        deployment.apply(DeploymentEvent::Restart)?;

        info!(deployment_id = %id, "Deployment restarted");
        Ok(deployment.snapshot())
    }

    /// Force-remove the container (if any) and forget the deployment.
    ///
    /// Allowed once the pipeline is over: RUNNING, STOPPED or FAILED.
    pub async fn remove(&self, id: &str) -> Result<(), DockyardError> {
        let deployment = self.lookup(id)?;
        let _guard = deployment.lock_control().await;

        let status = deployment.status();
        if !status.has_runtime() && status != DeploymentState::Failed {
            return Err(DockyardError::InvalidTransition(format!(
                "cannot remove {} while {}",
                id, status
            )));
        }

        if let Some(container_id) = deployment.container_id() {
            self.engine.remove(&container_id, true).await?;
        }

        self.registry.remove(id);
        self.broadcaster.close(id);
        info!(deployment_id = %id, "Deployment removed");
        Ok(())
    }

    fn lookup(&self, id: &str) -> Result<Arc<Deployment>, DockyardError> {
        self.registry
            .get(id)
            .ok_or_else(|| DockyardError::NotFound(id.to_string()))
    }
}

/// Engine id of `deployment` if its state is one of `allowed`
fn runtime_of(
    deployment: &Deployment,
    allowed: &[DeploymentState],
    action: &str,
) -> Result<String, DockyardError> {
    let status = deployment.status();
    if !allowed.contains(&status) {
        return Err(DockyardError::InvalidTransition(format!(
            "cannot {} {} while {}",
            action,
            deployment.id(),
            status
        )));
    }
    deployment.container_id().ok_or_else(|| {
        DockyardError::Internal(format!("{} has no container id", deployment.id()))
    })
}
