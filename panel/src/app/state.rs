//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::broadcast::BroadcastRegistry;
use crate::deploy::engine::{ContainerEngine, DockerCli};
use crate::deploy::executor::PipelineExecutor;
use crate::deploy::fsm::DeploymentState;
use crate::deploy::registry::DeploymentRegistry;
use crate::deploy::service::DeploymentService;
use crate::deploy::toolchain::{PackToolchain, Toolchain};
use crate::errors::DockyardError;
use crate::filesys::dir::Dir;
use crate::server::observer::ObserverSessions;
use crate::server::state::ServerState;

/// Main application state
pub struct AppState {
    pub registry: Arc<DeploymentRegistry>,
    pub broadcaster: Arc<BroadcastRegistry>,
    pub executor: Arc<PipelineExecutor>,
    pub service: Arc<DeploymentService>,
    pub observers: Arc<ObserverSessions>,
}

impl AppState {
    /// Initialize application state with the pack toolchain and docker CLI
    pub async fn init(options: &AppOptions) -> Result<Self, DockyardError> {
        info!("Initializing application state...");

        let toolchain: Arc<dyn Toolchain> = Arc::new(PackToolchain::new(options.builder.clone()));
        let engine: Arc<dyn ContainerEngine> = Arc::new(DockerCli::new(options.engine.clone()));

        Dir::new(&options.pipeline.work_root).create().await?;

        Ok(Self::new(options, toolchain, engine))
    }

    /// Wire the registries, executor and service around the given tools
    pub fn new(
        options: &AppOptions,
        toolchain: Arc<dyn Toolchain>,
        engine: Arc<dyn ContainerEngine>,
    ) -> Self {
        let registry = Arc::new(DeploymentRegistry::new());
        let broadcaster = Arc::new(BroadcastRegistry::new());

        let executor = Arc::new(PipelineExecutor::new(
            registry.clone(),
            broadcaster.clone(),
            toolchain,
            engine.clone(),
            options.pipeline.clone(),
        ));

        let service = Arc::new(DeploymentService::new(
            registry.clone(),
            broadcaster.clone(),
            executor.clone(),
            engine,
            options.stop_timeout(),
            options.auto_start_build,
        ));

        let observers = Arc::new(ObserverSessions::new(
            registry.clone(),
            broadcaster.clone(),
            executor.clone(),
        ));

        Self {
            registry,
            broadcaster,
            executor,
            service,
            observers,
        }
    }

    pub fn server_state(&self) -> ServerState {
        ServerState::new(self.service.clone(), self.observers.clone())
    }

    /// Shutdown application state. Builds in flight are not cancelled.
    pub async fn shutdown(&self) -> Result<(), DockyardError> {
        info!("Shutting down application state...");

        let building = self
            .registry
            .list()
            .iter()
            .filter(|d| matches!(d.status(), DeploymentState::Building | DeploymentState::BuildComplete))
            .count();
        if building > 0 {
            info!("{} deployment(s) still building at shutdown", building);
        }
        Ok(())
    }
}
