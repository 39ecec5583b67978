//! Pipeline executor
//!
//! Runs one deployment end to end: fetch source, install the builder,
//! build the image under a stream relay, then provision the container.
//! Failures are recorded on the deployment and never escape the run.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broadcast::BroadcastRegistry;
use crate::deploy::engine::{ContainerEngine, ContainerSpec};
use crate::deploy::fsm::{DeploymentEvent, DeploymentState};
use crate::deploy::record::{Deployment, DeploymentRequest};
use crate::deploy::registry::DeploymentRegistry;
use crate::deploy::relay::StreamRelay;
use crate::deploy::toolchain::Toolchain;
use crate::errors::DockyardError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

pub const BUILD_SUCCEEDED_MESSAGE: &str = "Build completed successfully!";
pub const BUILD_FAILED_PREFIX: &str = "Build failed: ";

/// Pipeline options
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Each run works in `<work_root>/<deployment id>`
    pub work_root: PathBuf,

    /// Network shared with the reverse proxy
    pub proxy_network: String,

    /// Bounded wait for build output after the build exits
    pub drain_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir().join("dockyard"),
            proxy_network: "traefik-net".to_string(),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// Runs deployment pipelines
pub struct PipelineExecutor {
    registry: Arc<DeploymentRegistry>,
    broadcaster: Arc<BroadcastRegistry>,
    toolchain: Arc<dyn Toolchain>,
    engine: Arc<dyn ContainerEngine>,
    options: PipelineOptions,
}

impl PipelineExecutor {
    pub fn new(
        registry: Arc<DeploymentRegistry>,
        broadcaster: Arc<BroadcastRegistry>,
        toolchain: Arc<dyn Toolchain>,
        engine: Arc<dyn ContainerEngine>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            toolchain,
            engine,
            options,
        }
    }

    /// Working directory for deployment `id`
    pub fn workspace(&self, id: &str) -> Dir {
        Dir::new(self.options.work_root.join(id))
    }

    /// Run the pipeline for `id` as its own task
    pub fn spawn(self: &Arc<Self>, id: &str) -> JoinHandle<()> {
        let executor = self.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            match executor.run_pipeline(&id).await {
                Ok(state) => debug!(deployment_id = %id, "Pipeline finished in {}", state),
                Err(DockyardError::InvalidTransition(_)) => {
                    debug!(deployment_id = %id, "Pipeline already started, ignoring trigger")
                }
                Err(e) => warn!(deployment_id = %id, "Pipeline not run: {}", e),
            }
        })
    }

    /// Run the pipeline for `id` to completion.
    ///
    /// Returns `NotFound` for an unknown id and `InvalidTransition` if the
    /// pipeline was already started. Step failures are recorded on the
    /// deployment and reported through the returned final state.
    pub async fn run_pipeline(&self, id: &str) -> Result<DeploymentState, DockyardError> {
        let deployment = self
            .registry
            .get(id)
            .ok_or_else(|| DockyardError::NotFound(id.to_string()))?;

        let request = deployment.begin().ok_or_else(|| {
            DockyardError::InvalidTransition(format!("pipeline for {} already started", id))
        })?;

        info!(deployment_id = %id, "Starting pipeline for {}", request.source.redacted_url());

        let workspace = self.workspace(id);
        let outcome = AssertUnwindSafe(self.execute(&deployment, request, &workspace))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(DockyardError::Internal("pipeline panicked".to_string())));

        if let Err(e) = workspace.delete().await {
            warn!(deployment_id = %id, "Failed to clean up {}: {}", workspace.path().display(), e);
        }

        if let Err(e) = outcome {
            self.fail(&deployment, e);
        }

        Ok(deployment.status())
    }

    async fn execute(
        &self,
        deployment: &Arc<Deployment>,
        request: DeploymentRequest,
        workspace: &Dir,
    ) -> Result<(), DockyardError> {
        workspace.recreate().await?;
        let source_dir = workspace.subdir("source");
        let tools_dir = workspace.subdir("tools");

        self.announce(
            deployment,
            format!("Cloning {}", request.source.redacted_url()),
        );
        self.toolchain
            .fetch_source(&request.source, &source_dir)
            .await?;
        // credential is not needed past the clone
        drop(request);

        self.announce(deployment, "Installing builder".to_string());
        tools_dir.create().await?;
        let builder = self.toolchain.install_builder(&tools_dir).await?;

        let record = deployment.snapshot();
        self.announce(deployment, format!("Building image {}", record.image));
        self.build(deployment, &builder, &source_dir, &record.image)
            .await?;

        deployment.apply(DeploymentEvent::BuildSucceeded)?;
        self.announce(deployment, BUILD_SUCCEEDED_MESSAGE.to_string());

        self.provision(deployment).await?;
        self.announce(
            deployment,
            format!("Deployment running at https://{}", record.domain),
        );
        Ok(())
    }

    async fn build(
        &self,
        deployment: &Arc<Deployment>,
        builder: &File,
        source_dir: &Dir,
        image: &str,
    ) -> Result<(), DockyardError> {
        let mut cmd = self.toolchain.build_command(builder, source_dir, image);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| DockyardError::external_tool("pack build", format!("failed to spawn: {}", e)))?;

        let relay = StreamRelay::new(
            deployment.clone(),
            self.broadcaster.clone(),
            self.options.drain_timeout,
        );
        let output = relay.run(child).await?;

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(DockyardError::external_tool(
                "pack build",
                format!("exit code {}: {}", code, output.stderr.trim_end()),
            ));
        }
        Ok(())
    }

    async fn provision(&self, deployment: &Arc<Deployment>) -> Result<(), DockyardError> {
        let record = deployment.snapshot();
        let spec = ContainerSpec::for_deployment(&record, &self.options.proxy_network);

        let container_id = self.engine.create(&spec).await?;

        if let Err(e) = self.engine.start(&container_id).await {
            if let Err(cleanup) = self.engine.remove(&container_id, true).await {
                warn!(deployment_id = %record.id, "Failed to remove unstarted container {}: {}", container_id, cleanup);
            }
            return Err(e);
        }

        deployment.set_container_id(container_id.clone());

        deployment.apply(DeploymentEvent::Provisioned)?;
        info!(deployment_id = %record.id, "Container {} running for {}", container_id, record.domain);
        Ok(())
    }

    fn fail(&self, deployment: &Deployment, err: DockyardError) {
        let detail = err.to_string();
        error!(deployment_id = %deployment.id(), "Pipeline failed: {}", detail);

        if let Err(e) = deployment.apply(DeploymentEvent::Failed(detail.clone())) {
            error!(deployment_id = %deployment.id(), "Could not record failure: {}", e);
        }
        self.announce(deployment, format!("{}{}", BUILD_FAILED_PREFIX, detail));
    }

    /// Append `message` to the deployment log and send it to the observer
    fn announce(&self, deployment: &Deployment, message: String) {
        deployment.append_log(message.clone());
        self.broadcaster.publish(deployment.id(), &message);
    }
}
