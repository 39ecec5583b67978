//! Container engine client

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::deploy::command::run_to_completion;
use crate::deploy::record::DeploymentRecord;
use crate::errors::DockyardError;
use crate::storage::settings::EngineSettings;

/// Everything needed to create a routed runtime instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub network: String,
    pub exposed_port: u16,
    pub labels: BTreeMap<String, String>,
}

impl ContainerSpec {
    pub fn for_deployment(record: &DeploymentRecord, network: &str) -> Self {
        Self {
            image: record.image.clone(),
            name: record.name.clone(),
            network: network.to_string(),
            exposed_port: record.internal_port,
            labels: routing_labels(&record.name, &record.domain, record.internal_port),
        }
    }
}

/// Traefik labels routing `domain` over TLS to `port` of container `name`
pub fn routing_labels(name: &str, domain: &str, port: u16) -> BTreeMap<String, String> {
    let router = format!("traefik.http.routers.{}", name);
    BTreeMap::from([
        ("traefik.enable".to_string(), "true".to_string()),
        (format!("{}.rule", router), format!("Host(`{}`)", domain)),
        (format!("{}.entrypoints", router), "websecure".to_string()),
        (format!("{}.tls", router), "true".to_string()),
        (format!("{}.tls.certresolver", router), "myresolver".to_string()),
        (
            format!("traefik.http.services.{}.loadbalancer.server.port", name),
            port.to_string(),
        ),
    ])
}

/// Lifecycle operations on runtime instances, addressed by engine id
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Create an instance and return its engine id
    async fn create(&self, spec: &ContainerSpec) -> Result<String, DockyardError>;

    async fn start(&self, id: &str) -> Result<(), DockyardError>;

    /// Stop, allowing `timeout` for graceful termination
    async fn stop(&self, id: &str, timeout: Duration) -> Result<(), DockyardError>;

    async fn restart(&self, id: &str, timeout: Duration) -> Result<(), DockyardError>;

    async fn remove(&self, id: &str, force: bool) -> Result<(), DockyardError>;
}

/// Engine backed by the docker CLI
pub struct DockerCli {
    settings: EngineSettings,
}

impl DockerCli {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.settings.docker_bin);
        if let Some(host) = &self.settings.docker_host {
            cmd.env("DOCKER_HOST", host);
        }
        cmd
    }

    async fn run(&self, cmd: Command, action: &str) -> Result<String, DockyardError> {
        run_to_completion(cmd, action)
            .await
            .map_err(|e| DockyardError::EngineError(e.to_string()))
    }
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn create(&self, spec: &ContainerSpec) -> Result<String, DockyardError> {
        info!("Creating container {} from {}", spec.name, spec.image);

        let mut cmd = self.command();
        cmd.arg("create")
            .args(["--name", &spec.name])
            .args(["--network", &spec.network])
            .args(["--expose", &spec.exposed_port.to_string()]);
        for (key, value) in &spec.labels {
            cmd.arg("--label").arg(format!("{}={}", key, value));
        }
        cmd.arg(&spec.image);

        let stdout = self.run(cmd, "docker create").await?;
        let id = stdout.trim().to_string();
        if id.is_empty() {
            return Err(DockyardError::EngineError(
                "docker create returned no container id".to_string(),
            ));
        }
        debug!("Created container {} ({})", spec.name, id);
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<(), DockyardError> {
        let mut cmd = self.command();
        cmd.args(["start", id]);
        self.run(cmd, "docker start").await?;
        Ok(())
    }

    async fn stop(&self, id: &str, timeout: Duration) -> Result<(), DockyardError> {
        let mut cmd = self.command();
        cmd.args(["stop", "--time", &timeout.as_secs().to_string(), id]);
        self.run(cmd, "docker stop").await?;
        Ok(())
    }

    async fn restart(&self, id: &str, timeout: Duration) -> Result<(), DockyardError> {
        let mut cmd = self.command();
        cmd.args(["restart", "--time", &timeout.as_secs().to_string(), id]);
        self.run(cmd, "docker restart").await?;
        Ok(())
    }

    async fn remove(&self, id: &str, force: bool) -> Result<(), DockyardError> {
        let mut cmd = self.command();
        cmd.arg("rm");
        if force {
            cmd.arg("--force");
        }
        cmd.arg(id);
        self.run(cmd, "docker rm").await?;
        Ok(())
    }
}
