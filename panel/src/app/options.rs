//! Application configuration options

use std::time::Duration;

use crate::deploy::executor::PipelineOptions;
use crate::storage::settings::{BuilderSettings, EngineSettings, Settings};

/// Main application options
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Pipeline execution options
    pub pipeline: PipelineOptions,

    /// Builder tool settings
    pub builder: BuilderSettings,

    /// Container engine settings
    pub engine: EngineSettings,

    /// Start the pipeline on submission instead of waiting for an observer
    pub auto_start_build: bool,
}

impl AppOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        let mut engine = settings.engine.clone();
        if engine.docker_host.is_none() {
            engine.docker_host = std::env::var("DOCKER_HOST").ok().filter(|h| !h.is_empty());
        }

        Self {
            lifecycle: LifecycleOptions::default(),
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            pipeline: PipelineOptions {
                work_root: settings.work_root.clone(),
                proxy_network: settings.engine.proxy_network.clone(),
                drain_timeout: Duration::from_secs(settings.drain_timeout_secs),
            },
            builder: settings.builder.clone(),
            engine,
            auto_start_build: settings.auto_start_build,
        }
    }

    /// Grace period for engine stop and restart
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.stop_timeout_secs)
    }
}

/// Lifecycle options for the panel
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
