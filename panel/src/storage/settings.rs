//! Settings file management

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::DockyardError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Panel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON logs on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Directory for daily-rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Container engine configuration
    #[serde(default)]
    pub engine: EngineSettings,

    /// Buildpack builder configuration
    #[serde(default)]
    pub builder: BuilderSettings,

    /// Root under which each run gets its own working directory
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,

    /// Start the pipeline as soon as a deployment is submitted. When off,
    /// the pipeline waits for an observer's start-build message.
    #[serde(default = "default_true")]
    pub auto_start_build: bool,

    /// How long to wait for build output to drain after the build exits
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_work_root() -> PathBuf {
    std::env::temp_dir().join("dockyard")
}

fn default_drain_timeout() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            server: ServerSettings::default(),
            engine: EngineSettings::default(),
            builder: BuilderSettings::default(),
            work_root: default_work_root(),
            auto_start_build: true,
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

impl Settings {
    /// Load settings from `file`. A missing file yields the defaults.
    pub async fn load(file: &File) -> Result<Self, DockyardError> {
        if !file.exists().await {
            return Ok(Self::default());
        }
        file.read_json().await.map_err(|e| {
            DockyardError::ConfigError(format!(
                "failed to read settings from {}: {}",
                file.path().display(),
                e
            ))
        })
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Container engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Docker CLI binary
    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,

    /// Engine endpoint; falls back to the DOCKER_HOST environment variable
    #[serde(default)]
    pub docker_host: Option<String>,

    /// Network shared with the reverse proxy
    #[serde(default = "default_proxy_network")]
    pub proxy_network: String,

    /// Grace period for stop and restart
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
}

fn default_docker_bin() -> String {
    "docker".to_string()
}

fn default_proxy_network() -> String {
    "traefik-net".to_string()
}

fn default_stop_timeout() -> u64 {
    10
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            docker_bin: default_docker_bin(),
            docker_host: None,
            proxy_network: default_proxy_network(),
            stop_timeout_secs: default_stop_timeout(),
        }
    }
}

/// Buildpack builder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderSettings {
    /// Pinned pack CLI version
    #[serde(default = "default_pack_version")]
    pub pack_version: String,

    /// Archive URL; `{version}` is replaced with `pack_version`
    #[serde(default = "default_download_url")]
    pub download_url: String,

    #[serde(default = "default_builder_image")]
    pub builder_image: String,

    #[serde(default = "default_git_bin")]
    pub git_bin: String,

    #[serde(default = "default_tar_bin")]
    pub tar_bin: String,

    /// Build-time environment passed to the builder as `--env KEY=VALUE`
    #[serde(default)]
    pub build_env: BTreeMap<String, String>,
}

fn default_pack_version() -> String {
    "0.32.0".to_string()
}

fn default_download_url() -> String {
    "https://github.com/buildpacks/pack/releases/download/v{version}/pack-v{version}-linux.tgz"
        .to_string()
}

fn default_builder_image() -> String {
    "paketobuildpacks/builder-jammy-base".to_string()
}

fn default_git_bin() -> String {
    "git".to_string()
}

fn default_tar_bin() -> String {
    "tar".to_string()
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            pack_version: default_pack_version(),
            download_url: default_download_url(),
            builder_image: default_builder_image(),
            git_bin: default_git_bin(),
            tar_bin: default_tar_bin(),
            build_env: BTreeMap::new(),
        }
    }
}

impl BuilderSettings {
    /// Download URL with the version filled in
    pub fn archive_url(&self) -> String {
        self.download_url.replace("{version}", &self.pack_version)
    }
}
