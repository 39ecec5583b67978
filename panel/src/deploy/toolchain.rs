//! External build tools: source checkout and the buildpack builder

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio::process::Command;
use tracing::{debug, info};

use crate::deploy::command::run_to_completion;
use crate::deploy::record::SourceSpec;
use crate::errors::DockyardError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::storage::settings::BuilderSettings;

/// The tools a pipeline run needs to turn a repository into an image
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Check out `source` into `dest`, which must not exist yet.
    ///
    /// Errors must not contain the source credential.
    async fn fetch_source(&self, source: &SourceSpec, dest: &Dir) -> Result<(), DockyardError>;

    /// Install the builder CLI beneath `tools` and return its executable
    async fn install_builder(&self, tools: &Dir) -> Result<File, DockyardError>;

    /// Command that builds `image` from `source`. The caller pipes its output.
    fn build_command(&self, builder: &File, source: &Dir, image: &str) -> Command;
}

/// git + Cloud Native Buildpacks `pack`
pub struct PackToolchain {
    settings: BuilderSettings,
    http: reqwest::Client,
}

impl PackToolchain {
    pub fn new(settings: BuilderSettings) -> Self {
        Self {
            settings,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Toolchain for PackToolchain {
    async fn fetch_source(&self, source: &SourceSpec, dest: &Dir) -> Result<(), DockyardError> {
        info!("Cloning {} into {}", source.redacted_url(), dest.path().display());

        let url = source.authenticated_url()?;
        let mut clone = Command::new(&self.settings.git_bin);
        clone
            .arg("clone")
            .arg(url.expose_secret())
            .arg(dest.path())
            .env("GIT_TERMINAL_PROMPT", "0");

        run_to_completion(clone, "git clone")
            .await
            .map_err(|e| redact_error(e, source))?;

        // the clone keeps its remote URL in .git/config; drop the credential from it
        let mut scrub = Command::new(&self.settings.git_bin);
        scrub
            .arg("-C")
            .arg(dest.path())
            .args(["remote", "set-url", "origin", source.redacted_url()]);
        run_to_completion(scrub, "git remote")
            .await
            .map_err(|e| redact_error(e, source))?;

        debug!("Cloned {}", source.redacted_url());
        Ok(())
    }

    async fn install_builder(&self, tools: &Dir) -> Result<File, DockyardError> {
        let url = self.settings.archive_url();
        info!("Downloading pack {} from {}", self.settings.pack_version, url);

        let bytes = async {
            self.http
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await
        }
        .await
        .map_err(|e| DockyardError::external_tool("pack download", e.to_string()))?;

        let archive = tools.file("pack.tgz");
        archive.write_bytes(&bytes).await?;

        let unpacked = tools.subdir("pack");
        unpacked.create().await?;

        let mut extract = Command::new(&self.settings.tar_bin);
        extract
            .arg("-xzf")
            .arg(archive.path())
            .arg("-C")
            .arg(unpacked.path());
        run_to_completion(extract, "tar").await?;

        let binary = unpacked.file("pack");
        if !binary.exists().await {
            return Err(DockyardError::external_tool(
                "pack install",
                format!("archive did not contain {}", binary.path().display()),
            ));
        }
        binary.set_executable().await?;

        debug!("Installed pack at {}", binary.path().display());
        Ok(binary)
    }

    fn build_command(&self, builder: &File, source: &Dir, image: &str) -> Command {
        let mut cmd = Command::new(builder.path());
        cmd.arg("build")
            .arg(image)
            .args(["--path", "."])
            .args(["--builder", &self.settings.builder_image]);
        for (key, value) in &self.settings.build_env {
            cmd.arg("--env").arg(format!("{}={}", key, value));
        }
        cmd.current_dir(source.path());
        cmd
    }
}

fn redact_error(err: DockyardError, source: &SourceSpec) -> DockyardError {
    match err {
        DockyardError::ExternalTool { tool, detail } => DockyardError::ExternalTool {
            tool,
            detail: source.redact(&detail),
        },
        other => DockyardError::Internal(source.redact(&other.to_string())),
    }
}
