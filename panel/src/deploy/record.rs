//! Deployment records and the requests that create them

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use url::Url;

use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};
use crate::errors::DockyardError;

const REDACTED: &str = "***";

/// Where the source code comes from. The credential never leaves this type
/// except through [`SourceSpec::authenticated_url`].
#[derive(Debug, Clone)]
pub struct SourceSpec {
    repo_url: Url,
    credential: Option<SecretString>,
}

impl SourceSpec {
    pub fn new(repo_url: &str, credential: Option<String>) -> Result<Self, DockyardError> {
        let repo_url = Url::parse(repo_url.trim())
            .map_err(|e| DockyardError::ValidationError(format!("repo_url: {}", e)))?;

        if !matches!(repo_url.scheme(), "http" | "https") {
            return Err(DockyardError::ValidationError(
                "repo_url must use http or https".to_string(),
            ));
        }
        if !repo_url.username().is_empty() || repo_url.password().is_some() {
            return Err(DockyardError::ValidationError(
                "repo_url must not embed credentials, use the credential field".to_string(),
            ));
        }
        if repo_url.host_str().is_none() {
            return Err(DockyardError::ValidationError(
                "repo_url must include a host".to_string(),
            ));
        }

        let credential = credential
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .map(SecretString::from);

        Ok(Self {
            repo_url,
            credential,
        })
    }

    /// Repository URL safe to log: never carries the credential
    pub fn redacted_url(&self) -> &str {
        self.repo_url.as_str()
    }

    /// Repository URL with the credential as userinfo, for the clone command only
    pub fn authenticated_url(&self) -> Result<SecretString, DockyardError> {
        let Some(credential) = &self.credential else {
            return Ok(SecretString::from(self.repo_url.to_string()));
        };

        let mut url = self.repo_url.clone();
        url.set_username(credential.expose_secret())
            .map_err(|_| DockyardError::ValidationError("repo_url cannot carry a credential".to_string()))?;
        Ok(SecretString::from(url.to_string()))
    }

    /// Replace every form of the credential in `text` (raw and percent-encoded).
    pub fn redact(&self, text: &str) -> String {
        let Some(credential) = &self.credential else {
            return text.to_string();
        };

        let raw = credential.expose_secret();
        let mut redacted = text.replace(raw, REDACTED);

        let mut url = self.repo_url.clone();
        if url.set_username(raw).is_ok() && !url.username().is_empty() && url.username() != raw {
            redacted = redacted.replace(url.username(), REDACTED);
        }
        redacted
    }
}

/// A validated request to deploy a repository. Consumed once by the pipeline.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub source: SourceSpec,
    pub domain: String,
    pub internal_port: u16,
}

impl DeploymentRequest {
    pub fn new(
        repo_url: &str,
        credential: Option<String>,
        domain: &str,
        internal_port: u32,
    ) -> Result<Self, DockyardError> {
        let source = SourceSpec::new(repo_url, credential)?;
        let domain = validate_domain(domain)?;

        let internal_port = u16::try_from(internal_port)
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| {
                DockyardError::ValidationError(format!(
                    "internal_port must be between 1 and 65535, got {}",
                    internal_port
                ))
            })?;

        Ok(Self {
            source,
            domain,
            internal_port,
        })
    }
}

fn validate_domain(domain: &str) -> Result<String, DockyardError> {
    let domain = domain.trim().to_ascii_lowercase();
    let valid = !domain.is_empty()
        && domain.len() <= 253
        && !domain.starts_with(['.', '-'])
        && !domain.ends_with(['.', '-'])
        && !domain.contains("..")
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');

    if valid {
        Ok(domain)
    } else {
        Err(DockyardError::ValidationError(format!(
            "domain '{}' is not a valid hostname",
            domain
        )))
    }
}

/// Identity fixed when a deployment is accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentIdentity {
    pub id: String,
    pub name: String,
    pub image: String,
}

/// Generates unique deployment identities from the clock plus a sequence
/// number, so two requests in the same millisecond never collide.
#[derive(Debug, Default)]
pub struct NameGenerator {
    seq: AtomicU64,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> DeploymentIdentity {
        let millis = Utc::now().timestamp_millis();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let stamp = format!("{}-{}", millis, seq);

        let image = format!("app-{}:latest", stamp);
        DeploymentIdentity {
            id: image.replace(':', "-"),
            name: format!("github-{}", stamp),
            image,
        }
    }
}

/// Public state of one deployment
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentRecord {
    pub id: String,
    pub name: String,
    pub image: String,
    pub domain: String,
    pub internal_port: u16,
    #[serde(flatten)]
    fsm: DeploymentFsm,
    /// Identity assigned by the container engine once provisioned
    pub container_id: Option<String>,
    pub logs: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentRecord {
    fn new(identity: DeploymentIdentity, domain: String, internal_port: u16) -> Self {
        let now = Utc::now();
        Self {
            id: identity.id,
            name: identity.name,
            image: identity.image,
            domain,
            internal_port,
            fsm: DeploymentFsm::new(),
            container_id: None,
            logs: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> DeploymentState {
        self.fsm.state()
    }

    /// Last failure detail, if the pipeline failed
    pub fn error(&self) -> Option<&str> {
        self.fsm.error()
    }
}

/// The single authoritative, shared instance of a deployment.
///
/// Holds the record behind a lock, the not-yet-consumed request, and a
/// per-deployment lock that serializes control operations.
#[derive(Debug)]
pub struct Deployment {
    id: String,
    record: RwLock<DeploymentRecord>,
    request: Mutex<Option<DeploymentRequest>>,
    control: tokio::sync::Mutex<()>,
}

impl Deployment {
    pub fn new(identity: DeploymentIdentity, request: DeploymentRequest) -> Self {
        let record = DeploymentRecord::new(identity, request.domain.clone(), request.internal_port);
        Self {
            id: record.id.clone(),
            record: RwLock::new(record),
            request: Mutex::new(Some(request)),
            control: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Copy of the current record
    pub fn snapshot(&self) -> DeploymentRecord {
        self.record.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn status(&self) -> DeploymentState {
        self.record.read().unwrap_or_else(|e| e.into_inner()).status()
    }

    pub fn container_id(&self) -> Option<String> {
        self.record
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .container_id
            .clone()
    }

    pub fn append_log(&self, line: impl Into<String>) {
        let mut record = self.record.write().unwrap_or_else(|e| e.into_inner());
        record.logs.push(line.into());
        record.updated_at = Utc::now();
    }

    pub fn set_container_id(&self, container_id: String) {
        let mut record = self.record.write().unwrap_or_else(|e| e.into_inner());
        record.container_id = Some(container_id);
        record.updated_at = Utc::now();
    }

    /// Apply a lifecycle event, returning the new state
    pub fn apply(&self, event: DeploymentEvent) -> Result<DeploymentState, DockyardError> {
        let mut record = self.record.write().unwrap_or_else(|e| e.into_inner());
        record
            .fsm
            .process(event)
            .map_err(|e| DockyardError::InvalidTransition(format!("{}: {}", self.id, e)))?;
        record.updated_at = Utc::now();
        Ok(record.status())
    }

    /// One-shot start: moves CREATING to BUILDING and hands out the request.
    ///
    /// Returns `None` if the pipeline was already started, so a second
    /// trigger can never run the build twice.
    pub fn begin(&self) -> Option<DeploymentRequest> {
        let mut record = self.record.write().unwrap_or_else(|e| e.into_inner());
        if record.status() != DeploymentState::Creating {
            return None;
        }

        let request = self
            .request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()?;

        record.fsm.process(DeploymentEvent::BuildStarted).ok()?;
        record.updated_at = Utc::now();
        Some(request)
    }

    /// Serializes stop/start/restart/remove on this deployment
    pub async fn lock_control(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.control.lock().await
    }
}
