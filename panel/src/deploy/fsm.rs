//! Finite State Machine for a deployment's lifecycle

use serde::{Deserialize, Serialize};

/// Deployment state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    /// Record stored, pipeline not yet started
    Creating,

    /// Pipeline running (clone, builder install, build)
    Building,

    /// Image built, runtime not yet provisioned
    BuildComplete,

    /// Container started behind the proxy
    Running,

    /// Container stopped by an operator
    Stopped,

    /// Pipeline failed. Terminal for this deployment id
    Failed,
}

impl DeploymentState {
    /// Whether the deployment owns a container the engine knows about
    pub fn has_runtime(&self) -> bool {
        matches!(self, DeploymentState::Running | DeploymentState::Stopped)
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeploymentState::Creating => "CREATING",
            DeploymentState::Building => "BUILDING",
            DeploymentState::BuildComplete => "BUILD_COMPLETE",
            DeploymentState::Running => "RUNNING",
            DeploymentState::Stopped => "STOPPED",
            DeploymentState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// Pipeline picked up the record
    BuildStarted,

    /// Build step exited successfully
    BuildSucceeded,

    /// Runtime instance created and started
    Provisioned,

    /// A pipeline step failed
    Failed(String),

    /// Stop the container
    Stop,

    /// Start a stopped container
    Start,

    /// Restart the container
    Restart,
}

/// Deployment FSM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentFsm {
    #[serde(rename = "status")]
    state: DeploymentState,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create a new FSM in creating state
    pub fn new() -> Self {
        Self {
            state: DeploymentState::Creating,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> DeploymentState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state.
    ///
    /// Invalid transitions leave the state untouched.
    pub fn process(&mut self, event: DeploymentEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (DeploymentState::Creating, DeploymentEvent::BuildStarted) => DeploymentState::Building,

            (DeploymentState::Building, DeploymentEvent::BuildSucceeded) => {
                DeploymentState::BuildComplete
            }
            (DeploymentState::Building, DeploymentEvent::Failed(err)) => {
                self.error = Some(err.clone());
                DeploymentState::Failed
            }

            (DeploymentState::BuildComplete, DeploymentEvent::Provisioned) => {
                DeploymentState::Running
            }
            // Provisioning is the last pipeline step and fails like the others
            (DeploymentState::BuildComplete, DeploymentEvent::Failed(err)) => {
                self.error = Some(err.clone());
                DeploymentState::Failed
            }

            (DeploymentState::Running, DeploymentEvent::Stop) => DeploymentState::Stopped,
            (DeploymentState::Running, DeploymentEvent::Restart) => DeploymentState::Running,

            (DeploymentState::Stopped, DeploymentEvent::Start) => DeploymentState::Running,
            (DeploymentState::Stopped, DeploymentEvent::Restart) => DeploymentState::Running,

            (state, event) => {
                return Err(format!("{} cannot handle {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
