//! Server state

use std::sync::Arc;

use crate::deploy::service::DeploymentService;
use crate::server::observer::ObserverSessions;

/// Server state shared across handlers
pub struct ServerState {
    pub service: Arc<DeploymentService>,
    pub observers: Arc<ObserverSessions>,
}

impl ServerState {
    pub fn new(service: Arc<DeploymentService>, observers: Arc<ObserverSessions>) -> Self {
        Self { service, observers }
    }
}
