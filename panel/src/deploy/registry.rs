//! In-memory deployment registry

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::deploy::record::{Deployment, DeploymentRequest, NameGenerator};

/// The authoritative table of deployments. Every code path resolves a
/// deployment through here, so there is exactly one instance per id.
///
/// The map lock is held only for lookups and insertions; per-deployment
/// state lives behind each [`Deployment`]'s own locks.
#[derive(Debug, Default)]
pub struct DeploymentRegistry {
    entries: RwLock<HashMap<String, Arc<Deployment>>>,
    names: NameGenerator,
}

impl DeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new deployment in CREATING state
    pub fn create(&self, request: DeploymentRequest) -> Arc<Deployment> {
        let deployment = Arc::new(Deployment::new(self.names.next(), request));
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(deployment.id().to_string(), deployment.clone());
        deployment
    }

    pub fn get(&self, id: &str) -> Option<Arc<Deployment>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(id).cloned()
    }

    /// All deployments, oldest first
    pub fn list(&self) -> Vec<Arc<Deployment>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut deployments: Vec<_> = entries.values().cloned().collect();
        drop(entries);
        deployments.sort_by_key(|d| d.snapshot().created_at);
        deployments
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Deployment>> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
