//! Live build output fan-out: at most one observer per deployment id

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Sending half of a live observer connection
#[derive(Debug, Clone)]
pub struct Observer {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

impl Observer {
    /// Create an observer and the receiver its connection drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn send(&self, line: &str) -> bool {
        self.tx.send(line.to_string()).is_ok()
    }
}

/// Maps deployment ids to their live observer.
///
/// Publishing never blocks and never fails: lines for an id with no
/// observer are dropped here (they are still kept in the deployment log).
#[derive(Debug, Default)]
pub struct BroadcastRegistry {
    observers: RwLock<HashMap<String, Observer>>,
}

impl BroadcastRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer` for `id`, replacing any previous one.
    ///
    /// The replaced observer's sender is dropped, which ends its stream.
    pub fn attach(&self, id: &str, observer: Observer) -> Option<Observer> {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        debug!(deployment_id = %id, observer_id = %observer.id, "Observer attached");
        observers.insert(id.to_string(), observer)
    }

    /// Remove the observer for `id` only if it is still `observer_id`.
    pub fn detach(&self, id: &str, observer_id: Uuid) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        match observers.get(id) {
            Some(current) if current.id == observer_id => {
                observers.remove(id);
                debug!(deployment_id = %id, observer_id = %observer_id, "Observer detached");
                true
            }
            _ => false,
        }
    }

    /// Drop whatever observer is attached for `id`
    pub fn close(&self, id: &str) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        observers.remove(id).is_some()
    }

    /// Deliver `line` to the observer for `id`, if any.
    ///
    /// A closed observer is deregistered and not retried.
    pub fn publish(&self, id: &str, line: &str) -> bool {
        let failed = {
            let observers = self.observers.read().unwrap_or_else(|e| e.into_inner());
            match observers.get(id) {
                None => return false,
                Some(observer) if observer.send(line) => return true,
                Some(observer) => observer.id,
            }
        };

        debug!(deployment_id = %id, observer_id = %failed, "Observer closed, deregistering");
        self.detach(id, failed);
        false
    }

    pub fn is_attached(&self, id: &str) -> bool {
        let observers = self.observers.read().unwrap_or_else(|e| e.into_inner());
        observers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        let observers = self.observers.read().unwrap_or_else(|e| e.into_inner());
        observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
