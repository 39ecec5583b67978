//! Broadcast registry tests

use std::sync::Arc;

use dockyard::broadcast::{BroadcastRegistry, Observer};

#[test]
fn test_lines_before_attach_are_not_delivered() {
    let registry = BroadcastRegistry::new();
    let (observer, mut rx) = Observer::channel();

    assert!(!registry.publish("app-1", "early"));
    registry.attach("app-1", observer);
    assert!(registry.publish("app-1", "late"));

    assert_eq!(rx.try_recv().unwrap(), "late");
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_lines_after_detach_are_not_delivered() {
    let registry = BroadcastRegistry::new();
    let (observer, mut rx) = Observer::channel();
    let observer_id = observer.id();

    registry.attach("app-1", observer);
    registry.publish("app-1", "one");
    assert!(registry.detach("app-1", observer_id));
    assert!(!registry.publish("app-1", "two"));

    assert_eq!(rx.try_recv().unwrap(), "one");
    assert!(rx.try_recv().is_err());
    assert!(registry.is_empty());
}

#[test]
fn test_attach_replaces_previous_observer() {
    let registry = BroadcastRegistry::new();
    let (first, mut rx1) = Observer::channel();
    let (second, mut rx2) = Observer::channel();

    registry.attach("app-1", first);
    registry.publish("app-1", "to first");
    drop(registry.attach("app-1", second));
    registry.publish("app-1", "to second");

    assert_eq!(rx1.try_recv().unwrap(), "to first");
    // the replaced observer's stream has ended
    assert!(matches!(
        rx1.try_recv(),
        Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
    ));
    assert_eq!(rx2.try_recv().unwrap(), "to second");
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_ids_do_not_cross_talk() {
    let registry = BroadcastRegistry::new();
    let (a, mut rx_a) = Observer::channel();
    let (b, mut rx_b) = Observer::channel();
    registry.attach("app-a", a);
    registry.attach("app-b", b);

    registry.publish("app-a", "for a");
    registry.publish("app-b", "for b");

    assert_eq!(rx_a.try_recv().unwrap(), "for a");
    assert!(rx_a.try_recv().is_err());
    assert_eq!(rx_b.try_recv().unwrap(), "for b");
    assert!(rx_b.try_recv().is_err());
}

#[test]
fn test_close_ends_observer_stream() {
    let registry = BroadcastRegistry::new();
    let (observer, mut rx) = Observer::channel();
    registry.attach("app-1", observer);

    assert!(registry.close("app-1"));
    assert!(!registry.is_attached("app-1"));
    assert!(matches!(
        rx.try_recv(),
        Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
    ));
}

#[tokio::test]
async fn test_concurrent_publishers_each_deliver_exactly_once() {
    let registry = Arc::new(BroadcastRegistry::new());
    let (observer, mut rx) = Observer::channel();
    registry.attach("app-1", observer);

    let mut handles = Vec::new();
    for worker in 0..4 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..250 {
                registry.publish("app-1", &format!("{}-{}", worker, i));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut received = Vec::new();
    while let Ok(line) = rx.try_recv() {
        received.push(line);
    }
    assert_eq!(received.len(), 1000);
    received.sort();
    received.dedup();
    assert_eq!(received.len(), 1000);
}
