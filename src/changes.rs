//! Schema change notifications
//!
//! The component that owns schema definitions publishes a `SchemaChange`
//! whenever a definition is updated or deleted. Listeners (the processor
//! registry) subscribe through a `SchemaChangeBus`; the bus holds them weakly
//! so a dropped registry simply stops receiving notifications.

use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::schema::SchemaKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaChange {
    pub key: SchemaKey,
    pub kind: ChangeKind,
}

/// Receiver of schema change notifications
pub trait SchemaChangeListener: Send + Sync {
    /// Must return promptly; called on the publisher's thread
    fn schema_changed(&self, change: &SchemaChange);
}

/// Fan-out of schema changes to subscribed listeners
#[derive(Default)]
pub struct SchemaChangeBus {
    listeners: RwLock<Vec<Weak<dyn SchemaChangeListener>>>,
}

impl SchemaChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<L: SchemaChangeListener + 'static>(&self, listener: &Arc<L>) {
        let listener: Arc<dyn SchemaChangeListener> = listener.clone();
        self.listeners.write().push(Arc::downgrade(&listener));
    }

    /// Deliver a change to every live listener; returns how many received it
    pub fn publish(&self, change: &SchemaChange) -> usize {
        let live: Vec<Arc<dyn SchemaChangeListener>> = {
            let mut listeners = self.listeners.write();
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };

        debug!(schema = %change.key, kind = ?change.kind, listeners = live.len(), "Publishing schema change");
        for listener in &live {
            listener.schema_changed(change);
        }
        live.len()
    }

    pub fn updated(&self, key: SchemaKey) -> usize {
        self.publish(&SchemaChange {
            key,
            kind: ChangeKind::Updated,
        })
    }

    pub fn deleted(&self, key: SchemaKey) -> usize {
        self.publish(&SchemaChange {
            key,
            kind: ChangeKind::Deleted,
        })
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .iter()
            .filter(|l| l.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::TypeVersion;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<SchemaChange>>,
    }

    impl SchemaChangeListener for Recorder {
        fn schema_changed(&self, change: &SchemaChange) {
            self.seen.lock().push(change.clone());
        }
    }

    fn key() -> SchemaKey {
        SchemaKey::new("Person", &TypeVersion::new(1, 0, 0))
    }

    #[test]
    fn test_publish_reaches_subscribers() {
        let bus = SchemaChangeBus::new();
        let recorder = Arc::new(Recorder::default());
        bus.subscribe(&recorder);

        assert_eq!(bus.updated(key()), 1);
        assert_eq!(bus.deleted(key()), 1);

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].kind, ChangeKind::Deleted);
    }

    #[test]
    fn test_dropped_listeners_are_pruned() {
        let bus = SchemaChangeBus::new();
        let recorder = Arc::new(Recorder::default());
        bus.subscribe(&recorder);
        drop(recorder);

        assert_eq!(bus.listener_count(), 0);
        assert_eq!(bus.updated(key()), 0);
    }
}
