//! Graph event emitter (C9, §4.7). Listeners are reference-counted closures;
//! `emit` clones the listener list (an `Arc` bump per entry, not a deep
//! copy) and releases the lock before fanning out, so a listener that
//! re-enters `emit` from inside its own call — explicitly allowed by §4.7 —
//! can't deadlock against the lock `subscribe`/`unsubscribe` also take. A
//! listener that panics stops the fan-out for that emit only.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use gre_ast::UpdateEvent;

pub type Listener = Arc<dyn Fn(&UpdateEvent) + Send + Sync>;

/// Opaque handle returned by `subscribe`, needed because closures aren't
/// directly comparable the way the original's listener objects were.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Entry {
    id: SubscriptionId,
    listener: Listener,
}

#[derive(Default)]
pub struct GraphEventEmitter {
    listeners: RwLock<Vec<Entry>>,
    next_id: AtomicU64,
}

impl GraphEventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().expect("event emitter poisoned").push(Entry { id, listener });
        id
    }

    /// Returns `false` if `id` was not subscribed (mirrors the original's
    /// `ValueError` on unsubscribing an absent listener, as a status code
    /// rather than a panic since this path is not exceptional here).
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write().expect("event emitter poisoned");
        let before = listeners.len();
        listeners.retain(|e| e.id != id);
        listeners.len() != before
    }

    /// Snapshots the listener list (cloning `Arc` handles, not closures),
    /// then calls each in registration order with the lock released.
    pub fn emit(&self, event: UpdateEvent) {
        tracing::debug!(entity_type = %event.entity_type, property = %event.property, entity_id = event.entity_id, "emitting update event");
        let snapshot: Vec<Entry> = self.listeners.read().expect("event emitter poisoned").clone();
        for entry in &snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| (entry.listener)(&event)));
            if result.is_err() {
                tracing::error!(subscription = entry.id.0, "event listener panicked, stopping fan-out for this emit");
                break;
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().expect("event emitter poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtOrdering};
    use std::sync::Arc;

    use chrono::Utc;
    use gre_ast::Value;

    use super::*;

    fn sample_event() -> UpdateEvent {
        UpdateEvent { entity_type: "Supplier".into(), entity_id: 1, property: "status".into(), old_value: Value::Null, new_value: Value::String("Blacklisted".into()) }
    }

    #[test]
    fn listeners_receive_emitted_events_in_order() {
        let emitter = GraphEventEmitter::new();
        let seen = Arc::new(RwLock::new(Vec::new()));
        let seen2 = seen.clone();
        emitter.subscribe(Arc::new(move |e| seen2.write().unwrap().push(e.property.clone())));
        emitter.emit(sample_event());
        assert_eq!(*seen.read().unwrap(), vec!["status".to_string()]);
        let _ = Utc::now();
    }

    #[test]
    fn unsubscribe_reports_presence() {
        let emitter = GraphEventEmitter::new();
        let id = emitter.subscribe(Arc::new(|_| {}));
        assert!(emitter.unsubscribe(id));
        assert!(!emitter.unsubscribe(id));
    }

    #[test]
    fn panicking_listener_does_not_stop_future_emits() {
        let emitter = GraphEventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        emitter.subscribe(Arc::new(|_| panic!("boom")));
        let count2 = count.clone();
        emitter.subscribe(Arc::new(move |_| {
            count2.fetch_add(1, AtOrdering::SeqCst);
        }));
        emitter.emit(sample_event());
        // the panicking listener ran first and stopped this emit's fan-out
        assert_eq!(count.load(AtOrdering::SeqCst), 0);
        emitter.emit(sample_event());
        assert_eq!(count.load(AtOrdering::SeqCst), 0);
    }
}
