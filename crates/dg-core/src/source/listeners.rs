//! Change listeners and scoped subscriptions

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use super::DataSource;

/// Callback invoked when a source fires `changed`
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by `DataSource::add_listener`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listener bookkeeping shared by the concrete sources
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<AHashMap<ListenerId, ChangeListener>>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn add(&self, listener: ChangeListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().insert(id, listener);
        id
    }

    /// Unregister a listener
    pub fn remove(&self, id: ListenerId) -> bool {
        self.listeners.lock().remove(&id).is_some()
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fire `changed` on every listener
    pub fn emit(&self) {
        // Clone out of the lock so listeners may (un)subscribe re-entrantly
        let listeners: Vec<ChangeListener> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener();
        }
    }
}

/// A listener registration removed when dropped
pub struct Subscription {
    source: Arc<dyn DataSource>,
    id: Option<ListenerId>,
}

impl Subscription {
    /// The source this subscription listens to
    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    /// Remove the listener now instead of on drop
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(id) = self.id.take() {
            self.source.remove_listener(id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Subscribe to a source's `changed` notifications for the lifetime of the returned value
pub fn subscribe(source: &Arc<dyn DataSource>, listener: ChangeListener) -> Subscription {
    let id = source.add_listener(listener);
    Subscription {
        source: source.clone(),
        id: Some(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_emit_reaches_every_listener() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let hits = hits.clone();
            registry.add(Arc::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }

        registry.emit();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_remove_listener() {
        let registry = ListenerRegistry::new();
        let id = registry.add(Arc::new(|| {}));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }
}
