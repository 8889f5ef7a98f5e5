use std::sync::{Arc, PoisonError, RwLock};

pub type Listener<K> = Arc<dyn Fn(&K) + Send + Sync>;

/// Synchronous observer list, used for store deletions and selection
/// changes.
///
/// Listeners run inside [`Notifier::emit`], in subscription order, so by the
/// time the emitting call returns every observer has seen the event.
pub struct Notifier<K> {
    listeners: RwLock<Vec<Listener<K>>>,
}

impl<K> Default for Notifier<K> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl<K> Notifier<K> {
    pub fn subscribe(&self, listener: Listener<K>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn emit(&self, event: &K) {
        // Snapshot so a listener may subscribe without deadlocking.
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<K> std::fmt::Debug for Notifier<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
