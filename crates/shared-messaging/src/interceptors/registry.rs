//! Copy-on-write interceptor registry.
//!
//! Readers take an `Arc` snapshot under a short read lock and iterate it with
//! no lock held, so an in-flight dispatch keeps a consistent view while other
//! tasks register or cancel interceptors.

use crate::registration::FnRegistration;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

struct Entry<T: ?Sized> {
    id: u64,
    interceptor: Arc<T>,
}

impl<T: ?Sized> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            interceptor: self.interceptor.clone(),
        }
    }
}

struct RegistryInner<T: ?Sized> {
    entries: RwLock<Arc<Vec<Entry<T>>>>,
    next_id: AtomicU64,
    kind: &'static str,
}

impl<T: ?Sized> RegistryInner<T> {
    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.write();
        if !entries.iter().any(|e| e.id == id) {
            return false;
        }
        let remaining: Vec<Entry<T>> = entries.iter().filter(|e| e.id != id).cloned().collect();
        *entries = Arc::new(remaining);
        debug!(kind = self.kind, remaining = entries.len(), "Interceptor unregistered");
        true
    }
}

/// Ordered, copy-on-write list of interceptors.
pub struct InterceptorRegistry<T: ?Sized> {
    inner: Arc<RegistryInner<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> InterceptorRegistry<T> {
    /// Empty registry; `kind` labels log lines.
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        Self::with_interceptors(kind, Vec::new())
    }

    /// Registry pre-populated in the given order.
    #[must_use]
    pub fn with_interceptors(kind: &'static str, interceptors: Vec<Arc<T>>) -> Self {
        let entries: Vec<Entry<T>> = interceptors
            .into_iter()
            .zip(0u64..)
            .map(|(interceptor, id)| Entry { id, interceptor })
            .collect();
        let next_id = entries.len() as u64;
        Self {
            inner: Arc::new(RegistryInner {
                entries: RwLock::new(Arc::new(entries)),
                next_id: AtomicU64::new(next_id),
                kind,
            }),
        }
    }

    /// Append an interceptor. Cancelling the returned registration removes it
    /// from future snapshots.
    pub fn register(&self, interceptor: Arc<T>) -> FnRegistration {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut entries = self.inner.entries.write();
            let mut updated: Vec<Entry<T>> = entries.iter().cloned().collect();
            updated.push(Entry { id, interceptor });
            *entries = Arc::new(updated);
            debug!(kind = self.inner.kind, total = entries.len(), "Interceptor registered");
        }

        let weak: Weak<RegistryInner<T>> = Arc::downgrade(&self.inner);
        FnRegistration::new(move || weak.upgrade().is_some_and(|inner| inner.remove(id)))
    }

    /// Consistent view of the current interceptors.
    #[must_use]
    pub fn snapshot(&self) -> InterceptorSnapshot<T> {
        InterceptorSnapshot(self.inner.entries.read().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable snapshot of a registry, in registration order.
pub struct InterceptorSnapshot<T: ?Sized>(Arc<Vec<Entry<T>>>);

impl<T: ?Sized> InterceptorSnapshot<T> {
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.0.iter().map(|e| &e.interceptor)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
