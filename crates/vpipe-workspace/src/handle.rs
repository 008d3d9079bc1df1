//! Scoped byte-stream handles.
//!
//! A [`MediaHandle`] owns one in-memory video and stays registered with its
//! [`HandleRegistry`] until it is dropped. Replacing a handle field therefore
//! releases the previous handle on every path.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

/// Tracks which handles are still alive.
#[derive(Debug, Clone, Default)]
pub struct HandleRegistry {
    live: Arc<Mutex<HashSet<Uuid>>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` under a fresh handle.
    pub fn issue(&self, name: impl Into<String>, bytes: Bytes) -> MediaHandle {
        let id = Uuid::new_v4();
        self.with_live(|live| live.insert(id));
        let handle = MediaHandle {
            id,
            name: name.into(),
            bytes,
            registry: self.clone(),
        };
        debug!(url = %handle.url(), bytes = handle.len(), "Media handle issued");
        handle
    }

    /// Number of handles issued and not yet dropped.
    pub fn live_handles(&self) -> usize {
        self.with_live(|live| live.len())
    }

    pub fn is_live(&self, id: Uuid) -> bool {
        self.with_live(|live| live.contains(&id))
    }

    fn release(&self, id: Uuid) {
        if self.with_live(|live| live.remove(&id)) {
            debug!(id = %id, "Media handle released");
        }
    }

    fn with_live<T>(&self, f: impl FnOnce(&mut HashSet<Uuid>) -> T) -> T {
        // A panic while holding the lock leaves the set itself intact
        let mut live = self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut live)
    }
}

/// An owned, registered video byte stream.
pub struct MediaHandle {
    id: Uuid,
    name: String,
    bytes: Bytes,
    registry: HandleRegistry,
}

impl MediaHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Opaque locator for players, e.g. `blob:vpipe/<uuid>`.
    pub fn url(&self) -> String {
        format!("blob:vpipe/{}", self.id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cheap clone of the underlying bytes.
    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Drop for MediaHandle {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_releases() {
        let registry = HandleRegistry::new();
        let a = registry.issue("a.mp4", Bytes::from_static(b"a"));
        let b = registry.issue("b.mp4", Bytes::from_static(b"b"));
        assert_eq!(registry.live_handles(), 2);

        let a_id = a.id();
        drop(a);
        assert!(!registry.is_live(a_id));
        assert!(registry.is_live(b.id()));
        assert_eq!(registry.live_handles(), 1);
    }

    #[test]
    fn test_reassignment_releases_previous() {
        let registry = HandleRegistry::new();
        let mut current = registry.issue("first.mp4", Bytes::from_static(b"1"));
        assert_eq!(current.name(), "first.mp4");

        current = registry.issue("second.mp4", Bytes::from_static(b"2"));
        assert_eq!(registry.live_handles(), 1);
        assert_eq!(current.name(), "second.mp4");
    }

    #[test]
    fn test_url_shape() {
        let registry = HandleRegistry::new();
        let handle = registry.issue("clip.mp4", Bytes::new());
        assert!(handle.url().starts_with("blob:vpipe/"));
        assert!(handle.is_empty());
    }
}
