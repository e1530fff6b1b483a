use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

const PREVIEW_SCHEME: &str = "preview://";

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, String>>,
}

/// Table of live preview handles, keyed by `preview://<id>` URLs.
///
/// Every handle handed out removes its own entry when dropped, so the table
/// only ever holds previews that somebody still owns.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    inner: Arc<RegistryInner>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, label: &str) -> PreviewHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.live.lock().insert(id, label.to_string());
        debug!("Acquired preview {}{} for {}", PREVIEW_SCHEME, id, label);
        PreviewHandle {
            id,
            registry: self.clone(),
        }
    }

    pub fn live_count(&self) -> usize {
        self.inner.live.lock().len()
    }

    /// Label of the resource behind a preview URL, while the handle is alive.
    pub fn resolve(&self, url: &str) -> Option<String> {
        let id = url.strip_prefix(PREVIEW_SCHEME)?.parse::<u64>().ok()?;
        self.inner.live.lock().get(&id).cloned()
    }

    fn release(&self, id: u64) {
        if let Some(label) = self.inner.live.lock().remove(&id) {
            debug!("Released preview {}{} for {}", PREVIEW_SCHEME, id, label);
        }
    }
}

/// Owned preview; released exactly once, on drop.
#[derive(Debug)]
pub struct PreviewHandle {
    id: u64,
    registry: PreviewRegistry,
}

impl PreviewHandle {
    pub fn url(&self) -> String {
        format!("{PREVIEW_SCHEME}{}", self.id)
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}
