//! In-process object URLs for finished videos

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

/// Scheme prefix of every URL the registry hands out
pub const OBJECT_URL_PREFIX: &str = "blob:promptreel/";

/// Bytes behind an object URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
    pub mime: String,
}

impl Blob {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Maps object URLs to in-memory blobs until they are revoked
#[derive(Debug, Default)]
pub struct BlobRegistry {
    blobs: Mutex<HashMap<String, Arc<Blob>>>,
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Blob>>> {
        match self.blobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register `data` and return a fresh URL for it
    pub fn create_object_url(&self, data: Vec<u8>, mime: impl Into<String>) -> String {
        let url = format!("{}{}", OBJECT_URL_PREFIX, Uuid::new_v4());
        let blob = Arc::new(Blob {
            data,
            mime: mime.into(),
        });
        tracing::debug!(url = %url, size = blob.len(), "Created object URL");
        self.lock().insert(url.clone(), blob);
        url
    }

    pub fn resolve(&self, url: &str) -> Option<Arc<Blob>> {
        self.lock().get(url).cloned()
    }

    /// Release a URL; returns whether it was registered
    pub fn revoke(&self, url: &str) -> bool {
        self.lock().remove(url).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_resolve_revoke() {
        let registry = BlobRegistry::new();
        let url = registry.create_object_url(vec![1, 2, 3], "video/mp4");
        assert!(url.starts_with(OBJECT_URL_PREFIX));

        let blob = registry.resolve(&url).unwrap();
        assert_eq!(blob.data, vec![1, 2, 3]);
        assert_eq!(blob.mime, "video/mp4");

        assert!(registry.revoke(&url));
        assert!(!registry.revoke(&url));
        assert!(registry.resolve(&url).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_urls_are_unique() {
        let registry = BlobRegistry::new();
        let a = registry.create_object_url(vec![0], "video/mp4");
        let b = registry.create_object_url(vec![0], "video/mp4");
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }
}
