// ============================================================================
// File: src/blob_store.rs
// Process-local registry backing `blob:` media URIs
// ============================================================================

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

pub const BLOB_SCHEME: &str = "blob:";
const BLOB_PREFIX: &str = "blob:cutverse/";

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// In-memory object store. Entries live until the process exits; nothing
/// revokes them.
#[derive(Debug, Default)]
pub struct BlobStore {
    entries: Mutex<HashMap<String, StoredBlob>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a payload and returns the URI that addresses it.
    pub fn insert(&self, bytes: Vec<u8>, mime: &str) -> String {
        let uri = format!("{}{}", BLOB_PREFIX, Uuid::new_v4());
        self.lock().insert(
            uri.clone(),
            StoredBlob {
                bytes,
                mime: mime.to_string(),
            },
        );
        uri
    }

    pub fn get(&self, uri: &str) -> Option<StoredBlob> {
        self.lock().get(uri).cloned()
    }

    /// Returns the bytes behind a `blob:` or `data:` URI.
    pub fn resolve_bytes(&self, uri: &str) -> Option<Vec<u8>> {
        if uri.starts_with(BLOB_SCHEME) {
            return self.get(uri).map(|blob| blob.bytes);
        }
        let payload = uri.strip_prefix("data:")?;
        let (header, data) = payload.split_once(',')?;
        if header.ends_with(";base64") {
            STANDARD.decode(data.trim()).ok()
        } else {
            Some(data.as_bytes().to_vec())
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredBlob>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_blobs_are_addressable() {
        let store = BlobStore::new();
        let uri = store.insert(vec![1, 2, 3], "audio/mpeg");
        assert!(uri.starts_with("blob:cutverse/"));
        let blob = store.get(&uri).unwrap();
        assert_eq!(blob.bytes, vec![1, 2, 3]);
        assert_eq!(blob.mime, "audio/mpeg");
    }

    #[test]
    fn each_insert_gets_a_fresh_uri() {
        let store = BlobStore::new();
        let a = store.insert(vec![0], "image/png");
        let b = store.insert(vec![0], "image/png");
        assert_ne!(a, b);
        assert!(store.get(&a).is_some() && store.get(&b).is_some());
    }

    #[test]
    fn resolves_base64_data_uris() {
        let store = BlobStore::new();
        let bytes = store.resolve_bytes("data:audio/wav;base64,aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn remote_urls_do_not_resolve() {
        let store = BlobStore::new();
        assert!(store.resolve_bytes("https://cdn.example.com/a.wav").is_none());
        assert!(store.resolve_bytes("blob:cutverse/missing").is_none());
    }
}
