use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tryon_contracts::{decode_data_url, CanonicalBlob};
use uuid::Uuid;

pub const OBJECT_URL_PREFIX: &str = "blob:tryon/";

/// Image handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderableResult {
    /// `blob:tryon/<uuid>` object reference, or a `data:` URL.
    pub display_url: String,
    pub mime_type: String,
    /// Model commentary returned next to the image.
    pub source_text: Option<String>,
}

impl RenderableResult {
    pub fn is_object_url(&self) -> bool {
        self.display_url.starts_with(OBJECT_URL_PREFIX)
    }
}

/// Owns the bytes behind object URLs. Entries live until revoked.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    blobs: Arc<Mutex<HashMap<String, CanonicalBlob>>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_object_url(&self, blob: CanonicalBlob) -> String {
        let url = format!("{OBJECT_URL_PREFIX}{}", Uuid::new_v4());
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.clone(), blob);
        url
    }

    /// Bytes behind an object URL or a data URL.
    pub fn resolve(&self, display_url: &str) -> Option<CanonicalBlob> {
        if display_url.starts_with(OBJECT_URL_PREFIX) {
            return self
                .blobs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(display_url)
                .cloned();
        }
        decode_data_url(display_url).ok()
    }

    /// Releases an object URL. Data URLs own nothing and report `false`.
    pub fn revoke(&self, display_url: &str) -> bool {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(display_url)
            .is_some()
    }

    pub fn live_count(&self) -> usize {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
