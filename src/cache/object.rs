//! Object-storage resolver.
//!
//! The backend sits behind the narrow [`ObjectStore`] trait — put, exists,
//! delete, list, and URL construction — so the resolver stays synchronous and
//! backend SDK types never cross this module's boundary. Backend failures are
//! logged with their context and translated into [`CacheError`] variants.
//!
//! Keys are `[cache_prefix/]filter/path` with duplicate slashes collapsed.
//! No local locking: concurrent puts of the same key are left to the
//! backend's last-writer-wins atomicity.

use super::{join_segments, CacheError, CacheResolver};
use crate::file::File;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::sync::Arc;
use thiserror::Error;

/// Characters percent-encoded in object-URL path segments.
const URL_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'%')
    .add(b'[')
    .add(b']');

#[derive(Error, Debug)]
#[error("{0}")]
pub struct ObjectStoreError(pub String);

/// Canned access level passed through to the backend on put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectAcl {
    PublicRead,
    Private,
}

/// Minimal object-storage interface the resolver needs.
pub trait ObjectStore: Send + Sync {
    fn put(
        &self,
        key: &str,
        contents: &[u8],
        content_type: Option<&str>,
        acl: ObjectAcl,
    ) -> Result<(), ObjectStoreError>;

    fn exists(&self, key: &str) -> Result<bool, ObjectStoreError>;

    fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;

    /// All keys under `prefix` (`""` lists everything).
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError>;

    /// Public URL for a stored key. Purely local computation.
    fn base_url(&self) -> &str;
}

pub struct ObjectStorageResolver {
    store: Arc<dyn ObjectStore>,
    cache_prefix: Option<String>,
    acl: ObjectAcl,
}

impl ObjectStorageResolver {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            cache_prefix: None,
            acl: ObjectAcl::PublicRead,
        }
    }

    pub fn with_cache_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cache_prefix = Some(join_segments(&[&prefix.into()]));
        self
    }

    pub fn with_acl(mut self, acl: ObjectAcl) -> Self {
        self.acl = acl;
        self
    }

    fn key(&self, path: &str, filter: &str) -> String {
        match &self.cache_prefix {
            Some(prefix) => join_segments(&[prefix, filter, path]),
            None => join_segments(&[filter, path]),
        }
    }

    /// Key prefix holding every rendition of `filter`.
    fn filter_prefix(&self, filter: &str) -> String {
        format!("{}/", self.key("", filter))
    }

    fn url_for(&self, key: &str) -> String {
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| utf8_percent_encode(segment, URL_SEGMENT).to_string())
            .collect();
        format!(
            "{}/{}",
            self.store.base_url().trim_end_matches('/'),
            encoded.join("/")
        )
    }
}

impl CacheResolver for ObjectStorageResolver {
    fn is_stored(&self, path: &str, filter: &str) -> bool {
        let key = self.key(path, filter);
        match self.store.exists(&key) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(key, error = %e, "object existence check failed");
                false
            }
        }
    }

    fn resolve(&self, path: &str, filter: &str) -> Result<String, CacheError> {
        Ok(self.url_for(&self.key(path, filter)))
    }

    fn store(&self, file: &File, path: &str, filter: &str) -> Result<(), CacheError> {
        let key = self.key(path, filter);
        let contents = file.contents()?;
        let content_type = file
            .has_content_type()
            .then(|| file.content_type().to_string());

        self.store
            .put(&key, &contents, content_type.as_deref(), self.acl)
            .map_err(|e| {
                tracing::error!(key, filter, error = %e, "object put failed");
                CacheError::NotStorable {
                    path: path.to_string(),
                    filter: filter.to_string(),
                    reason: e.to_string(),
                }
            })
    }

    fn remove(&self, paths: &[String], filters: &[String]) -> Result<(), CacheError> {
        if paths.is_empty() {
            // Bulk removal: list once, match keys by filter prefix, delete
            // best-effort.
            let root = self.cache_prefix.clone().unwrap_or_default();
            let keys = self.store.list_keys(&root).map_err(|e| {
                tracing::error!(error = %e, "object listing failed");
                CacheError::NotResolvable {
                    path: String::new(),
                    filter: filters.join(", "),
                    reason: e.to_string(),
                }
            })?;

            let prefixes: Vec<String> =
                filters.iter().map(|f| self.filter_prefix(f)).collect();
            for key in keys {
                if !prefixes.iter().any(|p| key.starts_with(p.as_str())) {
                    continue;
                }
                if let Err(e) = self.store.delete(&key) {
                    tracing::warn!(key, error = %e, "object delete failed");
                }
            }
            return Ok(());
        }

        for filter in filters {
            for path in paths {
                let key = self.key(path, filter);
                if let Err(e) = self.store.delete(&key) {
                    tracing::warn!(key, error = %e, "object delete failed");
                }
            }
        }
        Ok(())
    }
}
