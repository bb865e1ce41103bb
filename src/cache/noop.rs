//! The resolver that never caches.
//!
//! `resolve` points back at the source image under the configured base URL,
//! `is_stored` is always false, and store/remove do nothing — every request
//! reprocesses. Useful for development and for filter sets whose output must
//! never be persisted.

use super::{join_segments, CacheError, CacheResolver};
use crate::file::File;

pub struct NoCacheResolver {
    base_url: String,
}

impl NoCacheResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl CacheResolver for NoCacheResolver {
    fn is_stored(&self, _path: &str, _filter: &str) -> bool {
        false
    }

    fn resolve(&self, path: &str, _filter: &str) -> Result<String, CacheError> {
        Ok(format!("{}/{}", self.base_url, join_segments(&[path])))
    }

    fn store(&self, _file: &File, _path: &str, _filter: &str) -> Result<(), CacheError> {
        Ok(())
    }

    fn remove(&self, _paths: &[String], _filters: &[String]) -> Result<(), CacheError> {
        Ok(())
    }
}
