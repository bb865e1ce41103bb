//! Cache resolvers: where processed renditions live and how they are named.
//!
//! A [`CacheResolver`] answers four questions — is a rendition stored, what is
//! its public URL, how do I store one, and how do I remove some. Three
//! implementations ship:
//!
//! - [`WebPathResolver`](web_path::WebPathResolver) — artifacts under a web
//!   root on local disk.
//! - [`ObjectStorageResolver`](object::ObjectStorageResolver) — artifacts in
//!   an object store behind the [`ObjectStore`](object::ObjectStore) seam.
//! - [`NoCacheResolver`](noop::NoCacheResolver) — nothing is ever stored;
//!   every request reprocesses.
//!
//! [`CacheManager`] routes each filter set to its resolver (config `cache`
//! key, else the default) and owns the runtime-config path mangling: a request
//! carrying runtime overrides gets its artifact under `rc/<hash>/` so it never
//! collides with the plain rendition.

pub mod noop;
pub mod object;
pub mod web_path;

use crate::file::{File, FileError};
use crate::filter_config::{FilterConfigError, FilterConfiguration};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use toml::Table;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Config(#[from] FilterConfigError),
    #[error("could not find cache resolver \"{0}\"")]
    UnknownResolver(String),
    #[error("could not store \"{path}\" for filter set \"{filter}\": {reason}")]
    NotStorable {
        path: String,
        filter: String,
        reason: String,
    },
    #[error("could not resolve \"{path}\" for filter set \"{filter}\": {reason}")]
    NotResolvable {
        path: String,
        filter: String,
        reason: String,
    },
    #[error(transparent)]
    File(#[from] FileError),
}

/// Storage backend for processed renditions.
pub trait CacheResolver: Send + Sync {
    /// Whether a rendition of `path` under `filter` is already stored.
    fn is_stored(&self, path: &str, filter: &str) -> bool;

    /// Public URL of the rendition.
    fn resolve(&self, path: &str, filter: &str) -> Result<String, CacheError>;

    /// Persist a rendition.
    fn store(&self, file: &File, path: &str, filter: &str) -> Result<(), CacheError>;

    /// Remove renditions. With `paths` empty, removes everything stored for
    /// each filter. Removal is idempotent: missing artifacts are not errors.
    fn remove(&self, paths: &[String], filters: &[String]) -> Result<(), CacheError>;
}

/// Joins path segments with single slashes, dropping empties and collapsing
/// duplicate separators inside segments.
pub(crate) fn join_segments(segments: &[&str]) -> String {
    let mut out = String::new();
    for segment in segments {
        for part in segment.split('/').filter(|p| !p.is_empty()) {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(part);
        }
    }
    out
}

/// Routes filter sets to resolvers and names runtime-override artifacts.
pub struct CacheManager {
    config: Arc<FilterConfiguration>,
    resolvers: HashMap<String, Arc<dyn CacheResolver>>,
    default_resolver: Option<String>,
}

impl CacheManager {
    pub fn new(config: Arc<FilterConfiguration>) -> Self {
        Self {
            config,
            resolvers: HashMap::new(),
            default_resolver: None,
        }
    }

    pub fn add_resolver(&mut self, name: impl Into<String>, resolver: Arc<dyn CacheResolver>) {
        self.resolvers.insert(name.into(), resolver);
    }

    /// Resolver used by filter sets without an explicit `cache` key.
    pub fn set_default_resolver(&mut self, name: impl Into<String>) {
        self.default_resolver = Some(name.into());
    }

    fn resolver_name(&self, filter: &str) -> Result<String, CacheError> {
        let configured = self.config.get(filter)?.cache.clone();
        configured
            .or_else(|| self.default_resolver.clone())
            .ok_or_else(|| CacheError::UnknownResolver(format!("<none for {filter}>")))
    }

    fn resolver_for(&self, filter: &str) -> Result<&Arc<dyn CacheResolver>, CacheError> {
        let name = self.resolver_name(filter)?;
        self.resolvers
            .get(&name)
            .ok_or(CacheError::UnknownResolver(name))
    }

    pub fn is_stored(&self, path: &str, filter: &str) -> Result<bool, CacheError> {
        Ok(self.resolver_for(filter)?.is_stored(path, filter))
    }

    pub fn resolve(&self, path: &str, filter: &str) -> Result<String, CacheError> {
        self.resolver_for(filter)?.resolve(path, filter)
    }

    pub fn store(&self, file: &File, path: &str, filter: &str) -> Result<(), CacheError> {
        self.resolver_for(filter)?.store(file, path, filter)
    }

    /// Remove renditions across resolvers. Empty `paths` means everything per
    /// filter; empty `filters` means all configured filter sets; both empty is
    /// a no-op.
    pub fn remove(&self, paths: &[String], filters: &[String]) -> Result<(), CacheError> {
        if paths.is_empty() && filters.is_empty() {
            return Ok(());
        }

        let filters: Vec<String> = if filters.is_empty() {
            self.config.names().map(str::to_string).collect()
        } else {
            filters.to_vec()
        };

        // Group filters by resolver so each backend sees one call.
        let mut by_resolver: HashMap<String, Vec<String>> = HashMap::new();
        for filter in filters {
            let name = self.resolver_name(&filter)?;
            by_resolver.entry(name).or_default().push(filter);
        }

        for (name, filters) in by_resolver {
            let resolver = self
                .resolvers
                .get(&name)
                .ok_or(CacheError::UnknownResolver(name))?;
            resolver.remove(paths, &filters)?;
        }
        Ok(())
    }

    /// Cache path for a request. Runtime overrides get a distinct namespace
    /// derived from their content, so an overridden rendition never shadows
    /// the plain one.
    pub fn cache_path(&self, path: &str, runtime: &Table) -> String {
        if runtime.is_empty() {
            return path.to_string();
        }
        let serialized = toml::to_string(runtime).unwrap_or_default();
        let digest = Sha256::digest(serialized.as_bytes());
        let mut hex = String::with_capacity(16);
        for byte in &digest[..8] {
            hex.push_str(&format!("{byte:02x}"));
        }
        join_segments(&["rc", &hex, path])
    }
}
