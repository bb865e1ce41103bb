//! Source retrieval: picking a loader per filter set and validating what it
//! returns before any pixel work happens.
//!
//! [`DataManager`] owns the loader registry. Each filter set may name its
//! loader via `data_loader`; sets that don't fall back to the manager's
//! default. Whatever the loader hands back is run through the attributes
//! applier and must carry an `image/*` content type — a loader returning a PDF
//! or an unguessable blob fails here, not deep inside the filter chain.

use crate::attributes::resolver::{AttributesError, FileAttributesApplier};
use crate::file::File;
use crate::filter_config::{FilterConfigError, FilterConfiguration, FilterDefinition};
use crate::loader::{Loader, LoaderError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error(transparent)]
    Config(#[from] FilterConfigError),
    #[error("could not find data loader \"{name}\" for filter set \"{filter}\"")]
    UnknownLoader { name: String, filter: String },
    #[error(transparent)]
    NotLoadable(#[from] LoaderError),
    #[error("invalid file found for \"{path}\": {source}")]
    InvalidFile {
        path: String,
        #[source]
        source: AttributesError,
    },
    #[error("source image \"{path}\" must be of type image/*, \"{content_type}\" given")]
    NotAnImage { path: String, content_type: String },
}

/// Registry of named loaders plus the attribute gate.
pub struct DataManager {
    config: Arc<FilterConfiguration>,
    loaders: HashMap<String, Arc<dyn Loader>>,
    default_loader: Option<String>,
    applier: FileAttributesApplier,
}

impl DataManager {
    pub fn new(config: Arc<FilterConfiguration>, applier: FileAttributesApplier) -> Self {
        Self {
            config,
            loaders: HashMap::new(),
            default_loader: None,
            applier,
        }
    }

    pub fn add_loader(&mut self, name: impl Into<String>, loader: Arc<dyn Loader>) {
        self.loaders.insert(name.into(), loader);
    }

    /// Loader used by filter sets without an explicit `data_loader`.
    pub fn set_default_loader(&mut self, name: impl Into<String>) {
        self.default_loader = Some(name.into());
    }

    fn loader_for(
        &self,
        filter: &str,
        definition: &FilterDefinition,
    ) -> Result<&Arc<dyn Loader>, DataError> {
        let name = definition
            .data_loader
            .as_deref()
            .or(self.default_loader.as_deref())
            .unwrap_or("default");
        self.loaders
            .get(name)
            .ok_or_else(|| DataError::UnknownLoader {
                name: name.to_string(),
                filter: filter.to_string(),
            })
    }

    /// Load and validate the source image for `path` under filter set `filter`.
    pub fn find(&self, filter: &str, path: &str) -> Result<File, DataError> {
        let definition = self.config.get(filter)?;
        let loader = self.loader_for(filter, definition)?;

        let file = loader.find(path)?;
        let file = self
            .applier
            .apply(file)
            .map_err(|source| DataError::InvalidFile {
                path: path.to_string(),
                source,
            })?;

        if !file.content_type().is_type("image") {
            return Err(DataError::NotAnImage {
                path: path.to_string(),
                content_type: file.content_type().to_string(),
            });
        }
        Ok(file)
    }

    /// Fallback image URL for `filter`: the set's own `default_image`, else the
    /// pipeline-wide default, else `None`.
    pub fn default_image_url(&self, filter: &str) -> Result<Option<String>, DataError> {
        let definition = self.config.get(filter)?;
        Ok(definition
            .default_image
            .clone()
            .or_else(|| self.config.default_image().map(str::to_string)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::resolver::FileAttributesResolver;
    use crate::loader::mock::MockLoader;
    use crate::lock::LockManager;
    use tempfile::TempDir;

    const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    const PDF_MAGIC: &[u8] = b"%PDF-1.7 ...";

    const CONFIG: &str = r#"
default_image = "/images/missing.png"

[filters.thumb]

[filters.custom_loader]
data_loader = "special"

[filters.with_default]
default_image = "/images/thumb-missing.png"
"#;

    fn manager(tmp: &TempDir) -> DataManager {
        let config = Arc::new(FilterConfiguration::from_toml_str(CONFIG).unwrap());
        let resolver = FileAttributesResolver::standard(Arc::new(LockManager::new()))
            .with_temp_root(tmp.path());
        let mut manager = DataManager::new(config, FileAttributesApplier::new(resolver));
        manager.add_loader(
            "default",
            Arc::new(
                MockLoader::new()
                    .with_file("cat.png", PNG_MAGIC)
                    .with_file("doc.pdf", PDF_MAGIC),
            ),
        );
        manager.set_default_loader("default");
        manager
    }

    #[test]
    fn find_returns_attributed_image() {
        let tmp = TempDir::new().unwrap();
        let file = manager(&tmp).find("thumb", "cat.png").unwrap();
        assert_eq!(file.content_type().to_string(), "image/png");
        assert_eq!(file.extension().name(), Some("png"));
    }

    #[test]
    fn find_rejects_non_image_naming_the_type() {
        let tmp = TempDir::new().unwrap();
        let err = manager(&tmp).find("thumb", "doc.pdf").unwrap_err();
        match err {
            DataError::NotAnImage { content_type, .. } => {
                assert_eq!(content_type, "application/pdf");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn find_propagates_not_loadable() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            manager(&tmp).find("thumb", "nope.png"),
            Err(DataError::NotLoadable(_))
        ));
    }

    #[test]
    fn find_wraps_unresolvable_attributes() {
        let tmp = TempDir::new().unwrap();
        let mut m = manager(&tmp);
        m.add_loader(
            "default",
            Arc::new(MockLoader::new().with_file("junk.bin", b"\x00\x01\x02")),
        );
        assert!(matches!(
            m.find("thumb", "junk.bin"),
            Err(DataError::InvalidFile { .. })
        ));
    }

    #[test]
    fn unknown_configured_loader_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = manager(&tmp).find("custom_loader", "cat.png").unwrap_err();
        match err {
            DataError::UnknownLoader { name, filter } => {
                assert_eq!(name, "special");
                assert_eq!(filter, "custom_loader");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_filter_set_is_a_config_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            manager(&tmp).find("nope", "cat.png"),
            Err(DataError::Config(_))
        ));
    }

    #[test]
    fn default_image_url_prefers_filter_over_global() {
        let tmp = TempDir::new().unwrap();
        let m = manager(&tmp);
        assert_eq!(
            m.default_image_url("with_default").unwrap().as_deref(),
            Some("/images/thumb-missing.png")
        );
        assert_eq!(
            m.default_image_url("thumb").unwrap().as_deref(),
            Some("/images/missing.png")
        );
    }
}
