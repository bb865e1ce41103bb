//! Request orchestration: the one entry point tying retrieval, filtering, and
//! caching together.
//!
//! `get` is cache-first: a stored rendition short-circuits straight to its
//! URL; a miss loads the source, applies the filter set, stores the result,
//! and resolves. Errors surface from whichever stage failed — callers that
//! want a fallback image can consult [`ImageService::default_image_url`].

use crate::cache::{CacheError, CacheManager};
use crate::data::{DataError, DataManager};
use crate::filter::{FilterError, FilterManager};
use thiserror::Error;
use toml::Table;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

pub struct ImageService {
    data: DataManager,
    filters: FilterManager,
    cache: CacheManager,
}

impl ImageService {
    pub fn new(data: DataManager, filters: FilterManager, cache: CacheManager) -> Self {
        Self {
            data,
            filters,
            cache,
        }
    }

    /// URL of the rendition of `path` under filter set `filter`, processing
    /// and storing it first if it isn't cached yet.
    pub fn get(&self, path: &str, filter: &str, runtime: &Table) -> Result<String, ServiceError> {
        let cache_path = self.cache.cache_path(path, runtime);

        if !self.cache.is_stored(&cache_path, filter)? {
            tracing::debug!(path, filter, "cache miss, processing");
            let source = self.data.find(filter, path)?;
            let output = self.filters.apply_filter(source, filter, runtime)?;
            self.cache.store(&output, &cache_path, filter)?;
        }

        Ok(self.cache.resolve(&cache_path, filter)?)
    }

    /// Remove cached renditions; see [`CacheManager::remove`] for the
    /// paths/filters semantics.
    pub fn remove(&self, paths: &[String], filters: &[String]) -> Result<(), ServiceError> {
        Ok(self.cache.remove(paths, filters)?)
    }

    /// Fallback image URL configured for `filter`, if any.
    pub fn default_image_url(&self, filter: &str) -> Result<Option<String>, ServiceError> {
        Ok(self.data.default_image_url(filter)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::resolver::{FileAttributesApplier, FileAttributesResolver};
    use crate::cache::web_path::WebPathResolver;
    use crate::filter_config::FilterConfiguration;
    use crate::imaging::rust_backend::RustProcessor;
    use crate::loader::FilesystemLoader;
    use crate::lock::LockManager;
    use image::{DynamicImage, RgbImage};
    use std::io::Cursor;
    use std::sync::Arc;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
default_image = "/images/missing.png"

[filters.thumb]
quality = 85
cache = "web"

[filters.thumb.filters.thumbnail]
size = [20, 20]
"#;

    /// A full pipeline over real images and a temp web root.
    fn service(sources: &TempDir, web_root: &TempDir) -> ImageService {
        let config = Arc::new(FilterConfiguration::from_toml_str(CONFIG).unwrap());
        let locks = Arc::new(LockManager::new());

        let mut data = DataManager::new(
            config.clone(),
            FileAttributesApplier::new(FileAttributesResolver::standard(locks.clone())),
        );
        data.add_loader(
            "default",
            Arc::new(FilesystemLoader::single(sources.path())),
        );
        data.set_default_loader("default");

        let filters = FilterManager::standard(
            config.clone(),
            Arc::new(RustProcessor::new()),
            FileAttributesResolver::standard(locks.clone()),
        );

        let mut cache = CacheManager::new(config);
        cache.add_resolver(
            "web",
            Arc::new(WebPathResolver::new(
                web_root.path(),
                "http://images.test",
                locks,
            )),
        );
        cache.set_default_resolver("web");

        ImageService::new(data, filters, cache)
    }

    fn write_test_png(dir: &std::path::Path, name: &str) {
        let img = RgbImage::from_fn(64, 64, |x, y| image::Rgb([x as u8, y as u8, 0]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        std::fs::write(dir.join(name), buffer.into_inner()).unwrap();
    }

    #[test]
    fn get_processes_stores_and_resolves() {
        let sources = TempDir::new().unwrap();
        let web_root = TempDir::new().unwrap();
        write_test_png(sources.path(), "cat.png");
        let svc = service(&sources, &web_root);

        let url = svc.get("cat.png", "thumb", &Table::new()).unwrap();
        assert_eq!(url, "http://images.test/media/cache/thumb/cat.png");

        let artifact = web_root.path().join("media/cache/thumb/cat.png");
        let stored = image::load_from_memory(&std::fs::read(&artifact).unwrap()).unwrap();
        assert_eq!((stored.width(), stored.height()), (20, 20));
    }

    #[test]
    fn get_hits_cache_on_second_call() {
        let sources = TempDir::new().unwrap();
        let web_root = TempDir::new().unwrap();
        write_test_png(sources.path(), "cat.png");
        let svc = service(&sources, &web_root);

        let first = svc.get("cat.png", "thumb", &Table::new()).unwrap();
        // deleting the source proves the second call never reprocesses
        std::fs::remove_file(sources.path().join("cat.png")).unwrap();
        let second = svc.get("cat.png", "thumb", &Table::new()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn runtime_overrides_get_their_own_artifact() {
        let sources = TempDir::new().unwrap();
        let web_root = TempDir::new().unwrap();
        write_test_png(sources.path(), "cat.png");
        let svc = service(&sources, &web_root);

        let plain = svc.get("cat.png", "thumb", &Table::new()).unwrap();
        let runtime: Table = toml::from_str("quality = 10").unwrap();
        let overridden = svc.get("cat.png", "thumb", &runtime).unwrap();

        assert_ne!(plain, overridden);
        assert!(overridden.contains("/rc/"), "{overridden}");
    }

    #[test]
    fn missing_source_propagates_data_error() {
        let sources = TempDir::new().unwrap();
        let web_root = TempDir::new().unwrap();
        let svc = service(&sources, &web_root);

        assert!(matches!(
            svc.get("ghost.png", "thumb", &Table::new()),
            Err(ServiceError::Data(_))
        ));
    }

    #[test]
    fn remove_clears_the_rendition() {
        let sources = TempDir::new().unwrap();
        let web_root = TempDir::new().unwrap();
        write_test_png(sources.path(), "cat.png");
        let svc = service(&sources, &web_root);

        svc.get("cat.png", "thumb", &Table::new()).unwrap();
        let artifact = web_root.path().join("media/cache/thumb/cat.png");
        assert!(artifact.exists());

        svc.remove(&["cat.png".to_string()], &["thumb".to_string()])
            .unwrap();
        assert!(!artifact.exists());
    }

    #[test]
    fn default_image_url_falls_back_to_global() {
        let sources = TempDir::new().unwrap();
        let web_root = TempDir::new().unwrap();
        let svc = service(&sources, &web_root);
        assert_eq!(
            svc.default_image_url("thumb").unwrap().as_deref(),
            Some("/images/missing.png")
        );
    }
}
