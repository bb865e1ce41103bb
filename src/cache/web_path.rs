//! Filesystem resolver: renditions under a public web root.
//!
//! Artifacts live at `<web_root>/<cache_prefix>/<filter>/<path>` and resolve
//! to `<base_url>/<cache_prefix>/<filter>/<path>`. Stores run under a blocking
//! lock keyed by the target path, so two requests racing on the same rendition
//! serialize instead of interleaving partial writes.

use super::{join_segments, CacheError, CacheResolver};
use crate::file::File;
use crate::lock::LockManager;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

const DEFAULT_CACHE_PREFIX: &str = "media/cache";

pub struct WebPathResolver {
    web_root: PathBuf,
    base_url: String,
    cache_prefix: String,
    /// Unix mode applied to created cache directories.
    dir_mode: u32,
    locks: Arc<LockManager>,
}

impl WebPathResolver {
    pub fn new(web_root: impl Into<PathBuf>, base_url: impl Into<String>, locks: Arc<LockManager>) -> Self {
        Self {
            web_root: web_root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            dir_mode: 0o777,
            locks,
        }
    }

    pub fn with_cache_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cache_prefix = join_segments(&[&prefix.into()]);
        self
    }

    pub fn with_dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode;
        self
    }

    fn artifact_path(&self, path: &str, filter: &str) -> PathBuf {
        self.web_root
            .join(join_segments(&[&self.cache_prefix, filter, path]))
    }

    fn filter_dir(&self, filter: &str) -> PathBuf {
        self.web_root.join(join_segments(&[&self.cache_prefix, filter]))
    }

    fn create_dirs(&self, dir: &Path) -> std::io::Result<()> {
        // Remember which ancestors are new so the mode only touches those.
        let mut created = Vec::new();
        let mut cursor = dir;
        while !cursor.exists() {
            created.push(cursor.to_path_buf());
            match cursor.parent() {
                Some(parent) => cursor = parent,
                None => break,
            }
        }
        std::fs::create_dir_all(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            for dir in created {
                std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(self.dir_mode))?;
            }
        }
        Ok(())
    }

    fn remove_one(&self, path: &str, filter: &str) {
        let target = self.artifact_path(path, filter);
        let _guard = self.locks.blocking(target.to_string_lossy().as_ref());
        match std::fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %target.display(), error = %e, "failed to remove cache artifact");
            }
        }
    }

    fn remove_filter_dir(&self, filter: &str) {
        let dir = self.filter_dir(filter);
        if !dir.exists() {
            return;
        }
        // Best effort: delete what we can, log what we can't, keep walking.
        for entry in WalkDir::new(&dir).contents_first(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(filter, error = %e, "failed to walk cache directory");
                    continue;
                }
            };
            let result = if entry.file_type().is_dir() {
                std::fs::remove_dir(entry.path())
            } else {
                std::fs::remove_file(entry.path())
            };
            if let Err(e) = result {
                tracing::warn!(path = %entry.path().display(), error = %e, "failed to remove cache entry");
            }
        }
    }
}

impl CacheResolver for WebPathResolver {
    fn is_stored(&self, path: &str, filter: &str) -> bool {
        self.artifact_path(path, filter).is_file()
    }

    fn resolve(&self, path: &str, filter: &str) -> Result<String, CacheError> {
        Ok(format!(
            "{}/{}",
            self.base_url,
            join_segments(&[&self.cache_prefix, filter, path])
        ))
    }

    fn store(&self, file: &File, path: &str, filter: &str) -> Result<(), CacheError> {
        let target = self.artifact_path(path, filter);
        let contents = file.contents()?;

        let _guard = self.locks.blocking(target.to_string_lossy().as_ref());
        let write = || -> std::io::Result<()> {
            if let Some(parent) = target.parent() {
                self.create_dirs(parent)?;
            }
            std::fs::write(&target, &contents)
        };
        write().map_err(|e| {
            tracing::error!(path = %target.display(), filter, error = %e, "failed to store cache artifact");
            CacheError::NotStorable {
                path: path.to_string(),
                filter: filter.to_string(),
                reason: e.to_string(),
            }
        })
    }

    fn remove(&self, paths: &[String], filters: &[String]) -> Result<(), CacheError> {
        if paths.is_empty() {
            for filter in filters {
                self.remove_filter_dir(filter);
            }
            return Ok(());
        }
        for filter in filters {
            for path in paths {
                self.remove_one(path, filter);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{Attributes, ContentType, Extension};
    use tempfile::TempDir;

    fn resolver(tmp: &TempDir) -> WebPathResolver {
        WebPathResolver::new(
            tmp.path(),
            "http://images.test/",
            Arc::new(LockManager::new()),
        )
    }

    fn png_file() -> File {
        File::blob(
            b"png bytes".to_vec(),
            Attributes::new(ContentType::parse("image/png"), Extension::new("png")),
        )
    }

    #[test]
    fn store_then_is_stored_then_resolve() {
        let tmp = TempDir::new().unwrap();
        let r = resolver(&tmp);

        assert!(!r.is_stored("pets/cat.png", "thumb"));
        r.store(&png_file(), "pets/cat.png", "thumb").unwrap();
        assert!(r.is_stored("pets/cat.png", "thumb"));

        let artifact = tmp.path().join("media/cache/thumb/pets/cat.png");
        assert_eq!(std::fs::read(&artifact).unwrap(), b"png bytes");
        assert_eq!(
            r.resolve("pets/cat.png", "thumb").unwrap(),
            "http://images.test/media/cache/thumb/pets/cat.png"
        );
    }

    #[test]
    fn resolve_collapses_duplicate_slashes() {
        let tmp = TempDir::new().unwrap();
        let r = resolver(&tmp).with_cache_prefix("/cache//prefix/");
        assert_eq!(
            r.resolve("/a//b.png", "thumb").unwrap(),
            "http://images.test/cache/prefix/thumb/a/b.png"
        );
    }

    #[test]
    fn store_overwrites_existing_artifact() {
        let tmp = TempDir::new().unwrap();
        let r = resolver(&tmp);
        r.store(&png_file(), "cat.png", "thumb").unwrap();
        r.store(&File::blob(b"new".to_vec(), png_file().attributes().clone()), "cat.png", "thumb")
            .unwrap();

        let artifact = tmp.path().join("media/cache/thumb/cat.png");
        assert_eq!(std::fs::read(&artifact).unwrap(), b"new");
    }

    #[test]
    fn remove_pairs_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let r = resolver(&tmp);
        r.store(&png_file(), "cat.png", "thumb").unwrap();

        let pair = (vec!["cat.png".to_string()], vec!["thumb".to_string()]);
        r.remove(&pair.0, &pair.1).unwrap();
        assert!(!r.is_stored("cat.png", "thumb"));
        // second removal of a missing artifact is fine
        r.remove(&pair.0, &pair.1).unwrap();
    }

    #[test]
    fn remove_without_paths_clears_the_filter_dir() {
        let tmp = TempDir::new().unwrap();
        let r = resolver(&tmp);
        r.store(&png_file(), "a/one.png", "thumb").unwrap();
        r.store(&png_file(), "b/two.png", "thumb").unwrap();
        r.store(&png_file(), "keep.png", "other").unwrap();

        r.remove(&[], &["thumb".to_string()]).unwrap();
        assert!(!tmp.path().join("media/cache/thumb").exists());
        assert!(r.is_stored("keep.png", "other"));
    }

    #[test]
    fn remove_missing_filter_dir_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        resolver(&tmp).remove(&[], &["ghost".to_string()]).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn created_directories_carry_the_configured_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let r = resolver(&tmp).with_dir_mode(0o755);
        r.store(&png_file(), "deep/cat.png", "thumb").unwrap();

        let dir = tmp.path().join("media/cache/thumb/deep");
        let mode = std::fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
