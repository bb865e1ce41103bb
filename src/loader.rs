//! Source image loaders.
//!
//! A [`Loader`] turns a request path into a [`File`]. The pipeline treats
//! loaders as pluggable collaborators — the [`DataManager`] picks one by name
//! per filter set — and ships [`FilesystemLoader`] for images on local disk.
//!
//! [`DataManager`]: crate::data::DataManager

use crate::file::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("source image not found: \"{0}\"")]
    NotLoadable(String),
}

/// Locates source images by request path.
pub trait Loader: Send + Sync {
    fn find(&self, path: &str) -> Result<File, LoaderError>;
}

/// Loads images from one or more root directories on local disk.
///
/// Roots are searched in order; the first root containing the path wins.
/// Request paths are confined to their root: a path that escapes via `..` or
/// symlinks resolves outside the canonicalized root and is treated as not
/// loadable, never as a disk read elsewhere.
pub struct FilesystemLoader {
    roots: Vec<PathBuf>,
}

impl FilesystemLoader {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn single(root: impl Into<PathBuf>) -> Self {
        Self::new(vec![root.into()])
    }

    fn locate(&self, path: &str) -> Option<PathBuf> {
        let relative = path.trim_start_matches('/');
        for root in &self.roots {
            let candidate = root.join(relative);
            let Ok(resolved) = candidate.canonicalize() else {
                continue;
            };
            let Ok(root) = root.canonicalize() else {
                continue;
            };
            if resolved.starts_with(&root) && resolved.is_file() {
                return Some(resolved);
            }
        }
        None
    }
}

impl Loader for FilesystemLoader {
    fn find(&self, path: &str) -> Result<File, LoaderError> {
        let resolved = self
            .locate(path)
            .ok_or_else(|| LoaderError::NotLoadable(path.to_string()))?;
        if !is_readable(&resolved) {
            return Err(LoaderError::NotLoadable(path.to_string()));
        }
        Ok(File::path_untyped(resolved))
    }
}

fn is_readable(path: &Path) -> bool {
    std::fs::File::open(path).is_ok()
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn finds_file_under_root() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("photos")).unwrap();
        fs::write(tmp.path().join("photos/cat.jpg"), b"jpeg bytes").unwrap();

        let loader = FilesystemLoader::single(tmp.path());
        let file = loader.find("photos/cat.jpg").unwrap();
        assert_eq!(file.contents().unwrap(), b"jpeg bytes");
    }

    #[test]
    fn leading_slash_is_tolerated() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("cat.jpg"), b"x").unwrap();

        let loader = FilesystemLoader::single(tmp.path());
        assert!(loader.find("/cat.jpg").is_ok());
    }

    #[test]
    fn missing_file_is_not_loadable() {
        let tmp = TempDir::new().unwrap();
        let loader = FilesystemLoader::single(tmp.path());

        let err = loader.find("nope.jpg").unwrap_err();
        assert!(err.to_string().contains("nope.jpg"));
    }

    #[test]
    fn traversal_outside_root_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir(&root).unwrap();
        fs::write(tmp.path().join("secret.txt"), b"secret").unwrap();

        let loader = FilesystemLoader::single(&root);
        assert!(matches!(
            loader.find("../secret.txt"),
            Err(LoaderError::NotLoadable(_))
        ));
    }

    #[test]
    fn searches_roots_in_order() {
        let tmp_a = TempDir::new().unwrap();
        let tmp_b = TempDir::new().unwrap();
        fs::write(tmp_a.path().join("both.jpg"), b"from a").unwrap();
        fs::write(tmp_b.path().join("both.jpg"), b"from b").unwrap();
        fs::write(tmp_b.path().join("only-b.jpg"), b"b only").unwrap();

        let loader = FilesystemLoader::new(vec![
            tmp_a.path().to_path_buf(),
            tmp_b.path().to_path_buf(),
        ]);
        assert_eq!(loader.find("both.jpg").unwrap().contents().unwrap(), b"from a");
        assert_eq!(
            loader.find("only-b.jpg").unwrap().contents().unwrap(),
            b"b only"
        );
    }

    #[test]
    fn directory_path_is_not_loadable() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("dir")).unwrap();

        let loader = FilesystemLoader::single(tmp.path());
        assert!(loader.find("dir").is_err());
    }
}
