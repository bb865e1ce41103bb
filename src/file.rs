//! File value types: in-memory blobs, on-disk paths, and managed temp files.
//!
//! [`File`] is the unit the pipeline passes around: a byte source (blob or
//! path) plus resolved [`Attributes`]. It is immutable with respect to
//! attributes — "setting" them produces a new value via
//! [`File::with_attributes`], so files can be shared across concurrent
//! requests without defensive copying.
//!
//! [`TempFile`] is the bridge that lets content sniffers (which want a real
//! path) examine in-memory bytes: acquire a uniquely named file under the temp
//! root, write into it, and release. Acquisition happens under a blocking lock
//! and the backing file is deleted on release or drop, whichever comes first.

use crate::attributes::{Attributes, ContentType, Extension};
use crate::lock::{IdentityContext, LockManager};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("file operation failed on {path}: {source}")]
    Operation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("temporary file must be released first: {0}")]
    AlreadyAcquired(String),
    #[error("temporary file is not acquired: {0}")]
    NotAcquired(String),
}

fn op_err(path: &Path, source: std::io::Error) -> FileError {
    FileError::Operation {
        path: path.to_path_buf(),
        source,
    }
}

/// Where a file's bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// Bytes held in memory.
    Blob(Vec<u8>),
    /// Bytes on disk; content accessors proxy to I/O.
    Path(PathBuf),
}

/// A byte source with its resolved attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    source: FileSource,
    attributes: Attributes,
}

impl File {
    /// An in-memory file with known attributes.
    pub fn blob(contents: impl Into<Vec<u8>>, attributes: Attributes) -> Self {
        Self {
            source: FileSource::Blob(contents.into()),
            attributes,
        }
    }

    /// An in-memory file whose attributes are not yet resolved.
    pub fn blob_untyped(contents: impl Into<Vec<u8>>) -> Self {
        Self::blob(contents, Attributes::default())
    }

    /// An on-disk file with known attributes.
    pub fn path(path: impl Into<PathBuf>, attributes: Attributes) -> Self {
        Self {
            source: FileSource::Path(path.into()),
            attributes,
        }
    }

    /// An on-disk file whose attributes are not yet resolved.
    pub fn path_untyped(path: impl Into<PathBuf>) -> Self {
        Self::path(path, Attributes::default())
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    pub fn is_blob(&self) -> bool {
        matches!(self.source, FileSource::Blob(_))
    }

    /// Backing path, when the source is on disk.
    pub fn file_path(&self) -> Option<&Path> {
        match &self.source {
            FileSource::Path(path) => Some(path),
            FileSource::Blob(_) => None,
        }
    }

    /// The file's bytes. Blobs return their buffer; path sources read disk.
    pub fn contents(&self) -> Result<Vec<u8>, FileError> {
        match &self.source {
            FileSource::Blob(bytes) => Ok(bytes.clone()),
            FileSource::Path(path) => std::fs::read(path).map_err(|e| op_err(path, e)),
        }
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn content_type(&self) -> &ContentType {
        self.attributes.content_type()
    }

    pub fn extension(&self) -> &Extension {
        self.attributes.extension()
    }

    pub fn has_content_type(&self) -> bool {
        self.content_type().is_valid()
    }

    pub fn has_extension(&self) -> bool {
        self.extension().is_valid()
    }

    /// A new file over the same source carrying `attributes`.
    pub fn with_attributes(&self, attributes: Attributes) -> Self {
        Self {
            source: self.source.clone(),
            attributes,
        }
    }

    pub fn exists_on_disk(&self) -> bool {
        self.file_path().is_some_and(Path::exists)
    }

    pub fn is_readable(&self) -> bool {
        match &self.source {
            FileSource::Blob(_) => true,
            FileSource::Path(path) => std::fs::File::open(path).is_ok(),
        }
    }

    pub fn is_writable(&self) -> bool {
        match &self.source {
            FileSource::Blob(_) => true,
            FileSource::Path(path) => std::fs::OpenOptions::new()
                .append(true)
                .open(path)
                .is_ok(),
        }
    }

    /// Human-oriented description used in error messages: the backing path for
    /// on-disk sources, `"blob"` for in-memory ones.
    pub fn describe(&self) -> String {
        match &self.source {
            FileSource::Blob(_) => "blob".to_string(),
            FileSource::Path(path) => format!("\"{}\"", path.display()),
        }
    }
}

/// Filename prefix for every temp file the pipeline creates.
const TEMP_PREFIX: &str = "darkroom";

/// A uniquely named temporary file with an explicit acquire/release lifecycle.
///
/// The backing file is named `<prefix>-<context>-<random>` under `root`
/// (default: the system temp dir). Dropping an acquired instance deletes the
/// backing file, so early returns and panics can't leak temp files.
pub struct TempFile {
    context: String,
    root: PathBuf,
    file: Option<NamedTempFile>,
}

impl TempFile {
    pub fn new(context: &str) -> Self {
        Self::with_root(context, std::env::temp_dir())
    }

    pub fn with_root(context: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            context: context.to_string(),
            root: root.into(),
            file: None,
        }
    }

    pub fn is_acquired(&self) -> bool {
        self.file.is_some()
    }

    /// Backing path while acquired.
    pub fn file_path(&self) -> Option<&Path> {
        self.file.as_ref().map(NamedTempFile::path)
    }

    /// Allocate the backing file. Fails if already acquired.
    ///
    /// Allocation runs under a blocking lock keyed by this instance's
    /// identity: the lock guards this instance's own acquire against
    /// concurrent use, not the context string (see [`LockContext`]).
    ///
    /// [`LockContext`]: crate::lock::LockContext
    pub fn acquire(&mut self, locks: &LockManager) -> Result<&Path, FileError> {
        if self.is_acquired() {
            return Err(FileError::AlreadyAcquired(self.context.clone()));
        }

        let file = locks.with_lock(IdentityContext(self), || {
            tempfile::Builder::new()
                .prefix(&format!("{TEMP_PREFIX}-{}-", self.context))
                .tempfile_in(&self.root)
                .map_err(|e| op_err(&self.root, e))
        })?;

        self.file = Some(file);
        Ok(self.file.as_ref().map(NamedTempFile::path).unwrap())
    }

    /// Write (or append) bytes, acquiring first if needed.
    pub fn set_contents(
        &mut self,
        contents: &[u8],
        append: bool,
        locks: &LockManager,
    ) -> Result<(), FileError> {
        if !self.is_acquired() {
            self.acquire(locks)?;
        }
        let path = self.file.as_ref().unwrap().path().to_path_buf();
        let mut options = std::fs::OpenOptions::new();
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let mut file = options.open(&path).map_err(|e| op_err(&path, e))?;
        file.write_all(contents).map_err(|e| op_err(&path, e))
    }

    /// Delete the backing file and clear the handle. No-op when unacquired.
    pub fn release(&mut self) -> Result<(), FileError> {
        if let Some(file) = self.file.take() {
            let path = file.path().to_path_buf();
            file.close().map_err(|e| op_err(&path, e))?;
        }
        Ok(())
    }

    /// View the acquired temp file as a pipeline [`File`].
    pub fn as_file(&self) -> Result<File, FileError> {
        self.file_path()
            .map(File::path_untyped)
            .ok_or_else(|| FileError::NotAcquired(self.context.clone()))
    }
}

// NamedTempFile deletes its backing file on drop; nothing extra needed here,
// but the lifecycle contract (release on every exit path) lives in this type,
// so make it explicit.
impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn image_attrs() -> Attributes {
        Attributes::new(ContentType::parse("image/png"), Extension::new("png"))
    }

    #[test]
    fn blob_contents_round_trip() {
        let file = File::blob(b"abc".to_vec(), image_attrs());
        assert!(file.is_blob());
        assert_eq!(file.contents().unwrap(), b"abc");
        assert!(file.has_content_type());
        assert!(file.has_extension());
        assert_eq!(file.describe(), "blob");
    }

    #[test]
    fn path_contents_read_from_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f.png");
        std::fs::write(&path, b"pixels").unwrap();

        let file = File::path_untyped(&path);
        assert!(!file.is_blob());
        assert_eq!(file.contents().unwrap(), b"pixels");
        assert!(file.exists_on_disk());
        assert!(file.is_readable());
        assert!(!file.has_content_type());
    }

    #[test]
    fn missing_path_contents_is_operation_error() {
        let file = File::path_untyped("/no/such/file.png");
        assert!(matches!(
            file.contents(),
            Err(FileError::Operation { .. })
        ));
        assert!(!file.exists_on_disk());
    }

    #[test]
    fn with_attributes_produces_new_value() {
        let original = File::blob_untyped(b"abc".to_vec());
        let attributed = original.with_attributes(image_attrs());

        assert!(!original.has_content_type());
        assert!(attributed.has_content_type());
        assert_eq!(attributed.contents().unwrap(), b"abc");
    }

    #[test]
    fn temp_acquire_creates_prefixed_file() {
        let tmp = TempDir::new().unwrap();
        let locks = LockManager::new();
        let mut temp = TempFile::with_root("attr-resolver", tmp.path());

        let path = temp.acquire(&locks).unwrap().to_path_buf();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("darkroom-attr-resolver-"), "{name}");
    }

    #[test]
    fn temp_reacquire_before_release_fails() {
        let tmp = TempDir::new().unwrap();
        let locks = LockManager::new();
        let mut temp = TempFile::with_root("ctx", tmp.path());

        temp.acquire(&locks).unwrap();
        assert!(matches!(
            temp.acquire(&locks),
            Err(FileError::AlreadyAcquired(_))
        ));
    }

    #[test]
    fn temp_release_deletes_backing_file() {
        let tmp = TempDir::new().unwrap();
        let locks = LockManager::new();
        let mut temp = TempFile::with_root("ctx", tmp.path());

        let path = temp.acquire(&locks).unwrap().to_path_buf();
        temp.release().unwrap();
        assert!(!path.exists());
        assert!(!temp.is_acquired());

        // release is idempotent, and the slot can be reused
        temp.release().unwrap();
        temp.acquire(&locks).unwrap();
    }

    #[test]
    fn temp_drop_deletes_backing_file() {
        let tmp = TempDir::new().unwrap();
        let locks = LockManager::new();
        let path = {
            let mut temp = TempFile::with_root("ctx", tmp.path());
            temp.acquire(&locks).unwrap().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn temp_set_contents_acquires_lazily() {
        let tmp = TempDir::new().unwrap();
        let locks = LockManager::new();
        let mut temp = TempFile::with_root("ctx", tmp.path());

        temp.set_contents(b"hello", false, &locks).unwrap();
        assert!(temp.is_acquired());
        let path = temp.file_path().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"hello");

        temp.set_contents(b" world", true, &locks).unwrap();
        assert_eq!(
            std::fs::read(temp.file_path().unwrap()).unwrap(),
            b"hello world"
        );

        temp.set_contents(b"reset", false, &locks).unwrap();
        assert_eq!(std::fs::read(temp.file_path().unwrap()).unwrap(), b"reset");
    }

    #[test]
    fn temp_as_file_requires_acquisition() {
        let tmp = TempDir::new().unwrap();
        let locks = LockManager::new();
        let mut temp = TempFile::with_root("ctx", tmp.path());

        assert!(matches!(temp.as_file(), Err(FileError::NotAcquired(_))));
        temp.acquire(&locks).unwrap();
        let file = temp.as_file().unwrap();
        assert!(file.exists_on_disk());
    }
}
