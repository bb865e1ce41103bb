//! Attribute resolution: turning a file into a valid (content type, extension)
//! pair, and enforcing that validity before the pipeline proceeds.
//!
//! Path-backed files are guessed directly from their path. Blob-backed files
//! have no path for the sniffers to open, so they go through the temporary
//! file bridge: acquire a temp file, write the bytes, guess from the temp
//! path, release. Cleanup is guaranteed on every exit path — the temp handle
//! deletes its backing file on drop even when resolution bails early.
//!
//! The resolver itself never fails on unguessable input; it hands back invalid
//! attributes and leaves enforcement to [`FileAttributesApplier`].

use crate::attributes::guesser::{ContentTypeGuesserChain, ExtensionGuesserChain};
use crate::attributes::{Attributes, ContentType, Extension};
use crate::file::{File, FileError, FileSource, TempFile};
use crate::lock::LockManager;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttributesError {
    #[error("unable to resolve content type attribute for file {0}")]
    InvalidContentType(String),
    #[error("unable to resolve extension attribute for file {0}")]
    InvalidExtension(String),
    #[error(transparent)]
    File(#[from] FileError),
}

/// Lock context string for the resolver's temp bridge files.
const TEMP_CONTEXT: &str = "attributes-resolver";

/// Resolves attributes for files and raw paths through the guesser chains.
pub struct FileAttributesResolver {
    content_type_chain: ContentTypeGuesserChain,
    extension_chain: ExtensionGuesserChain,
    locks: Arc<LockManager>,
    temp_root: Option<PathBuf>,
}

impl FileAttributesResolver {
    pub fn new(
        content_type_chain: ContentTypeGuesserChain,
        extension_chain: ExtensionGuesserChain,
        locks: Arc<LockManager>,
    ) -> Self {
        Self {
            content_type_chain,
            extension_chain,
            locks,
            temp_root: None,
        }
    }

    /// Resolver with the standard sniffing chains.
    pub fn standard(locks: Arc<LockManager>) -> Self {
        Self::new(
            ContentTypeGuesserChain::standard(),
            ExtensionGuesserChain::standard(),
            locks,
        )
    }

    /// Redirect the temp bridge away from the system temp dir.
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// Resolve attributes for a file. Blob sources go through the temp bridge.
    pub fn resolve(&self, file: &File) -> Result<Attributes, FileError> {
        match file.source() {
            FileSource::Path(path) => Ok(self.resolve_path(path)),
            FileSource::Blob(bytes) => self.resolve_blob(bytes),
        }
    }

    /// Resolve attributes from an on-disk path.
    ///
    /// The extension is guessed from the resolved content type string, not
    /// from the path — a mislabeled `.jpg` holding PNG bytes resolves to
    /// (`image/png`, `png`).
    pub fn resolve_path(&self, path: &Path) -> Attributes {
        let content_type = ContentType::parse_opt(self.content_type_chain.guess(path).as_deref());
        let extension = if content_type.is_valid() {
            self.extension_chain.guess(&content_type.to_string())
        } else {
            None
        };
        Attributes::new(content_type, Extension::from_opt(extension))
    }

    /// Resolve attributes for in-memory bytes via the temp file bridge.
    pub fn resolve_blob(&self, bytes: &[u8]) -> Result<Attributes, FileError> {
        let mut temp = match &self.temp_root {
            Some(root) => TempFile::with_root(TEMP_CONTEXT, root),
            None => TempFile::new(TEMP_CONTEXT),
        };
        temp.set_contents(bytes, false, &self.locks)?;
        let attributes = self.resolve_path(temp.file_path().unwrap());
        temp.release()?;
        Ok(attributes)
    }
}

/// Ensures a file carries valid attributes, resolving them when absent.
pub struct FileAttributesApplier {
    resolver: FileAttributesResolver,
}

impl FileAttributesApplier {
    pub fn new(resolver: FileAttributesResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &FileAttributesResolver {
        &self.resolver
    }

    /// Return `file` unchanged when it is already fully attributed; otherwise
    /// resolve the missing attributes and return a new file carrying them.
    ///
    /// A file with a valid content type but no extension keeps its content
    /// type; only the extension is taken from resolution.
    pub fn apply(&self, file: File) -> Result<File, AttributesError> {
        if file.has_content_type() && file.has_extension() {
            return Ok(file);
        }

        let resolved = self.resolver.resolve(&file)?;
        let content_type = if file.has_content_type() {
            file.content_type().clone()
        } else {
            resolved.content_type().clone()
        };
        let extension = resolved.extension().clone();

        if !content_type.is_valid() {
            tracing::error!(file = %file.describe(), "unable to resolve content type attribute");
            return Err(AttributesError::InvalidContentType(file.describe()));
        }
        if !extension.is_valid() {
            tracing::error!(file = %file.describe(), "unable to resolve extension attribute");
            return Err(AttributesError::InvalidExtension(file.describe()));
        }

        Ok(file.with_attributes(Attributes::new(content_type, extension)))
    }
}
