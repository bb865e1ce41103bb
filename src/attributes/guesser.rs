//! Content-type and extension guesser chains.
//!
//! A guesser is a small strategy object that infers one attribute from a
//! subject: content-type guessers look at a filesystem path, extension
//! guessers look at a resolved MIME string. Guessers are composed into chains
//! with last-registered-wins priority — `register` prepends, `guess` scans
//! most-recently-registered first and returns the first hit.
//!
//! Chains are built once at startup and read-only afterwards; concurrent
//! `guess` calls are safe as long as the guessers themselves are stateless.
//!
//! The default chain sniffs magic bytes first and falls back to a filename
//! extension table, so renamed files resolve by content and extension-less
//! blobs still resolve when their bytes are recognizable.

use std::path::Path;

/// Infers a MIME string for the file at `path`, or `None` when it can't tell.
pub trait ContentTypeGuesser: Send + Sync {
    fn guess(&self, path: &Path) -> Option<String>;
}

/// Infers a file extension from a MIME string, or `None` when it can't tell.
pub trait ExtensionGuesser: Send + Sync {
    fn guess(&self, content_type: &str) -> Option<String>;
}

/// Ordered chain of [`ContentTypeGuesser`]s, most-recently-registered first.
#[derive(Default)]
pub struct ContentTypeGuesserChain {
    guessers: Vec<Box<dyn ContentTypeGuesser>>,
}

impl ContentTypeGuesserChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Magic-byte sniffer backed by an extension-table fallback.
    pub fn standard() -> Self {
        let mut chain = Self::new();
        chain.register(Box::new(PathExtensionGuesser));
        chain.register(Box::new(MagicByteGuesser));
        chain
    }

    /// Prepend a guesser. The newest registration is consulted first.
    pub fn register(&mut self, guesser: Box<dyn ContentTypeGuesser>) {
        self.guessers.insert(0, guesser);
    }

    pub fn guess(&self, path: &Path) -> Option<String> {
        self.guessers.iter().find_map(|g| g.guess(path))
    }
}

/// Ordered chain of [`ExtensionGuesser`]s, most-recently-registered first.
#[derive(Default)]
pub struct ExtensionGuesserChain {
    guessers: Vec<Box<dyn ExtensionGuesser>>,
}

impl ExtensionGuesserChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        let mut chain = Self::new();
        chain.register(Box::new(MimeExtensionGuesser));
        chain
    }

    /// Prepend a guesser. The newest registration is consulted first.
    pub fn register(&mut self, guesser: Box<dyn ExtensionGuesser>) {
        self.guessers.insert(0, guesser);
    }

    pub fn guess(&self, content_type: &str) -> Option<String> {
        self.guessers.iter().find_map(|g| g.guess(content_type))
    }
}

/// MIME strings for the formats the pipeline works with, paired with their
/// canonical extension and any alternate spellings seen in the wild.
const KNOWN_TYPES: &[(&str, &str, &[&str])] = &[
    ("image/jpeg", "jpg", &["jpeg", "jpe"]),
    ("image/png", "png", &[]),
    ("image/gif", "gif", &[]),
    ("image/webp", "webp", &[]),
    ("image/avif", "avif", &[]),
    ("image/bmp", "bmp", &[]),
    ("image/tiff", "tiff", &["tif"]),
    ("image/heic", "heic", &["heif"]),
    ("image/svg+xml", "svg", &[]),
    ("application/pdf", "pdf", &[]),
    ("text/plain", "txt", &[]),
];

/// Sniffs the content type from a file's leading bytes.
///
/// Reads at most 32 bytes. Unreadable paths and unknown signatures both
/// yield `None` so the next guesser in the chain gets a shot.
pub struct MagicByteGuesser;

impl ContentTypeGuesser for MagicByteGuesser {
    fn guess(&self, path: &Path) -> Option<String> {
        use std::io::Read;

        let mut head = [0u8; 32];
        let mut file = std::fs::File::open(path).ok()?;
        let n = file.read(&mut head).ok()?;
        sniff(&head[..n]).map(str::to_string)
    }
}

/// Identify a format by its signature bytes.
fn sniff(data: &[u8]) -> Option<&'static str> {
    if data.len() < 4 {
        return None;
    }

    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if data.starts_with(b"BM") {
        return Some("image/bmp");
    }
    if data.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || data.starts_with(&[0x4D, 0x4D, 0x00, 0x2A]) {
        return Some("image/tiff");
    }
    if data.starts_with(b"%PDF-") {
        return Some("application/pdf");
    }
    // ISO-BMFF brands: ....ftyp<brand>
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        match &data[8..12] {
            b"avif" | b"avis" => return Some("image/avif"),
            b"heic" | b"heix" | b"mif1" => return Some("image/heic"),
            _ => {}
        }
    }
    None
}

/// Maps a filename extension to a MIME string. Fallback for files whose bytes
/// aren't sniffable (or not on disk at all).
pub struct PathExtensionGuesser;

impl ContentTypeGuesser for PathExtensionGuesser {
    fn guess(&self, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        KNOWN_TYPES
            .iter()
            .find(|(_, canonical, alternates)| *canonical == ext || alternates.contains(&&*ext))
            .map(|(mime, _, _)| mime.to_string())
    }
}

/// Maps a MIME string to its canonical extension.
pub struct MimeExtensionGuesser;

impl ExtensionGuesser for MimeExtensionGuesser {
    fn guess(&self, content_type: &str) -> Option<String> {
        KNOWN_TYPES
            .iter()
            .find(|(mime, _, _)| *mime == content_type)
            .map(|(_, ext, _)| ext.to_string())
    }
}
