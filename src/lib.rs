//! # Darkroom
//!
//! An image processing and caching pipeline: request a source image through a
//! named filter set and get back the URL of a processed rendition, cached so
//! the pixel work happens once.
//!
//! # Architecture: Cache-First Request Flow
//!
//! Every request takes the same path through [`service::ImageService::get`]:
//!
//! ```text
//! 1. Cache check    is the rendition already stored?  →  return its URL
//! 2. Load           loader finds the source, attributes are resolved/validated
//! 3. Filter         decoded image runs the set's filter chain, then export
//! 4. Store+resolve  rendition persisted by the cache resolver, URL returned
//! ```
//!
//! Each stage is owned by one manager with a registry of pluggable parts:
//! loaders for stage 2, filter loaders and post-processors for stage 3, cache
//! resolvers for stage 4. Filter sets are declared in TOML and select their
//! parts by name.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`attributes`] | Content type / extension value types, guesser chains, and the resolver that attributes files |
//! | [`file`] | The `File` value passed through the pipeline (blob or path + attributes) and managed temp files |
//! | [`lock`] | String-keyed lock manager serializing filesystem mutations |
//! | [`loader`] | Source image loaders — `FilesystemLoader` plus the trait seam for custom backends |
//! | [`data`] | `DataManager` — picks the loader per filter set and gates on `image/*` |
//! | [`filter_config`] | TOML filter set definitions and runtime-override merging |
//! | [`filter`] | `FilterManager` — filter chain execution, export, post-processors |
//! | [`imaging`] | The `ImageProcessor`/`ImageHandle` seam and the pure-Rust backend over the `image` crate |
//! | [`cache`] | Cache resolvers (web path, object storage, no-op) and the routing `CacheManager` |
//! | [`service`] | `ImageService` — ties the managers into the request flow above |
//!
//! # Design Decisions
//!
//! ## Immutable Files
//!
//! [`file::File`] never mutates: resolving attributes produces a new value
//! over the same byte source. Requests can share sources freely and a
//! half-attributed file can't leak past the applier.
//!
//! ## Traits at the Seams
//!
//! Everything replaceable sits behind a small trait — loaders, filter
//! loaders, post-processors, cache resolvers, the object store, and the image
//! backend itself. The managers only know registries of names; tests swap in
//! recording fakes and production swaps in real backends without touching the
//! pipeline.
//!
//! ## Pure-Rust Imaging
//!
//! The production backend uses the `image` crate (Lanczos3 resampling,
//! per-format encoders) — no ImageMagick, no system libraries. The binary is
//! self-contained.
//!
//! ## Explicit State, No Globals
//!
//! Locks live in a [`lock::LockManager`] instance passed where needed, never
//! in statics. Test isolation is `LockManager::new()` (or `reset()`), not
//! process-global cleanup.

pub mod attributes;
pub mod cache;
pub mod data;
pub mod file;
pub mod filter;
pub mod filter_config;
pub mod imaging;
pub mod loader;
pub mod lock;
pub mod service;
