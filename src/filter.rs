//! Filter application: running a named chain of image transformations over a
//! source file and exporting the result.
//!
//! [`FilterManager`] holds two registries — [`FilterLoader`]s that operate on
//! decoded image handles, and [`PostProcessor`]s that operate on the encoded
//! file afterwards. Both are validated fail-fast: every unknown name in a
//! definition is collected and reported in one error before any work starts,
//! so a half-applied chain can never reach the cache.
//!
//! Export picks the definition's `format`, falling back to the source
//! extension. When that changes the extension, the output's content type is
//! re-derived by sniffing the encoded bytes; otherwise the source attributes
//! are carried over untouched.

use crate::attributes::resolver::FileAttributesResolver;
use crate::attributes::{Attributes, Extension};
use crate::file::{File, FileError, TempFile};
use crate::filter_config::{
    FilterConfigError, FilterConfiguration, FilterDefinition, FilterStep,
};
use crate::imaging::calculations::{
    center_crop_origin, fill_dimensions, fit_dimensions, scaled_dimensions,
};
use crate::imaging::{EncodeOptions, ImageHandle, ImageProcessor, ImagingError};
use crate::lock::LockManager;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;
use toml::{Table, Value};

#[derive(Error, Debug)]
pub enum FilterError {
    #[error(transparent)]
    Config(#[from] FilterConfigError),
    #[error("could not find filter(s): {}", quoted(.0))]
    UnknownFilters(Vec<String>),
    #[error("could not find post-processor(s): {}", quoted(.0))]
    UnknownPostProcessors(Vec<String>),
    #[error("invalid option \"{option}\" for filter \"{filter}\": {reason}")]
    InvalidOption {
        filter: String,
        option: String,
        reason: String,
    },
    #[error("filter set declares no format and the source has no extension")]
    MissingTargetFormat,
    #[error("post-processor \"{name}\" failed: {reason}")]
    PostProcess { name: String, reason: String },
    #[error(transparent)]
    Imaging(#[from] ImagingError),
    #[error(transparent)]
    File(#[from] FileError),
}

fn quoted(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("\"{n}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One transformation over a decoded image. Takes the handle by value; the
/// previous working image is dropped as soon as its successor exists.
pub trait FilterLoader: Send + Sync {
    fn apply(
        &self,
        image: Box<dyn ImageHandle>,
        options: &Table,
    ) -> Result<Box<dyn ImageHandle>, FilterError>;
}

/// A transformation over the encoded output file (optimizers, strippers).
pub trait PostProcessor: Send + Sync {
    fn process(&self, file: File, options: &Table) -> Result<File, FilterError>;
}

pub struct FilterManager {
    config: Arc<FilterConfiguration>,
    processor: Arc<dyn ImageProcessor>,
    resolver: FileAttributesResolver,
    loaders: HashMap<String, Arc<dyn FilterLoader>>,
    post_processors: HashMap<String, Arc<dyn PostProcessor>>,
}

impl FilterManager {
    pub fn new(
        config: Arc<FilterConfiguration>,
        processor: Arc<dyn ImageProcessor>,
        resolver: FileAttributesResolver,
    ) -> Self {
        Self {
            config,
            processor,
            resolver,
            loaders: HashMap::new(),
            post_processors: HashMap::new(),
        }
    }

    /// Manager with the built-in geometry filters registered.
    pub fn standard(
        config: Arc<FilterConfiguration>,
        processor: Arc<dyn ImageProcessor>,
        resolver: FileAttributesResolver,
    ) -> Self {
        let mut manager = Self::new(config, processor, resolver);
        manager.add_loader("thumbnail", Arc::new(ThumbnailFilterLoader));
        manager.add_loader("resize", Arc::new(ResizeFilterLoader));
        manager.add_loader("relative_resize", Arc::new(RelativeResizeFilterLoader));
        manager
    }

    pub fn add_loader(&mut self, name: impl Into<String>, loader: Arc<dyn FilterLoader>) {
        self.loaders.insert(name.into(), loader);
    }

    pub fn add_post_processor(
        &mut self,
        name: impl Into<String>,
        processor: Arc<dyn PostProcessor>,
    ) {
        self.post_processors.insert(name.into(), processor);
    }

    /// Every step name in `steps` missing from `registry`, in declared order.
    fn missing_names<T: ?Sized>(
        steps: &[FilterStep],
        registry: &HashMap<String, Arc<T>>,
    ) -> Vec<String> {
        steps
            .iter()
            .filter(|step| !registry.contains_key(&step.name))
            .map(|step| step.name.clone())
            .collect()
    }

    /// Apply `definition` to `file`: filter chain, export, post-processors.
    pub fn apply(&self, file: File, definition: &FilterDefinition) -> Result<File, FilterError> {
        let missing = Self::missing_names(&definition.filters, &self.loaders);
        if !missing.is_empty() {
            return Err(FilterError::UnknownFilters(missing));
        }
        let missing = Self::missing_names(&definition.post_processors, &self.post_processors);
        if !missing.is_empty() {
            return Err(FilterError::UnknownPostProcessors(missing));
        }

        let mut image = self.processor.load(&file.contents()?)?;
        for step in &definition.filters {
            let loader = &self.loaders[&step.name];
            image = loader.apply(image, &step.options)?;
        }

        let exported = self.export(&file, image.as_ref(), definition)?;
        drop(image);

        let mut output = exported;
        for step in &definition.post_processors {
            let processor = &self.post_processors[&step.name];
            output = processor.process(output, &step.options)?;
        }
        Ok(output)
    }

    /// Apply the named filter set with a runtime override table.
    pub fn apply_filter(
        &self,
        file: File,
        filter: &str,
        runtime: &Table,
    ) -> Result<File, FilterError> {
        let definition = self.config.get_merged(filter, runtime)?;
        self.apply(file, &definition)
    }

    fn export(
        &self,
        source: &File,
        image: &dyn ImageHandle,
        definition: &FilterDefinition,
    ) -> Result<File, FilterError> {
        let target = definition
            .format
            .as_deref()
            .or(source.extension().name())
            .ok_or(FilterError::MissingTargetFormat)?
            .to_string();

        let options = EncodeOptions {
            quality: definition.quality,
            jpeg_quality: definition.jpeg_quality,
            png_compression_level: definition.png_compression_level,
            png_compression_filter: definition.png_compression_filter.clone(),
            animated: definition.animated && target == "gif",
        };
        let bytes = image.encode(&target, &options)?;

        // Sniffing costs a temp file round trip; skip it when the format
        // didn't change.
        let attributes = if source.extension().is_match(&target) {
            source.attributes().clone()
        } else {
            let resolved = self.resolver.resolve_blob(&bytes)?;
            Attributes::new(resolved.content_type().clone(), Extension::new(&target))
        };
        Ok(File::blob(bytes, attributes))
    }
}

/// Option accessors shared by the built-in loaders.
fn invalid_option(filter: &str, option: &str, reason: &str) -> FilterError {
    FilterError::InvalidOption {
        filter: filter.to_string(),
        option: option.to_string(),
        reason: reason.to_string(),
    }
}

fn size_option(filter: &str, options: &Table) -> Result<(u32, u32), FilterError> {
    let values = options
        .get("size")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid_option(filter, "size", "expected an array of two integers"))?;
    match values.as_slice() {
        [Value::Integer(w), Value::Integer(h)] => {
            match (u32::try_from(*w), u32::try_from(*h)) {
                (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok((w, h)),
                _ => Err(invalid_option(
                    filter,
                    "size",
                    "expected two positive integers in range",
                )),
            }
        }
        _ => Err(invalid_option(
            filter,
            "size",
            "expected two positive integers",
        )),
    }
}

/// `thumbnail`: fit the target box. Mode `outbound` (default) fills the box
/// and center-crops the excess; `inset` scales to fit inside it.
pub struct ThumbnailFilterLoader;

impl FilterLoader for ThumbnailFilterLoader {
    fn apply(
        &self,
        image: Box<dyn ImageHandle>,
        options: &Table,
    ) -> Result<Box<dyn ImageHandle>, FilterError> {
        let target = size_option("thumbnail", options)?;
        let mode = options
            .get("mode")
            .and_then(Value::as_str)
            .unwrap_or("outbound");

        let dims = image.dimensions();
        let source = (dims.width, dims.height);
        match mode {
            "outbound" => {
                let (w, h) = fill_dimensions(source, target);
                let scaled = image.scale(w, h)?;
                let (x, y) = center_crop_origin((w, h), target);
                Ok(scaled.crop(x, y, target.0.min(w), target.1.min(h))?)
            }
            "inset" => {
                let (w, h) = fit_dimensions(source, target);
                Ok(image.scale(w, h)?)
            }
            other => Err(invalid_option(
                "thumbnail",
                "mode",
                &format!("unknown mode \"{other}\""),
            )),
        }
    }
}

/// `resize`: scale to fit inside the target box, preserving aspect ratio.
pub struct ResizeFilterLoader;

impl FilterLoader for ResizeFilterLoader {
    fn apply(
        &self,
        image: Box<dyn ImageHandle>,
        options: &Table,
    ) -> Result<Box<dyn ImageHandle>, FilterError> {
        let target = size_option("resize", options)?;
        let dims = image.dimensions();
        let (w, h) = fit_dimensions((dims.width, dims.height), target);
        Ok(image.scale(w, h)?)
    }
}

/// `relative_resize`: scale both dimensions by a factor.
pub struct RelativeResizeFilterLoader;

impl FilterLoader for RelativeResizeFilterLoader {
    fn apply(
        &self,
        image: Box<dyn ImageHandle>,
        options: &Table,
    ) -> Result<Box<dyn ImageHandle>, FilterError> {
        let factor = options
            .get("scale")
            .and_then(Value::as_float)
            .or_else(|| options.get("scale").and_then(Value::as_integer).map(|v| v as f64))
            .ok_or_else(|| invalid_option("relative_resize", "scale", "expected a number"))?;
        if factor <= 0.0 {
            return Err(invalid_option(
                "relative_resize",
                "scale",
                "factor must be positive",
            ));
        }
        let dims = image.dimensions();
        let (w, h) = scaled_dimensions((dims.width, dims.height), factor);
        Ok(image.scale(w, h)?)
    }
}

/// Write `file`'s bytes to a temp file, run `executable` with `args` plus the
/// temp path as the final argument, and read the rewritten bytes back.
///
/// The tool's own failure signal is its exit status; some optimizers also
/// report problems on stdout while exiting zero, so an `ERROR` marker there
/// counts as failure too.
fn optimize_in_place(
    name: &str,
    file: &File,
    executable: &Path,
    args: &[String],
    temp_root: Option<&Path>,
    locks: &LockManager,
) -> Result<Vec<u8>, FilterError> {
    let context = format!("post-{name}");
    let mut temp = match temp_root {
        Some(root) => TempFile::with_root(&context, root),
        None => TempFile::new(&context),
    };
    let path = temp.acquire(locks)?.to_path_buf();
    temp.set_contents(&file.contents()?, false, locks)?;

    let output = Command::new(executable)
        .args(args)
        .arg(&path)
        .output()
        .map_err(|e| FilterError::PostProcess {
            name: name.to_string(),
            reason: format!("could not run {}: {e}", executable.display()),
        })?;
    if !output.status.success() || String::from_utf8_lossy(&output.stdout).contains("ERROR") {
        return Err(FilterError::PostProcess {
            name: name.to_string(),
            reason: format!(
                "{} reported {}: {}",
                executable.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    let optimized = temp.as_file()?.contents()?;
    temp.release()?;
    Ok(optimized)
}

/// `jpegoptim`: shells out to the jpegoptim binary over the encoded output.
/// Files that are not JPEGs pass through untouched.
///
/// Options: `strip_all` (default true, `--strip-all`), `max` (quality cap,
/// `--max=N`), `progressive` (default true; `--all-progressive` vs
/// `--all-normal`).
pub struct JpegOptimPostProcessor {
    executable: PathBuf,
    strip_all: bool,
    max_quality: Option<u32>,
    progressive: bool,
    temp_root: Option<PathBuf>,
    locks: Arc<LockManager>,
}

impl JpegOptimPostProcessor {
    pub fn new(locks: Arc<LockManager>) -> Self {
        Self {
            executable: PathBuf::from("jpegoptim"),
            strip_all: true,
            max_quality: None,
            progressive: true,
            temp_root: None,
            locks,
        }
    }

    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = path.into();
        self
    }

    pub fn with_max_quality(mut self, max: u32) -> Self {
        self.max_quality = Some(max);
        self
    }

    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }
}

impl PostProcessor for JpegOptimPostProcessor {
    fn process(&self, file: File, options: &Table) -> Result<File, FilterError> {
        if !file.content_type().is_sub_type("jpeg") && !file.content_type().is_sub_type("jpg") {
            return Ok(file);
        }

        let mut args = Vec::new();
        if options
            .get("strip_all")
            .and_then(Value::as_bool)
            .unwrap_or(self.strip_all)
        {
            args.push("--strip-all".to_string());
        }
        let max = match options.get("max") {
            Some(Value::Integer(v)) => Some(u32::try_from(*v).map_err(|_| {
                invalid_option("jpegoptim", "max", "expected a non-negative integer")
            })?),
            _ => self.max_quality,
        };
        if let Some(max) = max {
            args.push(format!("--max={max}"));
        }
        if options
            .get("progressive")
            .and_then(Value::as_bool)
            .unwrap_or(self.progressive)
        {
            args.push("--all-progressive".to_string());
        } else {
            args.push("--all-normal".to_string());
        }

        let bytes = optimize_in_place(
            "jpegoptim",
            &file,
            &self.executable,
            &args,
            self.temp_root.as_deref(),
            &self.locks,
        )?;
        Ok(File::blob(bytes, file.attributes().clone()))
    }
}

/// `optipng`: shells out to the optipng binary over the encoded output.
/// Files that are not PNGs pass through untouched.
///
/// Options: `level` (0–7, default 7, `-oN`) and `strip_all` (default true,
/// `-strip all`).
pub struct OptiPngPostProcessor {
    executable: PathBuf,
    level: u32,
    strip_all: bool,
    temp_root: Option<PathBuf>,
    locks: Arc<LockManager>,
}

impl OptiPngPostProcessor {
    pub fn new(locks: Arc<LockManager>) -> Self {
        Self {
            executable: PathBuf::from("optipng"),
            level: 7,
            strip_all: true,
            temp_root: None,
            locks,
        }
    }

    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = path.into();
        self
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }
}

impl PostProcessor for OptiPngPostProcessor {
    fn process(&self, file: File, options: &Table) -> Result<File, FilterError> {
        if !file.content_type().is_sub_type("png") {
            return Ok(file);
        }

        let level = match options.get("level") {
            Some(Value::Integer(v)) => u32::try_from(*v).ok().filter(|l| *l <= 7).ok_or_else(
                || invalid_option("optipng", "level", "expected a level between 0 and 7"),
            )?,
            _ => self.level,
        };
        let mut args = vec![format!("-o{level}")];
        if options
            .get("strip_all")
            .and_then(Value::as_bool)
            .unwrap_or(self.strip_all)
        {
            args.push("-strip".to_string());
            args.push("all".to_string());
        }

        let bytes = optimize_in_place(
            "optipng",
            &file,
            &self.executable,
            &args,
            self.temp_root.as_deref(),
            &self.locks,
        )?;
        Ok(File::blob(bytes, file.attributes().clone()))
    }
}
