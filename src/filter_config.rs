//! Named filter set configuration.
//!
//! Filter sets are declared in TOML, one table per set under `[filters.<name>]`:
//!
//! ```toml
//! [filters.thumb.filters.thumbnail]
//! size = [120, 90]
//!
//! [filters.thumb]
//! quality = 85
//! format = "jpg"
//! cache = "web"
//! ```
//!
//! Steps under a set's `filters` / `post_processors` tables run in declaration
//! order (the TOML parser preserves it). At request time a caller may pass a
//! runtime override table, which deep-merges over the named definition:
//! scalars replace, nested tables merge key-by-key, and steps merge by name —
//! overridden steps keep their base position, unknown steps append.

use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use toml::{Table, Value};

#[derive(Error, Debug)]
pub enum FilterConfigError {
    #[error("could not parse filter configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("could not find filter set \"{0}\"")]
    UnknownFilterSet(String),
    #[error("step \"{step}\" in filter set \"{set}\" must be a table of options")]
    InvalidStep { set: String, step: String },
    #[error("option \"{key}\" is out of range")]
    OutOfRange { key: String },
}

/// One step of a filter or post-processor chain: a registered name plus its
/// options table.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterStep {
    pub name: String,
    pub options: Table,
}

impl FilterStep {
    pub fn new(name: impl Into<String>, options: Table) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }
}

/// A fully resolved filter set definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterDefinition {
    pub quality: u32,
    pub jpeg_quality: Option<u32>,
    pub png_compression_level: Option<u32>,
    pub png_compression_filter: Option<String>,
    pub format: Option<String>,
    pub animated: bool,
    pub data_loader: Option<String>,
    pub default_image: Option<String>,
    pub cache: Option<String>,
    pub filters: Vec<FilterStep>,
    pub post_processors: Vec<FilterStep>,
}

impl Default for FilterDefinition {
    fn default() -> Self {
        Self {
            quality: 100,
            jpeg_quality: None,
            png_compression_level: None,
            png_compression_filter: None,
            format: None,
            animated: false,
            data_loader: None,
            default_image: None,
            cache: None,
            filters: Vec::new(),
            post_processors: Vec::new(),
        }
    }
}

/// Serde shape of one `[filters.<name>]` table.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawDefinition {
    quality: Option<u32>,
    jpeg_quality: Option<u32>,
    png_compression_level: Option<u32>,
    png_compression_filter: Option<String>,
    format: Option<String>,
    animated: Option<bool>,
    data_loader: Option<String>,
    default_image: Option<String>,
    cache: Option<String>,
    #[serde(default)]
    filters: Table,
    #[serde(default)]
    post_processors: Table,
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    filters: HashMap<String, RawDefinition>,
    default_image: Option<String>,
    data_root: Option<Vec<String>>,
}

fn steps_from_table(set: &str, table: &Table) -> Result<Vec<FilterStep>, FilterConfigError> {
    table
        .iter()
        .map(|(name, value)| match value {
            Value::Table(options) => Ok(FilterStep::new(name, options.clone())),
            _ => Err(FilterConfigError::InvalidStep {
                set: set.to_string(),
                step: name.clone(),
            }),
        })
        .collect()
}

impl RawDefinition {
    fn resolve(self, set: &str) -> Result<FilterDefinition, FilterConfigError> {
        Ok(FilterDefinition {
            quality: self.quality.unwrap_or(100),
            jpeg_quality: self.jpeg_quality,
            png_compression_level: self.png_compression_level,
            png_compression_filter: self.png_compression_filter,
            format: self.format,
            animated: self.animated.unwrap_or(false),
            data_loader: self.data_loader,
            default_image: self.default_image,
            cache: self.cache,
            filters: steps_from_table(set, &self.filters)?,
            post_processors: steps_from_table(set, &self.post_processors)?,
        })
    }
}

/// The registry of named filter sets, plus pipeline-wide defaults.
#[derive(Debug, Default)]
pub struct FilterConfiguration {
    sets: HashMap<String, FilterDefinition>,
    default_image: Option<String>,
    data_roots: Vec<String>,
}

impl FilterConfiguration {
    pub fn from_toml_str(source: &str) -> Result<Self, FilterConfigError> {
        let raw: RawConfig = toml::from_str(source)?;
        let mut sets = HashMap::new();
        for (name, definition) in raw.filters {
            let resolved = definition.resolve(&name)?;
            sets.insert(name, resolved);
        }
        Ok(Self {
            sets,
            default_image: raw.default_image,
            data_roots: raw.data_root.unwrap_or_default(),
        })
    }

    /// Register or replace a set programmatically.
    pub fn set(&mut self, name: impl Into<String>, definition: FilterDefinition) {
        self.sets.insert(name.into(), definition);
    }

    pub fn get(&self, name: &str) -> Result<&FilterDefinition, FilterConfigError> {
        self.sets
            .get(name)
            .ok_or_else(|| FilterConfigError::UnknownFilterSet(name.to_string()))
    }

    /// A set with a runtime override table deep-merged over it. An empty
    /// override returns the definition unchanged.
    pub fn get_merged(
        &self,
        name: &str,
        runtime: &Table,
    ) -> Result<FilterDefinition, FilterConfigError> {
        let base = self.get(name)?;
        if runtime.is_empty() {
            return Ok(base.clone());
        }
        merge_definition(base, runtime)
    }

    /// Pipeline-wide fallback image URL.
    pub fn default_image(&self) -> Option<&str> {
        self.default_image.as_deref()
    }

    pub fn data_roots(&self) -> &[String] {
        &self.data_roots
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }
}

/// Deep-merge `over` into `base`: scalars and arrays replace, tables recurse.
fn merge_tables(base: &Table, over: &Table) -> Table {
    let mut merged = base.clone();
    for (key, value) in over {
        match (merged.get(key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merged.insert(key.clone(), Value::Table(merge_tables(existing, incoming)));
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

/// Merge step lists by name: base order wins for shared names, new steps
/// append in their override order.
fn merge_steps(base: &[FilterStep], over: &Table) -> Result<Vec<FilterStep>, FilterConfigError> {
    let mut merged: Vec<FilterStep> = base
        .iter()
        .map(|step| match over.get(&step.name) {
            Some(Value::Table(options)) => Ok(FilterStep::new(
                &step.name,
                merge_tables(&step.options, options),
            )),
            Some(_) => Err(FilterConfigError::InvalidStep {
                set: "<runtime>".to_string(),
                step: step.name.clone(),
            }),
            None => Ok(step.clone()),
        })
        .collect::<Result<_, _>>()?;

    for (name, value) in over {
        if base.iter().any(|step| &step.name == name) {
            continue;
        }
        match value {
            Value::Table(options) => merged.push(FilterStep::new(name, options.clone())),
            _ => {
                return Err(FilterConfigError::InvalidStep {
                    set: "<runtime>".to_string(),
                    step: name.clone(),
                });
            }
        }
    }
    Ok(merged)
}

/// Integer override, rejected when it doesn't fit a `u32`. A negative
/// `quality = -1` must fail loudly, not wrap to four billion.
fn take_u32(runtime: &Table, key: &str) -> Result<Option<u32>, FilterConfigError> {
    match runtime.get(key) {
        Some(Value::Integer(v)) => u32::try_from(*v).map(Some).map_err(|_| {
            FilterConfigError::OutOfRange {
                key: key.to_string(),
            }
        }),
        _ => Ok(None),
    }
}

fn merge_definition(
    base: &FilterDefinition,
    runtime: &Table,
) -> Result<FilterDefinition, FilterConfigError> {
    let mut merged = base.clone();

    let take_str = |key: &str| {
        runtime
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    if let Some(quality) = take_u32(runtime, "quality")? {
        merged.quality = quality;
    }
    if let Some(q) = take_u32(runtime, "jpeg_quality")? {
        merged.jpeg_quality = Some(q);
    }
    if let Some(level) = take_u32(runtime, "png_compression_level")? {
        merged.png_compression_level = Some(level);
    }
    if let Some(filter) = take_str("png_compression_filter") {
        merged.png_compression_filter = Some(filter);
    }
    if let Some(format) = take_str("format") {
        merged.format = Some(format);
    }
    if let Some(animated) = runtime.get("animated").and_then(Value::as_bool) {
        merged.animated = animated;
    }
    if let Some(loader) = take_str("data_loader") {
        merged.data_loader = Some(loader);
    }
    if let Some(image) = take_str("default_image") {
        merged.default_image = Some(image);
    }
    if let Some(cache) = take_str("cache") {
        merged.cache = Some(cache);
    }

    if let Some(Value::Table(over)) = runtime.get("filters") {
        merged.filters = merge_steps(&base.filters, over)?;
    }
    if let Some(Value::Table(over)) = runtime.get("post_processors") {
        merged.post_processors = merge_steps(&base.post_processors, over)?;
    }

    Ok(merged)
}
