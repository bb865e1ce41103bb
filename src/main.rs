use clap::{Parser, Subcommand};
use darkroom::attributes::resolver::{FileAttributesApplier, FileAttributesResolver};
use darkroom::cache::web_path::WebPathResolver;
use darkroom::cache::CacheManager;
use darkroom::data::DataManager;
use darkroom::filter::{FilterManager, JpegOptimPostProcessor, OptiPngPostProcessor};
use darkroom::filter_config::FilterConfiguration;
use darkroom::imaging::rust_backend::RustProcessor;
use darkroom::loader::FilesystemLoader;
use darkroom::lock::LockManager;
use darkroom::service::ImageService;
use std::path::PathBuf;
use std::sync::Arc;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup — trivial, called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "darkroom")]
#[command(about = "Image processing and caching pipeline")]
#[command(long_about = "\
Image processing and caching pipeline

Filter sets are declared in a TOML file; each names its processing steps,
output format, and cache. Resolving a path through a filter set processes the
source image on first request and serves the cached rendition afterwards.

Minimal darkroom.toml:

  data_root = [\"content\"]

  [filters.thumb]
  quality = 85
  format = \"jpg\"

  [filters.thumb.filters.thumbnail]
  size = [120, 90]
  mode = \"outbound\"

Renditions land under <web-root>/media/cache/<filter>/<path> and resolve to
<base-url>/media/cache/<filter>/<path>.")]
#[command(version = version_string())]
struct Cli {
    /// Filter set configuration file
    #[arg(long, default_value = "darkroom.toml", global = true)]
    config: PathBuf,

    /// Directory cached renditions are written under
    #[arg(long, default_value = "public", global = true)]
    web_root: PathBuf,

    /// URL prefix for resolved renditions
    #[arg(long, default_value = "", global = true)]
    base_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve rendition URLs, processing and caching on miss
    Resolve {
        /// Source image paths (relative to the data roots)
        #[arg(required = true)]
        paths: Vec<String>,

        /// Filter set(s) to resolve through; repeatable
        #[arg(long = "filter", required = true)]
        filters: Vec<String>,
    },
    /// Remove cached renditions
    Remove {
        /// Source image paths; empty removes everything per filter set
        paths: Vec<String>,

        /// Filter set(s) to target; empty targets all configured sets
        #[arg(long = "filter")]
        filters: Vec<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let service = build_service(&cli)?;

    match &cli.command {
        Command::Resolve { paths, filters } => {
            for filter in filters {
                for path in paths {
                    let url = service.get(path, filter, &toml::Table::new())?;
                    println!("[{filter}] {path} -> {url}");
                }
            }
        }
        Command::Remove { paths, filters } => {
            service.remove(paths, filters)?;
        }
    }

    Ok(())
}

/// Wire the full pipeline from the CLI flags and the TOML config.
fn build_service(cli: &Cli) -> Result<ImageService, Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(&cli.config)?;
    let config = Arc::new(FilterConfiguration::from_toml_str(&source)?);
    let locks = Arc::new(LockManager::new());

    let roots: Vec<PathBuf> = if config.data_roots().is_empty() {
        vec![PathBuf::from(".")]
    } else {
        config.data_roots().iter().map(PathBuf::from).collect()
    };
    let mut data = DataManager::new(
        config.clone(),
        FileAttributesApplier::new(FileAttributesResolver::standard(locks.clone())),
    );
    data.add_loader("default", Arc::new(FilesystemLoader::new(roots)));
    data.set_default_loader("default");

    let mut filters = FilterManager::standard(
        config.clone(),
        Arc::new(RustProcessor::new()),
        FileAttributesResolver::standard(locks.clone()),
    );
    // Optimizers shell out to their binaries, and run only when a filter
    // set names them.
    filters.add_post_processor(
        "jpegoptim",
        Arc::new(JpegOptimPostProcessor::new(locks.clone())),
    );
    filters.add_post_processor(
        "optipng",
        Arc::new(OptiPngPostProcessor::new(locks.clone())),
    );

    let mut cache = CacheManager::new(config);
    cache.add_resolver(
        "web",
        Arc::new(WebPathResolver::new(
            &cli.web_root,
            cli.base_url.clone(),
            locks,
        )),
    );
    cache.set_default_resolver("web");

    Ok(ImageService::new(data, filters, cache))
}
