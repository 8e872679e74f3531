use clap::{Args, Parser, Subcommand};
use pixstore::catalog::Catalog;
use pixstore::config::{self, StoreConfig};
use pixstore::error::StoreError;
use pixstore::imaging::{RustBackend, TransformOptions};
use pixstore::pipeline::{self, Pipeline};
use pixstore::response::BufferedResponse;
use pixstore::storage::ImageStorage;
use rayon::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pixstore")]
#[command(about = "Image ingestion and on-demand transformation store")]
#[command(long_about = "\
Image ingestion and on-demand transformation store

Uploads are sniffed by content, measured, given a collision-resistant name
and saved to a temporary area. Promoted images move to permanent storage.
Retrieval applies crop/resize/blur on the fly and serves WebP to clients
that accept it.

Storage layout:

  upload/                          # Promoted originals
  temp/                            # Fresh uploads
  catalog.json                     # Image metadata

Run 'pixstore gen-config' to generate a documented pixstore.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the storage directories and an empty catalog
    Init,
    /// Upload one or more image files into the temporary area
    Upload {
        /// Image files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Alt text (defaults to the generated name)
        #[arg(long)]
        alt: Option<String>,
    },
    /// Render a stored image with optional transforms
    Get(GetArgs),
    /// Print an image's catalog record as JSON
    Info { name: String },
    /// Move an uploaded image to permanent storage
    Promote { name: String },
    /// List stored files without a catalog record, and records without a file
    Orphans,
    /// Print a stock pixstore.toml with all options documented
    GenConfig,
}

#[derive(Args)]
struct GetArgs {
    name: String,
    /// Query string, e.g. "crop=true&w=400&h=300&q=80&blur=1.5"
    #[arg(long)]
    query: Option<String>,
    /// Target width (0 = unconstrained)
    #[arg(short, long)]
    width: Option<i32>,
    /// Target height (0 = unconstrained)
    #[arg(short = 'H', long)]
    height: Option<i32>,
    /// Center fill-crop to exactly width x height
    #[arg(long)]
    crop: bool,
    /// Gaussian blur sigma, 0-10
    #[arg(long)]
    blur: Option<f64>,
    /// Encoder quality, 0-100
    #[arg(short, long)]
    quality: Option<i32>,
    /// Accept header to negotiate with
    #[arg(long, default_value = "image/webp")]
    accept: String,
    /// Output file (defaults to the served file name)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl GetArgs {
    fn transform_options(&self) -> Result<TransformOptions, StoreError> {
        let mut opts = match &self.query {
            Some(q) => TransformOptions::from_query(q).map_err(StoreError::Validation)?,
            None => TransformOptions::default(),
        };
        if let Some(w) = self.width {
            opts.width = w;
        }
        if let Some(h) = self.height {
            opts.height = h;
        }
        if self.crop {
            opts.crop = true;
        }
        if let Some(b) = self.blur {
            opts.blur = b;
        }
        if let Some(q) = self.quality {
            opts.quality = q;
        }
        Ok(opts)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if matches!(cli.command, Command::GenConfig) {
        print!("{}", config::stock_config_toml());
        return ExitCode::SUCCESS;
    }

    let store_config = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&store_config.log_level);

    match run(cli.command, &store_config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, store_config: &StoreConfig) -> Result<(), StoreError> {
    let pipeline = open_pipeline(store_config)?;

    match command {
        Command::Init => {
            pipeline.catalog().save()?;
            println!(
                "Storage ready: {} (temp: {})",
                pipeline.storage().path().display(),
                pipeline.storage().temp_path().display()
            );
        }
        Command::Upload { files, alt } => {
            init_thread_pool(&store_config.processing);
            let failures = files
                .par_iter()
                .map(|path| upload_one(&pipeline, path, alt.as_deref()))
                .filter(|ok| !ok)
                .count();
            if failures > 0 {
                return Err(StoreError::System(std::io::Error::other(format!(
                    "{failures} of {} uploads failed",
                    files.len()
                ))));
            }
        }
        Command::Get(args) => {
            let opts = args.transform_options()?;
            let mut response = BufferedResponse::new();
            let served = pipeline.render(&args.name, &opts, &args.accept, &mut response)?;
            let output = args
                .output
                .unwrap_or_else(|| PathBuf::from(format!("{}{}", args.name, served.extension())));
            std::fs::write(&output, response.body()).map_err(StoreError::FileCreate)?;
            println!(
                "{} ({}, {} bytes)",
                output.display(),
                served,
                response.body().len()
            );
        }
        Command::Info { name } => {
            let view = pipeline.describe(&name)?;
            let json = serde_json::to_string_pretty(&view)
                .map_err(|e| StoreError::System(e.into()))?;
            println!("{json}");
        }
        Command::Promote { name } => {
            let image = pipeline.promote(&name)?;
            println!("{} → {}", image.name, pipeline.image_url(&image.name));
        }
        Command::Orphans => {
            let report = pipeline::audit(pipeline.storage(), &pipeline.catalog().images()?)?;
            for path in &report.orphans {
                println!("orphan file: {}", path.display());
            }
            for name in &report.missing {
                println!("missing file: {name}");
            }
            if report.is_clean() {
                println!("Storage and catalog agree");
            }
        }
        // Printed before the config is loaded
        Command::GenConfig => {}
    }

    Ok(())
}

fn open_pipeline(store_config: &StoreConfig) -> Result<Pipeline<RustBackend, Catalog>, StoreError> {
    let storage = ImageStorage::new(&store_config.storage.path, &store_config.storage.temp_path)?;
    let catalog = Catalog::open(&store_config.storage.catalog)?;
    Ok(Pipeline::new(
        storage,
        catalog,
        RustBackend::new(),
        store_config.base_url(),
    ))
}

/// Upload a single file, printing the outcome. Returns whether it succeeded.
fn upload_one(pipeline: &Pipeline<RustBackend, Catalog>, path: &Path, alt: Option<&str>) -> bool {
    let original_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let result = File::open(path)
        .map_err(StoreError::FileRead)
        .and_then(|mut file| pipeline.upload(&mut file, &original_name, alt));
    match result {
        Ok(outcome) => {
            println!("{} → {}", path.display(), outcome.url);
            true
        }
        Err(e) => {
            eprint!("{}: ", path.display());
            report(&e);
            false
        }
    }
}

/// Print an error for the operator. Server-side failures also go to the log
/// with their underlying cause.
fn report(err: &StoreError) {
    match err {
        StoreError::Validation(fields) => eprintln!("{err}: {fields}"),
        StoreError::DuplicateName => eprintln!("{err}: name: name already exists"),
        _ if err.is_client_error() => eprintln!("{err}"),
        _ => {
            eprintln!("{err}");
            match std::error::Error::source(err) {
                Some(cause) => error!(%cause, "{err}"),
                None => error!("{err}"),
            }
        }
    }
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pixstore={default_level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
    info!(threads, "upload workers");
}
