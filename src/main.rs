use clap::{Parser, Subcommand};
use rollscan::imaging::RustBackend;
use rollscan::view::{Catalog, CatalogError, RollRecord};
use rollscan::{config, derive, output, scan, thumbs, view};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rollscan")]
#[command(about = "Derived-image pipeline for film roll scans")]
#[command(long_about = "\
Derived-image pipeline for film roll scans

A roll is a directory of scanned frames. rollscan lists rolls in natural
order (roll1, roll2, ... roll10), extracts metadata, and maintains a cache
of display-sized JPEG renditions plus square thumbnails under a configured
cache root:

  {cache_root}/
  ├── derived/
  │   ├── {roll_id}_index.json     # original path → derived path
  │   └── a1_display_<uuid>.jpg
  └── thumbnails/
      └── <uuid>.jpg

The derived index is validated against the filesystem on every access and
rebuilt wholesale when anything disagrees. Frames that cannot be decoded
(camera RAW, corrupt files) fall back to their originals instead of
failing the roll.

Run 'rollscan gen-config' to print a starter config file.")]
#[command(version)]
struct Cli {
    /// Pipeline config file (defaults apply when absent)
    #[arg(long, default_value = "rollscan.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a roll directory in natural order with metadata
    Scan {
        /// Roll directory
        dir: PathBuf,
    },
    /// Build or validate the derived display images for a roll
    Build {
        /// Roll directory
        dir: PathBuf,
        /// Roll identifier (index filename prefix)
        #[arg(long)]
        roll_id: String,
    },
    /// Generate a square thumbnail for one image
    Thumb {
        /// Source image
        source: PathBuf,
    },
    /// Print viewer records for a roll as JSON
    Images {
        /// Roll directory
        dir: PathBuf,
        /// Roll identifier
        #[arg(long)]
        roll_id: String,
    },
    /// Delete cache files no longer referenced by any roll index
    Sweep {
        /// Thumbnail file still referenced by the catalog (repeatable)
        #[arg(long = "keep-thumb")]
        keep_thumbs: Vec<PathBuf>,
    },
    /// Print a starter config file with all defaults spelled out
    GenConfig,
}

/// Single-roll catalog backed by the command line arguments. The stored
/// count starts unknown, so the first listing always reconciles it.
struct CliCatalog {
    roll: RollRecord,
}

impl Catalog for CliCatalog {
    fn roll(&self, roll_id: &str) -> Result<RollRecord, CatalogError> {
        if roll_id == self.roll.id {
            Ok(self.roll.clone())
        } else {
            Err(CatalogError::RollNotFound(roll_id.to_string()))
        }
    }

    fn update_image_count(&mut self, _roll_id: &str, count: u64) -> Result<(), CatalogError> {
        self.roll.image_count = count;
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::PipelineConfig::load(&cli.config)?;
    let backend = RustBackend::new();

    match cli.command {
        Command::Scan { dir } => {
            let files = scan::scan(&backend, &dir)?;
            print!("{}", output::format_scan_listing(&files));
        }
        Command::Build { dir, roll_id } => {
            let cache = derive::DerivedImageCache::new(&backend, &config);
            let outcome = cache.get_or_build(&dir, &roll_id)?;
            print!("{}", output::format_derive_outcome(&roll_id, &outcome));
        }
        Command::Thumb { source } => {
            let thumb = thumbs::generate(&backend, &source, &config)?;
            println!("{}", thumb.display());
        }
        Command::Images { dir, roll_id } => {
            let mut catalog = CliCatalog {
                roll: RollRecord {
                    id: roll_id.clone(),
                    directory: dir,
                    image_count: 0,
                },
            };
            let records = view::assemble(&backend, &mut catalog, &roll_id, &config)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Sweep { keep_thumbs } => {
            let derived = derive::sweep_unreferenced(&config)?;
            let thumbnails = thumbs::sweep(&config, &keep_thumbs)?;
            println!("Removed {derived} derived file(s) and {thumbnails} thumbnail(s)");
        }
        Command::GenConfig => {
            print!("{}", config::PipelineConfig::starter_toml());
        }
    }
    Ok(())
}
