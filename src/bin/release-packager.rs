//! Release packaging CLI.
//!
//! # Usage
//!
//! ```bash
//! # Raspberry Pi Imager list for a release
//! release-packager imager-json 12.0.1 --releases-dir /srv/releases
//!
//! # PINN packages for the default devices, then publish the OS list
//! release-packager pinn 12.0.1 --release
//!
//! # releases.json for the download site
//! release-packager releases-index -i /srv/releases -u https://releases.libreelec.tv
//!
//! # List nightly images older than two weeks that would be pruned
//! release-packager prune-archive -i /srv/archive/13.0 -k 14
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use release_packager::config::ReleaseConfig;
use release_packager::device::{parse_device_list, Device};
use release_packager::imager::{self, ImagerOptions};
use release_packager::logging;
use release_packager::pinn::{self, MetadataPolicy, PinnOptions};
use release_packager::prune::{self, PruneOptions};
use release_packager::releases::{self, ReleasesOptions};

#[derive(Parser)]
#[command(name = "release-packager")]
#[command(author, version, about = "Release packaging for Raspberry Pi installers", long_about = None)]
struct Cli {
    /// TOML file with product, URL and directory defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Product name used in artifact file names (overrides config)
    #[arg(long, global = true)]
    product: Option<String>,

    /// Debug logging and detailed reports
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the Raspberry Pi Imager OS list for a release
    ImagerJson {
        /// Release version, e.g. 12.0.1
        version: String,

        /// Directory holding the *.img.gz images
        #[arg(long)]
        releases_dir: Option<PathBuf>,

        /// Output file (default: <output-dir>/imager-<version>.json)
        #[arg(long)]
        output_file: Option<PathBuf>,

        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Comma-separated devices
        #[arg(long)]
        devices: Option<String>,

        /// Base URL of the release downloads
        #[arg(long)]
        url: Option<String>,
    },

    /// Package PINN system archives and metadata for a release
    Pinn {
        /// Release version
        version: String,

        /// Comma-separated devices
        #[arg(long)]
        devices: Option<String>,

        /// Re-extract devices whose output already exists
        #[arg(long)]
        force: bool,

        /// Publish the version OS list as <output>/os_list_v3.json
        #[arg(long)]
        release: bool,

        /// Leave System.tar uncompressed
        #[arg(long)]
        no_compress: bool,

        /// Rewrite metadata of skipped devices from their existing archive
        #[arg(long)]
        refresh_metadata: bool,

        /// Output base directory
        #[arg(long)]
        output: Option<PathBuf>,

        /// Public base URL of the output directory
        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        releases_dir: Option<PathBuf>,

        /// Directory with icons and marketing.tar
        #[arg(long)]
        assets_dir: Option<PathBuf>,

        /// Parent directory for scratch space (default: system temp)
        #[arg(long)]
        scratch_dir: Option<PathBuf>,
    },

    /// Write releases.json from the tarballs and images under a directory
    ReleasesIndex {
        #[arg(short, long)]
        input: PathBuf,

        /// Base URL for releases.json
        #[arg(short, long)]
        url: String,

        /// Directory for releases.json (default: input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Prettyname regex written into every train
        #[arg(short, long)]
        prettyname: Option<String>,
    },

    /// Thin out nightly images older than the retention window
    PruneArchive {
        /// Release branch directory, e.g. /srv/archive/13.0
        #[arg(short, long)]
        input: PathBuf,

        /// Days during which every image is kept
        #[arg(short, long)]
        keep: u32,

        /// Delete files instead of only listing them
        #[arg(short, long)]
        delete: bool,

        /// List the images being retained and exit
        #[arg(short, long)]
        retained: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = ReleaseConfig::load_optional(cli.config.as_deref())?;
    if let Some(product) = cli.product {
        config.product = product;
    }

    match cli.command {
        Commands::ImagerJson {
            version,
            releases_dir,
            output_file,
            output_dir,
            devices,
            url,
        } => {
            let output_file = output_file.unwrap_or_else(|| {
                imager::default_output_file(
                    output_dir.as_deref().unwrap_or(config.output_dir.as_path()),
                    &version,
                )
            });
            let opts = ImagerOptions {
                devices: devices_or(devices.as_deref(), &config.imager_devices)?,
                releases_dir: releases_dir.unwrap_or(config.releases_dir),
                base_url: trim_url(url.unwrap_or(config.base_url)),
                output_file,
                product: config.product,
                website: config.website,
                version,
            };
            imager::generate(&opts)?;
        }

        Commands::Pinn {
            version,
            devices,
            force,
            release,
            no_compress,
            refresh_metadata,
            output,
            url,
            releases_dir,
            assets_dir,
            scratch_dir,
        } => {
            let opts = PinnOptions {
                devices: devices_or(devices.as_deref(), &config.pinn_devices)?,
                force,
                release,
                compress: !no_compress,
                metadata_policy: if refresh_metadata {
                    MetadataPolicy::Refresh
                } else {
                    MetadataPolicy::KeepExisting
                },
                releases_dir: releases_dir.unwrap_or(config.releases_dir),
                output_dir: output.unwrap_or(config.output_dir),
                assets_dir: assets_dir.unwrap_or(config.assets_dir),
                base_url: trim_url(url.unwrap_or(config.base_url)),
                product: config.product,
                description: config.description,
                website: config.website,
                username: config.username,
                password: config.password,
                scratch_root: scratch_dir,
                version,
            };
            let report = pinn::run(&opts)?;
            for outcome in &report.outcomes {
                let device = outcome.device();
                let state = match outcome {
                    pinn::DeviceOutcome::Extracted(_) => "extracted",
                    pinn::DeviceOutcome::Skipped(_) => "kept existing",
                };
                println!("  {device} ({}): {state}", device.display_name());
            }
        }

        Commands::ReleasesIndex {
            input,
            url,
            output,
            prettyname,
        } => {
            let opts = ReleasesOptions {
                output_dir: output.unwrap_or_else(|| input.clone()),
                input_dir: input,
                url,
                product: config.product,
                prettyname,
            };
            releases::generate(&opts)?;
        }

        Commands::PruneArchive {
            input,
            keep,
            delete,
            retained,
        } => {
            let opts = PruneOptions {
                input_dir: input,
                product: config.product,
                keep_days: keep,
                delete,
                retained,
                verbose: cli.verbose,
            };
            prune::run(&opts)?;
        }
    }

    Ok(())
}

fn devices_or(list: Option<&str>, fallback: &[Device]) -> Result<Vec<Device>> {
    match list {
        Some(list) => Ok(parse_device_list(list)?),
        None => Ok(fallback.to_vec()),
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
