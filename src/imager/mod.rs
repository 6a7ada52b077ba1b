//! Raspberry Pi Imager OS list generation.
//!
//! For one release version, every configured device's `*.img.gz` is located,
//! hashed (decompressed SHA-256) and described in the flat JSON array the
//! imager consumes. Devices without an image are skipped, not failed.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::artifact::filesystem::write_json_atomic;
use crate::artifact::gzip::{gzip_uncompressed_size, sha256_decompressed};
use crate::device::Device;
use crate::timestamp::{format_date, modified};
use crate::version::validate_imager_version;

const IMAGE_EXT: &str = ".img.gz";

/// One downloadable image as the imager expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagerEntry {
    pub name: String,
    pub description: String,
    pub icon: String,
    pub website: String,
    pub url: String,
    pub extract_size: u64,
    pub extract_sha256: String,
    pub image_download_size: u64,
    pub release_date: String,
}

#[derive(Debug, Clone)]
pub struct ImagerOptions {
    pub version: String,
    pub releases_dir: PathBuf,
    pub output_file: PathBuf,
    pub devices: Vec<Device>,
    pub product: String,
    pub base_url: String,
    pub website: String,
}

/// Default output location for a version.
pub fn default_output_file(output_dir: &Path, version: &str) -> PathBuf {
    output_dir.join(format!("imager-{version}.json"))
}

/// Find the device's image, trying each architecture suffix in order.
pub fn locate_image(releases_dir: &Path, product: &str, device: Device, version: &str) -> Option<PathBuf> {
    device
        .archs()
        .iter()
        .map(|arch| releases_dir.join(device.artifact_name(product, *arch, version, IMAGE_EXT)))
        .find(|path| path.is_file())
}

/// Describe a single image file.
pub fn describe_image(opts: &ImagerOptions, device: Device, image: &Path) -> Result<ImagerEntry> {
    let file_name = image
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let digest = sha256_decompressed(image)?;
    let extract_size = gzip_uncompressed_size(image)?;
    let image_download_size = fs::metadata(image)?.len();
    let release_date = format_date(modified(image)?)?;

    debug!(
        "{}: {} bytes compressed, {} bytes extracted",
        file_name, image_download_size, extract_size
    );

    Ok(ImagerEntry {
        name: format!("{} ({})", opts.product, device.code()),
        description: device.imager_description().to_string(),
        icon: format!("{}/icons/{}_{}.png", opts.base_url, opts.product, device.code()),
        website: opts.website.clone(),
        url: format!("{}/{}", opts.base_url, file_name),
        extract_size,
        extract_sha256: digest.hex,
        image_download_size,
        release_date,
    })
}

/// Build the entry list and write it to `opts.output_file`.
///
/// The version is validated before anything is read or written.
pub fn generate(opts: &ImagerOptions) -> Result<Vec<ImagerEntry>> {
    validate_imager_version(&opts.version)?;

    let mut entries = Vec::with_capacity(opts.devices.len());
    for &device in &opts.devices {
        let Some(image) = locate_image(&opts.releases_dir, &opts.product, device, &opts.version)
        else {
            info!(
                "[imager:{device}] no image for {} in {}, skipping",
                opts.version,
                opts.releases_dir.display()
            );
            continue;
        };
        info!("[imager:{device}] adding {}", image.display());
        entries.push(describe_image(opts, device, &image)?);
    }

    write_json_atomic(&opts.output_file, &entries)?;
    println!("Wrote: {}", opts.output_file.display());

    Ok(entries)
}
