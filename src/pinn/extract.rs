//! Update tar → PINN system archive.
//!
//! An update tar holds one top-level directory:
//!
//! ```text
//! LibreELEC-RPi4.aarch64-12.0.1/
//!     target/KERNEL
//!     target/SYSTEM
//!     3rdparty/bootloader/...
//! ```
//!
//! The system archive is laid out as the FAT partition expects it:
//! `kernel.img`, `SYSTEM` and the bootloader files at the root.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;
use xz2::read::XzDecoder;

use super::metadata::SystemArchive;
use crate::artifact::archive::{create_tar, unpack_tar, xz_compress, XZ_PRESET};
use crate::artifact::filesystem::{move_dir_contents, move_path};
use crate::checksum::sha512_file;
use crate::device::Device;
use crate::error::ReleaseError;

pub const SYSTEM_TAR: &str = "System.tar";
pub const SYSTEM_TAR_XZ: &str = "System.tar.xz";

const KERNEL_SRC: &str = "target/KERNEL";
const SYSTEM_SRC: &str = "target/SYSTEM";
const BOOTLOADER_SRC: &str = "3rdparty/bootloader";
const MIB: u64 = 1024 * 1024;

/// Locate the update tar, trying each architecture suffix in order.
pub fn locate_update_archive(
    releases_dir: &Path,
    product: &str,
    device: Device,
    version: &str,
) -> Result<PathBuf, ReleaseError> {
    let tried: Vec<PathBuf> = device
        .archs()
        .iter()
        .map(|arch| releases_dir.join(device.artifact_name(product, *arch, version, ".tar")))
        .collect();

    match tried.iter().find(|path| path.is_file()) {
        Some(path) => Ok(path.clone()),
        None => Err(ReleaseError::MissingArtifact {
            device: device.code().to_string(),
            tried,
        }),
    }
}

/// Unpack `update_tar` under `work_dir` and build the system archive there.
///
/// Returns the path of the finished archive (still inside `work_dir`).
pub fn build_system_archive(update_tar: &Path, work_dir: &Path, compress: bool) -> Result<PathBuf> {
    let unpacked = work_dir.join("unpacked");
    let staging = work_dir.join("System");

    unpack_tar(update_tar, &unpacked)?;
    let payload = payload_root(update_tar, &unpacked)?;
    stage_system(update_tar, &payload, &staging)?;

    let tar_path = work_dir.join(SYSTEM_TAR);
    let tar_size = create_tar(&staging, &tar_path)?;
    debug!("{} is {} bytes", tar_path.display(), tar_size);

    if !compress {
        return Ok(tar_path);
    }

    let xz_path = work_dir.join(SYSTEM_TAR_XZ);
    xz_compress(&tar_path, &xz_path, XZ_PRESET)?;
    fs::remove_file(&tar_path).with_context(|| format!("Failed to remove {}", tar_path.display()))?;
    Ok(xz_path)
}

fn payload_root(update_tar: &Path, unpacked: &Path) -> Result<PathBuf> {
    if unpacked.join("target").is_dir() {
        return Ok(unpacked.to_path_buf());
    }

    let dirs: Vec<PathBuf> = fs::read_dir(unpacked)
        .with_context(|| format!("Failed to read directory: {}", unpacked.display()))?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();

    match dirs.as_slice() {
        [single] => Ok(single.clone()),
        _ => Err(ReleaseError::MalformedArchive {
            archive: update_tar.to_path_buf(),
            reason: format!("expected one top-level directory, found {}", dirs.len()),
        }
        .into()),
    }
}

fn stage_system(update_tar: &Path, payload: &Path, staging: &Path) -> Result<()> {
    let malformed = |what: &str| ReleaseError::MalformedArchive {
        archive: update_tar.to_path_buf(),
        reason: format!("missing {what}"),
    };

    let kernel = payload.join(KERNEL_SRC);
    let system = payload.join(SYSTEM_SRC);
    let bootloader = payload.join(BOOTLOADER_SRC);
    if !kernel.is_file() {
        return Err(malformed(KERNEL_SRC).into());
    }
    if !system.is_file() {
        return Err(malformed(SYSTEM_SRC).into());
    }
    if !bootloader.is_dir() {
        return Err(malformed(BOOTLOADER_SRC).into());
    }

    fs::create_dir_all(staging)
        .with_context(|| format!("Failed to create directory: {}", staging.display()))?;
    move_path(&kernel, &staging.join("kernel.img"))?;
    move_path(&system, &staging.join("SYSTEM"))?;
    move_dir_contents(&bootloader, staging)?;
    Ok(())
}

/// Find the system archive inside a device directory.
pub fn find_system_archive(device_dir: &Path) -> Option<PathBuf> {
    [SYSTEM_TAR_XZ, SYSTEM_TAR]
        .iter()
        .map(|name| device_dir.join(name))
        .find(|path| path.is_file())
}

/// Size, uncompressed size and SHA-512 of an archive, read from the file itself.
pub fn inspect_system_archive(archive: &Path) -> Result<SystemArchive> {
    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let digest = sha512_file(archive)?;

    let uncompressed_bytes = if file_name.ends_with(".xz") {
        let f = File::open(archive).with_context(|| format!("Failed to open {}", archive.display()))?;
        let mut decoder = XzDecoder::new(BufReader::new(f));
        io::copy(&mut decoder, &mut io::sink())
            .with_context(|| format!("Failed to decompress {}", archive.display()))?
    } else {
        digest.size
    };

    Ok(SystemArchive {
        file_name,
        download_size: digest.size,
        uncompressed_size_mb: uncompressed_bytes.div_ceil(MIB),
        sha512: digest.hex,
    })
}
