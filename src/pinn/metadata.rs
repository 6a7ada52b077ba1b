//! PINN metadata documents: `os.json`, `partitions.json`,
//! `partition_setup.sh` and the per-version `os_list_v3.json`.
//!
//! Key names and value types are fixed by PINN and must not change.

use serde::{Deserialize, Serialize};

use crate::device::Device;

pub const OS_INFO_FILE: &str = "os.json";
pub const PARTITIONS_FILE: &str = "partitions.json";
pub const PARTITION_SETUP_FILE: &str = "partition_setup.sh";
pub const MARKETING_FILE: &str = "marketing.tar";
pub const OS_LIST_FILE: &str = "os_list_v3.json";

/// Nominal System (FAT) partition size in MB.
pub const SYSTEM_PARTITION_MB: u64 = 512;
/// Nominal Storage (ext4) partition size in MB; PINN grows it to fill the card.
pub const STORAGE_PARTITION_MB: u64 = 512;
/// Size PINN reserves for the (empty) storage tarball, in MB.
pub const STORAGE_TARBALL_MB: u64 = 10;
pub const FEATURE_LEVEL: u64 = 35_120_124;

/// Facts about a packaged system archive, computed from the archive file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemArchive {
    pub file_name: String,
    /// Archive size on disk in bytes.
    pub download_size: u64,
    /// Uncompressed tar size rounded up to whole MiB.
    pub uncompressed_size_mb: u64,
    pub sha512: String,
}

/// Static text shared by every device entry.
#[derive(Debug, Clone)]
pub struct ReleaseInfo<'a> {
    pub product: &'a str,
    pub version: &'a str,
    pub release_date: &'a str,
    pub description: &'a str,
    pub website: &'a str,
    pub username: &'a str,
    pub password: &'a str,
}

impl ReleaseInfo<'_> {
    pub fn os_name(&self, device: Device) -> String {
        format!("{}_{}", self.product, device.code())
    }

    pub fn icon_file(&self, device: Device) -> String {
        format!("{}.png", self.os_name(device))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub name: String,
    pub version: String,
    pub release_date: String,
    pub description: String,
    pub url: String,
    pub username: String,
    pub password: String,
    pub supported_models: Vec<String>,
}

impl OsInfo {
    pub fn new(release: &ReleaseInfo<'_>, device: Device) -> Self {
        Self {
            name: release.os_name(device),
            version: release.version.to_string(),
            release_date: release.release_date.to_string(),
            description: release.description.to_string(),
            url: release.website.to_string(),
            username: release.username.to_string(),
            password: release.password.to_string(),
            supported_models: device
                .supported_models()
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub label: String,
    pub filesystem_type: String,
    pub partition_size_nominal: u64,
    pub want_maximised: bool,
    pub uncompressed_tarball_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha512sum: Option<String>,
    pub mkfs_options: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionsInfo {
    pub partitions: Vec<Partition>,
}

impl PartitionsInfo {
    /// System (FAT, from the archive) followed by Storage (ext4, empty).
    pub fn new(archive: &SystemArchive) -> Self {
        Self {
            partitions: vec![
                Partition {
                    label: "System".to_string(),
                    filesystem_type: "FAT".to_string(),
                    partition_size_nominal: SYSTEM_PARTITION_MB,
                    want_maximised: false,
                    uncompressed_tarball_size: archive.uncompressed_size_mb,
                    sha512sum: Some(archive.sha512.clone()),
                    mkfs_options: "-F 32".to_string(),
                },
                Partition {
                    label: "Storage".to_string(),
                    filesystem_type: "ext4".to_string(),
                    partition_size_nominal: STORAGE_PARTITION_MB,
                    want_maximised: true,
                    uncompressed_tarball_size: STORAGE_TARBALL_MB,
                    sha512sum: None,
                    mkfs_options: "-O ^huge_file".to_string(),
                },
            ],
        }
    }
}

/// Shell fragment PINN runs after writing the partitions.
///
/// Only the serial console differs between devices.
pub fn partition_setup_script(product: &str, device: Device) -> String {
    format!(
        r#"#!/bin/sh
#
# PINN partition setup for {product} ({code})

set -ex

if [ -z "$part1" ] || [ -z "$part2" ]; then
  printf "Error: missing environment variable part1 or part2\n" 1>&2
  exit 1
fi

mkdir -p /tmp/1 /tmp/2

mount "$part1" /tmp/1
mount "$part2" /tmp/2

echo "boot=$part1 disk=$part2 quiet {console} console=tty1" > /tmp/1/cmdline.txt

umount /tmp/1
umount /tmp/2
"#,
        code = device.code(),
        console = device.serial_console(),
    )
}

/// One device in `os_list_v3.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsListEntry {
    pub os_name: String,
    pub description: String,
    pub release_date: String,
    pub feature_level: u64,
    pub supported_models: Vec<String>,
    pub url: String,
    pub username: String,
    pub password: String,
    pub icon: String,
    pub marketing_info: String,
    pub os_info: String,
    pub partitions_info: String,
    pub partition_setup: String,
    pub tarballs: Vec<String>,
    pub nominal_size: u64,
    pub download_size: u64,
}

impl OsListEntry {
    /// `device_url` is the public URL of the device directory (no trailing slash).
    pub fn new(
        release: &ReleaseInfo<'_>,
        device: Device,
        device_url: &str,
        archive_file: &str,
        download_size: u64,
    ) -> Self {
        Self {
            os_name: release.os_name(device),
            description: release.description.to_string(),
            release_date: release.release_date.to_string(),
            feature_level: FEATURE_LEVEL,
            supported_models: device
                .supported_models()
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
            url: release.website.to_string(),
            username: release.username.to_string(),
            password: release.password.to_string(),
            icon: format!("{device_url}/{}", release.icon_file(device)),
            marketing_info: format!("{device_url}/{MARKETING_FILE}"),
            os_info: format!("{device_url}/{OS_INFO_FILE}"),
            partitions_info: format!("{device_url}/{PARTITIONS_FILE}"),
            partition_setup: format!("{device_url}/{PARTITION_SETUP_FILE}"),
            tarballs: vec![format!("{device_url}/{archive_file}")],
            nominal_size: SYSTEM_PARTITION_MB + STORAGE_PARTITION_MB,
            download_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsList {
    pub os_list: Vec<OsListEntry>,
}
