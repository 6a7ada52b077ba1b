//! PINN release packaging.
//!
//! For each requested device the update tar is repackaged into a system
//! archive and described by `os.json`, `partitions.json` and
//! `partition_setup.sh`. All devices are then listed in a per-version
//! `os_list_v3.json`, which `release` publishes as the current OS list.
//!
//! # Output layout
//!
//! ```text
//! <output>/os_list_v3.json              (published copy, --release)
//! <output>/<version>/os_list_v3.json
//! <output>/<version>/<device>/System.tar.xz
//! <output>/<version>/<device>/os.json
//! <output>/<version>/<device>/partitions.json
//! <output>/<version>/<device>/partition_setup.sh
//! <output>/<version>/<device>/<product>_<device>.png
//! <output>/<version>/<device>/marketing.tar
//! ```
//!
//! A device directory that already exists is not re-extracted unless
//! `force` is set. Scratch space lives in a temporary directory that is
//! removed when the run ends, however it ends.

pub mod extract;
pub mod metadata;

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::artifact::filesystem::{move_path, write_atomic, write_json_atomic};
use crate::device::Device;
use crate::error::ReleaseError;
use crate::preflight::{check_required, Requirement};
use crate::timestamp::{format_date, modified};
use extract::{
    build_system_archive, find_system_archive, inspect_system_archive, locate_update_archive,
};
use metadata::{
    partition_setup_script, OsInfo, OsList, OsListEntry, PartitionsInfo, ReleaseInfo,
    MARKETING_FILE, OS_INFO_FILE, OS_LIST_FILE, PARTITIONS_FILE, PARTITION_SETUP_FILE,
};

/// What to do with a skipped device's metadata files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataPolicy {
    /// Leave existing files untouched; only write the ones that are missing.
    #[default]
    KeepExisting,
    /// Regenerate every metadata file from the archive already on disk.
    Refresh,
}

#[derive(Debug, Clone)]
pub struct PinnOptions {
    pub version: String,
    pub devices: Vec<Device>,
    pub force: bool,
    pub release: bool,
    pub compress: bool,
    pub metadata_policy: MetadataPolicy,
    pub releases_dir: PathBuf,
    pub output_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub base_url: String,
    pub product: String,
    pub description: String,
    pub website: String,
    pub username: String,
    pub password: String,
    /// Parent for the per-run scratch directory; system temp dir when `None`.
    pub scratch_root: Option<PathBuf>,
}

impl PinnOptions {
    pub fn version_dir(&self) -> PathBuf {
        self.output_dir.join(&self.version)
    }

    pub fn device_dir(&self, device: Device) -> PathBuf {
        self.version_dir().join(device.code())
    }

    pub fn os_list_path(&self) -> PathBuf {
        self.version_dir().join(OS_LIST_FILE)
    }

    pub fn published_os_list_path(&self) -> PathBuf {
        self.output_dir.join(OS_LIST_FILE)
    }

    fn device_url(&self, device: Device) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.version,
            device.code()
        )
    }

    fn marketing_asset(&self) -> PathBuf {
        self.assets_dir.join(MARKETING_FILE)
    }

    /// `<product>_<device>.png`, falling back to `<product>.png`.
    fn icon_asset(&self, device: Device) -> Result<PathBuf, ReleaseError> {
        let specific = self
            .assets_dir
            .join(format!("{}_{}.png", self.product, device.code()));
        if specific.is_file() {
            return Ok(specific);
        }
        let generic = self.assets_dir.join(format!("{}.png", self.product));
        if generic.is_file() {
            return Ok(generic);
        }
        Err(ReleaseError::MissingAsset(specific))
    }
}

/// Per-device result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOutcome {
    Extracted(Device),
    Skipped(Device),
}

impl DeviceOutcome {
    pub fn device(&self) -> Device {
        match self {
            DeviceOutcome::Extracted(d) | DeviceOutcome::Skipped(d) => *d,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PinnReport {
    pub outcomes: Vec<DeviceOutcome>,
    pub os_list: OsList,
    pub os_list_path: PathBuf,
    pub os_list_written: bool,
    pub published: Option<PathBuf>,
}

/// Package every requested device and write the version OS list.
pub fn run(opts: &PinnOptions) -> Result<PinnReport> {
    let marketing = opts.marketing_asset();
    check_required(&[
        Requirement::Dir(&opts.releases_dir),
        Requirement::Dir(&opts.assets_dir),
        Requirement::File(&marketing),
    ])?;

    let mut builder = tempfile::Builder::new();
    builder.prefix("pinn-");
    let scratch = match &opts.scratch_root {
        Some(root) => {
            fs::create_dir_all(root)
                .with_context(|| format!("creating scratch root '{}'", root.display()))?;
            builder.tempdir_in(root)
        }
        None => builder.tempdir(),
    }
    .context("creating scratch directory")?;
    debug!("scratch directory {}", scratch.path().display());

    let mut outcomes = Vec::with_capacity(opts.devices.len());
    let mut entries = Vec::with_capacity(opts.devices.len());
    for &device in &opts.devices {
        let (outcome, entry) = package_device(opts, device, scratch.path())
            .with_context(|| format!("packaging {device} {}", opts.version))?;
        outcomes.push(outcome);
        entries.push(entry);
    }

    let os_list = OsList { os_list: entries };
    let os_list_path = opts.os_list_path();
    let any_extracted = outcomes
        .iter()
        .any(|o| matches!(o, DeviceOutcome::Extracted(_)));

    let os_list_written = any_extracted || !os_list_path.is_file();
    if os_list_written {
        write_json_atomic(&os_list_path, &os_list)?;
        println!("Wrote: {}", os_list_path.display());
    } else {
        info!(
            "[pinn] nothing extracted and {} exists, leaving it as is",
            os_list_path.display()
        );
    }

    let published = if opts.release {
        Some(publish(&os_list_path, &opts.published_os_list_path())?)
    } else {
        None
    };

    Ok(PinnReport {
        outcomes,
        os_list,
        os_list_path,
        os_list_written,
        published,
    })
}

fn package_device(
    opts: &PinnOptions,
    device: Device,
    scratch: &Path,
) -> Result<(DeviceOutcome, OsListEntry)> {
    let update_tar =
        locate_update_archive(&opts.releases_dir, &opts.product, device, &opts.version)?;
    let dest = opts.device_dir(device);
    let release_date = format_date(modified(&update_tar)?)?;
    let release = ReleaseInfo {
        product: &opts.product,
        version: &opts.version,
        release_date: &release_date,
        description: &opts.description,
        website: &opts.website,
        username: &opts.username,
        password: &opts.password,
    };

    let outcome = if dest.is_dir() && !opts.force {
        info!(
            "[pinn:{device}] {} already exists, skipping extraction",
            dest.display()
        );
        write_metadata(&release, device, &dest, opts.metadata_policy)?;
        DeviceOutcome::Skipped(device)
    } else {
        info!("[pinn:{device}] extracting {}", update_tar.display());
        extract_device(opts, device, &update_tar, &dest, scratch)?;
        write_metadata(&release, device, &dest, MetadataPolicy::Refresh)?;
        DeviceOutcome::Extracted(device)
    };

    let archive = find_system_archive(&dest).ok_or_else(|| ReleaseError::MissingArtifact {
        device: device.code().to_string(),
        tried: vec![dest.join(extract::SYSTEM_TAR_XZ), dest.join(extract::SYSTEM_TAR)],
    })?;
    let archive_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let download_size = fs::metadata(&archive)
        .with_context(|| format!("reading size of {}", archive.display()))?
        .len();

    let entry = OsListEntry::new(
        &release,
        device,
        &opts.device_url(device),
        &archive_name,
        download_size,
    );
    Ok((outcome, entry))
}

fn extract_device(
    opts: &PinnOptions,
    device: Device,
    update_tar: &Path,
    dest: &Path,
    scratch: &Path,
) -> Result<()> {
    let icon = opts.icon_asset(device)?;

    if dest.exists() {
        fs::remove_dir_all(dest)
            .with_context(|| format!("removing existing device directory '{}'", dest.display()))?;
    }
    fs::create_dir_all(dest)
        .with_context(|| format!("creating device directory '{}'", dest.display()))?;

    let work = scratch.join(device.code());
    let archive = build_system_archive(update_tar, &work, opts.compress)?;
    let archive_name = archive
        .file_name()
        .context("system archive without file name")?
        .to_owned();
    move_path(&archive, &dest.join(archive_name))?;
    if work.exists() {
        fs::remove_dir_all(&work)
            .with_context(|| format!("removing work directory '{}'", work.display()))?;
    }

    let icon_name = format!("{}_{}.png", opts.product, device.code());
    fs::copy(&icon, dest.join(icon_name))
        .with_context(|| format!("copying icon {}", icon.display()))?;
    fs::copy(opts.marketing_asset(), dest.join(MARKETING_FILE))
        .with_context(|| format!("copying {}", opts.marketing_asset().display()))?;
    Ok(())
}

/// Write `os.json`, `partitions.json` and `partition_setup.sh` for a device.
///
/// With [`MetadataPolicy::KeepExisting`] only missing files are written.
/// Archive size and checksum are always read from the archive in `dest`.
pub fn write_metadata(
    release: &ReleaseInfo<'_>,
    device: Device,
    dest: &Path,
    policy: MetadataPolicy,
) -> Result<()> {
    let should_write =
        |name: &str| policy == MetadataPolicy::Refresh || !dest.join(name).is_file();

    if should_write(OS_INFO_FILE) {
        write_json_atomic(&dest.join(OS_INFO_FILE), &OsInfo::new(release, device))?;
    }

    if should_write(PARTITIONS_FILE) {
        let archive_path =
            find_system_archive(dest).ok_or_else(|| ReleaseError::MissingArtifact {
                device: device.code().to_string(),
                tried: vec![dest.join(extract::SYSTEM_TAR_XZ), dest.join(extract::SYSTEM_TAR)],
            })?;
        let archive = inspect_system_archive(&archive_path)?;
        write_json_atomic(&dest.join(PARTITIONS_FILE), &PartitionsInfo::new(&archive))?;
    }

    if should_write(PARTITION_SETUP_FILE) {
        let path = dest.join(PARTITION_SETUP_FILE);
        write_atomic(&path, partition_setup_script(release.product, device).as_bytes())?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("setting mode of {}", path.display()))?;
    }

    Ok(())
}

/// Copy the version OS list over the published one, byte for byte.
pub fn publish(os_list: &Path, published: &Path) -> Result<PathBuf> {
    let bytes =
        fs::read(os_list).with_context(|| format!("reading OS list '{}'", os_list.display()))?;
    write_atomic(published, &bytes)?;
    println!("Published: {} -> {}", os_list.display(), published.display());
    Ok(published.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pinn::extract::tests::write_update_tar;
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let releases = tmp.path().join("releases");
            let assets = tmp.path().join("assets");
            fs::create_dir_all(&releases).unwrap();
            fs::create_dir_all(&assets).unwrap();
            fs::write(assets.join("LibreELEC.png"), b"png").unwrap();
            fs::write(assets.join("marketing.tar"), b"marketing").unwrap();
            Self { tmp }
        }

        fn releases(&self) -> PathBuf {
            self.tmp.path().join("releases")
        }

        fn add_update(&self, device: &str, arch: &str, system: &[u8]) {
            write_update_tar(
                &self.releases(),
                &format!("LibreELEC-{device}.{arch}-12.0.1.tar"),
                system,
            );
        }

        fn options(&self, devices: &[Device]) -> PinnOptions {
            PinnOptions {
                version: "12.0.1".to_string(),
                devices: devices.to_vec(),
                force: false,
                release: false,
                compress: false,
                metadata_policy: MetadataPolicy::KeepExisting,
                releases_dir: self.releases(),
                output_dir: self.tmp.path().join("out"),
                assets_dir: self.tmp.path().join("assets"),
                base_url: "https://releases.example.org/pinn".to_string(),
                product: "LibreELEC".to_string(),
                description: "desc".to_string(),
                website: "https://example.org".to_string(),
                username: "root".to_string(),
                password: "libreelec".to_string(),
                scratch_root: Some(self.tmp.path().join("scratch")),
            }
        }
    }

    fn scratch_is_empty(opts: &PinnOptions) -> bool {
        let root = opts.scratch_root.as_ref().unwrap();
        fs::read_dir(root).unwrap().next().is_none()
    }

    fn snapshot(dir: &Path) -> Vec<(PathBuf, Vec<u8>, std::time::SystemTime)> {
        let mut files: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let md = e.metadata().unwrap();
                (
                    e.path().to_path_buf(),
                    fs::read(e.path()).unwrap(),
                    md.modified().unwrap(),
                )
            })
            .collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));
        files
    }

    fn system_sha(opts: &PinnOptions, device: Device) -> String {
        let text = fs::read_to_string(opts.device_dir(device).join(PARTITIONS_FILE)).unwrap();
        let info: PartitionsInfo = serde_json::from_str(&text).unwrap();
        info.partitions[0].sha512sum.clone().unwrap()
    }

    #[test]
    fn test_packages_devices_in_requested_order() {
        let fx = Fixture::new();
        fx.add_update("RPi4", "aarch64", b"pi4");
        fx.add_update("RPi2", "arm", b"pi2");
        let opts = fx.options(&[Device::RPi4, Device::RPi2]);

        let report = run(&opts).unwrap();

        assert!(report.os_list_written);
        let names: Vec<_> = report.os_list.os_list.iter().map(|e| e.os_name.as_str()).collect();
        assert_eq!(names, vec!["LibreELEC_RPi4", "LibreELEC_RPi2"]);

        let on_disk: OsList =
            serde_json::from_str(&fs::read_to_string(opts.os_list_path()).unwrap()).unwrap();
        assert_eq!(on_disk, report.os_list);

        let dir = opts.device_dir(Device::RPi4);
        for file in [
            "System.tar",
            OS_INFO_FILE,
            PARTITIONS_FILE,
            PARTITION_SETUP_FILE,
            "LibreELEC_RPi4.png",
            MARKETING_FILE,
        ] {
            assert!(dir.join(file).is_file(), "{file}");
        }
        let mode = fs::metadata(dir.join(PARTITION_SETUP_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
        assert!(scratch_is_empty(&opts));
    }

    #[test]
    fn test_rerun_without_force_leaves_device_untouched() {
        let fx = Fixture::new();
        fx.add_update("RPi4", "arm", b"pi4");
        let opts = fx.options(&[Device::RPi4]);

        let first = run(&opts).unwrap();
        let before = snapshot(&opts.device_dir(Device::RPi4));

        let second = run(&opts).unwrap();

        assert_eq!(second.outcomes, vec![DeviceOutcome::Skipped(Device::RPi4)]);
        assert!(!second.os_list_written);
        assert_eq!(second.os_list, first.os_list);
        assert_eq!(snapshot(&opts.device_dir(Device::RPi4)), before);
    }

    #[test]
    fn test_force_regenerates_and_tracks_content() {
        let fx = Fixture::new();
        fx.add_update("RPi5", "aarch64", b"first");
        let mut opts = fx.options(&[Device::RPi5]);
        run(&opts).unwrap();
        let original = system_sha(&opts, Device::RPi5);

        fs::write(opts.device_dir(Device::RPi5).join("stale"), b"x").unwrap();
        opts.force = true;
        let report = run(&opts).unwrap();
        assert_eq!(report.outcomes, vec![DeviceOutcome::Extracted(Device::RPi5)]);
        assert!(report.os_list_written);
        assert!(!opts.device_dir(Device::RPi5).join("stale").exists());
        assert_eq!(system_sha(&opts, Device::RPi5), original);

        fx.add_update("RPi5", "aarch64", b"second");
        run(&opts).unwrap();
        assert_ne!(system_sha(&opts, Device::RPi5), original);
    }

    #[test]
    fn test_missing_update_archive_aborts() {
        let fx = Fixture::new();
        fx.add_update("RPi4", "arm", b"pi4");
        let opts = fx.options(&[Device::RPi4, Device::RPi5]);

        let err = run(&opts).unwrap_err();
        assert!(err.chain().any(|e| matches!(
            e.downcast_ref::<ReleaseError>(),
            Some(ReleaseError::MissingArtifact { .. })
        )));
        assert!(!opts.os_list_path().exists());
        assert!(scratch_is_empty(&opts));
    }

    #[test]
    fn test_missing_icon_aborts() {
        let fx = Fixture::new();
        fx.add_update("RPi4", "arm", b"pi4");
        fs::remove_file(fx.tmp.path().join("assets/LibreELEC.png")).unwrap();
        let opts = fx.options(&[Device::RPi4]);

        let err = run(&opts).unwrap_err();
        assert!(err.chain().any(|e| matches!(
            e.downcast_ref::<ReleaseError>(),
            Some(ReleaseError::MissingAsset(path)) if path.ends_with("LibreELEC_RPi4.png")
        )));
        assert!(!opts.device_dir(Device::RPi4).exists());
        assert!(!opts.os_list_path().exists());
        assert!(scratch_is_empty(&opts));
    }

    #[test]
    fn test_missing_marketing_asset_fails_before_writing() {
        let fx = Fixture::new();
        fx.add_update("RPi4", "arm", b"pi4");
        fs::remove_file(fx.tmp.path().join("assets/marketing.tar")).unwrap();
        let opts = fx.options(&[Device::RPi4]);

        assert!(run(&opts).is_err());
        assert!(!opts.output_dir.exists());
    }

    #[test]
    fn test_publish_copies_byte_for_byte() {
        let fx = Fixture::new();
        fx.add_update("RPi2", "arm", b"pi2");
        let mut opts = fx.options(&[Device::RPi2]);
        opts.release = true;

        let report = run(&opts).unwrap();
        let published = report.published.unwrap();
        assert_eq!(published, opts.published_os_list_path());
        assert_eq!(fs::read(&published).unwrap(), fs::read(opts.os_list_path()).unwrap());

        let again = run(&opts).unwrap();
        assert_eq!(again.published.unwrap(), published);
        assert_eq!(fs::read(&published).unwrap(), fs::read(opts.os_list_path()).unwrap());
    }

    #[test]
    fn test_refresh_policy_rewrites_missing_and_existing_metadata() {
        let fx = Fixture::new();
        fx.add_update("RPi4", "arm", b"pi4");
        let mut opts = fx.options(&[Device::RPi4]);
        run(&opts).unwrap();

        let dir = opts.device_dir(Device::RPi4);
        fs::remove_file(dir.join(PARTITIONS_FILE)).unwrap();
        fs::write(dir.join(OS_INFO_FILE), b"{}").unwrap();

        run(&opts).unwrap();
        assert!(dir.join(PARTITIONS_FILE).is_file());
        assert_eq!(fs::read(dir.join(OS_INFO_FILE)).unwrap(), b"{}");

        opts.metadata_policy = MetadataPolicy::Refresh;
        run(&opts).unwrap();
        let info: OsInfo =
            serde_json::from_str(&fs::read_to_string(dir.join(OS_INFO_FILE)).unwrap()).unwrap();
        assert_eq!(info.name, "LibreELEC_RPi4");
    }
}
