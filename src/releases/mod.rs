//! `releases.json` index of every published tarball and image.
//!
//! The index is keyed by train (`LibreELEC-12.0`), then by build
//! (`RPi4.aarch64`), then by a running release number. A tarball and an
//! image sharing a base name are one release. Every digest is computed from
//! the file on disk during the run.

pub mod naming;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::artifact::filesystem::write_json_atomic;
use crate::checksum::sha256_file;
use crate::preflight::require_dir;
use crate::timestamp::{format_datetime, modified};
use naming::{base_name, classify, compare_trains, display_name, Classified, FileKind, ParsedName};

pub const RELEASES_FILE: &str = "releases.json";

/// Directories whose path contains one of these are never indexed.
const SKIPPED_DIRS: [&str; 2] = ["archive", "upload"];

/// Serialized field order is alphabetical so output matches a key-sorted dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseFile {
    pub name: String,
    pub sha256: String,
    pub size: String,
    pub subpath: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<ReleaseFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ReleaseFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uboot: Option<ReleaseFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReleases {
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub releases: BTreeMap<u32, ReleaseEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Train {
    pub prettyname_regex: String,
    pub project: BTreeMap<String, BuildReleases>,
    pub url: String,
}

pub type ReleaseCatalog = BTreeMap<String, Train>;

#[derive(Debug, Clone)]
pub struct ReleasesOptions {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub url: String,
    pub product: String,
    /// Defaults to [`default_prettyname`] for the product.
    pub prettyname: Option<String>,
}

pub fn default_prettyname(product: &str) -> String {
    format!(r"^{product}-.*-([0-9]+\.[0-9]+\.[0-9]+)")
}

/// A release file found in the input tree.
#[derive(Debug, Clone)]
struct Found {
    path: PathBuf,
    name: String,
    subpath: String,
    parsed: ParsedName,
}

/// Walk the input tree and write `releases.json` to the output directory.
pub fn generate(opts: &ReleasesOptions) -> Result<ReleaseCatalog> {
    require_dir(&opts.input_dir)?;
    require_dir(&opts.output_dir)?;

    let found = scan(&opts.input_dir, &opts.product)?;
    let catalog = build_catalog(opts, &found)?;

    let out = opts.output_dir.join(RELEASES_FILE);
    write_json_atomic(&out, &catalog)?;
    println!("Wrote: {}", out.display());
    Ok(catalog)
}

fn scan(input_dir: &Path, product: &str) -> Result<Vec<Found>> {
    let mut found = Vec::new();
    let walker = WalkDir::new(input_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let skip = entry.file_type().is_dir()
                && entry.depth() > 0
                && SKIPPED_DIRS.iter().any(|dir| {
                    entry
                        .path()
                        .strip_prefix(input_dir)
                        .unwrap_or(entry.path())
                        .to_string_lossy()
                        .contains(dir)
                });
            if skip {
                debug!("skipping directory {}", entry.path().display());
            }
            !skip
        });

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", input_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        match classify(&name, product) {
            Classified::Release(parsed) => {
                let dir = entry.path().parent().unwrap_or(input_dir);
                let subpath = dir
                    .strip_prefix(input_dir)
                    .unwrap_or(dir)
                    .to_string_lossy()
                    .into_owned();
                found.push(Found {
                    path: entry.path().to_path_buf(),
                    name,
                    subpath,
                    parsed,
                });
            }
            Classified::Unparsable => warn!("failed to parse file name: {name}"),
            Classified::Ignored => debug!("ignored file: {name}"),
        }
    }

    // Same directory and base name next to each other, tarball first.
    found.sort_by(|a, b| {
        (&a.subpath, base_name(&a.name), a.parsed.kind)
            .cmp(&(&b.subpath, base_name(&b.name), b.parsed.kind))
    });
    Ok(found)
}

fn build_catalog(opts: &ReleasesOptions, found: &[Found]) -> Result<ReleaseCatalog> {
    let url = format!("{}/", opts.url.trim_end_matches('/'));
    let prettyname = opts
        .prettyname
        .clone()
        .unwrap_or_else(|| default_prettyname(&opts.product));

    let mut trains: Vec<String> = found.iter().map(|f| f.parsed.train_key()).collect();
    trains.sort_by(|a, b| compare_trains(a, b));
    trains.dedup();
    let mut builds: Vec<&str> = found.iter().map(|f| f.parsed.build.as_str()).collect();
    builds.sort_unstable();
    builds.dedup();
    debug!("trains: {trains:?}");
    debug!("builds: {builds:?}");

    let mut catalog = ReleaseCatalog::new();
    for train in &trains {
        let mut project = BTreeMap::new();
        for build in &builds {
            let files: Vec<&Found> = found
                .iter()
                .filter(|f| f.parsed.train_key() == *train && f.parsed.build == *build)
                .collect();
            if files.is_empty() {
                continue;
            }
            let releases = group_releases(train, &files)?;
            project.insert(
                build.to_string(),
                BuildReleases {
                    display_name: display_name(build).to_string(),
                    releases,
                },
            );
        }
        catalog.insert(
            train.clone(),
            Train {
                prettyname_regex: prettyname.clone(),
                project,
                url: url.clone(),
            },
        );
    }
    Ok(catalog)
}

/// Number releases in file order, merging neighbours that share a base name.
fn group_releases(train: &str, files: &[&Found]) -> Result<BTreeMap<u32, ReleaseEntry>> {
    let mut releases = BTreeMap::new();
    let mut current: Option<(&str, &str, ReleaseEntry)> = None;

    for &file in files {
        let details = describe(train, file)?;
        let base = base_name(&file.name);

        let same_release = matches!(
            &current,
            Some((subpath, prev_base, entry))
                if *subpath == file.subpath && *prev_base == base && slot_is_free(entry, file)
        );
        if !same_release {
            if let Some((_, _, entry)) = current.take() {
                releases.insert(releases.len() as u32, entry);
            }
            current = Some((&file.subpath, base, ReleaseEntry::default()));
        }

        if let Some((_, _, entry)) = current.as_mut() {
            match (file.parsed.kind, &file.parsed.uboot) {
                (FileKind::Tarball, _) => entry.file = Some(details),
                (FileKind::Image, Some(_)) => entry.uboot = Some(details),
                (FileKind::Image, None) => entry.image = Some(details),
            }
        }
    }

    if let Some((_, _, entry)) = current {
        releases.insert(releases.len() as u32, entry);
    }
    Ok(releases)
}

fn slot_is_free(entry: &ReleaseEntry, file: &Found) -> bool {
    match (file.parsed.kind, &file.parsed.uboot) {
        (FileKind::Tarball, _) => entry.file.is_none(),
        (FileKind::Image, Some(_)) => entry.uboot.is_none(),
        (FileKind::Image, None) => entry.image.is_none(),
    }
}

fn describe(train: &str, file: &Found) -> Result<ReleaseFile> {
    info!("[releases] adding {} in {} train", file.name, train);
    let digest = sha256_file(&file.path)?;
    Ok(ReleaseFile {
        name: file.name.clone(),
        sha256: digest.hex,
        size: digest.size.to_string(),
        subpath: file.subpath.clone(),
        timestamp: format_datetime(modified(&file.path)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReleaseError;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, rel: &str, data: &[u8]) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }

    fn options(tmp: &TempDir) -> ReleasesOptions {
        ReleasesOptions {
            input_dir: tmp.path().to_path_buf(),
            output_dir: tmp.path().to_path_buf(),
            url: "https://releases.example.org/".to_string(),
            product: "LibreELEC".to_string(),
            prettyname: None,
        }
    }

    #[test]
    fn test_tar_and_image_share_a_release() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "12.0/LibreELEC-RPi4.aarch64-12.0.0.tar", b"t0");
        touch(tmp.path(), "12.0/LibreELEC-RPi4.aarch64-12.0.0.img.gz", b"i0");
        touch(tmp.path(), "12.0/LibreELEC-RPi4.aarch64-12.0.1.tar", b"t1");

        let catalog = generate(&options(&tmp)).unwrap();

        let train = &catalog["LibreELEC-12.0"];
        assert_eq!(train.url, "https://releases.example.org/");
        let build = &train.project["RPi4.aarch64"];
        assert_eq!(build.display_name, "RPi4.aarch64");
        assert_eq!(build.releases.len(), 2);

        let first = &build.releases[&0];
        assert_eq!(first.file.as_ref().unwrap().name, "LibreELEC-RPi4.aarch64-12.0.0.tar");
        assert_eq!(first.image.as_ref().unwrap().name, "LibreELEC-RPi4.aarch64-12.0.0.img.gz");
        assert_eq!(first.file.as_ref().unwrap().size, "2");
        assert_eq!(first.file.as_ref().unwrap().subpath, "12.0");
        assert_eq!(first.file.as_ref().unwrap().timestamp.len(), "2024-01-01 00:00:00".len());
        assert!(build.releases[&1].image.is_none());
    }

    #[test]
    fn test_skipped_dirs_and_foreign_files() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "archive/LibreELEC-RPi2.arm-11.0.0.tar", b"a");
        touch(tmp.path(), "upload/LibreELEC-RPi2.arm-11.0.1.tar", b"u");
        touch(tmp.path(), "LibreELEC-RPi2.arm-11.0.2-noobs.tar", b"n");
        touch(tmp.path(), "notes.txt", b"x");
        touch(tmp.path(), "LibreELEC-RPi2.arm-11.0.3.tar", b"r");
        filetime::set_file_mtime(
            tmp.path().join("LibreELEC-RPi2.arm-11.0.3.tar"),
            filetime::FileTime::from_unix_time(1_633_091_696, 0),
        )
        .unwrap();

        let catalog = generate(&options(&tmp)).unwrap();

        let releases = &catalog["LibreELEC-11.0"].project["RPi2.arm"].releases;
        assert_eq!(releases.len(), 1);
        let file = releases[&0].file.as_ref().unwrap();
        assert_eq!(file.name, "LibreELEC-RPi2.arm-11.0.3.tar");
        assert_eq!(file.subpath, "");
        assert_eq!(file.timestamp, "2021-10-01 12:34:56");
        assert_eq!(
            catalog["LibreELEC-11.0"].project["RPi2.arm"].display_name,
            "Raspberry Pi 2 and 3"
        );
    }

    #[test]
    fn test_uboot_images_and_nightlies() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "LibreELEC-A64.arm-12.0.1.tar", b"t");
        touch(tmp.path(), "LibreELEC-A64.arm-12.0.1-pine64.img.gz", b"u");
        touch(tmp.path(), "LibreELEC-A64.arm-13.0-nightly-20240101-abcdef0.tar", b"n");

        let catalog = generate(&options(&tmp)).unwrap();

        let stable = &catalog["LibreELEC-12.0"].project["A64.arm"].releases;
        assert_eq!(stable.len(), 2);
        assert!(stable.values().any(|r| r.uboot.is_some()));
        assert!(catalog.contains_key("LibreELEC-13.0"));
    }

    #[test]
    fn test_output_is_key_sorted_and_fresh() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "LibreELEC-RPi4.arm-12.0.1.tar", b"first");
        let opts = options(&tmp);
        generate(&opts).unwrap();

        touch(tmp.path(), "LibreELEC-RPi4.arm-12.0.1.tar", b"second");
        let catalog = generate(&opts).unwrap();
        let sha = &catalog["LibreELEC-12.0"].project["RPi4.arm"].releases[&0]
            .file
            .as_ref()
            .unwrap()
            .sha256;
        assert_eq!(sha, &sha256_file(&tmp.path().join("LibreELEC-RPi4.arm-12.0.1.tar")).unwrap().hex);

        let text = fs::read_to_string(tmp.path().join(RELEASES_FILE)).unwrap();
        let pretty = text.find("\"prettyname_regex\"").unwrap();
        let project = text.find("\"project\"").unwrap();
        let url = text.find("\"url\"").unwrap();
        assert!(pretty < project && project < url);
        assert!(text.contains(r#""0": {"#));
    }

    #[test]
    fn test_missing_input_dir() {
        let tmp = TempDir::new().unwrap();
        let mut opts = options(&tmp);
        opts.input_dir = tmp.path().join("missing");
        let err = generate(&opts).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReleaseError>(),
            Some(ReleaseError::MissingDirectory(_))
        ));
    }
}
