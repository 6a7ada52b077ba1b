//! Nightly image archive pruning.
//!
//! Every nightly image inside the retention window is kept. Older images are
//! thinned to one per build (or u-boot board) per ISO week; the first image
//! of each week survives and the rest are purged.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use time::{Date, Duration, Month, OffsetDateTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::preflight::require_dir;

const NIGHTLY_IMAGE_PATTERN: &str =
    r"^(\w+)-([0-9a-zA-Z_-]+[.]\w+)-(\d+[.]\d+)-nightly-(\d+)-([0-9a-fA-F]+)(\S*)\.img\.gz";

const MIB: f64 = 1024.0 * 1024.0;

fn nightly_image_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(NIGHTLY_IMAGE_PATTERN).expect("static regex"))
}

#[derive(Debug, Clone)]
pub struct PruneOptions {
    pub input_dir: PathBuf,
    pub product: String,
    /// Days during which every image is kept.
    pub keep_days: u32,
    pub delete: bool,
    /// List the images kept beyond the window and stop.
    pub retained: bool,
    pub verbose: bool,
}

/// A nightly image found in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NightlyImage {
    pub path: PathBuf,
    pub build: String,
    pub uboot: Option<String>,
    pub date: Date,
    pub size: u64,
}

impl NightlyImage {
    /// ISO `year-week` the image was built in.
    pub fn week(&self) -> String {
        let (year, week, _) = self.date.to_iso_week_date();
        format!("{year}-{week}")
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrunePlan {
    pub kept: Vec<NightlyImage>,
    pub purged: Vec<NightlyImage>,
}

impl PrunePlan {
    pub fn kept_size(&self) -> u64 {
        self.kept.iter().map(|i| i.size).sum()
    }

    pub fn purged_size(&self) -> u64 {
        self.purged.iter().map(|i| i.size).sum()
    }
}

/// Parse `<product>-<build>-<train>-nightly-<YYYYMMDD>-<hash>[-<uboot>].img.gz`.
fn parse_nightly(path: &Path, file_name: &str) -> Option<(String, Option<String>, Date)> {
    let caps = nightly_image_regex().captures(file_name)?;
    let stamp = &caps[4];
    if stamp.len() != 8 {
        return None;
    }
    let year: i32 = stamp[0..4].parse().ok()?;
    let month: u8 = stamp[4..6].parse().ok()?;
    let day: u8 = stamp[6..8].parse().ok()?;
    let date = Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()?;
    debug!("{} built {}", path.display(), date);

    let uboot = caps[6].trim_start_matches('-');
    Some((
        caps[2].to_string(),
        (!uboot.is_empty()).then(|| uboot.to_string()),
        date,
    ))
}

/// Collect nightly images under `input_dir`, oldest first.
pub fn scan(input_dir: &Path, product: &str) -> Result<Vec<NightlyImage>> {
    let prefix = format!("{product}-");
    let mut images = Vec::new();

    for entry in WalkDir::new(input_dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", input_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !(name.starts_with(&prefix) && name.ends_with(".img.gz") && name.contains("nightly")) {
            debug!("ignored file: {name}");
            continue;
        }
        let Some((build, uboot, date)) = parse_nightly(entry.path(), &name) else {
            warn!("failed to parse file name: {name}");
            continue;
        };
        let size = entry
            .metadata()
            .with_context(|| format!("reading size of {}", entry.path().display()))?
            .len();
        images.push(NightlyImage {
            path: entry.path().to_path_buf(),
            build,
            uboot,
            date,
            size,
        });
    }

    images.sort_by(|a, b| (a.date, &a.path).cmp(&(b.date, &b.path)));
    Ok(images)
}

/// Decide what to keep, given images sorted oldest first.
///
/// A window reaching past the earliest representable date covers every image.
pub fn plan(images: &[NightlyImage], keep_days: u32, now: OffsetDateTime) -> PrunePlan {
    let Some(cutoff) = now.checked_sub(Duration::days(i64::from(keep_days))) else {
        debug!("retention of {keep_days} days covers every image");
        return PrunePlan::default();
    };
    let mut builds: Vec<&str> = images.iter().map(|i| i.build.as_str()).collect();
    builds.sort_unstable();
    builds.dedup();

    let mut result = PrunePlan::default();
    for build in builds {
        let mut weeks: Vec<(&str, String)> = Vec::new();
        for image in images.iter().filter(|i| i.build == build) {
            if image.date.midnight().assume_utc() >= cutoff {
                continue;
            }
            let slot = (image.uboot.as_deref().unwrap_or(build), image.week());
            if weeks.contains(&slot) {
                result.purged.push(image.clone());
            } else {
                weeks.push(slot);
                result.kept.push(image.clone());
            }
        }
    }

    result.kept.sort_by_key(|i| i.date);
    result.purged.sort_by_key(|i| i.date);
    result
}

/// Print the plan and, with `delete`, remove the purged images.
pub fn apply(plan: &PrunePlan, opts: &PruneOptions, out: &mut impl Write) -> Result<()> {
    if !plan.kept.is_empty() && (opts.verbose || opts.retained) {
        writeln!(out, "Below files selected for keeping:")?;
        for image in &plan.kept {
            if opts.verbose {
                writeln!(out, "{}\t{}\t{}", image.file_name(), image.size, image.week())?;
            } else {
                writeln!(out, "{}", image.path.display())?;
            }
        }
        if opts.verbose {
            writeln!(
                out,
                "Total size of kept files: {:?}MiB",
                plan.kept_size() as f64 / MIB
            )?;
        }
    }
    if opts.retained {
        return Ok(());
    }

    if plan.purged.is_empty() {
        writeln!(out, "Nothing found to delete.")?;
        return Ok(());
    }

    if opts.verbose {
        writeln!(out, "\nBelow files selected for purging:")?;
        if !opts.delete {
            writeln!(out, "  --delete not invoked. Keeping all files.")?;
        }
    }
    for image in &plan.purged {
        if opts.verbose {
            writeln!(out, "{}\t{}\t{}", image.file_name(), image.size, image.week())?;
        } else {
            writeln!(out, "{}", image.path.display())?;
        }
        if opts.delete && image.path.is_file() {
            fs::remove_file(&image.path)
                .with_context(|| format!("Failed to remove {}", image.path.display()))?;
            info!("[prune] removed {}", image.path.display());
        }
    }
    if opts.verbose {
        writeln!(
            out,
            "Total size of purged files: {:?}MiB",
            plan.purged_size() as f64 / MIB
        )?;
    }
    Ok(())
}

/// Scan, plan against the current time and report on stdout.
pub fn run(opts: &PruneOptions) -> Result<PrunePlan> {
    require_dir(&opts.input_dir)?;
    let images = scan(&opts.input_dir, &opts.product)?;
    let plan = plan(&images, opts.keep_days, OffsetDateTime::now_utc());
    apply(&plan, opts, &mut std::io::stdout().lock())?;
    Ok(plan)
}
