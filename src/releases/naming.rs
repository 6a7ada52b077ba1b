//! Release file name parsing and build display names.
//!
//! ```text
//! release: {distro}-{device.arch}-{maj.min.bug}{-uboot}.(tar|img.gz)
//! nightly: {distro}-{device.arch}-{maj.min}-nightly-{date}-{githash}{-uboot}.(tar|img.gz)
//! ```

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

const RELEASE_PATTERN: &str = r"^(\w+)-(\w+[.]\w+)-(\d+[.]\d+)[.]\d+(\S*)\.(tar|img\.gz)";
const NIGHTLY_PATTERN: &str =
    r"^(\w+)-(\w+[.]\w+)-(\d+[.]\d+)-nightly-\d+-[0-9a-fA-F]+(\S*)\.(tar|img\.gz)";

fn release_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(RELEASE_PATTERN).expect("static regex"))
}

fn nightly_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(NIGHTLY_PATTERN).expect("static regex"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileKind {
    Tarball,
    Image,
}

/// Pieces of a release file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub distro: String,
    /// `<device>.<arch>`, e.g. `RPi4.aarch64`.
    pub build: String,
    /// `maj.min`
    pub train: String,
    /// Board suffix of u-boot images, without the leading `-`.
    pub uboot: Option<String>,
    pub kind: FileKind,
}

impl ParsedName {
    /// `<distro>-<maj.min>`
    pub fn train_key(&self) -> String {
        format!("{}-{}", self.distro, self.train)
    }
}

/// How a file name in the release tree was classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Release(ParsedName),
    /// Not a release artifact at all.
    Ignored,
    /// Looks like an artifact but does not match the naming scheme.
    Unparsable,
}

pub fn classify(file_name: &str, product: &str) -> Classified {
    if !file_name.starts_with(&format!("{product}-")) {
        return Classified::Ignored;
    }

    let kind = if file_name.ends_with(".tar") && !file_name.ends_with("-noobs.tar") {
        FileKind::Tarball
    } else if file_name.ends_with(".img.gz") {
        FileKind::Image
    } else {
        return Classified::Ignored;
    };

    let re = if file_name.contains("nightly") {
        nightly_regex()
    } else {
        release_regex()
    };

    let Some(caps) = re.captures(file_name) else {
        return Classified::Unparsable;
    };

    let uboot = caps[4].trim_start_matches('-');
    Classified::Release(ParsedName {
        distro: caps[1].to_string(),
        build: caps[2].to_string(),
        train: caps[3].to_string(),
        uboot: (!uboot.is_empty()).then(|| uboot.to_string()),
        kind,
    })
}

/// Strip the artifact extension.
pub fn base_name(file_name: &str) -> &str {
    file_name
        .strip_suffix(".tar")
        .or_else(|| file_name.strip_suffix(".img.gz"))
        .unwrap_or(file_name)
}

/// Order train keys by distro name, then numerically by `maj.min`.
pub fn compare_trains(a: &str, b: &str) -> Ordering {
    fn split(key: &str) -> (&str, (u64, u64)) {
        let (distro, version) = key.split_once('-').unwrap_or((key, ""));
        let (major, minor) = version.split_once('.').unwrap_or((version, "0"));
        (
            distro,
            (major.parse().unwrap_or(0), minor.parse().unwrap_or(0)),
        )
    }
    split(a).cmp(&split(b))
}

const DISPLAY_NAMES: &[(&str, &str)] = &[
    ("A64.arm", "Allwinner A64"),
    ("AMLGX.arm", "Amlogic GXBB/GXL/GXM/G12/SM1"),
    ("Dragonboard.arm", "Qualcomm Dragonboard"),
    ("FORMAT.any", "Tools"),
    ("Generic.x86_64", "Generic AMD/Intel/NVIDIA (x86_64)"),
    ("H3.arm", "Allwinner H3"),
    ("H5.arm", "Allwinner H5"),
    ("H6.arm", "Allwinner H6"),
    ("imx6.arm", "NXP i.MX6"),
    ("iMX6.arm", "NXP i.MX6"),
    ("iMX8.arm", "NXP i.MX8"),
    ("KVIM.arm", "Amlogic 3.14"),
    ("KVIM2.arm", "Amlogic 3.14"),
    ("Khadas_VIM.arm", "Amlogic 3.14"),
    ("Khadas_VIM2.arm", "Amlogic 3.14"),
    ("LePotato.arm", "Amlogic 3.14"),
    ("MiQi.arm", "Rockchip RK3288"),
    ("Odroid_C2.aarch64", "Amlogic 3.14"),
    ("Odroid_C2.arm", "Amlogic 3.14"),
    ("R40.arm", "Allwinner R40"),
    ("RK3288.arm", "Rockchip RK3288"),
    ("RK3328.arm", "Rockchip RK3328"),
    ("RK3399.arm", "Rockchip RK3399"),
    ("RPi.arm", "Raspberry Pi Zero and 1"),
    ("RPi2.arm", "Raspberry Pi 2 and 3"),
    ("RPi3.arm", "Raspberry Pi 3"),
    ("RPi4.arm", "Raspberry Pi 4 and 400"),
    ("S905.arm", "Amlogic 3.14"),
    ("S912.arm", "Amlogic 3.14"),
    ("Slice.arm", "Slice CM1/CM3"),
    ("Slice3.arm", "Slice CM1/CM3"),
    ("TinkerBoard.arm", "Rockchip RK3288"),
    ("Virtual.x86_64", "Virtual x86_64"),
    ("WeTek_Core.arm", "Amlogic 3.10"),
    ("WeTek_Hub.aarch64", "Amlogic 3.14"),
    ("WeTek_Hub.arm", "Amlogic 3.14"),
    ("WeTek_Play.arm", "Amlogic 3.10"),
    ("WeTek_Play_2.aarch64", "Amlogic 3.14"),
    ("WeTek_Play_2.arm", "Amlogic 3.14"),
];

/// Human-readable name for a build; unknown builds are shown as-is.
pub fn display_name(build: &str) -> &str {
    DISPLAY_NAMES
        .iter()
        .find(|(key, _)| *key == build)
        .map(|(_, name)| *name)
        .unwrap_or(build)
}
