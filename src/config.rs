//! Packaging configuration.
//!
//! Values come from built-in defaults, optionally overridden by a TOML file:
//!
//! ```toml
//! [release]
//! product = "LibreELEC"
//! base_url = "https://releases.libreelec.tv"
//! releases_dir = "/var/www/releases"
//!
//! [imager]
//! devices = ["RPi2", "RPi4", "RPi5"]
//!
//! [pinn]
//! devices = ["RPi2", "RPi4", "RPi5"]
//! password = "libreelec"
//! ```
//!
//! Relative directories in the file resolve against the file's own directory.
//! Command-line flags override both.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::device::Device;

pub const DEFAULT_PRODUCT: &str = "LibreELEC";
pub const DEFAULT_BASE_URL: &str = "https://releases.libreelec.tv";
pub const DEFAULT_WEBSITE: &str = "https://libreelec.tv";
pub const DEFAULT_DESCRIPTION: &str =
    "LibreELEC is a fast and user-friendly Kodi Entertainment Center distribution.";
pub const DEFAULT_USERNAME: &str = "root";
pub const DEFAULT_PASSWORD: &str = "libreelec";
pub const DEFAULT_DEVICES: [Device; 3] = [Device::RPi2, Device::RPi4, Device::RPi5];

/// Resolved configuration shared by every subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseConfig {
    pub product: String,
    pub base_url: String,
    pub website: String,
    pub description: String,
    pub releases_dir: PathBuf,
    pub output_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub imager_devices: Vec<Device>,
    pub pinn_devices: Vec<Device>,
    pub username: String,
    pub password: String,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            product: DEFAULT_PRODUCT.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            website: DEFAULT_WEBSITE.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            releases_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            assets_dir: PathBuf::from("assets"),
            imager_devices: DEFAULT_DEVICES.to_vec(),
            pinn_devices: DEFAULT_DEVICES.to_vec(),
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    #[serde(default)]
    release: ReleaseToml,
    #[serde(default)]
    imager: DevicesToml,
    #[serde(default)]
    pinn: PinnToml,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReleaseToml {
    product: Option<String>,
    base_url: Option<String>,
    website: Option<String>,
    description: Option<String>,
    releases_dir: Option<String>,
    output_dir: Option<String>,
    assets_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DevicesToml {
    devices: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PinnToml {
    devices: Option<Vec<String>>,
    username: Option<String>,
    password: Option<String>,
}

impl ReleaseConfig {
    /// Load `path` on top of the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config '{}'", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&raw, base)
            .with_context(|| format!("parsing config '{}'", path.display()))
    }

    /// Defaults when no file is given.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn from_toml_str(raw: &str, base: &Path) -> Result<Self> {
        let parsed: ConfigToml = toml::from_str(raw)?;
        let mut config = Self::default();

        let release = parsed.release;
        if let Some(product) = release.product {
            config.product = product;
        }
        if let Some(url) = release.base_url {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(website) = release.website {
            config.website = website;
        }
        if let Some(description) = release.description {
            config.description = description;
        }
        if let Some(dir) = release.releases_dir {
            config.releases_dir = resolve_path(base, &dir);
        }
        if let Some(dir) = release.output_dir {
            config.output_dir = resolve_path(base, &dir);
        }
        if let Some(dir) = release.assets_dir {
            config.assets_dir = resolve_path(base, &dir);
        }

        if let Some(devices) = parsed.imager.devices {
            config.imager_devices = parse_devices(&devices).context("invalid [imager] devices")?;
        }
        if let Some(devices) = parsed.pinn.devices {
            config.pinn_devices = parse_devices(&devices).context("invalid [pinn] devices")?;
        }
        if let Some(username) = parsed.pinn.username {
            config.username = username;
        }
        if let Some(password) = parsed.pinn.password {
            config.password = password;
        }

        Ok(config)
    }
}

fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

fn parse_devices(codes: &[String]) -> Result<Vec<Device>> {
    let devices = codes
        .iter()
        .map(|code| Device::from_str(code))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(devices)
}
