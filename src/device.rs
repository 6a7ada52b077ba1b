//! Raspberry Pi device codes and their static metadata.
//!
//! Every lookup is a `match` over the closed [`Device`] enum, so an unknown
//! device code can only fail once, at parse time.

use std::fmt;
use std::str::FromStr;

use crate::error::ReleaseError;

/// Device codes that release artifacts are published for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Device {
    RPi,
    RPi2,
    RPi4,
    RPi5,
}

/// CPU architecture suffix used in artifact file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Arm,
    Aarch64,
}

impl Arch {
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::Arm => "arm",
            Arch::Aarch64 => "aarch64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Device {
    pub const ALL: [Device; 4] = [Device::RPi, Device::RPi2, Device::RPi4, Device::RPi5];

    /// Code as it appears in artifact names (`LibreELEC-RPi4.aarch64-...`).
    pub fn code(self) -> &'static str {
        match self {
            Device::RPi => "RPi",
            Device::RPi2 => "RPi2",
            Device::RPi4 => "RPi4",
            Device::RPi5 => "RPi5",
        }
    }

    /// Architectures to try, in order, when locating an artifact.
    pub fn archs(self) -> &'static [Arch] {
        match self {
            Device::RPi => &[Arch::Arm],
            Device::RPi2 | Device::RPi4 | Device::RPi5 => &[Arch::Arm, Arch::Aarch64],
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Device::RPi => "Raspberry Pi Zero and 1",
            Device::RPi2 => "Raspberry Pi 2 and 3",
            Device::RPi4 => "Raspberry Pi 4 and 400",
            Device::RPi5 => "Raspberry Pi 5",
        }
    }

    /// Description shown by Raspberry Pi Imager.
    pub fn imager_description(self) -> &'static str {
        match self {
            Device::RPi => "For the Raspberry Pi Zero, 1 and Compute Module 1",
            Device::RPi2 => "For the Raspberry Pi 2, 3, Zero 2 and Compute Module 3",
            Device::RPi4 => "For the Raspberry Pi 4, 400 and Compute Module 4",
            Device::RPi5 => "For the Raspberry Pi 5, 500 and Compute Module 5",
        }
    }

    /// Model names PINN matches against the board it runs on.
    pub fn supported_models(self) -> &'static [&'static str] {
        match self {
            Device::RPi => &["Pi Model", "Pi Compute Module Rev", "Pi Zero"],
            Device::RPi2 => &["Pi 2", "Pi 3", "Pi Compute Module 3", "Pi Zero 2"],
            Device::RPi4 => &["Pi 4", "Pi 400", "Pi Compute Module 4"],
            Device::RPi5 => &["Pi 5", "Pi 500", "Pi Compute Module 5"],
        }
    }

    /// Serial console parameter for the kernel command line.
    pub fn serial_console(self) -> &'static str {
        match self {
            Device::RPi5 => "console=ttyAMA10,115200",
            Device::RPi | Device::RPi2 | Device::RPi4 => "console=ttyAMA0,115200",
        }
    }

    /// Per-architecture artifact name: `<product>-<device>.<arch>-<version><ext>`.
    pub fn artifact_name(self, product: &str, arch: Arch, version: &str, ext: &str) -> String {
        format!("{product}-{}.{arch}-{version}{ext}", self.code())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Device {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Device::ALL
            .into_iter()
            .find(|d| d.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| ReleaseError::UnknownDevice(s.to_string()))
    }
}

/// Parse a comma-separated device list, keeping the given order.
pub fn parse_device_list(list: &str) -> Result<Vec<Device>, ReleaseError> {
    let devices = list
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(Device::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    if devices.is_empty() {
        return Err(ReleaseError::UnknownDevice(list.to_string()));
    }
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_codes() {
        assert_eq!("RPi4".parse::<Device>().unwrap(), Device::RPi4);
        assert_eq!("rpi2".parse::<Device>().unwrap(), Device::RPi2);
        assert!(matches!(
            "RPi3".parse::<Device>(),
            Err(ReleaseError::UnknownDevice(code)) if code == "RPi3"
        ));
    }

    #[test]
    fn test_parse_device_list_keeps_order() {
        let devices = parse_device_list("RPi5, RPi2,,RPi4").unwrap();
        assert_eq!(devices, vec![Device::RPi5, Device::RPi2, Device::RPi4]);
        assert!(parse_device_list(" , ").is_err());
        assert!(parse_device_list("RPi4,Odroid").is_err());
    }

    #[test]
    fn test_serial_console_differs_only_for_rpi5() {
        let rpi5 = Device::RPi5.serial_console();
        for device in [Device::RPi, Device::RPi2, Device::RPi4] {
            assert_ne!(device.serial_console(), rpi5);
            assert_eq!(device.serial_console(), Device::RPi.serial_console());
        }
    }

    #[test]
    fn test_artifact_name() {
        assert_eq!(
            Device::RPi4.artifact_name("LibreELEC", Arch::Aarch64, "12.0.1", ".img.gz"),
            "LibreELEC-RPi4.aarch64-12.0.1.img.gz"
        );
    }
}
