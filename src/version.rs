//! Release version validation.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::ReleaseError;

/// Version pattern accepted for published imager releases.
pub const IMAGER_VERSION_PATTERN: &str = r"^[0-9]{1,2}\.[0-9]\.[0-9]{1,3}$";

fn imager_version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(IMAGER_VERSION_PATTERN).expect("static regex"))
}

/// Reject anything that is not a plain `major.minor.patch` release version.
pub fn validate_imager_version(version: &str) -> Result<(), ReleaseError> {
    if imager_version_regex().is_match(version) {
        return Ok(());
    }
    Err(ReleaseError::InvalidVersion {
        version: version.to_string(),
        pattern: IMAGER_VERSION_PATTERN,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_release_versions() {
        for v in ["9.2.8", "10.0.4", "12.0.1", "1.0.100"] {
            assert!(validate_imager_version(v).is_ok(), "{v}");
        }
    }

    #[test]
    fn test_rejects_other_versions() {
        for v in [
            "", "12", "12.0", "12.10.1", "123.0.1", "12.0.1234", "12.0.1-rc1", " 12.0.1", "12.80.001x",
            "\u{661}\u{662}.\u{660}.\u{661}",
        ] {
            assert!(
                matches!(
                    validate_imager_version(v),
                    Err(ReleaseError::InvalidVersion { .. })
                ),
                "{v}"
            );
        }
    }
}
