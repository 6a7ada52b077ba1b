//! Domain errors for release packaging.
//!
//! Everything else flows through `anyhow`; these variants exist so callers
//! (and tests) can tell a bad invocation from a missing artifact.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("invalid version '{version}': expected {pattern}")]
    InvalidVersion { version: String, pattern: &'static str },

    #[error("unknown device '{0}'; expected one of: RPi, RPi2, RPi4, RPi5")]
    UnknownDevice(String),

    #[error("missing release artifact for {device}: tried {}", format_paths(.tried))]
    MissingArtifact { device: String, tried: Vec<PathBuf> },

    #[error("missing asset: {}", .0.display())]
    MissingAsset(PathBuf),

    #[error("{} is not a valid path", .0.display())]
    MissingDirectory(PathBuf),

    #[error("malformed update archive {}: {reason}", .archive.display())]
    MalformedArchive { archive: PathBuf, reason: String },
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_artifact_lists_every_candidate() {
        let err = ReleaseError::MissingArtifact {
            device: "RPi4".to_string(),
            tried: vec![
                PathBuf::from("/r/LibreELEC-RPi4.arm-1.0.0.tar"),
                PathBuf::from("/r/LibreELEC-RPi4.aarch64-1.0.0.tar"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("RPi4.arm-1.0.0.tar"));
        assert!(msg.contains("RPi4.aarch64-1.0.0.tar"));
    }
}
