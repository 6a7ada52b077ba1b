//! Preflight checks run before any output is touched.
//!
//! Every tool validates its inputs up front so a run aborts before writing
//! anything when the environment is incomplete.
//!
//! # Example
//!
//! ```rust
//! use release_packager::preflight::{check_required, Requirement};
//! use std::path::Path;
//!
//! let reqs = [
//!     Requirement::Dir(Path::new("/nonexistent/releases")),
//!     Requirement::File(Path::new("/nonexistent/marketing.tar")),
//! ];
//! assert!(check_required(&reqs).is_err());
//! ```

use anyhow::{bail, Result};
use std::path::Path;

use crate::error::ReleaseError;

/// An input that must exist before a tool starts.
#[derive(Debug, Clone, Copy)]
pub enum Requirement<'a> {
    Dir(&'a Path),
    File(&'a Path),
}

impl Requirement<'_> {
    fn is_met(&self) -> bool {
        match self {
            Requirement::Dir(path) => path.is_dir(),
            Requirement::File(path) => path.is_file(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Requirement::Dir(path) => format!("  directory {}", path.display()),
            Requirement::File(path) => format!("  file {}", path.display()),
        }
    }
}

/// Check that every requirement holds, reporting all missing inputs at once.
pub fn check_required(reqs: &[Requirement<'_>]) -> Result<()> {
    let missing: Vec<String> = reqs
        .iter()
        .filter(|req| !req.is_met())
        .map(Requirement::describe)
        .collect();

    if !missing.is_empty() {
        bail!("Missing required inputs:\n{}", missing.join("\n"));
    }

    Ok(())
}

/// Require a single existing directory.
pub fn require_dir(path: &Path) -> Result<(), ReleaseError> {
    if path.is_dir() {
        return Ok(());
    }
    Err(ReleaseError::MissingDirectory(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_check_required_success() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("marketing.tar");
        fs::write(&file, b"").unwrap();

        let reqs = [Requirement::Dir(temp.path()), Requirement::File(&file)];
        assert!(check_required(&reqs).is_ok());
    }

    #[test]
    fn test_check_required_lists_every_missing_input() {
        let temp = TempDir::new().unwrap();
        let missing_dir = temp.path().join("releases");
        let missing_file = temp.path().join("icon.png");

        let reqs = [
            Requirement::Dir(&missing_dir),
            Requirement::File(&missing_file),
            Requirement::Dir(temp.path()),
        ];
        let msg = check_required(&reqs).unwrap_err().to_string();
        assert!(msg.contains("releases"));
        assert!(msg.contains("icon.png"));
    }

    #[test]
    fn test_file_is_not_a_directory() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("plain");
        fs::write(&file, b"").unwrap();
        assert!(matches!(
            require_dir(&file),
            Err(ReleaseError::MissingDirectory(_))
        ));
    }
}
