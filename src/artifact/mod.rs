//! Artifact handling shared by the packaging tools.
//!
//! - [`archive`] - Tar unpack/pack and xz compression
//! - [`filesystem`] - Copy/move helpers and atomic JSON writes
//! - [`gzip`] - Inspection of `*.img.gz` disk images

pub mod archive;
pub mod filesystem;
pub mod gzip;
