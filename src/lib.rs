//! Release packaging for Raspberry Pi installer front-ends.
//!
//! Built release artifacts (`*.img.gz` disk images and `*.tar` update
//! archives) are turned into the static files that installers and the
//! download site read:
//!
//! - **Imager list** - flat JSON array for the Raspberry Pi Imager ([`imager`])
//! - **PINN packages** - per-device system archive, `os.json`,
//!   `partitions.json`, `partition_setup.sh` and `os_list_v3.json` ([`pinn`])
//! - **Release index** - `releases.json` for the download site ([`releases`])
//! - **Archive pruning** - weekly thinning of old nightly images ([`prune`])
//!
//! # Architecture
//!
//! ```text
//! release-packager (bin)
//!     │
//!     ├── imager ──┐
//!     ├── pinn ────┤
//!     ├── releases ┼── artifact (tar/xz/gzip, atomic writes)
//!     └── prune ───┘   checksum, device, version, timestamp
//!                      config, preflight, error, logging
//! ```
//!
//! The tools never call each other; they share nothing but the filesystem.

pub mod artifact;
pub mod checksum;
pub mod config;
pub mod device;
pub mod error;
pub mod imager;
pub mod logging;
pub mod pinn;
pub mod preflight;
pub mod prune;
pub mod releases;
pub mod timestamp;
pub mod version;

pub use device::{Arch, Device};
pub use error::ReleaseError;
