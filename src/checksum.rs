//! Streaming SHA-256 / SHA-512 digests.
//!
//! Files are hashed in 1 MiB chunks so multi-gigabyte images never have to
//! fit in memory.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256, Sha512};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const CHUNK_SIZE: usize = 1024 * 1024;

/// Hex digest plus the number of bytes that went into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub hex: String,
    pub size: u64,
}

/// Hash everything `reader` yields.
pub fn digest_reader<D: Digest, R: Read>(mut reader: R) -> std::io::Result<FileDigest> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut size = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    let hex = hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    Ok(FileDigest { hex, size })
}

fn digest_file<D: Digest>(path: &Path) -> Result<FileDigest> {
    let f = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    digest_reader::<D, _>(BufReader::new(f))
        .with_context(|| format!("Failed to read {}", path.display()))
}

pub fn sha256_file(path: &Path) -> Result<FileDigest> {
    digest_file::<Sha256>(path)
}

pub fn sha512_file(path: &Path) -> Result<FileDigest> {
    digest_file::<Sha512>(path)
}
