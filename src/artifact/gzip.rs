//! Compressed disk image inspection (`*.img.gz`).

use anyhow::{bail, Context, Result};
use flate2::read::MultiGzDecoder;
use sha2::Sha256;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::checksum::{digest_reader, FileDigest};

/// Smallest possible gzip member: 10 byte header, empty deflate block, 8 byte trailer.
const GZIP_MIN_LEN: u64 = 18;

/// Uncompressed size recorded in the gzip trailer (ISIZE, modulo 2^32).
///
/// Same value `gzip -l` reports; images beyond 4 GiB wrap.
pub fn gzip_uncompressed_size(path: &Path) -> Result<u64> {
    let mut f = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let len = f.metadata()?.len();
    if len < GZIP_MIN_LEN {
        bail!("{} is too short to be a gzip file", path.display());
    }

    let mut magic = [0u8; 2];
    f.read_exact(&mut magic)?;
    if magic != [0x1f, 0x8b] {
        bail!("{} is not a gzip file", path.display());
    }

    let mut trailer = [0u8; 4];
    f.seek(SeekFrom::End(-4))?;
    f.read_exact(&mut trailer)
        .with_context(|| format!("Failed to read gzip trailer of {}", path.display()))?;
    Ok(u64::from(u32::from_le_bytes(trailer)))
}

/// SHA-256 of the decompressed stream, computed without writing it to disk.
pub fn sha256_decompressed(path: &Path) -> Result<FileDigest> {
    let f = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let decoder = MultiGzDecoder::new(BufReader::new(f));
    digest_reader::<Sha256, _>(decoder)
        .with_context(|| format!("Failed to decompress {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use sha2::Digest;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_gz(path: &Path, data: &[u8]) {
        let mut enc = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap();
    }

    #[test]
    fn test_footer_size_matches_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("disk.img.gz");
        let data = vec![0xAAu8; 300_000];
        write_gz(&path, &data);

        assert_eq!(gzip_uncompressed_size(&path).unwrap(), 300_000);
    }

    #[test]
    fn test_decompressed_digest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("disk.img.gz");
        let data = b"raw disk image bytes".repeat(1000);
        write_gz(&path, &data);

        let digest = sha256_decompressed(&path).unwrap();
        let expected: String = Sha256::digest(&data)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        assert_eq!(digest.hex, expected);
        assert_eq!(digest.size, data.len() as u64);
    }

    #[test]
    fn test_rejects_non_gzip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plain.img.gz");
        fs::write(&path, vec![0u8; 64]).unwrap();
        assert!(gzip_uncompressed_size(&path).is_err());
        assert!(sha256_decompressed(&path).is_err());
    }
}
