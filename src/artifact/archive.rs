//! Tar and xz handling for update archives and system archives.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder as TarBuilder, EntryType, Header};
use walkdir::WalkDir;
use xz2::write::XzEncoder;

/// xz preset used for system archives.
pub const XZ_PRESET: u32 = 9;

/// Unpack a plain tar archive into `dest`.
pub fn unpack_tar(archive: &Path, dest: &Path) -> Result<()> {
    let f = File::open(archive).with_context(|| format!("Failed to open {}", archive.display()))?;
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create directory: {}", dest.display()))?;
    let mut tar = Archive::new(BufReader::new(f));
    tar.set_preserve_permissions(true);
    tar.unpack(dest)
        .with_context(|| format!("Failed to unpack {}", archive.display()))
}

/// Create a deterministic tar of `src_dir` at `out_path`.
///
/// Entries are sorted by relative path and carry mtime 0 and uid/gid 0, so
/// identical trees produce byte-identical archives. Returns the archive size.
pub fn create_tar(src_dir: &Path, out_path: &Path) -> Result<u64> {
    if !src_dir.is_dir() {
        bail!("Source directory not found: {}", src_dir.display());
    }
    let out = File::create(out_path)
        .with_context(|| format!("Failed to create {}", out_path.display()))?;
    let mut builder = TarBuilder::new(BufWriter::new(out));

    let mut entries: Vec<PathBuf> = vec![];
    for ent in WalkDir::new(src_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
    {
        if ent.path() != src_dir {
            entries.push(ent.into_path());
        }
    }
    entries.sort_by(|a, b| {
        let ra = a.strip_prefix(src_dir).unwrap_or(a).to_string_lossy();
        let rb = b.strip_prefix(src_dir).unwrap_or(b).to_string_lossy();
        ra.cmp(&rb)
    });

    for p in entries {
        let rel = p
            .strip_prefix(src_dir)
            .unwrap_or(&p)
            .to_string_lossy()
            .into_owned();
        let md = fs::symlink_metadata(&p)?;
        let mut header = normalized_header(&md);

        if md.is_dir() {
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
            header.set_cksum();
            builder.append_data(&mut header, rel, io::empty())?;
        } else if md.file_type().is_symlink() {
            let target = fs::read_link(&p)?;
            header.set_entry_type(EntryType::Symlink);
            header.set_size(0);
            header.set_link_name(&target)?;
            header.set_cksum();
            builder.append_data(&mut header, rel, io::empty())?;
        } else if md.is_file() {
            let mut f = File::open(&p)?;
            header.set_entry_type(EntryType::Regular);
            header.set_size(md.len());
            header.set_cksum();
            builder.append_data(&mut header, rel, &mut f)?;
        }
    }

    let mut writer = builder
        .into_inner()
        .with_context(|| "Failed to finalize tar builder")?;
    writer.flush()?;
    drop(writer);

    let size = fs::metadata(out_path)?.len();
    Ok(size)
}

fn normalized_header(md: &fs::Metadata) -> Header {
    use std::os::unix::fs::PermissionsExt;

    let mut header = Header::new_gnu();
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(md.permissions().mode());
    header
}

/// Compress `input` to `output` with xz at `preset`.
pub fn xz_compress(input: &Path, output: &Path, preset: u32) -> Result<()> {
    let src = File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let dst =
        File::create(output).with_context(|| format!("Failed to create {}", output.display()))?;
    let mut encoder = XzEncoder::new(BufWriter::new(dst), preset);
    io::copy(&mut BufReader::new(src), &mut encoder)
        .with_context(|| format!("Failed to compress {}", input.display()))?;
    let mut writer = encoder
        .finish()
        .with_context(|| format!("Failed to finish xz stream {}", output.display()))?;
    writer.flush()?;
    Ok(())
}
