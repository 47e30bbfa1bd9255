//! Bulk I/O: exact-length range copies, explicit zero fill and resource
//! extraction.
//!
//! # Zero fill
//!
//! Padding and reserved spans are always written as real zero bytes.
//! Seeking past them would leave the result to the filesystem's sparse-file
//! behaviour, which is not portable.
//!
//! # Parallel extraction
//!
//! With the `parallel` feature, [`extract_entries`] copies resources
//! concurrently using Rayon.  Content blocks never overlap, so every worker
//! opens its own handle on the archive and no state is shared.  Without the
//! feature the same per-entry routine runs sequentially.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{MhpfError, Result};
use crate::io_stream::ResourceEntry;
use crate::walk::output_path;

/// Buffer size for archive and extracted-file writers.
pub const COPY_BUFFER_SIZE: usize = 256 * 1024;

// ── Range helpers ────────────────────────────────────────────────────────────

/// Write `len` zero bytes.
pub fn write_zeros<W: Write + ?Sized>(writer: &mut W, len: u64) -> io::Result<()> {
    let copied = io::copy(&mut io::repeat(0).take(len), writer)?;
    debug_assert_eq!(copied, len);
    Ok(())
}

/// Copy up to `len` bytes from `reader` to `writer`; returns the count copied.
pub fn copy_exact<R: Read, W: Write + ?Sized>(reader: R, writer: &mut W, len: u64) -> io::Result<u64> {
    io::copy(&mut reader.take(len), writer)
}

/// Read `len` bytes starting at absolute `offset`.
pub fn read_range<R: Read + Seek>(reader: &mut R, offset: u64, len: u64) -> Result<Vec<u8>> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::with_capacity(len.min(COPY_BUFFER_SIZE as u64) as usize);
    let got = reader.by_ref().take(len).read_to_end(&mut buf)? as u64;
    if got != len {
        return Err(MhpfError::truncated(format!("range at offset {offset}"), offset + len, offset + got));
    }
    Ok(buf)
}

// ── Extraction ───────────────────────────────────────────────────────────────

/// Copy one resource out of `archive` into its place under `dest`.
pub fn extract_entry<R: Read + Seek>(archive: &mut R, entry: &ResourceEntry, dest: &Path) -> Result<()> {
    let out_path = output_path(dest, &entry.name)?;
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    archive.seek(SeekFrom::Start(u64::from(entry.content_offset)))?;
    let mut out = BufWriter::with_capacity(COPY_BUFFER_SIZE, File::create(&out_path)?);
    let copied = copy_exact(archive.by_ref(), &mut out, u64::from(entry.raw_size))?;
    if copied != u64::from(entry.raw_size) {
        return Err(MhpfError::truncated(
            format!("resource '{}'", entry.name),
            entry.content_end(),
            u64::from(entry.content_offset) + copied,
        ));
    }
    out.flush()?;
    Ok(())
}

/// Extract `entries` from the archive at `archive_path` into `dest`.
///
/// Fails fast: the first error aborts the remaining work.
pub fn extract_entries(archive_path: &Path, entries: &[ResourceEntry], dest: &Path) -> Result<()> {
    let total = entries.len();

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        entries.par_iter().enumerate().try_for_each_init(
            || File::open(archive_path),
            |archive, (i, entry)| {
                let archive = archive
                    .as_mut()
                    .map_err(|e| io::Error::new(e.kind(), e.to_string()))?;
                tracing::info!("({}%) Unpacking {}", progress_pct(i, total), entry.name);
                extract_entry(archive, entry, dest)
            },
        )
    }

    #[cfg(not(feature = "parallel"))]
    {
        let mut archive = File::open(archive_path)?;
        for (i, entry) in entries.iter().enumerate() {
            tracing::info!("({}%) Unpacking {}", progress_pct(i, total), entry.name);
            extract_entry(&mut archive, entry, dest)?;
        }
        Ok(())
    }
}

pub(crate) fn progress_pct(done: usize, total: usize) -> usize {
    if total == 0 { 100 } else { (done * 100).div_ceil(total) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_stream::{PackEntry, PackReader, PackWriter};
    use std::collections::BTreeMap;
    use std::io::Cursor;

    /// An archive of `count` resources with distinct contents, written to disk.
    fn archive_on_disk(dir: &Path, count: u32) -> (std::path::PathBuf, Vec<ResourceEntry>, BTreeMap<String, Vec<u8>>) {
        let mut files = BTreeMap::new();
        let mut entries = Vec::new();
        for i in 0..count {
            let name = format!("dir{}/res{i}.bin", i % 4);
            let data: Vec<u8> = (0..(i as usize * 517 + 3)).map(|b| (b as u32 ^ i) as u8).collect();
            entries.push(PackEntry { identifier: i, name: name.clone(), raw_size: data.len() as u64 });
            files.insert(name, data);
        }
        let bytes = PackWriter::new(Vec::new(), entries).unwrap().write_all(&files).unwrap();
        let path = dir.join("many.pck");
        std::fs::write(&path, &bytes).unwrap();
        let decoded = PackReader::open(Cursor::new(bytes)).unwrap().entries;
        (path, decoded, files)
    }

    #[test]
    fn zeros_are_written_explicitly() {
        let mut buf = vec![1u8; 3];
        write_zeros(&mut buf, 5).unwrap();
        assert_eq!(buf, [1, 1, 1, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn copy_stops_at_length() {
        let mut out = Vec::new();
        let n = copy_exact(&b"hello world"[..], &mut out, 5).unwrap();
        assert_eq!(n, 5);
        assert_eq!(out, b"hello");

        let mut out = Vec::new();
        assert_eq!(copy_exact(&b"abc"[..], &mut out, 10).unwrap(), 3);
    }

    #[test]
    fn short_range_is_truncated() {
        let mut data = Cursor::new(vec![7u8; 10]);
        assert_eq!(read_range(&mut data, 4, 6).unwrap(), vec![7; 6]);
        let err = read_range(&mut data, 4, 7).unwrap_err();
        assert!(matches!(err, MhpfError::Truncated { needed: 11, available: 10, .. }));
    }

    #[test]
    fn extract_entries_reproduces_every_resource() {
        let dir = tempfile::tempdir().unwrap();
        let (archive, entries, files) = archive_on_disk(dir.path(), 12);
        let dest = dir.path().join("out");

        extract_entries(&archive, &entries, &dest).unwrap();
        for (name, data) in &files {
            assert_eq!(&std::fs::read(dest.join(name)).unwrap(), data, "{name} differs");
        }
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_extraction_matches_sources() {
        let dir = tempfile::tempdir().unwrap();
        let (archive, entries, files) = archive_on_disk(dir.path(), 96);
        let dest = dir.path().join("out");

        extract_entries(&archive, &entries, &dest).unwrap();
        for (name, data) in &files {
            assert_eq!(&std::fs::read(dest.join(name)).unwrap(), data, "{name} differs");
        }

        let mut unsafe_entries = entries.clone();
        unsafe_entries[40].name = "../escape.bin".into();
        let err = extract_entries(&archive, &unsafe_entries, &dir.path().join("again")).unwrap_err();
        assert!(matches!(err, MhpfError::Format(_)));
        assert!(!dir.path().join("escape.bin").exists());
    }

    #[test]
    fn progress_rounds_up() {
        assert_eq!(progress_pct(0, 3), 0);
        assert_eq!(progress_pct(1, 3), 34);
        assert_eq!(progress_pct(0, 0), 100);
    }
}
