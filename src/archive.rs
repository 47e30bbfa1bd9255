//! High-level operations: the primary embedding surface.
//!
//! ```no_run
//! use mhpf::archive::{pack_directory, unpack_archive, PackOptions};
//! use mhpf::index::IdMap;
//!
//! let ids = IdMap::load("fileids.json")?;
//! pack_directory("data", "data.pck", &ids, &PackOptions::default())?;
//! unpack_archive("data.pck", "restored")?;
//! # Ok::<(), mhpf::MhpfError>(())
//! ```

use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::Result;
use crate::header::{PackHeader, DEFAULT_PACK_INDEX, DEFAULT_VERSION};
use crate::index::{IdMap, UnmappedPolicy};
use crate::io_stream::{DirSource, PackReader, PackWriter, ResourceEntry};
use crate::layout::LayoutIssue;
use crate::perf::{extract_entries, COPY_BUFFER_SIZE};
use crate::walk::scan_directory;

// ── PackOptions ───────────────────────────────────────────────────────────────

/// Configuration for [`pack_directory`].
#[derive(Debug, Clone)]
pub struct PackOptions {
    pub version:    u32,
    /// Stored verbatim in the header.
    pub pack_index: u32,
    pub unmapped:   UnmappedPolicy,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            version:    DEFAULT_VERSION,
            pack_index: DEFAULT_PACK_INDEX,
            unmapped:   UnmappedPolicy::default(),
        }
    }
}

/// Outcome of a successful [`pack_directory`].
#[derive(Debug, Clone)]
pub struct PackSummary {
    pub resources:  usize,
    pub total_size: u32,
}

// ── Pack ──────────────────────────────────────────────────────────────────────

/// Pack every file under `input` into a new archive at `output`, ordered by
/// identifier.
///
/// The archive is written to a temporary file next to `output` and renamed
/// over it only once complete, so a failed pack never leaves a partial
/// archive behind.
pub fn pack_directory<P: AsRef<Path>, Q: AsRef<Path>>(
    input:  P,
    output: Q,
    ids:    &IdMap,
    opts:   &PackOptions,
) -> Result<PackSummary> {
    let (input, output) = (input.as_ref(), output.as_ref());
    tracing::info!("Scanning directory {}", input.display());

    let files = scan_directory(input)?;
    let found = files.len();
    let entries = ids.order_files(files, opts.unmapped)?;
    tracing::info!("Packing {} of {} files into {}", entries.len(), found, output.display());

    let parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = output_tempfile(parent, output)?;

    let resources = entries.len();
    let writer = PackWriter::with_options(
        BufWriter::with_capacity(COPY_BUFFER_SIZE, tmp.as_file_mut()),
        entries,
        opts.version,
        opts.pack_index,
    )?;
    let total_size = writer.header.total_size;
    writer.write_all(&DirSource::new(input))?.flush()?;

    tmp.as_file().sync_all()?;
    tmp.persist(output).map_err(|e| e.error)?;

    tracing::info!("Created {} ({} bytes)", output.display(), total_size);
    Ok(PackSummary { resources, total_size })
}

/// A temporary file in `dir` that, once persisted over `output`, carries the
/// permissions a plain `File::create(output)` would have: the existing
/// file's when replacing one, otherwise `0o666` less the umask on Unix.
fn output_tempfile(dir: &Path, output: &Path) -> Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".mhpf-").suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let tmp = builder.tempfile_in(dir)?;

    if let Ok(existing) = fs::metadata(output) {
        tmp.as_file().set_permissions(existing.permissions())?;
    }
    Ok(tmp)
}

// ── Unpack ────────────────────────────────────────────────────────────────────

/// Extract every resource of `archive` under `dest`; returns the count.
pub fn unpack_archive<P: AsRef<Path>, Q: AsRef<Path>>(archive: P, dest: Q) -> Result<usize> {
    let (archive, dest) = (archive.as_ref(), dest.as_ref());
    let reader = open_archive(archive)?;
    fs::create_dir_all(dest)?;

    extract_entries(archive, &reader.entries, dest)?;
    tracing::info!("Unpacked {} resources to {}", reader.entries.len(), dest.display());
    Ok(reader.entries.len())
}

pub fn open_archive<P: AsRef<Path>>(path: P) -> Result<PackReader<BufReader<File>>> {
    PackReader::open(BufReader::new(File::open(path.as_ref())?))
}

// ── Scan ──────────────────────────────────────────────────────────────────────

/// Everything `scan` reports about an archive, without extracting it.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub header:  PackHeader,
    pub entries: Vec<ResourceEntry>,
    pub issues:  Vec<LayoutIssue>,
}

pub fn scan_archive<P: AsRef<Path>>(archive: P) -> Result<ScanReport> {
    let reader = open_archive(archive)?;
    let issues = reader.verify();
    for issue in &issues {
        tracing::warn!("layout: {issue}");
    }
    Ok(ScanReport { header: reader.header.clone(), entries: reader.entries, issues })
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header)?;
        for e in &self.entries {
            writeln!(f, "{}, {}, {}, \"{}\",", e.identifier, e.content_offset, e.raw_size, e.name)?;
        }
        for issue in &self.issues {
            writeln!(f, "warning: {issue}")?;
        }
        Ok(())
    }
}

// ── Identifier export ────────────────────────────────────────────────────────

/// The identifier map that repacks an unpacked `archive` in its original order.
pub fn export_ids<P: AsRef<Path>>(archive: P) -> Result<IdMap> {
    let reader = open_archive(archive)?;
    IdMap::from_entries(reader.entries.iter().map(|e| (e.identifier, e.name.as_str())))
}
