//! Archive engine: writer and reader.
//!
//! # Writer
//! [`PackWriter`] takes the final, ordered resource list, plans the whole
//! layout up front and then emits the archive strictly forward: header, zero
//! fill, address table, zero fill, content blocks with explicit zero padding,
//! name offset table, name blob.  Because nothing is patched afterwards the
//! output may be any `Write`, including a pipe or an in-memory buffer.
//! Resource bytes are pulled on demand through a [`ResourceSource`].
//!
//! # Reader
//! [`PackReader`] decodes the header, checks every declared range against the
//! real stream length, then decodes the address table and both name tables
//! into an owned list of [`ResourceEntry`].  Content is read lazily.
//!
//! # Endianness
//! Every integer in the format is a little-endian `u32`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::address::{read_address_table, write_address_table, AddressRow};
use crate::error::{MhpfError, Result};
use crate::header::{PackHeader, DEFAULT_PACK_INDEX, DEFAULT_VERSION, HEADER_SIZE};
use crate::layout::{padded_size, verify_layout, ArchiveLayout, LayoutIssue, ADDRESS_TABLE_LOC};
use crate::names::NameTable;
use crate::perf::{copy_exact, progress_pct, read_range, write_zeros};
use crate::walk::output_path;

// ── Sources ──────────────────────────────────────────────────────────────────

/// Supplies the bytes of each resource by name while packing.
pub trait ResourceSource {
    type Reader<'a>: Read
    where
        Self: 'a;

    fn open(&self, name: &str) -> Result<Self::Reader<'_>>;
}

/// Resources read from files under a root directory.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_owned() }
    }
}

impl ResourceSource for DirSource {
    type Reader<'a> = BufReader<File>;

    fn open(&self, name: &str) -> Result<Self::Reader<'_>> {
        let path = output_path(&self.root, name)?;
        Ok(BufReader::new(File::open(path)?))
    }
}

/// In-memory resources keyed by name.
impl ResourceSource for BTreeMap<String, Vec<u8>> {
    type Reader<'a> = &'a [u8];

    fn open(&self, name: &str) -> Result<Self::Reader<'_>> {
        self.get(name).map(Vec::as_slice).ok_or_else(|| {
            MhpfError::Io(io::Error::new(io::ErrorKind::NotFound, format!("no resource named '{name}'")))
        })
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// One resource to pack, already in archive order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackEntry {
    pub identifier: u32,
    pub name:       String,
    pub raw_size:   u64,
}

pub struct PackWriter<W: Write> {
    writer:     W,
    pub header: PackHeader,
    layout:     ArchiveLayout,
    entries:    Vec<PackEntry>,
    names:      NameTable,
    written:    u64,
}

impl<W: Write> PackWriter<W> {
    pub fn new(writer: W, entries: Vec<PackEntry>) -> Result<Self> {
        Self::with_options(writer, entries, DEFAULT_VERSION, DEFAULT_PACK_INDEX)
    }

    /// Plan the archive.  Fails before writing anything if the entries
    /// cannot be represented (bad names, too many resources, > 4 GiB).
    pub fn with_options(
        writer:     W,
        entries:    Vec<PackEntry>,
        version:    u32,
        pack_index: u32,
    ) -> Result<Self> {
        let names = NameTable::build(&entries.iter().map(|e| e.name.as_str()).collect::<Vec<_>>())?;
        let sizes: Vec<u64> = entries.iter().map(|e| e.raw_size).collect();
        let layout = ArchiveLayout::plan(&sizes, names.blob_size())?;
        let header = PackHeader::for_layout(&layout, version, pack_index);

        Ok(Self { writer, header, layout, entries, names, written: 0 })
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    /// Address table rows in archive order.
    pub fn rows(&self) -> Vec<AddressRow> {
        self.entries
            .iter()
            .zip(&self.layout.content.offsets)
            .map(|(entry, &content_offset)| AddressRow {
                identifier:     entry.identifier,
                content_offset,
                raw_size:       entry.raw_size as u32,
            })
            .collect()
    }

    /// Write the complete archive and hand back the underlying writer.
    pub fn write_all<S: ResourceSource>(mut self, source: &S) -> Result<W> {
        self.write_head()?;
        self.write_content(source)?;
        self.write_name_tables()?;
        self.writer.flush()?;

        if self.written != u64::from(self.header.total_size) {
            return Err(MhpfError::format(format!(
                "wrote {} bytes but the header declares {}",
                self.written, self.header.total_size
            )));
        }
        Ok(self.writer)
    }

    fn write_head(&mut self) -> Result<()> {
        let rows = self.rows();
        self.header.write(&mut self.writer)?;
        write_zeros(&mut self.writer, u64::from(ADDRESS_TABLE_LOC) - HEADER_SIZE as u64)?;
        write_address_table(&mut self.writer, &rows)?;
        write_zeros(&mut self.writer, self.layout.address_gap())?;
        self.written = u64::from(self.header.content_region_loc);
        Ok(())
    }

    fn write_content<S: ResourceSource>(&mut self, source: &S) -> Result<()> {
        let total = self.entries.len();

        for (i, (entry, &offset)) in self.entries.iter().zip(&self.layout.content.offsets).enumerate() {
            tracing::info!(
                "({}%) Packing {} at {} for {} with ID {}",
                progress_pct(i, total), entry.name, offset, entry.raw_size, entry.identifier
            );

            let reader = source.open(&entry.name)?;
            let copied = copy_exact(reader, &mut self.writer, entry.raw_size)?;
            if copied != entry.raw_size {
                return Err(MhpfError::SizeMismatch {
                    path:     entry.name.clone(),
                    expected: entry.raw_size,
                    actual:   copied,
                });
            }

            let block = padded_size(entry.raw_size);
            write_zeros(&mut self.writer, block - entry.raw_size)?;
            self.written += block;
        }
        Ok(())
    }

    fn write_name_tables(&mut self) -> Result<()> {
        self.names.write_offsets(&mut self.writer)?;
        self.names.write_blob(&mut self.writer)?;
        self.written += u64::from(self.header.name_offsets_size) + self.names.blob_size();
        Ok(())
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// One decoded resource: its address table row joined with its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceEntry {
    pub identifier:     u32,
    pub content_offset: u32,
    pub raw_size:       u32,
    pub name:           String,
}

impl ResourceEntry {
    pub fn row(&self) -> AddressRow {
        AddressRow {
            identifier:     self.identifier,
            content_offset: self.content_offset,
            raw_size:       self.raw_size,
        }
    }

    pub fn content_end(&self) -> u64 {
        self.row().content_end()
    }
}

pub struct PackReader<R: Read + Seek> {
    reader:      R,
    pub header:  PackHeader,
    pub entries: Vec<ResourceEntry>,
    stream_len:  u64,
}

impl<R: Read + Seek> PackReader<R> {
    /// Decode and validate all tables.
    pub fn open(mut reader: R) -> Result<Self> {
        let stream_len = reader.seek(SeekFrom::End(0))?;
        if stream_len < HEADER_SIZE as u64 {
            return Err(MhpfError::truncated("header", HEADER_SIZE as u64, stream_len));
        }

        reader.seek(SeekFrom::Start(0))?;
        let header = PackHeader::read(&mut reader)?;
        header.check_counts()?;

        for (what, loc, size) in header.sections() {
            let end = u64::from(loc) + u64::from(size);
            if end > stream_len {
                return Err(MhpfError::truncated(format!("{what} at offset {loc}"), end, stream_len));
            }
        }
        let declared = u64::from(header.total_size);
        if declared > stream_len {
            return Err(MhpfError::truncated("archive (total_size at offset 8)", declared, stream_len));
        }
        if declared < stream_len {
            tracing::warn!("{} bytes follow the declared end of the archive", stream_len - declared);
        }

        let rows = read_address_table(&mut reader, &header)?;
        let names = NameTable::read(&mut reader, &header)?.names()?;

        let entries: Vec<ResourceEntry> = rows
            .into_iter()
            .zip(names)
            .map(|(row, name)| ResourceEntry {
                identifier:     row.identifier,
                content_offset: row.content_offset,
                raw_size:       row.raw_size,
                name,
            })
            .collect();

        for entry in &entries {
            if entry.content_end() > stream_len {
                return Err(MhpfError::truncated(
                    format!("resource '{}' at offset {}", entry.name, entry.content_offset),
                    entry.content_end(),
                    stream_len,
                ));
            }
        }

        tracing::debug!(resources = entries.len(), bytes = stream_len, "opened archive");
        Ok(Self { reader, header, entries, stream_len })
    }

    pub fn rows(&self) -> Vec<AddressRow> {
        self.entries.iter().map(ResourceEntry::row).collect()
    }

    pub fn find(&self, name: &str) -> Option<&ResourceEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn stream_len(&self) -> u64 {
        self.stream_len
    }

    /// Deviations from the layout this crate writes.
    pub fn verify(&self) -> Vec<LayoutIssue> {
        verify_layout(&self.header, &self.rows())
    }

    /// Complete contents of the resource at `index`.
    pub fn read_resource(&mut self, index: usize) -> Result<Vec<u8>> {
        let entry = self.entry(index)?;
        let (offset, len) = (u64::from(entry.content_offset), u64::from(entry.raw_size));
        read_range(&mut self.reader, offset, len)
    }

    /// Stream the resource at `index` into `writer`; returns the byte count.
    pub fn copy_resource<W: Write + ?Sized>(&mut self, index: usize, writer: &mut W) -> Result<u64> {
        let entry = self.entry(index)?.clone();
        self.reader.seek(SeekFrom::Start(u64::from(entry.content_offset)))?;
        let copied = copy_exact(self.reader.by_ref(), writer, u64::from(entry.raw_size))?;
        if copied != u64::from(entry.raw_size) {
            return Err(MhpfError::truncated(
                format!("resource '{}'", entry.name),
                entry.content_end(),
                u64::from(entry.content_offset) + copied,
            ));
        }
        Ok(copied)
    }

    /// Extract every resource under `dest`, sequentially, through this reader.
    pub fn extract_all<P: AsRef<Path>>(&mut self, dest: P) -> Result<()> {
        let dest = dest.as_ref();
        let entries = self.entries.clone();
        for (i, entry) in entries.iter().enumerate() {
            tracing::info!("({}%) Unpacking {}", progress_pct(i, entries.len()), entry.name);
            crate::perf::extract_entry(&mut self.reader, entry, dest)?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn entry(&self, index: usize) -> Result<&ResourceEntry> {
        self.entries.get(index).ok_or_else(|| {
            MhpfError::format(format!("no resource #{index}; archive holds {}", self.entries.len()))
        })
    }
}
