//! Name tables: a cumulative offset per resource followed by a blob of
//! NUL-terminated ASCII paths in the same order as the address table.
//!
//! The on-disk format carries no per-name length, so decoding scans for the
//! terminator.  The scan is always bounded by the declared blob size.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Seek, Write};

use crate::error::{MhpfError, Result};
use crate::header::PackHeader;
use crate::perf::read_range;

pub const NAME_OFFSET_SIZE: usize = 4;

/// Reject names that cannot be stored as a NUL-terminated ASCII string.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MhpfError::format("empty resource name"));
    }
    if !name.is_ascii() {
        return Err(MhpfError::format(format!("resource name '{name}' is not ASCII")));
    }
    if name.contains('\0') {
        return Err(MhpfError::format(format!("resource name {name:?} contains NUL")));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameTable {
    pub offsets: Vec<u32>,
    pub blob:    Vec<u8>,
}

impl NameTable {
    /// Encode `names` in order.
    pub fn build<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut offsets = Vec::with_capacity(names.len());
        let mut blob = Vec::new();

        for name in names {
            let name = name.as_ref();
            validate_name(name)?;
            let offset = u32::try_from(blob.len())
                .map_err(|_| MhpfError::format("name blob exceeds 4 GiB"))?;
            offsets.push(offset);
            blob.extend_from_slice(name.as_bytes());
            blob.push(0);
        }

        Ok(Self { offsets, blob })
    }

    pub fn blob_size(&self) -> u64 {
        self.blob.len() as u64
    }

    pub fn write_offsets<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for &offset in &self.offsets {
            writer.write_u32::<LittleEndian>(offset)?;
        }
        Ok(())
    }

    pub fn write_blob<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.blob)
    }

    /// Decode both name tables the header points at.
    pub fn read<R: Read + Seek>(reader: &mut R, header: &PackHeader) -> Result<Self> {
        let size = header.name_offsets_size as usize;
        if size % NAME_OFFSET_SIZE != 0 {
            return Err(MhpfError::format(format!(
                "name offset table at {} is {size} bytes, not a multiple of {NAME_OFFSET_SIZE}",
                header.name_offsets_loc
            )));
        }

        let raw = read_range(reader, u64::from(header.name_offsets_loc), size as u64)?;
        let mut cursor = Cursor::new(raw);
        let offsets = (0..size / NAME_OFFSET_SIZE)
            .map(|_| cursor.read_u32::<LittleEndian>())
            .collect::<io::Result<Vec<u32>>>()?;

        let blob = read_range(reader, u64::from(header.name_blob_loc), u64::from(header.name_blob_size))?;
        Ok(Self { offsets, blob })
    }

    /// Name starting at `offset` within the blob.
    pub fn resolve(&self, offset: u32) -> Result<String> {
        let start = offset as usize;
        if start >= self.blob.len() {
            return Err(MhpfError::format(format!(
                "name offset {offset} is outside the {}-byte name blob",
                self.blob.len()
            )));
        }

        let tail = &self.blob[start..];
        let len = tail.iter().position(|&b| b == 0).ok_or_else(|| {
            MhpfError::format(format!("name at blob offset {offset} runs past the end of the name blob"))
        })?;

        let bytes = &tail[..len];
        if !bytes.is_ascii() {
            return Err(MhpfError::format(format!("name at blob offset {offset} is not ASCII")));
        }
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Every name, in table order.
    pub fn names(&self) -> Result<Vec<String>> {
        self.offsets.iter().map(|&off| self.resolve(off)).collect()
    }
}
