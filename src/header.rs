use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Serialize, Serializer};
use std::fmt;
use std::io::{self, Read, Write};

use crate::address::ADDRESS_ROW_SIZE;
use crate::error::{MhpfError, Result};
use crate::layout::{ArchiveLayout, ADDRESS_TABLE_LOC, CONTENT_REGION_LOC};
use crate::names::NAME_OFFSET_SIZE;

pub const MAGIC: &[u8; 4] = b"MHPF";
pub const HEADER_SIZE: usize = 52;
/// Version written by default; the only value seen in shipped archives.
pub const DEFAULT_VERSION: u32 = 1;
/// Pack index written by default.  Opaque to the loader as far as is known.
pub const DEFAULT_PACK_INDEX: u32 = 31;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackHeader {
    #[serde(serialize_with = "serialize_magic")]
    pub magic:               [u8; 4],
    pub version:             u32,
    pub total_size:          u32,
    pub num_resources:       u32,
    pub pack_index:          u32,
    pub address_table_loc:   u32,
    pub address_table_size:  u32,
    pub content_region_loc:  u32,
    pub content_region_size: u32,
    pub name_offsets_loc:    u32,
    pub name_offsets_size:   u32,
    pub name_blob_loc:       u32,
    pub name_blob_size:      u32,
}

fn serialize_magic<S: Serializer>(magic: &[u8; 4], s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&String::from_utf8_lossy(magic))
}

impl PackHeader {
    pub fn for_layout(layout: &ArchiveLayout, version: u32, pack_index: u32) -> Self {
        Self {
            magic:               *MAGIC,
            version,
            total_size:          layout.total_size,
            num_resources:       layout.num_resources,
            pack_index,
            address_table_loc:   ADDRESS_TABLE_LOC,
            address_table_size:  layout.address_table_size,
            content_region_loc:  CONTENT_REGION_LOC,
            content_region_size: layout.content.region_size,
            name_offsets_loc:    layout.name_offsets_loc,
            name_offsets_size:   layout.name_offsets_size,
            name_blob_loc:       layout.name_blob_loc,
            name_blob_size:      layout.name_blob_size,
        }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.total_size)?;
        writer.write_u32::<LittleEndian>(self.num_resources)?;
        writer.write_u32::<LittleEndian>(self.pack_index)?;
        writer.write_u32::<LittleEndian>(self.address_table_loc)?;
        writer.write_u32::<LittleEndian>(self.address_table_size)?;
        writer.write_u32::<LittleEndian>(self.content_region_loc)?;
        writer.write_u32::<LittleEndian>(self.content_region_size)?;
        writer.write_u32::<LittleEndian>(self.name_offsets_loc)?;
        writer.write_u32::<LittleEndian>(self.name_offsets_size)?;
        writer.write_u32::<LittleEndian>(self.name_blob_loc)?;
        writer.write_u32::<LittleEndian>(self.name_blob_size)?;
        Ok(())
    }

    /// Decode the 52-byte header.  Rejects anything not starting with `MHPF`.
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(MhpfError::format(format!(
                "bad magic {:?} at offset 0, expected \"MHPF\"",
                String::from_utf8_lossy(&magic)
            )));
        }
        Ok(Self {
            magic,
            version:             reader.read_u32::<LittleEndian>()?,
            total_size:          reader.read_u32::<LittleEndian>()?,
            num_resources:       reader.read_u32::<LittleEndian>()?,
            pack_index:          reader.read_u32::<LittleEndian>()?,
            address_table_loc:   reader.read_u32::<LittleEndian>()?,
            address_table_size:  reader.read_u32::<LittleEndian>()?,
            content_region_loc:  reader.read_u32::<LittleEndian>()?,
            content_region_size: reader.read_u32::<LittleEndian>()?,
            name_offsets_loc:    reader.read_u32::<LittleEndian>()?,
            name_offsets_size:   reader.read_u32::<LittleEndian>()?,
            name_blob_loc:       reader.read_u32::<LittleEndian>()?,
            name_blob_size:      reader.read_u32::<LittleEndian>()?,
        })
    }

    /// Both per-resource tables must hold exactly `num_resources` rows.
    pub fn check_counts(&self) -> Result<()> {
        let n = u64::from(self.num_resources);
        let address_expected = n * ADDRESS_ROW_SIZE as u64;
        if u64::from(self.address_table_size) != address_expected {
            return Err(MhpfError::format(format!(
                "address_table_size (offset 24) is {}, expected {address_expected} for {n} resources",
                self.address_table_size
            )));
        }
        let names_expected = n * NAME_OFFSET_SIZE as u64;
        if u64::from(self.name_offsets_size) != names_expected {
            return Err(MhpfError::format(format!(
                "name_offsets_size (offset 40) is {}, expected {names_expected} for {n} resources",
                self.name_offsets_size
            )));
        }
        Ok(())
    }

    /// `(name, location, size)` of each table the header points at.
    pub fn sections(&self) -> [(&'static str, u32, u32); 4] {
        [
            ("address table",     self.address_table_loc,  self.address_table_size),
            ("content region",    self.content_region_loc, self.content_region_size),
            ("name offset table", self.name_offsets_loc,   self.name_offsets_size),
            ("name blob",         self.name_blob_loc,      self.name_blob_size),
        ]
    }

    pub fn magic_str(&self) -> String {
        String::from_utf8_lossy(&self.magic).into_owned()
    }
}

impl fmt::Display for PackHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "magic: {}", self.magic_str())?;
        writeln!(f, "version: {}", self.version)?;
        writeln!(f, "total_size: {}", self.total_size)?;
        writeln!(f, "num_resources: {}", self.num_resources)?;
        writeln!(f, "pack_index: {}", self.pack_index)?;
        writeln!(f, "address_table_loc: {}", self.address_table_loc)?;
        writeln!(f, "address_table_size: {}", self.address_table_size)?;
        writeln!(f, "content_region_loc: {}", self.content_region_loc)?;
        writeln!(f, "content_region_size: {}", self.content_region_size)?;
        writeln!(f, "name_offsets_loc: {}", self.name_offsets_loc)?;
        writeln!(f, "name_offsets_size: {}", self.name_offsets_size)?;
        writeln!(f, "name_blob_loc: {}", self.name_blob_loc)?;
        write!(f, "name_blob_size: {}", self.name_blob_size)
    }
}
