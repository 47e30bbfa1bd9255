use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{self, Cursor, Read, Seek, Write};

use crate::error::{MhpfError, Result};
use crate::header::PackHeader;
use crate::perf::read_range;

pub const ADDRESS_ROW_SIZE: usize = 12;

/// One address table row.  Row *i* describes the same resource as name *i*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddressRow {
    pub identifier:     u32,
    pub content_offset: u32,
    pub raw_size:       u32,
}

impl AddressRow {
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.identifier)?;
        writer.write_u32::<LittleEndian>(self.content_offset)?;
        writer.write_u32::<LittleEndian>(self.raw_size)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            identifier:     reader.read_u32::<LittleEndian>()?,
            content_offset: reader.read_u32::<LittleEndian>()?,
            raw_size:       reader.read_u32::<LittleEndian>()?,
        })
    }

    /// Absolute end of the raw bytes (exclusive).
    pub fn content_end(&self) -> u64 {
        u64::from(self.content_offset) + u64::from(self.raw_size)
    }
}

pub fn write_address_table<W: Write>(mut writer: W, rows: &[AddressRow]) -> io::Result<()> {
    for row in rows {
        row.write(&mut writer)?;
    }
    Ok(())
}

/// Decode every row of the table the header points at.
pub fn read_address_table<R: Read + Seek>(reader: &mut R, header: &PackHeader) -> Result<Vec<AddressRow>> {
    let size = header.address_table_size as usize;
    if size % ADDRESS_ROW_SIZE != 0 {
        return Err(MhpfError::format(format!(
            "address table at {} is {size} bytes, not a multiple of {ADDRESS_ROW_SIZE}",
            header.address_table_loc
        )));
    }

    let bytes = read_range(reader, u64::from(header.address_table_loc), size as u64)?;
    let mut cursor = Cursor::new(bytes);
    (0..size / ADDRESS_ROW_SIZE)
        .map(|_| AddressRow::read(&mut cursor).map_err(MhpfError::from))
        .collect()
}
