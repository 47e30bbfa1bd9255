//! Content layout: padded block sizes, running offsets and the placement of
//! every table in the file.
//!
//! The address table and the content region sit at fixed positions that the
//! game's loader expects; they are never derived from other fields.  Every
//! resource occupies a whole number of 2 KiB blocks (at least one), and the
//! name tables follow the content region back to back:
//!
//! ```text
//! 0       header (52 B) + zero fill
//! 2048    address table (12 B × n) + zero fill
//! 59392   content blocks, 2048-aligned
//! ...     name offset table (4 B × n)
//! ...     name blob (NUL-terminated names)
//! ```

use std::fmt;

use serde::Serialize;

use crate::address::{AddressRow, ADDRESS_ROW_SIZE};
use crate::error::{MhpfError, Result};
use crate::header::PackHeader;
use crate::names::NAME_OFFSET_SIZE;

/// Granularity of content blocks.
pub const BLOCK_SIZE: u64 = 2048;
/// Fixed location of the address table.
pub const ADDRESS_TABLE_LOC: u32 = 2048;
/// Fixed location of the content region.
pub const CONTENT_REGION_LOC: u32 = 59392;
/// Largest resource count whose address table still ends before the content region.
pub const MAX_RESOURCES: usize =
    (CONTENT_REGION_LOC - ADDRESS_TABLE_LOC) as usize / ADDRESS_ROW_SIZE;

/// Size of the block holding `raw_size` bytes.  Empty resources still take one block.
pub fn padded_size(raw_size: u64) -> u64 {
    raw_size.div_ceil(BLOCK_SIZE).max(1) * BLOCK_SIZE
}

fn to_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        MhpfError::format(format!("{what} ({value}) does not fit in a 32-bit field"))
    })
}

// ── Content plan ─────────────────────────────────────────────────────────────

/// Absolute offsets of every content block plus the region size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPlan {
    pub offsets:     Vec<u32>,
    pub region_size: u32,
}

/// Lay out resources of the given raw sizes, in order, from [`CONTENT_REGION_LOC`].
pub fn plan_content(raw_sizes: &[u64]) -> Result<ContentPlan> {
    let mut offsets = Vec::with_capacity(raw_sizes.len());
    let mut ptr = u64::from(CONTENT_REGION_LOC);

    for &size in raw_sizes {
        to_u32(size, "resource size")?;
        offsets.push(to_u32(ptr, "content offset")?);
        ptr += padded_size(size);
    }

    let region_size = to_u32(ptr - u64::from(CONTENT_REGION_LOC), "content region size")?;
    Ok(ContentPlan { offsets, region_size })
}

// ── Whole-archive layout ─────────────────────────────────────────────────────

/// Where every section of a packed archive lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    pub num_resources:       u32,
    pub address_table_size:  u32,
    pub content:             ContentPlan,
    pub name_offsets_loc:    u32,
    pub name_offsets_size:   u32,
    pub name_blob_loc:       u32,
    pub name_blob_size:      u32,
    pub total_size:          u32,
}

impl ArchiveLayout {
    pub fn plan(raw_sizes: &[u64], name_blob_size: u64) -> Result<Self> {
        let n = raw_sizes.len();
        if n > MAX_RESOURCES {
            return Err(MhpfError::format(format!(
                "{n} resources do not fit in the address table (maximum {MAX_RESOURCES})"
            )));
        }

        let content = plan_content(raw_sizes)?;

        let name_offsets_loc = u64::from(CONTENT_REGION_LOC) + u64::from(content.region_size);
        let name_offsets_size = (n * NAME_OFFSET_SIZE) as u64;
        let name_blob_loc = name_offsets_loc + name_offsets_size;
        let total_size = name_blob_loc + name_blob_size;

        let layout = Self {
            num_resources:      n as u32,
            address_table_size: (n * ADDRESS_ROW_SIZE) as u32,
            content,
            name_offsets_loc:   to_u32(name_offsets_loc, "name offset table location")?,
            name_offsets_size:  name_offsets_size as u32,
            name_blob_loc:      to_u32(name_blob_loc, "name blob location")?,
            name_blob_size:     to_u32(name_blob_size, "name blob size")?,
            total_size:         to_u32(total_size, "archive size")?,
        };
        tracing::debug!(
            resources = n,
            content_region_size = layout.content.region_size,
            name_offsets_loc = layout.name_offsets_loc,
            name_blob_loc = layout.name_blob_loc,
            total_size = layout.total_size,
            "planned archive layout"
        );
        Ok(layout)
    }

    /// Zero bytes between the end of the address table and the content region.
    pub fn address_gap(&self) -> u64 {
        u64::from(CONTENT_REGION_LOC - ADDRESS_TABLE_LOC - self.address_table_size)
    }
}

// ── Verification ─────────────────────────────────────────────────────────────

/// One deviation of a decoded archive from the layout this crate produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayoutIssue {
    /// A fixed table location holds an unexpected value.
    ReservedLocation { field: &'static str, expected: u32, actual: u32 },
    /// A content block does not start where its predecessors end.
    Misplaced { index: usize, expected: u64, actual: u32 },
    /// A content block reaches past the declared content region.
    OutsideRegion { index: usize, end: u64, region_end: u64 },
    /// The declared region size disagrees with the sum of padded blocks.
    RegionSize { expected: u64, actual: u32 },
    /// A following table does not start right after its predecessor.
    TableGap { field: &'static str, expected: u64, actual: u32 },
}

impl fmt::Display for LayoutIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutIssue::ReservedLocation { field, expected, actual } =>
                write!(f, "{field} is {actual}, expected {expected}"),
            LayoutIssue::Misplaced { index, expected, actual } =>
                write!(f, "resource #{index} starts at {actual}, expected {expected}"),
            LayoutIssue::OutsideRegion { index, end, region_end } =>
                write!(f, "resource #{index} ends at {end}, past content region end {region_end}"),
            LayoutIssue::RegionSize { expected, actual } =>
                write!(f, "content_region_size is {actual}, padded blocks add up to {expected}"),
            LayoutIssue::TableGap { field, expected, actual } =>
                write!(f, "{field} is {actual}, expected {expected}"),
        }
    }
}

/// Compare a decoded header and address table against the packing rules.
///
/// Archives from other packers may deviate and still unpack fine, so this
/// reports rather than fails.
pub fn verify_layout(header: &PackHeader, rows: &[AddressRow]) -> Vec<LayoutIssue> {
    let mut issues = Vec::new();

    if header.address_table_loc != ADDRESS_TABLE_LOC {
        issues.push(LayoutIssue::ReservedLocation {
            field:    "address_table_loc",
            expected: ADDRESS_TABLE_LOC,
            actual:   header.address_table_loc,
        });
    }
    if header.content_region_loc != CONTENT_REGION_LOC {
        issues.push(LayoutIssue::ReservedLocation {
            field:    "content_region_loc",
            expected: CONTENT_REGION_LOC,
            actual:   header.content_region_loc,
        });
    }

    let region_start = u64::from(header.content_region_loc);
    let region_end = region_start + u64::from(header.content_region_size);
    let mut expected = region_start;

    for (index, row) in rows.iter().enumerate() {
        if u64::from(row.content_offset) != expected {
            issues.push(LayoutIssue::Misplaced { index, expected, actual: row.content_offset });
        }
        let end = u64::from(row.content_offset) + padded_size(u64::from(row.raw_size));
        if end > region_end {
            issues.push(LayoutIssue::OutsideRegion { index, end, region_end });
        }
        expected = end;
    }

    let padded_total: u64 = rows.iter().map(|r| padded_size(u64::from(r.raw_size))).sum();
    if padded_total != u64::from(header.content_region_size) {
        issues.push(LayoutIssue::RegionSize {
            expected: padded_total,
            actual:   header.content_region_size,
        });
    }

    if u64::from(header.name_offsets_loc) != region_end {
        issues.push(LayoutIssue::TableGap {
            field:    "name_offsets_loc",
            expected: region_end,
            actual:   header.name_offsets_loc,
        });
    }
    let offsets_end = u64::from(header.name_offsets_loc) + u64::from(header.name_offsets_size);
    if u64::from(header.name_blob_loc) != offsets_end {
        issues.push(LayoutIssue::TableGap {
            field:    "name_blob_loc",
            expected: offsets_end,
            actual:   header.name_blob_loc,
        });
    }

    issues
}
