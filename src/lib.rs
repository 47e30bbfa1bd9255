pub mod error;
pub mod header;
pub mod address;
pub mod names;
pub mod layout;
pub mod index;
pub mod walk;
pub mod perf;
pub mod io_stream;
pub mod archive;

pub use error::{MhpfError, Result};
pub use header::PackHeader;
pub use address::AddressRow;
pub use names::NameTable;
pub use layout::{padded_size, ArchiveLayout, LayoutIssue};
pub use index::{IdMap, UnmappedPolicy};
pub use io_stream::{PackEntry, PackReader, PackWriter, ResourceEntry, ResourceSource};
pub use archive::{pack_directory, unpack_archive, PackOptions};
