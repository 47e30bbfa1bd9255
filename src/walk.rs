//! Source-tree enumeration and the mapping between resource names and paths.
//!
//! Resource names are relative paths joined with `/` regardless of platform.

use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{MhpfError, Result};

/// Filesystem metadata files never packed.
pub const EXCLUDED_FILE_NAMES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// A file found under the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub size: u64,
}

/// Every file under `root`, sorted by name.
///
/// Symlinks to files are packed with their target's contents.  Directory
/// symlinks are not descended into, and they and every other entry that is
/// not a file (broken links, sockets, FIFOs) are skipped with a warning.
pub fn scan_directory(root: &Path) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        let metadata = if file_type.is_symlink() {
            match std::fs::metadata(entry.path()) {
                Ok(target) if target.is_file() => target,
                _ => {
                    tracing::warn!("skipping {}: link does not point to a file", entry.path().display());
                    continue;
                }
            }
        } else if file_type.is_file() {
            entry.metadata()?
        } else {
            tracing::warn!("skipping {}: not a regular file", entry.path().display());
            continue;
        };

        let excluded = entry
            .file_name()
            .to_str()
            .is_some_and(|n| EXCLUDED_FILE_NAMES.contains(&n));
        if excluded {
            tracing::debug!("skipping metadata file {}", entry.path().display());
            continue;
        }

        files.push(SourceFile {
            name: normalize_rel_path(root, entry.path())?,
            size: metadata.len(),
        });
    }

    files.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
    tracing::debug!("found {} files under {}", files.len(), root.display());
    Ok(files)
}

/// `file_path` relative to `root`, with `/` separators.
pub fn normalize_rel_path(root: &Path, file_path: &Path) -> Result<String> {
    let rel = file_path.strip_prefix(root).map_err(|_| {
        MhpfError::format(format!("{} is outside {}", file_path.display(), root.display()))
    })?;

    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    MhpfError::format(format!("path {} is not valid UTF-8", file_path.display()))
                })?;
                parts.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(MhpfError::format(format!(
                    "path {} escapes {}",
                    file_path.display(),
                    root.display()
                )));
            }
        }
    }

    if parts.is_empty() {
        return Err(MhpfError::format("empty relative path"));
    }
    Ok(parts.join("/"))
}

/// Where resource `name` lives under `dest`, both when packing from and
/// extracting into a directory.
///
/// Names that are absolute, start with a drive letter (`C:`) or climb out of
/// `dest` are rejected.  Any other `:` is an ordinary character except on
/// Windows, where it would address an alternate data stream.
pub fn output_path(dest: &Path, name: &str) -> Result<PathBuf> {
    let mut out = dest.to_path_buf();
    for (i, part) in name.split(['/', '\\']).enumerate() {
        let unsafe_part = part.is_empty()
            || part == "."
            || part == ".."
            || (i == 0 && is_drive_prefix(part))
            || (cfg!(windows) && part.contains(':'));
        if unsafe_part {
            return Err(MhpfError::format(format!("unsafe resource name '{name}'")));
        }
        out.push(part);
    }
    Ok(out)
}

fn is_drive_prefix(part: &str) -> bool {
    let bytes = part.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
