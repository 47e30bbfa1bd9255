//! Identifier map: assigns each resource path its numeric identifier and,
//! through the identifiers, the order resources are packed in.
//!
//! The JSON form (`fileids.json`) is an object keyed by decimal identifier:
//!
//! ```json
//! { "2": "sub/b.txt", "5": "a.txt" }
//! ```
//!
//! The inverted orientation (`{ "a.txt": 5 }`) is accepted on input.
//!
//! Paths read from JSON have `\` rewritten to `/`, so a map written on
//! Windows matches the `/`-joined names the directory scan produces.  Names
//! given to [`IdMap::from_entries`] or [`IdMap::insert`] are kept verbatim.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use crate::error::{MhpfError, Result};
use crate::io_stream::PackEntry;
use crate::walk::SourceFile;

/// What to do with a source file the identifier map does not mention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnmappedPolicy {
    /// Fail with [`MhpfError::MissingIdentifier`].
    #[default]
    Reject,
    /// Leave the file out of the archive and log a warning.
    Drop,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawIdMap {
    ById(BTreeMap<String, String>),
    ByPath(BTreeMap<String, u32>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMap {
    by_path: HashMap<String, u32>,
    by_id:   BTreeMap<u32, String>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_json(&bytes)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let mut map = Self::new();
        match serde_json::from_slice::<RawIdMap>(bytes)? {
            RawIdMap::ById(raw) => {
                for (key, path) in raw {
                    let id = key.trim().parse::<u32>().map_err(|_| {
                        MhpfError::IdMap(format!("key '{key}' is not a 32-bit identifier"))
                    })?;
                    map.insert(path.replace('\\', "/"), id)?;
                }
            }
            RawIdMap::ByPath(raw) => {
                for (path, id) in raw {
                    map.insert(path.replace('\\', "/"), id)?;
                }
            }
        }
        Ok(map)
    }

    /// Build a map from `(identifier, name)` pairs, e.g. a decoded archive.
    pub fn from_entries<'a, I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u32, &'a str)>,
    {
        let mut map = Self::new();
        for (id, name) in entries {
            map.insert(name.to_owned(), id)?;
        }
        Ok(map)
    }

    /// Assign `id` to `path`.  Paths and identifiers must both be unique.
    pub fn insert(&mut self, path: String, id: u32) -> Result<()> {
        if let Some(existing) = self.by_path.get(&path) {
            return Err(MhpfError::IdMap(format!(
                "'{path}' has two identifiers ({existing} and {id})"
            )));
        }
        if let Some(existing) = self.by_id.get(&id) {
            return Err(MhpfError::IdMap(format!(
                "identifier {id} names both '{existing}' and '{path}'"
            )));
        }
        self.by_path.insert(path.clone(), id);
        self.by_id.insert(id, path);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<u32> {
        self.by_path.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// `(identifier, path)` in ascending identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.by_id.iter().map(|(&id, path)| (id, path.as_str()))
    }

    /// `fileids.json` text, keyed by identifier.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.by_id)?)
    }

    /// Select and order `files` for packing: mapped files ascending by
    /// identifier, unmapped files handled per `policy`.  Map entries with no
    /// matching file are skipped.
    pub fn order_files(&self, files: Vec<SourceFile>, policy: UnmappedPolicy) -> Result<Vec<PackEntry>> {
        let mut entries = Vec::with_capacity(files.len());

        for file in files {
            match self.get(&file.name) {
                Some(identifier) => entries.push(PackEntry {
                    identifier,
                    name:     file.name,
                    raw_size: file.size,
                }),
                None => match policy {
                    UnmappedPolicy::Reject => {
                        return Err(MhpfError::MissingIdentifier { path: file.name });
                    }
                    UnmappedPolicy::Drop => {
                        tracing::warn!("'{}' has no identifier; leaving it out of the archive", file.name);
                    }
                },
            }
        }

        if entries.len() < self.len() {
            let present: HashSet<&str> = entries.iter().map(|e| e.name.as_str()).collect();
            for (id, path) in self.iter().filter(|(_, p)| !present.contains(p)) {
                tracing::warn!("identifier {id} names '{path}', which is not in the source tree");
            }
        }

        entries.sort_by_key(|e| e.identifier);
        Ok(entries)
    }
}
