//! In-memory model of a target game container
//!
//! A [`Package`] holds addressable entries. Each entry has an object name, a
//! class name, an optional outer (parent) entry, a property collection and a
//! decoded binary form. Entries are addressed by their instanced full path,
//! the outer chain joined with dots (`SFXGame.SFXPawn.Health`), which is unique
//! within a package.
//!
//! The package tracks a revision counter that moves on every mutation. Script
//! compilation contexts are pinned to a revision, which is how stale contexts
//! are detected after an edit.

mod io;
mod property;

pub use io::{JsonPackageIo, PackageIo};
pub use property::{Property, PropertyCollection, PropertyValue};

use crate::{Error, Result};
use bitflags::bitflags;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Class name of namespace entries
pub const PACKAGE_CLASS: &str = "Package";

/// Zero-based position of an entry in its package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryIndex(pub usize);

impl EntryIndex {
    /// 1-based object reference value used inside properties
    pub fn uindex(self) -> i32 {
        self.0 as i32 + 1
    }

    /// Inverse of [`EntryIndex::uindex`]; `None` for null and import references
    pub fn from_uindex(uindex: i32) -> Option<Self> {
        (uindex > 0).then(|| EntryIndex(uindex as usize - 1))
    }
}

impl fmt::Display for EntryIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.uindex())
    }
}

bitflags! {
    /// Flags stored on property-descriptor entries
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyFlags: u64 {
        /// Editable in the editor
        const EDIT = 0x0000_0000_0000_0001;
        /// Constant
        const CONST = 0x0000_0000_0000_0002;
        /// Value loaded from configuration files
        const CONFIG = 0x0000_0000_0000_4000;
        /// Value loaded from the global configuration file
        const GLOBAL_CONFIG = 0x0000_0000_0004_0000;
        /// Not saved to disk
        const TRANSIENT = 0x0000_0000_0000_2000;
        /// Localized text
        const LOCALIZED = 0x0000_0000_0000_8000;
    }
}

/// Decoded binary form of an entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryBinary {
    /// No class-specific binary
    #[default]
    None,
    /// Property descriptor
    Property {
        /// Raw [`PropertyFlags`] bits
        flags: u64,
    },
    /// Compiled function
    Function {
        /// Bytecode
        bytecode: Vec<u8>,
    },
    /// Compiled class
    Class {
        /// Bytecode and class metadata
        bytecode: Vec<u8>,
    },
    /// Opaque bytes
    Raw {
        /// Raw data
        data: Vec<u8>,
    },
}

impl EntryBinary {
    /// Property flags when this binary is a property descriptor
    pub fn property_flags(&self) -> Option<PropertyFlags> {
        match self {
            EntryBinary::Property { flags } => Some(PropertyFlags::from_bits_retain(*flags)),
            _ => None,
        }
    }
}

/// An addressable object inside a package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Object name (last segment of the full path)
    pub object_name: String,
    /// Class of the object
    pub class_name: String,
    /// Parent entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outer: Option<EntryIndex>,
    /// Property data
    #[serde(default, skip_serializing_if = "PropertyCollection::is_empty")]
    pub properties: PropertyCollection,
    /// Class-specific binary
    #[serde(default)]
    pub binary: EntryBinary,
}

impl Entry {
    /// Create an entry with no properties and no binary
    pub fn new<N: Into<String>, C: Into<String>>(
        object_name: N,
        class_name: C,
        outer: Option<EntryIndex>,
    ) -> Self {
        Self {
            object_name: object_name.into(),
            class_name: class_name.into(),
            outer,
            properties: PropertyCollection::new(),
            binary: EntryBinary::None,
        }
    }

    /// Builder-style property setter
    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.set(property);
        self
    }

    /// Builder-style binary setter
    pub fn with_binary(mut self, binary: EntryBinary) -> Self {
        self.binary = binary;
        self
    }
}

#[derive(Serialize)]
struct RawContent<'a> {
    class_name: &'a str,
    properties: &'a PropertyCollection,
    binary: &'a EntryBinary,
}

/// An opened target container
#[derive(Debug, Clone)]
pub struct Package {
    file_name: String,
    entries: Vec<Entry>,
    revision: u64,
    modified: bool,
}

impl Package {
    /// Create an empty package
    pub fn new<S: Into<String>>(file_name: S) -> Self {
        Self {
            file_name: file_name.into(),
            entries: Vec::new(),
            revision: 0,
            modified: false,
        }
    }

    /// Build a package from stored entries, checking outer links and path uniqueness
    ///
    /// The result is unmodified at revision 0.
    pub fn from_entries<S: Into<String>>(file_name: S, entries: Vec<Entry>) -> Result<Self> {
        let mut package = Self::new(file_name);
        for entry in entries {
            package.add_entry(entry)?;
        }
        package.revision = 0;
        package.modified = false;
        Ok(package)
    }

    /// File name the package was opened from
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// All entries in index order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the package has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry by index
    pub fn entry(&self, index: EntryIndex) -> Option<&Entry> {
        self.entries.get(index.0)
    }

    /// Mutable entry by index; counts as a mutation
    pub fn entry_mut(&mut self, index: EntryIndex) -> Option<&mut Entry> {
        if index.0 < self.entries.len() {
            self.mark_modified();
        }
        self.entries.get_mut(index.0)
    }

    /// Revision counter, bumped on every mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether anything changed since the package was opened
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Record a mutation made through some other path
    pub fn mark_modified(&mut self) {
        self.revision += 1;
        self.modified = true;
    }

    /// Instanced full path of an entry
    pub fn full_path(&self, index: EntryIndex) -> String {
        let mut segments = Vec::new();
        let mut current = Some(index);
        while let Some(idx) = current {
            match self.entries.get(idx.0) {
                Some(entry) => {
                    segments.push(entry.object_name.as_str());
                    current = entry.outer;
                }
                None => break,
            }
        }
        segments.reverse();
        segments.join(".")
    }

    /// Find an entry by instanced full path (case-insensitive)
    pub fn find(&self, path: &str) -> Option<EntryIndex> {
        (0..self.entries.len())
            .map(EntryIndex)
            .find(|&idx| self.full_path(idx).eq_ignore_ascii_case(path))
    }

    /// Find a direct child of `outer` by object name
    pub fn find_child(&self, outer: Option<EntryIndex>, name: &str) -> Option<EntryIndex> {
        self.entries
            .iter()
            .position(|e| e.outer == outer && e.object_name.eq_ignore_ascii_case(name))
            .map(EntryIndex)
    }

    /// Direct children of an entry
    pub fn children(&self, outer: EntryIndex) -> Vec<EntryIndex> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.outer == Some(outer))
            .map(|(i, _)| EntryIndex(i))
            .collect()
    }

    /// Outer chain of an entry, root first, excluding the entry itself
    pub fn ancestors(&self, index: EntryIndex) -> Vec<EntryIndex> {
        let mut chain = Vec::new();
        let mut current = self.entries.get(index.0).and_then(|e| e.outer);
        while let Some(idx) = current {
            if chain.contains(&idx) {
                break;
            }
            chain.push(idx);
            current = self.entries.get(idx.0).and_then(|e| e.outer);
        }
        chain.reverse();
        chain
    }

    /// Append an entry
    ///
    /// Fails when the name is empty or dotted, when the outer does not exist,
    /// or when the resulting full path is already taken.
    pub fn add_entry(&mut self, entry: Entry) -> Result<EntryIndex> {
        if entry.object_name.is_empty() || entry.object_name.contains('.') {
            return Err(Error::validation(format!(
                "Invalid object name '{}' in {}: names must be non-empty and contain no '.'",
                entry.object_name, self.file_name
            )));
        }
        if let Some(outer) = entry.outer {
            if outer.0 >= self.entries.len() {
                return Err(Error::invalid_format(format!(
                    "Entry {} references missing outer {}",
                    entry.object_name, outer
                )));
            }
        }
        if self.find_child(entry.outer, &entry.object_name).is_some() {
            let path = match entry.outer {
                Some(outer) => format!("{}.{}", self.full_path(outer), entry.object_name),
                None => entry.object_name.clone(),
            };
            return Err(Error::validation(format!(
                "Duplicate entry path {path} in {}",
                self.file_name
            )));
        }
        self.entries.push(entry);
        self.mark_modified();
        Ok(EntryIndex(self.entries.len() - 1))
    }

    /// Find or create a chain of namespace entries for a dotted path
    pub fn ensure_namespace(&mut self, path: &str) -> Result<Option<EntryIndex>> {
        let mut outer = None;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            outer = Some(match self.find_child(outer, segment) {
                Some(existing) => existing,
                None => self.add_entry(Entry::new(segment, PACKAGE_CLASS, outer))?,
            });
        }
        Ok(outer)
    }

    /// Canonical serialized form of an entry's content
    pub fn raw_content(&self, index: EntryIndex) -> Result<Vec<u8>> {
        let entry = self
            .entry(index)
            .ok_or_else(|| Error::invalid_format(format!("No entry at {index}")))?;
        Ok(serde_json::to_vec(&RawContent {
            class_name: &entry.class_name,
            properties: &entry.properties,
            binary: &entry.binary,
        })?)
    }

    /// MD5 of an entry's raw content, as lowercase hex
    pub fn fingerprint(&self, index: EntryIndex) -> Result<String> {
        let raw = self.raw_content(index)?;
        Ok(hex::encode(Md5::digest(&raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Package {
        let mut package = Package::new("SFXGame.pcc");
        let root = package
            .add_entry(Entry::new("SFXGame", PACKAGE_CLASS, None))
            .unwrap();
        let pawn = package
            .add_entry(Entry::new("SFXPawn", "Class", Some(root)))
            .unwrap();
        package
            .add_entry(
                Entry::new("Health", "IntProperty", Some(pawn)).with_binary(EntryBinary::Property {
                    flags: (PropertyFlags::CONFIG | PropertyFlags::EDIT).bits(),
                }),
            )
            .unwrap();
        package
    }

    #[test]
    fn test_paths_and_lookup() {
        let package = sample();
        let health = package.find("sfxgame.sfxpawn.health").unwrap();
        assert_eq!(health, EntryIndex(2));
        assert_eq!(package.full_path(health), "SFXGame.SFXPawn.Health");
        assert_eq!(package.ancestors(health), vec![EntryIndex(0), EntryIndex(1)]);
        assert_eq!(package.children(EntryIndex(1)), vec![EntryIndex(2)]);
        assert!(package.find("SFXGame.Missing").is_none());
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let mut package = sample();
        let err = package
            .add_entry(Entry::new("SFXPawn", "Class", Some(EntryIndex(0))))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = package
            .add_entry(Entry::new("Orphan", "Class", Some(EntryIndex(99))))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));

        // A dotted name at the root would shadow SFXGame.SFXPawn
        let err = package
            .add_entry(Entry::new("SFXGame.SFXPawn", "Class", None))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(package.add_entry(Entry::new("", "Class", None)).is_err());

        let err = Package::from_entries(
            "A.pcc",
            vec![
                Entry::new("A", "Package", None),
                Entry::new("B", "Class", Some(EntryIndex(0))),
                Entry::new("A.B", "Class", None),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_revision_tracking() {
        let package = Package::from_entries("A.pcc", sample().entries().to_vec()).unwrap();
        assert_eq!(package.revision(), 0);
        assert!(!package.is_modified());

        let mut package = package;
        package.entry_mut(EntryIndex(1)).unwrap().class_name = "State".to_string();
        assert_eq!(package.revision(), 1);
        assert!(package.is_modified());

        // Out of range lookups do not count as mutations
        assert!(package.entry_mut(EntryIndex(50)).is_none());
        assert_eq!(package.revision(), 1);
    }

    #[test]
    fn test_ensure_namespace_reuses_existing() {
        let mut package = sample();
        let existing = package.ensure_namespace("SFXGame").unwrap();
        assert_eq!(existing, Some(EntryIndex(0)));

        let created = package.ensure_namespace("SFXGame.MergeNS.Inner").unwrap().unwrap();
        assert_eq!(package.full_path(created), "SFXGame.MergeNS.Inner");
        assert_eq!(package.len(), 5);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let mut package = sample();
        let pawn = EntryIndex(1);
        let before = package.fingerprint(pawn).unwrap();
        assert_eq!(before.len(), 32);
        assert_eq!(before, package.fingerprint(pawn).unwrap());

        package
            .entry_mut(pawn)
            .unwrap()
            .properties
            .set(Property::new("bCanJump", PropertyValue::Bool(true)));
        assert_ne!(before, package.fingerprint(pawn).unwrap());
    }

    #[test]
    fn test_uindex_conversion() {
        assert_eq!(EntryIndex(0).uindex(), 1);
        assert_eq!(EntryIndex::from_uindex(5), Some(EntryIndex(4)));
        assert_eq!(EntryIndex::from_uindex(0), None);
        assert_eq!(EntryIndex::from_uindex(-3), None);
    }
}
