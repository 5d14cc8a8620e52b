//! Compressed string-table bundles
//!
//! A bundle carries many localized string tables for bulk merging. Entries
//! can be tied to an option key so that a table is only merged when the
//! matching install option is enabled.
//!
//! ```text
//! magic    "MGST"
//! version  u8
//! index    i32 compressed_len, i32 index_len, LZMA bytes
//! data     per-entry LZMA payloads back to back, to end of stream
//! ```
//!
//! The decompressed index is an i32 entry count followed by, per entry, the
//! name, data offset, decompressed size and compressed size, and in version 2
//! an i32 option key (`-1` for none).

use crate::codec::FormatVersion;
use crate::compression;
use crate::io::{
    read_bytes, read_len, read_str, stream_len, truncation_as_corruption, validate_file_name,
    write_len, write_str,
};
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

/// String-table bundle magic
pub const STRING_TABLE_MAGIC: [u8; 4] = *b"MGST";

const NO_OPTION_KEY: i32 = -1;

/// Index record of one string table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringTableEntry {
    /// Table name
    pub name: String,
    /// Offset of the compressed payload from the start of the data region
    pub offset: u32,
    /// Decompressed payload size
    pub size: u32,
    /// Compressed payload size
    pub compressed_size: u32,
    /// Install option this table belongs to
    pub option_key: Option<i32>,
}

impl StringTableEntry {
    /// Whether the entry is merged with the given options enabled
    pub fn is_enabled(&self, enabled: &HashSet<i32>) -> bool {
        self.option_key.is_none_or(|key| enabled.contains(&key))
    }
}

/// A parsed bundle
#[derive(Debug, Clone)]
pub struct StringTable {
    version: FormatVersion,
    entries: Vec<StringTableEntry>,
    data: Vec<u8>,
}

impl StringTable {
    /// Open a bundle file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Opening string table bundle {}", path.display());
        let mut reader = BufReader::new(File::open(path)?);
        Self::load(&mut reader)
    }

    /// Parse a bundle from a stream
    pub fn load<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let length = stream_len(reader)?;
        Self::read_bundle(reader, length).map_err(|e| truncation_as_corruption(e, reader, length))
    }

    fn read_bundle<R: Read + Seek>(reader: &mut R, length: u64) -> Result<Self> {

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != STRING_TABLE_MAGIC {
            return Err(Error::invalid_format(format!(
                "Bad string table magic {magic:02X?}"
            )));
        }

        let raw_version = reader.read_u8()?;
        let version = FormatVersion::from_raw(raw_version).ok_or_else(|| {
            if raw_version == 0 {
                Error::invalid_format("String table version 0 is not valid")
            } else {
                Error::UnsupportedVersion {
                    found: raw_version,
                    supported: FormatVersion::LATEST.as_raw(),
                }
            }
        })?;

        let compressed_len = read_len(reader, length, "compressed index")?;
        let index_len = reader.read_i32::<LittleEndian>()?;
        let index_len = usize::try_from(index_len)
            .map_err(|_| Error::invalid_format(format!("Negative index length: {index_len}")))?;
        let index = compression::decompress(&read_bytes(reader, compressed_len)?, index_len)?;
        let entries = parse_index(&index, version)?;

        let data_start = reader.stream_position()?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        for entry in &entries {
            let end = u64::from(entry.offset) + u64::from(entry.compressed_size);
            if end > data.len() as u64 {
                return Err(Error::Corruption {
                    position: data_start + end,
                    length,
                });
            }
        }

        log::debug!(
            "Loaded {version} string table bundle with {} entries",
            entries.len()
        );
        Ok(Self {
            version,
            entries,
            data,
        })
    }

    /// Parse a bundle held in memory
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::load(&mut Cursor::new(data))
    }

    /// Bundle version
    pub fn version(&self) -> FormatVersion {
        self.version
    }

    /// Every entry in index order
    pub fn entries(&self) -> &[StringTableEntry] {
        &self.entries
    }

    /// Entries merged with the given options enabled
    ///
    /// Entries without an option key are always listed.
    pub fn list(&self, enabled: &HashSet<i32>) -> Vec<&StringTableEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.is_enabled(enabled))
            .collect()
    }

    /// Entry by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&StringTableEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    /// Decompressed payload of an entry
    pub fn read_entry(&self, entry: &StringTableEntry) -> Result<Vec<u8>> {
        let start = entry.offset as usize;
        let end = start + entry.compressed_size as usize;
        let compressed = self.data.get(start..end).ok_or_else(|| {
            Error::invalid_format(format!("Entry {} lies outside the data region", entry.name))
        })?;
        compression::decompress(compressed, entry.size as usize)
    }
}

fn parse_index(index: &[u8], version: FormatVersion) -> Result<Vec<StringTableEntry>> {
    let length = index.len() as u64;
    let mut cursor = Cursor::new(index);
    let count = cursor.read_i32::<LittleEndian>()?;
    if count < 0 {
        return Err(Error::invalid_format(format!(
            "Negative string table count: {count}"
        )));
    }

    let mut entries = Vec::new();
    for _ in 0..count {
        let name = read_str(&mut cursor, length, "string table name")?;
        let offset = cursor.read_u32::<LittleEndian>()?;
        let size = cursor.read_u32::<LittleEndian>()?;
        let compressed_size = cursor.read_u32::<LittleEndian>()?;
        let option_key = if version >= FormatVersion::V2 {
            match cursor.read_i32::<LittleEndian>()? {
                NO_OPTION_KEY => None,
                key => Some(key),
            }
        } else {
            None
        };
        entries.push(StringTableEntry {
            name,
            offset,
            size,
            compressed_size,
            option_key,
        });
    }
    Ok(entries)
}

/// Builds a bundle, verifying the result by reading it back
#[derive(Debug, Clone)]
pub struct StringTableBuilder {
    version: FormatVersion,
    tables: Vec<(String, Vec<u8>, Option<i32>)>,
}

impl StringTableBuilder {
    /// Empty builder for a bundle version
    pub fn new(version: FormatVersion) -> Self {
        Self {
            version,
            tables: Vec::new(),
        }
    }

    /// Add a table merged regardless of install options
    pub fn add<S: Into<String>>(mut self, name: S, data: Vec<u8>) -> Self {
        self.tables.push((name.into(), data, None));
        self
    }

    /// Add a table merged only when `option_key` is enabled
    pub fn add_for_option<S: Into<String>>(mut self, name: S, data: Vec<u8>, option_key: i32) -> Self {
        self.tables.push((name.into(), data, Some(option_key)));
        self
    }

    /// Number of tables added
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether no tables were added
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Compress and serialize the bundle
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();
        for (name, _, option_key) in &self.tables {
            if let Err(e) = validate_file_name(name) {
                issues.push(e.to_string());
            }
            if !seen.insert(name.to_ascii_lowercase()) {
                issues.push(format!("Duplicate string table {name}"));
            }
            if option_key.is_some() && self.version < FormatVersion::V2 {
                issues.push(format!("{name}: option keys require format version 2"));
            }
            if *option_key == Some(NO_OPTION_KEY) {
                issues.push(format!("{name}: option key {NO_OPTION_KEY} is reserved"));
            }
        }
        if !issues.is_empty() {
            return Err(Error::Validation(issues));
        }

        let mut index = Vec::new();
        let mut data = Vec::new();
        write_len(&mut index, self.tables.len())?;
        for (name, payload, option_key) in &self.tables {
            let compressed = compression::compress(payload)?;
            write_str(&mut index, name)?;
            index.write_u32::<LittleEndian>(to_u32(data.len(), name)?)?;
            index.write_u32::<LittleEndian>(to_u32(payload.len(), name)?)?;
            index.write_u32::<LittleEndian>(to_u32(compressed.len(), name)?)?;
            if self.version >= FormatVersion::V2 {
                index.write_i32::<LittleEndian>(option_key.unwrap_or(NO_OPTION_KEY))?;
            }
            data.extend_from_slice(&compressed);
        }

        let compressed_index = compression::compress(&index)?;
        let mut out = Vec::with_capacity(13 + compressed_index.len() + data.len());
        out.extend_from_slice(&STRING_TABLE_MAGIC);
        out.write_u8(self.version.as_raw())?;
        write_len(&mut out, compressed_index.len())?;
        write_len(&mut out, index.len())?;
        out.extend_from_slice(&compressed_index);
        out.extend_from_slice(&data);

        self.verify(&out)?;
        log::debug!(
            "Built {} string table bundle: {} tables, {} bytes",
            self.version,
            self.tables.len(),
            out.len()
        );
        Ok(out)
    }

    fn verify(&self, bundle: &[u8]) -> Result<()> {
        let table = StringTable::from_bytes(bundle)?;
        if table.entries().len() != self.tables.len() {
            return Err(Error::compression(
                "String table verification failed: entry count differs",
            ));
        }
        for (entry, (name, payload, option_key)) in table.entries().iter().zip(&self.tables) {
            if entry.name != *name
                || entry.option_key != *option_key
                || table.read_entry(entry)? != *payload
            {
                return Err(Error::compression(format!(
                    "String table verification failed for {name}"
                )));
            }
        }
        Ok(())
    }
}

fn to_u32(value: usize, name: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::invalid_format(format!("{name}: size {value} does not fit in 32 bits")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bundle() -> Vec<u8> {
        StringTableBuilder::new(FormatVersion::V2)
            .add("Startup_INT.xml", b"<tlk>base</tlk>".to_vec())
            .add_for_option("Squadmate_INT.xml", b"<tlk>squad</tlk>".to_vec(), 7)
            .add_for_option("Romance_INT.xml", b"<tlk>romance</tlk>".to_vec(), 9)
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_and_read_entries() {
        let table = StringTable::from_bytes(&bundle()).unwrap();
        assert_eq!(table.version(), FormatVersion::V2);
        assert_eq!(table.entries().len(), 3);

        let squad = table.get("squadmate_int.xml").unwrap();
        assert_eq!(squad.option_key, Some(7));
        assert_eq!(table.read_entry(squad).unwrap(), b"<tlk>squad</tlk>");
        assert!(table.get("Missing.xml").is_none());
    }

    #[test]
    fn test_listing_filters_by_option() {
        let table = StringTable::from_bytes(&bundle()).unwrap();
        let names = |enabled: &[i32]| -> Vec<String> {
            let enabled: HashSet<i32> = enabled.iter().copied().collect();
            table
                .list(&enabled)
                .into_iter()
                .map(|e| e.name.clone())
                .collect()
        };

        assert_eq!(names(&[]), vec!["Startup_INT.xml"]);
        assert_eq!(names(&[9]), vec!["Startup_INT.xml", "Romance_INT.xml"]);
        assert_eq!(names(&[7, 9, 11]).len(), 3);
    }

    #[test]
    fn test_v1_has_no_option_keys() {
        let bytes = StringTableBuilder::new(FormatVersion::V1)
            .add("Startup_INT.xml", b"base".to_vec())
            .build()
            .unwrap();
        let table = StringTable::from_bytes(&bytes).unwrap();
        assert_eq!(table.version(), FormatVersion::V1);
        assert_eq!(table.entries()[0].option_key, None);

        let err = StringTableBuilder::new(FormatVersion::V1)
            .add_for_option("Squadmate_INT.xml", b"squad".to_vec(), 1)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_builder_rejects_bad_names() {
        let err = StringTableBuilder::new(FormatVersion::V2)
            .add("a.xml", Vec::new())
            .add("A.XML", Vec::new())
            .add("../escape.xml", Vec::new())
            .build()
            .unwrap_err();
        match err {
            Error::Validation(issues) => assert_eq!(issues.len(), 2),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_truncated_data_is_corruption() {
        let mut bytes = bundle();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            StringTable::from_bytes(&bytes),
            Err(Error::Corruption { .. })
        ));

        // Cut inside the index length fields
        let bytes = bundle();
        for cut in [7, 11] {
            let err = StringTable::from_bytes(&bytes[..cut]).unwrap_err();
            assert!(matches!(err, Error::Corruption { .. }), "{cut}: {err:?}");
        }
    }

    #[test]
    fn test_header_errors() {
        let mut bytes = bundle();
        bytes[4] = 0;
        assert!(matches!(
            StringTable::from_bytes(&bytes),
            Err(Error::InvalidFormat(_))
        ));
        bytes[4] = 3;
        assert!(matches!(
            StringTable::from_bytes(&bytes),
            Err(Error::UnsupportedVersion { found: 3, .. })
        ));
        bytes[0] = b'X';
        assert!(StringTable::from_bytes(&bytes).unwrap_err().is_format_error());
    }
}
