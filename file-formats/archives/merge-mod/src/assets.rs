//! Asset table of a merge mod
//!
//! Assets are named payloads bundled with the manifest: class and script
//! sources, and whole containers that objects are ported out of. Payloads are
//! either read eagerly with the table, or loaded on first use by re-opening the
//! container file at the offset recorded while parsing.

use crate::compression;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One entry of the asset table
#[derive(Debug)]
pub struct AssetRecord {
    name: String,
    size: usize,
    compressed: bool,
    compressed_size: usize,
    offset: u64,
    payload: Mutex<Option<Arc<[u8]>>>,
}

impl AssetRecord {
    /// Record whose decompressed payload is already in memory
    pub fn loaded<S: Into<String>>(name: S, payload: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size: payload.len(),
            compressed: false,
            compressed_size: 0,
            offset: 0,
            payload: Mutex::new(Some(payload.into())),
        }
    }

    /// Record backed by a byte range of the container file
    pub(crate) fn lazy(
        name: String,
        size: usize,
        compressed: bool,
        compressed_size: usize,
        offset: u64,
    ) -> Self {
        Self {
            name,
            size,
            compressed,
            compressed_size,
            offset,
            payload: Mutex::new(None),
        }
    }

    /// Asset name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared decompressed size
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the payload is stored compressed
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Stored size when compressed
    pub fn compressed_size(&self) -> usize {
        self.compressed_size
    }

    /// Offset of the stored payload in the container file
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether the payload is currently held in memory
    pub fn is_loaded(&self) -> bool {
        self.payload.lock().is_some()
    }

    /// Size of the payload as stored on disk
    pub(crate) fn stored_size(&self) -> usize {
        if self.compressed {
            self.compressed_size
        } else {
            self.size
        }
    }

    /// Turn stored bytes into the payload, decompressing when flagged
    pub(crate) fn decode(&self, stored: Vec<u8>) -> Result<Vec<u8>> {
        if self.compressed {
            compression::decompress(&stored, self.size)
        } else if stored.len() != self.size {
            Err(Error::asset_load(
                &self.name,
                format!("expected {} bytes, read {}", self.size, stored.len()),
            ))
        } else {
            Ok(stored)
        }
    }

    pub(crate) fn set_payload(&self, payload: Vec<u8>) {
        *self.payload.lock() = Some(payload.into());
    }

    fn load(&self, backing: Option<&Path>) -> Result<Arc<[u8]>> {
        // Held for the whole load so concurrent first readers decompress once
        let mut slot = self.payload.lock();
        if let Some(payload) = slot.as_ref() {
            return Ok(Arc::clone(payload));
        }

        let path = backing.ok_or_else(|| {
            Error::asset_load(
                &self.name,
                "payload was not loaded and the merge mod has no backing file",
            )
        })?;

        log::debug!(
            "Loading asset {} from {} at offset {}",
            self.name,
            path.display(),
            self.offset
        );
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let mut stored = vec![0u8; self.stored_size()];
        file.read_exact(&mut stored)?;

        let payload: Arc<[u8]> = self.decode(stored)?.into();
        *slot = Some(Arc::clone(&payload));
        Ok(payload)
    }

    fn release(&self) {
        *self.payload.lock() = None;
    }
}

/// Named asset payloads of one document
#[derive(Debug, Default)]
pub struct AssetStore {
    records: Vec<AssetRecord>,
    index: HashMap<String, usize>,
    backing: Option<PathBuf>,
}

impl AssetStore {
    /// Empty store with no backing file
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the container file that lazy records are read from
    pub fn with_backing<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.backing = Some(path.into());
        self
    }

    /// Container file lazy records are read from
    pub fn backing_path(&self) -> Option<&Path> {
        self.backing.as_deref()
    }

    /// Add a record; a later record with the same name replaces the lookup
    pub fn insert(&mut self, record: AssetRecord) {
        let key = record.name.to_ascii_lowercase();
        self.records.push(record);
        self.index.insert(key, self.records.len() - 1);
    }

    /// Records in table order
    pub fn records(&self) -> &[AssetRecord] {
        &self.records
    }

    /// Number of assets
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&AssetRecord> {
        self.index
            .get(&name.to_ascii_lowercase())
            .map(|&i| &self.records[i])
    }

    /// Whether an asset exists
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Make sure an asset's payload is in memory and return it
    ///
    /// Idempotent. Fails when the asset does not exist, or when its payload
    /// was never loaded and there is no backing file to read it from.
    pub fn ensure_loaded(&self, name: &str) -> Result<Arc<[u8]>> {
        let record = self
            .get(name)
            .ok_or_else(|| Error::asset_load(name, "no such asset in the merge mod"))?;
        record.load(self.backing.as_deref())
    }

    /// Payload decoded as text
    pub fn as_string(&self, name: &str) -> Result<String> {
        let payload = self.ensure_loaded(name)?;
        decode_text(&payload).ok_or_else(|| Error::asset_load(name, "payload is not valid text"))
    }

    /// Drop payload buffers when they can be read again from the backing file
    ///
    /// Returns whether anything was released. Stores without a backing file
    /// keep their payloads, since there would be no way to reload them.
    pub fn release_assets(&self) -> bool {
        if self.backing.is_none() {
            return false;
        }
        for record in &self.records {
            record.release();
        }
        true
    }
}

/// Decode text with byte-order-mark sniffing
///
/// UTF-8 (with or without BOM) and BOM-marked UTF-16 in either byte order are
/// accepted.
pub fn decode_text(bytes: &[u8]) -> Option<String> {
    match bytes {
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8(rest.to_vec()).ok(),
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        _ => String::from_utf8(bytes.to_vec()).ok(),
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::thread;
    use tempfile::NamedTempFile;

    #[test]
    fn test_in_memory_store() {
        let mut store = AssetStore::new();
        store.insert(AssetRecord::loaded("Fix.uc", b"class Fix;".to_vec()));

        assert!(store.contains("fix.UC"));
        assert_eq!(store.as_string("Fix.uc").unwrap(), "class Fix;");

        // Nothing to reload from, so release keeps the payload
        assert!(!store.release_assets());
        assert!(store.get("Fix.uc").unwrap().is_loaded());

        let err = store.ensure_loaded("Missing.uc").unwrap_err();
        assert!(matches!(err, Error::AssetLoad { .. }));
    }

    #[test]
    fn test_lazy_without_backing_fails() {
        let mut store = AssetStore::new();
        store.insert(AssetRecord::lazy("A.uc".to_string(), 4, false, 0, 10));
        let err = store.ensure_loaded("A.uc").unwrap_err();
        assert!(matches!(err, Error::AssetLoad { .. }));
    }

    #[test]
    fn test_lazy_load_release_reload() {
        let compressed = compression::compress(b"compressed payload").unwrap();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"HEADER").unwrap();
        file.write_all(b"raw!").unwrap();
        file.write_all(&compressed).unwrap();
        file.flush().unwrap();

        let mut store = AssetStore::new().with_backing(file.path());
        store.insert(AssetRecord::lazy("raw.bin".to_string(), 4, false, 0, 6));
        store.insert(AssetRecord::lazy(
            "packed.txt".to_string(),
            18,
            true,
            compressed.len(),
            10,
        ));

        assert_eq!(&*store.ensure_loaded("raw.bin").unwrap(), b"raw!");
        assert_eq!(store.as_string("packed.txt").unwrap(), "compressed payload");

        assert!(store.release_assets());
        assert!(!store.get("raw.bin").unwrap().is_loaded());
        assert_eq!(&*store.ensure_loaded("raw.bin").unwrap(), b"raw!");
    }

    #[test]
    fn test_concurrent_first_load() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[7u8; 4096]).unwrap();
        file.flush().unwrap();

        let mut store = AssetStore::new().with_backing(file.path());
        store.insert(AssetRecord::lazy("blob.bin".to_string(), 4096, false, 0, 0));
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.ensure_loaded("blob.bin").unwrap())
            })
            .collect();
        let payloads: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Every thread sees the same buffer
        for payload in &payloads[1..] {
            assert!(Arc::ptr_eq(payload, &payloads[0]));
        }
    }

    #[test]
    fn test_decode_text_boms() {
        assert_eq!(decode_text(b"\xEF\xBB\xBFabc").unwrap(), "abc");
        assert_eq!(decode_text(b"plain").unwrap(), "plain");
        assert_eq!(decode_text(&[0xFF, 0xFE, b'h', 0, b'i', 0]).unwrap(), "hi");
        assert_eq!(decode_text(&[0xFE, 0xFF, 0, b'h', 0, b'i']).unwrap(), "hi");
        assert!(decode_text(&[0xFF, 0xFE, b'h']).is_none());
        assert!(decode_text(&[0xC3, 0x28]).is_none());
    }
}
