//! Container parsing

use super::{ASSET_MAGIC, FormatVersion, LoadOptions, MERGE_MOD_MAGIC};
use crate::assets::{AssetRecord, AssetStore};
use crate::compression;
use crate::document::Document;
use crate::io::{
    read_bytes, read_len, read_str, stream_len, truncation_as_corruption, validate_file_name,
};
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

impl LoadOptions<'_> {
    /// Open a container file
    ///
    /// Lazily loaded assets are read back from this path on first use.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<Document> {
        let path = path.as_ref();
        log::debug!("Opening merge mod {}", path.display());
        let mut reader = BufReader::new(File::open(path)?);
        self.read(&mut reader, Some(path))
    }

    /// Parse a container from an in-memory or otherwise unnamed stream
    ///
    /// Without a backing path, assets that are not loaded eagerly cannot be
    /// read later.
    pub fn load<R: Read + Seek>(&self, reader: &mut R) -> Result<Document> {
        self.read(reader, None)
    }

    fn read<R: Read + Seek>(&self, reader: &mut R, backing: Option<&Path>) -> Result<Document> {
        let length = stream_len(reader)?;
        self.read_container(reader, length, backing)
            .map_err(|e| truncation_as_corruption(e, reader, length))
    }

    fn read_container<R: Read + Seek>(
        &self,
        reader: &mut R,
        length: u64,
        backing: Option<&Path>,
    ) -> Result<Document> {

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MERGE_MOD_MAGIC {
            return Err(Error::invalid_format(format!(
                "Bad container magic {magic:02X?}"
            )));
        }

        let raw_version = reader.read_u8()?;
        let version = FormatVersion::from_raw(raw_version)
            .filter(|&v| v <= self.max_version)
            .ok_or_else(|| {
                if raw_version == 0 {
                    Error::invalid_format("Container version 0 is not valid")
                } else {
                    Error::UnsupportedVersion {
                        found: raw_version,
                        supported: self.max_version.as_raw(),
                    }
                }
            })?;

        let manifest_text = read_manifest(reader, length, version)?;

        let count = reader.read_i32::<LittleEndian>()?;
        if count < 0 {
            return Err(Error::invalid_format(format!(
                "Negative asset count: {count}"
            )));
        }

        let mut assets = AssetStore::new();
        if let Some(path) = backing {
            assets = assets.with_backing(path);
        }
        for _ in 0..count {
            let record = self.read_asset(reader, length, version)?;
            assets.insert(record);
        }

        let position = reader.stream_position()?;
        if position != length {
            return Err(Error::Corruption { position, length });
        }

        let document = Document::new(version, manifest_text, assets).map_err(|e| match e {
            Error::Json(e) => Error::invalid_format(format!("Manifest is not valid: {e}")),
            other => other,
        })?;
        log::debug!(
            "Loaded {} merge mod for {} with {} file directives and {} assets",
            version,
            document.game(),
            document.files().len(),
            document.assets().len()
        );

        if let Some(validator) = self.validator {
            validator.validate(&document)?;
        }
        Ok(document)
    }

    fn read_asset<R: Read + Seek>(
        &self,
        reader: &mut R,
        length: u64,
        version: FormatVersion,
    ) -> Result<AssetRecord> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != ASSET_MAGIC {
            return Err(Error::invalid_format(format!(
                "Bad asset magic {magic:02X?} at offset {}",
                reader.stream_position()? - 4
            )));
        }

        let name = read_str(reader, length, "asset name")?;
        validate_file_name(&name)?;

        let size = reader.read_i32::<LittleEndian>()?;
        let size = usize::try_from(size)
            .map_err(|_| Error::invalid_format(format!("Asset {name} has negative size {size}")))?;

        let (compressed, compressed_size) = if version.compresses() {
            match reader.read_u8()? {
                0 => (false, 0),
                1 => (true, read_len(reader, length, "compressed asset")?),
                flag => {
                    return Err(Error::invalid_format(format!(
                        "Asset {name} has invalid compression flag {flag}"
                    )));
                }
            }
        } else {
            (false, 0)
        };

        let offset = reader.stream_position()?;
        let record = AssetRecord::lazy(name, size, compressed, compressed_size, offset);
        let stored = record.stored_size() as u64;
        if stored > length.saturating_sub(offset) {
            return Err(Error::Corruption {
                position: offset + stored,
                length,
            });
        }

        if self.eager_assets {
            let bytes = read_bytes(reader, record.stored_size())?;
            record.set_payload(record.decode(bytes)?);
        } else {
            reader.seek(SeekFrom::Current(stored as i64))?;
        }
        Ok(record)
    }
}

fn read_manifest<R: Read + Seek>(
    reader: &mut R,
    length: u64,
    version: FormatVersion,
) -> Result<String> {
    let text = if version.compresses() {
        let compressed_len = read_len(reader, length, "compressed manifest")?;
        let text_len = reader.read_i32::<LittleEndian>()?;
        let text_len = usize::try_from(text_len).map_err(|_| {
            Error::invalid_format(format!("Negative manifest length: {text_len}"))
        })?;
        let compressed = read_bytes(reader, compressed_len)?;
        compression::decompress(&compressed, text_len)?
    } else {
        let text_len = read_len(reader, length, "manifest")?;
        read_bytes(reader, text_len)?
    };
    String::from_utf8(text).map_err(|_| Error::invalid_format("Manifest is not valid UTF-8"))
}

impl Document {
    /// Open a container file with default options
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        LoadOptions::new().open(path)
    }

    /// Parse a container from a stream with default options
    pub fn load<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        LoadOptions::new().load(reader)
    }
}
