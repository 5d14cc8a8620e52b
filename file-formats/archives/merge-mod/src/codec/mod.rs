//! Versioned binary envelope of merge mod containers
//!
//! ```text
//! magic        "MGMD"
//! version      u8
//! manifest     v1: i32 len + UTF-8
//!              v2: i32 compressed_len, i32 text_len, LZMA bytes
//! asset_count  i32
//! asset*       "MGAS", i32 len + name, i32 size,
//!              v2: u8 compressed [, i32 compressed_size], payload
//! ```
//!
//! The stream must end exactly after the last asset.

mod decompile;
mod reader;
mod schema;
mod writer;

pub use decompile::{Decompiled, MANIFEST_FILE_NAME, decompile};
pub use schema::{SchemaViolation, check_manifest};
pub use writer::{SerializeOutcome, serialize, serialize_with, write_document};

use crate::validate::Validator;
use std::fmt;

/// Container magic
pub const MERGE_MOD_MAGIC: [u8; 4] = *b"MGMD";

/// Asset section magic
pub const ASSET_MAGIC: [u8; 4] = *b"MGAS";

/// Extensions of assets stored compressed in version 2 containers
pub const TEXT_ASSET_EXTENSIONS: [&str; 5] = ["uc", "txt", "json", "xml", "ini"];

/// Container format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum FormatVersion {
    /// Raw manifest; property, asset port and single-script compile only
    V1 = 1,
    /// LZMA manifest and text assets; every update kind, localization fan-out
    V2 = 2,
}

impl FormatVersion {
    /// Highest version this codec reads and writes
    pub const LATEST: FormatVersion = FormatVersion::V2;

    /// Create from the raw version byte
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(FormatVersion::V1),
            2 => Some(FormatVersion::V2),
            _ => None,
        }
    }

    /// Raw version byte
    pub fn as_raw(self) -> u8 {
        self as u8
    }

    /// Whether the manifest and text assets are LZMA-compressed
    pub fn compresses(self) -> bool {
        self >= FormatVersion::V2
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.as_raw())
    }
}

/// Whether an asset is stored compressed in a version 2 container
pub fn is_text_asset(name: &str) -> bool {
    name.rsplit_once('.').is_some_and(|(_, ext)| {
        TEXT_ASSET_EXTENSIONS
            .iter()
            .any(|text| text.eq_ignore_ascii_case(ext))
    })
}

/// Options for loading a container
///
/// By default assets are loaded lazily, every known version is accepted and
/// no validation is run.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions<'a> {
    /// Read every asset payload while parsing
    pub eager_assets: bool,
    /// Highest version accepted
    pub max_version: FormatVersion,
    /// Validator run on the loaded document
    pub validator: Option<&'a Validator>,
}

impl Default for LoadOptions<'_> {
    fn default() -> Self {
        Self {
            eager_assets: false,
            max_version: FormatVersion::LATEST,
            validator: None,
        }
    }
}

impl<'a> LoadOptions<'a> {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether asset payloads are read while parsing
    pub fn eager_assets(mut self, eager: bool) -> Self {
        self.eager_assets = eager;
        self
    }

    /// Limit the accepted container version
    pub fn max_version(mut self, version: FormatVersion) -> Self {
        self.max_version = version;
        self
    }

    /// Validate the document after loading
    pub fn validator(mut self, validator: &'a Validator) -> Self {
        self.validator = Some(validator);
        self
    }
}
