//! Container read/write service

use super::{Entry, Package};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Open/save service for the target container format
///
/// The coordinator owns file handling (hashing, atomic replacement); this
/// trait only converts between bytes and the in-memory model.
pub trait PackageIo: Send + Sync {
    /// Decode a container
    fn read(&self, data: &[u8], file_name: &str) -> Result<Package>;

    /// Encode a container
    fn write(&self, package: &Package) -> Result<Vec<u8>>;
}

/// JSON-encoded containers
///
/// Used by tooling and tests where a human-readable stand-in for the game's
/// binary format is useful.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPackageIo;

#[derive(Serialize)]
struct StoredPackageRef<'a> {
    entries: &'a [Entry],
}

#[derive(Deserialize)]
struct StoredPackage {
    entries: Vec<Entry>,
}

impl PackageIo for JsonPackageIo {
    fn read(&self, data: &[u8], file_name: &str) -> Result<Package> {
        let stored: StoredPackage = serde_json::from_slice(data)?;
        Package::from_entries(file_name, stored.entries)
    }

    fn write(&self, package: &Package) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(&StoredPackageRef {
            entries: package.entries(),
        })?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
