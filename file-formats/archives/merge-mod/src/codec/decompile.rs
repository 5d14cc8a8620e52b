//! Container to loose files

use super::{FormatVersion, LoadOptions};
use crate::io::validate_file_name;
use crate::{Error, Result};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// File name the manifest text is written to
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Loose files written by [`decompile`]
#[derive(Debug, Clone)]
pub struct Decompiled {
    /// Version of the source container
    pub version: FormatVersion,
    /// Path of the written manifest
    pub manifest_path: PathBuf,
    /// Paths of the written assets, in table order
    pub asset_paths: Vec<PathBuf>,
}

/// Write the manifest and every asset of a container into `out_dir`
///
/// Serializing the written manifest at the returned version reproduces the
/// container byte for byte. Validation is skipped, so containers that no
/// longer pass the allow-lists can still be inspected.
pub fn decompile<P: AsRef<Path>>(container: &[u8], out_dir: P) -> Result<Decompiled> {
    let out_dir = out_dir.as_ref();
    let document = LoadOptions::new()
        .eager_assets(true)
        .load(&mut Cursor::new(container))?;

    for record in document.assets().records() {
        validate_file_name(record.name())?;
        if record.name().eq_ignore_ascii_case(MANIFEST_FILE_NAME) {
            return Err(Error::invalid_format(format!(
                "Asset name {} collides with the manifest",
                record.name()
            )));
        }
    }

    fs::create_dir_all(out_dir)?;
    let manifest_path = out_dir.join(MANIFEST_FILE_NAME);
    fs::write(&manifest_path, document.manifest_text())?;

    let mut asset_paths = Vec::with_capacity(document.assets().len());
    for record in document.assets().records() {
        let payload = document.assets().ensure_loaded(record.name())?;
        let path = out_dir.join(record.name());
        fs::write(&path, &payload)?;
        asset_paths.push(path);
    }

    log::info!(
        "Decompiled {} container into {} ({} assets)",
        document.version(),
        out_dir.display(),
        asset_paths.len()
    );
    Ok(Decompiled {
        version: document.version(),
        manifest_path,
        asset_paths,
    })
}
