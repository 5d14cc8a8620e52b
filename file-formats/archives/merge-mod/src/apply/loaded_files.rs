//! Index of the containers a game installation loads
//!
//! Files are keyed by lowercase file name. A container shipped by a DLC
//! (any directory named `DLC_*` on its path) overrides the base game's copy,
//! and when several DLCs ship the same name the DLC whose directory sorts
//! last wins.

use crate::game::PACKAGE_EXTENSION;
use crate::{Error, Result};
use glob::{MatchOptions, Pattern};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const DLC_PREFIX: &str = "dlc_";

/// File name → on-disk path of every loaded container
#[derive(Debug, Clone, Default)]
pub struct LoadedFiles {
    files: HashMap<String, PathBuf>,
}

/// Load priority of a found container; later priorities override earlier ones
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Priority {
    Base,
    Dlc(String),
}

fn priority(root: &Path, path: &Path) -> Priority {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .filter(|name| name.to_ascii_lowercase().starts_with(DLC_PREFIX))
        .last()
        .map_or(Priority::Base, |name| Priority::Dlc(name.to_ascii_lowercase()))
}

impl LoadedFiles {
    /// Scan an installation for containers
    pub fn scan<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let root_str = root.to_str().ok_or_else(|| {
            Error::invalid_format(format!("Installation path is not UTF-8: {}", root.display()))
        })?;
        let pattern = format!("{}/**/*{PACKAGE_EXTENSION}", Pattern::escape(root_str));
        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };

        let mut found = Vec::new();
        for entry in glob::glob_with(&pattern, options)
            .map_err(|e| Error::invalid_format(format!("Bad installation path pattern: {e}")))?
        {
            let path = entry.map_err(|e| Error::Io(e.into_error()))?;
            if path.is_file() {
                found.push((priority(root, &path), path));
            }
        }
        found.sort();

        let mut files = HashMap::new();
        for (priority, path) in found {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(previous) = files.insert(name.to_ascii_lowercase(), path.clone()) {
                log::debug!(
                    "{} ({priority:?}) overrides {}",
                    path.display(),
                    previous.display()
                );
            }
        }
        log::debug!("Indexed {} containers under {}", files.len(), root.display());
        Ok(Self { files })
    }

    /// Path of a container by file name (case-insensitive)
    pub fn get(&self, file_name: &str) -> Option<&Path> {
        self.files
            .get(&file_name.to_ascii_lowercase())
            .map(PathBuf::as_path)
    }

    /// Number of indexed containers
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether nothing was found
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
