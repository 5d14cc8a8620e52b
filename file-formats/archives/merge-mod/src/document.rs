//! Merge mod documents: per-file directives, change sets and their assets

use crate::assets::AssetStore;
use crate::codec::FormatVersion;
use crate::game::{Game, LocalizationProvider, localized_file_name, with_package_extension};
use crate::update::Update;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Ordered updates against one entry of a target container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryChangeSet {
    /// Instanced full path of the entry
    pub entry: String,
    /// Updates, applied in order
    pub updates: Vec<Update>,
}

/// All changes for one target container name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDirective {
    /// Target file name, possibly without extension or localization suffix
    pub file: String,
    /// Apply to every localized variant `<stem>_<LANG>.pcc` instead
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub apply_to_all_localizations: bool,
    /// Change sets, applied in order
    pub changes: Vec<EntryChangeSet>,
}

impl FileDirective {
    /// Concrete file names this directive resolves to
    pub fn target_names(&self, game: Game, localizations: &dyn LocalizationProvider) -> Vec<String> {
        if self.apply_to_all_localizations {
            localizations
                .localizations(game)
                .iter()
                .map(|lang| localized_file_name(&self.file, lang))
                .collect()
        } else {
            vec![with_package_extension(&self.file)]
        }
    }

    /// Number of target files
    pub fn merge_count(&self, game: Game, localizations: &dyn LocalizationProvider) -> usize {
        if self.apply_to_all_localizations {
            localizations.localizations(game).len()
        } else {
            1
        }
    }

    /// Weight of applying every update once
    pub fn weight(&self) -> u64 {
        self.updates().map(Update::weight).sum()
    }

    /// Weight over all target files
    pub fn merge_weight(&self, game: Game, localizations: &dyn LocalizationProvider) -> u64 {
        self.weight() * self.merge_count(game, localizations) as u64
    }

    /// Every update in application order
    pub fn updates(&self) -> impl Iterator<Item = &Update> {
        self.changes.iter().flat_map(|change| change.updates.iter())
    }
}

/// Parsed manifest text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Target game
    pub game: Game,
    /// Per-file directives, applied in order
    pub files: Vec<FileDirective>,
}

impl Manifest {
    /// Parse manifest JSON
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Asset names in order of first reference, without duplicates
    pub fn referenced_assets(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.files
            .iter()
            .flat_map(FileDirective::updates)
            .flat_map(Update::referenced_assets)
            .filter(|name| seen.insert(name.to_ascii_lowercase()))
            .collect()
    }

    /// Lowest container version able to express every directive and update
    pub fn minimum_version(&self) -> FormatVersion {
        let fan_out = self.files.iter().any(|f| f.apply_to_all_localizations);
        self.files
            .iter()
            .flat_map(FileDirective::updates)
            .map(Update::minimum_version)
            .chain(fan_out.then_some(FormatVersion::V2))
            .max()
            .unwrap_or(FormatVersion::V1)
    }
}

/// Identity of a loaded document within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        DocumentId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// A loaded merge mod
///
/// Immutable once loaded, apart from asset payloads that can be released and
/// reloaded from the backing file.
#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    version: FormatVersion,
    manifest_text: String,
    manifest: Manifest,
    assets: AssetStore,
}

impl Document {
    /// Build a document from its manifest text and asset table
    pub fn new(version: FormatVersion, manifest_text: String, assets: AssetStore) -> Result<Self> {
        let manifest = Manifest::parse(&manifest_text)?;
        Ok(Self {
            id: DocumentId::next(),
            version,
            manifest_text,
            manifest,
            assets,
        })
    }

    /// Process-unique identity, used for final-writer designations
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Container version
    pub fn version(&self) -> FormatVersion {
        self.version
    }

    /// Target game
    pub fn game(&self) -> Game {
        self.manifest.game
    }

    /// Per-file directives
    pub fn files(&self) -> &[FileDirective] {
        &self.manifest.files
    }

    /// Parsed manifest
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Manifest text exactly as stored
    pub fn manifest_text(&self) -> &str {
        &self.manifest_text
    }

    /// Asset table
    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    /// Number of target files across all directives
    pub fn merge_count(&self, localizations: &dyn LocalizationProvider) -> usize {
        self.files()
            .iter()
            .map(|f| f.merge_count(self.game(), localizations))
            .sum()
    }

    /// Total progress weight of a full apply
    pub fn merge_weight(&self, localizations: &dyn LocalizationProvider) -> u64 {
        self.files()
            .iter()
            .map(|f| f.merge_weight(self.game(), localizations))
            .sum()
    }

    /// Every referenced asset must be in the table
    pub fn missing_assets(&self) -> Vec<&str> {
        self.manifest
            .referenced_assets()
            .into_iter()
            .filter(|name| !self.assets.contains(name))
            .collect()
    }

    /// Drop asset payloads that can be reloaded from the backing file
    pub fn release_assets(&self) -> bool {
        self.assets.release_assets()
    }

    pub(crate) fn require_version(&self, needed: FormatVersion, what: &str) -> Result<()> {
        if self.version < needed {
            return Err(Error::validation(format!(
                "{what} requires format version {} but the document is version {}",
                needed as u8, self.version as u8
            )));
        }
        Ok(())
    }
}
