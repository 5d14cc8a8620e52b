//! Load-time validation of merge mod documents
//!
//! Checks that every directive targets a container that is safe to patch,
//! that the document's version can express what it uses, that each update
//! is structurally sound, and that injected classes do not shadow vanilla
//! ones. All problems are collected and reported together.

use crate::codec::FormatVersion;
use crate::document::Document;
use crate::game::{
    Game, LocalizationProvider, StaticLocalizations, package_stem, strip_localization,
    with_package_extension,
};
use crate::update::{ClassInjectUpdate, Update};
use crate::vanilla::VanillaClassTable;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// How target file names are matched against an allow-list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowListRule {
    /// Name starts with one of the allowed prefixes
    LegacyPrefix,
    /// Name, without extension and localization suffix, is exactly allowed
    Localized,
}

impl AllowListRule {
    /// Rule used for documents of a container version
    pub fn for_version(version: FormatVersion) -> Self {
        match version {
            FormatVersion::V1 => AllowListRule::LegacyPrefix,
            FormatVersion::V2 => AllowListRule::Localized,
        }
    }
}

/// Containers of one game that merge mods may patch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    prefixes: Vec<String>,
    names: Vec<String>,
}

const ME3_PREFIXES: &[&str] = &["SFXGame", "Startup", "Engine", "Core", "BioD_", "BioP_"];
const ME3_NAMES: &[&str] = &["SFXGame", "Startup", "Engine", "Core", "EntryMenu"];
const LE1_PREFIXES: &[&str] = &["SFXGame", "Startup", "Engine", "Core", "BIOG_", "BIOA_"];
const LE1_NAMES: &[&str] = &[
    "SFXGame",
    "Startup",
    "Engine",
    "Core",
    "EntryMenu",
    "BIOG_UIWorld",
    "BIOC_Base",
];
const LE2_PREFIXES: &[&str] = &["SFXGame", "Startup", "Engine", "Core", "BioD_", "BioP_"];
const LE2_NAMES: &[&str] = &["SFXGame", "Startup", "Engine", "Core", "EntryMenu", "BioP_Global"];
const LE3_PREFIXES: &[&str] = &["SFXGame", "Startup", "Engine", "Core", "BioD_", "BioP_"];
const LE3_NAMES: &[&str] = &[
    "SFXGame",
    "Startup",
    "Engine",
    "Core",
    "EntryMenu",
    "BioP_Char",
    "SFXOnlineFoundation",
];

impl AllowList {
    /// Allow-list from explicit prefixes and exact names
    pub fn new<I, J, S, T>(prefixes: I, names: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Built-in list of a game
    pub fn for_game(game: Game) -> Self {
        let (prefixes, names) = match game {
            Game::Me3 => (ME3_PREFIXES, ME3_NAMES),
            Game::Le1 => (LE1_PREFIXES, LE1_NAMES),
            Game::Le2 => (LE2_PREFIXES, LE2_NAMES),
            Game::Le3 => (LE3_PREFIXES, LE3_NAMES),
        };
        Self::new(prefixes.iter().copied(), names.iter().copied())
    }

    /// Whether a directive target passes under `rule`
    pub fn allows(&self, target: &str, rule: AllowListRule, languages: &[String]) -> bool {
        match rule {
            AllowListRule::LegacyPrefix => {
                let name = with_package_extension(target).to_ascii_lowercase();
                self.prefixes
                    .iter()
                    .any(|prefix| name.starts_with(&prefix.to_ascii_lowercase()))
            }
            AllowListRule::Localized => {
                let base = strip_localization(package_stem(target), languages);
                self.names.iter().any(|name| name.eq_ignore_ascii_case(base))
            }
        }
    }
}

/// Document validator
///
/// Holds the per-game allow-lists, the vanilla class table and the
/// localization lists used to strip language suffixes.
#[derive(Clone)]
pub struct Validator {
    allow_lists: HashMap<Game, AllowList>,
    vanilla: Arc<VanillaClassTable>,
    localizations: Arc<dyn LocalizationProvider>,
}

impl Validator {
    /// Validator with the built-in allow-lists and language lists
    pub fn new(vanilla: Arc<VanillaClassTable>) -> Self {
        Self {
            allow_lists: Game::ALL
                .into_iter()
                .map(|game| (game, AllowList::for_game(game)))
                .collect(),
            vanilla,
            localizations: Arc::new(StaticLocalizations),
        }
    }

    /// Replace the allow-list of one game
    pub fn with_allow_list(mut self, game: Game, list: AllowList) -> Self {
        self.allow_lists.insert(game, list);
        self
    }

    /// Replace the localization provider
    pub fn with_localizations(mut self, localizations: Arc<dyn LocalizationProvider>) -> Self {
        self.localizations = localizations;
        self
    }

    /// Check a document, reporting every problem in one error
    pub fn validate(&self, document: &Document) -> Result<()> {
        let issues = self.issues(document);
        if issues.is_empty() {
            Ok(())
        } else {
            log::debug!("Document failed validation with {} issues", issues.len());
            Err(Error::Validation(issues))
        }
    }

    /// Every problem found in a document
    pub fn issues(&self, document: &Document) -> Vec<String> {
        let game = document.game();
        let version = document.version();
        let rule = AllowListRule::for_version(version);
        let languages = self.localizations.localizations(game);
        let empty = AllowList::default();
        let allow_list = self.allow_lists.get(&game).unwrap_or(&empty);

        let mut issues: Vec<String> = document
            .missing_assets()
            .into_iter()
            .map(|name| format!("asset {name} is referenced but not in the merge mod"))
            .collect();

        for directive in document.files() {
            if !allow_list.allows(&directive.file, rule, &languages) {
                issues.push(format!(
                    "{} is not a patchable file for {game}",
                    directive.file
                ));
            }
            if directive.apply_to_all_localizations {
                if let Err(e) = document.require_version(FormatVersion::V2, "apply_to_all_localizations") {
                    issues.push(format!("{}: {}", directive.file, flatten(e)));
                }
            }
            for change in &directive.changes {
                for update in &change.updates {
                    self.check_update(document, game, &change.entry, update, &mut issues);
                }
            }
        }
        issues
    }

    fn check_update(
        &self,
        document: &Document,
        game: Game,
        entry: &str,
        update: &Update,
        issues: &mut Vec<String>,
    ) {
        let what = format!("{} on {entry}", update.kind());
        if let Err(e) = document.require_version(update.minimum_version(), &what) {
            issues.push(flatten(e));
        }
        issues.extend(
            update
                .structural_issues(entry)
                .into_iter()
                .map(|issue| format!("{entry}: {issue}")),
        );
        if let Update::ClassInject(_) = update {
            let class = ClassInjectUpdate::class_name(entry);
            if self.vanilla.contains(class, game) {
                issues.push(format!(
                    "class_inject cannot replace vanilla class {class} of {game}"
                ));
            }
        }
    }
}

fn flatten(error: Error) -> String {
    match error {
        Error::Validation(issues) => issues.join("; "),
        other => other.to_string(),
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("allow_lists", &self.allow_lists)
            .field("vanilla_classes", &self.vanilla.len())
            .finish_non_exhaustive()
    }
}
