//! Patch operations and their executors
//!
//! [`Update`] is a closed set of operation kinds. Every apply goes through the
//! single `match` in [`Update::apply`], and every kind reports its fixed
//! progress weight exactly once after it succeeds.

mod class;
mod config_flag;
mod port;
mod property;
mod script;
mod sequence;

pub use class::{ClassExtendUpdate, ClassInjectUpdate};
pub use config_flag::ConfigFlagClearUpdate;
pub use port::AssetPortUpdate;
pub use property::{PropertyPath, PropertySegment, PropertyType, PropertyUpdate};
pub use script::ScriptCompileUpdate;
pub use sequence::SequenceSkipUpdate;

use crate::assets::AssetStore;
use crate::codec::FormatVersion;
use crate::package::{EntryIndex, Package};
use crate::services::{CompilationContext, MergeServices, ScriptCompiler};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Progress weights of each operation kind
pub mod weights {
    /// Property set
    pub const PROPERTY: u64 = 2;
    /// Config flag clear
    pub const CONFIG_FLAG_CLEAR: u64 = 1;
    /// Sequence skip
    pub const SEQUENCE_SKIP: u64 = 2;
    /// Per compiled script fragment
    pub const SCRIPT_FRAGMENT: u64 = 15;
    /// Asset port
    pub const ASSET_PORT: u64 = 7;
    /// Class injection
    pub const CLASS_INJECT: u64 = 25;
}

/// One patch operation against an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Update {
    /// Set a typed property value
    Property(PropertyUpdate),
    /// Clone an entry out of a bundled container
    AssetPort(AssetPortUpdate),
    /// Compile a new class into the container
    ClassInject(ClassInjectUpdate),
    /// Compile function bodies into an entry
    ScriptCompile(ScriptCompileUpdate),
    /// Add or replace members of an existing class
    ClassExtend(ClassExtendUpdate),
    /// Bypass a sequence element, guarded by a content fingerprint
    SequenceSkip(SequenceSkipUpdate),
    /// Clear the config flag of a property descriptor
    ConfigFlagClear(ConfigFlagClearUpdate),
}

impl Update {
    /// Manifest name of the update kind
    pub fn kind(&self) -> &'static str {
        match self {
            Update::Property(_) => "property",
            Update::AssetPort(_) => "asset_port",
            Update::ClassInject(_) => "class_inject",
            Update::ScriptCompile(_) => "script_compile",
            Update::ClassExtend(_) => "class_extend",
            Update::SequenceSkip(_) => "sequence_skip",
            Update::ConfigFlagClear(_) => "config_flag_clear",
        }
    }

    /// Progress weight reported when this update succeeds
    pub fn weight(&self) -> u64 {
        match self {
            Update::Property(_) => weights::PROPERTY,
            Update::AssetPort(_) => weights::ASSET_PORT,
            Update::ClassInject(_) => weights::CLASS_INJECT,
            Update::ScriptCompile(u) => weights::SCRIPT_FRAGMENT * u.scripts.len() as u64,
            Update::ClassExtend(u) => weights::SCRIPT_FRAGMENT * u.scripts.len() as u64,
            Update::SequenceSkip(_) => weights::SEQUENCE_SKIP,
            Update::ConfigFlagClear(_) => weights::CONFIG_FLAG_CLEAR,
        }
    }

    /// Lowest container version able to express this update
    pub fn minimum_version(&self) -> FormatVersion {
        match self {
            Update::Property(_) | Update::AssetPort(_) => FormatVersion::V1,
            Update::ScriptCompile(u) if u.scripts.len() <= 1 => FormatVersion::V1,
            Update::ScriptCompile(_)
            | Update::ClassInject(_)
            | Update::ClassExtend(_)
            | Update::SequenceSkip(_)
            | Update::ConfigFlagClear(_) => FormatVersion::V2,
        }
    }

    /// Asset names this update reads, in order
    pub fn referenced_assets(&self) -> Vec<&str> {
        match self {
            Update::AssetPort(u) => vec![u.asset.as_str()],
            Update::ClassInject(u) => vec![u.asset.as_str()],
            Update::ScriptCompile(u) => u.scripts.iter().map(String::as_str).collect(),
            Update::ClassExtend(u) => u.scripts.iter().map(String::as_str).collect(),
            Update::Property(_) | Update::SequenceSkip(_) | Update::ConfigFlagClear(_) => {
                Vec::new()
            }
        }
    }

    /// Kind-specific structural problems, as human-readable messages
    pub fn structural_issues(&self, entry: &str) -> Vec<String> {
        match self {
            Update::Property(u) => u.structural_issues(),
            Update::AssetPort(u) => u.structural_issues(),
            Update::ClassInject(u) => u.structural_issues(entry),
            Update::ScriptCompile(u) => u.structural_issues(),
            Update::ClassExtend(u) => u.structural_issues(),
            Update::SequenceSkip(u) => u.structural_issues(),
            Update::ConfigFlagClear(u) => u.structural_issues(),
        }
    }

    /// Run the update against an opened container
    ///
    /// `report` receives this update's weight once, after success.
    pub fn apply(&self, target: &mut UpdateTarget<'_>, report: &mut dyn FnMut(u64)) -> Result<()> {
        log::debug!(
            "Applying {} update to {} in {}",
            self.kind(),
            target.entry_path,
            target.package.file_name()
        );
        match self {
            Update::Property(u) => u.apply(target)?,
            Update::AssetPort(u) => u.apply(target)?,
            Update::ClassInject(u) => u.apply(target)?,
            Update::ScriptCompile(u) => u.apply(target)?,
            Update::ClassExtend(u) => u.apply(target)?,
            Update::SequenceSkip(u) => u.apply(target)?,
            Update::ConfigFlagClear(u) => u.apply(target)?,
        }
        report(self.weight());
        Ok(())
    }
}

/// Compilation context holder for one opened container
///
/// Contexts are rebuilt whenever the package moved past the revision they
/// were built from, and executors invalidate them after every compile.
#[derive(Debug, Default)]
pub struct ScriptSession {
    context: Option<CompilationContext>,
    initializations: usize,
}

impl ScriptSession {
    /// Empty session
    pub fn new() -> Self {
        Self::default()
    }

    /// Current context, re-initialized when missing or stale
    pub fn refresh(
        &mut self,
        compiler: &dyn ScriptCompiler,
        package: &Package,
        entry: &str,
    ) -> Result<&CompilationContext> {
        let stale = self
            .context
            .as_ref()
            .is_none_or(|context| !context.is_current(package));
        if stale {
            let context = compiler.initialize(package).map_err(|log| Error::Compile {
                entry: entry.to_string(),
                log,
            })?;
            self.initializations += 1;
            self.context = Some(context);
        }
        self.context
            .as_ref()
            .ok_or_else(|| Error::invalid_format("compilation context missing after refresh"))
    }

    /// Drop the context so the next compile re-initializes it
    pub fn invalidate(&mut self) {
        self.context = None;
    }

    /// Number of times a context was built
    pub fn initializations(&self) -> usize {
        self.initializations
    }
}

/// Everything an executor gets to work with
pub struct UpdateTarget<'a> {
    /// Opened target container
    pub package: &'a mut Package,
    /// Entry path of the change set
    pub entry_path: &'a str,
    /// Asset table of the document
    pub assets: &'a AssetStore,
    /// Game-context services
    pub services: &'a MergeServices,
    /// Compilation context for this container
    pub scripts: &'a mut ScriptSession,
}

impl UpdateTarget<'_> {
    /// Index of the change set's entry, which must exist
    pub fn require_entry(&self) -> Result<EntryIndex> {
        self.package
            .find(self.entry_path)
            .ok_or_else(|| Error::EntryNotFound {
                file: self.package.file_name().to_string(),
                entry: self.entry_path.to_string(),
            })
    }

    pub(crate) fn compile_error(&self, log: crate::services::MessageLog) -> Error {
        Error::Compile {
            entry: self.entry_path.to_string(),
            log,
        }
    }
}
