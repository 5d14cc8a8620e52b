//! Config flag removal on property descriptors

use super::UpdateTarget;
use crate::package::{EntryBinary, PropertyFlags};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Stop a class property from being loaded out of configuration files
///
/// Targets the descriptor entry `{entry}.{property}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFlagClearUpdate {
    /// Name of the property descriptor under the change set's class
    pub property: String,
}

impl ConfigFlagClearUpdate {
    pub(crate) fn structural_issues(&self) -> Vec<String> {
        if self.property.is_empty() || self.property.contains('.') {
            vec![format!(
                "config_flag_clear: '{}' must be a single property name",
                self.property
            )]
        } else {
            Vec::new()
        }
    }

    pub(crate) fn apply(&self, target: &mut UpdateTarget<'_>) -> Result<()> {
        let path = format!("{}.{}", target.entry_path, self.property);
        let idx = target
            .package
            .find(&path)
            .ok_or_else(|| Error::EntryNotFound {
                file: target.package.file_name().to_string(),
                entry: path.clone(),
            })?;

        let entry = target
            .package
            .entry(idx)
            .ok_or_else(|| Error::invalid_format(format!("entry {idx} vanished")))?;
        let flags = entry.binary.property_flags().ok_or_else(|| {
            Error::validation(format!(
                "{path} is a {} without a property descriptor binary",
                entry.class_name
            ))
        })?;

        if !flags.contains(PropertyFlags::CONFIG) {
            log::debug!("{path} is not a config property, nothing to clear");
            return Ok(());
        }
        if let Some(entry) = target.package.entry_mut(idx) {
            entry.binary = EntryBinary::Property {
                flags: flags.difference(PropertyFlags::CONFIG).bits(),
            };
        }
        Ok(())
    }
}
