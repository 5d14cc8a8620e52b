//! Porting entries out of bundled containers

use super::UpdateTarget;
use crate::package::{EntryIndex, Package};
use crate::services::{PortMode, PortRequest};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Clone an entry from a container shipped as an asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPortUpdate {
    /// Asset holding the source container
    pub asset: String,
    /// Full path of the source entry inside the asset container
    pub entry: String,
    /// Create the entry (and missing ancestors) when the target lacks it
    #[serde(default)]
    pub add_as_new: bool,
}

impl AssetPortUpdate {
    pub(crate) fn structural_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.asset.trim().is_empty() {
            issues.push("asset_port: asset name is empty".to_string());
        }
        if self.entry.trim().is_empty() {
            issues.push(format!("asset_port from {}: source entry is empty", self.asset));
        }
        issues
    }

    pub(crate) fn apply(&self, target: &mut UpdateTarget<'_>) -> Result<()> {
        let bytes = target.assets.ensure_loaded(&self.asset)?;
        let source = target.services.package_io.read(&bytes, &self.asset)?;
        let source_idx = source.find(&self.entry).ok_or_else(|| self.port_error(
            target,
            vec![format!("entry {} not found in {}", self.entry, self.asset)],
        ))?;

        match target.package.find(target.entry_path) {
            Some(existing) => {
                log::debug!("Replacing {} with {}", target.entry_path, self.entry);
                let outer = target.package.entry(existing).and_then(|e| e.outer);
                self.port(target, &source, PortRequest {
                    source: source_idx,
                    target_outer: outer,
                    replace: Some(existing),
                    mode: PortMode::WithDependencies,
                })?;
            }
            None if self.add_as_new => {
                let outer = self.port_ancestors(target, &source, source_idx)?;
                log::debug!("Adding {} as new entry", self.entry);
                self.port(target, &source, PortRequest {
                    source: source_idx,
                    target_outer: outer,
                    replace: None,
                    mode: PortMode::WithDependencies,
                })?;
            }
            None => {
                return Err(self.port_error(
                    target,
                    vec![format!(
                        "{} does not exist in {} and add_as_new is not set",
                        target.entry_path,
                        target.package.file_name()
                    )],
                ));
            }
        }

        target.package.mark_modified();
        Ok(())
    }

    /// Recreate the source entry's outer chain in the target, root first
    fn port_ancestors(
        &self,
        target: &mut UpdateTarget<'_>,
        source: &Package,
        source_idx: EntryIndex,
    ) -> Result<Option<EntryIndex>> {
        let mut outer = None;
        for ancestor in source.ancestors(source_idx) {
            let path = source.full_path(ancestor);
            outer = Some(match target.package.find(&path) {
                Some(existing) => existing,
                None => {
                    log::debug!("Porting missing ancestor {path}");
                    self.port(target, source, PortRequest {
                        source: ancestor,
                        target_outer: outer,
                        replace: None,
                        mode: PortMode::EntryOnly,
                    })?
                }
            });
        }
        Ok(outer)
    }

    fn port(
        &self,
        target: &mut UpdateTarget<'_>,
        source: &Package,
        request: PortRequest,
    ) -> Result<EntryIndex> {
        let porter = target.services.porter.as_ref();
        porter
            .port(source, target.package, request)
            .map_err(|diagnostics| self.port_error(target, diagnostics))
    }

    fn port_error(&self, target: &UpdateTarget<'_>, diagnostics: Vec<String>) -> Error {
        Error::Port {
            entry: target.entry_path.to_string(),
            diagnostics,
        }
    }
}
