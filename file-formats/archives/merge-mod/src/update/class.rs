//! Class injection and extension

use super::UpdateTarget;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Compile a whole class from a bundled source file
///
/// The change set's entry path names the class. Everything before the last
/// dot is a namespace, created as a chain of package entries when missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInjectUpdate {
    /// Asset holding the class source
    pub asset: String,
}

/// Split `Namespace.Inner.ClassName` into namespace and class name
pub(crate) fn split_class_path(entry: &str) -> (Option<&str>, &str) {
    match entry.rsplit_once('.') {
        Some((namespace, class)) => (Some(namespace), class),
        None => (None, entry),
    }
}

impl ClassInjectUpdate {
    /// Class name this update creates or replaces
    pub fn class_name(entry: &str) -> &str {
        split_class_path(entry).1
    }

    pub(crate) fn structural_issues(&self, entry: &str) -> Vec<String> {
        let mut issues = Vec::new();
        if self.asset.trim().is_empty() {
            issues.push(format!("class_inject for {entry}: asset name is empty"));
        }
        let (namespace, class) = split_class_path(entry);
        if class.is_empty() || !class.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            issues.push(format!("class_inject: '{entry}' does not end in a valid class name"));
        }
        if namespace.is_some_and(|ns| ns.split('.').any(str::is_empty)) {
            issues.push(format!("class_inject: '{entry}' has an empty namespace segment"));
        }
        issues
    }

    pub(crate) fn apply(&self, target: &mut UpdateTarget<'_>) -> Result<()> {
        let source = target.assets.as_string(&self.asset)?;
        let (namespace, class) = split_class_path(target.entry_path);

        let outer = match namespace {
            Some(namespace) => target.package.ensure_namespace(namespace)?,
            None => None,
        };
        let existing = target.package.find_child(outer, class);
        if existing.is_some() {
            log::debug!("Replacing class {}", target.entry_path);
        }

        let compiler = target.services.compiler.as_ref();
        let context = target
            .scripts
            .refresh(compiler, target.package, target.entry_path)?;
        let result =
            compiler.compile_class(target.package, &source, &self.asset, outer, existing, context);
        target.scripts.invalidate();
        result.map_err(|log| target.compile_error(log))?;
        Ok(())
    }
}

/// Add or replace members of an existing class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassExtendUpdate {
    /// Assets holding the member sources, compiled in order
    pub scripts: Vec<String>,
}

impl ClassExtendUpdate {
    pub(crate) fn structural_issues(&self) -> Vec<String> {
        if self.scripts.is_empty() {
            vec!["class_extend: at least one script is required".to_string()]
        } else {
            Vec::new()
        }
    }

    pub(crate) fn apply(&self, target: &mut UpdateTarget<'_>) -> Result<()> {
        let class = target.require_entry()?;
        let compiler = target.services.compiler.as_ref();
        for script in &self.scripts {
            let source = target.assets.as_string(script)?;
            let context = target
                .scripts
                .refresh(compiler, target.package, target.entry_path)?;
            let result = compiler.add_or_replace_in_class(target.package, class, &source, context);
            target.scripts.invalidate();
            result.map_err(|log| target.compile_error(log))?;
        }
        Ok(())
    }
}
