//! Fingerprint-guarded sequence element bypass
//!
//! A sequence op keeps its outgoing connections in an `OutputLinks` array of
//! structs, each holding a `LinkDesc` label and a `Links` array of
//! `{LinkedOp, InputLinkIdx}` structs. Skipping an op reroutes every link
//! that pointed at it to the targets of one of its own outputs, then empties
//! its outputs so the op is fully detached.

use super::UpdateTarget;
use crate::package::{EntryIndex, PropertyCollection, PropertyValue};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

const OUTPUT_LINKS: &str = "OutputLinks";
const LINK_DESC: &str = "LinkDesc";
const LINKS: &str = "Links";
const LINKED_OP: &str = "LinkedOp";

/// Bypass a sequence op when its content still matches a recorded fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceSkipUpdate {
    /// MD5 of the op's raw content when the update was authored
    pub md5: String,
    /// Label of the output link whose targets replace the op
    pub outbound_link: String,
}

impl SequenceSkipUpdate {
    pub(crate) fn structural_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.md5.len() != 32 || !self.md5.chars().all(|c| c.is_ascii_hexdigit()) {
            issues.push(format!(
                "sequence_skip: '{}' is not a 32 character hex MD5",
                self.md5
            ));
        }
        if self.outbound_link.trim().is_empty() {
            issues.push("sequence_skip: outbound_link is empty".to_string());
        }
        issues
    }

    pub(crate) fn apply(&self, target: &mut UpdateTarget<'_>) -> Result<()> {
        let op = target.require_entry()?;
        let fingerprint = target.package.fingerprint(op)?;
        if !fingerprint.eq_ignore_ascii_case(&self.md5) {
            log::warn!(
                "Skipping sequence_skip on {} in {}: fingerprint {} does not match {}, assuming it was already applied",
                target.entry_path,
                target.package.file_name(),
                fingerprint,
                self.md5
            );
            return Ok(());
        }

        let replacement = self.outbound_targets(target, op)?;
        let op_ref = op.uindex();
        let sequence = target.package.entry(op).and_then(|e| e.outer);
        let siblings: Vec<EntryIndex> = (0..target.package.len())
            .map(EntryIndex)
            .filter(|&idx| idx != op)
            .filter(|&idx| target.package.entry(idx).is_some_and(|e| e.outer == sequence))
            .collect();

        let mut rerouted = 0;
        for sibling in siblings {
            let refers = target
                .package
                .entry(sibling)
                .is_some_and(|e| links_to(&e.properties, op_ref));
            if !refers {
                continue;
            }
            if let Some(entry) = target.package.entry_mut(sibling) {
                rerouted += reroute(&mut entry.properties, op_ref, &replacement);
            }
        }

        if let Some(entry) = target.package.entry_mut(op) {
            for_each_links(&mut entry.properties, |links| links.clear());
        }
        log::debug!(
            "Skipped {} via '{}', rerouted {} links",
            target.entry_path,
            self.outbound_link,
            rerouted
        );
        Ok(())
    }

    /// Link structs of the output named by `outbound_link`
    fn outbound_targets(
        &self,
        target: &UpdateTarget<'_>,
        op: EntryIndex,
    ) -> Result<Vec<PropertyValue>> {
        let missing = || Error::Path {
            entry: target.entry_path.to_string(),
            message: format!("no output link labelled '{}'", self.outbound_link),
        };
        let entry = target.package.entry(op).ok_or_else(missing)?;
        let Some(PropertyValue::Array(outputs)) =
            entry.properties.get(OUTPUT_LINKS, 0).map(|p| &p.value)
        else {
            return Err(missing());
        };
        outputs
            .iter()
            .filter_map(PropertyValue::as_struct)
            .find(|output| {
                matches!(
                    output.get(LINK_DESC, 0).map(|p| &p.value),
                    Some(PropertyValue::Str(desc)) if desc.eq_ignore_ascii_case(&self.outbound_link)
                )
            })
            .map(|output| match output.get(LINKS, 0).map(|p| &p.value) {
                Some(PropertyValue::Array(links)) => links.clone(),
                _ => Vec::new(),
            })
            .ok_or_else(missing)
    }
}

fn points_at(link: &PropertyValue, op_ref: i32) -> bool {
    link.as_struct()
        .and_then(|s| s.get(LINKED_OP, 0))
        .is_some_and(|p| p.value == PropertyValue::Object(op_ref))
}

fn links_to(properties: &PropertyCollection, op_ref: i32) -> bool {
    let Some(PropertyValue::Array(outputs)) = properties.get(OUTPUT_LINKS, 0).map(|p| &p.value)
    else {
        return false;
    };
    outputs
        .iter()
        .filter_map(PropertyValue::as_struct)
        .filter_map(|output| match output.get(LINKS, 0).map(|p| &p.value) {
            Some(PropertyValue::Array(links)) => Some(links),
            _ => None,
        })
        .any(|links| links.iter().any(|link| points_at(link, op_ref)))
}

fn for_each_links(properties: &mut PropertyCollection, mut f: impl FnMut(&mut Vec<PropertyValue>)) {
    let Some(property) = properties.get_mut(OUTPUT_LINKS, 0) else {
        return;
    };
    let PropertyValue::Array(outputs) = &mut property.value else {
        return;
    };
    for output in outputs.iter_mut().filter_map(PropertyValue::as_struct_mut) {
        if let Some(PropertyValue::Array(links)) = output.get_mut(LINKS, 0).map(|p| &mut p.value) {
            f(links);
        }
    }
}

/// Replace links to `op_ref` with the replacement links; returns how many were replaced
fn reroute(properties: &mut PropertyCollection, op_ref: i32, replacement: &[PropertyValue]) -> usize {
    let mut replaced = 0;
    for_each_links(properties, |links| {
        let mut rewritten = Vec::with_capacity(links.len());
        for link in links.drain(..) {
            if points_at(&link, op_ref) {
                replaced += 1;
                for candidate in replacement {
                    if !rewritten.contains(candidate) {
                        rewritten.push(candidate.clone());
                    }
                }
            } else {
                rewritten.push(link);
            }
        }
        *links = rewritten;
    });
    replaced
}
