//! Container compilation from loose files

use anyhow::{Context, Result, bail};
use merge_mod::FormatVersion;
use merge_mod::Validator;
use merge_mod::codec::{self, SerializeOutcome};
use std::path::PathBuf;
use std::sync::Arc;

use crate::commands::validate::load_vanilla_table;
use crate::utils::format_bytes;

pub fn execute(
    manifest: PathBuf,
    output: PathBuf,
    version: FormatVersion,
    vanilla: Option<PathBuf>,
) -> Result<()> {
    log::info!("Compiling {} as format {}", manifest.display(), version);

    let validator = Validator::new(Arc::new(load_vanilla_table(vanilla.as_deref())?));
    let outcome = codec::serialize_with(&manifest, version, &validator)
        .with_context(|| format!("Failed to compile {}", manifest.display()))?;

    let bytes = match outcome {
        SerializeOutcome::Written(bytes) => bytes,
        SerializeOutcome::Violations(violations) => {
            for violation in &violations {
                eprintln!("  {violation}");
            }
            bail!(
                "{} has {} violation(s); nothing was written",
                manifest.display(),
                violations.len()
            );
        }
    };

    merge_mod::io::write_atomic(&output, &bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Compiled {} ({}, format {})",
        output.display(),
        format_bytes(bytes.len() as u64),
        version
    );
    Ok(())
}
