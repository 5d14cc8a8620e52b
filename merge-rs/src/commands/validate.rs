//! Container validation

use anyhow::{Context, Result, bail};
use merge_mod::vanilla::VanillaClassTable;
use merge_mod::{Game, LoadOptions, Validator};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub fn execute(container: PathBuf, vanilla: Option<PathBuf>, game: Option<Game>) -> Result<()> {
    let validator = Validator::new(Arc::new(load_vanilla_table(vanilla.as_deref())?));

    // Load without the validator so every issue is listed, not just the first failure
    let document = LoadOptions::new()
        .open(&container)
        .with_context(|| format!("Failed to open {}", container.display()))?;

    let mut issues = validator.issues(&document);
    if let Some(expected) = game
        && document.game() != expected
    {
        issues.push(format!(
            "targets {} but {} was expected",
            document.game(),
            expected
        ));
    }

    if issues.is_empty() {
        println!("✓ {} is valid", container.display());
        return Ok(());
    }

    println!("✗ {} failed validation:", container.display());
    for issue in &issues {
        println!("  - {issue}");
    }
    bail!("{} validation issue(s)", issues.len());
}

/// Load a vanilla class table, or an empty one when no file is given
///
/// Text tables are tab-separated UTF-8; anything else is the compressed form.
pub fn load_vanilla_table(path: Option<&Path>) -> Result<VanillaClassTable> {
    let Some(path) = path else {
        return Ok(VanillaClassTable::new());
    };
    let data =
        fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let table = match std::str::from_utf8(&data) {
        Ok(text) => VanillaClassTable::from_text(text),
        Err(_) => VanillaClassTable::from_compressed(&data),
    }
    .with_context(|| format!("Invalid vanilla class table {}", path.display()))?;
    log::info!("Loaded {} vanilla classes from {}", table.len(), path.display());
    Ok(table)
}
