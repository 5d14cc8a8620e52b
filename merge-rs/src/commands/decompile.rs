//! Container extraction into loose files

use anyhow::{Context, Result};
use merge_mod::codec;
use std::fs;
use std::path::PathBuf;

pub fn execute(container: PathBuf, output: PathBuf) -> Result<()> {
    let bytes = fs::read(&container)
        .with_context(|| format!("Failed to read {}", container.display()))?;

    let decompiled = codec::decompile(&bytes, &output)
        .with_context(|| format!("Failed to decompile {}", container.display()))?;

    println!(
        "Decompiled {} container into {}",
        decompiled.version,
        output.display()
    );
    println!("  {}", decompiled.manifest_path.display());
    for path in &decompiled.asset_paths {
        println!("  {}", path.display());
    }
    Ok(())
}
