//! Container summary

use anyhow::{Context, Result};
use merge_mod::Document;
use merge_mod::game::StaticLocalizations;
use std::path::PathBuf;

use crate::utils::{add_table_row, create_table, format_bytes, format_compression_ratio};

pub fn execute(container: PathBuf) -> Result<()> {
    let document = Document::open(&container)
        .with_context(|| format!("Failed to open {}", container.display()))?;
    let localizations = StaticLocalizations;
    let game = document.game();

    println!("Merge Mod Information");
    println!("=====================");
    println!();
    println!("File: {}", container.display());
    println!("Version: {}", document.version());
    println!("Game: {game}");
    println!("Target files: {}", document.merge_count(&localizations));
    println!("Merge weight: {}", document.merge_weight(&localizations));
    println!();

    let mut files = create_table(&["File", "Localized", "Targets", "Updates", "Weight"]);
    for directive in document.files() {
        let kinds: Vec<&str> = directive.updates().map(|u| u.kind()).collect();
        add_table_row(
            &mut files,
            vec![
                directive.file.clone(),
                if directive.apply_to_all_localizations {
                    "yes".to_string()
                } else {
                    "no".to_string()
                },
                directive.merge_count(game, &localizations).to_string(),
                kinds.join(", "),
                directive.merge_weight(game, &localizations).to_string(),
            ],
        );
    }
    files.printstd();

    let records = document.assets().records();
    if records.is_empty() {
        println!();
        println!("No assets");
        return Ok(());
    }

    println!();
    let mut assets = create_table(&["Asset", "Size", "Stored", "Saved"]);
    for record in records {
        let size = record.size() as u64;
        let stored = if record.is_compressed() {
            record.compressed_size() as u64
        } else {
            size
        };
        add_table_row(
            &mut assets,
            vec![
                record.name().to_string(),
                format_bytes(size),
                format_bytes(stored),
                format_compression_ratio(size, stored),
            ],
        );
    }
    assets.printstd();

    Ok(())
}
