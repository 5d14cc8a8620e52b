//! String-table bundle commands

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use glob::{MatchOptions, Pattern, glob_with};
use merge_mod::{StringTable, StringTableBuilder};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::VersionArg;
use crate::utils::{add_table_row, create_table, format_bytes, format_compression_ratio};

#[derive(Subcommand)]
pub enum StringsCommands {
    /// Bundle every file of a directory into a string-table container
    ///
    /// Files directly inside the directory are always merged. Files inside a
    /// numbered subdirectory belong to the install option with that number.
    Build {
        /// Directory holding the tables
        dir: PathBuf,

        /// Bundle file to write
        #[arg(short, long)]
        output: PathBuf,

        /// Bundle format version
        #[arg(long, value_enum, default_value_t = VersionArg::V2)]
        format_version: VersionArg,
    },

    /// List the tables of a bundle
    List {
        /// Path to the bundle
        file: PathBuf,

        /// Enabled install option (can be repeated)
        #[arg(long = "option", value_name = "ID")]
        options: Vec<i32>,

        /// Also list tables of disabled options
        #[arg(long)]
        all: bool,
    },
}

pub fn execute(command: StringsCommands) -> Result<()> {
    match command {
        StringsCommands::Build {
            dir,
            output,
            format_version,
        } => execute_build(&dir, &output, format_version),
        StringsCommands::List { file, options, all } => execute_list(&file, &options, all),
    }
}

fn execute_build(dir: &Path, output: &Path, version: VersionArg) -> Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }

    let mut builder = StringTableBuilder::new(version.into());
    for (path, option_key) in collect_tables(dir)? {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("{} has no UTF-8 file name", path.display()))?
            .to_string();
        let data = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        log::debug!("Adding {name} ({} bytes, option {option_key:?})", data.len());
        builder = match option_key {
            Some(key) => builder.add_for_option(name, data, key),
            None => builder.add(name, data),
        };
    }

    if builder.is_empty() {
        bail!("{} holds no tables", dir.display());
    }

    let count = builder.len();
    let bytes = builder
        .build()
        .with_context(|| format!("Failed to build string tables from {}", dir.display()))?;
    merge_mod::io::write_atomic(output, &bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Built {} with {} table(s) ({})",
        output.display(),
        count,
        format_bytes(bytes.len() as u64)
    );
    Ok(())
}

/// Table files under `dir` with their install option, sorted by path
fn collect_tables(dir: &Path) -> Result<Vec<(PathBuf, Option<i32>)>> {
    let root = Pattern::escape(&dir.to_string_lossy());
    let options = MatchOptions::new();
    let mut tables = Vec::new();

    for entry in glob_with(&format!("{root}/*"), options)? {
        let path = entry?;
        if path.is_file() {
            tables.push((path, None));
        }
    }

    for entry in glob_with(&format!("{root}/*/*"), options)? {
        let path = entry?;
        if !path.is_file() {
            continue;
        }
        let Some(key) = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .and_then(|n| n.parse::<i32>().ok())
        else {
            log::warn!("Skipping {}: not in a numbered option directory", path.display());
            continue;
        };
        tables.push((path, Some(key)));
    }

    tables.sort();
    Ok(tables)
}

fn execute_list(file: &Path, options: &[i32], all: bool) -> Result<()> {
    let table =
        StringTable::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    let enabled: HashSet<i32> = options.iter().copied().collect();

    let entries: Vec<_> = if all {
        table.entries().iter().collect()
    } else {
        table.list(&enabled)
    };

    println!("Version: {}", table.version());
    println!("Tables: {} of {}", entries.len(), table.entries().len());
    println!();

    let mut listing = create_table(&["Name", "Option", "Size", "Stored", "Saved"]);
    for entry in entries {
        add_table_row(
            &mut listing,
            vec![
                entry.name.clone(),
                entry
                    .option_key
                    .map_or_else(|| "-".to_string(), |key| key.to_string()),
                format_bytes(u64::from(entry.size)),
                format_bytes(u64::from(entry.compressed_size)),
                format_compression_ratio(
                    u64::from(entry.size),
                    u64::from(entry.compressed_size),
                ),
            ],
        );
    }
    listing.printstd();
    Ok(())
}
