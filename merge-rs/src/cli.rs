//! Root CLI structure for merge-rs

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use merge_mod::{FormatVersion, Game};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "merge-rs")]
#[command(about = "Build, inspect and validate merge-mod containers", long_about = None)]
#[command(version)]
#[command(author)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a container from a manifest and the assets next to it
    Compile {
        /// Path to the manifest JSON file
        manifest: PathBuf,

        /// Container file to write
        #[arg(short, long)]
        output: PathBuf,

        /// Container format version
        #[arg(long, value_enum, default_value_t = VersionArg::V2)]
        format_version: VersionArg,

        /// Vanilla class table, as text or in compressed form
        #[arg(long, value_name = "FILE")]
        vanilla: Option<PathBuf>,
    },

    /// Extract the manifest and every asset of a container
    Decompile {
        /// Path to the container
        container: PathBuf,

        /// Directory to write the loose files into
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Display information about a container
    Info {
        /// Path to the container
        container: PathBuf,
    },

    /// Check a container against the allow-lists and vanilla class table
    Validate {
        /// Path to the container
        container: PathBuf,

        /// Vanilla class table, as text or in compressed form
        #[arg(long, value_name = "FILE")]
        vanilla: Option<PathBuf>,

        /// Fail unless the container targets this game
        #[arg(long, value_enum)]
        game: Option<GameArg>,
    },

    /// String-table bundle operations
    Strings {
        #[command(subcommand)]
        command: crate::commands::strings::StringsCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Container format version argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VersionArg {
    /// Uncompressed manifest and assets
    V1,
    /// LZMA manifest, compressed text assets and localization fan-out
    V2,
}

impl From<VersionArg> for FormatVersion {
    fn from(version: VersionArg) -> Self {
        match version {
            VersionArg::V1 => FormatVersion::V1,
            VersionArg::V2 => FormatVersion::V2,
        }
    }
}

/// Target game argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GameArg {
    Me3,
    Le1,
    Le2,
    Le3,
}

impl From<GameArg> for Game {
    fn from(game: GameArg) -> Self {
        match game {
            GameArg::Me3 => Game::Me3,
            GameArg::Le1 => Game::Le1,
            GameArg::Le2 => Game::Le2,
            GameArg::Le3 => Game::Le3,
        }
    }
}
