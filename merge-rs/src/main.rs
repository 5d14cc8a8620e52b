//! Main entry point for the merge-rs CLI

mod cli;
mod commands;
mod utils;

use anyhow::Result;
use clap::CommandFactory;
use clap::Parser;
use clap_complete::{Generator, generate};
use std::io;

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if cli.verbose > 0 {
        log::set_max_level(match cli.verbose {
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        });
    } else if cli.quiet {
        log::set_max_level(log::LevelFilter::Error);
    }

    match cli.command {
        Commands::Compile {
            manifest,
            output,
            format_version,
            vanilla,
        } => commands::compile::execute(manifest, output, format_version.into(), vanilla),

        Commands::Decompile { container, output } => {
            commands::decompile::execute(container, output)
        }

        Commands::Info { container } => commands::info::execute(container),

        Commands::Validate {
            container,
            vanilla,
            game,
        } => commands::validate::execute(container, vanilla, game.map(Into::into)),

        Commands::Strings { command } => commands::strings::execute(command),

        Commands::Completions { shell } => {
            print_completions(shell, &mut Cli::command());
            Ok(())
        }
    }
}

fn print_completions<G: Generator>(generator: G, cmd: &mut clap::Command) {
    generate(
        generator,
        cmd,
        cmd.get_name().to_string(),
        &mut io::stdout(),
    );
}
