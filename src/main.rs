mod adapters;
mod cli;
mod commands;
mod config;
mod data;
mod engine;
mod paths;
mod runner;
mod signal;
mod template;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Manifest given with `--manifest`
    pub manifest: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        manifest: cli.manifest,
    };

    match dispatch(&ctx, cli.command) {
        Ok(code) => code,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn dispatch(ctx: &Context, command: Command) -> Result<ExitCode> {
    match command {
        Command::Apply(args) => commands::apply::run(ctx, args),
        Command::Plan(args) => commands::plan::run(ctx, args),
        Command::Validate(args) => commands::validate::run(ctx, args),
        Command::Graph(args) => commands::graph::run(ctx, args),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "converge", &mut io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}
