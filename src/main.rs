mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub json: bool,
    pub yes: bool,
    pub xe: Option<String>,
    pub timeout: Option<u64>,
}

impl Context {
    /// Load the config file and apply command-line overrides
    pub fn config(&self) -> Result<config::Config> {
        let config = config::Config::load()?.with_overrides(self.xe.as_deref(), self.timeout);
        config.validate()?;
        Ok(config)
    }

    /// Whether to draw progress and status lines
    pub fn interactive_output(&self) -> bool {
        !self.quiet && !self.json
    }
}

fn main() -> Result<()> {
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
        json: cli.json,
        yes: cli.yes,
        xe: cli.xe,
        timeout: cli.timeout,
    };

    match cli.command {
        Command::Import(args) => commands::import::run(&ctx, args),
        Command::Param(args) => commands::param::run(&ctx, args),
        Command::Resume(args) => commands::resume::run(&ctx, args),
        Command::Plans(cmd) => commands::plans::run(&ctx, cmd),
        Command::Ops => commands::ops::run(&ctx),
        Command::Config(cmd) => commands::config::run(&ctx, cmd),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "xectl", &mut io::stdout());
            Ok(())
        }
    }
}
