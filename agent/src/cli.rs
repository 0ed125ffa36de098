//! CLI argument parsing with clap derive

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AppFlags, OutputFlags};
use crate::commands;

/// Unattended self-update agent for a supervised server
#[derive(Parser)]
#[command(
    name = "update-agent",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Config file (defaults to $UPDATE_AGENT_CONFIG or ~/.update-agent/config.yaml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(
        long,
        global = true,
        env = "NO_COLOR",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub no_color: bool,

    /// Debug logging (unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Poll the catalog and apply updates until interrupted
    Run(commands::run::RunArgs),

    /// Query the catalog once and print the manifest
    Check(crate::app::CredentialArgs),

    /// Apply a manifest from a local JSON file
    Apply(commands::apply::ApplyArgs),

    /// Print the current update level
    Level,

    /// Mark an update level as bad
    Taint(commands::taint::TaintArgs),

    /// Show version
    Version {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or the command fails.
    pub async fn run(self) -> Result<()> {
        let Cli {
            config,
            quiet,
            no_color,
            verbose: _,
            command,
        } = self;

        if let Command::Version { json } = command {
            commands::version::run(json);
            return Ok(());
        }

        let app = AppContext::new(AppFlags {
            output: OutputFlags { no_color, quiet },
            config,
        })?;

        match command {
            Command::Run(args) => commands::run::run(&app, &args).await,
            Command::Check(credentials) => commands::check::run(&app, &credentials).await,
            Command::Apply(args) => commands::apply::run(&app, &args).await,
            Command::Level => commands::level::run(&app).await,
            Command::Taint(args) => commands::taint::run(&app, &args).await,
            Command::Version { .. } => Ok(()),
        }
    }
}
