mod commands;
mod report;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Exit codes. Diagnostics never exit the engine; the driver decides here.
pub(crate) mod exit {
    /// At least one error diagnostic (or a warning under `--deny-warnings`).
    pub const DIAGNOSTICS: i32 = 1;
    /// Inputs or configuration could not be read.
    pub const LOAD: i32 = 2;
    /// Bad arguments, as for clap's own usage errors.
    pub const USAGE: i32 = 2;
}

/// Quantity model resolution engine.
#[derive(Parser)]
#[command(name = "measure", version, about = "Quantity model resolution engine")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Resolution policy file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve batch fragments and print the resolved model
    Resolve {
        /// Batch fragments (.json) or directories of fragments
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Write the resolved model to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Resolve batch fragments and report diagnostics only
    Check {
        /// Batch fragments (.json) or directories of fragments
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Treat warnings as failures
        #[arg(long)]
        deny_warnings: bool,
    },

    /// Validate batch fragments against the batch JSON Schema
    Validate {
        /// Batch fragment files
        #[arg(required = true)]
        fragments: Vec<PathBuf>,
    },

    /// List diagnostic codes, or describe one
    Codes {
        /// A code (QM0401) or its name (MissingFixedInstance)
        code: Option<String>,
    },
}

pub(crate) struct Options {
    pub output: OutputFormat,
    pub quiet: bool,
    pub config: Option<PathBuf>,
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "measure=error" } else { "measure=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    let options = Options {
        output: cli.output,
        quiet: cli.quiet,
        config: cli.config,
    };

    match cli.command {
        Commands::Resolve { inputs, out } => {
            commands::resolve::cmd_resolve(&inputs, out.as_deref(), &options);
        }
        Commands::Check {
            inputs,
            deny_warnings,
        } => {
            commands::check::cmd_check(&inputs, deny_warnings, &options);
        }
        Commands::Validate { fragments } => {
            commands::validate::cmd_validate(&fragments, &options);
        }
        Commands::Codes { code } => {
            commands::codes::cmd_codes(code.as_deref(), &options);
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
