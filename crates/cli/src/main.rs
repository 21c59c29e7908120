// Linkage CLI - batch policy renewal and claim linkage

mod exit_codes;
mod linkage;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::EXIT_SUCCESS;

#[derive(Parser)]
#[command(name = "linkage")]
#[command(about = "Link policy renewals into coverage stints and match claims to policies")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Verbose logging on stderr (-v info, -vv debug). RUST_LOG applies otherwise.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run linkage for one or more jurisdictions and write artifacts
    #[command(after_help = "\
Examples:
  linkage run nfip.linkage.toml
  linkage run nfip.linkage.toml --jurisdiction NC --jurisdiction SC
  linkage run nfip.linkage.toml --output-dir /tmp/match_info --json")]
    Run {
        /// Path to the linkage TOML config file
        config: PathBuf,

        /// Jurisdiction code to run (repeatable; default: all configured)
        #[arg(long, short = 'j', value_name = "CODE")]
        jurisdiction: Vec<String>,

        /// Override the config's [output] dir
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Print per-jurisdiction summaries as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Validate a linkage config without running
    #[command(after_help = "\
Examples:
  linkage validate nfip.linkage.toml")]
    Validate {
        /// Path to the linkage TOML config file
        config: PathBuf,
    },

    /// Aggregate the summaries written under an output directory
    #[command(after_help = "\
Examples:
  linkage summarize match_info
  linkage summarize match_info --json")]
    Summarize {
        /// Output directory of a previous `linkage run`
        output_dir: PathBuf,

        /// Output JSON to stdout instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nmatcher: linkage-matcher ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run { config, jurisdiction, output_dir, json } => {
            linkage::cmd_run(config, jurisdiction, output_dir, json)
        }
        Commands::Validate { config } => linkage::cmd_validate(config),
        Commands::Summarize { output_dir, json } => linkage::cmd_summarize(output_dir, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}
