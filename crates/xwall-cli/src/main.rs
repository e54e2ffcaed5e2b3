#![forbid(unsafe_code)]

mod cmd;
mod output;
mod tui;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode};
use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use xwall_core::config::resolve_config;
use xwall_core::error::{ErrorCode, StoreError};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "xwall: live social wall for event screens",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Read configuration from this file instead of discovering one.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Display",
        about = "Run the full-screen wall",
        long_about = "Take over the terminal and cycle through posts with the agenda alongside.",
        after_help = "EXAMPLES:\n    # Run against the configured Supabase project\n    xwall run\n\n    # Replay a local export\n    xwall run --from-file posts.jsonl"
    )]
    Run(cmd::run::RunArgs),

    #[command(
        next_help_heading = "Display",
        about = "Stream displayed posts to stdout",
        long_about = "Run the live wall headless, printing one line per tick.",
        after_help = "EXAMPLES:\n    # Follow the wall in a pipe\n    xwall tail | tee wall.txt\n\n    # Stop after ten posts, machine-readable\n    xwall tail --frames 10 --json"
    )]
    Tail(cmd::tail::TailArgs),

    #[command(
        next_help_heading = "Inspect",
        about = "Fetch the current feed once",
        long_about = "Bootstrap from the store and print what the wall would start with.",
        after_help = "EXAMPLES:\n    # Check the store connection\n    xwall sync\n\n    # Show the newest twenty posts\n    xwall sync --newest 20 --json"
    )]
    Sync(cmd::sync::SyncArgs),

    #[command(
        next_help_heading = "Inspect",
        about = "Replay a feed through the scheduler",
        long_about = "Run scheduler ticks against a file without waiting for real time.",
        after_help = "EXAMPLES:\n    # Show the first twenty ticks\n    xwall simulate --from-file posts.jsonl\n\n    # Hold back the last five posts and deliver one every other tick\n    xwall simulate --from-file posts.jsonl --hold-back 5 --arrive-every 2"
    )]
    Simulate(cmd::simulate::SimulateArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Show the effective configuration",
        long_about = "Print the resolved configuration and where it came from, with the API key masked.",
        after_help = "EXAMPLES:\n    # Show the configuration\n    xwall config\n\n    # Use a specific file\n    xwall --config wall.toml config"
    )]
    Config,

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completion scripts",
        long_about = "Generate shell completion scripts for supported shells.",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    xwall completions bash\n\n    # Generate zsh completions\n    xwall completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

impl Cli {
    /// Where log lines go. The full-screen wall owns the terminal, so it logs to a file.
    fn log_file(&self) -> Option<&Path> {
        match &self.command {
            Commands::Run(args) => Some(args.log_file.as_path()),
            _ => None,
        }
    }
}

fn init_tracing(verbose: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("XWALL_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "xwall=debug,info"
        } else {
            "xwall=info,warn"
        })
    });

    let format = env::var("XWALL_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let (writer, ansi) = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(writer))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_ansi(ansi).with_writer(writer))
                .init();
        }
    }
    Ok(())
}

fn cli_error(err: &anyhow::Error) -> CliError {
    if let Some(store_err) = err.downcast_ref::<StoreError>() {
        return CliError::from(store_err);
    }
    let code = ErrorCode::InternalUnexpected;
    CliError {
        message: format!("{err:#}"),
        suggestion: code.hint().map(str::to_string),
        error_code: Some(code.code().to_string()),
    }
}

fn report(output: OutputMode, error: &CliError) -> ExitCode {
    if let Err(render_err) = output::render_error(output, error) {
        eprintln!("error: {}", error.message);
        eprintln!("error: failed to render error: {render_err:#}");
    }
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = output::resolve_output_mode(cli.json);

    if let Err(err) = init_tracing(cli.verbose, cli.log_file()) {
        return report(output, &CliError::new(format!("{err:#}")));
    }
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    if let Commands::Completions(args) = &cli.command {
        let mut command = Cli::command();
        return match cmd::completions::run_completions(args.shell, &mut command) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => report(output, &cli_error(&err)),
        };
    }

    let working_dir = match env::current_dir() {
        Ok(dir) => dir,
        Err(err) => return report(output, &CliError::new(format!("current directory: {err}"))),
    };
    let (config, source) = match resolve_config(cli.config.as_deref(), &working_dir) {
        Ok(resolved) => resolved,
        Err(err) => {
            let code = ErrorCode::ConfigParseError;
            return report(
                output,
                &CliError {
                    message: format!("{err:#}"),
                    suggestion: code.hint().map(str::to_string),
                    error_code: Some(code.code().to_string()),
                },
            );
        }
    };

    let command_result = match &cli.command {
        Commands::Run(args) => cmd::run::run_wall(args, &config),
        Commands::Tail(args) => cmd::tail::run_tail(args, &config, output),
        Commands::Sync(args) => cmd::sync::run_sync(args, &config, output),
        Commands::Simulate(args) => cmd::simulate::run_simulate(args, output),
        Commands::Config => cmd::config::run_config(&config, &source, output),
        Commands::Completions(_) => Ok(()),
    };

    match command_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(output, &cli_error(&err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn completions_subcommand_parses() {
        let cli = Cli::parse_from(["xwall", "completions", "bash"]);
        assert!(matches!(
            cli.command,
            Commands::Completions(cmd::completions::CompletionsArgs {
                shell: clap_complete::Shell::Bash,
            })
        ));
    }

    #[test]
    fn all_subcommands_listed() {
        let subcommands = [
            vec!["xwall", "run"],
            vec!["xwall", "tail", "--frames", "3"],
            vec!["xwall", "sync", "--newest", "10"],
            vec!["xwall", "simulate", "--from-file", "posts.jsonl"],
            vec!["xwall", "config"],
            vec!["xwall", "completions", "zsh"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(result.is_ok(), "failed to parse {args:?}: {:?}", result.err());
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::parse_from(["xwall", "sync", "--json", "--config", "wall.toml", "-v"]);
        assert!(cli.json);
        assert!(cli.verbose);
        assert_eq!(cli.config.as_deref(), Some(Path::new("wall.toml")));
    }

    #[test]
    fn only_run_logs_to_a_file() {
        let cli = Cli::parse_from(["xwall", "run", "--log-file", "wall.log"]);
        assert_eq!(cli.log_file(), Some(Path::new("wall.log")));

        let cli = Cli::parse_from(["xwall", "tail"]);
        assert_eq!(cli.log_file(), None);
    }

    #[test]
    fn simulate_requires_a_file() {
        assert!(Cli::try_parse_from(["xwall", "simulate"]).is_err());
        assert!(
            Cli::try_parse_from(["xwall", "simulate", "--from-file", "f", "--arrive-every", "0"])
                .is_err()
        );
    }

    #[test]
    fn store_errors_keep_their_code() {
        let err = anyhow::Error::new(StoreError::NotConfigured("store.url is unset".into()));
        let cli = cli_error(&err.context("opening store"));
        assert_eq!(cli.error_code.as_deref(), Some("E1002"));

        let cli = cli_error(&anyhow::anyhow!("boom"));
        assert_eq!(cli.error_code.as_deref(), Some("E9001"));
    }
}
