//! CLI interface for poly-engine
//!
//! Provides subcommands for:
//! - `run`: Replay recorded events through the engine (paper or live)
//! - `config`: Print the effective configuration

mod run;

pub use run::{OutputFormat, RunArgs};

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "poly-engine")]
#[command(about = "Signal-to-execution trading engine for binary-outcome prediction markets")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the engine over a newline-delimited JSON event stream
    Run(RunArgs),
    /// Show the effective configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "poly-engine",
            "--config",
            "engine.toml",
            "run",
            "--events",
            "day1.jsonl",
            "--capital",
            "500",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.config, "engine.toml");
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.events.to_str(), Some("day1.jsonl"));
        assert_eq!(args.capital, Some(dec!(500)));
        assert_eq!(args.format, OutputFormat::Json);
        assert!(!args.live);
    }

    #[test]
    fn test_run_reads_stdin_by_default() {
        let cli = Cli::try_parse_from(["poly-engine", "run"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.events.to_str(), Some("-"));
        assert_eq!(args.format, OutputFormat::Table);
    }
}
