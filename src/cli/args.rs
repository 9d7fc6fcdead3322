//! Command-line argument parsing for cascadefix
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// cascadefix - three-tier cascading error resolution
#[derive(Parser, Debug)]
#[command(name = "cascadefix")]
#[command(author = "Jerome (Kubashen) Naidoo")]
#[command(version)]
#[command(about = "Resolve tool failures from past fixes, documentation patterns, or a human", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve an error message through the tiers
    Resolve {
        /// Error message to resolve
        #[arg(value_name = "MESSAGE")]
        message: String,

        /// Tool that produced the error
        #[arg(long, default_value = "Bash")]
        tool: String,

        /// File the failing operation touched
        #[arg(long)]
        file: Option<String>,

        /// Command that failed
        #[arg(long)]
        command: Option<String>,

        /// Print the resolution as JSON
        #[arg(long)]
        json: bool,
    },

    /// Save a human fix so the same error resolves automatically next time
    Save {
        /// Error message the fix applies to
        #[arg(value_name = "MESSAGE")]
        message: String,

        /// The fix
        #[arg(short, long)]
        solution: String,

        /// Tool that produced the error
        #[arg(long)]
        tool: Option<String>,
    },

    /// Run a shell command, resolving and optionally fixing failures
    Run {
        /// Execute auto-appliable fixes and retry once
        #[arg(long)]
        apply: bool,

        /// Tool name recorded for the command
        #[arg(long, default_value = "Bash")]
        tool: String,

        /// Command and arguments
        #[arg(last = true, required = true, value_name = "COMMAND")]
        command: Vec<String>,
    },

    /// Show resolution statistics
    Stats {
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reset resolution statistics
    ResetStats,

    /// Show search telemetry
    Telemetry {
        /// Print telemetry as JSON
        #[arg(long)]
        json: bool,
    },

    /// Display current configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Default log filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "cascadefix=info,warn",
            Verbosity::VeryVerbose => "cascadefix=debug,info",
        }
    }

    /// Check if should show detailed output
    pub fn show_details(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(parse(&["cascadefix", "stats"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["cascadefix", "-q", "stats"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["cascadefix", "-v", "stats"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["cascadefix", "stats", "-vv"]).verbosity(), Verbosity::VeryVerbose);
    }

    #[test]
    fn test_resolve_arguments() {
        let args = parse(&[
            "cascadefix",
            "resolve",
            "ModuleNotFoundError: No module named 'pandas'",
            "--tool",
            "Python",
            "--json",
        ]);

        match args.command {
            Commands::Resolve { message, tool, file, json, .. } => {
                assert!(message.contains("pandas"));
                assert_eq!(tool, "Python");
                assert!(file.is_none());
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_run_collects_trailing_command() {
        let args = parse(&["cascadefix", "run", "--apply", "--", "python", "-c", "import pandas"]);

        match args.command {
            Commands::Run { apply, tool, command } => {
                assert!(apply);
                assert_eq!(tool, "Bash");
                assert_eq!(command, vec!["python", "-c", "import pandas"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_run_requires_command() {
        assert!(Args::try_parse_from(["cascadefix", "run"]).is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let args = parse(&["cascadefix", "reset-stats", "--config", "/tmp/c.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(args.command, Commands::ResetStats));
    }

    #[test]
    fn test_log_filter() {
        assert_eq!(Verbosity::Quiet.log_filter(), "error");
        assert!(Verbosity::VeryVerbose.log_filter().contains("debug"));
        assert!(Verbosity::Verbose.show_details());
        assert!(!Verbosity::Normal.show_details());
    }
}
