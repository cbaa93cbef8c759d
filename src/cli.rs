//! CLI definitions for mention-explorer.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// mention-explorer - Browse and query scraped keyword mentions
#[derive(Parser, Debug)]
#[command(name = "mention-explorer")]
#[command(version)]
#[command(about = "Serve and manage a database of scraped keyword mentions")]
#[command(long_about = r#"
mention-explorer serves a JSON API over social posts that matched monitored
keywords, with per-day, per-author and sentiment statistics, and saved
natural-language rules executed by a language model.

Quick start:
  1. Load data:   mention-explorer import mentions.jsonl
  2. Serve:       mention-explorer serve --port 8000
  3. Browse:      curl localhost:8000/api/keywords
"#)]
pub struct Cli {
    /// Path to the database file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Path to a config file (instead of the user config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// More log output (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP API
    Serve(ServeArgs),

    /// Create or migrate the database
    Init,

    /// Import mentions from a JSON array or JSON Lines file
    Import(ImportArgs),

    /// Show mention counts per keyword
    Keywords,

    /// Manage saved rules
    Rules(RulesArgs),

    /// Show or manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (overrides config)
    #[arg(long, short = 'p')]
    pub port: Option<u16>,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// File to import
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesCommand,
}

#[derive(Subcommand, Debug)]
pub enum RulesCommand {
    /// List saved rules
    List,

    /// Save a new rule
    Add {
        /// Short name shown in the UI
        #[arg(long, short = 't')]
        title: String,

        /// Instruction text (prefix with SQL: or FILTER: to pick a mode)
        #[arg(long, short = 'i')]
        instruction: String,
    },

    /// Delete a rule
    Remove {
        /// Rule ID
        id: i64,
    },
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration (API key hidden)
    Show,

    /// Print the config file location
    Path,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_rules_add() {
        let cli = Cli::try_parse_from([
            "mention-explorer",
            "--db",
            "/tmp/m.db",
            "rules",
            "add",
            "--title",
            "Weekly",
            "--instruction",
            "SQL: count posts per week",
        ])
        .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/m.db")));
        match cli.command {
            Commands::Rules(RulesArgs {
                action: RulesCommand::Add { title, instruction },
            }) => {
                assert_eq!(title, "Weekly");
                assert!(instruction.starts_with("SQL:"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["mention-explorer", "keywords", "--format", "json", "-q"])
            .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.quiet);
    }

    #[test]
    fn verbose_flag_counts() {
        let cli = Cli::try_parse_from(["mention-explorer", "-vv", "serve"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Serve(_)));
    }
}
