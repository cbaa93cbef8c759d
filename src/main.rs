//! mention-explorer - keyword mention API and operator CLI
//!
//! Main entry point for the mention-explorer command-line tool.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;

use mention_explorer::config::Config;
use mention_explorer::logging::{self, LogConfig, OperationGuard};
use mention_explorer::server::{self, AppState};
use mention_explorer::*;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let serving = matches!(cli.command, Commands::Serve(_));
    logging::init_logging(&LogConfig::for_command(cli.quiet, cli.verbose, serving));

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", render_error(&err));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Writing the config file must not require it to exist already.
    if let Commands::Config(ConfigArgs {
        action: ConfigCommand::Init { force },
    }) = &cli.command
    {
        return cmd_config_init(cli, *force);
    }

    let config = Config::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Serve(args) => cmd_serve(cli, &config, args),
        Commands::Init => cmd_init(cli, &config),
        Commands::Import(args) => cmd_import(cli, &config, args),
        Commands::Keywords => cmd_keywords(cli, &config),
        Commands::Rules(args) => cmd_rules(cli, &config, &args.action),
        Commands::Config(args) => cmd_config(cli, &config, &args.action),
        Commands::Completions(args) => cmd_completions(args.clone()),
    }
}

fn render_error(err: &anyhow::Error) -> String {
    let hint = err
        .downcast_ref::<ExplorerError>()
        .and_then(ExplorerError::suggestion);
    format_error("Command failed", &format!("{err:#}"), hint)
}

fn get_db_path(cli: &Cli, config: &Config) -> PathBuf {
    cli.db.clone().unwrap_or_else(|| config.db_path())
}

fn open_storage(cli: &Cli, config: &Config) -> Result<Storage> {
    let db_path = get_db_path(cli, config);
    debug!(path = %db_path.display(), "Opening database");
    Ok(Storage::open(&db_path)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_serve(cli: &Cli, config: &Config, args: &cli::ServeArgs) -> Result<()> {
    let host = args
        .host
        .clone()
        .unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);

    let storage = open_storage(cli, config)?.into_shared();
    let state = AppState::from_config(storage, config)?;

    if !cli.quiet {
        eprintln!(
            "{} Serving {} on http://{}:{}",
            "→".cyan(),
            get_db_path(cli, config).display(),
            host,
            port
        );
        if !state.rules.is_configured() {
            eprintln!(
                "  {} No API key configured; rule execution returns 503",
                "!".yellow()
            );
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(server::serve(state, &host, port))?;
    Ok(())
}

fn cmd_init(cli: &Cli, config: &Config) -> Result<()> {
    let db_path = get_db_path(cli, config);
    let storage = Storage::open(&db_path)?;
    storage.ping()?;

    match cli.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "status": "ok",
            "path": db_path.display().to_string(),
        })),
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{} Database ready at {}", "✓".green(), db_path.display());
            }
            Ok(())
        }
    }
}

fn cmd_import(cli: &Cli, config: &Config, args: &cli::ImportArgs) -> Result<()> {
    let guard = OperationGuard::new(format!("import {}", args.file.display()));

    let spinner = if cli.quiet || cli.format == OutputFormat::Json {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    };

    spinner.set_message(format!("Reading {}", args.file.display()));
    let result = importer::read_mentions(&args.file).and_then(|records| {
        spinner.set_message(format!("Storing {} mentions", records.len()));
        let mut storage = Storage::open(get_db_path(cli, config))?;
        storage.insert_mentions(&records)
    });
    spinner.finish_and_clear();
    guard.finish(&result);
    let imported = result?;

    match cli.format {
        OutputFormat::Json => print_json(&serde_json::json!({ "imported": imported })),
        OutputFormat::Text => {
            if !cli.quiet {
                println!(
                    "{} Imported {} mentions from {}",
                    "✓".green(),
                    format_count(i64::try_from(imported).unwrap_or(i64::MAX)).bold(),
                    args.file.display()
                );
            }
            Ok(())
        }
    }
}

fn cmd_keywords(cli: &Cli, config: &Config) -> Result<()> {
    let storage = open_storage(cli, config)?;
    let overview = analytics::keyword_overview(&storage)?;

    match cli.format {
        OutputFormat::Json => print_json(&overview),
        OutputFormat::Text => {
            let width = overview
                .iter()
                .map(|k| k.keyword.chars().count())
                .max()
                .unwrap_or(0)
                .max("Keyword".len());

            println!(
                "{}",
                format!("{:<width$}  {:>10}", "Keyword", "Mentions").bold()
            );
            println!("{}", "─".repeat(CONTENT_DIVIDER_WIDTH.min(width + 12)).dimmed());
            for stat in &overview {
                let line = format!("{:<width$}  {:>10}", stat.keyword, format_count(stat.count));
                if stat.keyword == ALL_KEYWORD {
                    println!("{}", line.cyan());
                } else {
                    println!("{line}");
                }
            }
            Ok(())
        }
    }
}

fn cmd_rules(cli: &Cli, config: &Config, action: &cli::RulesCommand) -> Result<()> {
    let storage = open_storage(cli, config)?;

    match action {
        cli::RulesCommand::List => {
            let rules = storage.list_rules()?;
            match cli.format {
                OutputFormat::Json => print_json(&rules),
                OutputFormat::Text => {
                    if rules.is_empty() {
                        println!("{}", "No saved rules.".dimmed());
                    }
                    for rule in &rules {
                        println!(
                            "{} {}  {}",
                            format!("#{}", rule.id).cyan(),
                            rule.title.bold(),
                            format_created_at(rule.created_at).dimmed()
                        );
                        println!("    {}", truncate_text(&rule.instruction, CONTENT_DIVIDER_WIDTH));
                    }
                    Ok(())
                }
            }
        }
        cli::RulesCommand::Add { title, instruction } => {
            let draft = RuleDraft {
                title: title.clone(),
                instruction: instruction.clone(),
            };
            draft.validate()?;
            let rule = storage.create_rule(&draft)?;
            match cli.format {
                OutputFormat::Json => print_json(&rule),
                OutputFormat::Text => {
                    println!("{} Saved rule #{}: {}", "✓".green(), rule.id, rule.title);
                    Ok(())
                }
            }
        }
        cli::RulesCommand::Remove { id } => {
            if !storage.delete_rule(*id)? {
                return Err(ExplorerError::not_found("Rule", id.to_string()).into());
            }
            match cli.format {
                OutputFormat::Json => {
                    print_json(&serde_json::json!({ "status": "deleted", "id": id }))
                }
                OutputFormat::Text => {
                    println!("{} Deleted rule #{}", "✓".green(), id);
                    Ok(())
                }
            }
        }
    }
}

fn config_file_path(cli: &Cli) -> Result<PathBuf> {
    cli.config
        .clone()
        .or_else(Config::user_config_path)
        .context("Could not determine config directory")
}

fn cmd_config(cli: &Cli, config: &Config, action: &cli::ConfigCommand) -> Result<()> {
    match action {
        cli::ConfigCommand::Show => {
            let shown = config.redacted();
            match cli.format {
                OutputFormat::Json => print_json(&shown),
                OutputFormat::Text => {
                    println!(
                        "{} {}",
                        "# database:".dimmed(),
                        get_db_path(cli, config).display()
                    );
                    print!("{}", shown.to_toml()?);
                    Ok(())
                }
            }
        }
        cli::ConfigCommand::Path => {
            println!("{}", config_file_path(cli)?.display());
            Ok(())
        }
        cli::ConfigCommand::Init { force } => cmd_config_init(cli, *force),
    }
}

fn cmd_config_init(cli: &Cli, force: bool) -> Result<()> {
    let path = config_file_path(cli)?;
    Config::write_default(&path, force)?;
    if !cli.quiet {
        println!("{} Wrote {}", "✓".green(), path.display());
    }
    Ok(())
}

fn cmd_completions(args: cli::CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "mention-explorer", &mut io::stdout());
    Ok(())
}
