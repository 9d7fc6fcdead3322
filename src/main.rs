//! cascadefix - CLI entry point

use anyhow::{Context, Result};
use cascadefix::{
    cli::{display, Args, Commands, Verbosity},
    config::Config,
    docs::PatternDocSource,
    knowledge::FsKnowledgeStore,
    resolver::ConfidenceCascadeResolver,
    tools::{CommandOutput, ShellApplier, ToolInvocationWrapper, ToolOutcome},
    types::{ErrorContext, ToolCall},
};
use clap::Parser;
use colored::Colorize;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbosity());

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    match &args.command {
        Commands::Resolve {
            message,
            tool,
            file,
            command,
            json,
        } => {
            let resolver = build_resolver(&config)?;
            let mut context = ErrorContext::new(tool.clone(), message.clone());
            if let Some(path) = file {
                context = context.with_file_path(path.clone());
            }
            if let Some(cmd) = command {
                context = context.with_command(cmd.clone());
            }

            let resolution = resolver.resolve_error(message, &context).await;
            if *json {
                println!("{}", serde_json::to_string_pretty(&resolution)?);
            } else {
                display::print_resolution(&resolution, &context);
            }
        }
        Commands::Save {
            message,
            solution,
            tool,
        } => {
            let resolver = build_resolver(&config)?;
            let context = tool
                .as_ref()
                .map(|tool| ErrorContext::new(tool.clone(), message.clone()));
            let path = resolver
                .save_user_solution(message, solution, context.as_ref())
                .await
                .context("Failed to save solution")?;
            println!("{} Saved solution to {}", "✓".green(), path.display());
        }
        Commands::Run {
            apply,
            tool,
            command,
        } => {
            let code = run_wrapped(&config, &args, tool, command, *apply).await?;
            std::process::exit(code);
        }
        Commands::Stats { json } => {
            let resolver = build_resolver(&config)?;
            let stats = resolver.get_statistics();
            if *json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                display::print_statistics(&stats, &resolver.breaker_state(), true);
            }
        }
        Commands::ResetStats => {
            let resolver = build_resolver(&config)?;
            resolver.reset_statistics();
            println!("{} Statistics reset", "✓".green());
        }
        Commands::Telemetry { json } => {
            let resolver = build_resolver(&config)?;
            let telemetry = resolver.search_telemetry();
            if *json {
                println!("{}", serde_json::to_string_pretty(&telemetry.get_stats())?);
            } else {
                display::print_telemetry(
                    &telemetry.get_stats(),
                    telemetry.hit_rate(),
                    telemetry.average_search_ms(),
                );
            }
        }
        Commands::Config => show_config(&config, &args)?,
    }

    Ok(())
}

fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_resolver(config: &Config) -> Result<Arc<ConfidenceCascadeResolver>> {
    let store = Arc::new(FsKnowledgeStore::new(config.knowledge_root()));
    let docs = Arc::new(PatternDocSource::new());
    let resolver = ConfidenceCascadeResolver::with_config(store, docs, config.resolver_config())
        .context("Failed to initialize resolver")?;
    Ok(Arc::new(resolver))
}

/// Run a shell command under the wrapper; returns the exit code to use
async fn run_wrapped(
    config: &Config,
    args: &Args,
    tool: &str,
    command: &[String],
    apply: bool,
) -> Result<i32> {
    let resolver = build_resolver(config)?;
    let command_line = command.join(" ");

    let mut wrapper_config = config.wrapper_config();
    wrapper_config.apply_enabled = wrapper_config.apply_enabled && apply;
    let wrapper = ToolInvocationWrapper::with_applier(
        Arc::clone(&resolver),
        Arc::new(ShellApplier::new()),
        wrapper_config,
    );

    let call = ToolCall::new(tool).with_command(command_line.clone());
    let operation = || run_shell(&command_line);
    let output = wrapper.wrap(call, operation).call().await;

    print!("{}", output.stdout);
    eprint!("{}", output.stderr);

    let Some(failure) = output.failure() else {
        return Ok(0);
    };

    let stats = resolver.get_statistics();
    if let Some(entry) = stats.history.last() {
        eprintln!();
        eprintln!("{} {}", "✗".red(), entry.tier.to_string().bold());
        if let Some(solution) = &entry.solution_preview {
            let note = if entry.auto_applied && !apply {
                "(rerun with --apply to execute)"
            } else if entry.auto_applied {
                "(applied, command still failing)"
            } else {
                "(confirm before applying)"
            };
            eprintln!("  Suggested fix: {} {}", solution.cyan(), note.dimmed());
        } else if let Some(reason) = &entry.blocked {
            eprintln!("  Suggestion withheld: {}", reason);
        }
    }

    if args.verbosity().show_details() {
        eprintln!("  Error: {}", failure.message);
    }

    Ok(failure.exit_code.filter(|code| *code != 0).unwrap_or(1))
}

async fn run_shell(command_line: &str) -> CommandOutput {
    let result = Command::new("sh")
        .arg("-c")
        .arg(command_line)
        .stdin(Stdio::inherit())
        .output()
        .await;

    match result {
        Ok(output) => CommandOutput::from(output),
        Err(e) => CommandOutput::new(None, "", format!("Failed to execute command: {}", e)),
    }
}

fn show_config(config: &Config, args: &Args) -> Result<()> {
    let path = args
        .config
        .clone()
        .or_else(Config::default_path)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(built-in defaults)".to_string());

    println!("{} {}", "Configuration:".bold(), path);
    println!();
    println!("{}", toml::to_string_pretty(config).context("Failed to render configuration")?);
    println!("Resolved paths:");
    println!("  Knowledge:  {}", config.knowledge_root().display());
    println!("  Statistics: {}", config.statistics_path().display());
    println!("  Telemetry:  {}", config.telemetry_path().display());
    println!("  Verbosity:  {}", args.verbosity().as_str());

    Ok(())
}
