use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;
mod config;

use cli::Cli;
use cli::commands::{CheckTarget, Commands, RunArgs};
use config::Config;
use deskpilot::domain::{Observation, RunReport, Task, TaskOptions, TaskRequest};
use deskpilot::guardrail::{Guardrails, Verdict};
use deskpilot::journal::Journal;
use deskpilot::planner::{ScriptedPlanner, TracedPlanner};
use deskpilot::runner::Orchestrator;
use deskpilot::tools::{Dispatcher, standard_registry};

fn setup_logging(level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deskpilot")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("deskpilot.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::new();
    builder.filter_level(log::LevelFilter::Info);
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    // RUST_LOG wins over the config file
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run(args) => handle_run_command(args, config, cli.is_verbose()).await,
        Commands::Undo { op_id, dry_run } => handle_undo_command(op_id, *dry_run, config),
        Commands::Journal { op_id } => handle_journal_command(op_id, config),
        Commands::Tools => handle_tools_command(),
        Commands::Check { target } => handle_check_command(target, config),
    }
}

fn load_guardrails(config: &Config) -> Result<Guardrails> {
    let path = config.guardrails_path();
    Guardrails::load(path).context(format!("Failed to load guardrails from {}", path.display()))
}

fn open_journal(config: &Config) -> Result<Journal> {
    Journal::new(&config.journal.dir).context(format!("Failed to open journal at {}", config.journal.dir.display()))
}

async fn handle_run_command(args: &RunArgs, config: &Config, verbose: bool) -> Result<()> {
    let guardrails = Arc::new(load_guardrails(config)?);
    let journal = Arc::new(open_journal(config)?);

    let planner = match &args.plan {
        Some(path) => ScriptedPlanner::from_file(path).context("Failed to load plan")?,
        None => ScriptedPlanner::silent(),
    };
    let planner = Arc::new(TracedPlanner::new(planner));

    let dispatcher = Arc::new(
        Dispatcher::new(Arc::new(standard_registry()), guardrails.clone())
            .with_blocking_slots(config.dispatch.blocking_slots),
    );
    let orchestrator =
        Orchestrator::new(planner.clone(), dispatcher, journal).with_max_output(config.dispatch.max_output_bytes);

    let request = TaskRequest {
        goal: args.goal.clone(),
        dry_run: args.dry_run,
        budget: args.budget,
        options: TaskOptions {
            max_steps: args.max_steps,
            allowed_tools: args.allowed_tools.iter().cloned().collect(),
            blocked_tools: args.blocked_tools.iter().cloned().collect(),
            profile: args.profile.clone(),
            approvals: args.approvals.iter().cloned().collect(),
        },
    };
    let task = Task::from_request(request, &guardrails.defaults());
    info!("Running goal ({} step budget, dry_run={})", task.step_budget, task.dry_run);

    let report = orchestrator.run(&task).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&report);
    if verbose && report.steps.is_empty() {
        println!("{}", "Planner trace:".yellow());
        for event in planner.trace_tail(10) {
            println!("  {} {:?} {}", event.call, event.stage, event.detail);
        }
    }
    Ok(())
}

fn print_observation(index: usize, name: &str, observation: &Observation) {
    if observation.is_ok() {
        println!("  {} {} {}", format!("[{}]", index).dimmed(), name.cyan(), "ok".green());
    } else {
        println!(
            "  {} {} {}",
            format!("[{}]", index).dimmed(),
            name.cyan(),
            observation.error().unwrap_or("failed").red()
        );
    }
}

fn print_report(report: &RunReport) {
    let label = if report.dry_run { " (dry run)" } else { "" };
    println!("{} {}{}", "Goal:".green(), report.goal, label);
    for (i, step) in report.steps.iter().enumerate() {
        print_observation(i + 1, &step.capability_name, &step.observation);
    }

    let reason = report.terminated_reason.as_str();
    if report.succeeded() {
        println!("{} {}", "Finished:".green(), reason);
    } else {
        println!("{} {}", "Stopped:".yellow(), reason);
    }
    if let Some(detail) = &report.detail {
        println!("  {}", detail);
    }
    if let Some(op_id) = &report.op_id {
        println!("{} {} (undo with `deskpilot undo {}`)", "Journal:".cyan(), op_id, op_id);
    }
}

fn handle_undo_command(op_id: &str, dry_run: bool, config: &Config) -> Result<()> {
    info!("Undoing operation {} (dry_run={})", op_id, dry_run);
    let journal = open_journal(config)?;
    let actions = journal.undo(op_id, dry_run).context(format!("Failed to undo {}", op_id))?;

    let label = if dry_run { "Would undo:" } else { "Undone:" };
    println!("{} {} ({} action(s))", label.green(), op_id, actions.len());
    for action in actions {
        if action.starts_with("skip") {
            println!("  {}", action.dimmed());
        } else if action.starts_with("failed") {
            println!("  {}", action.red());
        } else {
            println!("  {}", action);
        }
    }
    Ok(())
}

fn handle_journal_command(op_id: &str, config: &Config) -> Result<()> {
    let journal = open_journal(config)?;
    let entries = journal.read(op_id).context(format!("Failed to read journal {}", op_id))?;
    for entry in entries {
        println!(
            "{} {} {}",
            entry.ts.to_rfc3339().dimmed(),
            entry.event.to_string().cyan(),
            serde_json::Value::Object(entry.payload)
        );
    }
    Ok(())
}

fn handle_tools_command() -> Result<()> {
    let registry = standard_registry();
    for capability in registry.iter() {
        let mode = if capability.is_blocking() { "blocking" } else { "async" };
        let mutates = if capability.mutates() { " mutates" } else { "" };
        println!(
            "{:<18} {}{}  {}",
            capability.name().cyan(),
            mode.dimmed(),
            mutates.yellow(),
            capability.description()
        );
    }
    Ok(())
}

fn print_verdict(verdict: &Verdict) {
    if verdict.allowed {
        println!("{} {}", "allowed:".green(), verdict.reason);
    } else {
        println!("{} {}", "denied:".red(), verdict.reason);
    }
}

fn handle_check_command(target: &CheckTarget, config: &Config) -> Result<()> {
    let guardrails = load_guardrails(config)?;
    match target {
        CheckTarget::Path { path } => print_verdict(&guardrails.sandbox_check(path)),
        CheckTarget::Exec { binary, args } => print_verdict(&guardrails.exec_check(binary, args)),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;
    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
