use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vtbench::config::cli::{CliArgs, Command, ConfigAction, RunArgs};
use vtbench::config::persistence::ResultsStorage;
use vtbench::config::ConfigManager;
use vtbench::error::user_friendly_message;
use vtbench::suite::BenchmarkSuite;
use vtbench::util::format_duration;
use vtbench::Result;

fn init_tracing(default_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries only results
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_tracing(args.log_level());

    match dispatch(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", user_friendly_message(&e));
            debug!(error = %e, "fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(args: &CliArgs) -> Result<()> {
    let manager = config_manager(args.config.clone())?;

    match &args.command {
        Command::Run(run) => run_workloads(&manager, run, args.quiet).await,
        Command::History { limit } => show_history(&manager, *limit),
        Command::Config { action } => config_command(&manager, *action),
    }
}

fn config_manager(config_path: Option<PathBuf>) -> Result<ConfigManager> {
    match config_path {
        Some(path) => Ok(ConfigManager::with_paths(path, ResultsStorage::results_file_path()?)),
        None => ConfigManager::new(),
    }
}

async fn run_workloads(manager: &ConfigManager, run: &RunArgs, quiet: bool) -> Result<()> {
    let mut config = manager.load_config()?;
    run.apply_overrides(&mut config);
    config.validate()?;

    let workloads = run.workload.workloads();
    let scenarios = run.selected_scenarios(config.platform_threads);
    info!(
        tasks = config.task_count,
        platform_threads = config.platform_threads,
        task_duration = %format_duration(config.task_duration),
        grace_period = %format_duration(config.grace_period),
        policy = ?config.timeout_policy,
        "starting benchmark"
    );

    let suite = BenchmarkSuite::new(config)
        .with_scenarios(scenarios)
        .with_progress(run.shows_progress(quiet));

    let mut reports = Vec::with_capacity(workloads.len());
    for workload in &workloads {
        let report = suite.run(*workload).await?;
        if !run.json {
            for line in report.console_lines(workloads.len() > 1) {
                println!("{}", line);
            }
        }
        if let Some(speedup) = report.speedup() {
            info!(workload = %workload, speedup = %format!("{:.1}x", speedup), "virtual vs platform");
        }
        reports.push(report);
    }

    if run.json {
        let json = if reports.len() == 1 {
            serde_json::to_string_pretty(&reports[0])?
        } else {
            serde_json::to_string_pretty(&reports)?
        };
        println!("{}", json);
    }

    if run.save {
        for report in reports {
            manager.save_report(report)?;
        }
        info!("results saved");
    }
    Ok(())
}

fn show_history(manager: &ConfigManager, limit: usize) -> Result<()> {
    let reports = manager.get_recent_reports(limit)?;
    if reports.is_empty() {
        println!("No saved results");
        return Ok(());
    }
    for report in reports {
        println!("{}", report.summary());
    }
    Ok(())
}

fn config_command(manager: &ConfigManager, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = manager.load_config()?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Save => {
            let config = manager.load_config()?;
            manager.save_config(&config)?;
            println!("{}", manager.config_path().display());
        }
        ConfigAction::Path => println!("{}", manager.config_path().display()),
    }
    Ok(())
}
