use anyhow::{Context, Result};
use mim_scheduler::cli::{
    Args, ConfigDiscovery, ExecutionMode, RunConfig, ValidateConfig, init_logging,
};
use mim_scheduler::env::WHAT_IF_PREFIX;
use mim_scheduler::{ExecutionEngine, Executors, ScheduleLoader};
use std::fs;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};

/// The run halted because a task did not complete
const EXIT_HALTED: u8 = 1;

/// The schedule could not be loaded or failed validation
const EXIT_INVALID: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(ExitCode::from(EXIT_INVALID));
        }
    };

    match mode {
        ExecutionMode::Run(config) => run_schedule(config).await,
        ExecutionMode::Validate(config) => validate_schedule(config),
        ExecutionMode::ShowConfig => {
            ConfigDiscovery::show_discovery_info();
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_schedule(run: RunConfig) -> Result<ExitCode> {
    let (mut config, source) = match ConfigDiscovery::load(run.config_override.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Ok(ExitCode::from(EXIT_INVALID));
        }
    };
    if run.what_if {
        config.what_if = true;
    }

    let log_file = init_logging(&config.logging, run.log_level.as_deref())
        .context("Failed to initialise logging")?;

    info!(
        "Starting MIM synchronisation scheduler v{}",
        env!("CARGO_PKG_VERSION")
    );
    match source {
        Some(path) => info!("Configuration loaded from: {:?}", path),
        None => info!("No configuration file found, using defaults"),
    }
    if let Some(path) = log_file {
        debug!("Logging to: {:?}", path);
    }
    if config.what_if {
        warn!(
            "{}Running in WHATIF mode, nothing will be executed",
            WHAT_IF_PREFIX
        );
    }

    info!("Loading schedule from: {:?}", run.schedule);
    let mut schedule = match ScheduleLoader::load_file(&run.schedule) {
        Ok(schedule) => schedule,
        Err(e) => {
            error!("Schedule could not be loaded: {}", e);
            return Ok(ExitCode::from(EXIT_INVALID));
        }
    };

    let executors = Executors::from_settings(&config.executors, config.what_if);
    let engine = ExecutionEngine::new(executors).with_what_if(config.what_if);

    let report = match engine.execute_schedule(&mut schedule).await {
        Ok(report) => report,
        Err(e) => {
            error!("Schedule is not valid: {}", e);
            return Ok(ExitCode::from(EXIT_INVALID));
        }
    };

    if let Some(path) = &run.report {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write run report to {:?}", path))?;
        info!("Run report written to: {:?}", path);
    }

    if report.halted {
        Ok(ExitCode::from(EXIT_HALTED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn validate_schedule(validate: ValidateConfig) -> Result<ExitCode> {
    let schedule = match ScheduleLoader::load_file(&validate.schedule) {
        Ok(schedule) => schedule,
        Err(e) => {
            eprintln!("✗ {:?}: {}", validate.schedule, e);
            return Ok(ExitCode::from(EXIT_INVALID));
        }
    };

    if validate.json {
        println!("{}", serde_json::to_string_pretty(&schedule)?);
    } else {
        println!("✓ {:?} is valid ({} tasks)", validate.schedule, schedule.task_count());
        println!();
        print!("{}", schedule.outline());
    }

    Ok(ExitCode::SUCCESS)
}
