//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - installs the log subscriber
//! - resolves arguments into config structs
//! - runs the pipeline and prints reports
//! - writes optional exports

use clap::Parser;

use crate::cli::{Command, FitArgs, LeadFieldArgs, SimulateArgs};
use crate::domain::{FitConfig, LeadFieldConfig, SimulationConfig};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `erpvar` binary.
pub fn run() -> Result<(), AppError> {
    // Values from `.env` feed clap's `env` fallbacks, so load them first.
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Simulate(args) => handle_simulate(&args),
        Command::Fit(args) => handle_fit(&args),
        Command::LeadField(args) => handle_lead_field(&args),
    }
}

fn handle_simulate(args: &SimulateArgs) -> Result<(), AppError> {
    let config = simulation_config_from_args(args);
    let model = pipeline::run_simulation(&config)?;

    println!("{}", crate::report::format_model_summary(&model));
    if config.show_mean {
        println!("{}", crate::report::format_scalp_mean(&model));
    }

    if let Some(path) = &config.export {
        crate::io::write_model_json(path, &model)?;
    }
    Ok(())
}

fn handle_fit(args: &FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(args);
    let run = pipeline::run_fit(&config)?;

    println!("{}", crate::report::format_fit_report(&run.report));
    println!("{}", crate::report::format_model_summary(&run.model));

    if let Some(path) = &config.export {
        crate::io::write_model_json(path, &run.model)?;
    }
    Ok(())
}

fn handle_lead_field(args: &LeadFieldArgs) -> Result<(), AppError> {
    let config = lead_field_config_from_args(args);
    let fixture = pipeline::run_lead_field(&config)?;

    println!("{}", crate::report::fmt_matrix(&fixture.matrix()?));

    if let Some(path) = &config.fixture {
        crate::io::write_fixtures(path, std::slice::from_ref(&fixture))?;
    }
    Ok(())
}

pub fn simulation_config_from_args(args: &SimulateArgs) -> SimulationConfig {
    SimulationConfig {
        n_gen: args.model.n_gen,
        n_sub: args.model.n_sub,
        variability: args.model.selection(),
        seed: args.seed,
        electrodes_path: args.model.electrodes.clone(),
        export: args.export.clone(),
        show_mean: args.show_mean,
    }
}

pub fn fit_config_from_args(args: &FitArgs) -> FitConfig {
    FitConfig {
        n_gen: args.model.n_gen,
        n_sub: args.model.n_sub,
        variability: args.model.selection(),
        target_seed: args.target_seed,
        start_seed: args.start_seed,
        fit_to: args.fit_to,
        groups: args.groups.clone(),
        bounded: !args.unbounded,
        max_evaluations: args.max_evaluations,
        electrodes_path: args.model.electrodes.clone(),
        export: args.export.clone(),
    }
}

pub fn lead_field_config_from_args(args: &LeadFieldArgs) -> LeadFieldConfig {
    LeadFieldConfig {
        generators_path: args.generators.clone(),
        electrodes_path: args.electrodes.clone(),
        fixture: args.fixture.clone(),
        description: args.description.clone(),
    }
}
