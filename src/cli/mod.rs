//! Command-line parsing for `erpvar`.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! model and fitting code: every subcommand resolves into a plain config struct
//! (see `app`) before any model work happens.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{ConnectionKind, FitTo, VariabilityKind, VariabilitySelection};
use crate::fit::ParameterGroup;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "erpvar", version, about = "ERP variability model: simulate, fit, lead fields")]
pub struct Cli {
    /// Log level for diagnostics written to stderr.
    #[arg(long, global = true, default_value_t = tracing::Level::WARN)]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build a random model, compute every stage and simulate subjects.
    Simulate(SimulateArgs),
    /// Fit a random candidate model to a random target model.
    Fit(FitArgs),
    /// Compute the lead field of a generator configuration JSON file.
    LeadField(LeadFieldArgs),
}

/// Model shape shared by `simulate` and `fit`.
#[derive(Debug, Args, Clone)]
pub struct ModelArgs {
    /// Number of dipolar generators.
    #[arg(short = 'g', long, default_value_t = 2)]
    pub n_gen: usize,

    /// Number of simulated subjects.
    #[arg(short = 's', long, default_value_t = 20)]
    pub n_sub: usize,

    /// Electrode variability.
    #[arg(long, value_enum, default_value_t = VariabilityKind::Constant)]
    pub electrode_variability: VariabilityKind,

    /// Generator variability.
    #[arg(long, value_enum, default_value_t = VariabilityKind::Individual)]
    pub generator_variability: VariabilityKind,

    /// Connection (generator covariance) variability.
    #[arg(long, value_enum, default_value_t = ConnectionKind::Individual)]
    pub connection_variability: ConnectionKind,

    /// ELP electrode file; the built-in 10-20 montage is used when absent.
    #[arg(long, env = "ERPVAR_ELECTRODES", value_name = "ELP")]
    pub electrodes: Option<PathBuf>,
}

impl ModelArgs {
    pub fn selection(&self) -> VariabilitySelection {
        VariabilitySelection::new(
            self.electrode_variability,
            self.generator_variability,
            self.connection_variability,
        )
    }
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Random seed.
    #[arg(long, env = "ERPVAR_SEED", default_value_t = 42)]
    pub seed: u64,

    /// Also print the scalp mean per electrode.
    #[arg(long)]
    pub show_mean: bool,

    /// Export the model snapshot to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Seed of the target model.
    #[arg(long, env = "ERPVAR_SEED", default_value_t = 42)]
    pub target_seed: u64,

    /// Seed of the candidate model's starting point.
    #[arg(long, default_value_t = 7)]
    pub start_seed: u64,

    /// Which target statistic to fit.
    #[arg(long, value_enum, default_value_t = FitTo::Covariance)]
    pub fit_to: FitTo,

    /// Parameter groups to free, comma separated.
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = [
            ParameterGroup::GeneratorVariance,
            ParameterGroup::GeneratorCovariance,
            ParameterGroup::ElectrodeVariance,
        ]
    )]
    pub groups: Vec<ParameterGroup>,

    /// Ignore the bound table.
    #[arg(long)]
    pub unbounded: bool,

    /// Objective evaluation budget.
    #[arg(long, default_value_t = 2000)]
    pub max_evaluations: usize,

    /// Export the fitted model snapshot to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct LeadFieldArgs {
    /// Generator configuration JSON (array of generator objects).
    #[arg(long, value_name = "JSON")]
    pub generators: PathBuf,

    /// ELP electrode file; the built-in 10-20 montage is used when absent.
    #[arg(long, env = "ERPVAR_ELECTRODES", value_name = "ELP")]
    pub electrodes: Option<PathBuf>,

    /// Write a regression fixture file holding this single record.
    #[arg(long, value_name = "JSON")]
    pub fixture: Option<PathBuf>,

    /// Description stored in the fixture record.
    #[arg(long, default_value = "lead field")]
    pub description: String,
}
