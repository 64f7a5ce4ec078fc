//! Shared pipeline logic behind the CLI subcommands.
//!
//! Each function takes a resolved config, builds the model(s) and returns the
//! computed outputs; printing and exports stay in `app`.

use std::path::Path;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use crate::domain::{FitConfig, LeadFieldConfig, SimulationConfig};
use crate::electrodes::ElectrodeSet;
use crate::error::ModelError;
use crate::fit::{FitOptions, FitReport, FitTarget, NelderMead, Parameterized, fit_variability_model};
use crate::forward::calculate_lead_field;
use crate::io::LeadFieldFixture;
use crate::model::ErpModel;

/// Outputs of one `erpvar fit` run.
#[derive(Debug, Clone)]
pub struct FitRun {
    pub target: ErpModel,
    pub model: ErpModel,
    pub report: FitReport,
}

/// Electrode file when given, else the built-in montage.
pub fn load_electrodes(path: Option<&Path>) -> Result<Arc<ElectrodeSet>, ModelError> {
    let set = match path {
        Some(p) => crate::io::read_electrode_locations(p)?,
        None => ElectrodeSet::standard_10_20(),
    };
    Ok(Arc::new(set))
}

/// Random model, every stage computed, subjects simulated.
pub fn run_simulation(config: &SimulationConfig) -> Result<ErpModel, ModelError> {
    let electrodes = load_electrodes(config.electrodes_path.as_deref())?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut model = ErpModel::new(config.n_sub, config.n_gen, config.variability, electrodes);
    model.set_random(&mut rng);
    model.recalculate_model(&mut rng)?;

    info!(n_gen = config.n_gen, n_sub = config.n_sub, seed = config.seed, "simulation finished");
    Ok(model)
}

/// Fit a random candidate to a random target.
///
/// Only the named groups are re-randomized in the candidate; every other
/// parameter is copied from the target so the fit is well posed.
pub fn run_fit(config: &FitConfig) -> Result<FitRun, ModelError> {
    let electrodes = load_electrodes(config.electrodes_path.as_deref())?;

    let mut target_rng = StdRng::seed_from_u64(config.target_seed);
    let mut target = ErpModel::new(config.n_sub, config.n_gen, config.variability, Arc::clone(&electrodes));
    target.set_random(&mut target_rng);
    target.recalculate_model(&mut target_rng)?;
    let fit_target = FitTarget::from_model(&mut target, config.fit_to)?;

    let mut model = target.clone();
    let mut start_rng = StdRng::seed_from_u64(config.start_seed);
    model.set_random_parameters(&config.groups, &mut start_rng);

    let options = FitOptions {
        bounded: config.bounded,
        max_evaluations: config.max_evaluations,
        ..FitOptions::default()
    };
    let report = fit_variability_model(
        &mut model,
        &config.groups,
        &fit_target,
        &options,
        &NelderMead::default(),
        &mut start_rng,
    )?;

    Ok(FitRun { target, model, report })
}

/// Lead field of a generator configuration file, packaged as a fixture record.
pub fn run_lead_field(config: &LeadFieldConfig) -> Result<LeadFieldFixture, ModelError> {
    let electrodes = load_electrodes(config.electrodes_path.as_deref())?;
    let generators = crate::io::read_generators_json(&config.generators_path)?;
    let lf = calculate_lead_field(&electrodes, &generators)?;
    Ok(LeadFieldFixture::new(config.description.clone(), generators, &lf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitTo, VariabilitySelection};
    use crate::fit::ParameterGroup;

    fn selection() -> VariabilitySelection {
        VariabilitySelection::parse("constant", "individual", "individual").unwrap()
    }

    #[test]
    fn simulation_is_reproducible() {
        let config = SimulationConfig {
            n_gen: 3,
            n_sub: 5,
            variability: selection(),
            seed: 1,
            electrodes_path: None,
            export: None,
            show_mean: false,
        };
        let a = run_simulation(&config).unwrap();
        let b = run_simulation(&config).unwrap();
        assert_eq!(a.data(), b.data());
        assert_eq!(a.data().map(|d| d.shape()), Some((5, a.n_el())));
    }

    #[test]
    fn fit_keeps_non_free_parameters() {
        let config = FitConfig {
            n_gen: 2,
            n_sub: 5,
            variability: selection(),
            target_seed: 3,
            start_seed: 4,
            fit_to: FitTo::Covariance,
            groups: vec![ParameterGroup::ElectrodeVariance],
            bounded: true,
            max_evaluations: 200,
            electrodes_path: None,
            export: None,
        };
        let run = run_fit(&config).unwrap();
        assert_eq!(run.model.generators(), run.target.generators());
        assert_eq!(run.model.sigma_g(), run.target.sigma_g());
        assert!(run.report.end_error <= run.report.start_error);
    }
}
