//! Fitting a model to an observed mean or covariance.
//!
//! Given:
//! - a model whose non-free parameters are already set
//! - an ordered list of parameter groups to free
//! - a target (scalp mean vector or scalp covariance matrix)
//!
//! we minimize the Euclidean (mean) or Frobenius (covariance) norm of the
//! residual over the free parameters, write the best vector back and leave the
//! model fully recomputed.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use tracing::{debug, info};

use crate::domain::{FitBounds, FitTo};
use crate::error::ModelError;
use crate::fit::optimizer::{Minimizer, Termination};
use crate::fit::parameters::{ParameterGroup, Parameterized};
use crate::model::{ErpModel, Freshness, Stage};

/// Observed data a fit tries to reproduce.
#[derive(Debug, Clone, PartialEq)]
pub enum FitTarget {
    Mean(DVector<f64>),
    Covariance(DMatrix<f64>),
}

impl FitTarget {
    pub fn kind(&self) -> FitTo {
        match self {
            FitTarget::Mean(_) => FitTo::Mean,
            FitTarget::Covariance(_) => FitTo::Covariance,
        }
    }

    /// Target taken from an already computed model.
    pub fn from_model(model: &mut ErpModel, fit_to: FitTo) -> Result<Self, ModelError> {
        Ok(match fit_to {
            FitTo::Mean => FitTarget::Mean(model.calculate_mean()?.clone()),
            FitTo::Covariance => FitTarget::Covariance(model.calculate_cov()?.clone()),
        })
    }

    fn check(&self, n_el: usize) -> Result<(), ModelError> {
        let ok = match self {
            FitTarget::Mean(m) => m.len() == n_el,
            FitTarget::Covariance(c) => c.nrows() == n_el && c.ncols() == n_el,
        };
        if ok {
            Ok(())
        } else {
            Err(ModelError::DimensionMismatch(format!(
                "{} target does not match {n_el} electrodes",
                match self.kind() {
                    FitTo::Mean => "mean",
                    FitTo::Covariance => "covariance",
                }
            )))
        }
    }
}

/// Options for `fit_variability_model`.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    /// Pass the bound table to the minimizer.
    pub bounded: bool,
    pub max_evaluations: usize,
    pub bounds: FitBounds,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            bounded: true,
            max_evaluations: 2000,
            bounds: FitBounds::default(),
        }
    }
}

/// Outcome of one fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    pub groups: Vec<ParameterGroup>,
    pub start_error: f64,
    pub end_error: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
    /// Best parameter vector, already written back into the model.
    pub parameters: Vec<f64>,
}

/// Residual norm of the model's current state against `target`.
///
/// Recomputes the mean or covariance only if it is stale.
pub fn current_error(target: &FitTarget, model: &mut ErpModel) -> Result<f64, ModelError> {
    target.check(model.n_el())?;
    match target {
        FitTarget::Mean(t) => {
            if model.freshness().get(Stage::Mean) == Freshness::Stale {
                model.calculate_mean()?;
            }
            let mean = model.mean().ok_or_else(|| missing(Stage::Mean))?;
            Ok((t - mean).norm())
        }
        FitTarget::Covariance(t) => {
            if model.freshness().get(Stage::Covariance) == Freshness::Stale {
                model.calculate_cov()?;
            }
            let cov = model.cov().ok_or_else(|| missing(Stage::Covariance))?;
            Ok((t - cov).norm())
        }
    }
}

fn missing(stage: Stage) -> ModelError {
    ModelError::DimensionMismatch(format!("{} has not been computed", stage.display_name()))
}

/// Euclidean distance between `target` and the model mean at `params`.
///
/// Mutates the model: `params` stay written into it afterwards.
pub fn error_mean(
    target: &DVector<f64>,
    model: &mut ErpModel,
    groups: &[ParameterGroup],
    params: &[f64],
) -> Result<f64, ModelError> {
    model.set_parameters(groups, params)?;
    let mean = model.calculate_mean()?;
    if mean.len() != target.len() {
        return Err(ModelError::DimensionMismatch(format!(
            "mean target has {} entries, model has {}",
            target.len(),
            mean.len()
        )));
    }
    Ok((target - mean).norm())
}

/// Frobenius distance between `target` and the model covariance at `params`.
///
/// Mutates the model: `params` stay written into it afterwards.
pub fn error_cov(
    target: &DMatrix<f64>,
    model: &mut ErpModel,
    groups: &[ParameterGroup],
    params: &[f64],
) -> Result<f64, ModelError> {
    model.set_parameters(groups, params)?;
    let cov = model.calculate_cov()?;
    if cov.shape() != target.shape() {
        return Err(ModelError::DimensionMismatch(format!(
            "covariance target is {:?}, model is {:?}",
            target.shape(),
            cov.shape()
        )));
    }
    Ok((target - cov).norm())
}

fn error_at(
    target: &FitTarget,
    model: &mut ErpModel,
    groups: &[ParameterGroup],
    params: &[f64],
) -> Result<f64, ModelError> {
    match target {
        FitTarget::Mean(t) => error_mean(t, model, groups, params),
        FitTarget::Covariance(t) => error_cov(t, model, groups, params),
    }
}

/// Fit the free `groups` of `model` to `target`.
///
/// The model's current values are the starting point. Candidates with invalid
/// geometry (a dipole on or outside the sphere) score `+inf` rather than ending
/// the fit. On success the best parameters are written back; on failure the
/// starting parameters are restored. Either way every stage (including simulated
/// data) is recomputed.
pub fn fit_variability_model<M, R>(
    model: &mut ErpModel,
    groups: &[ParameterGroup],
    target: &FitTarget,
    options: &FitOptions,
    minimizer: &M,
    rng: &mut R,
) -> Result<FitReport, ModelError>
where
    M: Minimizer + ?Sized,
    R: Rng + ?Sized,
{
    target.check(model.n_el())?;

    let initial = model.get_parameters(groups);
    let bounds = if options.bounded {
        Some(model.get_bounds(groups, &options.bounds))
    } else {
        None
    };

    let start_error = error_at(target, model, groups, &initial)?;
    info!(
        fit_to = ?target.kind(),
        n_params = initial.len(),
        start_error,
        bounded = options.bounded,
        "fit started"
    );

    let minimum = {
        let mut objective = |p: &[f64]| match error_at(target, model, groups, p) {
            Err(ModelError::InvalidGenerator { index, reason }) => {
                debug!(index, %reason, "candidate rejected");
                Ok(f64::INFINITY)
            }
            other => other,
        };
        minimizer.minimize(&mut objective, &initial, bounds.as_deref(), options.max_evaluations)
    };
    let minimum = match minimum {
        Ok(minimum) => minimum,
        Err(err) => {
            model.set_parameters(groups, &initial)?;
            model.recalculate_model(rng)?;
            return Err(err);
        }
    };
    model.set_parameters(groups, &minimum.x)?;
    model.recalculate_model(rng)?;
    let end_error = current_error(target, model)?;

    info!(
        start_error,
        end_error,
        termination = %minimum.termination,
        "fit finished"
    );

    Ok(FitReport {
        groups: groups.to_vec(),
        start_error,
        end_error,
        iterations: minimum.iterations,
        evaluations: minimum.evaluations,
        termination: minimum.termination,
        parameters: minimum.x,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    use std::sync::Arc;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::domain::{ConnectionKind, Generator, VariabilityKind, VariabilitySelection};
    use crate::electrodes::ElectrodeSet;
    use crate::domain::Bound;
    use crate::fit::optimizer::{Minimum, NelderMead, Objective};
    use crate::forward::HEAD_RADIUS_CM;
    use crate::model::{Covariance, Variance};

    fn selection() -> VariabilitySelection {
        VariabilitySelection::new(
            VariabilityKind::Constant,
            VariabilityKind::Individual,
            ConnectionKind::Individual,
        )
    }

    fn two_generators() -> Vec<Generator> {
        vec![
            Generator {
                depth: 6.0,
                magnitude: 0.0,
                ..Generator::default()
            },
            Generator {
                depth: 7.0,
                theta: 3.0 * PI / 8.0,
                phi: 3.0 * PI / 4.0,
                orientation: PI / 4.0,
                orientation_phi: 3.0 * PI / 4.0,
                magnitude: 0.0,
            },
        ]
    }

    fn target_model(rng: &mut StdRng) -> ErpModel {
        let mut model = ErpModel::new(20, 2, selection(), Arc::new(ElectrodeSet::standard_10_20()));
        model.set_generators(two_generators()).unwrap();
        model.set_random_magnitudes(rng);
        model.set_sigma_e(Variance::Constant(1.0)).unwrap();
        model.set_sigma_g(Variance::Individual(vec![1e5, 1e5])).unwrap();
        let mut c = DMatrix::zeros(2, 2);
        c[(0, 1)] = 5e4;
        model.set_sigma_c(Covariance::from_upper(c).unwrap()).unwrap();
        model.recalculate_model(rng).unwrap();
        model
    }

    #[test]
    fn error_functions_match_direct_norms() {
        let mut rng = StdRng::seed_from_u64(30);
        let mut target = target_model(&mut rng);
        let mean = target.mean().unwrap().clone();
        let cov = target.cov().unwrap().clone();

        let mut model = ErpModel::new(20, 2, selection(), Arc::new(ElectrodeSet::standard_10_20()));
        model.set_random(&mut rng);
        model.recalculate_model(&mut rng).unwrap();
        let groups = [ParameterGroup::Amplitudes];
        let params = model.get_parameters(&groups);

        let e = error_mean(&mean, &mut model, &groups, &params).unwrap();
        let direct = (&mean - model.mean().unwrap()).norm();
        assert_eq!(e, direct);

        let e = error_cov(&cov, &mut model, &groups, &params).unwrap();
        let direct = (&cov - model.cov().unwrap()).norm();
        assert_eq!(e, direct);

        // A model compared with itself has zero error.
        let groups = [ParameterGroup::GeneratorVariance];
        let params = target.get_parameters(&groups);
        assert_eq!(error_cov(&cov, &mut target, &groups, &params).unwrap(), 0.0);
    }

    #[test]
    fn error_functions_reject_wrong_arity() {
        let mut rng = StdRng::seed_from_u64(31);
        let mut model = target_model(&mut rng);
        let mean = model.mean().unwrap().clone();
        let err = error_mean(&mean, &mut model, &[ParameterGroup::Amplitudes], &[1.0]);
        assert_eq!(err, Err(ModelError::ArityMismatch { expected: 2, got: 1 }));
    }

    #[test]
    fn target_of_wrong_size_is_rejected_before_fitting() {
        let mut rng = StdRng::seed_from_u64(32);
        let mut model = target_model(&mut rng);
        let target = FitTarget::Mean(DVector::zeros(3));
        let err = fit_variability_model(
            &mut model,
            &[ParameterGroup::Amplitudes],
            &target,
            &FitOptions::default(),
            &NelderMead::default(),
            &mut rng,
        );
        assert!(matches!(err, Err(ModelError::DimensionMismatch(_))));
    }

    #[test]
    fn covariance_fit_reduces_error() {
        let mut rng = StdRng::seed_from_u64(33);
        let mut source = target_model(&mut rng);
        let target = FitTarget::from_model(&mut source, FitTo::Covariance).unwrap();

        let mut model = ErpModel::new(20, 2, selection(), Arc::new(ElectrodeSet::standard_10_20()));
        model.set_random(&mut rng);
        model.set_generators(two_generators()).unwrap();

        let groups = [
            ParameterGroup::GeneratorVariance,
            ParameterGroup::GeneratorCovariance,
            ParameterGroup::ElectrodeVariance,
        ];
        let options = FitOptions {
            bounded: false,
            max_evaluations: 2000,
            ..FitOptions::default()
        };
        let report =
            fit_variability_model(&mut model, &groups, &target, &options, &NelderMead::default(), &mut rng)
                .unwrap();

        assert!(report.end_error < report.start_error, "{report:?}");
        assert_eq!(report.parameters.len(), 4);
        assert_eq!(model.get_parameters(&groups), report.parameters);
        assert!(model.freshness().all_fresh());
        assert!(model.data().is_some());
    }

    #[test]
    fn amplitude_fit_recovers_mean() {
        let mut rng = StdRng::seed_from_u64(34);
        let mut source = target_model(&mut rng);
        let target = FitTarget::from_model(&mut source, FitTo::Mean).unwrap();

        let mut model = ErpModel::new(20, 2, selection(), Arc::new(ElectrodeSet::standard_10_20()));
        model.set_generators(two_generators()).unwrap();
        model
            .set_parameters(&[ParameterGroup::Amplitudes], &[100.0, 100.0])
            .unwrap();

        let report = fit_variability_model(
            &mut model,
            &[ParameterGroup::Amplitudes],
            &target,
            &FitOptions::default(),
            &NelderMead::default(),
            &mut rng,
        )
        .unwrap();

        assert!(report.end_error < 0.01 * report.start_error, "{report:?}");
        assert!(model.generators().iter().all(|g| g.magnitude >= 0.0));
    }

    #[test]
    fn bounded_fit_keeps_locations_in_range() {
        let mut rng = StdRng::seed_from_u64(35);
        let mut source = target_model(&mut rng);
        let target = FitTarget::from_model(&mut source, FitTo::Mean).unwrap();

        let mut model = ErpModel::new(20, 2, selection(), Arc::new(ElectrodeSet::standard_10_20()));
        model.set_random(&mut rng);
        let options = FitOptions {
            max_evaluations: 300,
            ..FitOptions::default()
        };
        let groups = [ParameterGroup::LocationsAndOrientations];
        let report =
            fit_variability_model(&mut model, &groups, &target, &options, &NelderMead::default(), &mut rng)
                .unwrap();

        assert!(report.end_error <= report.start_error);
        let bounds = model.get_bounds(&groups, &options.bounds);
        for (v, b) in report.parameters.iter().zip(&bounds) {
            assert_eq!(b.clamp(*v), *v);
        }
    }

    #[test]
    fn unbounded_location_fit_survives_invalid_depths() {
        for seed in 0..5 {
            let mut rng = StdRng::seed_from_u64(400 + seed);
            let mut source = ErpModel::new(20, 2, selection(), Arc::new(ElectrodeSet::standard_10_20()));
            source.set_random(&mut rng);
            let target = FitTarget::from_model(&mut source, FitTo::Mean).unwrap();

            let mut model = source.clone();
            model.set_random_locations_orientations(&mut rng);
            let options = FitOptions {
                bounded: false,
                max_evaluations: 600,
                ..FitOptions::default()
            };
            let groups = [ParameterGroup::LocationsAndOrientations];
            let report =
                fit_variability_model(&mut model, &groups, &target, &options, &NelderMead::default(), &mut rng)
                    .unwrap();

            assert!(report.end_error.is_finite(), "seed {seed}: {report:?}");
            assert!(report.end_error <= report.start_error, "seed {seed}: {report:?}");
            assert!(model.freshness().all_fresh(), "seed {seed}");
            assert!(model.data().is_some());
            for g in model.generators() {
                assert!(g.depth > 0.0 && g.depth < HEAD_RADIUS_CM, "seed {seed}: {g:?}");
            }
        }
    }

    /// Evaluates one shifted point, then gives up.
    struct GivesUp;

    impl Minimizer for GivesUp {
        fn minimize(
            &self,
            objective: &mut Objective<'_>,
            initial: &[f64],
            _bounds: Option<&[Bound]>,
            _max_evaluations: usize,
        ) -> Result<Minimum, ModelError> {
            let shifted: Vec<f64> = initial.iter().map(|v| v * 2.0).collect();
            objective(&shifted)?;
            Err(ModelError::Minimizer("gave up".to_string()))
        }
    }

    #[test]
    fn failed_fit_restores_start_and_recomputes() {
        let mut rng = StdRng::seed_from_u64(36);
        let mut model = target_model(&mut rng);
        let target = FitTarget::from_model(&mut model, FitTo::Covariance).unwrap();
        let groups = [ParameterGroup::GeneratorVariance];
        let start = model.get_parameters(&groups);

        let err = fit_variability_model(&mut model, &groups, &target, &FitOptions::default(), &GivesUp, &mut rng);

        assert_eq!(err, Err(ModelError::Minimizer("gave up".to_string())));
        assert_eq!(model.get_parameters(&groups), start);
        assert!(model.freshness().all_fresh());
        assert_eq!(current_error(&target, &mut model).unwrap(), 0.0);
    }
}
