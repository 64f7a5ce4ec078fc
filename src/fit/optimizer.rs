//! Derivative-free bounded minimization.
//!
//! The fitter only needs "minimize this scalar function of a flat vector,
//! optionally inside a box". `Minimizer` is that seam; `NelderMead` drives the
//! `argmin` simplex solver behind it.
//!
//! Bounds are handled by projection: every trial point is clamped into the box
//! before it is evaluated, and fixed dimensions (`low == high`) never get a
//! simplex edge.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use argmin::core::observers::{Observe, ObserverMode};
use argmin::core::{CostFunction, Error as ArgminError, Executor, KV, State, TerminationReason};
use argmin::solver::neldermead::NelderMead as SimplexSolver;
use serde::Serialize;

use crate::domain::Bound;
use crate::error::ModelError;

/// Objective evaluated by a `Minimizer`.
pub type Objective<'a> = dyn FnMut(&[f64]) -> Result<f64, ModelError> + 'a;

/// Why a minimization stopped.
///
/// Codes follow the conventional truncated-Newton return codes so reports stay
/// comparable with other bounded optimizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Termination {
    /// Function values across the simplex agree within tolerance.
    ConvergedF,
    /// Evaluation budget exhausted.
    MaxEvaluations,
    /// Nothing to optimize: zero free dimensions.
    AllFixed,
    /// The solver stopped for any other reason.
    NoProgress,
}

impl Termination {
    pub fn code(self) -> i32 {
        match self {
            Termination::ConvergedF => 1,
            Termination::MaxEvaluations => 3,
            Termination::AllFixed => 5,
            Termination::NoProgress => 6,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Termination::ConvergedF => "Converged (|f_n-f_(n-1)| ~= 0)",
            Termination::MaxEvaluations => "Max. number of function evaluations reached",
            Termination::AllFixed => "All lower bounds are equal to the upper bounds",
            Termination::NoProgress => "Unable to progress",
        }
    }

    pub fn converged(self) -> bool {
        matches!(self, Termination::ConvergedF | Termination::AllFixed)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

/// Result of one minimization run.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
}

pub trait Minimizer {
    /// Minimize `objective` starting from `initial`.
    ///
    /// `bounds`, when given, must have one entry per dimension. Errors from the
    /// objective abort the run and are returned unchanged.
    fn minimize(
        &self,
        objective: &mut Objective<'_>,
        initial: &[f64],
        bounds: Option<&[Bound]>,
        max_evaluations: usize,
    ) -> Result<Minimum, ModelError>;
}

/// Nelder–Mead simplex search with box projection.
///
/// Coefficients map onto `argmin`'s `alpha`, `gamma`, `rho` and `sigma`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NelderMead {
    pub reflection: f64,
    pub expansion: f64,
    pub contraction: f64,
    pub shrink: f64,
    /// Standard deviation of the simplex function values at which the search stops.
    pub sd_tolerance: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            reflection: 1.0,
            expansion: 2.0,
            contraction: 0.5,
            shrink: 0.5,
            sd_tolerance: 1e-10,
        }
    }
}

/// Evaluation bookkeeping shared between the cost function and the caller.
struct Evaluations<'o, 'a> {
    objective: &'o mut Objective<'a>,
    bounds: Option<&'o [Bound]>,
    used: usize,
    max: usize,
    best: Option<(Vec<f64>, f64)>,
    failure: Option<ModelError>,
}

impl Evaluations<'_, '_> {
    fn exhausted(&self) -> bool {
        self.used >= self.max
    }

    fn eval(&mut self, x: &[f64]) -> Result<f64, ModelError> {
        let mut x = x.to_vec();
        project(&mut x, self.bounds);
        self.used += 1;
        let f = (self.objective)(&x)?;
        // A degenerate geometry may produce NaN; rank it last.
        let f = if f.is_nan() { f64::INFINITY } else { f };
        if self.best.as_ref().is_none_or(|(_, best)| f < *best) {
            self.best = Some((x, f));
        }
        Ok(f)
    }
}

/// `argmin` problem wrapping the objective.
struct Projected<'e, 'o, 'a> {
    evaluations: &'e RefCell<Evaluations<'o, 'a>>,
}

impl CostFunction for Projected<'_, '_, '_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, ArgminError> {
        let mut evaluations = self.evaluations.borrow_mut();
        if evaluations.exhausted() {
            return Err(ArgminError::msg("evaluation budget exhausted"));
        }
        evaluations.eval(x).map_err(|err| {
            let message = err.to_string();
            evaluations.failure = Some(err);
            ArgminError::msg(message)
        })
    }
}

/// Counts completed solver iterations.
struct IterationCounter(Arc<AtomicUsize>);

impl<I> Observe<I> for IterationCounter {
    fn observe_iter(&mut self, _state: &I, _kv: &KV) -> Result<(), ArgminError> {
        self.0.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn project(x: &mut [f64], bounds: Option<&[Bound]>) {
    if let Some(bounds) = bounds {
        for (v, b) in x.iter_mut().zip(bounds) {
            *v = b.clamp(*v);
        }
    }
}

fn check_bounds(bounds: &[Bound], n: usize) -> Result<(), ModelError> {
    if bounds.len() != n {
        return Err(ModelError::ArityMismatch {
            expected: n,
            got: bounds.len(),
        });
    }
    for (index, b) in bounds.iter().enumerate() {
        if let (Some(low), Some(high)) = (b.low, b.high) {
            if low > high {
                return Err(ModelError::InfeasibleBounds { index, low, high });
            }
        }
    }
    Ok(())
}

fn solver_error(err: ArgminError) -> ModelError {
    ModelError::Minimizer(err.to_string())
}

impl NelderMead {
    fn initial_simplex(&self, x0: &[f64], bounds: Option<&[Bound]>) -> Vec<Vec<f64>> {
        let mut simplex = vec![x0.to_vec()];
        for i in 0..x0.len() {
            let bound = bounds.map(|b| b[i]).unwrap_or(Bound::OPEN);
            if bound.is_fixed() {
                continue;
            }
            let step = if x0[i] != 0.0 { 0.05 * x0[i].abs() } else { 0.00025 };
            let mut vertex = x0.to_vec();
            vertex[i] = bound.clamp(x0[i] + step);
            if vertex[i] == x0[i] {
                vertex[i] = bound.clamp(x0[i] - step);
            }
            simplex.push(vertex);
        }
        simplex
    }

    fn solver(&self, simplex: Vec<Vec<f64>>) -> Result<SimplexSolver<Vec<f64>, f64>, ModelError> {
        SimplexSolver::new(simplex)
            .with_alpha(self.reflection)
            .and_then(|s| s.with_gamma(self.expansion))
            .and_then(|s| s.with_rho(self.contraction))
            .and_then(|s| s.with_sigma(self.shrink))
            .and_then(|s| s.with_sd_tolerance(self.sd_tolerance))
            .map_err(|err| ModelError::InvalidArgument(format!("Nelder-Mead coefficients: {err}")))
    }
}

impl Minimizer for NelderMead {
    fn minimize(
        &self,
        objective: &mut Objective<'_>,
        initial: &[f64],
        bounds: Option<&[Bound]>,
        max_evaluations: usize,
    ) -> Result<Minimum, ModelError> {
        if let Some(b) = bounds {
            check_bounds(b, initial.len())?;
        }
        let mut x0 = initial.to_vec();
        project(&mut x0, bounds);

        let evaluations = RefCell::new(Evaluations {
            objective,
            bounds,
            used: 0,
            max: max_evaluations.max(1),
            best: None,
            failure: None,
        });

        let simplex = self.initial_simplex(&x0, bounds);
        if simplex.len() == 1 {
            let value = evaluations.borrow_mut().eval(&x0)?;
            return Ok(Minimum {
                x: x0,
                value,
                iterations: 0,
                evaluations: evaluations.borrow().used,
                termination: Termination::AllFixed,
            });
        }

        let solver = self.solver(simplex)?;
        let iterations = Arc::new(AtomicUsize::new(0));
        let outcome = Executor::new(Projected { evaluations: &evaluations }, solver)
            .configure(|state| state.max_iters(max_evaluations as u64))
            .add_observer(IterationCounter(Arc::clone(&iterations)), ObserverMode::Always)
            .run()
            .map(|result| match result.state().get_termination_reason() {
                Some(TerminationReason::SolverConverged) => Termination::ConvergedF,
                Some(TerminationReason::MaxItersReached) => Termination::MaxEvaluations,
                _ => Termination::NoProgress,
            });

        let Evaluations { used, best, failure, .. } = evaluations.into_inner();
        let termination = match outcome {
            Ok(termination) => termination,
            Err(err) => match failure {
                Some(failure) => return Err(failure),
                None if used >= max_evaluations.max(1) => Termination::MaxEvaluations,
                None => return Err(solver_error(err)),
            },
        };

        let (x, value) = best.ok_or_else(|| ModelError::Minimizer("no point was evaluated".to_string()))?;
        Ok(Minimum {
            x,
            value,
            iterations: iterations.load(Ordering::Relaxed),
            evaluations: used,
            termination,
        })
    }
}
