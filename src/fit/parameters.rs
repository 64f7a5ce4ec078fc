//! Flattening model parameters into an optimizer vector and back.
//!
//! A caller names an ordered list of `ParameterGroup`s. Each group expands to a
//! list of `Slot`s (one per scalar) given the model's shape and variability
//! selectors. `get_parameters`, `set_parameters` and `get_bounds` all walk the
//! same slot list, so ordering and arity cannot drift apart between them.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{Bound, ConnectionKind, FitBounds, Generator, VariabilityKind};
use crate::error::ModelError;
use crate::model::{Covariance, ErpModel, Variance};

/// A named group of free model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ParameterGroup {
    /// Five values per generator: depth, orientation, orientation_phi, phi, theta.
    LocationsAndOrientations,
    /// One magnitude per generator.
    Amplitudes,
    /// Generator variance in whatever shape the selector uses (1 or n_gen values).
    GeneratorVariance,
    /// Per-generator variances; empty unless generator variability is `individual`.
    GeneratorVarianceIndividual,
    /// Upper-triangle generator covariances; empty unless connections are `individual`.
    GeneratorCovariance,
    /// Same values as `GeneratorCovariance`, named for symmetry with the variance groups.
    GeneratorCovarianceIndividual,
    /// Electrode variance in whatever shape the selector uses (1 or n_el values).
    ElectrodeVariance,
}

impl ParameterGroup {
    pub const ALL: [ParameterGroup; 7] = [
        ParameterGroup::LocationsAndOrientations,
        ParameterGroup::Amplitudes,
        ParameterGroup::GeneratorVariance,
        ParameterGroup::GeneratorVarianceIndividual,
        ParameterGroup::GeneratorCovariance,
        ParameterGroup::GeneratorCovarianceIndividual,
        ParameterGroup::ElectrodeVariance,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            ParameterGroup::LocationsAndOrientations => "locations and orientations",
            ParameterGroup::Amplitudes => "amplitudes",
            ParameterGroup::GeneratorVariance => "generator variance",
            ParameterGroup::GeneratorVarianceIndividual => "generator variance individual",
            ParameterGroup::GeneratorCovariance => "generator covariance",
            ParameterGroup::GeneratorCovarianceIndividual => "generator covariance individual",
            ParameterGroup::ElectrodeVariance => "electrode variance",
        }
    }

    /// Scalar slots this group contributes for a model of the given shape.
    pub fn slots(self, shape: &ModelShape) -> Vec<Slot> {
        let n_gen = shape.n_gen;
        match self {
            ParameterGroup::LocationsAndOrientations => (0..n_gen)
                .flat_map(|g| {
                    [
                        Slot::Depth(g),
                        Slot::Orientation(g),
                        Slot::OrientationPhi(g),
                        Slot::Phi(g),
                        Slot::Theta(g),
                    ]
                })
                .collect(),
            ParameterGroup::Amplitudes => (0..n_gen).map(Slot::Magnitude).collect(),
            ParameterGroup::GeneratorVariance => match shape.generators {
                VariabilityKind::None => Vec::new(),
                VariabilityKind::Constant => vec![Slot::GeneratorVariance(None)],
                VariabilityKind::Individual => (0..n_gen).map(|g| Slot::GeneratorVariance(Some(g))).collect(),
            },
            ParameterGroup::GeneratorVarianceIndividual => match shape.generators {
                VariabilityKind::Individual => (0..n_gen).map(|g| Slot::GeneratorVariance(Some(g))).collect(),
                _ => Vec::new(),
            },
            ParameterGroup::GeneratorCovariance | ParameterGroup::GeneratorCovarianceIndividual => {
                match shape.connections {
                    ConnectionKind::None => Vec::new(),
                    ConnectionKind::Individual => (0..n_gen)
                        .flat_map(|row| ((row + 1)..n_gen).map(move |col| Slot::GeneratorCovariance(row, col)))
                        .collect(),
                }
            }
            ParameterGroup::ElectrodeVariance => match shape.electrodes {
                VariabilityKind::None => Vec::new(),
                VariabilityKind::Constant => vec![Slot::ElectrodeVariance(None)],
                VariabilityKind::Individual => {
                    (0..shape.n_el).map(|e| Slot::ElectrodeVariance(Some(e))).collect()
                }
            },
        }
    }

    /// Number of scalars this group contributes.
    pub fn arity(self, shape: &ModelShape) -> usize {
        self.slots(shape).len()
    }
}

impl fmt::Display for ParameterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ParameterGroup {
    type Err = ModelError;

    /// Accepts the display names with spaces, underscores or hyphens as separators.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| if c == '_' || c == '-' { ' ' } else { c.to_ascii_lowercase() })
            .collect();
        ParameterGroup::ALL
            .into_iter()
            .find(|g| g.display_name() == normalized)
            .ok_or_else(|| ModelError::InvalidArgument(format!("unknown parameter group '{s}'")))
    }
}

/// The parts of a model that decide how groups expand into slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelShape {
    pub n_gen: usize,
    pub n_el: usize,
    pub electrodes: VariabilityKind,
    pub generators: VariabilityKind,
    pub connections: ConnectionKind,
}

impl ModelShape {
    pub fn of(model: &ErpModel) -> Self {
        let v = model.variability();
        Self {
            n_gen: model.n_gen(),
            n_el: model.n_el(),
            electrodes: v.electrodes,
            generators: v.generators,
            connections: v.connections,
        }
    }
}

/// One scalar position in a flattened parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Depth(usize),
    Orientation(usize),
    OrientationPhi(usize),
    Phi(usize),
    Theta(usize),
    Magnitude(usize),
    /// `None` is the shared (constant) variance.
    GeneratorVariance(Option<usize>),
    GeneratorCovariance(usize, usize),
    /// `None` is the shared (constant) variance.
    ElectrodeVariance(Option<usize>),
}

impl Slot {
    fn bound(self, table: &FitBounds) -> Bound {
        match self {
            Slot::Depth(_) => table.depth,
            Slot::Orientation(_) => table.orientation,
            Slot::OrientationPhi(_) => table.orientation_phi,
            Slot::Phi(_) => table.phi,
            Slot::Theta(_) => table.theta,
            Slot::Magnitude(_) => table.magnitude,
            Slot::GeneratorVariance(_) => table.generator_variance,
            Slot::GeneratorCovariance(_, _) => table.generator_covariance,
            Slot::ElectrodeVariance(_) => table.electrode_variance,
        }
    }

    fn generator_index(self) -> Option<usize> {
        match self {
            Slot::Depth(g)
            | Slot::Orientation(g)
            | Slot::OrientationPhi(g)
            | Slot::Phi(g)
            | Slot::Theta(g)
            | Slot::Magnitude(g) => Some(g),
            _ => None,
        }
    }

    fn read(self, model: &ErpModel) -> f64 {
        let generator = |g: usize| model.generators().get(g).copied().unwrap_or_default();
        match self {
            Slot::Depth(g) => generator(g).depth,
            Slot::Orientation(g) => generator(g).orientation,
            Slot::OrientationPhi(g) => generator(g).orientation_phi,
            Slot::Phi(g) => generator(g).phi,
            Slot::Theta(g) => generator(g).theta,
            Slot::Magnitude(g) => generator(g).magnitude,
            Slot::GeneratorVariance(i) => model.sigma_g().value_at(i.unwrap_or(0)),
            Slot::GeneratorCovariance(row, col) => model.sigma_c().value_at(row, col),
            Slot::ElectrodeVariance(i) => model.sigma_e().value_at(i.unwrap_or(0)),
        }
    }

    /// Fails if `value` cannot be written without breaking a model invariant.
    fn check(self, model: &ErpModel, value: f64) -> Result<(), ModelError> {
        match self {
            Slot::Depth(g) => {
                let radius = model.head().radius;
                if value.is_finite() && value > 0.0 && value < radius {
                    Ok(())
                } else {
                    Err(ModelError::InvalidGenerator {
                        index: g,
                        reason: format!("depth {value} must lie in (0, {radius})"),
                    })
                }
            }
            Slot::GeneratorVariance(i) => variance_accepts(model.sigma_g(), i, "generator"),
            Slot::ElectrodeVariance(i) => variance_accepts(model.sigma_e(), i, "electrode"),
            Slot::GeneratorCovariance(_, _) => match model.sigma_c() {
                Covariance::Individual(_) => Ok(()),
                Covariance::None => Err(ModelError::VariabilityMismatch(
                    "generator covariance is none and takes no values".to_string(),
                )),
            },
            _ => Ok(()),
        }
    }

    fn write(self, model: &mut ErpModel, value: f64) -> Result<(), ModelError> {
        match self {
            Slot::Depth(g) => model.generators_mut()[g].depth = value,
            Slot::Orientation(g) => model.generators_mut()[g].orientation = value,
            Slot::OrientationPhi(g) => model.generators_mut()[g].orientation_phi = value,
            Slot::Phi(g) => model.generators_mut()[g].phi = value,
            Slot::Theta(g) => model.generators_mut()[g].theta = value,
            Slot::Magnitude(g) => model.generators_mut()[g].magnitude = value,
            Slot::GeneratorVariance(i) => write_variance(model.sigma_g_mut(), i, value, "generator")?,
            Slot::GeneratorCovariance(row, col) => {
                self.check(model, value)?;
                model.sigma_c_mut().set_pair(row, col, value);
            }
            Slot::ElectrodeVariance(i) => write_variance(model.sigma_e_mut(), i, value, "electrode")?,
        }
        Ok(())
    }
}

fn variance_mismatch(target: &Variance, index: Option<usize>, what: &str) -> ModelError {
    let slot = match index {
        Some(i) => format!("individual value {i}"),
        None => "a shared value".to_string(),
    };
    ModelError::VariabilityMismatch(format!(
        "{what} variance is {} and cannot take {slot}",
        target.kind().name()
    ))
}

fn variance_accepts(target: &Variance, index: Option<usize>, what: &str) -> Result<(), ModelError> {
    match (target, index) {
        (Variance::Constant(_), None) | (Variance::Individual(_), Some(_)) => Ok(()),
        _ => Err(variance_mismatch(target, index, what)),
    }
}

fn write_variance(target: &mut Variance, index: Option<usize>, value: f64, what: &str) -> Result<(), ModelError> {
    match (target, index) {
        (Variance::Constant(v), None) => *v = value,
        (Variance::Individual(values), Some(i)) => {
            if i >= values.len() {
                values.resize(i + 1, 0.0);
            }
            values[i] = value;
        }
        (other, _) => return Err(variance_mismatch(other, index, what)),
    }
    Ok(())
}

/// Flattened slot list for `groups`, in group order.
pub fn parameter_slots(model: &ErpModel, groups: &[ParameterGroup]) -> Vec<Slot> {
    let shape = ModelShape::of(model);
    groups.iter().flat_map(|g| g.slots(&shape)).collect()
}

/// Read/write access to a model's free parameters as a flat vector.
pub trait Parameterized {
    /// Current values of `groups`, flattened in group order.
    fn get_parameters(&self, groups: &[ParameterGroup]) -> Vec<f64>;

    /// Write a flat vector back; the exact inverse of `get_parameters`.
    ///
    /// Invalidates every cached stage. Fails without touching the model if the
    /// vector length disagrees with the groups or a generator would leave the head.
    fn set_parameters(&mut self, groups: &[ParameterGroup], values: &[f64]) -> Result<(), ModelError>;

    /// One bound per scalar, same order and arity as `get_parameters`.
    fn get_bounds(&self, groups: &[ParameterGroup], table: &FitBounds) -> Vec<Bound>;

    /// Re-randomize only the named groups.
    fn set_random_parameters<R: Rng + ?Sized>(&mut self, groups: &[ParameterGroup], rng: &mut R);
}

impl Parameterized for ErpModel {
    fn get_parameters(&self, groups: &[ParameterGroup]) -> Vec<f64> {
        parameter_slots(self, groups)
            .into_iter()
            .map(|slot| slot.read(self))
            .collect()
    }

    fn set_parameters(&mut self, groups: &[ParameterGroup], values: &[f64]) -> Result<(), ModelError> {
        let slots = parameter_slots(self, groups);
        if slots.len() != values.len() {
            return Err(ModelError::ArityMismatch {
                expected: slots.len(),
                got: values.len(),
            });
        }

        for (slot, &value) in slots.iter().zip(values) {
            slot.check(self, value)?;
        }

        let n_gen = self.n_gen();
        if slots.iter().any(|s| s.generator_index().is_some()) && self.generators().len() != n_gen {
            self.generators_mut().resize(n_gen, Generator::default());
        }
        for (slot, &value) in slots.iter().zip(values) {
            slot.write(self, value)?;
        }
        self.invalidate_all();
        Ok(())
    }

    fn get_bounds(&self, groups: &[ParameterGroup], table: &FitBounds) -> Vec<Bound> {
        parameter_slots(self, groups)
            .into_iter()
            .map(|slot| slot.bound(table))
            .collect()
    }

    fn set_random_parameters<R: Rng + ?Sized>(&mut self, groups: &[ParameterGroup], rng: &mut R) {
        for group in groups {
            match group {
                ParameterGroup::LocationsAndOrientations => self.set_random_locations_orientations(rng),
                ParameterGroup::Amplitudes => self.set_random_magnitudes(rng),
                ParameterGroup::GeneratorVariance | ParameterGroup::GeneratorVarianceIndividual => {
                    self.set_random_variability_generators(rng)
                }
                ParameterGroup::GeneratorCovariance | ParameterGroup::GeneratorCovarianceIndividual => {
                    self.set_random_variability_connections(rng)
                }
                ParameterGroup::ElectrodeVariance => self.set_random_variability_electrodes(rng),
            }
        }
    }
}
