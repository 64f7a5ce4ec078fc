//! Shared domain types.
//!
//! These types are kept small and serializable so they can be:
//!
//! - used in-memory by the forward model and the fitter
//! - read from / written to JSON (generator configurations, fixtures, exports)
//! - selected from the command line

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// A single dipolar current generator.
///
/// Location is `(depth, theta, phi)`: `depth` is measured inward from the head
/// surface, the angles are ordinary spherical angles in the head frame.
/// Orientation is `(orientation, orientation_phi)` expressed in the dipole's local
/// frame, whose z-axis is the radial direction at the dipole.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub depth: f64,
    pub theta: f64,
    pub phi: f64,
    pub orientation: f64,
    pub orientation_phi: f64,
    #[serde(default)]
    pub magnitude: f64,
}

impl Generator {
    /// Check that the dipole lies strictly inside a sphere of the given radius.
    pub fn validate(&self, index: usize, radius: f64) -> Result<(), ModelError> {
        let fields = [
            self.depth,
            self.theta,
            self.phi,
            self.orientation,
            self.orientation_phi,
            self.magnitude,
        ];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::InvalidGenerator {
                index,
                reason: "all fields must be finite".to_string(),
            });
        }
        if !(self.depth > 0.0 && self.depth < radius) {
            return Err(ModelError::InvalidGenerator {
                index,
                reason: format!("depth {} must lie in (0, {radius})", self.depth),
            });
        }
        Ok(())
    }
}

impl Default for Generator {
    fn default() -> Self {
        Self {
            depth: 6.0,
            theta: 0.0,
            phi: 0.0,
            orientation: 0.0,
            orientation_phi: 0.0,
            magnitude: 0.0,
        }
    }
}

/// Variability selector for electrodes and generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VariabilityKind {
    /// No variance at all.
    None,
    /// One variance shared by every entity.
    Constant,
    /// One variance per entity.
    Individual,
}

impl VariabilityKind {
    pub fn name(self) -> &'static str {
        match self {
            VariabilityKind::None => "none",
            VariabilityKind::Constant => "constant",
            VariabilityKind::Individual => "individual",
        }
    }
}

impl FromStr for VariabilityKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(VariabilityKind::None),
            "constant" => Ok(VariabilityKind::Constant),
            "individual" => Ok(VariabilityKind::Individual),
            other => Err(ModelError::InvalidArgument(format!(
                "unknown variability type '{other}' (expected none, constant or individual)"
            ))),
        }
    }
}

impl fmt::Display for VariabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Variability selector for inter-generator connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    None,
    Individual,
}

impl ConnectionKind {
    pub fn name(self) -> &'static str {
        match self {
            ConnectionKind::None => "none",
            ConnectionKind::Individual => "individual",
        }
    }
}

impl FromStr for ConnectionKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ConnectionKind::None),
            "individual" => Ok(ConnectionKind::Individual),
            other => Err(ModelError::InvalidArgument(format!(
                "unknown connection variability type '{other}' (expected none or individual)"
            ))),
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The three variability selectors of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariabilitySelection {
    pub electrodes: VariabilityKind,
    pub generators: VariabilityKind,
    pub connections: ConnectionKind,
}

impl VariabilitySelection {
    pub fn new(
        electrodes: VariabilityKind,
        generators: VariabilityKind,
        connections: ConnectionKind,
    ) -> Self {
        Self {
            electrodes,
            generators,
            connections,
        }
    }

    /// Parse the three selectors from their textual names.
    ///
    /// Fails on the first unrecognized value.
    pub fn parse(electrodes: &str, generators: &str, connections: &str) -> Result<Self, ModelError> {
        Ok(Self {
            electrodes: electrodes.parse()?,
            generators: generators.parse()?,
            connections: connections.parse()?,
        })
    }
}

impl Default for VariabilitySelection {
    fn default() -> Self {
        Self::new(VariabilityKind::None, VariabilityKind::None, ConnectionKind::None)
    }
}

/// Closed interval `[low, high]` used for uniform randomization.
pub type Range = (f64, f64);

/// Ranges used when randomizing model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelLimits {
    /// Roughly the cortex.
    pub depth: Range,
    pub theta: Range,
    pub phi: Range,
    pub orientation: Range,
    pub orientation_phi: Range,
    pub magnitude: Range,
    pub generator_variance: Range,
    pub electrode_variance: Range,
}

impl Default for ModelLimits {
    fn default() -> Self {
        Self {
            depth: (4.49, 7.05),
            theta: (0.0, PI / 2.0),
            phi: (0.0, 2.0 * PI),
            orientation: (0.0, PI / 2.0),
            orientation_phi: (0.0, 2.0 * PI),
            magnitude: (0.0, 1000.0),
            generator_variance: (0.0, 1_000_000.0),
            electrode_variance: (0.0, 20.0),
        }
    }
}

/// Optional lower/upper bound for one optimizer dimension.
///
/// `None` on either side means "unbounded" on that side.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bound {
    pub low: Option<f64>,
    pub high: Option<f64>,
}

impl Bound {
    pub const OPEN: Bound = Bound {
        low: None,
        high: None,
    };

    pub fn closed(low: f64, high: f64) -> Self {
        Self {
            low: Some(low),
            high: Some(high),
        }
    }

    pub fn at_least(low: f64) -> Self {
        Self {
            low: Some(low),
            high: None,
        }
    }

    /// Project `value` into the bound.
    pub fn clamp(&self, value: f64) -> f64 {
        let mut v = value;
        if let Some(lo) = self.low {
            v = v.max(lo);
        }
        if let Some(hi) = self.high {
            v = v.min(hi);
        }
        v
    }

    pub fn is_fixed(&self) -> bool {
        matches!((self.low, self.high), (Some(lo), Some(hi)) if lo == hi)
    }
}

/// Bound table used by the fitting layer, one entry per kind of scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitBounds {
    pub magnitude: Bound,
    pub depth: Bound,
    pub theta: Bound,
    pub phi: Bound,
    pub orientation: Bound,
    pub orientation_phi: Bound,
    pub generator_variance: Bound,
    pub generator_covariance: Bound,
    pub electrode_variance: Bound,
}

impl Default for FitBounds {
    fn default() -> Self {
        Self {
            magnitude: Bound::at_least(0.0),
            depth: Bound::closed(4.49, 7.05),
            theta: Bound::closed(0.0, PI / 2.0),
            phi: Bound::closed(0.0, 2.0 * PI),
            orientation: Bound::closed(0.0, PI / 2.0),
            orientation_phi: Bound::closed(0.0, 2.0 * PI),
            generator_variance: Bound::OPEN,
            generator_covariance: Bound::OPEN,
            electrode_variance: Bound::OPEN,
        }
    }
}

/// Which observed quantity a fit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FitTo {
    Mean,
    Covariance,
}

/// Resolved configuration for `erpvar simulate`.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub n_gen: usize,
    pub n_sub: usize,
    pub variability: VariabilitySelection,
    pub seed: u64,
    pub electrodes_path: Option<std::path::PathBuf>,
    pub export: Option<std::path::PathBuf>,
    /// Also print the per-electrode scalp mean.
    pub show_mean: bool,
}

/// Resolved configuration for `erpvar fit`.
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub n_gen: usize,
    pub n_sub: usize,
    pub variability: VariabilitySelection,
    pub target_seed: u64,
    pub start_seed: u64,
    pub fit_to: FitTo,
    pub groups: Vec<crate::fit::ParameterGroup>,
    pub bounded: bool,
    pub max_evaluations: usize,
    pub electrodes_path: Option<std::path::PathBuf>,
    pub export: Option<std::path::PathBuf>,
}

/// Resolved configuration for `erpvar lead-field`.
#[derive(Debug, Clone)]
pub struct LeadFieldConfig {
    pub generators_path: std::path::PathBuf,
    pub electrodes_path: Option<std::path::PathBuf>,
    /// Write the result as a one-record regression fixture file.
    pub fixture: Option<std::path::PathBuf>,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_reject_unknown_names() {
        assert!(VariabilitySelection::parse("bogus", "none", "none").is_err());
        assert!(VariabilitySelection::parse("none", "bogus", "none").is_err());
        assert!(VariabilitySelection::parse("none", "none", "bogus").is_err());
        // Connections have no constant mode.
        assert!(VariabilitySelection::parse("none", "none", "constant").is_err());
    }

    #[test]
    fn selectors_accept_known_names() {
        let sel = VariabilitySelection::parse("constant", "individual", "individual").unwrap();
        assert_eq!(sel.electrodes, VariabilityKind::Constant);
        assert_eq!(sel.generators, VariabilityKind::Individual);
        assert_eq!(sel.connections, ConnectionKind::Individual);
    }

    #[test]
    fn generator_depth_must_stay_inside_head() {
        let mut g = Generator::default();
        assert!(g.validate(0, 11.5).is_ok());
        g.depth = 11.5;
        assert!(g.validate(0, 11.5).is_err());
        g.depth = 0.0;
        assert!(g.validate(0, 11.5).is_err());
        g.depth = f64::NAN;
        assert!(g.validate(0, 11.5).is_err());
    }

    #[test]
    fn generator_json_defaults_magnitude() {
        let g: Generator = serde_json::from_str(
            r#"{"depth": 6, "theta": 0, "phi": 0, "orientation": 0, "orientation_phi": 0}"#,
        )
        .unwrap();
        assert_eq!(g.magnitude, 0.0);
        let missing = serde_json::from_str::<Generator>(r#"{"depth": 6, "theta": 0}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn bound_clamp_respects_open_sides() {
        assert_eq!(Bound::OPEN.clamp(-5.0), -5.0);
        assert_eq!(Bound::at_least(0.0).clamp(-5.0), 0.0);
        assert_eq!(Bound::closed(1.0, 2.0).clamp(3.0), 2.0);
        assert!(Bound::closed(1.0, 1.0).is_fixed());
    }
}
