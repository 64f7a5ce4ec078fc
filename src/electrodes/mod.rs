//! Scalp electrode sets.
//!
//! An `ElectrodeSet` is read-only once built and is shared between model
//! instances through an `Arc`. Electrode positions come in as raw ELP-style
//! degree pairs (signed theta, phi) and are normalized the same way regardless
//! of whether they were read from a file (`io::elp`) or taken from the
//! built-in montage.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// One scalp electrode.
///
/// `x`/`y` are a flat 2D projection for topographic rendering; `theta`/`phi` are
/// the spherical angles (radians) on the head surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Electrode {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub phi: f64,
}

/// Ordered, immutable collection of electrodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectrodeSet {
    electrodes: Vec<Electrode>,
}

/// Raw montage entry: label, signed theta (degrees), phi (degrees).
pub type RawElectrode<'a> = (&'a str, f64, f64);

/// Standard 10-20 positions (BESA-style signed theta / phi in degrees).
const STANDARD_10_20: &[RawElectrode<'static>] = &[
    ("Fp1", -92.0, -72.0),
    ("Fpz", 92.0, 90.0),
    ("Fp2", 92.0, 72.0),
    ("AF3", -74.0, -65.0),
    ("AF4", 74.0, 65.0),
    ("F7", -92.0, -36.0),
    ("F3", -60.0, -51.0),
    ("Fz", 46.0, 90.0),
    ("F4", 60.0, 51.0),
    ("F8", 92.0, 36.0),
    ("FC5", -72.0, -21.0),
    ("FC1", -32.0, -45.0),
    ("FC2", 32.0, 45.0),
    ("FC6", 72.0, 21.0),
    ("T7", -92.0, 0.0),
    ("C3", -46.0, 0.0),
    ("Cz", 0.0, 0.0),
    ("C4", 46.0, 0.0),
    ("T8", 92.0, 0.0),
    ("CP5", -72.0, 21.0),
    ("CP1", -32.0, 45.0),
    ("CP2", 32.0, -45.0),
    ("CP6", 72.0, -21.0),
    ("P7", -92.0, 36.0),
    ("P3", -60.0, 51.0),
    ("Pz", 46.0, -90.0),
    ("P4", 60.0, -51.0),
    ("P8", 92.0, -36.0),
    ("PO3", -74.0, 65.0),
    ("PO4", 74.0, -65.0),
    ("O1", -92.0, 72.0),
    ("Oz", 92.0, -90.0),
    ("O2", 92.0, -72.0),
];

impl ElectrodeSet {
    /// Build from already-normalized electrodes.
    pub fn new(electrodes: Vec<Electrode>) -> Result<Self, ModelError> {
        if electrodes.is_empty() {
            return Err(ModelError::InvalidArgument(
                "electrode set must not be empty".to_string(),
            ));
        }
        if electrodes
            .iter()
            .any(|e| !(e.theta.is_finite() && e.phi.is_finite()))
        {
            return Err(ModelError::InvalidArgument(
                "electrode angles must be finite".to_string(),
            ));
        }
        Ok(Self { electrodes })
    }

    /// Build from raw degree records.
    ///
    /// Theta values are scaled by the largest theta so that the outermost ring
    /// sits on the equator (`π/2`). Negative theta means "other hemisphere" and is
    /// folded into phi by adding `π`.
    pub fn from_raw_degrees<S: AsRef<str>>(records: &[(S, f64, f64)]) -> Result<Self, ModelError> {
        if records.is_empty() {
            return Err(ModelError::InvalidArgument(
                "electrode set must not be empty".to_string(),
            ));
        }
        let max_theta = records
            .iter()
            .map(|r| r.1)
            .fold(f64::NEG_INFINITY, f64::max);
        if !(max_theta.is_finite() && max_theta > 0.0) {
            return Err(ModelError::InvalidArgument(format!(
                "electrode theta values must have a positive maximum, got {max_theta}"
            )));
        }

        Self::new(normalize(records, max_theta))
    }

    /// The built-in standard 10-20 montage.
    pub fn standard_10_20() -> Self {
        Self {
            electrodes: normalize(STANDARD_10_20, 92.0),
        }
    }

    pub fn len(&self) -> usize {
        self.electrodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.electrodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Electrode> {
        self.electrodes.iter()
    }

    pub fn as_slice(&self) -> &[Electrode] {
        &self.electrodes
    }

    pub fn names(&self) -> Vec<String> {
        self.electrodes.iter().map(|e| e.name.clone()).collect()
    }

    /// Columns in the order `[names, x, y, theta, phi]`.
    pub fn columns(&self) -> (Vec<String>, Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>) {
        (
            self.names(),
            self.electrodes.iter().map(|e| e.x).collect(),
            self.electrodes.iter().map(|e| e.y).collect(),
            self.electrodes.iter().map(|e| e.theta).collect(),
            self.electrodes.iter().map(|e| e.phi).collect(),
        )
    }
}

fn normalize<S: AsRef<str>>(records: &[(S, f64, f64)], max_theta: f64) -> Vec<Electrode> {
    records
        .iter()
        .map(|(name, theta_deg, phi_deg)| {
            let theta_norm = theta_deg / max_theta;
            let phi_rad = phi_deg / 180.0 * PI;
            let phi = if theta_norm < 0.0 { phi_rad + PI } else { phi_rad };
            Electrode {
                name: name.as_ref().to_string(),
                x: theta_norm * phi_rad.cos(),
                y: theta_norm * phi_rad.sin(),
                theta: theta_norm.abs() * PI / 2.0,
                phi,
            }
        })
        .collect()
}
