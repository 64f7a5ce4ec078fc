//! Lead-field computation for dipoles in a bounded spherical conductor.
//!
//! For electrode position `e` (on the sphere surface, radius `R`) and dipole
//! position `d` (inside the sphere) the potential field is, per axis `k`:
//!
//! ```text
//! f_k = [ 2 (e_k - d_k) / |e-d|²
//!         + (1/R²) (e_k + (e_k r_cos - R d_k) / (|e-d| + R - r_cos)) ] / (4 π σ |e-d|)
//! r_cos = (e · d) / R
//! ```
//!
//! and the lead-field entry is `f · o`, with `o` the dipole orientation in the
//! head frame.
//!
//! The computation is a pure function of its inputs. It is not guarded against
//! degenerate geometry: if an electrode coincides with a dipole the result is
//! non-finite.

use nalgebra::{DMatrix, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::Generator;
use crate::electrodes::ElectrodeSet;
use crate::error::ModelError;
use crate::math::{local_to_head_rotation, spherical_to_cartesian, unit_vector};

/// Radius of the head sphere in centimeters.
pub const HEAD_RADIUS_CM: f64 = 11.5;

/// Geometry and conductivity of the spherical head.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadModel {
    pub radius: f64,
    pub conductivity: f64,
}

impl Default for HeadModel {
    fn default() -> Self {
        Self {
            radius: HEAD_RADIUS_CM,
            conductivity: 1.0,
        }
    }
}

/// A dipole resolved into head-frame Cartesian position and orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dipole {
    pub position: Vector3<f64>,
    pub orientation: Vector3<f64>,
}

impl Dipole {
    pub fn from_generator(generator: &Generator, radius: f64) -> Self {
        let position = spherical_to_cartesian(radius - generator.depth, generator.theta, generator.phi);
        let local = unit_vector(generator.orientation, generator.orientation_phi);
        let rotation = local_to_head_rotation(generator.theta, generator.phi);
        Self {
            position,
            orientation: rotation * local,
        }
    }
}

impl HeadModel {
    /// Potential at `electrode` (head frame, on the surface) due to a unit dipole.
    pub fn potential(&self, electrode: &Vector3<f64>, dipole: &Dipole) -> f64 {
        let radius = self.radius;
        let el = electrode;
        let dip = &dipole.position;

        let distance = (el - dip).norm();
        let r_cos_phi = el.dot(dip) / radius;

        let mut field = Vector3::zeros();
        for k in 0..3 {
            let mut f = 2.0 * (el[k] - dip[k]) / distance.powi(2);
            f += (1.0 / radius.powi(2))
                * (el[k] + (el[k] * r_cos_phi - radius * dip[k]) / (distance + radius - r_cos_phi));
            field[k] = f / 4.0 / std::f64::consts::PI / self.conductivity / distance;
        }

        field.dot(&dipole.orientation)
    }

    /// Electrode positions on the head surface, head frame.
    pub fn electrode_positions(&self, electrodes: &ElectrodeSet) -> Vec<Vector3<f64>> {
        electrodes
            .iter()
            .map(|e| spherical_to_cartesian(self.radius, e.theta, e.phi))
            .collect()
    }

    /// Compute the `n_electrodes × n_generators` lead field.
    ///
    /// Fails if any generator lies on or outside the sphere or has non-finite fields.
    pub fn lead_field(
        &self,
        electrodes: &ElectrodeSet,
        generators: &[Generator],
    ) -> Result<DMatrix<f64>, ModelError> {
        for (index, generator) in generators.iter().enumerate() {
            generator.validate(index, self.radius)?;
        }

        let dipoles: Vec<Dipole> = generators
            .iter()
            .map(|g| Dipole::from_generator(g, self.radius))
            .collect();
        let positions = self.electrode_positions(electrodes);

        // Rows are independent; parallelism does not change any value.
        let rows: Vec<Vec<f64>> = positions
            .par_iter()
            .map(|el| dipoles.iter().map(|d| self.potential(el, d)).collect())
            .collect();

        let n_gen = dipoles.len();
        let mut lead_field = DMatrix::<f64>::zeros(rows.len(), n_gen);
        for (i, row) in rows.iter().enumerate() {
            for (g, value) in row.iter().enumerate() {
                lead_field[(i, g)] = *value;
            }
        }
        Ok(lead_field)
    }
}

/// Lead field with the default head model.
pub fn calculate_lead_field(
    electrodes: &ElectrodeSet,
    generators: &[Generator],
) -> Result<DMatrix<f64>, ModelError> {
    HeadModel::default().lead_field(electrodes, generators)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn radial_top() -> Generator {
        Generator {
            depth: 6.0,
            magnitude: 1.0,
            ..Generator::default()
        }
    }

    #[test]
    fn lead_field_has_expected_shape() {
        let electrodes = ElectrodeSet::standard_10_20();
        let gens = vec![radial_top(), radial_top()];
        let lf = calculate_lead_field(&electrodes, &gens).unwrap();
        assert_eq!(lf.shape(), (electrodes.len(), 2));
        assert!(lf.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn lead_field_is_deterministic() {
        let electrodes = ElectrodeSet::standard_10_20();
        let gens = vec![Generator {
            depth: 7.0,
            theta: 3.0 * PI / 8.0,
            phi: 3.0 * PI / 4.0,
            orientation: PI / 4.0,
            orientation_phi: 3.0 * PI / 4.0,
            magnitude: 1.0,
        }];
        let a = calculate_lead_field(&electrodes, &gens).unwrap();
        let b = calculate_lead_field(&electrodes, &gens).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn radial_dipole_is_strongest_right_above_it() {
        let electrodes = ElectrodeSet::standard_10_20();
        let lf = calculate_lead_field(&electrodes, &[radial_top()]).unwrap();
        let cz = electrodes.iter().position(|e| e.name == "Cz").unwrap();
        let max = lf.column(0).iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(lf[(cz, 0)], max);
        assert!(max > 0.0);
    }

    #[test]
    fn radial_dipole_field_is_rotationally_symmetric() {
        // Electrodes at the same polar angle see the same potential from a
        // radial dipole at the pole.
        let electrodes =
            ElectrodeSet::from_raw_degrees(&[("A", 45.0, 0.0), ("B", 45.0, 90.0), ("C", 90.0, 0.0)]).unwrap();
        let lf = calculate_lead_field(&electrodes, &[radial_top()]).unwrap();
        assert!((lf[(0, 0)] - lf[(1, 0)]).abs() < 1e-15);
    }

    #[test]
    fn generator_outside_head_is_rejected() {
        let electrodes = ElectrodeSet::standard_10_20();
        let g = Generator {
            depth: HEAD_RADIUS_CM,
            ..radial_top()
        };
        assert!(matches!(
            calculate_lead_field(&electrodes, &[g]),
            Err(ModelError::InvalidGenerator { index: 0, .. })
        ));
    }

    #[test]
    fn no_generators_gives_empty_columns() {
        let electrodes = ElectrodeSet::standard_10_20();
        let lf = calculate_lead_field(&electrodes, &[]).unwrap();
        assert_eq!(lf.shape(), (electrodes.len(), 0));
    }
}
