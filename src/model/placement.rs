//! Random generator placement and the uniform draws shared by all randomizers.

use rand::Rng;
use rand::distributions::Standard;

use crate::domain::{Generator, ModelLimits};

/// Uniform draw in `[low, high)`.
///
/// Written as `low + (high - low) * u` so that an empty range (`low == high`)
/// simply returns `low` instead of panicking.
pub fn uniform<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64) -> f64 {
    let u: f64 = rng.sample(Standard);
    low + (high - low) * u
}

/// Uniform draw in `[0, scale)`.
pub fn uniform_scaled<R: Rng + ?Sized>(rng: &mut R, scale: f64) -> f64 {
    let u: f64 = rng.sample(Standard);
    scale * u
}

/// Place `n_gen` generators uniformly inside `limits`.
///
/// Per generator the draws happen in the order depth, theta, phi, orientation,
/// orientation_phi. Magnitudes start at zero.
pub fn random_generator_placement<R: Rng + ?Sized>(
    limits: &ModelLimits,
    n_gen: usize,
    rng: &mut R,
) -> Vec<Generator> {
    (0..n_gen)
        .map(|_| {
            let depth = uniform(rng, limits.depth.0, limits.depth.1);
            let theta = uniform(rng, limits.theta.0, limits.theta.1);
            let phi = uniform(rng, limits.phi.0, limits.phi.1);
            let orientation = uniform(rng, limits.orientation.0, limits.orientation.1);
            let orientation_phi = uniform(rng, limits.orientation_phi.0, limits.orientation_phi.1);
            Generator {
                depth,
                theta,
                phi,
                orientation,
                orientation_phi,
                magnitude: 0.0,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn placement_stays_within_limits() {
        let limits = ModelLimits::default();
        let mut rng = StdRng::seed_from_u64(42);
        let gens = random_generator_placement(&limits, 100, &mut rng);
        assert_eq!(gens.len(), 100);
        for g in &gens {
            assert!(g.depth >= limits.depth.0 && g.depth < limits.depth.1);
            assert!(g.theta >= limits.theta.0 && g.theta < limits.theta.1);
            assert!(g.phi >= limits.phi.0 && g.phi < limits.phi.1);
            assert!(g.orientation >= limits.orientation.0 && g.orientation < limits.orientation.1);
            assert_eq!(g.magnitude, 0.0);
        }
    }

    #[test]
    fn placement_is_reproducible_with_a_seed() {
        let limits = ModelLimits::default();
        let a = random_generator_placement(&limits, 5, &mut StdRng::seed_from_u64(4));
        let b = random_generator_placement(&limits, 5, &mut StdRng::seed_from_u64(4));
        assert_eq!(a, b);
    }

    #[test]
    fn empty_ranges_do_not_panic() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(uniform(&mut rng, 2.0, 2.0), 2.0);
        assert_eq!(uniform_scaled(&mut rng, 0.0), 0.0);
    }
}
