//! Forward electromagnetic model.
//!
//! Maps dipole generators to scalp potentials. Only one closed-form solution is
//! implemented: a dipole inside a bounded homogeneous sphere (Brody 1973).

pub mod lead_field;

pub use lead_field::*;
