//! Fitting model parameters to observed scalp statistics.
//!
//! - `parameters`: named parameter groups flattened to / from a vector
//! - `optimizer`: the `Minimizer` seam and a bounded Nelder–Mead
//! - `fitter`: error functionals and the fit driver

pub mod fitter;
pub mod optimizer;
pub mod parameters;

pub use fitter::*;
pub use optimizer::*;
pub use parameters::*;
