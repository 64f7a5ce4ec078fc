//! `erp-variability` library crate.
//!
//! The binary (`erpvar`) is a thin wrapper around this library so that:
//!
//! - the forward model, the variability model and the fitter are testable
//!   without spawning processes
//! - models can be driven programmatically (scripts, notebooks, other tools)

pub mod app;
pub mod cli;
pub mod domain;
pub mod electrodes;
pub mod error;
pub mod fit;
pub mod forward;
pub mod io;
pub mod math;
pub mod model;
pub mod report;
