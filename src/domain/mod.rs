//! Domain types used throughout the crate.
//!
//! This module defines:
//!
//! - generator records (`Generator`)
//! - variability selectors (`VariabilityKind`, `ConnectionKind`, `VariabilitySelection`)
//! - randomization limits and fitting bounds (`ModelLimits`, `FitBounds`, `Bound`)
//! - resolved run configuration (`SimulationConfig`, `FitConfig`, `LeadFieldConfig`)

pub mod types;

pub use types::*;
