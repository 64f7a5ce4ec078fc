//! The ERP variability model.
//!
//! - `cache`: per-stage freshness tracking for derived quantities
//! - `variability`: tagged variance / covariance values
//! - `placement`: random generator placement
//! - `erp`: the model itself (setters, staged computation, simulation)

pub mod cache;
pub mod erp;
pub mod placement;
pub mod variability;

pub use cache::*;
pub use erp::*;
pub use placement::*;
pub use variability::*;
