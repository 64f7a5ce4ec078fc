//! Input/output helpers.
//!
//! - ELP electrode files (`elp`)
//! - generator configuration JSON (`generators`)
//! - lead-field regression fixtures (`fixture`)
//! - model snapshot export (`export`)

pub mod elp;
pub mod export;
pub mod fixture;
pub mod generators;

pub use elp::*;
pub use export::*;
pub use fixture::*;
pub use generators::*;
