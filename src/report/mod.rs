//! Reporting utilities: formatted model and fit summaries.

pub mod format;

pub use format::*;
