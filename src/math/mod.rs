//! Mathematical utilities: spherical geometry and multivariate-normal sampling.

pub mod mvn;
pub mod spherical;

pub use mvn::*;
pub use spherical::*;
