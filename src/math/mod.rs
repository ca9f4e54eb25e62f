//! Numerical building blocks: least squares, robust statistics, periodograms,
//! filtering and Gaussian-process solvers.

pub mod celerite;
pub mod filter;
pub mod lombscargle;
pub mod ols;
pub mod poly;
pub mod special;
pub mod stats;

pub use ols::*;
