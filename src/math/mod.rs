//! Numeric utilities: cent rounding, summary statistics and least squares.

pub mod ols;
pub mod rounding;
pub mod stats;

pub use ols::*;
pub use rounding::*;
pub use stats::*;
