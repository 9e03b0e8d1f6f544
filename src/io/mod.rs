//! Input/output helpers.
//!
//! - dataset ingest + validation (`cases`)
//! - estimator config / calibration JSON read/write (`config_file`)
//! - per-case result exports (`export`)

pub mod cases;
pub mod config_file;
pub mod export;

pub use cases::*;
pub use config_file::*;
pub use export::*;
