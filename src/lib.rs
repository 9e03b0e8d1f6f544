//! `reimbursement-estimator` library crate.
//!
//! The binary (`reimburse`) is a thin wrapper around this library so that:
//!
//! - the estimator, evaluation and calibration are testable without spawning processes
//! - every subcommand shares one implementation of loading and configuration

pub mod analyze;
pub mod app;
pub mod calibrate;
pub mod cli;
pub mod domain;
pub mod error;
pub mod estimator;
pub mod evaluate;
pub mod io;
pub mod logging;
pub mod math;
pub mod plot;
pub mod regression;
pub mod report;
