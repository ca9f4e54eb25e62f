//! `ttv-curves` library crate.
//!
//! The binary (`ttv`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - each pipeline stage can be driven on its own from tests or notebooks

pub mod app;
pub mod cli;
pub mod detrend;
pub mod domain;
pub mod error;
pub mod fit;
pub mod infer;
pub mod io;
pub mod math;
pub mod omc;
pub mod reconcile;
pub mod report;
pub mod transit;
