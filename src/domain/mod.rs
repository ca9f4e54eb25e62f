//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - photometry and planet snapshots (`LiteCurve`, `Planet`)
//! - kernel and cadence enums (`GpKernel`, `KernelChoice`, `CadenceKind`)
//! - per-planet timing outputs (`OmcSeries`, `QuickTtvs`)
//! - run configuration (`PipelineConfig`)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
