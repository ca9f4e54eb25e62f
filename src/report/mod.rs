//! Reporting utilities: run summaries and file inspection.

pub mod format;

pub use format::*;
