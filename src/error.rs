//! Error types.
//!
//! `AppError` is what the binary reports; each variant maps to a process exit
//! code. Model-fit failures are described by `FitError`, and the detrending
//! retry ladder aggregates them into `DetrendError` once every configuration
//! has been tried.

use thiserror::Error;

/// Top-level error surfaced by the `ttv` binary.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or inconsistent inputs (catalog rows, NaNs, mission names).
    #[error("invalid input: {0}")]
    Input(String),
    /// Filesystem or format errors while reading/writing artifacts.
    #[error("I/O error: {0}")]
    Io(String),
    /// Not enough photometry or transits to run a stage.
    #[error("insufficient data: {0}")]
    Data(String),
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error(transparent)]
    Detrend(#[from] DetrendError),
}

impl AppError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Input(_) | AppError::Io(_) => 2,
            AppError::Data(_) => 3,
            AppError::Fit(_) | AppError::Detrend(_) => 4,
        }
    }
}

/// Failure of a single optimization/sampling run or model construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("log-probability is not finite at the starting point")]
    NonFiniteStart,
    #[error("optimizer diverged: {0}")]
    Diverged(String),
    #[error("numerical failure: {0}")]
    Numerical(String),
    #[error("unknown parameter block `{0}`")]
    UnknownBlock(String),
    #[error("insufficient data: {0}")]
    InsufficientData(String),
}

impl FitError {
    pub fn numerical(message: impl Into<String>) -> Self {
        Self::Numerical(message.into())
    }

    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::InsufficientData(message.into())
    }
}

/// Every configuration of the detrending ladder failed for one light curve.
#[derive(Debug, Clone, Error)]
#[error("all detrending configurations failed ({})", summarize(.attempts))]
pub struct DetrendError {
    /// `(configuration label, failure)` in the order they were attempted.
    pub attempts: Vec<(String, FitError)>,
}

fn summarize(attempts: &[(String, FitError)]) -> String {
    attempts
        .iter()
        .map(|(label, err)| format!("{label}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}
