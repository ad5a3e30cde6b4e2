//! Application error type.
//!
//! Every fallible operation in the crate returns `Result<_, AppError>`. Each
//! variant maps to a process exit code:
//!
//! - `2`: bad input, configuration, or I/O
//! - `3`: not enough usable data (empty selection, degenerate observation)
//! - `4`: numerical or statistical failure (non-convergence, invalid comparison)

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Io(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no observations match the selection criteria")]
    SelectionEmpty,

    #[error("observation {obs_id}: background unavailable ({reason})")]
    BackgroundUnavailable { obs_id: u32, reason: String },

    #[error("observation {obs_id}: degenerate dataset ({reason})")]
    DegenerateObservation { obs_id: u32, reason: String },

    #[error("fit of {model} did not converge: {reason}")]
    FitNonConvergent { model: String, reason: String },

    #[error("invalid model comparison: {0}")]
    InvalidComparison(String),

    #[error("numerical error: {0}")]
    Numeric(String),
}

impl AppError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn numeric(message: impl Into<String>) -> Self {
        Self::Numeric(message.into())
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) | AppError::Io(_) | AppError::InvalidInput(_) => 2,
            AppError::SelectionEmpty
            | AppError::BackgroundUnavailable { .. }
            | AppError::DegenerateObservation { .. } => 3,
            AppError::FitNonConvergent { .. }
            | AppError::InvalidComparison(_)
            | AppError::Numeric(_) => 4,
        }
    }
}
