use thiserror::Error;

use crate::cache::KeyError;
use crate::config::LoadError;
use crate::infra::error::InfraError;

/// Top-level failure of a binary command.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl AppError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 2,
            AppError::Key(_) => 3,
            AppError::Infra(InfraError::Fixture(_) | InfraError::Key(_)) => 3,
            AppError::Infra(_) | AppError::Output(_) => 1,
        }
    }
}
