//! CLI error types and conversions

use crate::credentials::CredentialsError;
use crate::fetcher::FetcherError;
use crate::run::RunError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Run error
    #[error("run error: {0}")]
    RunError(#[from] RunError),

    /// Credentials error
    #[error("credentials error: {0}")]
    CredentialsError(#[from] CredentialsError),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetcherError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
