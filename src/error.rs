use thiserror::Error;

use crate::constants::API_KEY_ENV;
use crate::post::ValidationReport;

/// Everything that can go wrong between an idea and a validated post.
///
/// The generation client maps every failure it can reach onto one of these
/// before returning, so callers never see a raw transport error.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("could not reach the provider: {0}")]
    Connectivity(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("the provider declined to generate this post: {0}")]
    Declined(String),

    #[error("the provider returned no structured post")]
    EmptyResult,

    #[error(transparent)]
    ValidationFailed(#[from] ValidationReport),

    #[error("rate limit reached: {0}")]
    RateLimited(String),

    #[error("insufficient quota: {0}")]
    QuotaExceeded(String),

    #[error("invalid API credential: {0}")]
    InvalidCredential(String),

    #[error("provider error{}: {message}", status_suffix(.status))]
    Provider {
        status: Option<u16>,
        message: String,
    },

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl GenerationError {
    /// A short suggestion for the person at the keyboard.
    pub fn remediation(&self) -> String {
        match self {
            GenerationError::Configuration(_) => format!(
                "Set {API_KEY_ENV} in your environment or in a .env file, or pass --api-key."
            ),
            GenerationError::Connectivity(_) => {
                "Check your internet connection, the provider URL and your API key.".to_string()
            }
            GenerationError::InvalidInput(_) => {
                "Describe the idea for your post before pressing enter.".to_string()
            }
            GenerationError::Declined(_) => {
                "The topic may break the provider's usage policies. Try rephrasing the idea."
                    .to_string()
            }
            GenerationError::EmptyResult => {
                "Try again, or make the idea a little more specific.".to_string()
            }
            GenerationError::ValidationFailed(_) => {
                "Try again with a different or more specific idea.".to_string()
            }
            GenerationError::RateLimited(_) => {
                "Wait a few moments before trying again.".to_string()
            }
            GenerationError::QuotaExceeded(_) => {
                "Check the balance and usage limits of your provider account.".to_string()
            }
            GenerationError::InvalidCredential(_) => {
                format!("Check that {API_KEY_ENV} holds a valid, active key.")
            }
            GenerationError::Provider { .. } => {
                "Try again later; if it keeps failing, check the provider's status page."
                    .to_string()
            }
            GenerationError::Unexpected(_) => {
                "Try again; if the problem persists, run with RUST_LOG=debug and report it."
                    .to_string()
            }
        }
    }

    /// Whether repeating the same call could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::Connectivity(_)
                | GenerationError::EmptyResult
                | GenerationError::ValidationFailed(_)
                | GenerationError::RateLimited(_)
                | GenerationError::Provider { .. }
                | GenerationError::Unexpected(_)
        )
    }
}
