use crate::ingest::IngestionFailure;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the repo-packer service.
///
/// Every variant maps onto exactly one HTTP status through
/// [`Error::status_code`]; the server turns them into JSON bodies in one place.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Bad or missing caller input.
    #[error("{message}")]
    Validation {
        /// Human-readable description returned to the caller
        message: String,
    },

    /// Missing, malformed, or wrong bearer token.
    #[error("{message}")]
    Unauthorized {
        /// Human-readable description returned to the caller
        message: String,
    },

    /// The client exceeded one of the configured request windows.
    #[error("Rate limit exceeded: {limit}")]
    RateLimited {
        /// The limit that was hit, e.g. `5 per 1 second`
        limit: String,
        /// Seconds until the window rolls over
        retry_after_secs: u64,
    },

    /// The hosting provider reported the repository as unreachable.
    #[error("{message}")]
    AccessDenied {
        /// HTTP status to relay to the caller
        status: u16,
        /// Human-readable description returned to the caller
        message: String,
    },

    /// The ingestion collaborator failed.
    #[error("{0}")]
    Ingestion(IngestionFailure),

    /// The ingestion summary did not have the expected positional layout.
    #[error("Malformed ingestion summary at line {line}: {reason}")]
    SummaryFormat {
        /// Zero-based line index that failed to parse
        line: usize,
        /// What was wrong with it
        reason: String,
        /// Full summary text, kept for diagnostics
        summary: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// The tokenizer could not be initialized.
    #[error("Failed to initialize tokenizer: {message}")]
    Tokenizer {
        /// Error message
        message: String,
    },

    /// A background task panicked or was cancelled.
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an authorization error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates an access-denied error carrying the upstream status.
    #[must_use]
    pub fn access_denied(status: u16, message: impl Into<String>) -> Self {
        Self::AccessDenied {
            status,
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a summary format error.
    #[must_use]
    pub fn summary_format(line: usize, reason: impl Into<String>, summary: &str) -> Self {
        Self::SummaryFormat {
            line,
            reason: reason.into(),
            summary: summary.to_string(),
        }
    }

    /// HTTP status code this error is reported with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::RateLimited { .. } => 429,
            Self::AccessDenied { status, .. } => *status,
            Self::Ingestion(_)
            | Self::SummaryFormat { .. }
            | Self::Config { .. }
            | Self::Tokenizer { .. }
            | Self::Internal { .. } => 500,
        }
    }

    /// Short type tag reported in the `type` field of 500 responses.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Validation { .. } => "ValidationError",
            Self::Unauthorized { .. } => "AuthError",
            Self::RateLimited { .. } => "RateLimited",
            Self::AccessDenied { .. } => "AccessError",
            Self::Ingestion(failure) => &failure.kind,
            Self::SummaryFormat { .. } => "SummaryFormatError",
            Self::Config { .. } => "ConfigError",
            Self::Tokenizer { .. } => "TokenizerError",
            Self::Internal { .. } => "InternalError",
        }
    }

    /// Diagnostic trace reported in the `traceback` field of 500 responses.
    #[must_use]
    pub fn trace(&self) -> String {
        match self {
            Self::Ingestion(failure) => failure.trace.clone(),
            Self::SummaryFormat { summary, .. } => summary.clone(),
            other => other.to_string(),
        }
    }

    /// Returns true if this error is reported with a 5xx status and full diagnostics.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Ingestion(_)
                | Self::SummaryFormat { .. }
                | Self::Config { .. }
                | Self::Tokenizer { .. }
                | Self::Internal { .. }
        )
    }
}

impl From<IngestionFailure> for Error {
    fn from(failure: IngestionFailure) -> Self {
        Self::Ingestion(failure)
    }
}
