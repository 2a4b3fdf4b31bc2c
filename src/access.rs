//! Lightweight visibility probe against the hosting provider.
//!
//! Runs before ingestion so that missing or private repositories are
//! rejected without cloning anything.

use crate::reference::RepositoryReference;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Default GitHub REST API base URL.
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

const GITHUB_HOST: &str = "github.com";
const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// Outcome of an access probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessStatus {
    /// The repository can be ingested.
    Accessible,
    /// The repository cannot be ingested; `status` is relayed to the caller.
    Denied {
        /// HTTP status to report
        status: u16,
        /// Human-readable reason
        message: String,
    },
}

impl AccessStatus {
    /// Creates a denial.
    #[must_use]
    pub fn denied(status: u16, message: impl Into<String>) -> Self {
        Self::Denied {
            status,
            message: message.into(),
        }
    }

    /// Returns true if the repository can be ingested.
    #[must_use]
    pub const fn is_accessible(&self) -> bool {
        matches!(self, Self::Accessible)
    }

    /// Status code equivalent: 200 when accessible.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Accessible => 200,
            Self::Denied { status, .. } => *status,
        }
    }
}

/// Whether references are probed before ingestion at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessCheckPolicy {
    /// Probe every reference whose host the checker knows
    #[default]
    Enforce,
    /// Never probe; every reference is treated as accessible
    Skip,
}

impl fmt::Display for AccessCheckPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enforce => f.write_str("enforce"),
            Self::Skip => f.write_str("skip"),
        }
    }
}

impl FromStr for AccessCheckPolicy {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "enforce" => Ok(Self::Enforce),
            "skip" => Ok(Self::Skip),
            other => Err(crate::error::Error::config(format!(
                "Unknown access check policy '{other}' (expected 'enforce' or 'skip')"
            ))),
        }
    }
}

/// Checks that a repository exists and is visible before ingestion.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AccessChecker: Send + Sync {
    /// Probes the repository once. Never retries.
    async fn check(&self, reference: &RepositoryReference) -> AccessStatus;
}

/// Probes `GET <api>/repos/<owner>/<repo>` on the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GithubAccessChecker {
    http_client: reqwest::Client,
    api_url: String,
    api_token: Option<String>,
}

impl GithubAccessChecker {
    /// Creates a checker against `api_url` (no trailing slash needed).
    #[must_use]
    pub fn new(http_client: reqwest::Client, api_url: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            http_client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_token,
        }
    }

    /// Metadata URL for a reference.
    #[must_use]
    pub fn metadata_url(&self, reference: &RepositoryReference) -> String {
        format!("{}/repos/{}", self.api_url, reference.path())
    }
}

#[async_trait]
impl AccessChecker for GithubAccessChecker {
    async fn check(&self, reference: &RepositoryReference) -> AccessStatus {
        if reference.host() != GITHUB_HOST {
            debug!(%reference, "reference is not on GitHub, skipping access check");
            return AccessStatus::Accessible;
        }

        let url = self.metadata_url(reference);
        let mut request = self.http_client.get(&url).header(ACCEPT, GITHUB_ACCEPT);
        if let Some(token) = &self.api_token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        match request.send().await {
            Ok(response) => {
                let status = classify_status(response.status());
                if let AccessStatus::Denied { status, message } = &status {
                    warn!(%reference, status, %message, "repository access check failed");
                }
                status
            }
            Err(e) => {
                warn!(%reference, error = %e, "repository access check request failed");
                AccessStatus::denied(500, format!("Error checking repository: {e}"))
            }
        }
    }
}

/// Checker used with [`AccessCheckPolicy::Skip`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAccessCheck;

#[async_trait]
impl AccessChecker for NoAccessCheck {
    async fn check(&self, reference: &RepositoryReference) -> AccessStatus {
        debug!(%reference, "access check disabled by policy");
        AccessStatus::Accessible
    }
}

/// Maps a GitHub API response status onto an access decision.
#[must_use]
pub fn classify_status(status: StatusCode) -> AccessStatus {
    match status {
        StatusCode::NOT_FOUND => AccessStatus::denied(404, "Repository not found"),
        StatusCode::FORBIDDEN => {
            AccessStatus::denied(403, "Repository is not accessible. Make sure it is public")
        }
        s if !s.is_success() => AccessStatus::denied(s.as_u16(), format!("GitHub API error: {}", s.as_u16())),
        _ => AccessStatus::Accessible,
    }
}
