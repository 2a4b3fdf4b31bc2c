use crate::{
    access::{AccessCheckPolicy, AccessChecker, AccessStatus, GithubAccessChecker, NoAccessCheck},
    config::Config,
    error::{Error, Result},
    file::parse_content,
    filter::ExcludeFilter,
    ingest::{CommandIngestor, IngestRequest, Ingestor},
    reference::normalize,
    summary::IngestSummary,
    token::{rank_files, CostEntry, TokenEstimator},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

const REPO_URL_REQUIRED: &str = "repo_url is required";
const INVALID_REPO_URL: &str =
    "Invalid GitHub repository URL. Please provide a valid GitHub repository URL.";
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Body of a pack request. Omitted limits fall back to the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackRequest {
    /// Repository URL as sent by the caller
    pub repo_url: Option<String>,

    /// Per-file size limit in bytes, enforced by the ingestion collaborator
    pub max_file_size: Option<u64>,

    /// Token budget for the whole repository
    pub max_tokens: Option<u64>,

    /// Glob patterns of paths to leave out
    pub exclude_patterns: Option<Vec<String>>,
}

impl PackRequest {
    /// Creates a request for `repo_url` with every limit left at its default.
    #[must_use]
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: Some(repo_url.into()),
            ..Self::default()
        }
    }
}

/// A repository that fit the budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackedRepository {
    /// File count reported by the ingestion summary
    pub files_analyzed: u64,

    /// Token estimate reported by the ingestion summary
    pub estimated_tokens: f64,

    /// Packed content, exactly as produced by the collaborator
    pub content: String,
}

/// A repository that exceeded the budget, with its most expensive files.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetOverflow {
    /// File count reported by the ingestion summary
    pub files_analyzed: u64,

    /// Token estimate reported by the ingestion summary
    pub estimated_tokens: f64,

    /// Most expensive files, largest first
    pub largest_files: Vec<CostEntry>,
}

/// Outcome of a successful pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum PackResult {
    /// Under budget: the content is returned
    Packed(PackedRepository),
    /// Over budget: a diagnostic is returned instead of the content
    Overflow(BudgetOverflow),
}

/// Request pipeline: validate, check access, ingest, then enforce the budget.
///
/// Holds only shared, read-only collaborators, so one instance serves every
/// request concurrently.
pub struct Pipeline {
    checker: Arc<dyn AccessChecker>,
    ingestor: Arc<dyn Ingestor>,
    tokenizer: Arc<dyn TokenEstimator>,
    default_max_file_size: u64,
    default_max_tokens: u64,
    largest_files_limit: usize,
}

impl Pipeline {
    /// Creates a pipeline from explicit collaborators.
    #[must_use]
    pub fn new(
        config: &Config,
        checker: Arc<dyn AccessChecker>,
        ingestor: Arc<dyn Ingestor>,
        tokenizer: Arc<dyn TokenEstimator>,
    ) -> Self {
        Self {
            checker,
            ingestor,
            tokenizer,
            default_max_file_size: config.default_max_file_size,
            default_max_tokens: config.default_max_tokens,
            largest_files_limit: config.largest_files_limit,
        }
    }

    /// Builds the production collaborators described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The HTTP client cannot be built
    /// - The tokenizer vocabulary cannot be loaded
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let checker: Arc<dyn AccessChecker> = match config.access_check {
            AccessCheckPolicy::Enforce => {
                let http_client = reqwest::Client::builder()
                    .user_agent(USER_AGENT)
                    .build()
                    .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
                Arc::new(GithubAccessChecker::new(
                    http_client,
                    config.github_api_url.clone(),
                    config.github_token.clone(),
                ))
            }
            AccessCheckPolicy::Skip => Arc::new(NoAccessCheck),
        };

        let (program, args) = config
            .ingest_command
            .split_first()
            .ok_or_else(|| Error::config("ingest command must name a program"))?;
        let ingestor = Arc::new(CommandIngestor::new(
            program.clone(),
            args.to_vec(),
            config.ingest_timeout,
        ));

        let tokenizer = config.tokenizer.create()?;

        info!(
            access_check = %config.access_check,
            tokenizer = %config.tokenizer,
            program = %program,
            "Pipeline initialized"
        );

        Ok(Self::new(config, checker, ingestor, tokenizer))
    }

    /// Processes one pack request.
    ///
    /// Validation and access failures return before the collaborator is
    /// invoked. An over-budget repository is not an error: it yields
    /// [`PackResult::Overflow`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `repo_url` is missing, empty, or not a GitHub URL
    /// - An exclusion pattern is not a valid glob
    /// - The access check denies the repository
    /// - Ingestion fails or its summary cannot be parsed
    #[instrument(skip(self, request), fields(repo_url = request.repo_url.as_deref().unwrap_or_default()))]
    pub async fn run(&self, request: PackRequest) -> Result<PackResult> {
        let start_time = Instant::now();

        let raw_url = request
            .repo_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::validation(REPO_URL_REQUIRED))?;
        let reference = normalize(raw_url).ok_or_else(|| Error::validation(INVALID_REPO_URL))?;

        let filter = ExcludeFilter::from_raw(request.exclude_patterns.as_deref().unwrap_or_default())?;
        let max_file_size = request.max_file_size.unwrap_or(self.default_max_file_size);
        let max_tokens = request.max_tokens.unwrap_or(self.default_max_tokens);

        if let AccessStatus::Denied { status, message } = self.checker.check(&reference).await {
            return Err(Error::access_denied(status, message));
        }

        let ingest_request = IngestRequest {
            reference,
            max_file_size,
            exclude_patterns: filter.joined(),
        };

        info!(
            reference = %ingest_request.reference,
            max_file_size,
            max_tokens,
            exclude_patterns = filter.patterns().len(),
            "Ingesting repository"
        );
        let ingest_start = Instant::now();
        let output = self.ingestor.ingest(&ingest_request).await?;
        debug!(
            elapsed = ingest_start.elapsed().as_secs_f64(),
            content_bytes = output.content.len(),
            "Ingestion finished"
        );

        let summary = IngestSummary::parse(&output.summary)?;

        if !exceeds_budget(summary.estimated_tokens, max_tokens) {
            info!(
                files = summary.files_analyzed,
                tokens = summary.estimated_tokens,
                "✓ Packed repository in {:.2}s",
                start_time.elapsed().as_secs_f64()
            );
            return Ok(PackResult::Packed(PackedRepository {
                files_analyzed: summary.files_analyzed,
                estimated_tokens: summary.estimated_tokens,
                content: output.content,
            }));
        }

        let largest_files = self.rank_largest(output.content).await?;

        warn!(
            files = summary.files_analyzed,
            tokens = summary.estimated_tokens,
            max_tokens,
            "Token limit exceeded, returning {} largest files",
            largest_files.len()
        );

        Ok(PackResult::Overflow(BudgetOverflow {
            files_analyzed: summary.files_analyzed,
            estimated_tokens: summary.estimated_tokens,
            largest_files,
        }))
    }

    /// Splits and tokenizes the content off the async runtime.
    async fn rank_largest(&self, content: String) -> Result<Vec<CostEntry>> {
        let tokenizer = Arc::clone(&self.tokenizer);
        let limit = self.largest_files_limit;

        tokio::task::spawn_blocking(move || {
            let files = parse_content(&content);
            debug!(files = files.len(), "Ranking files by token cost");
            rank_files(&files, tokenizer.as_ref(), limit)
        })
        .await
        .map_err(|e| Error::Internal {
            message: format!("file ranking task failed: {e}"),
        })
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("default_max_file_size", &self.default_max_file_size)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("largest_files_limit", &self.largest_files_limit)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_precision_loss)]
fn exceeds_budget(estimated_tokens: f64, max_tokens: u64) -> bool {
    estimated_tokens > max_tokens as f64
}
