use crate::access::{AccessCheckPolicy, DEFAULT_GITHUB_API_URL};
use crate::error::{Error, Result};
use crate::server::rate_limit::RateLimit;
use crate::token::{TokenizerKind, DEFAULT_LARGEST_FILES};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_MAX_FILE_SIZE: u64 = 10_485_760;
const DEFAULT_MAX_TOKENS: u64 = 100_000;
const DEFAULT_INGEST_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_INGEST_COMMAND: &str = "repo-packer-ingest";

/// Configuration for the repo-packer service.
///
/// Built once at startup and shared read-only by every request.
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Clone)]
#[non_exhaustive]
pub struct Config {
    /// Address the HTTP server binds to
    pub listen_addr: SocketAddr,

    /// Bearer token every request must present
    pub auth_token: String,

    /// GitHub REST API base URL used by the access check
    pub github_api_url: String,

    /// Optional GitHub API token to lift anonymous rate limits
    pub github_token: Option<String>,

    /// Whether repositories are probed before ingestion
    pub access_check: AccessCheckPolicy,

    /// Ingestion bridge program followed by its leading arguments
    pub ingest_command: Vec<String>,

    /// Upper bound on a single ingestion; `None` waits indefinitely
    pub ingest_timeout: Option<Duration>,

    /// `max_file_size` used when a request omits it
    pub default_max_file_size: u64,

    /// `max_tokens` used when a request omits it
    pub default_max_tokens: u64,

    /// Number of files listed in an overflow diagnostic
    pub largest_files_limit: usize,

    /// Tokenizer used for per-file estimates
    pub tokenizer: TokenizerKind,

    /// Per-client request windows
    pub rate_limits: Vec<RateLimit>,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use repo_packer::Config;
    ///
    /// let config = Config::builder()
    ///     .auth_token("s3cret")
    ///     .build()
    ///     .expect("valid configuration");
    /// assert_eq!(config.default_max_tokens, 100_000);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The auth token is empty
    /// - The ingestion command is empty
    /// - Limits are zero
    /// - The GitHub API URL is not http(s)
    pub fn validate(&self) -> Result<()> {
        if self.auth_token.trim().is_empty() {
            return Err(Error::config("auth token must not be empty"));
        }

        match self.ingest_command.first() {
            Some(program) if !program.trim().is_empty() => {}
            _ => return Err(Error::config("ingest command must name a program")),
        }

        if self.default_max_file_size == 0 {
            return Err(Error::config("default max_file_size must be greater than 0"));
        }

        if self.default_max_tokens == 0 {
            return Err(Error::config("default max_tokens must be greater than 0"));
        }

        if self.largest_files_limit == 0 {
            return Err(Error::config("largest_files_limit must be greater than 0"));
        }

        if !self.github_api_url.starts_with("https://") && !self.github_api_url.starts_with("http://") {
            return Err(Error::config(format!(
                "GitHub API URL must be http(s): {}",
                self.github_api_url
            )));
        }

        if self.ingest_timeout == Some(Duration::ZERO) {
            return Err(Error::config("ingest timeout must be greater than 0 when set"));
        }

        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("listen_addr", &self.listen_addr)
            .field("auth_token", &"<redacted>")
            .field("github_api_url", &self.github_api_url)
            .field("github_token", &self.github_token.as_ref().map(|_| "<redacted>"))
            .field("access_check", &self.access_check)
            .field("ingest_command", &self.ingest_command)
            .field("ingest_timeout", &self.ingest_timeout)
            .field("default_max_file_size", &self.default_max_file_size)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("largest_files_limit", &self.largest_files_limit)
            .field("tokenizer", &self.tokenizer)
            .field("rate_limits", &self.rate_limits)
            .finish()
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    listen_addr: Option<SocketAddr>,
    auth_token: Option<String>,
    github_api_url: Option<String>,
    github_token: Option<String>,
    access_check: Option<AccessCheckPolicy>,
    ingest_command: Option<Vec<String>>,
    ingest_timeout: Option<Option<Duration>>,
    default_max_file_size: Option<u64>,
    default_max_tokens: Option<u64>,
    largest_files_limit: Option<usize>,
    tokenizer: Option<TokenizerKind>,
    rate_limits: Option<Vec<RateLimit>>,
}

impl ConfigBuilder {
    /// Sets the listen address.
    #[must_use]
    pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = Some(addr);
        self
    }

    /// Sets the bearer token required on every request.
    #[must_use]
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Sets the GitHub REST API base URL.
    #[must_use]
    pub fn github_api_url(mut self, url: impl Into<String>) -> Self {
        self.github_api_url = Some(url.into());
        self
    }

    /// Sets the GitHub API token.
    #[must_use]
    pub fn github_token(mut self, token: Option<String>) -> Self {
        self.github_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Sets the access check policy.
    #[must_use]
    pub fn access_check(mut self, policy: AccessCheckPolicy) -> Self {
        self.access_check = Some(policy);
        self
    }

    /// Sets the ingestion bridge command, program first.
    #[must_use]
    pub fn ingest_command(mut self, command: Vec<String>) -> Self {
        self.ingest_command = Some(command);
        self
    }

    /// Sets the ingestion timeout; `None` disables it.
    #[must_use]
    pub fn ingest_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ingest_timeout = Some(timeout);
        self
    }

    /// Sets the default `max_file_size`.
    #[must_use]
    pub fn default_max_file_size(mut self, bytes: u64) -> Self {
        self.default_max_file_size = Some(bytes);
        self
    }

    /// Sets the default `max_tokens`.
    #[must_use]
    pub fn default_max_tokens(mut self, tokens: u64) -> Self {
        self.default_max_tokens = Some(tokens);
        self
    }

    /// Sets how many files an overflow diagnostic lists.
    #[must_use]
    pub fn largest_files_limit(mut self, limit: usize) -> Self {
        self.largest_files_limit = Some(limit);
        self
    }

    /// Sets the tokenizer implementation.
    #[must_use]
    pub fn tokenizer(mut self, kind: TokenizerKind) -> Self {
        self.tokenizer = Some(kind);
        self
    }

    /// Sets the per-client rate limits. An empty list disables limiting.
    #[must_use]
    pub fn rate_limits(mut self, limits: Vec<RateLimit>) -> Self {
        self.rate_limits = Some(limits);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let config = Config {
            listen_addr: self.listen_addr.unwrap_or_else(default_listen_addr),
            auth_token: self.auth_token.unwrap_or_default(),
            github_api_url: self
                .github_api_url
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
            github_token: self.github_token,
            access_check: self.access_check.unwrap_or_default(),
            ingest_command: self
                .ingest_command
                .unwrap_or_else(|| vec![DEFAULT_INGEST_COMMAND.to_string()]),
            ingest_timeout: self.ingest_timeout.unwrap_or(Some(DEFAULT_INGEST_TIMEOUT)),
            default_max_file_size: self.default_max_file_size.unwrap_or(DEFAULT_MAX_FILE_SIZE),
            default_max_tokens: self.default_max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            largest_files_limit: self.largest_files_limit.unwrap_or(DEFAULT_LARGEST_FILES),
            tokenizer: self.tokenizer.unwrap_or_default(),
            rate_limits: self.rate_limits.unwrap_or_else(RateLimit::defaults),
        };

        config.validate()?;
        Ok(config)
    }
}
