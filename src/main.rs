use anyhow::Context;
use clap::Parser;
use repo_packer::{AccessCheckPolicy, Config, Pipeline, RateLimit, TokenizerKind};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "repo-packer",
    version,
    author,
    about = "Pack a GitHub repository into an LLM-sized text bundle over HTTP",
    long_about = "Serve POST /api/pack: fetch a public GitHub repository through an ingestion \
    command, and return its flattened content if it fits the caller's token budget, or the \
    most expensive files if it does not.\n\n\
    Every option can also be set through the environment; a .env file in the working \
    directory is loaded first.\n\n\
    USAGE EXAMPLES:\n  \
      # Serve on the default address\n  \
      REPO_PACKER_TOKEN=s3cret repo-packer\n\n  \
      # Use a custom ingestion bridge with a 2 minute timeout\n  \
      repo-packer --token s3cret --ingest-command 'python3 bridge.py' --ingest-timeout 120\n\n  \
      # Skip the GitHub visibility probe\n  \
      repo-packer --token s3cret --access-check skip"
)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "REPO_PACKER_LISTEN", default_value = "127.0.0.1:5000", value_name = "ADDR")]
    listen: SocketAddr,

    /// Bearer token callers must present
    #[arg(long, env = "REPO_PACKER_TOKEN", hide_env_values = true)]
    token: String,

    /// GitHub REST API base URL
    #[arg(long, env = "REPO_PACKER_GITHUB_API_URL", default_value = "https://api.github.com", value_name = "URL")]
    github_api_url: String,

    /// GitHub token used for the access check
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// Whether to probe the GitHub API before ingesting
    #[arg(long, env = "REPO_PACKER_ACCESS_CHECK", default_value = "enforce", value_name = "enforce|skip")]
    access_check: AccessCheckPolicy,

    /// Ingestion command, split on whitespace
    ///
    /// Invoked as `<command> <repo_url> --max-file-size=<bytes> [--exclude-patterns=<globs>]`
    /// and expected to print `{"summary", "tree", "content"}` as JSON.
    #[arg(long, env = "REPO_PACKER_INGEST_COMMAND", default_value = "repo-packer-ingest", value_name = "CMD")]
    ingest_command: String,

    /// Ingestion timeout in seconds (0 disables)
    #[arg(long, env = "REPO_PACKER_INGEST_TIMEOUT", default_value_t = 600, value_name = "SECS")]
    ingest_timeout: u64,

    /// Default per-file size limit in bytes
    #[arg(long, env = "REPO_PACKER_MAX_FILE_SIZE", default_value_t = 10_485_760)]
    max_file_size: u64,

    /// Default token budget
    #[arg(long, env = "REPO_PACKER_MAX_TOKENS", default_value_t = 100_000)]
    max_tokens: u64,

    /// Number of files listed when the budget is exceeded
    #[arg(long, env = "REPO_PACKER_LARGEST_FILES", default_value_t = 10)]
    largest_files: usize,

    /// Tokenizer used for per-file estimates
    #[arg(long, env = "REPO_PACKER_TOKENIZER", default_value = "cl100k", value_name = "cl100k|simple")]
    tokenizer: TokenizerKind,

    /// Per-client rate limits, e.g. `5/second,100/minute`
    #[arg(
        long = "rate-limit",
        env = "REPO_PACKER_RATE_LIMITS",
        value_delimiter = ',',
        default_value = "5/second,100/minute",
        value_name = "LIMIT"
    )]
    rate_limits: Vec<RateLimit>,

    /// Disable rate limiting entirely
    #[arg(long)]
    no_rate_limit: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    let ingest_timeout = (cli.ingest_timeout > 0).then(|| Duration::from_secs(cli.ingest_timeout));
    let rate_limits = if cli.no_rate_limit { Vec::new() } else { cli.rate_limits };

    let config = Config::builder()
        .listen_addr(cli.listen)
        .auth_token(cli.token)
        .github_api_url(cli.github_api_url)
        .github_token(cli.github_token)
        .access_check(cli.access_check)
        .ingest_command(cli.ingest_command.split_whitespace().map(str::to_string).collect())
        .ingest_timeout(ingest_timeout)
        .default_max_file_size(cli.max_file_size)
        .default_max_tokens(cli.max_tokens)
        .largest_files_limit(cli.largest_files)
        .tokenizer(cli.tokenizer)
        .rate_limits(rate_limits)
        .build()
        .context("Failed to build configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.listen_addr,
        "Starting repo-packer"
    );

    let pipeline = Pipeline::from_config(&config).context("Failed to create pipeline")?;

    repo_packer::serve(config, pipeline)
        .await
        .context("Server failed")?;

    Ok(())
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let default_filter = match verbosity {
        0 => "repo_packer=info",
        1 => "repo_packer=debug",
        _ => "repo_packer=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}
