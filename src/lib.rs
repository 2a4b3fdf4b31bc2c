//! # repo-packer
//!
//! An HTTP service that packs a public GitHub repository into a single text
//! bundle for LLM prompts, as long as it fits a caller-supplied token budget.
//!
//! ## Features
//!
//! - URL normalization and a GitHub visibility probe before any cloning
//! - Glob-based path exclusion, validated at the boundary
//! - Exact `cl100k_base` per-file token counts for over-budget diagnostics
//! - Bearer-token auth and per-client rate limiting
//!
//! ## Quick Start
//!
//! ```no_run
//! use repo_packer::{Config, Pipeline};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .auth_token("s3cret")
//!     .default_max_tokens(100_000)
//!     .build()?;
//!
//! let pipeline = Pipeline::from_config(&config)?;
//! repo_packer::serve(config, pipeline).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Each request flows through one pipeline:
//! 1. **Reference**: Normalizes the repository URL
//! 2. **Access**: Probes the GitHub API for visibility
//! 3. **Ingest**: Hands the repository to the external ingestion command
//! 4. **Summary**: Reads file count and token estimate from its report
//! 5. **Budget**: Returns the content, or ranks files by token cost

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod error;
mod filter;
mod pipeline;
mod reference;
mod summary;

pub mod access;
pub mod file;
pub mod ingest;
pub mod server;
pub mod token;

pub use access::{AccessCheckPolicy, AccessChecker, AccessStatus, GithubAccessChecker, NoAccessCheck};
pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use file::{parse_content, FileSet, PackedFile};
pub use filter::{sanitize_exclude_patterns, ExcludeFilter};
pub use ingest::{CommandIngestor, IngestOutput, IngestRequest, IngestionFailure, Ingestor};
pub use pipeline::{BudgetOverflow, PackRequest, PackResult, PackedRepository, Pipeline};
pub use reference::{normalize, RepositoryReference};
pub use server::rate_limit::{RateLimit, RateLimiter};
pub use server::{create_router, serve, AppState};
pub use summary::IngestSummary;
pub use token::{rank_files, CostEntry, TokenEstimator, TokenizerKind};
