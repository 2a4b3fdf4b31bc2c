//! Token estimation and per-file cost ranking.

use crate::error::{Error, Result};
use crate::file::FileSet;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

const SIMPLE_CHARS_PER_TOKEN: usize = 4;

/// Number of files reported in an overflow diagnostic unless configured otherwise.
pub const DEFAULT_LARGEST_FILES: usize = 10;

/// Type of tokenizer to use for estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenizerKind {
    /// `cl100k_base` BPE, the vocabulary of the GPT-4 model family
    #[default]
    Cl100k,
    /// Character-based heuristic (~4 chars per token), no vocabulary needed
    Simple,
}

impl TokenizerKind {
    /// Creates a new tokenizer instance of this kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the BPE vocabulary cannot be loaded.
    pub fn create(self) -> Result<Arc<dyn TokenEstimator>> {
        match self {
            Self::Cl100k => Ok(Arc::new(Cl100kTokenizer::new()?)),
            Self::Simple => Ok(Arc::new(SimpleTokenizer)),
        }
    }
}

impl fmt::Display for TokenizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cl100k => f.write_str("cl100k"),
            Self::Simple => f.write_str("simple"),
        }
    }
}

impl FromStr for TokenizerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cl100k" | "cl100k_base" => Ok(Self::Cl100k),
            "simple" => Ok(Self::Simple),
            other => Err(Error::config(format!("Unknown tokenizer '{other}'"))),
        }
    }
}

/// Trait for estimating token counts in text.
///
/// Implementations must be deterministic: identical input always yields the
/// same count, since every budget comparison is made in this unit.
pub trait TokenEstimator: Send + Sync {
    /// Estimates the number of tokens in the given text.
    fn estimate(&self, text: &str) -> usize;

    /// Estimates tokens for a batch of texts.
    ///
    /// Default implementation calls `estimate` for each text.
    fn estimate_batch(&self, texts: &[&str]) -> Vec<usize> {
        texts.iter().map(|t| self.estimate(t)).collect()
    }
}

/// Exact BPE token counts under `cl100k_base`.
///
/// Special-token markers such as `<|endoftext|>` are counted as ordinary
/// text, so repository content can never make encoding fail.
pub struct Cl100kTokenizer {
    bpe: CoreBPE,
}

impl Cl100kTokenizer {
    /// Loads the `cl100k_base` vocabulary.
    ///
    /// # Errors
    ///
    /// Returns an error if the vocabulary cannot be built.
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| Error::Tokenizer {
            message: format!("cl100k_base: {e}"),
        })?;
        Ok(Self { bpe })
    }
}

impl fmt::Debug for Cl100kTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cl100kTokenizer").finish_non_exhaustive()
    }
}

impl TokenEstimator for Cl100kTokenizer {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_ordinary(text).len()
    }
}

/// Simple character-based tokenizer.
///
/// Uses a heuristic of approximately 4 characters per token,
/// which works reasonably well for source code.
#[derive(Debug, Clone, Copy)]
pub struct SimpleTokenizer;

impl TokenEstimator for SimpleTokenizer {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let char_count = text.chars().count();
        char_count
            .saturating_add(SIMPLE_CHARS_PER_TOKEN - 1)
            .saturating_div(SIMPLE_CHARS_PER_TOKEN)
            .max(1)
    }
}

/// Token cost of a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CostEntry {
    /// File path
    pub path: String,

    /// Token count under the configured tokenizer
    pub tokens: usize,
}

/// Returns the `limit` most expensive files, largest first.
///
/// Ties keep the order in which the files appear in `files`.
#[must_use]
pub fn rank_files(files: &FileSet, estimator: &dyn TokenEstimator, limit: usize) -> Vec<CostEntry> {
    let texts: Vec<&str> = files.iter().map(|f| f.text.as_str()).collect();
    let counts = estimator.estimate_batch(&texts);

    let mut entries: Vec<CostEntry> = files
        .iter()
        .zip(counts)
        .map(|(file, tokens)| CostEntry {
            path: file.path.clone(),
            tokens,
        })
        .collect();

    // sort_by is stable, which is what keeps ties in encounter order
    entries.sort_by(|a, b| b.tokens.cmp(&a.tokens));
    entries.truncate(limit);
    entries
}
