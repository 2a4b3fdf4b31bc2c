//! Exclusion pattern preprocessing.
//!
//! Callers send plain globs; the ingestion collaborator expects them with
//! spaces escaped and anchored so they match at any directory depth.

use crate::error::{Error, Result};
use globset::GlobBuilder;

/// Prefix that makes a glob match at any directory depth.
const RECURSIVE_PREFIX: &str = "**/";

/// Separator used when handing the patterns to the ingestion collaborator.
const PATTERN_SEPARATOR: &str = ",";

/// Escapes spaces and adds a `**/`-prefixed duplicate for unanchored globs.
///
/// For each input the escaped original comes first, followed by its prefixed
/// variant unless it already starts with `/` or `**/`. Input order is kept,
/// so `n` patterns produce between `n` and `2n` entries.
#[must_use]
pub fn sanitize_exclude_patterns(patterns: &[String]) -> Vec<String> {
    let mut sanitized = Vec::with_capacity(patterns.len() * 2);

    for pattern in patterns {
        let escaped = pattern.replace(' ', "\\ ");
        let anchored = escaped.starts_with('/') || escaped.starts_with(RECURSIVE_PREFIX);

        if anchored {
            sanitized.push(escaped);
        } else {
            let prefixed = format!("{RECURSIVE_PREFIX}{escaped}");
            sanitized.push(escaped);
            sanitized.push(prefixed);
        }
    }

    sanitized
}

/// Sanitized, validated exclusion patterns for one ingestion request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludeFilter {
    patterns: Vec<String>,
}

impl ExcludeFilter {
    /// Creates an empty filter (nothing excluded).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitizes caller patterns and checks that every result is a valid glob.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first blank or malformed pattern.
    pub fn from_raw(raw: &[String]) -> Result<Self> {
        if let Some(blank) = raw.iter().find(|p| p.trim().is_empty()) {
            return Err(Error::validation(format!(
                "Invalid exclude pattern '{blank}': pattern must not be empty"
            )));
        }

        let patterns = sanitize_exclude_patterns(raw);
        for pattern in &patterns {
            validate_glob(pattern)?;
        }

        Ok(Self { patterns })
    }

    /// Returns the sanitized patterns.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Returns true if nothing is excluded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Joins the patterns for the ingestion collaborator.
    ///
    /// An empty filter is `None` ("no filter"), never an empty string.
    #[must_use]
    pub fn joined(&self) -> Option<String> {
        if self.patterns.is_empty() {
            None
        } else {
            Some(self.patterns.join(PATTERN_SEPARATOR))
        }
    }
}

fn validate_glob(pattern: &str) -> Result<()> {
    GlobBuilder::new(pattern)
        .backslash_escape(true)
        .build()
        .map(|_| ())
        .map_err(|e| Error::validation(format!("Invalid exclude pattern '{pattern}': {e}")))
}
