//! Parsing of the ingestion collaborator's human-readable summary.
//!
//! The report is positional:
//!
//! ```text
//! Repository: owner/repo
//! Files analyzed: 42
//!
//! Estimated tokens: 12.3k
//! ```
//!
//! Only lines 1 and 3 (zero-based) are read. Any other layout is an error;
//! the format belongs to the collaborator and is treated as versioned.

use crate::error::{Error, Result};

const FILES_ANALYZED_LINE: usize = 1;
const ESTIMATED_TOKENS_LINE: usize = 3;
const LABEL_SEPARATOR: &str = ": ";

/// Figures extracted from the ingestion summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestSummary {
    /// Number of files the collaborator included
    pub files_analyzed: u64,

    /// Approximate token count of the packed content
    pub estimated_tokens: f64,
}

impl IngestSummary {
    /// Parses the summary report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SummaryFormat`] if a required line is missing, has no
    /// `label: value` shape, or its value is not a number.
    pub fn parse(summary: &str) -> Result<Self> {
        let lines: Vec<&str> = summary.split('\n').collect();

        let files_value = value_at(&lines, FILES_ANALYZED_LINE, summary)?;
        let files_analyzed = files_value.trim().parse::<u64>().map_err(|e| {
            Error::summary_format(
                FILES_ANALYZED_LINE,
                format!("'{files_value}' is not a file count: {e}"),
                summary,
            )
        })?;

        let tokens_value = value_at(&lines, ESTIMATED_TOKENS_LINE, summary)?;
        let estimated_tokens = parse_token_estimate(tokens_value.trim()).ok_or_else(|| {
            Error::summary_format(
                ESTIMATED_TOKENS_LINE,
                format!("'{tokens_value}' is not a token estimate"),
                summary,
            )
        })?;

        Ok(Self {
            files_analyzed,
            estimated_tokens,
        })
    }
}

fn value_at<'a>(lines: &[&'a str], index: usize, summary: &str) -> Result<&'a str> {
    let line = lines
        .get(index)
        .ok_or_else(|| Error::summary_format(index, "line is missing", summary))?;

    line.split(LABEL_SEPARATOR)
        .nth(1)
        .ok_or_else(|| Error::summary_format(index, format!("'{line}' has no 'label: value' form"), summary))
}

/// Parses `12.3k`, `1.5M` or a bare number into a token count.
fn parse_token_estimate(value: &str) -> Option<f64> {
    let (number, multiplier) = if let Some(n) = value.strip_suffix('M') {
        (n, 1_000_000.0)
    } else if let Some(n) = value.strip_suffix('k') {
        (n, 1_000.0)
    } else {
        (value, 1.0)
    };

    let parsed = number.parse::<f64>().ok()?;
    if parsed.is_finite() && parsed >= 0.0 {
        Some(parsed * multiplier)
    } else {
        None
    }
}
