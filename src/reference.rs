//! Canonical form of a hosted repository URL.

use std::fmt;

/// Web prefixes a repository URL may start with.
pub(crate) const GITHUB_PREFIXES: [&str; 2] = ["https://github.com/", "http://github.com/"];

/// A normalized GitHub repository URL.
///
/// Always starts with one of the GitHub web prefixes and never ends with a
/// trailing slash or `.git`. The only way to obtain one is [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryReference(String);

impl RepositoryReference {
    /// Returns the normalized URL.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the `owner/repo...` path after the web prefix.
    #[must_use]
    pub fn path(&self) -> &str {
        GITHUB_PREFIXES
            .iter()
            .find_map(|prefix| self.0.strip_prefix(prefix))
            .unwrap_or(&self.0)
    }

    /// Returns the host component (`github.com` for every normalized reference).
    #[must_use]
    pub fn host(&self) -> &str {
        let without_scheme = self
            .0
            .split_once("://")
            .map_or(self.0.as_str(), |(_, rest)| rest);
        without_scheme.split('/').next().unwrap_or(without_scheme)
    }
}

impl fmt::Display for RepositoryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RepositoryReference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Converts the accepted GitHub URL spellings into one canonical form.
///
/// Strips one trailing `.git`, then one trailing `/`, and rejects anything
/// that does not live under `github.com` (either scheme). When the slash was
/// the last character, a `.git` left in front of it is stripped as well, so
/// `a/b.git/` becomes `a/b`. Inputs that still end in `/` or `.git` after that
/// (`a/b//`, `a/b.git.git`) are rejected, so the result always satisfies the
/// invariant and normalizing twice is a no-op.
#[must_use]
pub fn normalize(raw: &str) -> Option<RepositoryReference> {
    if raw.is_empty() {
        return None;
    }

    let url = raw.strip_suffix(".git").unwrap_or(raw);
    let url = match url.strip_suffix('/') {
        Some(trimmed) => trimmed.strip_suffix(".git").unwrap_or(trimmed),
        None => url,
    };

    if !GITHUB_PREFIXES.iter().any(|prefix| url.starts_with(prefix)) {
        return None;
    }
    if url.ends_with('/') || url.ends_with(".git") {
        return None;
    }

    Some(RepositoryReference(url.to_string()))
}
