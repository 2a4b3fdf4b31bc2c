//! Splitting of packed ingestion content into per-file bodies.

use std::collections::HashMap;

/// Minimum run of `=` characters that marks a file boundary.
const SEPARATOR_MIN_LEN: usize = 48;

/// Prefix of the line naming the file whose body follows.
const HEADER_PREFIX: &str = "File: ";

/// A single file recovered from the packed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedFile {
    /// Path as written in the `File: ` header
    pub path: String,

    /// File body, lines joined with `\n`
    pub text: String,
}

impl PackedFile {
    /// Creates a new packed file.
    #[must_use]
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// Mapping from path to text with unique keys.
///
/// Iterates in first-insertion order; re-inserting a path replaces the text
/// but keeps the original position.
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    files: Vec<PackedFile>,
    index: HashMap<String, usize>,
}

impl FileSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the text for `path`.
    pub fn insert(&mut self, path: impl Into<String>, text: impl Into<String>) {
        let path = path.into();
        let text = text.into();

        if let Some(&slot) = self.index.get(&path) {
            self.files[slot].text = text;
        } else {
            self.index.insert(path.clone(), self.files.len());
            self.files.push(PackedFile { path, text });
        }
    }

    /// Returns the text stored for `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&str> {
        self.index
            .get(path)
            .map(|&slot| self.files[slot].text.as_str())
    }

    /// Number of distinct paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if no file was recovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterates over the files in encounter order.
    pub fn iter(&self) -> std::slice::Iter<'_, PackedFile> {
        self.files.iter()
    }
}

impl<'a> IntoIterator for &'a FileSet {
    type Item = &'a PackedFile;
    type IntoIter = std::slice::Iter<'a, PackedFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

/// Splits the ingestion collaborator's flat content into per-file bodies.
///
/// # Format
///
/// ```text
/// ================================================
/// File: src/main.rs
/// ================================================
/// fn main() {}
/// ```
///
/// A separator commits the pending body to the current path (if both exist)
/// and starts a new body, but keeps the path. A header only changes the
/// path. Everything else, blank lines included, is body. The last body is
/// committed at end of input since it has no trailing separator.
///
/// Best effort: content before the first header is dropped, and a header
/// with no body produces no entry.
#[must_use]
pub fn parse_content(content: &str) -> FileSet {
    let mut files = FileSet::new();
    let mut current_path: Option<&str> = None;
    let mut body: Vec<&str> = Vec::new();

    for line in content.split('\n') {
        if is_separator(line) {
            if let Some(path) = current_path {
                if !body.is_empty() {
                    files.insert(path, body.join("\n"));
                }
            }
            body.clear();
        } else if let Some(path) = line.strip_prefix(HEADER_PREFIX) {
            current_path = Some(path);
        } else {
            body.push(line);
        }
    }

    if let Some(path) = current_path {
        if !body.is_empty() {
            files.insert(path, body.join("\n"));
        }
    }

    files
}

fn is_separator(line: &str) -> bool {
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.len() >= SEPARATOR_MIN_LEN && line.bytes().all(|b| b == b'=')
}
