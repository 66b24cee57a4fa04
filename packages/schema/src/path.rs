use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Position of a block from the document root, one index per nesting level.
///
/// `[2, 0, 1]` is the second child of the first child of the third top-level
/// block. Paths identify a block instance within a single render only:
/// inserting or deleting a sibling renumbers everything after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockPath(Vec<usize>);

impl BlockPath {
    /// The empty path (the document's top-level block list)
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_indices(indices: impl Into<Vec<usize>>) -> Self {
        Self(indices.into())
    }

    /// Path of the `index`-th child under this path
    pub fn child(&self, index: usize) -> Self {
        let mut indices = Vec::with_capacity(self.0.len() + 1);
        indices.extend_from_slice(&self.0);
        indices.push(index);
        Self(indices)
    }

    /// Split into the parent path and this block's index within the parent
    pub fn split_last(&self) -> Option<(BlockPath, usize)> {
        let (last, rest) = self.0.split_last()?;
        Some((BlockPath(rest.to_vec()), *last))
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// True if `self` is `prefix` or lies underneath it
    pub fn starts_with(&self, prefix: &BlockPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Dotted form (`2.0.1`) used in scope keys and on the command line
    pub fn to_dotted(&self) -> String {
        self.0
            .iter()
            .map(|index| index.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for BlockPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (position, index) in self.0.iter().enumerate() {
            if position > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", index)?;
        }
        write!(f, "]")
    }
}

/// Error returned when a path string is not a list of indices
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid block path \"{0}\": expected indices like 2.0.1 or [2, 0, 1]")]
pub struct InvalidBlockPath(pub String);

impl FromStr for BlockPath {
    type Err = InvalidBlockPath;

    /// Accepts both the dotted (`2.0.1`) and bracketed (`[2, 0, 1]`) forms
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(trimmed);

        if inner.trim().is_empty() {
            return Ok(BlockPath::root());
        }

        let separator = if inner.contains(',') { ',' } else { '.' };
        inner
            .split(separator)
            .map(|part| part.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map(BlockPath)
            .map_err(|_| InvalidBlockPath(s.to_string()))
    }
}
