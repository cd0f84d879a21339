// Materialized comment path - the ancestor chain of a comment ending in its own id
// Textual form is the dot-joined ids ("1.4.9"), the same shape as an ltree value

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

pub type CommentId = i64;

/// Ordered, non-empty sequence of comment ids from the thread root down to the comment.
///
/// Ordering compares segment by segment as numbers, with a proper prefix sorting
/// before anything it prefixes. Sorting a set of paths this way yields a pre-order
/// traversal where siblings appear in ascending id order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommentPath(Vec<CommentId>);

impl CommentPath {
    /// Path of a comment with no parent
    pub fn root(id: CommentId) -> Self {
        Self(vec![id])
    }

    /// Path of a new reply under this comment
    pub fn child(&self, id: CommentId) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend_from_slice(&self.0);
        segments.push(id);
        Self(segments)
    }

    /// Id of the comment this path belongs to
    pub fn id(&self) -> CommentId {
        // Non-empty by construction
        self.0[self.0.len() - 1]
    }

    /// Id of the direct parent, if any
    pub fn parent_id(&self) -> Option<CommentId> {
        let len = self.0.len();
        if len > 1 {
            Some(self.0[len - 2])
        } else {
            None
        }
    }

    /// Nesting depth; root comments have depth 0
    pub fn depth(&self) -> usize {
        self.0.len() - 1
    }

    pub fn segments(&self) -> &[CommentId] {
        &self.0
    }

    /// True when `ancestor` is a strict prefix of this path
    pub fn is_descendant_of(&self, ancestor: &CommentPath) -> bool {
        self.0.len() > ancestor.0.len() && self.0.starts_with(&ancestor.0)
    }
}

impl Ord for CommentPath {
    fn cmp(&self, other: &Self) -> Ordering {
        // Vec<i64> compares lexicographically by numeric segment
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for CommentPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CommentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for CommentPath {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AppError::Validation("comment path is empty".to_string()));
        }

        let segments = s
            .split('.')
            .map(|label| match label.parse::<CommentId>() {
                Ok(id) if id > 0 => Ok(id),
                _ => Err(AppError::Validation(format!(
                    "invalid comment path segment '{}' in '{}'",
                    label, s
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self(segments))
    }
}

impl TryFrom<String> for CommentPath {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CommentPath> for String {
    fn from(path: CommentPath) -> Self {
        path.to_string()
    }
}
