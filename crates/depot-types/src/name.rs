//! Repository name validation.
//!
//! A repository name becomes a directory directly under the repositories
//! root, so it must be a single, plain path component:
//! - Must be non-empty and at most 255 bytes
//! - Must not contain `/`, `\` or NUL
//! - Must not start with `.` (rules out `.`, `..` and hidden directories)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Longest accepted repository name, matching common filesystem limits.
pub const MAX_NAME_LEN: usize = 255;

const FORBIDDEN_CHARS: &[char] = &['/', '\\', '\0'];

/// Validated repository name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoName(String);

impl RepoName {
    /// Validate and wrap a repository name.
    ///
    /// ```
    /// use depot_types::RepoName;
    ///
    /// assert!(RepoName::new("demo").is_ok());
    /// assert!(RepoName::new("..").is_err());
    /// assert!(RepoName::new("a/b").is_err());
    /// ```
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        validate_repo_name(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validate a repository name, returning `Ok(())` if valid.
pub fn validate_repo_name(name: &str) -> Result<(), TypeError> {
    let invalid = |reason: String| TypeError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("repository name must not be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid(format!("longer than {MAX_NAME_LEN} bytes")));
    }
    for ch in FORBIDDEN_CHARS {
        if name.contains(*ch) {
            return Err(invalid(format!("contains forbidden character: {ch:?}")));
        }
    }
    if name.starts_with('.') {
        return Err(invalid("must not start with '.'".into()));
    }
    Ok(())
}

impl fmt::Debug for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoName({})", self.0)
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RepoName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for RepoName {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RepoName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RepoName> for String {
    fn from(name: RepoName) -> Self {
        name.0
    }
}
