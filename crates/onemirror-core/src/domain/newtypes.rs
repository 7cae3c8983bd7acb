//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and values.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// Remote item identifier
// ============================================================================

/// Identifier of an item in the remote drive
///
/// Format: opaque string, typically like "01BYE5RZ6QN3ZWBTUFOFD3GSPGOHDJD36K"
/// for business drives or "D4648F06C91D9D3D!54927" for personal drives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteId(String);

impl RemoteId {
    /// Create a new RemoteId
    ///
    /// # Errors
    /// Returns error if the ID is empty or contains whitespace or a path separator
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidRemoteId(
                "Remote ID cannot be empty".to_string(),
            ));
        }

        if id.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(DomainError::InvalidRemoteId(format!(
                "Remote ID contains invalid characters: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemoteId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RemoteId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemoteId> for String {
    fn from(id: RemoteId) -> Self {
        id.0
    }
}

// ============================================================================
// Change feed cursor
// ============================================================================

/// Opaque resumption point of the remote change feed
///
/// For the Graph adapter this is the full `@odata.deltaLink` URL. The
/// absence of a cursor (`Option<Cursor>::None`) means "begin a full
/// enumeration", so an empty cursor is rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cursor(String);

impl Cursor {
    /// Create a new Cursor
    ///
    /// # Errors
    /// Returns error if the cursor is empty
    pub fn new(cursor: String) -> Result<Self, DomainError> {
        if cursor.trim().is_empty() {
            return Err(DomainError::InvalidCursor(
                "Cursor cannot be empty".to_string(),
            ));
        }
        Ok(Self(cursor))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Cursor {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for Cursor {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Cursor> for String {
    fn from(cursor: Cursor) -> Self {
        cursor.0
    }
}

// ============================================================================
// Exclusion pattern
// ============================================================================

/// Regular expression matched against forward-slash separated paths
/// relative to the mirror root (e.g. `docs/report.txt`).
///
/// A path is excluded when the pattern matches anywhere in it; anchor the
/// expression with `^`/`$` to match whole paths.
#[derive(Debug, Clone)]
pub struct ExclusionPattern(Regex);

impl ExclusionPattern {
    /// Compile a new exclusion pattern
    ///
    /// # Errors
    /// Returns error if the expression is not a valid regular expression
    pub fn new(pattern: &str) -> Result<Self, DomainError> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|e| DomainError::InvalidPattern(e.to_string()))
    }

    /// Returns true if the relative path is excluded from mirroring
    #[must_use]
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        self.0.is_match(relative_path)
    }

    /// The source text of the pattern
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for ExclusionPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_str())
    }
}

impl FromStr for ExclusionPattern {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
