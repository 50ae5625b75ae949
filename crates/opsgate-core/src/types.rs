//! Common value types used throughout opsgate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;

/// Unique identifier for an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Create a new random request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a request ID from a UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| CoreError::InvalidRequestId(s.to_string()))
    }
}

/// Timestamp wrapper for consistent UTC handling throughout opsgate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// Get the current timestamp.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create a timestamp from a `DateTime<Utc>`.
    #[must_use]
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Check if this timestamp is in the past.
    #[must_use]
    pub fn is_past(&self) -> bool {
        self.0 < Utc::now()
    }

    /// Add a number of whole hours.
    #[must_use]
    pub fn plus_hours(&self, hours: i64) -> Self {
        Self(self.0 + chrono::Duration::hours(hours))
    }

    /// Get the inner `DateTime<Utc>`.
    #[must_use]
    pub fn into_inner(self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

/// A permission token of the form `verb:object`.
///
/// Permissions are data, not code: the role map assigns sets of these
/// tokens to roles, and the authorizer compares tokens by value. Both
/// halves are lowercase `[a-z_]+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission(String);

impl Permission {
    /// Build a `read:<object>` permission.
    #[must_use]
    pub fn read(object: &str) -> Self {
        Self(format!("read:{object}"))
    }

    /// Build a `write:<object>` permission.
    #[must_use]
    pub fn write(object: &str) -> Self {
        Self(format!("write:{object}"))
    }

    /// Parse a permission token, validating its shape.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPermission`] unless the token is
    /// `verb:object` with both halves lowercase `[a-z_]+`.
    pub fn parse(token: &str) -> Result<Self, CoreError> {
        let valid = match token.split_once(':') {
            Some((verb, object)) => is_lower_token(verb) && is_lower_token(object),
            None => false,
        };
        if valid {
            Ok(Self(token.to_string()))
        } else {
            Err(CoreError::InvalidPermission(token.to_string()))
        }
    }

    /// The token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Permission {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Permission> for String {
    fn from(p: Permission) -> Self {
        p.0
    }
}

/// A privileged operation type token (e.g. `user_add`, `cron_list`).
///
/// Lowercase `[a-z][a-z0-9_]*`. Operation types key the policy table
/// and the operation registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OperationType(String);

impl OperationType {
    /// Parse an operation type token, validating its shape.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperationType`] if the token is empty,
    /// does not start with a lowercase letter, or contains characters
    /// outside `[a-z0-9_]`.
    pub fn parse(token: &str) -> Result<Self, CoreError> {
        let mut chars = token.chars();
        let valid = matches!(chars.next(), Some('a'..='z'))
            && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if valid {
            Ok(Self(token.to_string()))
        } else {
            Err(CoreError::InvalidOperationType(token.to_string()))
        }
    }

    /// The token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OperationType {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OperationType> for String {
    fn from(op: OperationType) -> Self {
        op.0
    }
}

fn is_lower_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_lowercase() || c == '_')
}

/// Risk level classification for privileged operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// Low risk - routine reads and reversible changes.
    Low,
    /// Medium risk - reversible but service-affecting.
    Medium,
    /// High risk - destructive or privilege-affecting.
    High,
    /// Critical risk - host-wide impact, narrow approver set.
    Critical,
}

impl RiskLevel {
    /// Parse from the uppercase storage representation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRiskLevel`] for unknown values.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(CoreError::InvalidRiskLevel(other.to_string())),
        }
    }

    /// The uppercase storage representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
