//! Caller identities and roles.
//!
//! A [`Caller`] is the authenticated principal behind an inbound call:
//! an opaque user id from the identity provider, a display username, and
//! exactly one [`Role`]. Roles are totally ordered by privilege and the
//! role→permission map in `opsgate-authz` assigns supersets upward.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for a user, as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Wrap an identity-provider subject.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The privilege role of a caller.
///
/// Totally ordered: `Viewer < Operator < Approver < Admin`. A higher
/// role's permission set is a superset of every lower role's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Read-only access to host state.
    Viewer,
    /// May execute safe operations and request approval for dangerous ones.
    Operator,
    /// May approve or reject pending requests.
    Approver,
    /// Full access, including executing approved actions and history export.
    Admin,
}

impl Role {
    /// All roles, lowest privilege first.
    pub const ALL: [Role; 4] = [Role::Viewer, Role::Operator, Role::Approver, Role::Admin];

    /// Parse from the snake_case storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "viewer" => Some(Self::Viewer),
            "operator" => Some(Self::Operator),
            "approver" => Some(Self::Approver),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// The snake_case storage representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Operator => "operator",
            Self::Approver => "approver",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The actor recorded on a history entry.
///
/// Identical to [`Role`] plus `System` for engine-initiated transitions
/// (expiry sweeps, auto-execution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// Read-only caller.
    Viewer,
    /// Operator caller.
    Operator,
    /// Approver caller.
    Approver,
    /// Admin caller.
    Admin,
    /// The broker itself (sweeper, auto-execute).
    System,
}

impl ActorRole {
    /// Parse from the snake_case storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "viewer" => Some(Self::Viewer),
            "operator" => Some(Self::Operator),
            "approver" => Some(Self::Approver),
            "admin" => Some(Self::Admin),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    /// The snake_case storage representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Operator => "operator",
            Self::Approver => "approver",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }
}

impl From<Role> for ActorRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Viewer => Self::Viewer,
            Role::Operator => Self::Operator,
            Role::Approver => Self::Approver,
            Role::Admin => Self::Admin,
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Opaque user id from the identity provider.
    pub user_id: UserId,
    /// Display username.
    pub username: String,
    /// The caller's single role.
    pub role: Role,
}

impl Caller {
    /// Create a new caller.
    #[must_use]
    pub fn new(user_id: UserId, username: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            username: username.into(),
            role,
        }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.username, self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(Role::Viewer < Role::Operator);
        assert!(Role::Operator < Role::Approver);
        assert!(Role::Approver < Role::Admin);
    }

    #[test]
    fn test_role_roundtrip() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn test_actor_role_from_role() {
        assert_eq!(ActorRole::from(Role::Admin), ActorRole::Admin);
        assert_eq!(ActorRole::parse("system"), Some(ActorRole::System));
    }

    #[test]
    fn test_caller_display() {
        let caller = Caller::new(UserId::new("u-1"), "alice", Role::Approver);
        assert_eq!(caller.to_string(), "alice (approver)");
    }

    #[test]
    fn test_role_serde() {
        let json = serde_json::to_string(&Role::Approver).unwrap();
        assert_eq!(json, "\"approver\"");
        let back: Role = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Role::Approver);
    }
}
