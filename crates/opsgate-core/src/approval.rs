//! The approval request record and its status enumeration.
//!
//! These are plain values: the Approval Engine owns their lifecycle and
//! is the only writer, the store persists them, the kernel serializes
//! them outward. The status graph itself lives here because every layer
//! needs to name it; the transition *guards* live in the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::UserId;
use crate::types::{OperationType, RequestId, Timestamp};

/// Lifecycle status of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Awaiting a decision.
    Pending,
    /// Approved, awaiting execution (terminal when the policy does not
    /// auto-execute and no execute call arrives).
    Approved,
    /// Rejected by an approver.
    Rejected,
    /// Timed out without a decision.
    Expired,
    /// Executed successfully.
    Executed,
    /// Execution ran and failed.
    ExecutionFailed,
    /// Cancelled by the requester.
    Cancelled,
}

impl ApprovalStatus {
    /// All statuses, for constraint generation and tests.
    pub const ALL: [ApprovalStatus; 7] = [
        ApprovalStatus::Pending,
        ApprovalStatus::Approved,
        ApprovalStatus::Rejected,
        ApprovalStatus::Expired,
        ApprovalStatus::Executed,
        ApprovalStatus::ExecutionFailed,
        ApprovalStatus::Cancelled,
    ];

    /// Whether no further transition may leave this status.
    ///
    /// `Approved` is non-terminal: an execute transition may still
    /// follow.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Expired | Self::Executed | Self::ExecutionFailed | Self::Cancelled
        )
    }

    /// Whether the status graph permits `self -> next`.
    #[must_use]
    pub fn can_transition_to(&self, next: ApprovalStatus) -> bool {
        matches!(
            (self, next),
            (
                Self::Pending,
                Self::Approved | Self::Rejected | Self::Expired | Self::Cancelled
            ) | (Self::Approved, Self::Executed | Self::ExecutionFailed)
        )
    }

    /// Parse from the snake_case storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            "executed" => Some(Self::Executed),
            "execution_failed" => Some(Self::ExecutionFailed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// The snake_case storage representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::Executed => "executed",
            Self::ExecutionFailed => "execution_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A privileged-operation approval request.
///
/// Created once, mutated only through engine transitions, never
/// deleted. `payload` is the operation-specific parameter bag, already
/// structurally validated at create time; secrets are stripped from it
/// before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Unique request id.
    pub id: RequestId,
    /// The operation this request asks for.
    pub request_type: OperationType,
    /// Requesting user id.
    pub requester_id: UserId,
    /// Requesting username.
    pub requester_name: String,
    /// Operation-specific parameters.
    pub payload: serde_json::Value,
    /// Why the requester wants this (1-1000 chars).
    pub reason: String,
    /// Current lifecycle status.
    pub status: ApprovalStatus,
    /// Creation time.
    pub created_at: Timestamp,
    /// Hard expiry deadline; always after `created_at`.
    pub expires_at: Timestamp,
    /// Approving user id, if approved. Never equals `requester_id`.
    pub approved_by: Option<UserId>,
    /// Approving username, if approved.
    pub approved_by_name: Option<String>,
    /// Approval time, if approved.
    pub approved_at: Option<Timestamp>,
    /// Rejection reason, if rejected.
    pub rejection_reason: Option<String>,
    /// Wrapper result, if execution was attempted.
    pub execution_result: Option<serde_json::Value>,
    /// Execution time, if execution was attempted.
    pub executed_at: Option<Timestamp>,
    /// Executing user id, or `system` for auto-execution.
    pub executed_by: Option<String>,
}

impl ApprovalRequest {
    /// Whether the request is still awaiting a decision.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    /// Whether the expiry deadline has passed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!ApprovalStatus::Pending.is_terminal());
        assert!(!ApprovalStatus::Approved.is_terminal());
        for status in [
            ApprovalStatus::Rejected,
            ApprovalStatus::Expired,
            ApprovalStatus::Executed,
            ApprovalStatus::ExecutionFailed,
            ApprovalStatus::Cancelled,
        ] {
            assert!(status.is_terminal(), "{status}");
        }
    }

    #[test]
    fn test_transition_graph() {
        use ApprovalStatus as S;
        assert!(S::Pending.can_transition_to(S::Approved));
        assert!(S::Pending.can_transition_to(S::Rejected));
        assert!(S::Pending.can_transition_to(S::Expired));
        assert!(S::Pending.can_transition_to(S::Cancelled));
        assert!(S::Approved.can_transition_to(S::Executed));
        assert!(S::Approved.can_transition_to(S::ExecutionFailed));

        assert!(!S::Pending.can_transition_to(S::Executed));
        assert!(!S::Approved.can_transition_to(S::Rejected));
        assert!(!S::Executed.can_transition_to(S::Approved));
        assert!(!S::Expired.can_transition_to(S::Approved));
        assert!(!S::Cancelled.can_transition_to(S::Executed));
    }

    #[test]
    fn test_status_roundtrip() {
        for status in ApprovalStatus::ALL {
            assert_eq!(ApprovalStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ApprovalStatus::parse("done"), None);
    }

    #[test]
    fn test_expiry_check() {
        let now = Timestamp::now();
        let request = ApprovalRequest {
            id: RequestId::new(),
            request_type: OperationType::parse("user_add").unwrap(),
            requester_id: UserId::new("u-1"),
            requester_name: "op1".to_string(),
            payload: serde_json::json!({"username": "alice"}),
            reason: "onboarding".to_string(),
            status: ApprovalStatus::Pending,
            created_at: now,
            expires_at: now.plus_hours(12),
            approved_by: None,
            approved_by_name: None,
            approved_at: None,
            rejection_reason: None,
            execution_result: None,
            executed_at: None,
            executed_by: None,
        };
        assert!(!request.is_expired_at(now));
        assert!(request.is_expired_at(now.plus_hours(12)));
        assert!(request.is_expired_at(now.plus_hours(13)));
    }
}
