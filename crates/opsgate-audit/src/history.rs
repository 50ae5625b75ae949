//! Tamper-evident approval history entries.
//!
//! Entries are signed with HMAC-SHA256 over a fixed-order byte
//! serialization of every non-signature field. Any later mutation of a
//! stored row breaks verification; the storage layer additionally
//! denies UPDATE and DELETE outright.

use hmac::{Hmac, Mac};
use opsgate_core::{ActorRole, RequestId, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

use crate::error::{AuditError, AuditResult};

type HmacSha256 = Hmac<Sha256>;

/// Minimum HMAC key length in bytes.
const MIN_KEY_LEN: usize = 32;

/// The action a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    /// Request was created.
    Created,
    /// Request was approved.
    Approved,
    /// Request was rejected.
    Rejected,
    /// Request expired without a decision.
    Expired,
    /// Approved request was executed successfully.
    Executed,
    /// Execution ran and failed.
    ExecutionFailed,
    /// Requester cancelled the request.
    Cancelled,
}

impl HistoryAction {
    /// Parse from the snake_case storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
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
            Self::Created => "created",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::Executed => "executed",
            Self::ExecutionFailed => "execution_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only history entry for an approval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Monotonic entry id, allocated by the store before signing.
    pub id: i64,
    /// The request this entry belongs to.
    pub approval_request_id: RequestId,
    /// What happened.
    pub action: HistoryAction,
    /// Acting user id, or `system`.
    pub actor_id: String,
    /// Acting username, or `system`.
    pub actor_name: String,
    /// The actor's role at the time of the action.
    pub actor_role: ActorRole,
    /// When the action happened.
    pub timestamp: Timestamp,
    /// Action-specific details (comment, execution summary).
    pub details: Option<serde_json::Value>,
    /// Request status before the action.
    pub previous_status: Option<String>,
    /// Request status after the action.
    pub new_status: Option<String>,
    /// Hex-encoded HMAC-SHA256 over the canonical serialization of all
    /// fields above.
    pub signature: String,
}

impl HistoryEntry {
    /// Canonical byte serialization of the non-signature fields.
    ///
    /// Fixed field order, length-prefixed variable fields, so no two
    /// distinct entries share a byte representation.
    #[must_use]
    pub fn signing_data(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&self.id.to_le_bytes());
        data.extend_from_slice(self.approval_request_id.0.as_bytes());
        push_str(&mut data, self.action.as_str());
        push_str(&mut data, &self.actor_id);
        push_str(&mut data, &self.actor_name);
        push_str(&mut data, self.actor_role.as_str());
        data.extend_from_slice(&self.timestamp.0.timestamp_micros().to_le_bytes());
        match &self.details {
            Some(details) => push_str(&mut data, &details.to_string()),
            None => push_str(&mut data, ""),
        }
        push_str(&mut data, self.previous_status.as_deref().unwrap_or(""));
        push_str(&mut data, self.new_status.as_deref().unwrap_or(""));
        data
    }
}

fn push_str(data: &mut Vec<u8>, s: &str) {
    data.extend_from_slice(&(s.len() as u64).to_le_bytes());
    data.extend_from_slice(s.as_bytes());
}

/// Process-wide signer for history entries.
///
/// Holds the HMAC key loaded from configuration at startup; immutable
/// thereafter.
#[derive(Clone)]
pub struct HistorySigner {
    key: Vec<u8>,
}

impl HistorySigner {
    /// Create a signer from a raw key.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::KeyTooShort`] for keys under 32 bytes.
    pub fn new(key: &[u8]) -> AuditResult<Self> {
        if key.len() < MIN_KEY_LEN {
            return Err(AuditError::KeyTooShort { len: key.len() });
        }
        Ok(Self { key: key.to_vec() })
    }

    /// Compute the hex signature for an entry (ignoring its current
    /// `signature` field).
    #[must_use]
    pub fn sign(&self, entry: &HistoryEntry) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("HMAC accepts keys of any length");
        mac.update(&entry.signing_data());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Check an entry's stored signature.
    #[must_use]
    pub fn verify(&self, entry: &HistoryEntry) -> bool {
        // Constant-time comparison via the Mac verifier.
        let Ok(expected) = hex::decode(&entry.signature) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("HMAC accepts keys of any length");
        mac.update(&entry.signing_data());
        mac.verify_slice(&expected).is_ok()
    }
}

impl fmt::Debug for HistorySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never expose key material, even in debug output.
        f.debug_struct("HistorySigner").finish_non_exhaustive()
    }
}

/// Verify a batch of entries, returning the ids that fail.
#[must_use]
pub fn verify_entries(signer: &HistorySigner, entries: &[HistoryEntry]) -> Vec<i64> {
    entries
        .iter()
        .filter(|e| !signer.verify(e))
        .map(|e| e.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsgate_core::ActorRole;

    fn test_signer() -> HistorySigner {
        HistorySigner::new(&[7u8; 32]).unwrap()
    }

    fn sample_entry(signer: &HistorySigner) -> HistoryEntry {
        let mut entry = HistoryEntry {
            id: 1,
            approval_request_id: RequestId::new(),
            action: HistoryAction::Created,
            actor_id: "u-1".to_string(),
            actor_name: "op1".to_string(),
            actor_role: ActorRole::Operator,
            timestamp: Timestamp::now(),
            details: Some(serde_json::json!({"reason": "onboarding"})),
            previous_status: None,
            new_status: Some("pending".to_string()),
            signature: String::new(),
        };
        entry.signature = signer.sign(&entry);
        entry
    }

    #[test]
    fn test_key_length_enforced() {
        assert!(HistorySigner::new(&[0u8; 31]).is_err());
        assert!(HistorySigner::new(&[0u8; 32]).is_ok());
        assert!(HistorySigner::new(&[0u8; 64]).is_ok());
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = test_signer();
        let entry = sample_entry(&signer);
        assert!(signer.verify(&entry));
    }

    #[test]
    fn test_tampering_detected() {
        let signer = test_signer();

        let mut tampered = sample_entry(&signer);
        tampered.actor_id = "u-9".to_string();
        assert!(!signer.verify(&tampered));

        let mut tampered = sample_entry(&signer);
        tampered.action = HistoryAction::Approved;
        assert!(!signer.verify(&tampered));

        let mut tampered = sample_entry(&signer);
        tampered.id = 2;
        assert!(!signer.verify(&tampered));

        let mut tampered = sample_entry(&signer);
        tampered.new_status = Some("approved".to_string());
        assert!(!signer.verify(&tampered));
    }

    #[test]
    fn test_wrong_key_fails() {
        let signer = test_signer();
        let entry = sample_entry(&signer);
        let other = HistorySigner::new(&[8u8; 32]).unwrap();
        assert!(!other.verify(&entry));
    }

    #[test]
    fn test_garbage_signature_fails() {
        let signer = test_signer();
        let mut entry = sample_entry(&signer);
        entry.signature = "zz-not-hex".to_string();
        assert!(!signer.verify(&entry));
    }

    #[test]
    fn test_verify_entries_reports_ids() {
        let signer = test_signer();
        let good = sample_entry(&signer);
        let mut bad = sample_entry(&signer);
        bad.id = 42;
        bad.actor_name = "mallory".to_string();

        let failed = verify_entries(&signer, &[good, bad]);
        assert_eq!(failed, vec![42]);
    }

    #[test]
    fn test_history_action_roundtrip() {
        for action in [
            HistoryAction::Created,
            HistoryAction::Approved,
            HistoryAction::Rejected,
            HistoryAction::Expired,
            HistoryAction::Executed,
            HistoryAction::ExecutionFailed,
            HistoryAction::Cancelled,
        ] {
            assert_eq!(HistoryAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(HistoryAction::parse("redone"), None);
    }
}
