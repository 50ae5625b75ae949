//! Wrapper invocation results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a wrapper run is considered failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The wrapper exited non-zero.
    NonZeroExit,
    /// The wrapper exceeded its wall-clock budget and was killed.
    Timeout,
    /// The wrapper could not be spawned (missing, not executable).
    Spawn,
    /// The wrapper exited zero but stdout was not a single JSON object.
    Protocol,
    /// The global child-process cap was reached and the queue timed
    /// out. Transient; the caller may retry.
    Overloaded,
}

impl FailureReason {
    /// The snake_case wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonZeroExit => "non_zero_exit",
            Self::Timeout => "timeout",
            Self::Spawn => "spawn",
            Self::Protocol => "protocol",
            Self::Overloaded => "overloaded",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The captured outcome of one wrapper invocation.
///
/// Ephemeral: persisted only as a request's `execution_result` and
/// summarized (lengths, codes, duration - never stdin) in the audit
/// trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrapperResult {
    /// The wrapper that ran.
    pub wrapper_id: String,
    /// Child exit code; `-1` when killed or never spawned.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error, already scrubbed.
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Parsed stdout, when it is valid JSON.
    pub json: Option<serde_json::Value>,
    /// Failure classification; `None` means success.
    pub failure: Option<FailureReason>,
}

impl WrapperResult {
    /// Whether the run succeeded (exit zero, well-formed output).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Serialize for persistence as a request's `execution_result`.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "wrapper_id": self.wrapper_id,
            "exit_code": self.exit_code,
            "stdout": self.stdout,
            "stderr": self.stderr,
            "duration_ms": self.duration_ms,
            "json": self.json,
            "reason": self.failure.map(|f| f.as_str()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_and_failure() {
        let ok = WrapperResult {
            wrapper_id: "user_add".to_string(),
            exit_code: 0,
            stdout: "{\"ok\":true}".to_string(),
            stderr: String::new(),
            duration_ms: 12,
            json: Some(serde_json::json!({"ok": true})),
            failure: None,
        };
        assert!(ok.is_success());

        let failed = WrapperResult {
            failure: Some(FailureReason::Timeout),
            ..ok
        };
        assert!(!failed.is_success());
        assert_eq!(failed.to_value()["reason"], "timeout");
    }
}
