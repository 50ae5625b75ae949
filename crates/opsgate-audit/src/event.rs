//! Audit event model and sinks.

use async_trait::async_trait;
use opsgate_core::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;

use crate::error::{AuditError, AuditResult};

/// Classification of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// An operation is about to run.
    Attempt,
    /// An operation completed successfully.
    Success,
    /// An operation was refused by validation or authorization.
    Denied,
    /// An operation ran and failed.
    Failure,
    /// A security-relevant violation (self-approval, missing policy).
    Security,
}

impl AuditKind {
    /// The snake_case storage representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attempt => "attempt",
            Self::Success => "success",
            Self::Denied => "denied",
            Self::Failure => "failure",
            Self::Security => "security",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record.
///
/// `details` is action-specific JSON and must never contain secrets;
/// callers are responsible for scrubbing before constructing the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event classification.
    pub kind: AuditKind,
    /// Acting principal (user id, or `system`).
    pub actor: String,
    /// What was acted on (operation type, wrapper id, request id).
    pub target: String,
    /// Short outcome word (`ok`, `denied`, `timeout`, ...).
    pub outcome: String,
    /// Action-specific detail payload.
    pub details: Option<serde_json::Value>,
    /// When the event was recorded.
    pub timestamp: Timestamp,
}

impl AuditEvent {
    /// Create a new event stamped with the current time.
    #[must_use]
    pub fn new(
        kind: AuditKind,
        actor: impl Into<String>,
        target: impl Into<String>,
        outcome: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self {
            kind,
            actor: actor.into(),
            target: target.into(),
            outcome: outcome.into(),
            details,
            timestamp: Timestamp::now(),
        }
    }
}

/// Destination for audit events.
///
/// Implementations must be durable before returning; a returned error
/// fails the operation that produced the event.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one event.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::SinkFailure`] if the event could not be
    /// durably recorded.
    async fn append(&self, event: &AuditEvent) -> AuditResult<()>;
}

/// Sink that forwards events to `tracing` as structured records.
///
/// The deployment's log pipeline supplies durability; within the
/// process this sink cannot fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl AuditSink for TracingSink {
    async fn append(&self, event: &AuditEvent) -> AuditResult<()> {
        let details = event
            .details
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        tracing::info!(
            target: "opsgate::audit",
            kind = event.kind.as_str(),
            actor = %event.actor,
            audit_target = %event.target,
            outcome = %event.outcome,
            details = %details,
            timestamp = %event.timestamp,
            "audit"
        );
        Ok(())
    }
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Count of recorded events of a given kind.
    #[must_use]
    pub fn count(&self, kind: AuditKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn append(&self, event: &AuditEvent) -> AuditResult<()> {
        self.events
            .lock()
            .map_err(|_| AuditError::SinkFailure("memory sink poisoned".to_string()))?
            .push(event.clone());
        Ok(())
    }
}

/// The audit log: the single write path for audit events.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
}

impl AuditLog {
    /// Create a log writing through the given sink.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Append one event.
    ///
    /// A sink failure is itself logged, then surfaced: the caller must
    /// fail its operation rather than continue with a lost record.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::SinkFailure`] when the sink rejects the
    /// event.
    pub async fn record(
        &self,
        kind: AuditKind,
        actor: impl Into<String>,
        target: impl Into<String>,
        outcome: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> AuditResult<()> {
        let event = AuditEvent::new(kind, actor, target, outcome, details);
        if let Err(e) = self.sink.append(&event).await {
            tracing::error!(
                target: "opsgate::audit",
                error = %e,
                kind = event.kind.as_str(),
                audit_target = %event.target,
                "failed to persist audit record"
            );
            return Err(e);
        }
        Ok(())
    }
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_records() {
        let sink = Arc::new(MemorySink::new());
        let log = AuditLog::new(Arc::clone(&sink) as Arc<dyn AuditSink>);

        log.record(AuditKind::Attempt, "u-1", "user_add", "starting", None)
            .await
            .unwrap();
        log.record(
            AuditKind::Success,
            "u-1",
            "user_add",
            "ok",
            Some(serde_json::json!({"exit_code": 0})),
        )
        .await
        .unwrap();

        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.count(AuditKind::Attempt), 1);
        assert_eq!(sink.count(AuditKind::Success), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_is_surfaced() {
        struct FailingSink;

        #[async_trait]
        impl AuditSink for FailingSink {
            async fn append(&self, _event: &AuditEvent) -> AuditResult<()> {
                Err(AuditError::SinkFailure("disk full".to_string()))
            }
        }

        let log = AuditLog::new(Arc::new(FailingSink));
        let err = log
            .record(AuditKind::Denied, "u-2", "cron_add", "denied", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::SinkFailure(_)));
    }

    #[tokio::test]
    async fn test_tracing_sink_never_fails() {
        let log = AuditLog::new(Arc::new(TracingSink));
        assert!(
            log.record(AuditKind::Security, "u-3", "req:1", "self_approval", None)
                .await
                .is_ok()
        );
    }
}
