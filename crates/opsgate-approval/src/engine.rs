//! The approval engine.

use opsgate_audit::{AuditKind, AuditLog, HistoryAction};
use opsgate_authz::{ApprovalAction, Authorizer, Decision, DenyReason, OperationClass};
use opsgate_core::{
    ActorRole, ApprovalRequest, ApprovalStatus, Caller, OperationPolicy, OperationType, RequestId,
    Timestamp,
};
use opsgate_store::{HistorySeed, StateChange, Store, StoreError};
use opsgate_validate::validate_reason;
use opsgate_wrappers::{ExecutionGuard, WrapperRunner};
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::operations::OperationRegistry;

/// The approval state machine over persistent requests.
///
/// All mutations of approval requests flow through this type; each is
/// one guarded store transaction plus one signed history entry. See
/// the crate docs for the status graph.
pub struct ApprovalEngine {
    store: Store,
    authz: Arc<Authorizer>,
    registry: Arc<OperationRegistry>,
    runner: Arc<WrapperRunner>,
    guard: ExecutionGuard,
    audit: AuditLog,
}

impl ApprovalEngine {
    /// Wire up an engine.
    #[must_use]
    pub fn new(
        store: Store,
        authz: Arc<Authorizer>,
        registry: Arc<OperationRegistry>,
        runner: Arc<WrapperRunner>,
        audit: AuditLog,
    ) -> Self {
        Self {
            store,
            authz,
            registry,
            runner,
            guard: ExecutionGuard::new(),
            audit,
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The operation registry.
    #[must_use]
    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Create a new approval request.
    ///
    /// Refused when the requester may not request the operation, when
    /// the operation's policy does not require approval (execute it
    /// directly instead), or when the payload fails its schema. No
    /// record is created on refusal.
    ///
    /// # Errors
    ///
    /// [`EngineError::Denied`], [`EngineError::PolicyMissing`],
    /// [`EngineError::ApprovalNotRequired`],
    /// [`EngineError::Validation`], or a store/audit failure.
    pub async fn create(
        &self,
        caller: &Caller,
        operation: &OperationType,
        payload: serde_json::Value,
        reason: &str,
    ) -> EngineResult<ApprovalRequest> {
        let Some(spec) = self.registry.get(operation) else {
            self.audit_security(caller, operation.as_str(), "unknown_operation")
                .await?;
            return Err(EngineError::PolicyMissing(operation.clone()));
        };

        if let Decision::Deny(reason) = self.authz.decide(
            caller,
            operation,
            OperationClass::Approval(ApprovalAction::Request),
        ) {
            self.audit_denied(caller, operation.as_str(), "missing_permission")
                .await?;
            return Err(EngineError::Denied(reason));
        }

        let policy = match self.authz.decide(caller, operation, spec.class) {
            Decision::RequiresApproval(policy) => policy,
            Decision::Allow => {
                return Err(EngineError::ApprovalNotRequired(operation.clone()));
            },
            Decision::Deny(DenyReason::PolicyMissing(op)) => {
                self.audit_security(caller, operation.as_str(), "policy_missing")
                    .await?;
                return Err(EngineError::PolicyMissing(op));
            },
            Decision::Deny(reason) => {
                self.audit_denied(caller, operation.as_str(), "missing_permission")
                    .await?;
                return Err(EngineError::Denied(reason));
            },
        };

        if let Err(e) = validate_reason(reason) {
            self.audit_denied(caller, operation.as_str(), "validation_error")
                .await?;
            return Err(e.into());
        }
        // Full payload-schema pass; the derived invocation is discarded
        // here and rebuilt at execution time.
        if let Err(e) = self.registry.build(spec, &payload) {
            self.audit_denied(caller, operation.as_str(), "validation_error")
                .await?;
            return Err(e.into());
        }

        let now = Timestamp::now();
        let request = ApprovalRequest {
            id: RequestId::new(),
            request_type: operation.clone(),
            requester_id: caller.user_id.clone(),
            requester_name: caller.username.clone(),
            payload,
            reason: reason.to_string(),
            status: ApprovalStatus::Pending,
            created_at: now,
            expires_at: now.plus_hours(i64::from(policy.timeout_hours)),
            approved_by: None,
            approved_by_name: None,
            approved_at: None,
            rejection_reason: None,
            execution_result: None,
            executed_at: None,
            executed_by: None,
        };

        let seed = HistorySeed {
            action: HistoryAction::Created,
            actor_id: caller.user_id.to_string(),
            actor_name: caller.username.clone(),
            actor_role: caller.role.into(),
            details: Some(serde_json::json!({"reason": reason})),
            previous_status: None,
            new_status: Some(ApprovalStatus::Pending),
        };
        self.store.insert_request(&request, seed).await?;

        self.audit
            .record(
                AuditKind::Attempt,
                caller.user_id.as_str(),
                operation.as_str(),
                "approval_requested",
                Some(serde_json::json!({
                    "request_id": request.id.to_string(),
                    "risk_level": policy.risk_level.as_str(),
                })),
            )
            .await?;

        tracing::info!(
            request_id = %request.id,
            operation = %operation,
            requester = %caller.user_id,
            "approval request created"
        );
        Ok(request)
    }

    /// Approve a pending request.
    ///
    /// Enforces the approver permission, the policy's approver roles,
    /// the two-person rule, and the expiry deadline - all against the
    /// persisted record. When the policy auto-executes, the request
    /// advances to `executed`/`execution_failed` in the same call with
    /// `executed_by = "system"`.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`], [`EngineError::Denied`],
    /// [`EngineError::SelfApproval`], [`EngineError::StateConflict`],
    /// or a store/audit/gateway failure.
    pub async fn approve(
        &self,
        caller: &Caller,
        id: RequestId,
        comment: Option<&str>,
    ) -> EngineResult<ApprovalRequest> {
        let request = self.store.get(id).await?;
        let policy = self.policy_for(caller, &request.request_type).await?;

        // The two-person rule outranks the permission gate: a requester
        // approving their own request is a security event whatever
        // their role.
        if caller.user_id == request.requester_id {
            self.audit_security(caller, &id.to_string(), "self_approval")
                .await?;
            return Err(EngineError::SelfApproval(id));
        }
        if let Err(reason) = self.authz.may_decide(caller, &policy) {
            self.audit_denied(caller, &id.to_string(), "missing_permission")
                .await?;
            return Err(EngineError::Denied(reason));
        }
        self.ensure_not_expired(caller, &request, "approve").await?;

        let now = Timestamp::now();
        let change = StateChange::approve(caller.user_id.clone(), caller.username.clone(), now);
        let seed = HistorySeed {
            action: HistoryAction::Approved,
            actor_id: caller.user_id.to_string(),
            actor_name: caller.username.clone(),
            actor_role: caller.role.into(),
            details: comment.map(|c| serde_json::json!({"comment": c})),
            previous_status: Some(ApprovalStatus::Pending),
            new_status: Some(ApprovalStatus::Approved),
        };
        let updated = self
            .transition_checked(caller, id, ApprovalStatus::Pending, &change, seed, "approve")
            .await?;

        self.audit
            .record(
                AuditKind::Success,
                caller.user_id.as_str(),
                id.to_string(),
                "approved",
                None,
            )
            .await?;

        if policy.auto_execute {
            return self
                .run_execution(updated, "system", "system", ActorRole::System)
                .await;
        }
        Ok(updated)
    }

    /// Reject a pending request. The rejection reason is mandatory.
    ///
    /// # Errors
    ///
    /// Same classes as [`Self::approve`], plus
    /// [`EngineError::Validation`] for an empty or malformed reason.
    pub async fn reject(
        &self,
        caller: &Caller,
        id: RequestId,
        reason: &str,
    ) -> EngineResult<ApprovalRequest> {
        validate_reason(reason)?;
        let request = self.store.get(id).await?;
        let policy = self.policy_for(caller, &request.request_type).await?;

        if let Err(deny) = self.authz.may_decide(caller, &policy) {
            self.audit_denied(caller, &id.to_string(), "missing_permission")
                .await?;
            return Err(EngineError::Denied(deny));
        }
        self.ensure_not_expired(caller, &request, "reject").await?;

        let seed = HistorySeed {
            action: HistoryAction::Rejected,
            actor_id: caller.user_id.to_string(),
            actor_name: caller.username.clone(),
            actor_role: caller.role.into(),
            details: Some(serde_json::json!({"reason": reason})),
            previous_status: Some(ApprovalStatus::Pending),
            new_status: Some(ApprovalStatus::Rejected),
        };
        let updated = self
            .transition_checked(
                caller,
                id,
                ApprovalStatus::Pending,
                &StateChange::reject(reason),
                seed,
                "reject",
            )
            .await?;

        self.audit
            .record(
                AuditKind::Success,
                caller.user_id.as_str(),
                id.to_string(),
                "rejected",
                None,
            )
            .await?;
        Ok(updated)
    }

    /// Cancel a pending request. Only the requester may cancel.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotRequester`] when the caller is not the
    /// requester; otherwise the same classes as [`Self::approve`].
    pub async fn cancel(
        &self,
        caller: &Caller,
        id: RequestId,
        reason: Option<&str>,
    ) -> EngineResult<ApprovalRequest> {
        let request = self.store.get(id).await?;
        if caller.user_id != request.requester_id {
            self.audit_denied(caller, &id.to_string(), "not_requester")
                .await?;
            return Err(EngineError::NotRequester(id));
        }
        self.ensure_not_expired(caller, &request, "cancel").await?;

        let seed = HistorySeed {
            action: HistoryAction::Cancelled,
            actor_id: caller.user_id.to_string(),
            actor_name: caller.username.clone(),
            actor_role: caller.role.into(),
            details: reason.map(|r| serde_json::json!({"reason": r})),
            previous_status: Some(ApprovalStatus::Pending),
            new_status: Some(ApprovalStatus::Cancelled),
        };
        let updated = self
            .transition_checked(
                caller,
                id,
                ApprovalStatus::Pending,
                &StateChange::cancel(),
                seed,
                "cancel",
            )
            .await?;

        self.audit
            .record(
                AuditKind::Success,
                caller.user_id.as_str(),
                id.to_string(),
                "cancelled",
                None,
            )
            .await?;
        Ok(updated)
    }

    /// Execute an approved request through the wrapper gateway.
    ///
    /// # Errors
    ///
    /// [`EngineError::Denied`], [`EngineError::StateConflict`],
    /// [`EngineError::ExecutionInFlight`], or a store/audit failure.
    /// Wrapper-level failures persist as `execution_failed` and are
    /// returned in the record, not as errors.
    pub async fn execute(&self, caller: &Caller, id: RequestId) -> EngineResult<ApprovalRequest> {
        let request = self.store.get(id).await?;
        let policy = self.policy_for(caller, &request.request_type).await?;

        if let Decision::Deny(reason) = self.authz.decide(
            caller,
            &request.request_type,
            OperationClass::Approval(ApprovalAction::ExecuteApproved),
        ) {
            self.audit_denied(caller, &id.to_string(), "missing_permission")
                .await?;
            return Err(EngineError::Denied(reason));
        }
        if request.status != ApprovalStatus::Approved || policy.auto_execute {
            self.audit_denied(caller, &id.to_string(), "state_conflict")
                .await?;
            return Err(EngineError::StateConflict {
                id,
                action: "execute",
                status: request.status,
            });
        }

        self.run_execution(
            request,
            caller.user_id.as_str(),
            &caller.username,
            caller.role.into(),
        )
        .await
    }

    /// Expire every overdue pending request. Duplicate ticks are
    /// no-ops; concurrent losers are skipped silently.
    ///
    /// # Errors
    ///
    /// Returns the first store or audit failure.
    pub async fn expire_due(&self, now: Timestamp) -> EngineResult<usize> {
        let due = self.store.due_for_expiry(now).await?;
        let mut expired = 0usize;
        for id in due {
            match self.expire_one(id).await {
                Ok(()) => expired = expired.saturating_add(1),
                Err(EngineError::StateConflict { .. } | EngineError::NotFound(_)) => {},
                Err(e) => return Err(e),
            }
        }
        if expired > 0 {
            tracing::info!(count = expired, "expired overdue approval requests");
        }
        Ok(expired)
    }

    // -- internals --

    async fn expire_one(&self, id: RequestId) -> EngineResult<()> {
        let seed = HistorySeed {
            action: HistoryAction::Expired,
            actor_id: "system".to_string(),
            actor_name: "system".to_string(),
            actor_role: ActorRole::System,
            details: None,
            previous_status: Some(ApprovalStatus::Pending),
            new_status: Some(ApprovalStatus::Expired),
        };
        match self
            .store
            .transition(id, ApprovalStatus::Pending, &StateChange::expire(), seed)
            .await
        {
            Ok(_) => {
                self.audit
                    .record(AuditKind::Success, "system", id.to_string(), "expired", None)
                    .await?;
                Ok(())
            },
            Err(StoreError::StateConflict { actual, .. }) => Err(EngineError::StateConflict {
                id,
                action: "expire",
                status: actual,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Guard shared by approve/reject/cancel: an overdue pending
    /// request is expired on the spot, then reported as a conflict.
    async fn ensure_not_expired(
        &self,
        caller: &Caller,
        request: &ApprovalRequest,
        action: &'static str,
    ) -> EngineResult<()> {
        if request.status != ApprovalStatus::Pending {
            self.audit_denied(caller, &request.id.to_string(), "state_conflict")
                .await?;
            return Err(EngineError::StateConflict {
                id: request.id,
                action,
                status: request.status,
            });
        }
        if request.is_expired_at(Timestamp::now()) {
            // Lazy tick; losing the race to the sweeper is fine.
            match self.expire_one(request.id).await {
                Ok(()) | Err(EngineError::StateConflict { .. }) => {},
                Err(e) => return Err(e),
            }
            self.audit_denied(caller, &request.id.to_string(), "state_conflict")
                .await?;
            return Err(EngineError::StateConflict {
                id: request.id,
                action,
                status: ApprovalStatus::Expired,
            });
        }
        Ok(())
    }

    async fn policy_for(
        &self,
        caller: &Caller,
        operation: &OperationType,
    ) -> EngineResult<OperationPolicy> {
        match self.authz.policies().get(operation) {
            Some(policy) => Ok(policy.clone()),
            None => {
                self.audit_security(caller, operation.as_str(), "policy_missing")
                    .await?;
                Err(EngineError::PolicyMissing(operation.clone()))
            },
        }
    }

    async fn transition_checked(
        &self,
        caller: &Caller,
        id: RequestId,
        expected: ApprovalStatus,
        change: &StateChange,
        seed: HistorySeed,
        action: &'static str,
    ) -> EngineResult<ApprovalRequest> {
        match self.store.transition(id, expected, change, seed).await {
            Ok(updated) => Ok(updated),
            Err(StoreError::StateConflict { actual, .. }) => {
                self.audit_denied(caller, &id.to_string(), "state_conflict")
                    .await?;
                Err(EngineError::StateConflict {
                    id,
                    action,
                    status: actual,
                })
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Run the wrapper for an approved request and persist the final
    /// state. Wrapper and gateway failures both land in
    /// `execution_failed` with a persisted result.
    async fn run_execution(
        &self,
        request: ApprovalRequest,
        executor_id: &str,
        executor_name: &str,
        executor_role: ActorRole,
    ) -> EngineResult<ApprovalRequest> {
        let id = request.id;
        let Some(spec) = self.registry.get(&request.request_type) else {
            return Err(EngineError::PolicyMissing(request.request_type.clone()));
        };

        let Some(_slot) = self
            .guard
            .try_acquire(request.requester_id.as_str(), request.request_type.as_str())
        else {
            return Err(EngineError::ExecutionInFlight(id));
        };

        let (success, result_value, summary) = match self.registry.build(spec, &request.payload) {
            Err(e) => (
                false,
                serde_json::json!({"reason": "validation", "error": e.to_string()}),
                "validation".to_string(),
            ),
            Ok(invocation) => {
                match self
                    .runner
                    .run(executor_id, invocation.wrapper_id, invocation.argv, invocation.stdin)
                    .await
                {
                    Ok(result) => {
                        let summary = result
                            .failure
                            .map_or_else(|| "ok".to_string(), |f| f.as_str().to_string());
                        (result.is_success(), result.to_value(), summary)
                    },
                    Err(opsgate_wrappers::GatewayError::Audit(e)) => {
                        // Audit unavailability is fatal, not a wrapper failure.
                        return Err(EngineError::Audit(e));
                    },
                    Err(e) => (
                        false,
                        serde_json::json!({"reason": "gateway", "error": e.to_string()}),
                        "gateway".to_string(),
                    ),
                }
            },
        };

        let now = Timestamp::now();
        let seed = HistorySeed {
            action: if success {
                HistoryAction::Executed
            } else {
                HistoryAction::ExecutionFailed
            },
            actor_id: executor_id.to_string(),
            actor_name: executor_name.to_string(),
            actor_role: executor_role,
            details: Some(serde_json::json!({"summary": summary})),
            previous_status: Some(ApprovalStatus::Approved),
            new_status: Some(if success {
                ApprovalStatus::Executed
            } else {
                ApprovalStatus::ExecutionFailed
            }),
        };
        let change = StateChange::executed(success, result_value, executor_id, now);

        match self
            .store
            .transition(id, ApprovalStatus::Approved, &change, seed)
            .await
        {
            Ok(updated) => Ok(updated),
            Err(StoreError::StateConflict { actual, .. }) => Err(EngineError::StateConflict {
                id,
                action: "execute",
                status: actual,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn audit_denied(&self, caller: &Caller, target: &str, outcome: &str) -> EngineResult<()> {
        self.audit
            .record(AuditKind::Denied, caller.user_id.as_str(), target, outcome, None)
            .await?;
        Ok(())
    }

    async fn audit_security(
        &self,
        caller: &Caller,
        target: &str,
        outcome: &str,
    ) -> EngineResult<()> {
        self.audit
            .record(AuditKind::Security, caller.user_id.as_str(), target, outcome, None)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for ApprovalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalEngine").finish_non_exhaustive()
    }
}
