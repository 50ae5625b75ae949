//! The kernel facade and its bootstrap.

use opsgate_approval::{ApprovalEngine, OperationRegistry, RegistryContext, Sweeper};
use opsgate_audit::{AuditKind, AuditLog, HistorySigner, TracingSink};
use opsgate_authz::{ApprovalAction, Authorizer, Decision, DenyReason, PolicyTable, RoleMap};
use opsgate_config::Config;
use opsgate_core::{
    ApprovalRequest, ApprovalStatus, Caller, OperationPolicy, OperationType, RequestId, Timestamp,
    UserId,
};
use opsgate_store::{HistoryFilter, ListFilter, Paging, Store};
use opsgate_wrappers::{
    ExecutionGuard, GatewayLimits, WrapperRegistry, WrapperRunner, WrapperSpec,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ApiError, ApiResult, codes, failure_code};
use crate::types::{
    ActionResponse, DecisionView, ExecuteResponse, HistoryPage, ListPage, RequestSummary, Stats,
};

/// Errors that abort startup.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Configuration invalid.
    #[error(transparent)]
    Config(#[from] opsgate_config::ConfigError),
    /// Database unavailable.
    #[error(transparent)]
    Store(#[from] opsgate_store::StoreError),
    /// Authorization tables invalid.
    #[error(transparent)]
    Authz(#[from] opsgate_authz::AuthzError),
    /// Key material invalid.
    #[error(transparent)]
    Audit(#[from] opsgate_audit::AuditError),
    /// Wrapper registry invalid.
    #[error(transparent)]
    Gateway(#[from] opsgate_wrappers::GatewayError),
}

/// The assembled broker core.
pub struct Kernel {
    engine: Arc<ApprovalEngine>,
    authz: Arc<Authorizer>,
    registry: Arc<OperationRegistry>,
    runner: Arc<WrapperRunner>,
    store: Store,
    audit: AuditLog,
    guard: ExecutionGuard,
    sweeper_period: Duration,
}

impl Kernel {
    /// Assemble every component from a validated configuration.
    ///
    /// Opens (or creates) the database, seeds policies, loads the
    /// policy table, and wires the wrapper registry. All returned
    /// state is immutable except through the documented calls.
    ///
    /// # Errors
    ///
    /// Returns a [`BootstrapError`] naming the failing subsystem.
    pub async fn bootstrap(config: &Config) -> Result<Self, BootstrapError> {
        let key = config.hmac_key()?;
        let signer = HistorySigner::new(&key)?;
        let audit = AuditLog::new(Arc::new(TracingSink));

        let store = Store::open(&config.database.path, signer).await?;
        store.seed_policies(&config.seed_policies()?).await?;
        let policy_table = PolicyTable::from_policies(store.load_policies().await?)?;
        let authz = Arc::new(Authorizer::new(
            Arc::new(RoleMap::builtin()),
            Arc::new(policy_table),
        ));

        let mut wrappers = WrapperRegistry::new();
        for wrapper in &config.wrappers {
            let mut spec = WrapperSpec::new(&wrapper.id, &wrapper.path, wrapper.min_args);
            if let Some(secs) = wrapper.timeout_secs {
                spec = spec.with_timeout(Duration::from_secs(secs));
            }
            let chars: Vec<char> = wrapper
                .allow_chars
                .iter()
                .filter_map(|s| s.chars().next())
                .collect();
            if !chars.is_empty() {
                spec = spec.with_allowed_chars(&chars);
            }
            wrappers.register(spec)?;
        }

        let limits = GatewayLimits {
            max_concurrency: config.gateway.max_concurrency,
            queue_timeout: Duration::from_millis(config.gateway.queue_timeout_ms),
            allowed_path_prefixes: config
                .gateway
                .allowed_path_prefixes
                .iter()
                .map(PathBuf::from)
                .collect(),
        };
        let runner = Arc::new(WrapperRunner::new(
            Arc::new(wrappers),
            limits,
            audit.clone(),
        ));

        let registry = Arc::new(OperationRegistry::builtin(RegistryContext {
            allowed_cron_commands: config.gateway.allowed_cron_commands.clone(),
        }));

        let engine = Arc::new(ApprovalEngine::new(
            store.clone(),
            Arc::clone(&authz),
            Arc::clone(&registry),
            Arc::clone(&runner),
            audit.clone(),
        ));

        tracing::info!(
            database = %config.database.path,
            wrappers = config.wrappers.len(),
            policies = config.policies.len(),
            "opsgate kernel assembled"
        );
        Ok(Self {
            engine,
            authz,
            registry,
            runner,
            store,
            audit,
            guard: ExecutionGuard::new(),
            sweeper_period: Duration::from_secs(config.sweeper.period_secs),
        })
    }

    /// Spawn the expiry sweeper on the current runtime.
    #[must_use]
    pub fn start_sweeper(&self) -> Sweeper {
        Sweeper::spawn(Arc::clone(&self.engine), self.sweeper_period)
    }

    /// The approval engine (for tests and embedding).
    #[must_use]
    pub fn engine(&self) -> &Arc<ApprovalEngine> {
        &self.engine
    }

    // -- Direct operations --

    /// Decide whether `caller` may perform `operation`.
    ///
    /// # Errors
    ///
    /// `validation_error`, `policy_missing`, `missing_permission`, or
    /// `audit_failure`.
    pub async fn authorize(&self, caller: &Caller, operation: &str) -> ApiResult<DecisionView> {
        let operation = parse_operation(operation)?;
        let Some(spec) = self.registry.get(&operation) else {
            self.audit_security(caller, operation.as_str(), "unknown_operation")
                .await?;
            return Err(ApiError::new(
                codes::POLICY_MISSING,
                format!("no policy for operation {operation}"),
            ));
        };
        match self.authz.decide(caller, &operation, spec.class) {
            Decision::Allow => Ok(DecisionView::Allow),
            Decision::RequiresApproval(policy) => Ok(DecisionView::RequiresApproval {
                risk_level: policy.risk_level,
                timeout_hours: policy.timeout_hours,
            }),
            Decision::Deny(reason) => Err(self.deny(caller, operation.as_str(), reason).await?),
        }
    }

    /// Execute a read-only or approval-exempt operation directly.
    ///
    /// # Errors
    ///
    /// `approval_required` when the operation's policy demands the
    /// workflow; otherwise the §7 code for the failure.
    pub async fn execute(
        &self,
        caller: &Caller,
        operation: &str,
        payload: serde_json::Value,
    ) -> ApiResult<ExecuteResponse> {
        let operation = parse_operation(operation)?;
        let Some(spec) = self.registry.get(&operation) else {
            self.audit_security(caller, operation.as_str(), "unknown_operation")
                .await?;
            return Err(ApiError::new(
                codes::POLICY_MISSING,
                format!("no policy for operation {operation}"),
            ));
        };

        match self.authz.decide(caller, &operation, spec.class) {
            Decision::Allow => {},
            Decision::RequiresApproval(_) => {
                return Err(ApiError::new(
                    codes::APPROVAL_REQUIRED,
                    format!("operation {operation} requires approval"),
                ));
            },
            Decision::Deny(reason) => {
                return Err(self.deny(caller, operation.as_str(), reason).await?);
            },
        }

        let invocation = match self.registry.build(spec, &payload) {
            Ok(invocation) => invocation,
            Err(e) => {
                self.audit_denied(caller, operation.as_str(), "validation_error")
                    .await?;
                return Err(e.into());
            },
        };

        let Some(_slot) = self
            .guard
            .try_acquire(caller.user_id.as_str(), operation.as_str())
        else {
            return Err(ApiError::new(
                codes::STATE_CONFLICT,
                format!("an execution of {operation} is already in flight for this caller"),
            ));
        };

        let result = self
            .runner
            .run(
                caller.user_id.as_str(),
                invocation.wrapper_id,
                invocation.argv,
                invocation.stdin,
            )
            .await?;

        if let Some(reason) = result.failure {
            return Err(ApiError::new(
                failure_code(reason),
                format!("wrapper {} failed: {} ({})", result.wrapper_id, reason, result.stderr),
            ));
        }
        Ok(ExecuteResponse {
            status: "success",
            result: result.json.unwrap_or_else(|| serde_json::json!({})),
            duration_ms: result.duration_ms,
        })
    }

    // -- Approval workflow --

    /// Create an approval request.
    ///
    /// # Errors
    ///
    /// The §7 code for the refusal.
    pub async fn approval_create(
        &self,
        caller: &Caller,
        request_type: &str,
        payload: serde_json::Value,
        reason: &str,
    ) -> ApiResult<RequestSummary> {
        let operation = parse_operation(request_type)?;
        let request = self.engine.create(caller, &operation, payload, reason).await?;
        Ok(RequestSummary::from(&request))
    }

    /// Approve a pending request.
    ///
    /// # Errors
    ///
    /// The §7 code for the refusal.
    pub async fn approval_approve(
        &self,
        caller: &Caller,
        id: &str,
        comment: Option<&str>,
    ) -> ApiResult<ActionResponse> {
        let id = parse_id(id)?;
        let request = self.engine.approve(caller, id, comment).await?;
        Ok(ActionResponse::of(request))
    }

    /// Reject a pending request.
    ///
    /// # Errors
    ///
    /// The §7 code for the refusal.
    pub async fn approval_reject(
        &self,
        caller: &Caller,
        id: &str,
        reason: &str,
    ) -> ApiResult<ActionResponse> {
        let id = parse_id(id)?;
        let request = self.engine.reject(caller, id, reason).await?;
        Ok(ActionResponse::of(request))
    }

    /// Cancel a pending request (requester only).
    ///
    /// # Errors
    ///
    /// The §7 code for the refusal.
    pub async fn approval_cancel(
        &self,
        caller: &Caller,
        id: &str,
        reason: Option<&str>,
    ) -> ApiResult<ActionResponse> {
        let id = parse_id(id)?;
        let request = self.engine.cancel(caller, id, reason).await?;
        Ok(ActionResponse::of(request))
    }

    /// Execute an approved request.
    ///
    /// # Errors
    ///
    /// The §7 code for the refusal.
    pub async fn approval_execute(&self, caller: &Caller, id: &str) -> ApiResult<ActionResponse> {
        let id = parse_id(id)?;
        let request = self.engine.execute(caller, id).await?;
        Ok(ActionResponse::of(request))
    }

    // -- Review surfaces --

    /// List requests matching a filter.
    ///
    /// # Errors
    ///
    /// `missing_permission`, `validation_error`, or `storage_error`.
    pub async fn approval_list(
        &self,
        caller: &Caller,
        status: Option<&str>,
        request_type: Option<&str>,
        requester_id: Option<&str>,
        paging: Paging,
    ) -> ApiResult<ListPage> {
        self.require(caller, ApprovalAction::ViewPending).await?;

        let filter = ListFilter {
            status: status
                .map(|s| {
                    ApprovalStatus::parse(s).ok_or_else(|| {
                        ApiError::new(codes::VALIDATION_ERROR, format!("unknown status {s:?}"))
                    })
                })
                .transpose()?,
            request_type: request_type.map(parse_operation).transpose()?,
            requester_id: requester_id.map(UserId::new),
        };
        let items = self.store.list(&filter, paging).await?;
        Ok(ListPage {
            items: items.iter().map(RequestSummary::from).collect(),
            offset: paging.offset,
            limit: paging.limit,
        })
    }

    /// Fetch one request in full.
    ///
    /// # Errors
    ///
    /// `missing_permission`, `not_found`, or `storage_error`.
    pub async fn approval_detail(&self, caller: &Caller, id: &str) -> ApiResult<ApprovalRequest> {
        self.require(caller, ApprovalAction::ViewPending).await?;
        let id = parse_id(id)?;
        Ok(self.store.get(id).await?)
    }

    /// Page through history entries.
    ///
    /// # Errors
    ///
    /// `missing_permission`, `validation_error`, or `storage_error`.
    pub async fn approval_history(
        &self,
        caller: &Caller,
        request_id: Option<&str>,
        actor_id: Option<&str>,
        action: Option<&str>,
        paging: Paging,
    ) -> ApiResult<HistoryPage> {
        self.require(caller, ApprovalAction::ViewHistory).await?;
        let filter = HistoryFilter {
            request_id: request_id.map(parse_id).transpose()?,
            actor_id: actor_id.map(str::to_string),
            action: action.map(str::to_string),
        };
        let entries = self.store.list_history(&filter, paging).await?;
        Ok(HistoryPage {
            entries,
            offset: paging.offset,
            limit: paging.limit,
        })
    }

    /// Export signed history entries for offline verification.
    ///
    /// # Errors
    ///
    /// `missing_permission` or `storage_error`.
    pub async fn approval_history_export(
        &self,
        caller: &Caller,
        paging: Paging,
    ) -> ApiResult<HistoryPage> {
        self.require(caller, ApprovalAction::ExportHistory).await?;
        let entries = self
            .store
            .list_history(&HistoryFilter::default(), paging)
            .await?;
        Ok(HistoryPage {
            entries,
            offset: paging.offset,
            limit: paging.limit,
        })
    }

    /// Recompute signatures over an id range; returns failing ids.
    ///
    /// # Errors
    ///
    /// `missing_permission` or `storage_error`.
    pub async fn verify_history(
        &self,
        caller: &Caller,
        from_id: i64,
        to_id: i64,
    ) -> ApiResult<Vec<i64>> {
        self.require(caller, ApprovalAction::ExportHistory).await?;
        Ok(self.store.verify_history(from_id, to_id).await?)
    }

    /// The loaded policy table.
    ///
    /// # Errors
    ///
    /// `missing_permission` or `audit_failure`.
    pub async fn approval_policies(&self, caller: &Caller) -> ApiResult<Vec<OperationPolicy>> {
        self.require(caller, ApprovalAction::ViewPolicies).await?;
        let mut policies: Vec<OperationPolicy> =
            self.authz.policies().iter().cloned().collect();
        policies.sort_by(|a, b| a.operation_type.as_str().cmp(b.operation_type.as_str()));
        Ok(policies)
    }

    /// Aggregate statistics for the last `period_days` days (0 = all
    /// time).
    ///
    /// # Errors
    ///
    /// `missing_permission` or `storage_error`.
    pub async fn approval_stats(&self, caller: &Caller, period_days: u32) -> ApiResult<Stats> {
        self.require(caller, ApprovalAction::ViewStats).await?;

        let since = (period_days > 0).then(|| {
            Timestamp::from_datetime(
                chrono::Utc::now() - chrono::Duration::days(i64::from(period_days)),
            )
        });
        let raw = self.store.stats(since).await?;

        let count_of = |status: ApprovalStatus| {
            raw.by_status
                .iter()
                .find(|(name, _)| name == status.as_str())
                .map_or(0, |(_, n)| *n)
        };
        let approved_like = count_of(ApprovalStatus::Approved)
            .saturating_add(count_of(ApprovalStatus::Executed))
            .saturating_add(count_of(ApprovalStatus::ExecutionFailed));
        let decided = approved_like.saturating_add(count_of(ApprovalStatus::Rejected));
        let expired = count_of(ApprovalStatus::Expired);

        #[allow(clippy::cast_precision_loss)]
        let ratio = |part: i64, whole: i64| {
            if whole > 0 { part as f64 / whole as f64 } else { 0.0 }
        };
        Ok(Stats {
            period_days,
            total: raw.total,
            by_status: raw.by_status,
            by_type: raw.by_type,
            approval_rate: ratio(approved_like, decided),
            expired_rate: ratio(expired, raw.total),
        })
    }

    // -- internals --

    async fn require(&self, caller: &Caller, action: ApprovalAction) -> ApiResult<()> {
        match self.authz.require(caller, &action.permission()) {
            Decision::Allow => Ok(()),
            Decision::RequiresApproval(_) | Decision::Deny(_) => {
                self.audit_denied(caller, action.permission().as_str(), "missing_permission")
                    .await?;
                Err(ApiError::new(
                    codes::MISSING_PERMISSION,
                    format!("missing permission {}", action.permission()),
                ))
            },
        }
    }

    async fn deny(
        &self,
        caller: &Caller,
        target: &str,
        reason: DenyReason,
    ) -> ApiResult<ApiError> {
        let code = match &reason {
            DenyReason::PolicyMissing(_) => codes::POLICY_MISSING,
            _ => codes::MISSING_PERMISSION,
        };
        self.audit_denied(caller, target, "denied").await?;
        Ok(ApiError::new(code, reason.to_string()))
    }

    async fn audit_denied(&self, caller: &Caller, target: &str, outcome: &str) -> ApiResult<()> {
        self.audit
            .record(AuditKind::Denied, caller.user_id.as_str(), target, outcome, None)
            .await
            .map_err(ApiError::from)
    }

    async fn audit_security(&self, caller: &Caller, target: &str, outcome: &str) -> ApiResult<()> {
        self.audit
            .record(AuditKind::Security, caller.user_id.as_str(), target, outcome, None)
            .await
            .map_err(ApiError::from)
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel").finish_non_exhaustive()
    }
}

fn parse_operation(token: &str) -> ApiResult<OperationType> {
    OperationType::parse(token)
        .map_err(|e| ApiError::new(codes::VALIDATION_ERROR, e.to_string()))
}

fn parse_id(id: &str) -> ApiResult<RequestId> {
    id.parse()
        .map_err(|_| ApiError::new(codes::VALIDATION_ERROR, format!("invalid request id {id:?}")))
}
