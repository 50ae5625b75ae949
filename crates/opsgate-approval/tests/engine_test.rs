//! End-to-end engine tests: full lifecycle against an in-memory store
//! and real wrapper processes (temp shell scripts).

use opsgate_approval::{ApprovalEngine, EngineError, OperationRegistry, RegistryContext};
use opsgate_audit::{AuditKind, AuditLog, HistoryAction, HistorySigner, MemorySink};
use opsgate_authz::{Authorizer, PolicyTable, RoleMap};
use opsgate_core::{
    ApprovalStatus, Caller, OperationPolicy, OperationType, RiskLevel, Role, Timestamp, UserId,
};
use opsgate_store::Store;
use opsgate_wrappers::{GatewayLimits, WrapperRegistry, WrapperRunner, WrapperSpec};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const WRAPPER_IDS: &[&str] = &[
    "user_add", "user_delete", "user_modify", "user_passwd",
    "group_add", "group_delete", "group_modify",
    "cron_add", "cron_delete", "cron_modify",
    "service_stop", "firewall_modify",
    "process_list", "user_list", "cron_list", "service_status",
];

/// A wrapper script that records its argv and stdin, then speaks the
/// JSON protocol.
const RECORDING_SCRIPT: &str = r#"dir="$(dirname "$0")"
printf '%s\n' "$@" > "$dir/args.txt"
cat > "$dir/stdin.txt"
echo '{"ok":true}'"#;

struct Harness {
    engine: Arc<ApprovalEngine>,
    sink: Arc<MemorySink>,
    dir: tempfile::TempDir,
}

impl Harness {
    fn recorded_args(&self) -> Vec<String> {
        let raw = std::fs::read_to_string(self.dir.path().join("args.txt")).unwrap_or_default();
        raw.lines().map(str::to_string).collect()
    }

    fn recorded_stdin(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("stdin.txt")).unwrap_or_default()
    }
}

fn policy(op: &str, hours: u32, auto_execute: bool, risk: RiskLevel) -> OperationPolicy {
    OperationPolicy {
        operation_type: OperationType::parse(op).unwrap(),
        description: format!("{op} policy"),
        approval_required: true,
        approver_roles: vec![Role::Approver, Role::Admin],
        approval_count: 1,
        timeout_hours: hours,
        auto_execute,
        risk_level: risk,
        created_at: Timestamp::now(),
        updated_at: Timestamp::now(),
    }
}

fn default_policies() -> Vec<OperationPolicy> {
    let mut direct = policy("service_stop", 24, false, RiskLevel::Medium);
    direct.approval_required = false;
    vec![
        policy("user_add", 24, false, RiskLevel::High),
        policy("user_delete", 12, false, RiskLevel::High),
        policy("user_passwd", 24, false, RiskLevel::High),
        policy("cron_add", 12, false, RiskLevel::Medium),
        policy("group_add", 24, false, RiskLevel::Medium),
        direct,
    ]
}

async fn build_harness(
    script_body: &str,
    policies: Vec<OperationPolicy>,
    wrapper_timeout: Duration,
) -> Harness {
    let dir = tempfile::TempDir::new().unwrap();
    let script = dir.path().join("wrapper.sh");
    std::fs::write(&script, format!("#!/bin/sh\n{script_body}\n")).unwrap();
    let mut perms = std::fs::metadata(&script).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&script, perms).unwrap();

    let mut wrappers = WrapperRegistry::new();
    for id in WRAPPER_IDS {
        let mut spec = WrapperSpec::new(*id, &script, 0).with_timeout(wrapper_timeout);
        if id.starts_with("cron") {
            spec = spec.with_allowed_chars(&['*', ',', '/']);
        }
        wrappers.register(spec).unwrap();
    }

    let sink = Arc::new(MemorySink::new());
    let audit = AuditLog::new(Arc::clone(&sink) as Arc<dyn opsgate_audit::AuditSink>);
    let store = Store::in_memory(HistorySigner::new(&[9u8; 32]).unwrap())
        .await
        .unwrap();
    store.seed_policies(&policies).await.unwrap();

    let authz = Arc::new(Authorizer::new(
        Arc::new(RoleMap::builtin()),
        Arc::new(PolicyTable::from_policies(store.load_policies().await.unwrap()).unwrap()),
    ));
    let registry = Arc::new(OperationRegistry::builtin(RegistryContext {
        allowed_cron_commands: vec!["/usr/local/bin/backup.sh".to_string()],
    }));
    let runner = Arc::new(WrapperRunner::new(
        Arc::new(wrappers),
        GatewayLimits {
            allowed_path_prefixes: vec![PathBuf::from("/")],
            ..GatewayLimits::default()
        },
        audit.clone(),
    ));

    let engine = Arc::new(ApprovalEngine::new(store, authz, registry, runner, audit));
    Harness { engine, sink, dir }
}

async fn harness() -> Harness {
    build_harness(RECORDING_SCRIPT, default_policies(), Duration::from_secs(5)).await
}

fn operator() -> Caller {
    Caller::new(UserId::new("u-op1"), "op1", Role::Operator)
}

fn approver() -> Caller {
    Caller::new(UserId::new("u-ap1"), "ap1", Role::Approver)
}

fn second_approver() -> Caller {
    Caller::new(UserId::new("u-ap2"), "ap2", Role::Approver)
}

fn admin() -> Caller {
    Caller::new(UserId::new("u-ad1"), "ad1", Role::Admin)
}

fn op(name: &str) -> OperationType {
    OperationType::parse(name).unwrap()
}

fn bcrypt_hash() -> String {
    format!("$2b$12${}", ".".repeat(53))
}

fn user_add_payload() -> serde_json::Value {
    serde_json::json!({
        "username": "alice",
        "groups": ["users"],
        "shell": "/bin/bash",
        "home": "/home/alice",
        "password_hash": bcrypt_hash(),
    })
}

#[tokio::test]
async fn happy_path_user_add() {
    let h = harness().await;

    let created = h
        .engine
        .create(&operator(), &op("user_add"), user_add_payload(), "onboarding")
        .await
        .unwrap();
    assert_eq!(created.status, ApprovalStatus::Pending);

    // Created payload reads back byte-identical.
    let detail = h.engine.store().get(created.id).await.unwrap();
    assert_eq!(detail.payload, user_add_payload());

    let approved = h.engine.approve(&approver(), created.id, Some("ok")).await.unwrap();
    assert_eq!(approved.status, ApprovalStatus::Approved);
    assert_eq!(approved.approved_by, Some(UserId::new("u-ap1")));

    let executed = h.engine.execute(&admin(), created.id).await.unwrap();
    assert_eq!(executed.status, ApprovalStatus::Executed);
    assert_eq!(executed.executed_by.as_deref(), Some("u-ad1"));
    assert!(executed.execution_result.is_some());

    // History: created by op1, approved by ap1, executed by ad1, with
    // monotonic ids and non-decreasing timestamps.
    let history = h.engine.store().history_for_request(created.id).await.unwrap();
    let actions: Vec<_> = history.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![HistoryAction::Created, HistoryAction::Approved, HistoryAction::Executed]
    );
    assert_eq!(history[0].actor_id, "u-op1");
    assert_eq!(history[1].actor_id, "u-ap1");
    assert_eq!(history[2].actor_id, "u-ad1");
    assert!(history.windows(2).all(|w| w[0].id < w[1].id));
    assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    // The wrapper saw the documented argv and the hash on stdin.
    assert_eq!(
        h.recorded_args(),
        vec![
            "--username=alice",
            "--groups=users",
            "--shell=/bin/bash",
            "--home=/home/alice",
        ]
    );
    assert_eq!(h.recorded_stdin(), bcrypt_hash());

    // All signatures verify.
    assert!(h.engine.store().verify_history(1, i64::MAX).await.unwrap().is_empty());
}

#[tokio::test]
async fn self_approval_rejected() {
    let h = harness().await;
    let requester = operator();

    let created = h
        .engine
        .create(
            &requester,
            &op("cron_add"),
            serde_json::json!({
                "user": "alice",
                "schedule": "*/10 * * * *",
                "command": "/usr/local/bin/backup.sh",
            }),
            "nightly backups",
        )
        .await
        .unwrap();

    // The two-person rule trips before any permission check: the
    // requester self-approving is a security event even though an
    // Operator could not approve anything anyway.
    let denied_before = h.sink.count(AuditKind::Denied);
    let err = h.engine.approve(&requester, created.id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::SelfApproval(_)));
    assert_eq!(h.sink.count(AuditKind::Security), 1);
    assert_eq!(h.sink.count(AuditKind::Denied), denied_before);

    let detail = h.engine.store().get(created.id).await.unwrap();
    assert_eq!(detail.status, ApprovalStatus::Pending);
    let history = h.engine.store().history_for_request(created.id).await.unwrap();
    assert_eq!(history.len(), 1);

    // Same outcome when the requester does hold the approver role.
    let requesting_approver = approver();
    let created = h
        .engine
        .create(&requesting_approver, &op("user_add"), user_add_payload(), "onboarding")
        .await
        .unwrap();
    let err = h
        .engine
        .approve(&requesting_approver, created.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SelfApproval(_)));
}

#[tokio::test]
async fn expiry_sweep_and_late_approve() {
    let h = harness().await;
    let created = h
        .engine
        .create(
            &operator(),
            &op("user_delete"),
            serde_json::json!({"username": "mallory"}),
            "offboarding",
        )
        .await
        .unwrap();

    // Nothing is due yet.
    assert_eq!(h.engine.expire_due(Timestamp::now()).await.unwrap(), 0);

    // 13 hours later (policy timeout is 12): the sweep expires it.
    let later = Timestamp::now().plus_hours(13);
    assert_eq!(h.engine.expire_due(later).await.unwrap(), 1);
    // Duplicate tick is a no-op.
    assert_eq!(h.engine.expire_due(later).await.unwrap(), 0);

    let detail = h.engine.store().get(created.id).await.unwrap();
    assert_eq!(detail.status, ApprovalStatus::Expired);

    let err = h.engine.approve(&approver(), created.id, None).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::StateConflict { status: ApprovalStatus::Expired, .. }
    ));
}

#[tokio::test]
async fn forbidden_group_rejected_at_create() {
    let h = harness().await;
    let denied_before = h.sink.count(AuditKind::Denied);

    let err = h
        .engine
        .create(
            &operator(),
            &op("user_add"),
            serde_json::json!({
                "username": "alice",
                "groups": ["sudo"],
                "shell": "/bin/bash",
            }),
            "privilege escalation attempt",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    // No record created, one denied audit.
    let all = h
        .engine
        .store()
        .list(&opsgate_store::ListFilter::default(), opsgate_store::Paging::default())
        .await
        .unwrap();
    assert!(all.is_empty());
    assert_eq!(h.sink.count(AuditKind::Denied), denied_before + 1);
}

#[tokio::test]
async fn wrapper_timeout_persists_execution_failed() {
    let h = build_harness(
        "sleep 30\necho '{\"ok\":true}'",
        default_policies(),
        Duration::from_millis(200),
    )
    .await;

    let created = h
        .engine
        .create(
            &operator(),
            &op("user_delete"),
            serde_json::json!({"username": "mallory"}),
            "offboarding",
        )
        .await
        .unwrap();
    h.engine.approve(&approver(), created.id, None).await.unwrap();

    let executed = h.engine.execute(&admin(), created.id).await.unwrap();
    assert_eq!(executed.status, ApprovalStatus::ExecutionFailed);
    let result = executed.execution_result.unwrap();
    assert_eq!(result["reason"], "timeout");

    let history = h.engine.store().history_for_request(created.id).await.unwrap();
    assert_eq!(history.last().unwrap().action, HistoryAction::ExecutionFailed);
}

#[tokio::test]
async fn concurrent_approvals_single_winner() {
    let h = harness().await;
    let created = h
        .engine
        .create(&operator(), &op("user_add"), user_add_payload(), "onboarding")
        .await
        .unwrap();

    let engine_a = Arc::clone(&h.engine);
    let engine_b = Arc::clone(&h.engine);
    let id = created.id;
    let (a, b) = tokio::join!(
        tokio::spawn(async move { engine_a.approve(&approver(), id, None).await }),
        tokio::spawn(async move { engine_b.approve(&second_approver(), id, None).await }),
    );
    let results = [a.unwrap(), b.unwrap()];

    let wins = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::StateConflict { .. })))
        .count();
    assert_eq!(wins, 1, "exactly one approver wins");
    assert_eq!(conflicts, 1, "the loser sees a state conflict");

    let history = h.engine.store().history_for_request(created.id).await.unwrap();
    let approvals = history
        .iter()
        .filter(|e| e.action == HistoryAction::Approved)
        .count();
    assert_eq!(approvals, 1);
}

#[tokio::test]
async fn auto_execute_advances_to_executed() {
    let mut policies = default_policies();
    for p in &mut policies {
        if p.operation_type.as_str() == "cron_add" {
            p.auto_execute = true;
        }
    }
    let h = build_harness(RECORDING_SCRIPT, policies, Duration::from_secs(5)).await;

    let created = h
        .engine
        .create(
            &operator(),
            &op("cron_add"),
            serde_json::json!({
                "user": "alice",
                "schedule": "*/15 * * * *",
                "command": "/usr/local/bin/backup.sh",
            }),
            "nightly backups",
        )
        .await
        .unwrap();

    let outcome = h.engine.approve(&approver(), created.id, None).await.unwrap();
    assert_eq!(outcome.status, ApprovalStatus::Executed);
    assert_eq!(outcome.executed_by.as_deref(), Some("system"));

    let history = h.engine.store().history_for_request(created.id).await.unwrap();
    let actions: Vec<_> = history.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![HistoryAction::Created, HistoryAction::Approved, HistoryAction::Executed]
    );
    // Manual execute on an auto-executed request conflicts.
    let err = h.engine.execute(&admin(), created.id).await.unwrap_err();
    assert!(matches!(err, EngineError::StateConflict { .. }));
}

#[tokio::test]
async fn cancel_only_by_requester() {
    let h = harness().await;
    let created = h
        .engine
        .create(&operator(), &op("user_add"), user_add_payload(), "onboarding")
        .await
        .unwrap();

    let err = h.engine.cancel(&approver(), created.id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::NotRequester(_)));

    let cancelled = h
        .engine
        .cancel(&operator(), created.id, Some("no longer needed"))
        .await
        .unwrap();
    assert_eq!(cancelled.status, ApprovalStatus::Cancelled);

    // Terminal: approval now conflicts.
    let err = h.engine.approve(&approver(), created.id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::StateConflict { .. }));
}

#[tokio::test]
async fn reject_requires_reason_and_is_terminal() {
    let h = harness().await;
    let created = h
        .engine
        .create(&operator(), &op("user_add"), user_add_payload(), "onboarding")
        .await
        .unwrap();

    let err = h.engine.reject(&approver(), created.id, "").await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let rejected = h
        .engine
        .reject(&approver(), created.id, "not justified")
        .await
        .unwrap();
    assert_eq!(rejected.status, ApprovalStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("not justified"));

    let err = h
        .engine
        .reject(&approver(), created.id, "twice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StateConflict { .. }));
}

#[tokio::test]
async fn create_refused_when_approval_not_required() {
    let h = harness().await;
    let err = h
        .engine
        .create(
            &operator(),
            &op("service_stop"),
            serde_json::json!({"service": "nginx"}),
            "maintenance",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ApprovalNotRequired(_)));
}

#[tokio::test]
async fn permission_boundaries() {
    let h = harness().await;
    let viewer = Caller::new(UserId::new("u-v1"), "v1", Role::Viewer);

    // Viewers cannot request approvals.
    let err = h
        .engine
        .create(&viewer, &op("user_add"), user_add_payload(), "sneaky")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Denied(_)));

    // Approvers cannot execute approved actions.
    let created = h
        .engine
        .create(&operator(), &op("user_add"), user_add_payload(), "onboarding")
        .await
        .unwrap();
    h.engine.approve(&approver(), created.id, None).await.unwrap();
    let err = h.engine.execute(&approver(), created.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Denied(_)));

    // Admin may.
    let executed = h.engine.execute(&admin(), created.id).await.unwrap();
    assert_eq!(executed.status, ApprovalStatus::Executed);
}

#[tokio::test]
async fn unknown_operation_is_policy_missing() {
    let h = harness().await;
    let err = h
        .engine
        .create(
            &operator(),
            &op("disk_wipe"),
            serde_json::json!({}),
            "definitely legit",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PolicyMissing(_)));
    assert!(h.sink.count(AuditKind::Security) >= 1);
}
