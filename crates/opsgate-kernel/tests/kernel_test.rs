//! Kernel-level tests: bootstrap from a real config file, then drive
//! the inbound surface end to end.

use opsgate_core::{ApprovalStatus, Caller, Role, UserId};
use opsgate_kernel::{Kernel, codes};
use opsgate_store::Paging;
use std::fmt::Write as _;
use std::os::unix::fs::PermissionsExt;

const WRAPPER_IDS: &[&str] = &[
    "user_add", "user_delete", "user_modify", "user_passwd",
    "group_add", "group_delete", "group_modify",
    "cron_add", "cron_delete", "cron_modify",
    "service_stop", "firewall_modify",
    "process_list", "user_list", "cron_list", "service_status",
];

struct Harness {
    kernel: Kernel,
    _dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let dir = tempfile::TempDir::new().unwrap();

    let script = dir.path().join("wrapper.sh");
    std::fs::write(
        &script,
        "#!/bin/sh\ncat > /dev/null\necho '{\"ok\":true,\"items\":[]}'\n",
    )
    .unwrap();
    let mut perms = std::fs::metadata(&script).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&script, perms).unwrap();

    let mut config = String::new();
    writeln!(config, "[security]").unwrap();
    writeln!(config, "hmac_key_hex = \"{}\"", "cd".repeat(32)).unwrap();
    writeln!(config, "\n[database]").unwrap();
    writeln!(config, "path = \"{}\"", dir.path().join("opsgate.db").display()).unwrap();
    writeln!(config, "\n[gateway]").unwrap();
    writeln!(config, "max_concurrency = 8").unwrap();
    writeln!(config, "queue_timeout_ms = 1000").unwrap();
    writeln!(config, "allowed_path_prefixes = [\"/\"]").unwrap();
    writeln!(config, "allowed_cron_commands = [\"/usr/local/bin/backup.sh\"]").unwrap();
    for id in WRAPPER_IDS {
        writeln!(config, "\n[[wrappers]]").unwrap();
        writeln!(config, "id = \"{id}\"").unwrap();
        writeln!(config, "path = \"{}\"", script.display()).unwrap();
        writeln!(config, "min_args = 0").unwrap();
        if id.starts_with("cron") {
            writeln!(config, "allow_chars = [\"*\", \",\", \"/\"]").unwrap();
        }
    }
    let config_path = dir.path().join("opsgate.toml");
    std::fs::write(&config_path, config).unwrap();

    let loaded = opsgate_config::load(Some(&config_path)).unwrap();
    let kernel = Kernel::bootstrap(&loaded).await.unwrap();
    Harness { kernel, _dir: dir }
}

fn viewer() -> Caller {
    Caller::new(UserId::new("u-v1"), "v1", Role::Viewer)
}

fn operator() -> Caller {
    Caller::new(UserId::new("u-op1"), "op1", Role::Operator)
}

fn approver() -> Caller {
    Caller::new(UserId::new("u-ap1"), "ap1", Role::Approver)
}

fn admin() -> Caller {
    Caller::new(UserId::new("u-ad1"), "ad1", Role::Admin)
}

fn user_add_payload() -> serde_json::Value {
    serde_json::json!({
        "username": "alice",
        "groups": ["users"],
        "shell": "/bin/bash",
        "home": "/home/alice",
    })
}

#[tokio::test]
async fn authorize_decisions() {
    let h = harness().await;

    let read = h.kernel.authorize(&viewer(), "process_list").await.unwrap();
    assert!(matches!(read, opsgate_kernel::DecisionView::Allow));

    let write = h.kernel.authorize(&operator(), "user_add").await.unwrap();
    assert!(matches!(
        write,
        opsgate_kernel::DecisionView::RequiresApproval { timeout_hours: 24, .. }
    ));

    let err = h.kernel.authorize(&viewer(), "user_add").await.unwrap_err();
    assert_eq!(err.code, codes::MISSING_PERMISSION);

    let err = h.kernel.authorize(&operator(), "disk_wipe").await.unwrap_err();
    assert_eq!(err.code, codes::POLICY_MISSING);
}

#[tokio::test]
async fn direct_execute_read_operation() {
    let h = harness().await;
    let response = h
        .kernel
        .execute(&viewer(), "process_list", serde_json::json!({}))
        .await
        .unwrap();
    assert_eq!(response.status, "success");
    assert_eq!(response.result["ok"], true);
}

#[tokio::test]
async fn direct_execute_refuses_approval_required() {
    let h = harness().await;
    let err = h
        .kernel
        .execute(&operator(), "user_add", user_add_payload())
        .await
        .unwrap_err();
    assert_eq!(err.code, codes::APPROVAL_REQUIRED);
}

#[tokio::test]
async fn full_workflow_through_kernel() {
    let h = harness().await;

    let summary = h
        .kernel
        .approval_create(&operator(), "user_add", user_add_payload(), "onboarding")
        .await
        .unwrap();
    assert_eq!(summary.status, ApprovalStatus::Pending);

    // Listing with the pending filter finds it.
    let page = h
        .kernel
        .approval_list(&operator(), Some("pending"), None, None, Paging::default())
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, summary.id);

    // Detail round-trips the payload.
    let detail = h.kernel.approval_detail(&operator(), &summary.id).await.unwrap();
    assert_eq!(detail.payload, user_add_payload());

    let approved = h
        .kernel
        .approval_approve(&approver(), &summary.id, Some("ok"))
        .await
        .unwrap();
    assert_eq!(approved.request.status, ApprovalStatus::Approved);

    let executed = h.kernel.approval_execute(&admin(), &summary.id).await.unwrap();
    assert_eq!(executed.request.status, ApprovalStatus::Executed);

    // History pages in order.
    let history = h
        .kernel
        .approval_history(&operator(), Some(&summary.id), None, None, Paging::default())
        .await
        .unwrap();
    let actions: Vec<_> = history.entries.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["created", "approved", "executed"]);

    // Stats see one executed request.
    let stats = h.kernel.approval_stats(&approver(), 0).await.unwrap();
    assert_eq!(stats.total, 1);
    assert!((stats.approval_rate - 1.0).abs() < f64::EPSILON);

    // Export plus verification (admin only).
    let export = h
        .kernel
        .approval_history_export(&admin(), Paging::default())
        .await
        .unwrap();
    assert_eq!(export.entries.len(), 3);
    assert!(export.entries.iter().all(|e| !e.signature.is_empty()));
    let failures = h.kernel.verify_history(&admin(), 1, i64::MAX).await.unwrap();
    assert!(failures.is_empty());

    // Approver may not export.
    let err = h
        .kernel
        .approval_history_export(&approver(), Paging::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, codes::MISSING_PERMISSION);
}

#[tokio::test]
async fn self_approval_code() {
    let h = harness().await;
    let summary = h
        .kernel
        .approval_create(&approver(), "user_add", user_add_payload(), "onboarding")
        .await
        .unwrap();
    let err = h
        .kernel
        .approval_approve(&approver(), &summary.id, None)
        .await
        .unwrap_err();
    assert_eq!(err.code, codes::FORBIDDEN_SELF_APPROVAL);
}

#[tokio::test]
async fn double_approve_is_state_conflict() {
    let h = harness().await;
    let summary = h
        .kernel
        .approval_create(&operator(), "user_add", user_add_payload(), "onboarding")
        .await
        .unwrap();
    h.kernel
        .approval_approve(&approver(), &summary.id, None)
        .await
        .unwrap();
    let err = h
        .kernel
        .approval_approve(&approver(), &summary.id, None)
        .await
        .unwrap_err();
    assert_eq!(err.code, codes::STATE_CONFLICT);
}

#[tokio::test]
async fn validation_codes() {
    let h = harness().await;

    let err = h
        .kernel
        .approval_approve(&approver(), "not-a-uuid", None)
        .await
        .unwrap_err();
    assert_eq!(err.code, codes::VALIDATION_ERROR);

    let err = h
        .kernel
        .approval_create(
            &operator(),
            "user_add",
            serde_json::json!({"username": "alice", "groups": ["sudo"], "shell": "/bin/bash"}),
            "bad group",
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, codes::VALIDATION_ERROR);

    let err = h
        .kernel
        .approval_detail(&operator(), &uuid::Uuid::new_v4().to_string())
        .await
        .unwrap_err();
    assert_eq!(err.code, codes::NOT_FOUND);
}

#[tokio::test]
async fn policies_listing_requires_permission() {
    let h = harness().await;
    let err = h.kernel.approval_policies(&operator()).await.unwrap_err();
    assert_eq!(err.code, codes::MISSING_PERMISSION);

    let policies = h.kernel.approval_policies(&approver()).await.unwrap();
    assert_eq!(policies.len(), 12);
    assert!(policies.windows(2).all(|w| {
        w[0].operation_type.as_str() <= w[1].operation_type.as_str()
    }));
}

#[tokio::test]
async fn sweeper_lifecycle() {
    let h = harness().await;
    let sweeper = h.kernel.start_sweeper();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    sweeper.stop().await;
}
