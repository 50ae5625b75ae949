//! Policy table persistence.
//!
//! Policies are seeded once (INSERT OR IGNORE, so a deployment's edits
//! survive restarts) and loaded in full at startup. There is no
//! runtime write path.

use opsgate_core::{OperationPolicy, OperationType, RiskLevel, Role};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::error::{StoreError, StoreResult};
use crate::requests::{fmt_ts, parse_ts};
use crate::store::Store;

impl Store {
    /// Seed policy rows that do not yet exist.
    ///
    /// Each policy is constraint-checked before any row is written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PolicyConstraint`] for an invalid policy,
    /// or a query error.
    pub async fn seed_policies(&self, policies: &[OperationPolicy]) -> StoreResult<()> {
        for policy in policies {
            policy.validate().map_err(StoreError::PolicyConstraint)?;
        }
        let mut tx = self.pool.begin().await?;
        for policy in policies {
            let roles: Vec<&str> = policy.approver_roles.iter().map(Role::as_str).collect();
            let roles_json = serde_json::to_string(&roles)
                .map_err(|e| StoreError::Decode(format!("approver_roles: {e}")))?;
            sqlx::query(
                "INSERT OR IGNORE INTO approval_policies (
                    operation_type, description, approval_required, approver_roles,
                    approval_count, timeout_hours, auto_execute, risk_level,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(policy.operation_type.as_str())
            .bind(&policy.description)
            .bind(i64::from(policy.approval_required))
            .bind(roles_json)
            .bind(i64::from(policy.approval_count))
            .bind(i64::from(policy.timeout_hours))
            .bind(i64::from(policy.auto_execute))
            .bind(policy.risk_level.as_str())
            .bind(fmt_ts(policy.created_at))
            .bind(fmt_ts(policy.updated_at))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Load every policy row.
    ///
    /// # Errors
    ///
    /// Returns a query or decode error.
    pub async fn load_policies(&self) -> StoreResult<Vec<OperationPolicy>> {
        let rows = sqlx::query("SELECT * FROM approval_policies ORDER BY operation_type")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_policy).collect()
    }
}

fn decode_policy(row: &SqliteRow) -> StoreResult<OperationPolicy> {
    let operation_type: String = row.try_get("operation_type")?;
    let roles_json: String = row.try_get("approver_roles")?;
    let risk_level: String = row.try_get("risk_level")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    let role_names: Vec<String> = serde_json::from_str(&roles_json)
        .map_err(|e| StoreError::Decode(format!("approver_roles: {e}")))?;
    let approver_roles = role_names
        .iter()
        .map(|name| {
            Role::parse(name).ok_or_else(|| StoreError::Decode(format!("approver role {name:?}")))
        })
        .collect::<StoreResult<Vec<Role>>>()?;

    let approval_count: i64 = row.try_get("approval_count")?;
    let timeout_hours: i64 = row.try_get("timeout_hours")?;

    Ok(OperationPolicy {
        operation_type: OperationType::parse(&operation_type)
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        description: row.try_get("description")?,
        approval_required: row.try_get::<i64, _>("approval_required")? != 0,
        approver_roles,
        approval_count: u32::try_from(approval_count)
            .map_err(|_| StoreError::Decode(format!("approval_count {approval_count}")))?,
        timeout_hours: u32::try_from(timeout_hours)
            .map_err(|_| StoreError::Decode(format!("timeout_hours {timeout_hours}")))?,
        auto_execute: row.try_get::<i64, _>("auto_execute")? != 0,
        risk_level: RiskLevel::parse(&risk_level)
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}
