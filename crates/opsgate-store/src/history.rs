//! Approval history persistence.
//!
//! Entries are written exclusively by [`append_history_tx`], inside
//! the same transaction as the request mutation they describe. The id
//! is allocated before signing so the signature covers it.

use opsgate_audit::{HistoryEntry, verify_entries};
use opsgate_core::{ActorRole, RequestId, Timestamp};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, Transaction};

use crate::error::{StoreError, StoreResult};
use crate::requests::{HistorySeed, Paging, fmt_ts, parse_ts};
use crate::store::Store;

/// Query filter for history listings.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Only entries for this request.
    pub request_id: Option<RequestId>,
    /// Only entries by this actor.
    pub actor_id: Option<String>,
    /// Only entries recording this action (storage representation).
    pub action: Option<String>,
}

pub(crate) async fn append_history_tx(
    tx: &mut Transaction<'_, Sqlite>,
    signer: &opsgate_audit::HistorySigner,
    request_id: RequestId,
    seed: &HistorySeed,
) -> StoreResult<i64> {
    let row = sqlx::query("SELECT COALESCE(MAX(id), 0) + 1 AS next_id FROM approval_history")
        .fetch_one(&mut **tx)
        .await?;
    let next_id: i64 = row.try_get("next_id")?;

    let mut entry = HistoryEntry {
        id: next_id,
        approval_request_id: request_id,
        action: seed.action,
        actor_id: seed.actor_id.clone(),
        actor_name: seed.actor_name.clone(),
        actor_role: seed.actor_role,
        timestamp: Timestamp::now(),
        details: seed.details.clone(),
        previous_status: seed.previous_status.map(|s| s.as_str().to_string()),
        new_status: seed.new_status.map(|s| s.as_str().to_string()),
        signature: String::new(),
    };
    entry.signature = signer.sign(&entry);

    sqlx::query(
        "INSERT INTO approval_history (
            id, approval_request_id, action, actor_id, actor_name, actor_role,
            timestamp, details, previous_status, new_status, signature
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.id)
    .bind(entry.approval_request_id.to_string())
    .bind(entry.action.as_str())
    .bind(&entry.actor_id)
    .bind(&entry.actor_name)
    .bind(entry.actor_role.as_str())
    .bind(fmt_ts(entry.timestamp))
    .bind(entry.details.as_ref().map(ToString::to_string))
    .bind(entry.previous_status.as_deref())
    .bind(entry.new_status.as_deref())
    .bind(&entry.signature)
    .execute(&mut **tx)
    .await?;

    Ok(next_id)
}

impl Store {
    /// List history entries matching a filter, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a query or decode error.
    pub async fn list_history(
        &self,
        filter: &HistoryFilter,
        paging: Paging,
    ) -> StoreResult<Vec<HistoryEntry>> {
        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT * FROM approval_history WHERE 1 = 1");
        if let Some(request_id) = filter.request_id {
            qb.push(" AND approval_request_id = ");
            qb.push_bind(request_id.to_string());
        }
        if let Some(actor_id) = &filter.actor_id {
            qb.push(" AND actor_id = ");
            qb.push_bind(actor_id.clone());
        }
        if let Some(action) = &filter.action {
            qb.push(" AND action = ");
            qb.push_bind(action.clone());
        }
        qb.push(" ORDER BY id ASC LIMIT ");
        qb.push_bind(i64::from(paging.limit.clamp(1, Paging::MAX_LIMIT)));
        qb.push(" OFFSET ");
        qb.push_bind(i64::from(paging.offset));

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(decode_entry).collect()
    }

    /// All history entries for one request, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a query or decode error.
    pub async fn history_for_request(&self, id: RequestId) -> StoreResult<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM approval_history WHERE approval_request_id = ? ORDER BY id ASC",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_entry).collect()
    }

    /// Recompute signatures over an inclusive id range and return the
    /// ids that fail verification. Read-only.
    ///
    /// # Errors
    ///
    /// Returns a query or decode error.
    pub async fn verify_history(&self, from_id: i64, to_id: i64) -> StoreResult<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT * FROM approval_history WHERE id >= ? AND id <= ? ORDER BY id ASC",
        )
        .bind(from_id)
        .bind(to_id)
        .fetch_all(&self.pool)
        .await?;
        let entries: Vec<HistoryEntry> = rows
            .iter()
            .map(decode_entry)
            .collect::<StoreResult<_>>()?;
        Ok(verify_entries(&self.signer, &entries))
    }
}

fn decode_entry(row: &SqliteRow) -> StoreResult<HistoryEntry> {
    let request_id: String = row.try_get("approval_request_id")?;
    let action: String = row.try_get("action")?;
    let actor_role: String = row.try_get("actor_role")?;
    let timestamp: String = row.try_get("timestamp")?;
    let details: Option<String> = row.try_get("details")?;

    Ok(HistoryEntry {
        id: row.try_get("id")?,
        approval_request_id: request_id
            .parse()
            .map_err(|_| StoreError::Decode(format!("history request id {request_id:?}")))?,
        action: opsgate_audit::HistoryAction::parse(&action)
            .ok_or_else(|| StoreError::Decode(format!("history action {action:?}")))?,
        actor_id: row.try_get("actor_id")?,
        actor_name: row.try_get("actor_name")?,
        actor_role: ActorRole::parse(&actor_role)
            .ok_or_else(|| StoreError::Decode(format!("actor role {actor_role:?}")))?,
        timestamp: parse_ts(&timestamp)?,
        details: details
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| StoreError::Decode(format!("history details: {e}")))?,
        previous_status: row.try_get("previous_status")?,
        new_status: row.try_get("new_status")?,
        signature: row.try_get("signature")?,
    })
}
