//! Approval request persistence: inserts, guarded transitions, queries.

use chrono::{DateTime, SecondsFormat};
use opsgate_audit::HistoryAction;
use opsgate_core::{
    ActorRole, ApprovalRequest, ApprovalStatus, OperationType, RequestId, Timestamp, UserId,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row};

use crate::error::{StoreError, StoreResult};
use crate::history::append_history_tx;
use crate::store::Store;

/// Timestamps are stored as fixed-width RFC 3339 (microseconds, UTC)
/// so that SQL string comparison agrees with time ordering.
pub(crate) fn fmt_ts(ts: Timestamp) -> String {
    ts.0.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(s: &str) -> StoreResult<Timestamp> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| Timestamp::from_datetime(dt.into()))
        .map_err(|e| StoreError::Decode(format!("timestamp {s:?}: {e}")))
}

/// Field updates accompanying a status transition.
///
/// Only the fields named by the constructor are written; everything
/// else on the row is left untouched.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub(crate) new_status: ApprovalStatus,
    pub(crate) approved: Option<(UserId, String, Timestamp)>,
    pub(crate) rejection_reason: Option<String>,
    pub(crate) execution_result: Option<serde_json::Value>,
    pub(crate) executed: Option<(String, Timestamp)>,
}

impl StateChange {
    fn base(new_status: ApprovalStatus) -> Self {
        Self {
            new_status,
            approved: None,
            rejection_reason: None,
            execution_result: None,
            executed: None,
        }
    }

    /// pending -> approved.
    #[must_use]
    pub fn approve(by: UserId, by_name: impl Into<String>, at: Timestamp) -> Self {
        Self {
            approved: Some((by, by_name.into(), at)),
            ..Self::base(ApprovalStatus::Approved)
        }
    }

    /// pending -> rejected.
    #[must_use]
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            rejection_reason: Some(reason.into()),
            ..Self::base(ApprovalStatus::Rejected)
        }
    }

    /// pending -> cancelled.
    #[must_use]
    pub fn cancel() -> Self {
        Self::base(ApprovalStatus::Cancelled)
    }

    /// pending -> expired.
    #[must_use]
    pub fn expire() -> Self {
        Self::base(ApprovalStatus::Expired)
    }

    /// approved -> executed / execution_failed, with the wrapper result.
    #[must_use]
    pub fn executed(
        success: bool,
        result: serde_json::Value,
        by: impl Into<String>,
        at: Timestamp,
    ) -> Self {
        let status = if success {
            ApprovalStatus::Executed
        } else {
            ApprovalStatus::ExecutionFailed
        };
        Self {
            execution_result: Some(result),
            executed: Some((by.into(), at)),
            ..Self::base(status)
        }
    }

    /// The status this change moves to.
    #[must_use]
    pub fn new_status(&self) -> ApprovalStatus {
        self.new_status
    }
}

/// Data for the history entry written alongside an insert or
/// transition, in the same transaction.
#[derive(Debug, Clone)]
pub struct HistorySeed {
    /// The recorded action.
    pub action: HistoryAction,
    /// Acting user id, or `system`.
    pub actor_id: String,
    /// Acting username, or `system`.
    pub actor_name: String,
    /// The actor's role.
    pub actor_role: ActorRole,
    /// Action-specific details.
    pub details: Option<serde_json::Value>,
    /// Status before the action.
    pub previous_status: Option<ApprovalStatus>,
    /// Status after the action.
    pub new_status: Option<ApprovalStatus>,
}

/// Query filter for request listings.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Only requests in this status.
    pub status: Option<ApprovalStatus>,
    /// Only requests of this operation type.
    pub request_type: Option<OperationType>,
    /// Only requests from this requester.
    pub requester_id: Option<UserId>,
}

/// Offset/limit paging. `limit` is clamped to 200.
#[derive(Debug, Clone, Copy)]
pub struct Paging {
    /// Rows to skip.
    pub offset: u32,
    /// Maximum rows to return.
    pub limit: u32,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

impl Paging {
    /// Maximum permitted page size.
    pub const MAX_LIMIT: u32 = 200;

    fn effective_limit(self) -> u32 {
        self.limit.clamp(1, Self::MAX_LIMIT)
    }
}

/// Aggregated request counts.
#[derive(Debug, Clone, Default)]
pub struct RequestStats {
    /// Total requests in the period.
    pub total: i64,
    /// Count per status.
    pub by_status: Vec<(String, i64)>,
    /// Count per operation type.
    pub by_type: Vec<(String, i64)>,
}

impl Store {
    /// Insert a new request together with its `created` history entry,
    /// in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] on constraint or I/O failure; in
    /// that case neither row is visible.
    pub async fn insert_request(
        &self,
        request: &ApprovalRequest,
        seed: HistorySeed,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO approval_requests (
                id, request_type, requester_id, requester_name, request_payload,
                reason, status, created_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(request.id.to_string())
        .bind(request.request_type.as_str())
        .bind(request.requester_id.as_str())
        .bind(&request.requester_name)
        .bind(request.payload.to_string())
        .bind(&request.reason)
        .bind(request.status.as_str())
        .bind(fmt_ts(request.created_at))
        .bind(fmt_ts(request.expires_at))
        .execute(&mut *tx)
        .await?;

        append_history_tx(&mut tx, &self.signer, request.id, &seed).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Fetch a request by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] / [`StoreError::Decode`] on
    /// failure.
    pub async fn fetch(&self, id: RequestId) -> StoreResult<Option<ApprovalRequest>> {
        let row = sqlx::query("SELECT * FROM approval_requests WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode_request(&r)).transpose()
    }

    /// Fetch a request by id, failing if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown ids.
    pub async fn get(&self, id: RequestId) -> StoreResult<ApprovalRequest> {
        self.fetch(id).await?.ok_or(StoreError::NotFound(id))
    }

    /// Apply a guarded status transition plus its history entry, in one
    /// transaction.
    ///
    /// The UPDATE predicate `id = ? AND status = ?` re-checks the
    /// persisted state; a concurrent winner makes it miss and the
    /// caller gets [`StoreError::StateConflict`] with the actual
    /// status. Returns the updated record.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`], [`StoreError::StateConflict`], or a
    /// query error. On any error no row changes and no history entry is
    /// written.
    pub async fn transition(
        &self,
        id: RequestId,
        expected: ApprovalStatus,
        change: &StateChange,
        seed: HistorySeed,
    ) -> StoreResult<ApprovalRequest> {
        let mut tx = self.pool.begin().await?;

        let mut qb: QueryBuilder<'_, sqlx::Sqlite> =
            QueryBuilder::new("UPDATE approval_requests SET status = ");
        qb.push_bind(change.new_status.as_str());
        if let Some((by, by_name, at)) = &change.approved {
            qb.push(", approved_by = ");
            qb.push_bind(by.as_str().to_string());
            qb.push(", approved_by_name = ");
            qb.push_bind(by_name.clone());
            qb.push(", approved_at = ");
            qb.push_bind(fmt_ts(*at));
        }
        if let Some(reason) = &change.rejection_reason {
            qb.push(", rejection_reason = ");
            qb.push_bind(reason.clone());
        }
        if let Some(result) = &change.execution_result {
            qb.push(", execution_result = ");
            qb.push_bind(result.to_string());
        }
        if let Some((by, at)) = &change.executed {
            qb.push(", executed_by = ");
            qb.push_bind(by.clone());
            qb.push(", executed_at = ");
            qb.push_bind(fmt_ts(*at));
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id.to_string());
        qb.push(" AND status = ");
        qb.push_bind(expected.as_str());

        let affected = qb.build().execute(&mut *tx).await?.rows_affected();
        if affected == 0 {
            drop(tx);
            // Distinguish a missing row from a lost race.
            let actual = self.fetch(id).await?.ok_or(StoreError::NotFound(id))?;
            return Err(StoreError::StateConflict {
                id,
                expected,
                actual: actual.status,
            });
        }

        append_history_tx(&mut tx, &self.signer, id, &seed).await?;

        tx.commit().await?;
        self.get(id).await
    }

    /// List requests matching a filter, newest first.
    ///
    /// # Errors
    ///
    /// Returns a query or decode error.
    pub async fn list(
        &self,
        filter: &ListFilter,
        paging: Paging,
    ) -> StoreResult<Vec<ApprovalRequest>> {
        let mut qb: QueryBuilder<'_, sqlx::Sqlite> =
            QueryBuilder::new("SELECT * FROM approval_requests WHERE 1 = 1");
        if let Some(status) = filter.status {
            qb.push(" AND status = ");
            qb.push_bind(status.as_str());
        }
        if let Some(request_type) = &filter.request_type {
            qb.push(" AND request_type = ");
            qb.push_bind(request_type.as_str().to_string());
        }
        if let Some(requester) = &filter.requester_id {
            qb.push(" AND requester_id = ");
            qb.push_bind(requester.as_str().to_string());
        }
        qb.push(" ORDER BY created_at DESC LIMIT ");
        qb.push_bind(i64::from(paging.effective_limit()));
        qb.push(" OFFSET ");
        qb.push_bind(i64::from(paging.offset));

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(decode_request).collect()
    }

    /// Ids of pending requests whose deadline has passed at `now`.
    ///
    /// # Errors
    ///
    /// Returns a query or decode error.
    pub async fn due_for_expiry(&self, now: Timestamp) -> StoreResult<Vec<RequestId>> {
        let rows = sqlx::query(
            "SELECT id FROM approval_requests WHERE status = 'pending' AND expires_at <= ?",
        )
        .bind(fmt_ts(now))
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                id.parse()
                    .map_err(|_| StoreError::Decode(format!("request id {id:?}")))
            })
            .collect()
    }

    /// Aggregate counts, optionally restricted to requests created at
    /// or after `since`.
    ///
    /// # Errors
    ///
    /// Returns a query error.
    pub async fn stats(&self, since: Option<Timestamp>) -> StoreResult<RequestStats> {
        let cutoff = since.map(fmt_ts).unwrap_or_default();

        let by_status = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM approval_requests
             WHERE created_at >= ? GROUP BY status ORDER BY status",
        )
        .bind(&cutoff)
        .fetch_all(&self.pool)
        .await?;
        let by_type = sqlx::query(
            "SELECT request_type, COUNT(*) AS n FROM approval_requests
             WHERE created_at >= ? GROUP BY request_type ORDER BY request_type",
        )
        .bind(&cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = RequestStats::default();
        for row in &by_status {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            stats.total = stats.total.saturating_add(n);
            stats.by_status.push((status, n));
        }
        for row in &by_type {
            let request_type: String = row.try_get("request_type")?;
            let n: i64 = row.try_get("n")?;
            stats.by_type.push((request_type, n));
        }
        Ok(stats)
    }
}

fn decode_request(row: &SqliteRow) -> StoreResult<ApprovalRequest> {
    let decode = |what: &str, e: String| StoreError::Decode(format!("{what}: {e}"));

    let id: String = row.try_get("id")?;
    let request_type: String = row.try_get("request_type")?;
    let status: String = row.try_get("status")?;
    let payload: String = row.try_get("request_payload")?;
    let created_at: String = row.try_get("created_at")?;
    let expires_at: String = row.try_get("expires_at")?;
    let approved_at: Option<String> = row.try_get("approved_at")?;
    let executed_at: Option<String> = row.try_get("executed_at")?;
    let execution_result: Option<String> = row.try_get("execution_result")?;
    let approved_by: Option<String> = row.try_get("approved_by")?;

    Ok(ApprovalRequest {
        id: id
            .parse()
            .map_err(|_| decode("request id", id.clone()))?,
        request_type: OperationType::parse(&request_type)
            .map_err(|e| decode("request_type", e.to_string()))?,
        requester_id: UserId::new(row.try_get::<String, _>("requester_id")?),
        requester_name: row.try_get("requester_name")?,
        payload: serde_json::from_str(&payload)
            .map_err(|e| decode("request_payload", e.to_string()))?,
        reason: row.try_get("reason")?,
        status: ApprovalStatus::parse(&status)
            .ok_or_else(|| decode("status", status.clone()))?,
        created_at: parse_ts(&created_at)?,
        expires_at: parse_ts(&expires_at)?,
        approved_by: approved_by.map(UserId::new),
        approved_by_name: row.try_get("approved_by_name")?,
        approved_at: approved_at.as_deref().map(parse_ts).transpose()?,
        rejection_reason: row.try_get("rejection_reason")?,
        execution_result: execution_result
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| decode("execution_result", e.to_string()))?,
        executed_at: executed_at.as_deref().map(parse_ts).transpose()?,
        executed_by: row.try_get("executed_by")?,
    })
}
