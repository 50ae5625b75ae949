//! Response shapes for the inbound surface.

use opsgate_audit::HistoryEntry;
use opsgate_core::{ApprovalRequest, ApprovalStatus, RiskLevel, Timestamp};
use serde::Serialize;

/// The outcome of an authorization probe.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum DecisionView {
    /// The caller may execute directly.
    Allow,
    /// The caller must go through the approval workflow.
    RequiresApproval {
        /// Risk level of the governing policy.
        risk_level: RiskLevel,
        /// Pending-request lifetime in hours.
        timeout_hours: u32,
    },
}

/// Summary of one approval request, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct RequestSummary {
    /// Request id.
    pub id: String,
    /// Operation type.
    pub request_type: String,
    /// Requesting username.
    pub requester_name: String,
    /// Current status.
    pub status: ApprovalStatus,
    /// Creation time.
    pub created_at: Timestamp,
    /// Expiry deadline.
    pub expires_at: Timestamp,
}

impl From<&ApprovalRequest> for RequestSummary {
    fn from(request: &ApprovalRequest) -> Self {
        Self {
            id: request.id.to_string(),
            request_type: request.request_type.as_str().to_string(),
            requester_name: request.requester_name.clone(),
            status: request.status,
            created_at: request.created_at,
            expires_at: request.expires_at,
        }
    }
}

/// Response to a state-changing approval call.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse {
    /// Always `success` on the Ok path; errors travel as `ApiError`.
    pub status: &'static str,
    /// The request after the transition.
    pub request: ApprovalRequest,
}

impl ActionResponse {
    pub(crate) fn of(request: ApprovalRequest) -> Self {
        Self {
            status: "success",
            request,
        }
    }
}

/// Result of a direct (non-approval) execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteResponse {
    /// Always `success` on the Ok path.
    pub status: &'static str,
    /// The wrapper's parsed JSON body.
    pub result: serde_json::Value,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// One page of request summaries.
#[derive(Debug, Clone, Serialize)]
pub struct ListPage {
    /// The page items, newest first.
    pub items: Vec<RequestSummary>,
    /// Offset this page started at.
    pub offset: u32,
    /// Requested page size.
    pub limit: u32,
}

/// One page of history entries.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    /// The entries, oldest first.
    pub entries: Vec<HistoryEntry>,
    /// Offset this page started at.
    pub offset: u32,
    /// Requested page size.
    pub limit: u32,
}

/// Aggregate statistics over a period.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    /// Days covered (0 = all time).
    pub period_days: u32,
    /// Total requests created in the period.
    pub total: i64,
    /// Count per status.
    pub by_status: Vec<(String, i64)>,
    /// Count per operation type.
    pub by_type: Vec<(String, i64)>,
    /// Share of decided requests that were approved (0.0-1.0).
    pub approval_rate: f64,
    /// Share of all requests that expired undecided (0.0-1.0).
    pub expired_rate: f64,
}
