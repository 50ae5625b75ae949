//! Database schema.
//!
//! Applied idempotently at startup. Status and risk enumerations are
//! CHECK-constrained so a bypassing writer still cannot store an
//! unknown value, and the history table is locked append-only by
//! triggers.

/// The full schema, executed statement by statement.
pub(crate) const SCHEMA: &[&str] = &[
    // -- Policies --
    "CREATE TABLE IF NOT EXISTS approval_policies (
        operation_type  TEXT PRIMARY KEY,
        description     TEXT NOT NULL,
        approval_required INTEGER NOT NULL,
        approver_roles  TEXT NOT NULL,
        approval_count  INTEGER NOT NULL CHECK (approval_count BETWEEN 1 AND 10),
        timeout_hours   INTEGER NOT NULL CHECK (timeout_hours BETWEEN 1 AND 168),
        auto_execute    INTEGER NOT NULL,
        risk_level      TEXT NOT NULL CHECK (risk_level IN ('LOW','MEDIUM','HIGH','CRITICAL')),
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL
    )",
    // -- Requests --
    "CREATE TABLE IF NOT EXISTS approval_requests (
        id               TEXT PRIMARY KEY,
        request_type     TEXT NOT NULL,
        requester_id     TEXT NOT NULL,
        requester_name   TEXT NOT NULL,
        request_payload  TEXT NOT NULL,
        reason           TEXT NOT NULL,
        status           TEXT NOT NULL CHECK (status IN
            ('pending','approved','rejected','expired','executed','execution_failed','cancelled')),
        created_at       TEXT NOT NULL,
        expires_at       TEXT NOT NULL,
        approved_by      TEXT,
        approved_by_name TEXT,
        approved_at      TEXT,
        rejection_reason TEXT,
        execution_result TEXT,
        executed_at      TEXT,
        executed_by      TEXT,
        CHECK (approved_by IS NULL OR approved_by <> requester_id),
        CHECK (expires_at > created_at)
    )",
    "CREATE INDEX IF NOT EXISTS idx_requests_status ON approval_requests(status)",
    "CREATE INDEX IF NOT EXISTS idx_requests_type_status ON approval_requests(request_type, status)",
    "CREATE INDEX IF NOT EXISTS idx_requests_expires_at ON approval_requests(expires_at)",
    "CREATE INDEX IF NOT EXISTS idx_requests_created_at ON approval_requests(created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_requests_requester ON approval_requests(requester_id)",
    // -- History --
    "CREATE TABLE IF NOT EXISTS approval_history (
        id                  INTEGER PRIMARY KEY,
        approval_request_id TEXT NOT NULL REFERENCES approval_requests(id),
        action              TEXT NOT NULL CHECK (action IN
            ('created','approved','rejected','expired','executed','execution_failed','cancelled')),
        actor_id            TEXT NOT NULL,
        actor_name          TEXT NOT NULL,
        actor_role          TEXT NOT NULL CHECK (actor_role IN
            ('viewer','operator','approver','admin','system')),
        timestamp           TEXT NOT NULL,
        details             TEXT,
        previous_status     TEXT,
        new_status          TEXT,
        signature           TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_history_request ON approval_history(approval_request_id)",
    "CREATE INDEX IF NOT EXISTS idx_history_actor ON approval_history(actor_id)",
    "CREATE INDEX IF NOT EXISTS idx_history_timestamp ON approval_history(timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_history_action ON approval_history(action)",
    // Append-only enforcement.
    "CREATE TRIGGER IF NOT EXISTS approval_history_no_update
        BEFORE UPDATE ON approval_history
        BEGIN SELECT RAISE(ABORT, 'approval_history is append-only'); END",
    "CREATE TRIGGER IF NOT EXISTS approval_history_no_delete
        BEFORE DELETE ON approval_history
        BEGIN SELECT RAISE(ABORT, 'approval_history is append-only'); END",
];
