use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clause::PartyRole;

/// Payload key marking an `agreed` event written by the commit sweep rather
/// than an explicit party action.
pub const AUTO_AGREED_KEY: &str = "auto_agreed_via_commit";

/// Closed set of ledger event types. Unlike free-form telemetry, negotiation
/// events are a fixed vocabulary: the derived agreed/queried sets depend on
/// exhaustive handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClauseEventType {
    Agreed,
    AgreementWithdrawn,
    Queried,
    QueryResolved,
    PositionChanged,
    Redrafted,
    Committed,
}

/// A single entry in the negotiation ledger. Events are immutable — once
/// written, never changed. State reversals are expressed by later events
/// (agreement_withdrawn, query_resolved), never by edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClauseEvent {
    /// Unique event ID (UUIDv7 — time-sortable).
    pub id: Uuid,
    pub contract_id: Uuid,
    /// Clause the event concerns. None for contract-level events
    /// (currently only `committed`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clause_id: Option<Uuid>,
    pub event_type: ClauseEventType,
    pub actor_id: Uuid,
    pub actor_role: PartyRole,
    /// Free-text message; carries the question for `queried` events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Structured payload — shape depends on event_type.
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ClauseEvent {
    /// New event with a fresh UUIDv7 id and the current time.
    pub fn new(
        contract_id: Uuid,
        clause_id: Option<Uuid>,
        event_type: ClauseEventType,
        actor_id: Uuid,
        actor_role: PartyRole,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            contract_id,
            clause_id,
            event_type,
            actor_id,
            actor_role,
            message: None,
            payload: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// True for `agreed` events written by the commit sweep.
    pub fn is_auto_agreed(&self) -> bool {
        self.payload
            .get(AUTO_AGREED_KEY)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Total order for replay: creation time, UUIDv7 id as tiebreaker.
    pub fn sort_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.created_at, self.id)
    }
}

/// Audit payload of the terminal `committed` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitTally {
    /// Clauses the parties agreed one by one before committing.
    pub individually_agreed: usize,
    /// Clauses swept into agreement by the commit itself.
    pub auto_agreed: usize,
    /// Client user agent, kept for the audit trail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}
