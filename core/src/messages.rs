use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clause::PartyRole;

/// One message in the party-to-party channel. Append-only; only the
/// `is_read` flag is ever updated, and only in bulk (§ messaging).
///
/// A `queried` ledger event may mirror into exactly one system message, but
/// the two records stay independent — dedup and read models key on the
/// message id, never on the originating event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyMessage {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_role: PartyRole,
    pub text: String,
    /// Clause the message is about, when it has one (queries always do).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clause_id: Option<Uuid>,
    pub is_system: bool,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl PartyMessage {
    pub fn new(
        contract_id: Uuid,
        sender_id: Uuid,
        sender_name: impl Into<String>,
        sender_role: PartyRole,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            contract_id,
            sender_id,
            sender_name: sender_name.into(),
            sender_role,
            text: text.into(),
            clause_id: None,
            is_system: false,
            is_read: false,
            created_at: Utc::now(),
        }
    }

    pub fn about_clause(mut self, clause_id: Uuid) -> Self {
        self.clause_id = Some(clause_id);
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }
}
