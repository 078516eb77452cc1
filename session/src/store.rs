use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use redline_core::clause::{Clause, ClausePatch};
use redline_core::events::ClauseEvent;
use redline_core::messages::PartyMessage;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Network/store outage. Transient: the next poll cycle retries.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("{0} not found")]
    NotFound(&'static str),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Negotiating,
    Committed,
}

/// Read/write contract of the authoritative store. Clauses are keyed by
/// clause id; the event and message tables are append-only and queried by
/// contract id in creation order. Storage mechanics behind this trait are
/// someone else's problem.
#[async_trait]
pub trait ContractStore: Send + Sync {
    async fn load_clauses(&self, contract_id: Uuid) -> StoreResult<Vec<Clause>>;

    /// The subset of clause fields the certifier mutates, for the
    /// reconciliation poll. Cheaper than re-fetching whole clauses.
    async fn fetch_clause_patches(&self, contract_id: Uuid) -> StoreResult<Vec<ClausePatch>>;

    /// Persist a draft override; None clears it back to the original.
    async fn set_draft_text(&self, clause_id: Uuid, draft: Option<String>) -> StoreResult<()>;

    async fn append_event(&self, event: ClauseEvent) -> StoreResult<()>;

    /// Full ledger for a contract, ordered by creation time.
    async fn list_events(&self, contract_id: Uuid) -> StoreResult<Vec<ClauseEvent>>;

    async fn insert_message(&self, message: PartyMessage) -> StoreResult<()>;

    /// Full message list for a contract, ordered by creation time.
    async fn list_messages(&self, contract_id: Uuid) -> StoreResult<Vec<PartyMessage>>;

    /// One bulk update: every unread message NOT sent by `reader_id` becomes
    /// read. Returns the number of rows changed. Must not be a per-message
    /// loop — a push can land between iterations.
    async fn mark_messages_read(&self, contract_id: Uuid, reader_id: Uuid) -> StoreResult<u64>;

    async fn contract_status(&self, contract_id: Uuid) -> StoreResult<ContractStatus>;

    async fn set_contract_status(
        &self,
        contract_id: Uuid,
        status: ContractStatus,
    ) -> StoreResult<()>;

    /// Live feed of message inserts for a contract. Lagged receivers may
    /// miss entries; the poll path is the catch-up mechanism.
    fn subscribe_messages(&self, contract_id: Uuid) -> broadcast::Receiver<PartyMessage>;
}
