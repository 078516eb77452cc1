use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use redline_core::clause::{Certification, Clause, ClausePatch, ProcessingStatus};
use redline_core::events::ClauseEvent;
use redline_core::messages::PartyMessage;

use crate::store::{ContractStatus, ContractStore, StoreError, StoreResult};

const PUSH_CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
struct Inner {
    clauses: Vec<Clause>,
    events: Vec<ClauseEvent>,
    messages: Vec<PartyMessage>,
    statuses: HashMap<Uuid, ContractStatus>,
    push: HashMap<Uuid, broadcast::Sender<PartyMessage>>,
}

/// In-memory authoritative store, used by tests and the CLI simulator.
/// The certifier-side mutators (`set_processing_status`, `apply_certification`)
/// stand in for the external analysis process writing to the real store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a contract with its extracted clauses.
    pub fn seed_contract(&self, contract_id: Uuid, clauses: Vec<Clause>) {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.statuses.insert(contract_id, ContractStatus::Negotiating);
        inner.clauses.extend(clauses);
    }

    /// Certifier-side write: move a clause through its lifecycle.
    pub fn set_processing_status(&self, clause_id: Uuid, status: ProcessingStatus) {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        if let Some(c) = inner.clauses.iter_mut().find(|c| c.id == clause_id) {
            c.processing_status = status;
        }
    }

    /// Certifier-side write: attach the analysis output and mark certified.
    pub fn apply_certification(&self, clause_id: Uuid, certification: Certification) {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        if let Some(c) = inner.clauses.iter_mut().find(|c| c.id == clause_id) {
            c.certification = Some(certification);
            c.processing_status = ProcessingStatus::Certified;
        }
    }

    fn sender_for(inner: &mut Inner, contract_id: Uuid) -> broadcast::Sender<PartyMessage> {
        inner
            .push
            .entry(contract_id)
            .or_insert_with(|| broadcast::channel(PUSH_CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl ContractStore for MemoryStore {
    async fn load_clauses(&self, contract_id: Uuid) -> StoreResult<Vec<Clause>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        let mut clauses: Vec<Clause> = inner
            .clauses
            .iter()
            .filter(|c| c.contract_id == contract_id)
            .cloned()
            .collect();
        clauses.sort_by_key(|c| c.display_order);
        Ok(clauses)
    }

    async fn fetch_clause_patches(&self, contract_id: Uuid) -> StoreResult<Vec<ClausePatch>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner
            .clauses
            .iter()
            .filter(|c| c.contract_id == contract_id)
            .map(|c| ClausePatch {
                id: c.id,
                processing_status: c.processing_status,
                is_header: c.is_header,
                certification: c.certification.clone(),
                extracted_value: c.extracted_value.clone(),
                original_text: c.original_text.clone(),
            })
            .collect())
    }

    async fn set_draft_text(&self, clause_id: Uuid, draft: Option<String>) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let clause = inner
            .clauses
            .iter_mut()
            .find(|c| c.id == clause_id)
            .ok_or(StoreError::NotFound("clause"))?;
        clause.draft_modified = draft.is_some();
        clause.draft_text = draft;
        Ok(())
    }

    async fn append_event(&self, event: ClauseEvent) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.events.push(event);
        Ok(())
    }

    async fn list_events(&self, contract_id: Uuid) -> StoreResult<Vec<ClauseEvent>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        let mut events: Vec<ClauseEvent> = inner
            .events
            .iter()
            .filter(|e| e.contract_id == contract_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.sort_key());
        Ok(events)
    }

    async fn insert_message(&self, message: PartyMessage) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let sender = Self::sender_for(&mut inner, message.contract_id);
        inner.messages.push(message.clone());
        // No receiver yet is fine; the poll path covers it.
        let _ = sender.send(message);
        Ok(())
    }

    async fn list_messages(&self, contract_id: Uuid) -> StoreResult<Vec<PartyMessage>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        let mut messages: Vec<PartyMessage> = inner
            .messages
            .iter()
            .filter(|m| m.contract_id == contract_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| (m.created_at, m.id));
        Ok(messages)
    }

    async fn mark_messages_read(&self, contract_id: Uuid, reader_id: Uuid) -> StoreResult<u64> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let mut changed = 0;
        for m in inner
            .messages
            .iter_mut()
            .filter(|m| m.contract_id == contract_id && m.sender_id != reader_id && !m.is_read)
        {
            m.is_read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn contract_status(&self, contract_id: Uuid) -> StoreResult<ContractStatus> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        inner
            .statuses
            .get(&contract_id)
            .copied()
            .ok_or(StoreError::NotFound("contract"))
    }

    async fn set_contract_status(
        &self,
        contract_id: Uuid,
        status: ContractStatus,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        match inner.statuses.get_mut(&contract_id) {
            Some(s) => {
                *s = status;
                Ok(())
            }
            None => Err(StoreError::NotFound("contract")),
        }
    }

    fn subscribe_messages(&self, contract_id: Uuid) -> broadcast::Receiver<PartyMessage> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        Self::sender_for(&mut inner, contract_id).subscribe()
    }
}
