use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::certification::CertificationTracker;
use crate::error::SessionError;
use crate::store::ContractStore;

/// Per-clause draft override: a party's working text, kept separate from the
/// immutable original. Transport-agnostic — whether the text came from hand
/// editing or the assistant's balanced-draft flow is not its concern.
pub struct DraftStore {
    store: Arc<dyn ContractStore>,
    tracker: Arc<Mutex<CertificationTracker>>,
}

impl DraftStore {
    pub fn new(
        store: Arc<dyn ContractStore>,
        tracker: Arc<Mutex<CertificationTracker>>,
    ) -> Self {
        Self { store, tracker }
    }

    /// Seed an edit buffer: the existing draft if any, else the original
    /// wording, else the certifier's suggested text.
    pub async fn start_edit(&self, clause_id: Uuid) -> Result<String, SessionError> {
        let tracker = self.tracker.lock().await;
        let clause = tracker
            .clause(clause_id)
            .ok_or(SessionError::ClauseNotFound(clause_id))?;
        Ok(clause.effective_text().unwrap_or_default().to_string())
    }

    /// Persist the text as the clause's draft override. The store write is
    /// the unit's final external step; the local mirror follows success.
    pub async fn save(&self, clause_id: Uuid, text: &str) -> Result<(), SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::validation(
                "draft text must not be empty",
                Some("text"),
            ));
        }
        {
            let tracker = self.tracker.lock().await;
            if tracker.clause(clause_id).is_none() {
                return Err(SessionError::ClauseNotFound(clause_id));
            }
        }
        self.store
            .set_draft_text(clause_id, Some(text.to_string()))
            .await?;
        self.tracker
            .lock()
            .await
            .set_draft(clause_id, Some(text.to_string()));
        Ok(())
    }

    /// Clear the override back to the original text.
    pub async fn reset(&self, clause_id: Uuid) -> Result<(), SessionError> {
        self.store.set_draft_text(clause_id, None).await?;
        self.tracker.lock().await.set_draft(clause_id, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use redline_core::clause::{Clause, ProcessingStatus};

    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::ContractStore;

    fn clause(contract_id: Uuid) -> Clause {
        Clause {
            id: Uuid::now_v7(),
            contract_id,
            name: "2.4 Notice period".to_string(),
            category: "termination".to_string(),
            display_order: 0,
            parent_id: None,
            clause_level: 1,
            is_header: false,
            processing_status: ProcessingStatus::Certified,
            original_text: Some("Thirty days written notice.".to_string()),
            draft_text: None,
            draft_modified: false,
            certification: None,
            extracted_value: None,
            created_at: Utc::now(),
        }
    }

    async fn setup() -> (Arc<MemoryStore>, DraftStore, Uuid, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let contract_id = Uuid::now_v7();
        let c = clause(contract_id);
        let clause_id = c.id;
        store.seed_contract(contract_id, vec![c]);
        let tracker = Arc::new(Mutex::new(CertificationTracker::new(
            store.load_clauses(contract_id).await.unwrap(),
        )));
        (
            store.clone(),
            DraftStore::new(store, tracker),
            contract_id,
            clause_id,
        )
    }

    async fn stored_clause(store: &MemoryStore, contract_id: Uuid, clause_id: Uuid) -> Clause {
        store
            .load_clauses(contract_id)
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.id == clause_id)
            .unwrap()
    }

    #[tokio::test]
    async fn edit_seeds_from_original_then_draft_and_reset_restores() {
        let (store, drafts, contract_id, clause_id) = setup().await;

        assert_eq!(
            drafts.start_edit(clause_id).await.unwrap(),
            "Thirty days written notice."
        );

        drafts
            .save(clause_id, "Sixty days written notice.")
            .await
            .unwrap();
        assert_eq!(
            drafts.start_edit(clause_id).await.unwrap(),
            "Sixty days written notice."
        );
        let stored = stored_clause(&store, contract_id, clause_id).await;
        assert_eq!(
            stored.draft_text.as_deref(),
            Some("Sixty days written notice.")
        );
        assert!(stored.draft_modified);

        drafts.reset(clause_id).await.unwrap();
        assert_eq!(
            drafts.start_edit(clause_id).await.unwrap(),
            "Thirty days written notice."
        );
        let stored = stored_clause(&store, contract_id, clause_id).await;
        assert_eq!(stored.draft_text, None);
        assert!(!stored.draft_modified);
    }

    #[tokio::test]
    async fn empty_draft_is_rejected() {
        let (_store, drafts, _contract_id, clause_id) = setup().await;
        let err = drafts.save(clause_id, "   ").await.unwrap_err();
        assert!(matches!(err, SessionError::Validation { .. }));
    }

    #[tokio::test]
    async fn unknown_clause_is_reported() {
        let (_store, drafts, _contract_id, _clause_id) = setup().await;
        let err = drafts.save(Uuid::now_v7(), "text").await.unwrap_err();
        assert!(matches!(err, SessionError::ClauseNotFound(_)));
    }
}
