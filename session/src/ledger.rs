use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use redline_core::events::{AUTO_AGREED_KEY, ClauseEvent, ClauseEventType, CommitTally};
use redline_core::ledger::LedgerState;
use redline_core::messages::PartyMessage;

use crate::error::SessionError;
use crate::session::SessionContext;
use crate::store::ContractStore;

/// Append-only agreement/query ledger for one contract. The derived
/// agreed/queried sets are updated under the same lock as each append, so
/// no caller ever observes an event without its effect. On load the sets
/// are rebuilt by replaying the full event list — the replay fold and the
/// incremental path must agree, which the tests pin down.
pub struct LedgerService {
    store: Arc<dyn ContractStore>,
    ctx: SessionContext,
    state: Mutex<LedgerState>,
}

impl LedgerService {
    /// Load the contract's events and fold them into the derived sets.
    pub async fn load(
        store: Arc<dyn ContractStore>,
        ctx: SessionContext,
    ) -> Result<Self, SessionError> {
        let events = store.list_events(ctx.contract_id).await?;
        let state = LedgerState::replay(&events);
        Ok(Self {
            store,
            ctx,
            state: Mutex::new(state),
        })
    }

    /// Snapshot of the current derived state.
    pub async fn state(&self) -> LedgerState {
        self.state.lock().await.clone()
    }

    fn event(&self, clause_id: Option<Uuid>, event_type: ClauseEventType) -> ClauseEvent {
        ClauseEvent::new(
            self.ctx.contract_id,
            clause_id,
            event_type,
            self.ctx.party_id,
            self.ctx.party_role,
        )
    }

    /// Append + apply under the lock held by the caller. The store write is
    /// the only external effect and comes first; the set update follows
    /// only on success.
    async fn append(
        &self,
        state: &mut LedgerState,
        event: ClauseEvent,
    ) -> Result<(), SessionError> {
        self.store.append_event(event.clone()).await?;
        state.apply(&event);
        Ok(())
    }

    /// Agree to a clause. Returns false (and appends nothing) when the
    /// clause is already in the agreed set.
    pub async fn agree(&self, clause_id: Uuid) -> Result<bool, SessionError> {
        let mut state = self.state.lock().await;
        if state.is_agreed(clause_id) {
            return Ok(false);
        }
        let event = self.event(Some(clause_id), ClauseEventType::Agreed);
        self.append(&mut state, event).await?;
        Ok(true)
    }

    /// Withdraw an agreement. No-op unless the clause is currently agreed.
    pub async fn withdraw(&self, clause_id: Uuid) -> Result<bool, SessionError> {
        let mut state = self.state.lock().await;
        if !state.is_agreed(clause_id) {
            return Ok(false);
        }
        let event = self.event(Some(clause_id), ClauseEventType::AgreementWithdrawn);
        self.append(&mut state, event).await?;
        Ok(true)
    }

    /// Raise a query against a clause. The message is mandatory; it is also
    /// mirrored into the party channel as a system message, best-effort —
    /// a mirror failure is logged and never propagated, the query event
    /// itself has already succeeded.
    pub async fn query(&self, clause_id: Uuid, message: &str) -> Result<(), SessionError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(SessionError::validation(
                "query message must not be empty",
                Some("message"),
            ));
        }

        {
            let mut state = self.state.lock().await;
            let event = self
                .event(Some(clause_id), ClauseEventType::Queried)
                .with_message(message);
            self.append(&mut state, event).await?;
        }

        let mirror = PartyMessage::new(
            self.ctx.contract_id,
            self.ctx.party_id,
            self.ctx.party_name.clone(),
            self.ctx.party_role,
            message,
        )
        .about_clause(clause_id)
        .system();

        if let Err(e) = self.store.insert_message(mirror).await {
            tracing::warn!(clause_id = %clause_id, error = %e, "query system message not mirrored");
        }
        Ok(())
    }

    /// Resolve an open query. No-op unless the clause is currently queried.
    pub async fn resolve_query(&self, clause_id: Uuid) -> Result<bool, SessionError> {
        let mut state = self.state.lock().await;
        if !state.is_queried(clause_id) {
            return Ok(false);
        }
        let event = self.event(Some(clause_id), ClauseEventType::QueryResolved);
        self.append(&mut state, event).await?;
        Ok(true)
    }

    /// Record a stance change on a clause. Does not affect the derived sets.
    pub async fn record_position_change(
        &self,
        clause_id: Uuid,
        from: i32,
        to: i32,
    ) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        let event = self
            .event(Some(clause_id), ClauseEventType::PositionChanged)
            .with_payload(serde_json::json!({ "from": from, "to": to }));
        self.append(&mut state, event).await
    }

    /// Record that a redraft was saved for a clause.
    pub async fn record_redraft(
        &self,
        clause_id: Uuid,
        draft_len: usize,
    ) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        let event = self
            .event(Some(clause_id), ClauseEventType::Redrafted)
            .with_payload(serde_json::json!({ "length": draft_len }));
        self.append(&mut state, event).await
    }

    /// Commit sweep: agree every listed clause that is not already agreed,
    /// tagging the events as auto-agreed. Returns (individually agreed,
    /// auto agreed) counts over the given leaves. Safe to re-run: clauses
    /// agreed by an earlier attempt are skipped.
    pub(crate) async fn auto_agree_unagreed(
        &self,
        leaves: &[Uuid],
    ) -> Result<(usize, usize), SessionError> {
        let mut state = self.state.lock().await;
        let mut auto_agreed = 0;
        for &clause_id in leaves {
            if state.is_agreed(clause_id) {
                continue;
            }
            let event = self
                .event(Some(clause_id), ClauseEventType::Agreed)
                .with_payload(serde_json::json!({ AUTO_AGREED_KEY: true }));
            self.append(&mut state, event).await?;
            auto_agreed += 1;
        }
        Ok((leaves.len() - auto_agreed, auto_agreed))
    }

    /// Append the terminal contract-level `committed` event. Must be the
    /// last ledger write of the commit transaction.
    pub(crate) async fn record_commit(&self, tally: &CommitTally) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        if state.is_committed() {
            return Err(SessionError::AlreadyCommitted(self.ctx.contract_id));
        }
        let payload = serde_json::to_value(tally)
            .map_err(|e| SessionError::Internal(e.to_string()))?;
        let event = self
            .event(None, ClauseEventType::Committed)
            .with_payload(payload);
        self.append(&mut state, event).await
    }
}

#[cfg(test)]
mod tests {
    use redline_core::clause::PartyRole;
    use redline_core::ledger::LedgerState;

    use super::*;
    use crate::memory::MemoryStore;

    fn ctx(contract_id: Uuid) -> SessionContext {
        SessionContext {
            contract_id,
            party_id: Uuid::now_v7(),
            party_name: "Alex".to_string(),
            party_role: PartyRole::Initiator,
            user_agent: None,
        }
    }

    async fn service(store: Arc<MemoryStore>, contract_id: Uuid) -> LedgerService {
        store.seed_contract(contract_id, vec![]);
        LedgerService::load(store, ctx(contract_id)).await.unwrap()
    }

    #[tokio::test]
    async fn agree_twice_appends_exactly_one_event() {
        let store = Arc::new(MemoryStore::new());
        let contract_id = Uuid::now_v7();
        let ledger = service(store.clone(), contract_id).await;
        let clause_id = Uuid::now_v7();

        assert!(ledger.agree(clause_id).await.unwrap());
        assert!(!ledger.agree(clause_id).await.unwrap());

        let events = store.list_events(contract_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(ledger.state().await.is_agreed(clause_id));
    }

    #[tokio::test]
    async fn withdraw_without_agreement_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let contract_id = Uuid::now_v7();
        let ledger = service(store.clone(), contract_id).await;

        assert!(!ledger.withdraw(Uuid::now_v7()).await.unwrap());
        assert!(store.list_events(contract_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_query_message_is_rejected_before_the_ledger() {
        let store = Arc::new(MemoryStore::new());
        let contract_id = Uuid::now_v7();
        let ledger = service(store.clone(), contract_id).await;

        let err = ledger.query(Uuid::now_v7(), "   ").await.unwrap_err();
        assert!(matches!(err, SessionError::Validation { .. }));
        assert!(store.list_events(contract_id).await.unwrap().is_empty());
        assert!(store.list_messages(contract_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_mirrors_a_system_message() {
        let store = Arc::new(MemoryStore::new());
        let contract_id = Uuid::now_v7();
        let ledger = service(store.clone(), contract_id).await;
        let clause_id = Uuid::now_v7();

        ledger
            .query(clause_id, "Is the notice period negotiable?")
            .await
            .unwrap();

        let events = store.list_events(contract_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, ClauseEventType::Queried);

        let messages = store.list_messages(contract_id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_system);
        assert_eq!(messages[0].clause_id, Some(clause_id));
        assert_eq!(messages[0].text, "Is the notice period negotiable?");
    }

    #[tokio::test]
    async fn replay_of_persisted_events_matches_incremental_state() {
        let store = Arc::new(MemoryStore::new());
        let contract_id = Uuid::now_v7();
        let ledger = service(store.clone(), contract_id).await;
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();

        ledger.agree(a).await.unwrap();
        ledger.query(b, "why?").await.unwrap();
        ledger.withdraw(a).await.unwrap();
        ledger.resolve_query(b).await.unwrap();
        ledger.agree(b).await.unwrap();

        let replayed = LedgerState::replay(&store.list_events(contract_id).await.unwrap());
        assert_eq!(replayed, ledger.state().await);
        assert!(replayed.is_agreed(b));
        assert!(!replayed.is_agreed(a));
        assert!(replayed.queried().is_empty());
    }
}
