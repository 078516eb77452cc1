use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use redline_core::clause::{Clause, PartyRole};
use redline_core::events::CommitTally;

use crate::error::SessionError;
use crate::ledger::LedgerService;
use crate::session::SessionContext;
use crate::store::{ContractStatus, ContractStore};

/// Structured record emitted once per successful commit, for the external
/// audit/analytics pipeline. Not required for correctness.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub contract_id: Uuid,
    pub actor_id: Uuid,
    pub actor_role: PartyRole,
    pub individually_agreed: usize,
    pub auto_agreed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Fire-and-forget audit emission. Implementations swallow their own
/// failures; a lost audit record never fails a commit.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord);
}

/// Default sink: the record goes to the log stream.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) {
        tracing::info!(
            contract_id = %record.contract_id,
            actor_id = %record.actor_id,
            individually_agreed = record.individually_agreed,
            auto_agreed = record.auto_agreed,
            "contract committed"
        );
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(CommitTally),
    /// The contract was already committed; nothing was appended or changed.
    AlreadyCommitted,
}

/// Finalizes a contract: sweeps every certified leaf clause that is not yet
/// agreed into agreement, appends the terminal `committed` event, flips the
/// contract status, and emits the audit record — in that order. The status
/// flip is the externally visible transition and happens only after every
/// ledger write has succeeded; a failure anywhere leaves the status
/// untouched and the whole transaction safe to retry (already-agreed
/// clauses are skipped on the second pass).
pub struct CommitTransaction {
    store: Arc<dyn ContractStore>,
    audit: Arc<dyn AuditSink>,
}

impl CommitTransaction {
    pub fn new(store: Arc<dyn ContractStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    pub async fn run(
        &self,
        ctx: &SessionContext,
        ledger: &LedgerService,
        clauses: &[Clause],
    ) -> Result<CommitOutcome, SessionError> {
        match self.store.contract_status(ctx.contract_id).await? {
            ContractStatus::Committed => return Ok(CommitOutcome::AlreadyCommitted),
            ContractStatus::Negotiating => {}
        }

        // A prior attempt that failed between the committed event and the
        // status flip converges here: finish the flip, append nothing.
        if ledger.state().await.is_committed() {
            self.store
                .set_contract_status(ctx.contract_id, ContractStatus::Committed)
                .await?;
            return Ok(CommitOutcome::AlreadyCommitted);
        }

        let leaves: Vec<Uuid> = clauses
            .iter()
            .filter(|c| c.is_actionable())
            .map(|c| c.id)
            .collect();

        let (individually_agreed, auto_agreed) = ledger.auto_agree_unagreed(&leaves).await?;

        let tally = CommitTally {
            individually_agreed,
            auto_agreed,
            user_agent: ctx.user_agent.clone(),
        };
        ledger.record_commit(&tally).await?;

        self.store
            .set_contract_status(ctx.contract_id, ContractStatus::Committed)
            .await?;

        self.audit
            .record(AuditRecord {
                contract_id: ctx.contract_id,
                actor_id: ctx.party_id,
                actor_role: ctx.party_role,
                individually_agreed,
                auto_agreed,
                user_agent: ctx.user_agent.clone(),
                occurred_at: Utc::now(),
            })
            .await;

        Ok(CommitOutcome::Committed(tally))
    }
}

#[cfg(test)]
mod tests {
    use redline_core::clause::ProcessingStatus;
    use redline_core::events::ClauseEventType;

    use super::*;
    use crate::memory::MemoryStore;

    fn leaf(contract_id: Uuid, order: i32) -> Clause {
        Clause {
            id: Uuid::now_v7(),
            contract_id,
            name: format!("{order} Clause"),
            category: "general".to_string(),
            display_order: order,
            parent_id: None,
            clause_level: 1,
            is_header: false,
            processing_status: ProcessingStatus::Certified,
            original_text: Some("text".to_string()),
            draft_text: None,
            draft_modified: false,
            certification: None,
            extracted_value: None,
            created_at: Utc::now(),
        }
    }

    fn ctx(contract_id: Uuid) -> SessionContext {
        SessionContext {
            contract_id,
            party_id: Uuid::now_v7(),
            party_name: "Alex".to_string(),
            party_role: PartyRole::Respondent,
            user_agent: Some("redline-test".to_string()),
        }
    }

    async fn setup(
        clause_count: i32,
    ) -> (Arc<MemoryStore>, SessionContext, LedgerService, Vec<Clause>) {
        let store = Arc::new(MemoryStore::new());
        let contract_id = Uuid::now_v7();
        let clauses: Vec<Clause> = (0..clause_count).map(|i| leaf(contract_id, i)).collect();
        store.seed_contract(contract_id, clauses.clone());
        let ctx = ctx(contract_id);
        let ledger = LedgerService::load(store.clone(), ctx.clone()).await.unwrap();
        (store, ctx, ledger, clauses)
    }

    #[tokio::test]
    async fn commit_sweeps_unagreed_leaves_and_tallies_both_kinds() {
        let (store, ctx, ledger, clauses) = setup(3).await;
        ledger.agree(clauses[0].id).await.unwrap();

        let tx = CommitTransaction::new(store.clone(), Arc::new(TracingAuditSink));
        let outcome = tx.run(&ctx, &ledger, &clauses).await.unwrap();

        match outcome {
            CommitOutcome::Committed(tally) => {
                assert_eq!(tally.individually_agreed, 1);
                assert_eq!(tally.auto_agreed, 2);
            }
            other => panic!("expected commit, got {other:?}"),
        }

        let state = ledger.state().await;
        assert!(state.is_committed());
        for clause in &clauses {
            assert!(state.is_agreed(clause.id));
        }

        let events = store.list_events(ctx.contract_id).await.unwrap();
        let auto: Vec<_> = events.iter().filter(|e| e.is_auto_agreed()).collect();
        assert_eq!(auto.len(), 2);
        let committed: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == ClauseEventType::Committed)
            .collect();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].clause_id, None);

        assert_eq!(
            store.contract_status(ctx.contract_id).await.unwrap(),
            ContractStatus::Committed
        );
    }

    #[tokio::test]
    async fn double_commit_is_a_no_op() {
        let (store, ctx, ledger, clauses) = setup(2).await;
        let tx = CommitTransaction::new(store.clone(), Arc::new(TracingAuditSink));

        assert!(matches!(
            tx.run(&ctx, &ledger, &clauses).await.unwrap(),
            CommitOutcome::Committed(_)
        ));
        assert_eq!(
            tx.run(&ctx, &ledger, &clauses).await.unwrap(),
            CommitOutcome::AlreadyCommitted
        );

        let events = store.list_events(ctx.contract_id).await.unwrap();
        let committed = events
            .iter()
            .filter(|e| e.event_type == ClauseEventType::Committed)
            .count();
        assert_eq!(committed, 1);
    }

    #[tokio::test]
    async fn committing_an_unknown_contract_fails_cleanly() {
        let store = Arc::new(MemoryStore::new());
        let ctx = ctx(Uuid::now_v7());
        let ledger = LedgerService::load(store.clone(), ctx.clone()).await.unwrap();
        let tx = CommitTransaction::new(store, Arc::new(TracingAuditSink));

        let err = tx.run(&ctx, &ledger, &[]).await.unwrap_err();
        assert!(matches!(err, SessionError::Store(_)));
    }

    #[tokio::test]
    async fn headers_and_uncertified_clauses_are_not_swept() {
        let (store, ctx, ledger, mut clauses) = setup(0).await;
        let mut header = leaf(ctx.contract_id, 0);
        header.is_header = true;
        let mut failed = leaf(ctx.contract_id, 1);
        failed.processing_status = ProcessingStatus::Failed;
        let certified = leaf(ctx.contract_id, 2);
        clauses.extend([header, failed, certified.clone()]);

        let tx = CommitTransaction::new(store, Arc::new(TracingAuditSink));
        let outcome = tx.run(&ctx, &ledger, &clauses).await.unwrap();

        match outcome {
            CommitOutcome::Committed(tally) => {
                assert_eq!(tally.individually_agreed, 0);
                assert_eq!(tally.auto_agreed, 1);
            }
            other => panic!("expected commit, got {other:?}"),
        }
        let state = ledger.state().await;
        assert!(state.is_agreed(certified.id));
        assert_eq!(state.agreed_count(), 1);
    }
}
