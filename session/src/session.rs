use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use uuid::Uuid;

use redline_core::clause::{Clause, PartyRole};
use redline_core::ledger::LedgerState;
use redline_core::messages::PartyMessage;

use crate::certification::{CertificationProgress, CertificationReconciler, CertificationTracker};
use crate::certifier::Certifier;
use crate::commit::{AuditSink, CommitOutcome, CommitTransaction};
use crate::drafts::DraftStore;
use crate::error::SessionError;
use crate::ledger::LedgerService;
use crate::messaging::MessageChannel;
use crate::store::ContractStore;

/// Who is acting, on which contract. Passed explicitly into every component
/// instead of living in ambient globals — the ledger, messaging, and
/// certification pieces share no hidden state.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub contract_id: Uuid,
    pub party_id: Uuid,
    pub party_name: String,
    /// Initiator uploaded the original document; the other side responds.
    pub party_role: PartyRole,
    /// Client user agent, recorded in the commit audit trail.
    pub user_agent: Option<String>,
}

/// One party's live view of a negotiation. Owns the background work — the
/// certification reconcile loop, the message push subscription, and the
/// message poll — and tears all of it down on `close`. The other party and
/// the certifier mutate the same contract concurrently without any
/// coordination; everything here merges their writes instead of assuming
/// exclusive ownership.
pub struct NegotiationSession {
    ctx: SessionContext,
    store: Arc<dyn ContractStore>,
    tracker: Arc<Mutex<CertificationTracker>>,
    ledger: Arc<LedgerService>,
    channel: Arc<MessageChannel>,
    drafts: DraftStore,
    audit: Arc<dyn AuditSink>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl NegotiationSession {
    /// Load clause and event state, run the certification startup step
    /// (trigger or local promotion), and spawn the background loops.
    pub async fn open(
        store: Arc<dyn ContractStore>,
        certifier: Arc<dyn Certifier>,
        audit: Arc<dyn AuditSink>,
        ctx: SessionContext,
    ) -> Result<Self, SessionError> {
        let clauses = store.load_clauses(ctx.contract_id).await?;
        let tracker = Arc::new(Mutex::new(CertificationTracker::new(clauses)));

        let reconciler = Arc::new(CertificationReconciler::new(
            store.clone(),
            certifier,
            tracker.clone(),
            ctx.contract_id,
        ));
        reconciler.startup().await;

        let ledger = Arc::new(LedgerService::load(store.clone(), ctx.clone()).await?);
        let channel = Arc::new(MessageChannel::new(store.clone(), ctx.clone()));
        let drafts = DraftStore::new(store.clone(), tracker.clone());

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(reconciler.run_poll_loop()));
        tasks.push(Self::spawn_push_loop(
            store.subscribe_messages(ctx.contract_id),
            channel.clone(),
        ));
        tasks.push(Self::spawn_message_poll(channel.clone()));

        Ok(Self {
            ctx,
            store,
            tracker,
            ledger,
            channel,
            drafts,
            audit,
            tasks: std::sync::Mutex::new(tasks),
        })
    }

    fn spawn_push_loop(
        mut rx: broadcast::Receiver<PartyMessage>,
        channel: Arc<MessageChannel>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => channel.receive_push(message).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "message push lagged, poll will catch up");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn spawn_message_poll(channel: Arc<MessageChannel>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let open = channel.is_panel_open().await;
                tokio::time::sleep(MessageChannel::poll_interval(open)).await;
                if let Err(e) = channel.poll_once().await {
                    tracing::warn!(error = %e, "message poll failed, will retry");
                }
            }
        })
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Snapshot of the local clause state (order preserved).
    pub async fn clauses(&self) -> Vec<Clause> {
        self.tracker.lock().await.clauses().to_vec()
    }

    pub async fn progress(&self) -> CertificationProgress {
        self.tracker.lock().await.progress()
    }

    pub async fn ledger_state(&self) -> LedgerState {
        self.ledger.state().await
    }

    pub fn channel(&self) -> &MessageChannel {
        &self.channel
    }

    pub fn drafts(&self) -> &DraftStore {
        &self.drafts
    }

    async fn ensure_actionable(&self, clause_id: Uuid) -> Result<(), SessionError> {
        let tracker = self.tracker.lock().await;
        let clause = tracker
            .clause(clause_id)
            .ok_or(SessionError::ClauseNotFound(clause_id))?;
        if !clause.is_actionable() {
            return Err(SessionError::NotActionable(clause_id));
        }
        Ok(())
    }

    /// Agree to a certified leaf clause. Idempotent.
    pub async fn agree(&self, clause_id: Uuid) -> Result<bool, SessionError> {
        self.ensure_actionable(clause_id).await?;
        self.ledger.agree(clause_id).await
    }

    /// Withdraw a previous agreement. No actionability check: a clause that
    /// was agreed can always be un-agreed.
    pub async fn withdraw(&self, clause_id: Uuid) -> Result<bool, SessionError> {
        self.ledger.withdraw(clause_id).await
    }

    /// Raise a query; the message is mirrored into the party channel.
    pub async fn query(&self, clause_id: Uuid, message: &str) -> Result<(), SessionError> {
        self.ensure_actionable(clause_id).await?;
        self.ledger.query(clause_id, message).await
    }

    pub async fn resolve_query(&self, clause_id: Uuid) -> Result<bool, SessionError> {
        self.ledger.resolve_query(clause_id).await
    }

    pub async fn record_position_change(
        &self,
        clause_id: Uuid,
        from: i32,
        to: i32,
    ) -> Result<(), SessionError> {
        self.ledger.record_position_change(clause_id, from, to).await
    }

    /// Save a draft override and annotate the ledger. The annotation is
    /// best-effort: the draft itself is already persisted.
    pub async fn save_draft(&self, clause_id: Uuid, text: &str) -> Result<(), SessionError> {
        self.drafts.save(clause_id, text).await?;
        if let Err(e) = self
            .ledger
            .record_redraft(clause_id, text.trim().len())
            .await
        {
            tracing::warn!(clause_id = %clause_id, error = %e, "redraft event not recorded");
        }
        Ok(())
    }

    pub async fn reset_draft(&self, clause_id: Uuid) -> Result<(), SessionError> {
        self.drafts.reset(clause_id).await
    }

    /// Finalize the contract (see the commit module for the transaction's
    /// ordering and retry guarantees).
    pub async fn commit(&self) -> Result<CommitOutcome, SessionError> {
        let clauses = self.clauses().await;
        CommitTransaction::new(self.store.clone(), self.audit.clone())
            .run(&self.ctx, &self.ledger, &clauses)
            .await
    }

    /// Stop every interval timer and drop the push subscription. There is
    /// no server-side session object that needs cleanup.
    pub fn close(&self) {
        let mut tasks = self.tasks.lock().expect("session task list poisoned");
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for NegotiationSession {
    fn drop(&mut self) {
        self.close();
    }
}
