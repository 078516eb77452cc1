use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use redline_core::clause::{Clause, ClausePatch, ProcessingStatus};

use crate::certifier::Certifier;
use crate::store::ContractStore;

/// Fixed cadence of the reconciliation poll against the authoritative store.
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(4);

/// Aggregate certification progress across the contract's leaf clauses.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CertificationProgress {
    pub certified: usize,
    pub failed: usize,
    pub pending: usize,
    pub total: usize,
}

impl CertificationProgress {
    pub fn of(clauses: &[Clause]) -> Self {
        let mut progress = Self::default();
        for clause in clauses.iter().filter(|c| !c.is_header) {
            progress.total += 1;
            match clause.processing_status {
                ProcessingStatus::Certified => progress.certified += 1,
                ProcessingStatus::Failed => progress.failed += 1,
                ProcessingStatus::Pending | ProcessingStatus::Processing => {
                    progress.pending += 1
                }
            }
        }
        progress
    }

    /// Complete means nothing is left for the certifier, failures included.
    pub fn is_complete(&self) -> bool {
        self.pending == 0
    }
}

/// What first load decided to do about uncertified clauses.
#[derive(Debug, PartialEq, Eq)]
pub enum StartupAction {
    /// Uncertified clauses without analysis output exist: fire the certifier.
    Trigger,
    /// Pending clauses that already carry analysis output (template reuse)
    /// were promoted locally. No network call.
    Promoted(Vec<Uuid>),
    Nothing,
}

/// Local clause state plus the one-shot trigger flag. Pure state machine:
/// all I/O lives in [`CertificationReconciler`].
pub struct CertificationTracker {
    clauses: Vec<Clause>,
    triggered: bool,
}

impl CertificationTracker {
    pub fn new(clauses: Vec<Clause>) -> Self {
        Self {
            clauses,
            triggered: false,
        }
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn clause(&self, clause_id: Uuid) -> Option<&Clause> {
        self.clauses.iter().find(|c| c.id == clause_id)
    }

    pub fn progress(&self) -> CertificationProgress {
        CertificationProgress::of(&self.clauses)
    }

    /// True while any non-header clause is still pending or processing.
    pub fn needs_reconciliation(&self) -> bool {
        self.clauses.iter().any(Clause::awaiting_certification)
    }

    /// First-load work detection. Fires at most one trigger per session:
    /// the flag is set before the caller performs the network call, so a
    /// re-evaluation never sends a second one.
    pub fn startup_action(&mut self) -> StartupAction {
        let needs_certifier = self
            .clauses
            .iter()
            .any(|c| c.awaiting_certification() && c.certification.is_none());

        if needs_certifier {
            if self.triggered {
                return StartupAction::Nothing;
            }
            self.triggered = true;
            return StartupAction::Trigger;
        }

        // Template-reuse case: analysis output is already there, only the
        // status is stale. Promote locally, no network.
        let promoted: Vec<Uuid> = self
            .clauses
            .iter_mut()
            .filter(|c| c.awaiting_certification() && c.certification.is_some())
            .map(|c| {
                c.processing_status = ProcessingStatus::Certified;
                c.id
            })
            .collect();

        if promoted.is_empty() {
            StartupAction::Nothing
        } else {
            StartupAction::Promoted(promoted)
        }
    }

    /// Merge store-side changes by clause id, in place. The clause list is
    /// never replaced wholesale, so an in-progress selection (held by id or
    /// index) survives every poll cycle.
    pub fn merge_patches(&mut self, patches: Vec<ClausePatch>) {
        for patch in patches {
            if let Some(clause) = self.clauses.iter_mut().find(|c| c.id == patch.id) {
                clause.processing_status = patch.processing_status;
                clause.is_header = patch.is_header;
                if patch.certification.is_some() {
                    clause.certification = patch.certification;
                }
                if patch.extracted_value.is_some() {
                    clause.extracted_value = patch.extracted_value;
                }
                if patch.original_text.is_some() {
                    clause.original_text = patch.original_text;
                }
            }
        }
    }

    /// Local mirror of a persisted draft change (see drafts module).
    pub(crate) fn set_draft(&mut self, clause_id: Uuid, draft: Option<String>) {
        if let Some(clause) = self.clauses.iter_mut().find(|c| c.id == clause_id) {
            clause.draft_modified = draft.is_some();
            clause.draft_text = draft;
        }
    }
}

/// Drives the tracker against the store and certifier: startup trigger,
/// then the fixed-interval poll until no clause is pending or processing.
pub struct CertificationReconciler {
    store: Arc<dyn ContractStore>,
    certifier: Arc<dyn Certifier>,
    tracker: Arc<Mutex<CertificationTracker>>,
    contract_id: Uuid,
}

impl CertificationReconciler {
    pub fn new(
        store: Arc<dyn ContractStore>,
        certifier: Arc<dyn Certifier>,
        tracker: Arc<Mutex<CertificationTracker>>,
        contract_id: Uuid,
    ) -> Self {
        Self {
            store,
            certifier,
            tracker,
            contract_id,
        }
    }

    /// Evaluate the startup step of the state machine. Trigger failures are
    /// logged, not escalated: the result would only be observed through
    /// polling anyway, and the one-shot flag is already set.
    pub async fn startup(&self) {
        let action = self.tracker.lock().await.startup_action();
        match action {
            StartupAction::Trigger => {
                tracing::info!(contract_id = %self.contract_id, "triggering certification");
                if let Err(e) = self.certifier.trigger(self.contract_id).await {
                    tracing::warn!(contract_id = %self.contract_id, error = %e, "certifier trigger failed");
                }
            }
            StartupAction::Promoted(ids) => {
                tracing::info!(
                    contract_id = %self.contract_id,
                    promoted = ids.len(),
                    "promoted pre-analyzed clauses locally"
                );
            }
            StartupAction::Nothing => {}
        }
    }

    /// One poll cycle. Returns whether polling should continue. A transient
    /// store failure keeps the loop alive; the next cycle retries.
    pub async fn reconcile_once(&self) -> bool {
        match self.store.fetch_clause_patches(self.contract_id).await {
            Ok(patches) => {
                let mut tracker = self.tracker.lock().await;
                tracker.merge_patches(patches);
                tracker.needs_reconciliation()
            }
            Err(e) => {
                tracing::warn!(contract_id = %self.contract_id, error = %e, "clause poll failed, will retry");
                true
            }
        }
    }

    /// Poll until nothing remains pending/processing, then stop. Resumption
    /// is not automatic; a new session re-runs `startup`.
    pub async fn run_poll_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(RECONCILE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if !self.tracker.lock().await.needs_reconciliation() {
                break;
            }
            if !self.reconcile_once().await {
                break;
            }
        }
        tracing::debug!(contract_id = %self.contract_id, "certification poll stopped");
    }
}
