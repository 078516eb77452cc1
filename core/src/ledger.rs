use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{ClauseEvent, ClauseEventType};

/// Current negotiation state derived from the event ledger. The ledger is
/// the source of truth; this struct is a pure fold over it and is never
/// persisted. Agreed/queried membership must not be stored as flags on the
/// clause — a late-arriving withdrawal or resolution has to reverse state
/// that was derived earlier.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerState {
    agreed: HashSet<Uuid>,
    queried: HashSet<Uuid>,
    committed: bool,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event's effect. Events without a clause reference only
    /// matter for the contract-level `committed` transition; position and
    /// redraft events are recorded in the ledger but do not move the sets.
    pub fn apply(&mut self, event: &ClauseEvent) {
        match (event.event_type, event.clause_id) {
            (ClauseEventType::Agreed, Some(id)) => {
                self.agreed.insert(id);
            }
            (ClauseEventType::AgreementWithdrawn, Some(id)) => {
                self.agreed.remove(&id);
            }
            (ClauseEventType::Queried, Some(id)) => {
                self.queried.insert(id);
            }
            (ClauseEventType::QueryResolved, Some(id)) => {
                self.queried.remove(&id);
            }
            (ClauseEventType::Committed, _) => {
                self.committed = true;
            }
            (ClauseEventType::PositionChanged | ClauseEventType::Redrafted, _) => {}
            // Set-affecting event without a clause reference: nothing to do.
            (_, None) => {}
        }
    }

    /// Rebuild state from scratch. Input order is not trusted: events are
    /// folded in (created_at, id) order so that replay after a reload
    /// matches the incremental application that produced the ledger.
    pub fn replay(events: &[ClauseEvent]) -> Self {
        let mut ordered: Vec<&ClauseEvent> = events.iter().collect();
        ordered.sort_by_key(|e| e.sort_key());

        let mut state = Self::new();
        for event in ordered {
            state.apply(event);
        }
        state
    }

    pub fn is_agreed(&self, clause_id: Uuid) -> bool {
        self.agreed.contains(&clause_id)
    }

    pub fn is_queried(&self, clause_id: Uuid) -> bool {
        self.queried.contains(&clause_id)
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn agreed(&self) -> &HashSet<Uuid> {
        &self.agreed
    }

    pub fn queried(&self) -> &HashSet<Uuid> {
        &self.queried
    }

    pub fn agreed_count(&self) -> usize {
        self.agreed.len()
    }

    pub fn open_query_count(&self) -> usize {
        self.queried.len()
    }
}
