use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use redline_core::clause::{
    Certification, Clause, FairnessVerdict, PartyRole, ProcessingStatus,
};
use redline_core::messages::PartyMessage;
use redline_core::tree::build_tree;
use redline_session::certifier::Certifier;
use redline_session::commit::{CommitOutcome, TracingAuditSink};
use redline_session::error::SessionError;
use redline_session::memory::MemoryStore;
use redline_session::session::{NegotiationSession, SessionContext};
use redline_session::store::ContractStore;

const CATEGORIES: [&str; 4] = ["payment", "liability", "termination", "confidentiality"];

/// Stand-in for the external certification service: certifies the
/// contract's clauses sequentially, writing results straight to the store
/// the way the real one would. The session only ever sees the effects
/// through its reconciliation poll.
struct SimulatedCertifier {
    store: Arc<MemoryStore>,
    per_clause: Duration,
}

#[async_trait]
impl Certifier for SimulatedCertifier {
    async fn trigger(&self, contract_id: Uuid) -> Result<(), SessionError> {
        let store = self.store.clone();
        let per_clause = self.per_clause;
        tokio::spawn(async move {
            let Ok(clauses) = store.load_clauses(contract_id).await else {
                return;
            };
            for (i, clause) in clauses
                .iter()
                .filter(|c| c.awaiting_certification())
                .enumerate()
            {
                store.set_processing_status(clause.id, ProcessingStatus::Processing);
                tokio::time::sleep(per_clause).await;
                store.apply_certification(
                    clause.id,
                    Certification {
                        position: 3 + (i as i32 % 5),
                        verdict: FairnessVerdict::Balanced,
                        summary: format!("Standard {} terms", clause.category),
                        assessment: None,
                        flags: vec![],
                        revised_text: None,
                    },
                );
            }
        });
        Ok(())
    }
}

fn leaf(contract_id: Uuid, order: i32, parent_id: Option<Uuid>) -> Clause {
    let category = CATEGORIES[order as usize % CATEGORIES.len()];
    Clause {
        id: Uuid::now_v7(),
        contract_id,
        name: format!("{} {} terms", order + 1, category),
        category: category.to_string(),
        display_order: order,
        parent_id,
        clause_level: if parent_id.is_some() { 2 } else { 1 },
        is_header: false,
        processing_status: ProcessingStatus::Pending,
        original_text: Some(format!("The parties accept the standard {category} terms.")),
        draft_text: None,
        draft_modified: false,
        certification: None,
        extracted_value: None,
        created_at: Utc::now(),
    }
}

/// A contract with one section (two children) and standalone leaves for
/// the remainder, `leaves` actionable clauses in total.
fn build_contract(contract_id: Uuid, leaves: usize) -> Vec<Clause> {
    let mut clauses = Vec::new();
    let mut order = 0;

    if leaves >= 2 {
        let mut header = leaf(contract_id, order, None);
        header.is_header = true;
        header.name = "1 General conditions".to_string();
        let header_id = header.id;
        clauses.push(header);
        order += 1;
        for _ in 0..2 {
            clauses.push(leaf(contract_id, order, Some(header_id)));
            order += 1;
        }
    }
    while clauses.iter().filter(|c| !c.is_header).count() < leaves {
        clauses.push(leaf(contract_id, order, None));
        order += 1;
    }
    clauses
}

pub async fn run(leaves: usize, certify_ms: u64) -> Result<(), Box<dyn Error>> {
    let store = Arc::new(MemoryStore::new());
    let contract_id = Uuid::now_v7();
    store.seed_contract(contract_id, build_contract(contract_id, leaves));

    let certifier = Arc::new(SimulatedCertifier {
        store: store.clone(),
        per_clause: Duration::from_millis(certify_ms),
    });

    let ctx = SessionContext {
        contract_id,
        party_id: Uuid::now_v7(),
        party_name: "Alex (initiator)".to_string(),
        party_role: PartyRole::Initiator,
        user_agent: Some("redline-cli".to_string()),
    };
    let session =
        NegotiationSession::open(store.clone(), certifier, Arc::new(TracingAuditSink), ctx)
            .await?;

    println!("waiting for certification of {leaves} clauses...");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while !session.progress().await.is_complete() {
        if tokio::time::Instant::now() > deadline {
            return Err("certification did not complete within 30s".into());
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    let progress = session.progress().await;
    println!(
        "certified {}/{} (failed: {})",
        progress.certified, progress.total, progress.failed
    );

    let clauses = session.clauses().await;
    for node in build_tree(&clauses) {
        println!("- {}", node.clause.name);
        for child in &node.children {
            println!("    - {}", child.name);
        }
    }

    // The other party chimes in while our panel is closed.
    let respondent = PartyMessage::new(
        contract_id,
        Uuid::now_v7(),
        "Robin (respondent)",
        PartyRole::Respondent,
        "Reviewed the draft, two concerns on liability.",
    );
    store.insert_message(respondent).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("unread messages: {}", session.channel().unread_count().await);
    session.channel().open_panel().await?;
    println!(
        "panel opened, unread now: {}",
        session.channel().unread_count().await
    );

    let actionable: Vec<Uuid> = clauses
        .iter()
        .filter(|c| c.is_actionable())
        .map(|c| c.id)
        .collect();
    if let Some(&first) = actionable.first() {
        let seed = session.drafts().start_edit(first).await?;
        session
            .save_draft(first, &format!("{seed} Amended: payments due net 45."))
            .await?;
        println!("saved draft for clause {first}");
        session.agree(first).await?;
        println!("agreed clause {first}");
    }
    if let Some(&second) = actionable.get(1) {
        session.record_position_change(second, 5, 7).await?;
        session
            .query(second, "Is the indemnity cap negotiable?")
            .await?;
        println!("queried clause {second}");
        session.resolve_query(second).await?;
        println!("query resolved");
    }

    match session.commit().await? {
        CommitOutcome::Committed(tally) => {
            println!(
                "committed: {} individually agreed, {} auto-agreed",
                tally.individually_agreed, tally.auto_agreed
            );
        }
        CommitOutcome::AlreadyCommitted => println!("contract was already committed"),
    }

    let events = store.list_events(contract_id).await?;
    println!("{}", serde_json::to_string_pretty(&events)?);

    session.close();
    Ok(())
}
