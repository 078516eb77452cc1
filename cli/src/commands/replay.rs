use std::error::Error;
use std::path::Path;

use redline_core::events::ClauseEvent;
use redline_core::ledger::LedgerState;

/// Fold an exported event log and print the derived state. Useful for
/// checking what a contract's ledger resolves to without opening a session.
pub fn run(file: &Path) -> Result<(), Box<dyn Error>> {
    let raw = std::fs::read_to_string(file)?;
    let events: Vec<ClauseEvent> = serde_json::from_str(&raw)?;
    let state = LedgerState::replay(&events);

    let mut agreed: Vec<String> = state.agreed().iter().map(|id| id.to_string()).collect();
    let mut queried: Vec<String> = state.queried().iter().map(|id| id.to_string()).collect();
    agreed.sort();
    queried.sort();

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "events": events.len(),
            "agreed": agreed,
            "queried": queried,
            "committed": state.is_committed(),
        }))?
    );
    Ok(())
}
