pub mod assistant;
pub mod certification;
pub mod certifier;
pub mod commit;
pub mod drafts;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod messaging;
pub mod session;
pub mod store;
