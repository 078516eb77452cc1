pub mod clause;
pub mod error;
pub mod events;
pub mod ledger;
pub mod messages;
pub mod tree;
