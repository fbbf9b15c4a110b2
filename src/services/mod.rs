pub mod cascade;
pub mod ledger;
pub mod lifecycle;
pub mod search;
pub mod views;
