pub mod api;
pub mod etl;
pub mod ledger;
pub mod trigger;
