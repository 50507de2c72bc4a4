pub mod clock;
pub mod config;
pub mod currency;
pub mod duration;
pub mod format;
pub mod git;
pub mod ledger;
pub mod models;
pub mod navigator;
pub mod session;
pub mod snapshot_store;
pub mod tracker;
