pub mod config;
pub mod deployment;
pub mod error;
pub mod etherscan;
pub mod events;
pub mod ledger;
pub mod query;
pub mod repository;
pub mod rpc;
pub mod scanner;
pub mod snapshot;
pub mod source;
pub mod sync;
pub mod treasury;
pub mod valuation;
