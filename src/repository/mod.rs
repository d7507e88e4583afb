pub mod database;
pub mod models;
pub mod snapshot_repository;
pub mod token_repository;
pub mod transfer_repository;
pub mod treasury_repository;

pub use database::Database;
pub use models::{CachedSnapshot, Token};
pub use snapshot_repository::SnapshotRepository;
pub use token_repository::TokenRepository;
pub use transfer_repository::{TransferRepository, TransferStats};
pub use treasury_repository::TreasuryRepository;
