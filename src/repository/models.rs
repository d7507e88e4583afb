use alloy_primitives::Address;

#[derive(Debug, Clone)]
pub struct Token {
    pub address: Address,
    pub deployment_block: u64,
    pub last_processed_block: Option<u64>,
    pub decimals: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSnapshot {
    pub payload: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}
