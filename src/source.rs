use crate::events::TransferEvent;
use alloy_primitives::Address;
use anyhow::Result;
use std::future::Future;

/// Transfers fetched for one token, in canonical chain order.
#[derive(Debug, Clone, Default)]
pub struct TransferBatch {
    pub events: Vec<TransferEvent>,
    /// First block actually covered (the deployment block when scanning from genesis).
    pub start_block: u64,
    /// Last block fully covered; the next fetch resumes after it.
    pub end_block: u64,
    /// Token decimals when the source reports them.
    pub decimals: Option<u8>,
}

/// Upstream provider of a token's transfer log.
///
/// Implementations own retries, timeouts and rate limiting. A source that
/// silently truncates its result cannot be detected downstream.
pub trait TransferEventSource {
    fn name(&self) -> &'static str;

    fn fetch_transfers(
        &self,
        token: Address,
        from_block: u64,
    ) -> impl Future<Output = Result<TransferBatch>> + Send;
}
