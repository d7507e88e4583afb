use crate::rpc::RpcClient;
use alloy_primitives::{Address, Bytes};
use anyhow::Result;
use std::future::Future;
use tracing::info;

/// Anything that can answer `eth_getCode` at a historical block.
pub trait CodeLookup {
    fn code_at(&self, address: Address, block: u64) -> impl Future<Output = Result<Bytes>> + Send;
}

impl CodeLookup for RpcClient {
    fn code_at(&self, address: Address, block: u64) -> impl Future<Output = Result<Bytes>> + Send {
        self.get_code_at_block(address, block)
    }
}

/// Binary search for the first block at which `address` has code.
pub async fn find_deployment_block<C: CodeLookup>(
    client: &C,
    address: Address,
    latest_block: u64,
) -> Result<u64> {
    info!("Searching for deployment block of contract {:?}", address);

    let code = client.code_at(address, latest_block).await?;
    if code.is_empty() {
        anyhow::bail!("Address {:?} is not a deployed contract", address);
    }

    let mut left = 0u64;
    let mut right = latest_block;

    while left < right {
        let mid = left + (right - left) / 2;

        if client.code_at(address, mid).await?.is_empty() {
            left = mid + 1;
        } else {
            right = mid;
        }
    }

    info!("Contract deployed at block {}", left);
    Ok(left)
}
