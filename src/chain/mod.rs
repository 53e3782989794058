//! Chain module - the RPC collaborator boundary
//!
//! Everything the relay core needs from a chain endpoint is expressed by
//! the [`ChainClient`] trait; [`RpcClient`] is the production
//! implementation over ethers HTTP providers with automatic failover.
//! Policy engines and the orchestrator only ever see the trait, which is
//! what makes the core testable without a node.

pub mod provider;

pub use provider::RpcClient;

use std::time::Duration;

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};

use crate::error::RelayResult;

/// Per-block priority-fee reward sample returned by `eth_feeHistory`
///
/// `reward[i][j]` is the reward at the j-th requested percentile in the
/// i-th sampled block.
#[derive(Debug, Clone, Default)]
pub struct FeeHistory {
    pub reward: Vec<Vec<U256>>,
}

/// Capability surface the relay core requires from a chain endpoint
///
/// One implementor per endpoint; all methods classify their failures
/// before returning so callers only ever see [`crate::RelayError`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current on-chain transaction count for an account
    async fn transaction_count(&self, address: Address) -> RelayResult<u64>;

    /// Current account balance in wei
    async fn balance(&self, address: Address) -> RelayResult<U256>;

    /// Current legacy gas price
    async fn gas_price(&self) -> RelayResult<U256>;

    /// Base fee of the latest block
    async fn latest_base_fee(&self) -> RelayResult<U256>;

    /// Priority-fee reward history over recent blocks
    async fn fee_history(&self, block_count: u64, percentiles: Vec<f64>)
        -> RelayResult<FeeHistory>;

    /// Estimate the gas limit for a transaction
    async fn estimate_gas(&self, tx: &TypedTransaction) -> RelayResult<U256>;

    /// Broadcast a signed raw transaction, returning its hash
    async fn submit_transaction(&self, raw: Bytes) -> RelayResult<H256>;

    /// Poll until the transaction has a receipt or the timeout elapses
    async fn wait_for_receipt(
        &self,
        hash: H256,
        timeout: Duration,
    ) -> RelayResult<TransactionReceipt>;
}
