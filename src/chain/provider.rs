//! Ethers-backed chain client with multi-RPC support and automatic failover

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockNumber, Bytes, TransactionReceipt, H256, U256};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, warn};

use super::{ChainClient, FeeHistory};
use crate::config::ChainConfig;
use crate::error::{ErrorKind, RelayError, RelayResult};

/// Chain client over one or more HTTP endpoints
///
/// Read queries rotate to the next endpoint on failure; broadcast goes to
/// the currently active endpoint only, since rebroadcasting the same raw
/// transaction elsewhere gains nothing.
pub struct RpcClient {
    config: ChainConfig,
    providers: Vec<Provider<Http>>,
    current: AtomicUsize,
}

impl RpcClient {
    pub fn new(config: ChainConfig) -> RelayResult<Self> {
        let mut providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    debug!("Added RPC provider for chain {}: {}", config.chain_id, url);
                    providers.push(provider);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if providers.is_empty() {
            return Err(RelayError::new(
                ErrorKind::TemporaryFailure,
                format!("No valid RPC providers for chain {}", config.chain_id),
            ));
        }

        Ok(Self {
            config,
            providers,
            current: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    fn http(&self) -> &Provider<Http> {
        let idx = self.current.load(Ordering::Relaxed);
        &self.providers[idx % self.providers.len()]
    }

    /// Switch to the next available provider
    fn failover(&self) {
        let current = self.current.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.chain_id(), next);
    }

    /// Run a read query, rotating through providers on failure
    async fn with_failover<'a, T>(
        &'a self,
        op_name: &str,
        op: impl Fn(&'a Provider<Http>) -> BoxFuture<'a, Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        let mut last_err = None;
        for _ in 0..self.providers.len() {
            match op(self.http()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("{} failed on chain {}: {}", op_name, self.chain_id(), e);
                    self.failover();
                    last_err = Some(e);
                }
            }
        }
        // providers is non-empty, so the loop ran at least once
        Err(last_err.unwrap_or(ProviderError::CustomError(
            "no providers available".to_string(),
        )))
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn transaction_count(&self, address: Address) -> RelayResult<u64> {
        let count = self
            .with_failover("get_transaction_count", |p| {
                p.get_transaction_count(address, None).boxed()
            })
            .await
            .map_err(|e| {
                RelayError::wrap(
                    ErrorKind::NonceError,
                    format!("Failed to fetch transaction count: {e}"),
                    e.into(),
                )
            })?;
        Ok(count.as_u64())
    }

    async fn balance(&self, address: Address) -> RelayResult<U256> {
        self.with_failover("get_balance", |p| p.get_balance(address, None).boxed())
            .await
            .map_err(|e| RelayError::classify(e.into()))
    }

    async fn gas_price(&self) -> RelayResult<U256> {
        self.with_failover("get_gas_price", |p| p.get_gas_price().boxed())
            .await
            .map_err(|e| {
                RelayError::wrap(
                    ErrorKind::GasEstimationFailed,
                    format!("Failed to fetch gas price: {e}"),
                    e.into(),
                )
            })
    }

    async fn latest_base_fee(&self) -> RelayResult<U256> {
        let block = self
            .with_failover("get_block", |p| p.get_block(BlockNumber::Latest).boxed())
            .await
            .map_err(|e| {
                RelayError::wrap(
                    ErrorKind::GasEstimationFailed,
                    format!("Failed to fetch latest block: {e}"),
                    e.into(),
                )
            })?
            .ok_or_else(|| RelayError::gas_estimation("No latest block"))?;

        block
            .base_fee_per_gas
            .ok_or_else(|| RelayError::gas_estimation("No base fee in latest block"))
    }

    async fn fee_history(
        &self,
        block_count: u64,
        percentiles: Vec<f64>,
    ) -> RelayResult<FeeHistory> {
        let history = self
            .with_failover("fee_history", |p| {
                let percentiles = percentiles.clone();
                async move {
                    p.fee_history(block_count, BlockNumber::Latest, &percentiles)
                        .await
                }
                .boxed()
            })
            .await
            .map_err(|e| {
                RelayError::wrap(
                    ErrorKind::GasEstimationFailed,
                    format!("Failed to fetch fee history: {e}"),
                    e.into(),
                )
            })?;

        Ok(FeeHistory {
            reward: history.reward,
        })
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> RelayResult<U256> {
        self.with_failover("estimate_gas", |p| p.estimate_gas(tx, None).boxed())
            .await
            .map_err(|e| {
                RelayError::wrap(
                    ErrorKind::GasEstimationFailed,
                    format!("Gas estimation failed: {e}"),
                    e.into(),
                )
            })
    }

    async fn submit_transaction(&self, raw: Bytes) -> RelayResult<H256> {
        let pending = self
            .http()
            .send_raw_transaction(raw)
            .await
            .map_err(|e| RelayError::classify(e.into()))?;
        Ok(pending.tx_hash())
    }

    async fn wait_for_receipt(
        &self,
        hash: H256,
        timeout: Duration,
    ) -> RelayResult<TransactionReceipt> {
        let poll_interval = Duration::from_millis(self.config.receipt_poll_interval_ms);

        let poll = async {
            loop {
                match self
                    .with_failover("get_transaction_receipt", |p| {
                        p.get_transaction_receipt(hash).boxed()
                    })
                    .await
                {
                    Ok(Some(receipt)) => return Ok(receipt),
                    Ok(None) => {}
                    Err(e) => return Err(RelayError::classify(e.into())),
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| RelayError::timeout("transaction receipt"))?
    }
}
