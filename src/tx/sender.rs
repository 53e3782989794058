//! Transaction submission orchestrator
//!
//! Sequences fee computation, gas estimation, the balance preflight,
//! nonce allocation, broadcast and confirmation waiting into one
//! concurrency-safe operation. The nonce allocator is the only shared
//! mutable state; once a nonce has been consumed, every classified
//! failure resets the allocator before surfacing so the next attempt
//! re-synchronizes with the chain.

use std::sync::Arc;
use std::time::Duration;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, Bytes, Eip1559TransactionRequest, TransactionReceipt,
    TransactionRequest as EthTransactionRequest, H256, U256,
};
use tracing::{info, warn};

use super::gas::{select_pricing, GasPrice, GasPricing};
use super::hooks::LifecycleHooks;
use super::nonce::NonceAllocator;
use super::preflight;
use super::retry::{with_retry, ExponentialBackoff, RetryPolicy};
use crate::chain::ChainClient;
use crate::config::Settings;
use crate::error::{ErrorKind, RelayError, RelayResult, SendError};
use crate::metrics;

/// A transaction as given by the caller
///
/// Never mutated by the relay; nonce, gas limit and fee fields are added
/// on a separate outbound representation.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub to: Address,
    pub value: U256,
    pub data: Option<Bytes>,
    /// When set, gas estimation is skipped
    pub gas_limit: Option<U256>,
}

/// End-to-end transaction submission for one account on one chain
pub struct TransactionSender {
    chain: Arc<dyn ChainClient>,
    wallet: LocalWallet,
    address: Address,
    chain_id: u64,
    pricing: Box<dyn GasPricing>,
    retry: Box<dyn RetryPolicy>,
    nonce: NonceAllocator,
    hooks: LifecycleHooks,
    preflight_enabled: bool,
    min_balance: Option<U256>,
    confirmation_timeout: Duration,
}

impl TransactionSender {
    /// Create a sender with the pricing and retry policies derived from
    /// settings; `with_*` builders override individual pieces
    pub fn new(chain: Arc<dyn ChainClient>, wallet: LocalWallet, settings: &Settings) -> Self {
        let chain_id = settings.chain.chain_id;
        let wallet = wallet.with_chain_id(chain_id);
        let address = wallet.address();

        info!("Transaction sender initialized with wallet: {:?}", address);

        let pricing = select_pricing(
            chain.clone(),
            settings.chain.supports_eip1559,
            &settings.gas,
        );
        let retry: Box<dyn RetryPolicy> = Box::new(ExponentialBackoff::from(&settings.retry));
        let nonce = NonceAllocator::new(chain.clone(), address);

        Self {
            chain,
            wallet,
            address,
            chain_id,
            pricing,
            retry,
            nonce,
            hooks: LifecycleHooks::new(),
            preflight_enabled: settings.preflight.enabled,
            min_balance: settings.preflight.min_balance_wei.map(U256::from),
            confirmation_timeout: Duration::from_secs(settings.chain.confirmation_timeout_secs),
        }
    }

    pub fn with_hooks(mut self, hooks: LifecycleHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_pricing(mut self, pricing: Box<dyn GasPricing>) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_retry_policy(mut self, retry: Box<dyn RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    /// Address of the relaying account
    pub fn address(&self) -> Address {
        self.address
    }

    /// Nonce allocator for this sender's account
    pub fn nonce_allocator(&self) -> &NonceAllocator {
        &self.nonce
    }

    /// Submit a transaction and wait for its confirmation
    ///
    /// Returns the transaction hash once a terminal receipt exists; a
    /// mined-but-reverted transaction still returns its hash since the
    /// nonce was consumed on chain. Classified failures fire the
    /// on-error hook last; hook faults propagate as [`SendError::Hook`]
    /// without touching the relay's own failure handling.
    pub async fn send_transaction(&self, request: &TransactionRequest) -> Result<H256, SendError> {
        match self.submit(request).await {
            Ok(hash) => Ok(hash),
            Err(SendError::Classified(err)) => {
                metrics::record_tx_failed(self.chain_id, err.kind());
                self.hooks
                    .dispatch_error(&err)
                    .await
                    .map_err(SendError::Hook)?;
                Err(SendError::Classified(err))
            }
            Err(hook_fault) => Err(hook_fault),
        }
    }

    async fn submit(&self, request: &TransactionRequest) -> Result<H256, SendError> {
        // Estimation and pricing run concurrently; a failure here
        // short-circuits before any nonce is consumed.
        let (gas_limit, fees) =
            tokio::try_join!(self.resolve_gas_limit(request), self.pricing.fee_params())?;

        if self.preflight_enabled {
            let gas_cost = gas_limit * fees.cap_per_gas();
            preflight::check_balance(
                self.chain.as_ref(),
                self.address,
                request.value + gas_cost,
                self.min_balance,
            )
            .await?;
        }

        self.hooks
            .dispatch_before_send(request)
            .await
            .map_err(SendError::Hook)?;

        let nonce = self.nonce.next().await?;

        // The nonce is consumed: any classified failure from here on
        // resets the allocator so the next send re-fetches from chain.
        match self.broadcast_and_confirm(request, nonce, gas_limit, &fees).await {
            Ok(hash) => Ok(hash),
            Err(SendError::Classified(err)) => {
                self.nonce.reset().await;
                Err(SendError::Classified(err))
            }
            Err(hook_fault) => Err(hook_fault),
        }
    }

    async fn broadcast_and_confirm(
        &self,
        request: &TransactionRequest,
        nonce: u64,
        gas_limit: U256,
        fees: &GasPrice,
    ) -> Result<H256, SendError> {
        let tx = self.build_transaction(request, nonce, gas_limit, fees);

        let signature = self.wallet.sign_transaction(&tx).await.map_err(|e| {
            RelayError::wrap(
                ErrorKind::InvalidSignature,
                format!("Failed to sign transaction: {e}"),
                e.into(),
            )
        })?;
        let raw = tx.rlp_signed(&signature);

        let hash = self.chain.submit_transaction(raw).await?;
        info!("Transaction sent: {:?} (nonce {})", hash, nonce);
        metrics::record_tx_submitted(self.chain_id);

        self.hooks
            .dispatch_broadcast(hash)
            .await
            .map_err(SendError::Hook)?;

        let receipt = self.wait_for_transaction(hash).await?;

        if receipt_succeeded(&receipt) {
            metrics::record_tx_confirmed(self.chain_id);
            self.hooks
                .dispatch_confirmed(&receipt)
                .await
                .map_err(SendError::Hook)?;
        } else {
            warn!("Transaction {:?} mined but reverted", hash);
        }

        self.hooks
            .dispatch_after_complete(&receipt)
            .await
            .map_err(SendError::Hook)?;

        Ok(hash)
    }

    /// Estimate the gas limit for a request, retried per the policy
    pub async fn estimate_gas(&self, request: &TransactionRequest) -> RelayResult<U256> {
        let tx = self.estimation_request(request);
        with_retry(self.retry.as_ref(), "estimate_gas", || async {
            self.chain.estimate_gas(&tx).await
        })
        .await
    }

    /// Wait for a transaction's receipt, retried per the policy
    pub async fn wait_for_transaction(&self, hash: H256) -> RelayResult<TransactionReceipt> {
        with_retry(self.retry.as_ref(), "wait_for_receipt", || {
            self.chain.wait_for_receipt(hash, self.confirmation_timeout)
        })
        .await
    }

    async fn resolve_gas_limit(&self, request: &TransactionRequest) -> RelayResult<U256> {
        match request.gas_limit {
            Some(limit) => Ok(limit),
            None => self.estimate_gas(request).await,
        }
    }

    /// Fee-less transaction used for gas estimation only
    fn estimation_request(&self, request: &TransactionRequest) -> TypedTransaction {
        let mut tx = EthTransactionRequest::new()
            .from(self.address)
            .to(request.to)
            .value(request.value);
        if let Some(data) = &request.data {
            tx = tx.data(data.clone());
        }
        TypedTransaction::Legacy(tx)
    }

    /// Assemble the outbound transaction: caller fields plus nonce, gas
    /// limit and exactly the fee shape the pricing strategy produced
    fn build_transaction(
        &self,
        request: &TransactionRequest,
        nonce: u64,
        gas_limit: U256,
        fees: &GasPrice,
    ) -> TypedTransaction {
        match fees {
            GasPrice::Legacy(price) => {
                let mut tx = EthTransactionRequest::new()
                    .from(self.address)
                    .to(request.to)
                    .value(request.value)
                    .nonce(nonce)
                    .gas(gas_limit)
                    .gas_price(*price)
                    .chain_id(self.chain_id);
                if let Some(data) = &request.data {
                    tx = tx.data(data.clone());
                }
                TypedTransaction::Legacy(tx)
            }
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let mut tx = Eip1559TransactionRequest::new()
                    .from(self.address)
                    .to(request.to)
                    .value(request.value)
                    .nonce(nonce)
                    .gas(gas_limit)
                    .max_fee_per_gas(*max_fee_per_gas)
                    .max_priority_fee_per_gas(*max_priority_fee_per_gas)
                    .chain_id(self.chain_id);
                if let Some(data) = &request.data {
                    tx = tx.data(data.clone());
                }
                TypedTransaction::Eip1559(tx)
            }
        }
    }
}

fn receipt_succeeded(receipt: &TransactionReceipt) -> bool {
    receipt.status == Some(1u64.into())
}
