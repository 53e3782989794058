//! Gas pricing strategies for legacy and fee-market chains
//!
//! Two interchangeable strategies compute the fee fields attached to an
//! outbound transaction: [`LegacyPricing`] multiplies the node's gas
//! price, [`MarketPricing`] derives EIP-1559 fees from the latest base
//! fee and recent priority-fee history. [`select_pricing`] picks the one
//! matching the chain's capabilities.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::U256;
use tracing::debug;

use crate::chain::ChainClient;
use crate::config::GasConfig;
use crate::error::{ErrorKind, RelayError, RelayResult};

const GWEI: u64 = 1_000_000_000;

/// Fee parameters for an outbound transaction
///
/// Exactly one shape per transaction; the enum makes mixing legacy and
/// market fields unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasPrice {
    Legacy(U256),
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

impl GasPrice {
    /// The per-gas amount used for affordability math: the legacy price
    /// or the market max fee
    pub fn cap_per_gas(&self) -> U256 {
        match self {
            GasPrice::Legacy(price) => *price,
            GasPrice::Eip1559 {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
        }
    }
}

/// A fee computation strategy
#[async_trait]
pub trait GasPricing: Send + Sync {
    async fn fee_params(&self) -> RelayResult<GasPrice>;
}

/// Single gas-price bid for chains without fee-market pricing
pub struct LegacyPricing {
    chain: Arc<dyn ChainClient>,
    multiplier: f64,
}

impl LegacyPricing {
    pub fn new(chain: Arc<dyn ChainClient>, multiplier: f64) -> Self {
        Self { chain, multiplier }
    }
}

#[async_trait]
impl GasPricing for LegacyPricing {
    async fn fee_params(&self) -> RelayResult<GasPrice> {
        let price = self
            .chain
            .gas_price()
            .await
            .map_err(as_estimation_error)?;
        let bid = mul_ceil(price, self.multiplier);
        debug!("Legacy gas price: {} (node price {})", bid, price);
        Ok(GasPrice::Legacy(bid))
    }
}

/// Knobs for [`MarketPricing`]
#[derive(Debug, Clone)]
pub struct MarketPricingConfig {
    /// Fee-history window in blocks
    pub fee_history_blocks: u64,
    /// Reward percentile to sample from fee history
    pub reward_percentile: f64,
    /// Multiplier applied to the median sampled reward
    pub priority_fee_multiplier: f64,
    /// Base-fee headroom; folded in as `ceil(multiplier)`
    pub base_fee_multiplier: f64,
    pub min_priority_fee: U256,
    pub max_priority_fee: U256,
    /// Hard ceiling on the computed max fee per gas
    pub max_total_fee: U256,
}

impl Default for MarketPricingConfig {
    fn default() -> Self {
        Self {
            fee_history_blocks: 20,
            reward_percentile: 50.0,
            priority_fee_multiplier: 1.5,
            base_fee_multiplier: 2.0,
            min_priority_fee: U256::one(),
            max_priority_fee: U256::from(500) * U256::from(GWEI),
            max_total_fee: U256::from(1000) * U256::from(GWEI),
        }
    }
}

impl From<&GasConfig> for MarketPricingConfig {
    fn from(cfg: &GasConfig) -> Self {
        Self {
            fee_history_blocks: cfg.fee_history_blocks,
            reward_percentile: cfg.reward_percentile,
            priority_fee_multiplier: cfg.priority_fee_multiplier,
            base_fee_multiplier: cfg.base_fee_multiplier,
            min_priority_fee: U256::from(cfg.min_priority_fee_wei),
            max_priority_fee: U256::from(cfg.max_priority_fee_wei),
            max_total_fee: U256::from(cfg.max_total_fee_wei),
        }
    }
}

/// EIP-1559 fee-market pricing from base fee plus sampled rewards
pub struct MarketPricing {
    chain: Arc<dyn ChainClient>,
    config: MarketPricingConfig,
}

impl MarketPricing {
    pub fn new(chain: Arc<dyn ChainClient>, config: MarketPricingConfig) -> Self {
        Self { chain, config }
    }
}

#[async_trait]
impl GasPricing for MarketPricing {
    async fn fee_params(&self) -> RelayResult<GasPrice> {
        let (base_fee, history) = tokio::try_join!(
            self.chain.latest_base_fee(),
            self.chain
                .fee_history(self.config.fee_history_blocks, vec![self.config.reward_percentile]),
        )
        .map_err(as_estimation_error)?;

        let mut rewards: Vec<U256> = history
            .reward
            .iter()
            .filter_map(|per_block| per_block.first().copied())
            .collect();

        let median = if rewards.is_empty() {
            self.config.min_priority_fee
        } else {
            rewards.sort();
            rewards[rewards.len() / 2]
        };

        // Priority fee is bounded before being folded into the max-fee
        // formula; the total is bounded last, so the configured ceiling
        // always wins over network conditions.
        let priority = mul_ceil(median, self.config.priority_fee_multiplier)
            .clamp(self.config.min_priority_fee, self.config.max_priority_fee);

        let headroom = U256::from(self.config.base_fee_multiplier.ceil() as u64);
        let max_fee = (base_fee * headroom + priority).min(self.config.max_total_fee);

        debug!(
            "Market fees: max_fee={} priority={} (base_fee={}, median reward={})",
            max_fee, priority, base_fee, median
        );

        Ok(GasPrice::Eip1559 {
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority,
        })
    }
}

/// Pick the pricing strategy matching the chain's capabilities
pub fn select_pricing(
    chain: Arc<dyn ChainClient>,
    supports_eip1559: bool,
    gas: &GasConfig,
) -> Box<dyn GasPricing> {
    if supports_eip1559 {
        Box::new(MarketPricing::new(chain, MarketPricingConfig::from(gas)))
    } else {
        Box::new(LegacyPricing::new(chain, gas.legacy_multiplier))
    }
}

/// Multiply by a non-negative float factor, rounding up to the nearest
/// integer unit
fn mul_ceil(value: U256, factor: f64) -> U256 {
    const SCALE: u64 = 1_000_000;
    let scaled = (factor * SCALE as f64).round() as u64;
    let numerator = value * U256::from(scaled);
    (numerator + U256::from(SCALE - 1)) / U256::from(SCALE)
}

fn as_estimation_error(err: RelayError) -> RelayError {
    if err.kind() == ErrorKind::GasEstimationFailed {
        err
    } else {
        let message = err.message().to_string();
        RelayError::wrap(ErrorKind::GasEstimationFailed, message, err.into())
    }
}
