//! Transaction submission: orchestrator plus its policy engines

pub mod gas;
pub mod hooks;
pub mod nonce;
pub mod preflight;
pub mod retry;
pub mod sender;

pub use gas::{select_pricing, GasPrice, GasPricing, LegacyPricing, MarketPricing, MarketPricingConfig};
pub use hooks::LifecycleHooks;
pub use nonce::NonceAllocator;
pub use preflight::check_balance;
pub use retry::{with_retry, ExponentialBackoff, RetryPolicy};
pub use sender::{TransactionRequest, TransactionSender};
