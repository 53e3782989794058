//! Transaction relay core for EVM chains
//!
//! Relays signed transactions on behalf of a caller, handling the
//! operational concerns a raw RPC client does not:
//! - safe nonce allocation under concurrent callers
//! - gas-price strategy selection (legacy vs. fee-market pricing)
//! - balance preflight checks before broadcast
//! - confirmation waiting with classified errors and retry with backoff
//!
//! The entry point is [`TransactionSender`]: construct one per
//! (account, chain endpoint) pair with a [`config::Settings`], a signing
//! wallet and a [`chain::ChainClient`], then drive it with
//! [`TransactionSender::send_transaction`]. Pricing, retry and lifecycle
//! hooks are all independently replaceable via `with_*` builders.
//!
//! Lifecycle hooks are trusted caller code: a fault raised inside one
//! surfaces as [`SendError::Hook`] without classification, even when the
//! transaction itself was mined. See [`SendError`] for details.

pub mod chain;
pub mod config;
pub mod error;
pub mod metrics;
pub mod tx;

pub use chain::{ChainClient, FeeHistory, RpcClient};
pub use config::Settings;
pub use error::{ErrorKind, RelayError, RelayResult, SendError};
pub use tx::{
    ExponentialBackoff, GasPrice, GasPricing, LifecycleHooks, NonceAllocator, RetryPolicy,
    TransactionRequest, TransactionSender,
};
