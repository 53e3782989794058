//! Balance preflight check
//!
//! Verifies the account can afford a transaction before it is broadcast,
//! so a doomed submission never consumes a nonce.

use anyhow::anyhow;
use ethers::types::{Address, U256};
use tracing::debug;

use crate::chain::ChainClient;
use crate::error::{RelayError, RelayResult};

/// Fail unless the account balance covers the threshold
///
/// The threshold is `min_balance` when supplied, otherwise the required
/// amount itself. A balance exactly equal to the threshold passes. The
/// failure is routed through the classifier so it carries the
/// insufficient-funds kind.
pub async fn check_balance(
    chain: &dyn ChainClient,
    address: Address,
    required: U256,
    min_balance: Option<U256>,
) -> RelayResult<()> {
    let balance = chain.balance(address).await?;
    let threshold = min_balance.unwrap_or(required);

    if balance < threshold {
        return Err(RelayError::classify(anyhow!(
            "Insufficient balance: have {balance}, need {threshold}"
        )));
    }

    debug!("Preflight passed: balance {} covers {}", balance, threshold);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use crate::error::ErrorKind;

    fn chain_with_balance(balance: u64) -> MockChainClient {
        let mut chain = MockChainClient::new();
        chain
            .expect_balance()
            .returning(move |_| Ok(U256::from(balance)));
        chain
    }

    #[tokio::test]
    async fn exact_balance_passes() {
        let chain = chain_with_balance(100);
        let result = check_balance(&chain, Address::zero(), U256::from(100), None).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn short_balance_fails_with_funds_kind() {
        let chain = chain_with_balance(99);
        let err = check_balance(&chain, Address::zero(), U256::from(100), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert!(err.message().contains("Insufficient balance"));
    }

    #[tokio::test]
    async fn override_replaces_required_amount() {
        let chain = chain_with_balance(100);

        // Required alone would pass, the override raises the bar.
        let err = check_balance(
            &chain,
            Address::zero(),
            U256::from(50),
            Some(U256::from(150)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);

        let chain = chain_with_balance(100);
        let result = check_balance(
            &chain,
            Address::zero(),
            U256::from(500),
            Some(U256::from(100)),
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn query_fault_is_classified() {
        let mut chain = MockChainClient::new();
        chain.expect_balance().returning(|_| {
            Err(RelayError::classify(anyhow!("connection refused")))
        });

        let err = check_balance(&chain, Address::zero(), U256::from(1), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemporaryFailure);
    }
}
