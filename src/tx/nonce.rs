//! Nonce allocation for reliable transaction submission
//!
//! One allocator per (account, chain endpoint) pair. Incrementing a
//! cached value instead of re-querying per call lets several
//! transactions be issued back-to-back before the first confirms;
//! [`NonceAllocator::reset`] is the recovery path when a submission
//! fails after its nonce was consumed, so the next allocation
//! re-synchronizes with the chain instead of reusing a stale value.

use std::sync::Arc;

use ethers::types::Address;
use tokio::sync::Mutex;
use tracing::debug;

use crate::chain::ChainClient;
use crate::error::RelayResult;

/// Hands out monotonically increasing, gap-free nonces for one account
///
/// `None` in the slot means the next allocation must re-fetch the
/// on-chain transaction count. All state changes happen under the mutex,
/// so concurrent callers never observe the same value twice.
pub struct NonceAllocator {
    chain: Arc<dyn ChainClient>,
    address: Address,
    last_issued: Mutex<Option<u64>>,
}

impl NonceAllocator {
    pub fn new(chain: Arc<dyn ChainClient>, address: Address) -> Self {
        Self {
            chain,
            address,
            last_issued: Mutex::new(None),
        }
    }

    /// Allocate the next nonce
    ///
    /// Fetches the on-chain count when no value is cached, otherwise
    /// increments locally. The fetch happens inside the critical section
    /// so a racing caller cannot receive the same value.
    pub async fn next(&self) -> RelayResult<u64> {
        let mut slot = self.last_issued.lock().await;
        let nonce = match *slot {
            Some(last) => last + 1,
            None => self.chain.transaction_count(self.address).await?,
        };
        *slot = Some(nonce);
        debug!("Allocated nonce {} for {:?}", nonce, self.address);
        Ok(nonce)
    }

    /// Clear the cache, forcing the next allocation to re-fetch
    pub async fn reset(&self) {
        let mut slot = self.last_issued.lock().await;
        *slot = None;
        debug!("Nonce allocator reset for {:?}", self.address);
    }

    /// Currently cached last-issued nonce, if any
    pub async fn cached(&self) -> Option<u64> {
        *self.last_issued.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use crate::error::{ErrorKind, RelayError};
    use std::collections::HashSet;

    fn allocator_with_count(count: u64) -> NonceAllocator {
        let mut chain = MockChainClient::new();
        chain
            .expect_transaction_count()
            .returning(move |_| Ok(count));
        NonceAllocator::new(Arc::new(chain), Address::zero())
    }

    #[tokio::test]
    async fn first_allocation_fetches_on_chain_count() {
        let allocator = allocator_with_count(7);
        assert_eq!(allocator.next().await.unwrap(), 7);
        assert_eq!(allocator.next().await.unwrap(), 8);
        assert_eq!(allocator.next().await.unwrap(), 9);
    }

    #[tokio::test]
    async fn fetch_happens_exactly_once_until_reset() {
        let mut chain = MockChainClient::new();
        chain
            .expect_transaction_count()
            .times(1)
            .returning(|_| Ok(3));
        let allocator = NonceAllocator::new(Arc::new(chain), Address::zero());

        for expected in 3..8 {
            assert_eq!(allocator.next().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn reset_forces_refetch() {
        let mut chain = MockChainClient::new();
        let mut counts = vec![5u64, 20u64];
        chain
            .expect_transaction_count()
            .times(2)
            .returning(move |_| Ok(counts.remove(0)));
        let allocator = NonceAllocator::new(Arc::new(chain), Address::zero());

        assert_eq!(allocator.next().await.unwrap(), 5);
        assert_eq!(allocator.next().await.unwrap(), 6);

        allocator.reset().await;
        assert_eq!(allocator.cached().await, None);

        // The stale cached value is never reused after a reset.
        assert_eq!(allocator.next().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_cache_unset() {
        let mut chain = MockChainClient::new();
        chain
            .expect_transaction_count()
            .returning(|_| Err(RelayError::nonce("rpc unreachable")));
        let allocator = NonceAllocator::new(Arc::new(chain), Address::zero());

        let err = allocator.next().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonceError);
        assert_eq!(allocator.cached().await, None);
    }

    #[tokio::test]
    async fn concurrent_allocations_are_gap_free() {
        const N: usize = 32;
        const BASE: u64 = 100;

        let mut chain = MockChainClient::new();
        chain
            .expect_transaction_count()
            .times(1)
            .returning(|_| Ok(BASE));
        let allocator = Arc::new(NonceAllocator::new(Arc::new(chain), Address::zero()));

        let mut handles = Vec::new();
        for _ in 0..N {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move { allocator.next().await.unwrap() }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            assert!(seen.insert(handle.await.unwrap()), "duplicate nonce issued");
        }

        let expected: HashSet<u64> = (BASE..BASE + N as u64).collect();
        assert_eq!(seen, expected);
    }
}
