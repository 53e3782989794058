//! Lifecycle hook dispatch
//!
//! Callers can observe a submission at five points: before-send,
//! broadcast, confirmed, after-complete and on-error. Every slot is
//! independently optional and an absent slot resolves immediately. Hook
//! failures are caller failures: the dispatcher returns them untouched
//! and the orchestrator surfaces them unclassified.

use std::future::Future;

use ethers::types::{TransactionReceipt, H256};
use futures::future::BoxFuture;
use futures::FutureExt;

use super::sender::TransactionRequest;
use crate::error::RelayError;

type HookFn<T> = Box<dyn Fn(T) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Optional set of submission lifecycle callbacks
#[derive(Default)]
pub struct LifecycleHooks {
    before_send: Option<HookFn<TransactionRequest>>,
    broadcast: Option<HookFn<H256>>,
    confirmed: Option<HookFn<TransactionReceipt>>,
    after_complete: Option<HookFn<TransactionReceipt>>,
    on_error: Option<HookFn<RelayError>>,
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called just before a nonce is allocated
    pub fn on_before_send<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(TransactionRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.before_send = Some(Box::new(move |req| f(req).boxed()));
        self
    }

    /// Called with the transaction hash right after broadcast
    pub fn on_broadcast<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(H256) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.broadcast = Some(Box::new(move |hash| f(hash).boxed()));
        self
    }

    /// Called when the receipt reports a successful status
    pub fn on_confirmed<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(TransactionReceipt) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.confirmed = Some(Box::new(move |receipt| f(receipt).boxed()));
        self
    }

    /// Called on any terminal receipt, successful or not
    pub fn on_after_complete<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(TransactionReceipt) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.after_complete = Some(Box::new(move |receipt| f(receipt).boxed()));
        self
    }

    /// Called last when the submission fails with a classified error
    pub fn on_error<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RelayError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_error = Some(Box::new(move |err| f(err).boxed()));
        self
    }

    pub(crate) async fn dispatch_before_send(
        &self,
        req: &TransactionRequest,
    ) -> anyhow::Result<()> {
        match &self.before_send {
            Some(hook) => hook(req.clone()).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn dispatch_broadcast(&self, hash: H256) -> anyhow::Result<()> {
        match &self.broadcast {
            Some(hook) => hook(hash).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn dispatch_confirmed(
        &self,
        receipt: &TransactionReceipt,
    ) -> anyhow::Result<()> {
        match &self.confirmed {
            Some(hook) => hook(receipt.clone()).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn dispatch_after_complete(
        &self,
        receipt: &TransactionReceipt,
    ) -> anyhow::Result<()> {
        match &self.after_complete {
            Some(hook) => hook(receipt.clone()).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn dispatch_error(&self, error: &RelayError) -> anyhow::Result<()> {
        match &self.on_error {
            Some(hook) => hook(error.clone()).await,
            None => Ok(()),
        }
    }
}
