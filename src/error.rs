//! Error taxonomy and classification for the relay core
//!
//! Every fallible operation in the crate returns a [`RelayResult`]; raw
//! provider and transport failures are funneled through
//! [`RelayError::classify`] so retry decisions can be made on the
//! [`ErrorKind`] alone.

use std::sync::Arc;

use thiserror::Error;

/// Closed set of failure categories used to drive retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transaction was mined but reverted, or broadcast was rejected
    TransactionFailed,
    /// Gas estimation or fee computation failed
    GasEstimationFailed,
    /// Nonce fetch or allocation failed
    NonceError,
    /// Account cannot cover value plus gas
    InsufficientFunds,
    /// Signature or sender rejected by the node
    InvalidSignature,
    /// Execution reverted for a non-transient reason
    PermanentRevert,
    /// Transient fault: network, rate limit, unknown
    TemporaryFailure,
    /// An operation exceeded its deadline
    Timeout,
}

impl ErrorKind {
    /// Kinds that no amount of retrying can fix
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ErrorKind::InsufficientFunds | ErrorKind::InvalidSignature | ErrorKind::PermanentRevert
        )
    }

    /// Stable label for logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::TransactionFailed => "transaction_failed",
            ErrorKind::GasEstimationFailed => "gas_estimation_failed",
            ErrorKind::NonceError => "nonce_error",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::InvalidSignature => "invalid_signature",
            ErrorKind::PermanentRevert => "permanent_revert",
            ErrorKind::TemporaryFailure => "temporary_failure",
            ErrorKind::Timeout => "timeout",
        }
    }
}

/// A classified relay failure
///
/// Carries the [`ErrorKind`] used for retry decisions, a human-readable
/// message, and (when classified from a raw fault) the originating error
/// for diagnostics. The cause is behind an `Arc` so the error stays
/// `Clone` and can be handed to the on-error hook by value.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RelayError {
    kind: ErrorKind,
    message: String,
    cause: Option<Arc<anyhow::Error>>,
}

/// Result type used by every fallible relay operation
pub type RelayResult<T> = Result<T, RelayError>;

// Substring tables for classification, checked in priority order.
// Matching is case-insensitive; first match wins.
const FUNDS_PATTERNS: &[&str] = &["balance", "funds"];
const SIGNATURE_PATTERNS: &[&str] = &["signature", "sender"];
const REVERT_PATTERNS: &[&str] = &["opcode", "revert", "unauthorized"];
const TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "network",
    "connection",
    "rate limit",
    "nonce too low",
];

impl RelayError {
    /// Construct an error with an explicit kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// Construct an error with an explicit kind, keeping the cause
    pub fn wrap(kind: ErrorKind, message: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransactionFailed, message)
    }

    pub fn gas_estimation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::GasEstimationFailed, message)
    }

    pub fn nonce(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NonceError, message)
    }

    pub fn timeout(operation: &str) -> Self {
        Self::new(ErrorKind::Timeout, format!("Timeout waiting for {operation}"))
    }

    /// Classify an arbitrary failure into a [`RelayError`]
    ///
    /// Idempotent: an error that already carries a classification is
    /// returned unchanged. Everything else is matched against the
    /// substring tables above; unmatched faults default to
    /// [`ErrorKind::TemporaryFailure`] so unknown conditions are retried
    /// up to the attempt ceiling rather than failed outright.
    pub fn classify(err: anyhow::Error) -> Self {
        if let Some(classified) = err.downcast_ref::<RelayError>() {
            return classified.clone();
        }

        // Alternate formatting includes the whole cause chain.
        let text = format!("{err:#}").to_lowercase();
        let kind = if matches_any(&text, FUNDS_PATTERNS) {
            ErrorKind::InsufficientFunds
        } else if matches_any(&text, SIGNATURE_PATTERNS) {
            ErrorKind::InvalidSignature
        } else if matches_any(&text, REVERT_PATTERNS) {
            ErrorKind::PermanentRevert
        } else if matches_any(&text, TRANSIENT_PATTERNS) {
            ErrorKind::TemporaryFailure
        } else {
            // Unmatched faults are treated as transient; the retry
            // attempt ceiling bounds the cost of being wrong.
            ErrorKind::TemporaryFailure
        };

        Self {
            kind,
            message: format!("{err:#}"),
            cause: Some(Arc::new(err)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Originating failure, when this error was classified from one
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_deref()
    }

    /// Whether retrying can possibly succeed
    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

fn matches_any(text: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| text.contains(p))
}

/// Failure surface of [`crate::tx::TransactionSender::send_transaction`]
///
/// Hook callbacks are trusted caller code, not relay internals: a fault
/// raised inside one propagates as [`SendError::Hook`] without being
/// classified, without resetting the nonce allocator and without firing
/// the on-error hook. A broken after-complete hook can therefore surface
/// as a raw fault even though the transaction itself was mined.
#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Classified(#[from] RelayError),

    #[error("lifecycle hook failed: {0:#}")]
    Hook(anyhow::Error),
}

impl SendError {
    /// The classified error, if this failure came from the relay itself
    pub fn as_classified(&self) -> Option<&RelayError> {
        match self {
            SendError::Classified(e) => Some(e),
            SendError::Hook(_) => None,
        }
    }
}
