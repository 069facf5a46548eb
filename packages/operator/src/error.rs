use std::time::Duration;

use alloy_primitives::Address;
use alloy_signer::k256::ecdsa;
use thiserror::Error;
use utils::error::EvmClientError;

/// Anything that stops the operator process
#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("connection: {0}")]
    Connection(#[from] EvmClientError),

    #[error("registration: {0}")]
    Registration(#[from] RegistrationError),

    #[error("subscription: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("response to task {index} ({name}): {source}")]
    Response {
        index: u32,
        name: String,
        source: ResponseError,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("credential: {0}")]
    Credential(EvmClientError),
}

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("pending nonce lookup: {0}")]
    Nonce(EvmClientError),

    #[error("stale nonce for {address}: node reports {pending}, last submitted was {last_submitted}")]
    StaleNonce {
        address: Address,
        pending: u64,
        last_submitted: u64,
    },

    #[error("sign transaction: {0}")]
    Sign(anyhow::Error),
}

#[derive(Error, Debug)]
pub enum SigningError {
    #[error("ecdsa: {0}")]
    Ecdsa(ecdsa::Error),

    #[error("malformed signature: {0}")]
    Malformed(ecdsa::Error),

    #[error("signature does not verify: {0}")]
    Verification(ecdsa::Error),
}

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("node rejected transaction with nonce {nonce}: {source}")]
    Rejected { nonce: u64, source: EvmClientError },
}

/// A failed attempt at answering a single task
#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("transaction: {0}")]
    Transaction(#[from] TransactionError),

    #[error("signing: {0}")]
    Signing(#[from] SigningError),

    #[error("submission: {0}")]
    Submission(#[from] SubmissionError),

    /// Building or signing ran past the attempt deadline, nothing was sent
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The transaction was handed to the node but no answer came back in time
    #[error("no reply from the node within {after:?} for transaction with nonce {nonce}, it may still be mined")]
    Unconfirmed { nonce: u64, after: Duration },
}

impl ResponseError {
    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseError::Transaction(_) => "transaction",
            ResponseError::Signing(_) => "signing",
            ResponseError::Submission(_) => "submission",
            ResponseError::Timeout(_) => "timeout",
            ResponseError::Unconfirmed { .. } => "unconfirmed",
        }
    }

    /// Whether another attempt for the same task could succeed
    pub fn is_retryable(&self) -> bool {
        // a transaction that can't be signed now won't be signable later either
        // and one the node may already hold must not be sent a second time
        !matches!(
            self,
            ResponseError::Transaction(TransactionError::Sign(_))
                | ResponseError::Unconfirmed { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("transaction: {0}")]
    Transaction(#[from] TransactionError),

    #[error("submission: {0}")]
    Submission(#[from] SubmissionError),
}

#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("subscribe to task events: {0}")]
    Subscribe(EvmClientError),

    #[error("endpoint {0} does not support log subscriptions")]
    Unsupported(String),

    #[error("decode task event at block {block_number}, log {log_index}: {reason}")]
    Decode {
        block_number: u64,
        log_index: u64,
        reason: String,
    },

    #[error("task event feed closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum TaskCreationError {
    #[error("transaction: {0}")]
    Transaction(#[from] TransactionError),

    #[error("submission: {0}")]
    Submission(#[from] SubmissionError),
}
