use alloy_primitives::Address;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvmClientError {
    #[error("HD index must be zero when using a private key (use mnemonic instead)")]
    DerivationWithPrivateKey,

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(anyhow::Error),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(anyhow::Error),

    #[error("Unable to parse endpoint: {0}")]
    ParseEndpoint(String),

    #[error("Unable to create web socket provider: {0:#?}")]
    WebSocketProvider(anyhow::Error),

    #[error("Unable to get chain id: {0}")]
    ChainId(anyhow::Error),

    #[error("Unable to get pending nonce for {0}: {1}")]
    PendingNonce(Address, anyhow::Error),

    #[error("Send Transaction Error: {0}")]
    SendTransaction(anyhow::Error),

    #[error("Unable to subscribe to logs: {0}")]
    SubscribeLogs(anyhow::Error),
}
