pub mod signing;

use std::{pin::Pin, str::FromStr};

use alloy_consensus::TxEnvelope;
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, TxHash};
use alloy_provider::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy_rpc_types_eth::{Filter, Log};
use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::error::EvmClientError;

pub type LogStream = Pin<Box<dyn Stream<Item = Log> + Send>>;

/// The minimal view of a ledger node that outgoing transactions need
/// nothing here is cached, every call goes to the node
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64, EvmClientError>;

    /// The nonce the next transaction from `address` must use, including pending transactions
    async fn pending_nonce(&self, address: Address) -> Result<u64, EvmClientError>;

    /// Broadcasts a signed transaction, there is no retry
    async fn submit(&self, tx: TxEnvelope) -> Result<TxHash, EvmClientError>;
}

#[derive(Debug, Clone)]
pub enum EvmEndpoint {
    WebSocket(url::Url),
    Http(url::Url),
}

impl FromStr for EvmEndpoint {
    type Err = EvmClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // a bare "host:port" is treated as a websocket endpoint
        // note that "localhost:8545" parses as a url with the scheme "localhost"
        let s = if s.contains("://") {
            s.to_string()
        } else {
            format!("ws://{s}")
        };

        let url = url::Url::parse(&s).map_err(|e| EvmClientError::ParseEndpoint(e.to_string()))?;
        match url.scheme() {
            "ws" | "wss" => Ok(EvmEndpoint::WebSocket(url)),
            "http" | "https" => Ok(EvmEndpoint::Http(url)),
            scheme => Err(EvmClientError::ParseEndpoint(format!(
                "could not determine endpoint from scheme {scheme} (full url: {s})"
            ))),
        }
    }
}

impl std::fmt::Display for EvmEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvmEndpoint::WebSocket(url) => write!(f, "{}", url),
            EvmEndpoint::Http(url) => write!(f, "{}", url),
        }
    }
}

impl EvmEndpoint {
    pub fn supports_subscriptions(&self) -> bool {
        matches!(self, EvmEndpoint::WebSocket(_))
    }

    pub async fn to_provider(&self) -> Result<DynProvider, EvmClientError> {
        Ok(match self {
            EvmEndpoint::WebSocket(url) => {
                let ws = WsConnect::new(url.clone());
                DynProvider::new(
                    ProviderBuilder::new()
                        .connect_ws(ws)
                        .await
                        .map_err(|e| EvmClientError::WebSocketProvider(e.into()))?,
                )
            }
            EvmEndpoint::Http(url) => {
                DynProvider::new(ProviderBuilder::new().connect_http(url.clone()))
            }
        })
    }
}

/// A plain provider handle, transactions are signed locally before they reach it
#[derive(Clone)]
pub struct EvmClient {
    pub endpoint: EvmEndpoint,
    pub provider: DynProvider,
}

impl EvmClient {
    pub async fn new(endpoint: EvmEndpoint) -> Result<Self, EvmClientError> {
        Ok(EvmClient {
            provider: endpoint.to_provider().await?,
            endpoint,
        })
    }

    pub async fn subscribe_logs(&self, filter: &Filter) -> Result<LogStream, EvmClientError> {
        let subscription = self
            .provider
            .subscribe_logs(filter)
            .await
            .map_err(|e| EvmClientError::SubscribeLogs(e.into()))?;

        Ok(subscription.into_stream().boxed())
    }
}

impl std::fmt::Debug for EvmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmClient")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl ChainClient for EvmClient {
    async fn chain_id(&self) -> Result<u64, EvmClientError> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| EvmClientError::ChainId(e.into()))
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, EvmClientError> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(|e| EvmClientError::PendingNonce(address, e.into()))
    }

    async fn submit(&self, tx: TxEnvelope) -> Result<TxHash, EvmClientError> {
        let pending = self
            .provider
            .send_raw_transaction(&tx.encoded_2718())
            .await
            .map_err(|e| EvmClientError::SendTransaction(e.into()))?;

        Ok(*pending.tx_hash())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_endpoint() {
        let endpoint = EvmEndpoint::from_str("ws://localhost:8545").unwrap();
        assert!(matches!(endpoint, EvmEndpoint::WebSocket(_)));

        let endpoint = EvmEndpoint::from_str("http://localhost:8545").unwrap();
        assert!(matches!(endpoint, EvmEndpoint::Http(_)));

        let endpoint = EvmEndpoint::from_str("https://localhost:8545").unwrap();
        assert!(matches!(endpoint, EvmEndpoint::Http(_)));

        let endpoint = EvmEndpoint::from_str("wss://localhost:8545").unwrap();
        assert!(matches!(endpoint, EvmEndpoint::WebSocket(_)));

        let endpoint = EvmEndpoint::from_str("ftp://localhost:8545").unwrap_err();
        assert!(matches!(endpoint, EvmClientError::ParseEndpoint(_)));
    }

    #[test]
    fn bare_host_defaults_to_websocket() {
        let endpoint = EvmEndpoint::from_str("127.0.0.1:8546").unwrap();
        assert!(endpoint.supports_subscriptions());
        assert_eq!(endpoint.to_string(), "ws://127.0.0.1:8546/");
    }
}
