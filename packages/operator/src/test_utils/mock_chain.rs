use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy_consensus::{transaction::SignerRecoverable, Transaction as _, TxEnvelope};
use alloy_primitives::{Address, TxHash};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use utils::{error::EvmClientError, evm_client::ChainClient};

use crate::bindings::respondToTaskCall;

/// The first anvil development key, handy when any signer will do
pub const TEST_PRIVATE_KEY: &str =
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub fn test_signer() -> PrivateKeySigner {
    TEST_PRIVATE_KEY.parse().unwrap()
}

#[derive(Default)]
struct MockChainState {
    chain_id: u64,
    nonces: HashMap<Address, u64>,
    submitted: Vec<TxEnvelope>,
    fail_chain_id: bool,
    fail_nonce_lookups: usize,
    fail_submissions: usize,
    submit_delay: Option<Duration>,
    reply_delay: Option<Duration>,
    submit_attempts: usize,
}

/// An in-memory node: accepted transactions bump the sender's pending nonce
#[derive(Clone, Default)]
pub struct MockChainClient {
    state: Arc<Mutex<MockChainState>>,
}

impl MockChainClient {
    pub fn new(chain_id: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockChainState {
                chain_id,
                ..Default::default()
            })),
        }
    }

    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.state.lock().unwrap().nonces.insert(address, nonce);
    }

    pub fn fail_chain_id(&self) {
        self.state.lock().unwrap().fail_chain_id = true;
    }

    pub fn fail_next_nonce_lookups(&self, n: usize) {
        self.state.lock().unwrap().fail_nonce_lookups = n;
    }

    pub fn fail_next_submissions(&self, n: usize) {
        self.state.lock().unwrap().fail_submissions = n;
    }

    /// Every submission sleeps this long before it is accepted
    pub fn delay_submissions(&self, delay: Option<Duration>) {
        self.state.lock().unwrap().submit_delay = delay;
    }

    /// Every accepted submission waits this long before the hash is returned
    pub fn delay_replies(&self, delay: Option<Duration>) {
        self.state.lock().unwrap().reply_delay = delay;
    }

    /// Accepted transactions, in submission order
    pub fn submitted(&self) -> Vec<TxEnvelope> {
        self.state.lock().unwrap().submitted.clone()
    }

    /// Every call to `submit`, including rejected and timed out ones
    pub fn submit_attempts(&self) -> usize {
        self.state.lock().unwrap().submit_attempts
    }

    /// The `respondToTask` calls carried by accepted transactions
    pub fn responses(&self) -> Vec<respondToTaskCall> {
        self.submitted()
            .iter()
            .filter_map(|tx| respondToTaskCall::abi_decode(tx.input()).ok())
            .collect()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn chain_id(&self) -> Result<u64, EvmClientError> {
        let state = self.state.lock().unwrap();
        if state.fail_chain_id {
            return Err(EvmClientError::ChainId(anyhow::anyhow!("mock chain id failure")));
        }
        Ok(state.chain_id)
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, EvmClientError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_nonce_lookups > 0 {
            state.fail_nonce_lookups -= 1;
            return Err(EvmClientError::PendingNonce(
                address,
                anyhow::anyhow!("mock nonce failure"),
            ));
        }
        Ok(state.nonces.get(&address).copied().unwrap_or_default())
    }

    async fn submit(&self, tx: TxEnvelope) -> Result<TxHash, EvmClientError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.submit_attempts += 1;
            if state.fail_submissions > 0 {
                state.fail_submissions -= 1;
                return Err(EvmClientError::SendTransaction(anyhow::anyhow!(
                    "mock submission failure"
                )));
            }
            state.submit_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let sender = tx
            .recover_signer()
            .map_err(|e| EvmClientError::SendTransaction(e.into()))?;

        let (hash, reply_delay) = {
            let mut state = self.state.lock().unwrap();
            let expected = state.nonces.get(&sender).copied().unwrap_or_default();
            if tx.nonce() != expected {
                return Err(EvmClientError::SendTransaction(anyhow::anyhow!(
                    "nonce too low or too high: expected {expected}, got {}",
                    tx.nonce()
                )));
            }

            state.nonces.insert(sender, expected + 1);
            let hash = *tx.tx_hash();
            state.submitted.push(tx);
            (hash, state.reply_delay)
        };

        // already accepted, dropping this future no longer undoes anything
        if let Some(delay) = reply_delay {
            tokio::time::sleep(delay).await;
        }

        Ok(hash)
    }
}
