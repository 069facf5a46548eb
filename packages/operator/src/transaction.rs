use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use alloy_consensus::TxEnvelope;
use alloy_network::{Ethereum, EthereumWallet, TransactionBuilder as _};
use alloy_primitives::{Address, TxHash, U256};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use tracing::instrument;
use utils::{error::EvmClientError, evm_client::ChainClient};

use crate::error::{SubmissionError, TransactionError};

/// Everything needed to sign one transaction
/// the nonce is spent by at most one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOptions {
    pub from: Address,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub value: U256,
    pub chain_id: u64,
}

/// Builds, signs and submits legacy EIP-155 transactions with fixed gas settings
///
/// Builders made with [`TransactionBuilder::with_gas_price`] share the record of
/// submitted nonces, so the guard against reusing a nonce holds across all of them.
#[derive(Clone)]
pub struct TransactionBuilder {
    client: Arc<dyn ChainClient>,
    chain_id: u64,
    gas_limit: u64,
    gas_price: u128,
    last_submitted: Arc<Mutex<HashMap<Address, u64>>>,
}

impl TransactionBuilder {
    /// Looks the chain id up once, it's fixed for the lifetime of the builder
    pub async fn connect(
        client: Arc<dyn ChainClient>,
        gas_limit: u64,
        gas_price: u128,
    ) -> Result<Self, EvmClientError> {
        let chain_id = client.chain_id().await?;
        tracing::debug!(chain_id, gas_limit, gas_price, "transaction builder connected");

        Ok(Self {
            client,
            chain_id,
            gas_limit,
            gas_price,
            last_submitted: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn with_gas_price(&self, gas_price: u128) -> Self {
        Self {
            gas_price,
            ..self.clone()
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn gas_price(&self) -> u128 {
        self.gas_price
    }

    pub fn last_submitted_nonce(&self, address: Address) -> Option<u64> {
        self.ledger().get(&address).copied()
    }

    // entries are only ever raised to a larger nonce, so a poisoned ledger is still valid
    fn ledger(&self) -> MutexGuard<'_, HashMap<Address, u64>> {
        self.last_submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[instrument(level = "debug", skip_all, fields(from = %signer.address()))]
    pub async fn build(&self, signer: &PrivateKeySigner) -> Result<TransactionOptions, TransactionError> {
        let from = signer.address();
        let nonce = self
            .client
            .pending_nonce(from)
            .await
            .map_err(TransactionError::Nonce)?;

        if let Some(last_submitted) = self.last_submitted_nonce(from) {
            if nonce <= last_submitted {
                return Err(TransactionError::StaleNonce {
                    address: from,
                    pending: nonce,
                    last_submitted,
                });
            }
        }

        Ok(TransactionOptions {
            from,
            nonce,
            gas_limit: self.gas_limit,
            gas_price: self.gas_price,
            value: U256::ZERO,
            chain_id: self.chain_id,
        })
    }

    pub async fn sign<C: SolCall>(
        &self,
        signer: &PrivateKeySigner,
        opts: &TransactionOptions,
        to: Address,
        call: &C,
    ) -> Result<TxEnvelope, TransactionError> {
        let request = TransactionRequest::default()
            .with_from(opts.from)
            .with_to(to)
            .with_nonce(opts.nonce)
            .with_gas_limit(opts.gas_limit)
            .with_gas_price(opts.gas_price)
            .with_value(opts.value)
            .with_chain_id(opts.chain_id)
            .with_input(call.abi_encode());

        let wallet = EthereumWallet::from(signer.clone());

        <TransactionRequest as alloy_network::TransactionBuilder<Ethereum>>::build(request, &wallet)
            .await
            .map_err(|e| TransactionError::Sign(anyhow::anyhow!("{e}")))
    }

    /// On success the nonce is recorded as the sender's latest
    #[instrument(level = "debug", skip_all, fields(from = %opts.from, nonce = opts.nonce))]
    pub async fn submit(
        &self,
        tx: TxEnvelope,
        opts: &TransactionOptions,
    ) -> Result<TxHash, SubmissionError> {
        let tx_hash = self
            .client
            .submit(tx)
            .await
            .map_err(|source| SubmissionError::Rejected {
                nonce: opts.nonce,
                source,
            })?;

        let mut last_submitted = self.ledger();
        let entry = last_submitted.entry(opts.from).or_insert(opts.nonce);
        *entry = (*entry).max(opts.nonce);

        Ok(tx_hash)
    }
}

impl std::fmt::Debug for TransactionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionBuilder")
            .field("chain_id", &self.chain_id)
            .field("gas_limit", &self.gas_limit)
            .field("gas_price", &self.gas_price)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use alloy_consensus::Transaction as _;
    use alloy_primitives::address;

    use super::*;
    use crate::{
        bindings::createNewTaskCall,
        test_utils::mock_chain::{test_signer, MockChainClient},
    };

    const TARGET: Address = address!("0x0000000000000000000000000000000000000042");

    async fn builder(mock: &MockChainClient) -> TransactionBuilder {
        TransactionBuilder::connect(Arc::new(mock.clone()), 1_000_000, 7)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn build_uses_pending_nonce_and_fixed_gas() {
        let mock = MockChainClient::new(31337);
        let signer = test_signer();
        mock.set_nonce(signer.address(), 4);

        let opts = builder(&mock).await.build(&signer).await.unwrap();

        assert_eq!(
            opts,
            TransactionOptions {
                from: signer.address(),
                nonce: 4,
                gas_limit: 1_000_000,
                gas_price: 7,
                value: U256::ZERO,
                chain_id: 31337,
            }
        );
    }

    #[tokio::test]
    async fn signed_transaction_carries_options() {
        let mock = MockChainClient::new(17000);
        let signer = test_signer();
        let builder = builder(&mock).await;

        let opts = builder.build(&signer).await.unwrap();
        let call = createNewTaskCall {
            name: "Foo".to_string(),
        };
        let tx = builder.sign(&signer, &opts, TARGET, &call).await.unwrap();

        assert!(tx.is_legacy());
        assert_eq!(tx.nonce(), opts.nonce);
        assert_eq!(tx.gas_limit(), 1_000_000);
        assert_eq!(tx.gas_price(), Some(7));
        assert_eq!(tx.chain_id(), Some(17000));
        assert_eq!(tx.to(), Some(TARGET));
        assert_eq!(tx.value(), U256::ZERO);
        assert_eq!(tx.input().as_ref(), call.abi_encode().as_slice());
    }

    #[tokio::test]
    async fn nonces_increase_across_submissions() {
        let mock = MockChainClient::new(1);
        let signer = test_signer();
        let builder = builder(&mock).await;
        let call = createNewTaskCall {
            name: "Foo".to_string(),
        };

        let mut nonces = Vec::new();
        for _ in 0..3 {
            let opts = builder.build(&signer).await.unwrap();
            let tx = builder.sign(&signer, &opts, TARGET, &call).await.unwrap();
            builder.submit(tx, &opts).await.unwrap();
            nonces.push(opts.nonce);
        }

        assert_eq!(nonces, vec![0, 1, 2]);
        assert_eq!(builder.last_submitted_nonce(signer.address()), Some(2));
    }

    #[tokio::test]
    async fn stale_pending_nonce_is_rejected() {
        let mock = MockChainClient::new(1);
        let signer = test_signer();
        let builder = builder(&mock).await;
        let call = createNewTaskCall {
            name: "Foo".to_string(),
        };

        let opts = builder.build(&signer).await.unwrap();
        let tx = builder.sign(&signer, &opts, TARGET, &call).await.unwrap();
        builder.submit(tx, &opts).await.unwrap();

        // the node forgets about the pending transaction
        mock.set_nonce(signer.address(), opts.nonce);

        // builders with a different gas price share the same record
        let registration = builder.with_gas_price(21000);
        assert!(matches!(
            registration.build(&signer).await,
            Err(TransactionError::StaleNonce {
                pending: 0,
                last_submitted: 0,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn failed_submission_does_not_record_nonce() {
        let mock = MockChainClient::new(1);
        let signer = test_signer();
        let builder = builder(&mock).await;
        let call = createNewTaskCall {
            name: "Foo".to_string(),
        };

        mock.fail_next_submissions(1);
        let opts = builder.build(&signer).await.unwrap();
        let tx = builder.sign(&signer, &opts, TARGET, &call).await.unwrap();

        assert!(matches!(
            builder.submit(tx, &opts).await,
            Err(SubmissionError::Rejected { nonce: 0, .. })
        ));
        assert_eq!(builder.last_submitted_nonce(signer.address()), None);
        assert!(mock.submitted().is_empty());
    }

    #[tokio::test]
    async fn poisoned_ledger_keeps_guarding_nonces() {
        let mock = MockChainClient::new(1);
        let signer = test_signer();
        let builder = builder(&mock).await;
        let call = createNewTaskCall {
            name: "Foo".to_string(),
        };

        let opts = builder.build(&signer).await.unwrap();
        let tx = builder.sign(&signer, &opts, TARGET, &call).await.unwrap();
        builder.submit(tx, &opts).await.unwrap();

        let ledger = builder.last_submitted.clone();
        let _ = std::thread::spawn(move || {
            let _guard = ledger.lock().unwrap();
            panic!("panicked while holding the nonce ledger");
        })
        .join();
        assert!(builder.last_submitted.is_poisoned());

        assert_eq!(builder.last_submitted_nonce(signer.address()), Some(0));

        let opts = builder.build(&signer).await.unwrap();
        assert_eq!(opts.nonce, 1);
        let tx = builder.sign(&signer, &opts, TARGET, &call).await.unwrap();
        builder.submit(tx, &opts).await.unwrap();
        assert_eq!(builder.last_submitted_nonce(signer.address()), Some(1));

        mock.set_nonce(signer.address(), 1);
        assert!(matches!(
            builder.build(&signer).await,
            Err(TransactionError::StaleNonce { pending: 1, .. })
        ));
    }
}
