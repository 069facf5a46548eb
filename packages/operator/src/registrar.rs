use alloy_primitives::{Address, TxHash};
use alloy_signer_local::PrivateKeySigner;
use tracing::instrument;

use crate::{
    bindings::{registerAsOperatorCall, OperatorDetails},
    error::RegistrationError,
    transaction::TransactionBuilder,
};

/// The gas price the registration transaction is sent with unless configured otherwise
pub const DEFAULT_REGISTRATION_GAS_PRICE: u128 = 21000;

/// Registers the operator with the delegation manager
#[derive(Debug, Clone)]
pub struct OperatorRegistrar {
    transactions: TransactionBuilder,
    delegation_manager: Address,
}

impl OperatorRegistrar {
    /// Shares the nonce record of `transactions` but uses its own gas price
    pub fn new(
        transactions: &TransactionBuilder,
        registration_gas_price: u128,
        delegation_manager: Address,
    ) -> Self {
        Self {
            transactions: transactions.with_gas_price(registration_gas_price),
            delegation_manager,
        }
    }

    /// No earnings receiver, no delegation approver, no opt-out window and no metadata
    pub fn registration_call() -> registerAsOperatorCall {
        registerAsOperatorCall {
            registeringOperatorDetails: OperatorDetails {
                earningsReceiver: Address::ZERO,
                delegationApprover: Address::ZERO,
                stakerOptOutWindowBlocks: 0,
            },
            metadataURI: String::new(),
        }
    }

    #[instrument(skip_all, fields(subsys = "OperatorRegistrar", operator = %signer.address()))]
    pub async fn register(&self, signer: &PrivateKeySigner) -> Result<TxHash, RegistrationError> {
        let opts = self.transactions.build(signer).await?;

        let tx = self
            .transactions
            .sign(signer, &opts, self.delegation_manager, &Self::registration_call())
            .await?;

        let tx_hash = self.transactions.submit(tx, &opts).await?;
        tracing::info!(
            delegation_manager = %self.delegation_manager,
            %tx_hash,
            "Registered as operator"
        );

        Ok(tx_hash)
    }
}
