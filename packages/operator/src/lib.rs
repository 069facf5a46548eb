#![allow(clippy::uninlined_format_args)]

pub mod args;
pub mod bindings;
pub mod config;
pub mod error;
pub mod registrar;
pub mod responder;
pub mod signer;
pub mod spammer;
pub mod subscriber;
pub mod task;
pub mod transaction;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use std::sync::Arc;

use alloy_signer_local::PrivateKeySigner;
use tracing::instrument;
use utils::{
    context::AppContext,
    evm_client::{ChainClient, EvmClient},
    telemetry::ResponderMetrics,
};

use crate::{
    config::{Config, OperatorSettings},
    error::OperatorError,
    registrar::OperatorRegistrar,
    responder::{ResponderContext, TaskResponder},
    subscriber::{EventSubscriber, EvmEventSubscriber},
    transaction::TransactionBuilder,
};

/// Registration followed by the responder loop
pub struct Operator {
    signer: PrivateKeySigner,
    registrar: Option<OperatorRegistrar>,
    responder: TaskResponder,
}

impl Operator {
    /// Connects to the node named in the settings
    pub async fn connect(
        settings: OperatorSettings,
        metrics: ResponderMetrics,
    ) -> Result<Self, OperatorError> {
        let client = EvmClient::new(settings.endpoint.clone()).await?;
        tracing::info!("Connected to {}", client.endpoint);

        let subscriber = EvmEventSubscriber::new(client.clone(), settings.service_manager);

        Self::from_parts(settings, Arc::new(client), Arc::new(subscriber), metrics).await
    }

    /// Wires the operator up with any chain client and subscriber
    pub async fn from_parts(
        settings: OperatorSettings,
        chain: Arc<dyn ChainClient>,
        subscriber: Arc<dyn EventSubscriber>,
        metrics: ResponderMetrics,
    ) -> Result<Self, OperatorError> {
        let OperatorSettings {
            gas_limit,
            gas_price,
            service_manager,
            signer,
            registration,
            filter,
            retry,
            ..
        } = settings;

        let transactions = TransactionBuilder::connect(chain, gas_limit, gas_price).await?;
        tracing::info!(
            chain_id = transactions.chain_id(),
            operator = %signer.address(),
            "Operator ready"
        );

        let registrar = registration.map(|registration| {
            OperatorRegistrar::new(
                &transactions,
                registration.gas_price,
                registration.delegation_manager,
            )
        });

        let responder = TaskResponder::new(
            ResponderContext::new(signer.clone(), transactions, service_manager),
            subscriber,
            filter,
            retry,
            metrics,
        );

        Ok(Self {
            signer,
            registrar,
            responder,
        })
    }

    pub fn responder(&self) -> &TaskResponder {
        &self.responder
    }

    /// A failed registration ends the run before any task is watched
    #[instrument(skip_all, fields(subsys = "Operator"))]
    pub async fn run(&self, ctx: AppContext) -> Result<(), OperatorError> {
        match &self.registrar {
            Some(registrar) => {
                registrar.register(&self.signer).await?;
            }
            None => tracing::info!("Skipping operator registration"),
        }

        self.responder.run(ctx).await
    }
}

/// Validates the config, connects and runs until killed or failed
pub async fn run_operator(
    ctx: AppContext,
    config: Config,
    metrics: ResponderMetrics,
) -> Result<(), OperatorError> {
    let settings = config.operator_settings()?;

    Operator::connect(settings, metrics).await?.run(ctx).await
}
