use std::time::Duration;

use alloy_primitives::{Address, TxHash};
use alloy_signer_local::PrivateKeySigner;
use rand::Rng;
use tracing::instrument;
use utils::context::AppContext;

use crate::{bindings::createNewTaskCall, error::TaskCreationError, transaction::TransactionBuilder};

pub const ADJECTIVES: [&str; 5] = ["Quick", "Lazy", "Sleepy", "Noisy", "Hungry"];
pub const NOUNS: [&str; 5] = ["Fox", "Dog", "Cat", "Mouse", "Bear"];

/// e.g. "SleepyCat42"
pub fn random_task_name() -> String {
    let mut rng = rand::rng();

    format!(
        "{}{}{}",
        ADJECTIVES[rng.random_range(0..ADJECTIVES.len())],
        NOUNS[rng.random_range(0..NOUNS.len())],
        rng.random_range(0..1000u32)
    )
}

/// Keeps a local network busy by creating a task on a fixed interval
#[derive(Debug, Clone)]
pub struct TaskSpammer {
    signer: PrivateKeySigner,
    transactions: TransactionBuilder,
    service_manager: Address,
    interval: Duration,
}

impl TaskSpammer {
    pub fn new(
        signer: PrivateKeySigner,
        transactions: TransactionBuilder,
        service_manager: Address,
        interval: Duration,
    ) -> Self {
        Self {
            signer,
            transactions,
            service_manager,
            interval,
        }
    }

    #[instrument(skip(self), fields(subsys = "TaskSpammer"))]
    pub async fn create_task(&self, name: &str) -> Result<TxHash, TaskCreationError> {
        let opts = self.transactions.build(&self.signer).await?;
        let call = createNewTaskCall {
            name: name.to_string(),
        };

        let tx = self
            .transactions
            .sign(&self.signer, &opts, self.service_manager, &call)
            .await?;

        let tx_hash = self.transactions.submit(tx, &opts).await?;
        tracing::info!(%tx_hash, "Created task {}", name);

        Ok(tx_hash)
    }

    /// Creates tasks until the kill switch fires, the first failure ends the loop
    pub async fn run(&self, ctx: AppContext) -> Result<(), TaskCreationError> {
        let mut kill_receiver = ctx.get_kill_receiver();

        while !ctx.killed() {
            self.create_task(&random_task_name()).await?;

            tokio::select! {
                _ = kill_receiver.recv() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!("Task spammer stopped");
        Ok(())
    }
}
