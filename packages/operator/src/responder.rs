use std::{sync::Arc, time::Duration};

use alloy_consensus::TxEnvelope;
use alloy_primitives::{Address, TxHash};
use alloy_signer_local::PrivateKeySigner;
use futures::StreamExt;
use tokio::{sync::watch, time::Instant};
use tracing::instrument;
use utils::{context::AppContext, telemetry::ResponderMetrics};

use crate::{
    bindings::respondToTaskCall,
    error::{OperatorError, ResponseError, SubscriptionError},
    signer::ResponseSigner,
    subscriber::{EventSubscriber, TaskFilter},
    task::TaskEvent,
    transaction::{TransactionBuilder, TransactionOptions},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderState {
    Idle,
    WaitingForEvent,
    Processing,
    /// Terminal, the subscription broke or a response was abandoned
    Failed,
    /// Terminal, after the kill switch fired
    Stopped,
}

/// How hard to try for each task before giving up on it
///
/// The default makes a single attempt and stops the responder if it fails.
/// Raising `max_attempts` and clearing `halt_on_error` retries each task on its
/// own and skips it once the attempts run out.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per task, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Bounds each attempt end to end
    pub attempt_timeout: Duration,
    /// Stop the responder instead of skipping the task once attempts run out
    pub halt_on_error: bool,
}

impl RetryPolicy {
    pub const MAX_BACKOFF: Duration = Duration::from_secs(10);

    /// The pause after the given failed attempt, counting from 1
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Self::MAX_BACKOFF,
            attempt_timeout: Duration::from_secs(60),
            halt_on_error: true,
        }
    }
}

/// State that lives as long as the responder does
#[derive(Debug, Clone)]
pub struct ResponderContext {
    pub signer: PrivateKeySigner,
    pub transactions: TransactionBuilder,
    pub service_manager: Address,
    pub response_signer: ResponseSigner,
}

impl ResponderContext {
    pub fn new(
        signer: PrivateKeySigner,
        transactions: TransactionBuilder,
        service_manager: Address,
    ) -> Self {
        Self {
            signer,
            transactions,
            service_manager,
            response_signer: ResponseSigner,
        }
    }
}

/// Answers every task event with a signed `respondToTask` transaction, one at a time
pub struct TaskResponder {
    context: ResponderContext,
    subscriber: Arc<dyn EventSubscriber>,
    filter: TaskFilter,
    retry: RetryPolicy,
    metrics: ResponderMetrics,
    state: watch::Sender<ResponderState>,
}

impl TaskResponder {
    pub fn new(
        context: ResponderContext,
        subscriber: Arc<dyn EventSubscriber>,
        filter: TaskFilter,
        retry: RetryPolicy,
        metrics: ResponderMetrics,
    ) -> Self {
        let (state, _) = watch::channel(ResponderState::Idle);

        Self {
            context,
            subscriber,
            filter,
            retry,
            metrics,
            state,
        }
    }

    pub fn state(&self) -> ResponderState {
        *self.state.borrow()
    }

    /// Follows state transitions, mostly useful in tests
    pub fn state_receiver(&self) -> watch::Receiver<ResponderState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ResponderState) {
        self.state.send_replace(state);
    }

    fn fail(&self, err: impl Into<OperatorError>) -> OperatorError {
        self.set_state(ResponderState::Failed);
        err.into()
    }

    /// Runs until the kill switch fires (`Ok`) or something unrecoverable happens
    #[instrument(skip(self, ctx), fields(subsys = "TaskResponder", operator = %self.context.signer.address()))]
    pub async fn run(&self, ctx: AppContext) -> Result<(), OperatorError> {
        let mut kill_receiver = ctx.get_kill_receiver();
        if ctx.killed() {
            self.set_state(ResponderState::Stopped);
            return Ok(());
        }

        let mut subscription = self
            .subscriber
            .watch(self.filter.clone())
            .await
            .map_err(|e| self.fail(e))?;

        tracing::info!("Waiting for new tasks");

        loop {
            self.set_state(ResponderState::WaitingForEvent);

            let next = tokio::select! {
                _ = kill_receiver.recv() => None,
                next = subscription.next() => Some(next),
            };

            let event = match next {
                None => {
                    tracing::info!("Responder shutting down");
                    subscription.cancel();
                    self.set_state(ResponderState::Stopped);
                    return Ok(());
                }
                Some(Some(Ok(event))) => event,
                Some(Some(Err(err))) => {
                    tracing::error!("Task subscription failed: {}", err);
                    return Err(self.fail(err));
                }
                Some(None) => {
                    tracing::error!("Task subscription ended");
                    return Err(self.fail(SubscriptionError::Closed));
                }
            };

            self.set_state(ResponderState::Processing);
            self.metrics.increment_tasks_received();
            tracing::info!(index = event.index, name = %event.task.name, "New task detected");

            match self.respond_with_retry(&event).await {
                Ok(tx_hash) => {
                    self.metrics.increment_responses_submitted();
                    tracing::info!(
                        index = event.index,
                        name = %event.task.name,
                        %tx_hash,
                        "Responded to task"
                    );
                }
                Err(source) if self.retry.halt_on_error => {
                    tracing::error!(index = event.index, name = %event.task.name, "Response failed: {}", source);
                    subscription.cancel();
                    return Err(self.fail(OperatorError::Response {
                        index: event.index,
                        name: event.task.name,
                        source,
                    }));
                }
                Err(err) => {
                    self.metrics.increment_tasks_skipped();
                    tracing::error!(
                        index = event.index,
                        name = %event.task.name,
                        "Skipping task after failed response: {}",
                        err
                    );
                }
            }

            self.set_state(ResponderState::Idle);
        }
    }

    /// Retries a single task with exponential backoff
    pub async fn respond_with_retry(&self, event: &TaskEvent) -> Result<TxHash, ResponseError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.respond(event).await {
                Ok(tx_hash) => return Ok(tx_hash),
                Err(err) => {
                    self.metrics.increment_response_errors(err.kind());

                    if attempt >= max_attempts || !err.is_retryable() {
                        return Err(err);
                    }

                    let backoff = self.retry.backoff(attempt);
                    tracing::warn!(
                        index = event.index,
                        attempt,
                        ?backoff,
                        "Response attempt failed: {}",
                        err
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One build, sign and submit cycle, bounded by the attempt timeout
    ///
    /// Running out of time once the transaction is with the node is reported as
    /// [`ResponseError::Unconfirmed`], which is never retried.
    pub async fn respond(&self, event: &TaskEvent) -> Result<TxHash, ResponseError> {
        let timeout = self.retry.attempt_timeout;
        let deadline = Instant::now() + timeout;

        let (tx, opts) = tokio::time::timeout_at(deadline, self.prepare(event))
            .await
            .map_err(|_| ResponseError::Timeout(timeout))??;

        let submitted = tokio::time::timeout_at(deadline, self.context.transactions.submit(tx, &opts))
            .await
            .map_err(|_| ResponseError::Unconfirmed {
                nonce: opts.nonce,
                after: timeout,
            })?;

        Ok(submitted?)
    }

    async fn prepare(
        &self,
        event: &TaskEvent,
    ) -> Result<(TxEnvelope, TransactionOptions), ResponseError> {
        let ResponderContext {
            signer,
            transactions,
            service_manager,
            response_signer,
        } = &self.context;

        let opts = transactions.build(signer).await?;

        let signature = response_signer.sign(signer.credential(), &event.task)?;
        tracing::debug!(
            index = event.index,
            message = %ResponseSigner::display_message(&event.task),
            "Signed task response"
        );

        let call = respondToTaskCall {
            task: (&event.task).into(),
            referenceTaskIndex: event.index,
            signature: signature.to_bytes(),
        };

        let tx = transactions
            .sign(signer, &opts, *service_manager, &call)
            .await?;

        Ok((tx, opts))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
        assert_eq!(policy.backoff(6), RetryPolicy::MAX_BACKOFF);
        assert_eq!(policy.backoff(100), RetryPolicy::MAX_BACKOFF);
    }

    #[test]
    fn default_policy_is_one_attempt_then_halt() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_attempts, 1);
        assert!(policy.halt_on_error);
    }

    #[test]
    fn unconfirmed_submission_is_never_retried() {
        let unconfirmed = ResponseError::Unconfirmed {
            nonce: 3,
            after: Duration::from_secs(1),
        };
        assert!(!unconfirmed.is_retryable());
        assert_eq!(unconfirmed.kind(), "unconfirmed");

        assert!(ResponseError::Timeout(Duration::from_secs(1)).is_retryable());
    }
}
