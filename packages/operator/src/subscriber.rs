use std::{
    pin::Pin,
    task::{Context, Poll},
};

use alloy_primitives::{Address, B256, U256};
use alloy_rpc_types_eth::Filter;
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use utils::evm_client::{EvmClient, LogStream};

use crate::{
    bindings::NewTaskCreated,
    error::SubscriptionError,
    task::{LogPosition, TaskEvent},
};

pub type TaskEventStream =
    Pin<Box<dyn Stream<Item = Result<TaskEvent, SubscriptionError>> + Send>>;

/// Restricts which task indices are delivered, empty means all of them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub indices: Vec<u32>,
}

impl TaskFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn indices(indices: impl IntoIterator<Item = u32>) -> Self {
        Self {
            indices: indices.into_iter().collect(),
        }
    }

    pub fn matches(&self, index: u32) -> bool {
        self.indices.is_empty() || self.indices.contains(&index)
    }

    /// `NewTaskCreated` logs from `service_manager`, the task index is topic 1
    pub fn to_log_filter(&self, service_manager: Address) -> Filter {
        let filter = Filter::new()
            .address(service_manager)
            .event_signature(NewTaskCreated::SIGNATURE_HASH);

        if self.indices.is_empty() {
            filter
        } else {
            filter.topic1(
                self.indices
                    .iter()
                    .map(|index| B256::from(U256::from(*index).to_be_bytes::<32>()))
                    .collect::<Vec<_>>(),
            )
        }
    }
}

/// A live feed of task events
///
/// The stream ends after yielding a single error, or silently once cancelled.
pub struct TaskSubscription {
    stream: TaskEventStream,
    cancel: CancellationToken,
}

impl TaskSubscription {
    pub fn new(stream: TaskEventStream, cancel: CancellationToken) -> Self {
        Self { stream, cancel }
    }

    /// Stops production, nothing more is yielded after this
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for TaskSubscription {
    type Item = Result<TaskEvent, SubscriptionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        self.stream.poll_next_unpin(cx)
    }
}

impl Drop for TaskSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for TaskSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSubscription")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn watch(&self, filter: TaskFilter) -> Result<TaskSubscription, SubscriptionError>;
}

/// Turns raw logs into task events
///
/// Removed, pending and already delivered logs are dropped, so every log is seen
/// once and in ledger order. The end of the feed or an undecodable log yields one
/// error and ends the stream.
pub fn task_event_stream(
    logs: LogStream,
    filter: TaskFilter,
    cancel: CancellationToken,
) -> TaskEventStream {
    let stream = async_stream::stream! {
        let mut logs = logs;
        let mut last_position: Option<LogPosition> = None;

        loop {
            tokio::select! {
                biased;
                // shutdown first
                _ = cancel.cancelled() => {
                    tracing::info!("Task event subscription cancelled");
                    break;
                }
                maybe_log = logs.next() => {
                    let Some(log) = maybe_log else {
                        tracing::warn!("Task event feed ended");
                        yield Err(SubscriptionError::Closed);
                        break;
                    };

                    if log.removed {
                        tracing::debug!("Dropping removed log: {:?}", log.transaction_hash);
                        continue;
                    }

                    let Some(position) = LogPosition::of(&log) else {
                        tracing::debug!("Dropping pending log: {:?}", log.transaction_hash);
                        continue;
                    };

                    if last_position.is_some_and(|last| position <= last) {
                        tracing::debug!(?position, "Dropping already delivered log");
                        continue;
                    }

                    match TaskEvent::decode(&log, position) {
                        Ok(event) => {
                            last_position = Some(position);
                            if filter.matches(event.index) {
                                yield Ok(event);
                            }
                        }
                        Err(err) => {
                            tracing::error!("{}", err);
                            yield Err(err);
                            break;
                        }
                    }
                }
            }
        }
    };

    Box::pin(stream)
}

/// Watches the service manager over a websocket log subscription
#[derive(Debug, Clone)]
pub struct EvmEventSubscriber {
    client: EvmClient,
    service_manager: Address,
}

impl EvmEventSubscriber {
    pub fn new(client: EvmClient, service_manager: Address) -> Self {
        Self {
            client,
            service_manager,
        }
    }
}

#[async_trait]
impl EventSubscriber for EvmEventSubscriber {
    #[instrument(level = "debug", skip(self), fields(subsys = "EventSubscriber"))]
    async fn watch(&self, filter: TaskFilter) -> Result<TaskSubscription, SubscriptionError> {
        if !self.client.endpoint.supports_subscriptions() {
            return Err(SubscriptionError::Unsupported(self.client.endpoint.to_string()));
        }

        let log_filter = filter.to_log_filter(self.service_manager);
        tracing::info!(
            service_manager = %self.service_manager,
            "Subscribing to task events with filter: {:?}",
            log_filter
        );

        let logs = self
            .client
            .subscribe_logs(&log_filter)
            .await
            .map_err(SubscriptionError::Subscribe)?;

        let cancel = CancellationToken::new();
        Ok(TaskSubscription::new(
            task_event_stream(logs, filter, cancel.clone()),
            cancel,
        ))
    }
}

#[cfg(test)]
mod test {
    use alloy_rpc_types_eth::Log;
    use futures::channel::mpsc;

    use super::*;
    use crate::test_utils::mock_subscriber::{task_log, undecodable_log};

    fn subscription(filter: TaskFilter) -> (mpsc::UnboundedSender<Log>, TaskSubscription) {
        let (tx, rx) = mpsc::unbounded();
        let cancel = CancellationToken::new();
        let stream = task_event_stream(rx.boxed(), filter, cancel.clone());
        (tx, TaskSubscription::new(stream, cancel))
    }

    #[tokio::test]
    async fn delivers_in_order_and_skips_duplicates() {
        let (tx, mut sub) = subscription(TaskFilter::all());

        tx.unbounded_send(task_log(0, "a", 10, 0)).unwrap();
        tx.unbounded_send(task_log(1, "b", 10, 1)).unwrap();
        // replayed by the node after a reconnect
        tx.unbounded_send(task_log(1, "b", 10, 1)).unwrap();
        tx.unbounded_send(task_log(2, "c", 11, 0)).unwrap();

        let indices: Vec<u32> = [
            sub.next().await.unwrap().unwrap(),
            sub.next().await.unwrap().unwrap(),
            sub.next().await.unwrap().unwrap(),
        ]
        .iter()
        .map(|event| event.index)
        .collect();

        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn drops_removed_and_pending_logs() {
        let (tx, mut sub) = subscription(TaskFilter::all());

        let mut removed = task_log(0, "reorged", 5, 0);
        removed.removed = true;
        let mut pending = task_log(1, "pending", 5, 1);
        pending.block_number = None;

        tx.unbounded_send(removed).unwrap();
        tx.unbounded_send(pending).unwrap();
        tx.unbounded_send(task_log(2, "mined", 6, 0)).unwrap();

        let event = sub.next().await.unwrap().unwrap();
        assert_eq!(event.index, 2);
        assert_eq!(event.task.name, "mined");
    }

    #[tokio::test]
    async fn filter_restricts_indices() {
        let (tx, mut sub) = subscription(TaskFilter::indices([3]));

        tx.unbounded_send(task_log(2, "skip", 1, 0)).unwrap();
        tx.unbounded_send(task_log(3, "keep", 1, 1)).unwrap();

        assert_eq!(sub.next().await.unwrap().unwrap().index, 3);
    }

    #[tokio::test]
    async fn closed_feed_yields_one_error_then_ends() {
        let (tx, mut sub) = subscription(TaskFilter::all());
        drop(tx);

        assert!(matches!(
            sub.next().await,
            Some(Err(SubscriptionError::Closed))
        ));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn undecodable_log_yields_one_error_then_ends() {
        let (tx, mut sub) = subscription(TaskFilter::all());

        tx.unbounded_send(undecodable_log(4, 0)).unwrap();
        tx.unbounded_send(task_log(0, "after", 5, 0)).unwrap();

        assert!(matches!(
            sub.next().await,
            Some(Err(SubscriptionError::Decode { block_number: 4, .. }))
        ));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn cancel_stops_without_yielding() {
        let (tx, mut sub) = subscription(TaskFilter::all());
        tx.unbounded_send(task_log(0, "never", 1, 0)).unwrap();

        sub.cancel();

        assert!(sub.is_cancelled());
        assert!(sub.next().await.is_none());
    }

    #[test]
    fn log_filter_targets_task_topic() {
        let service_manager = Address::repeat_byte(0x11);

        let all = TaskFilter::all().to_log_filter(service_manager);
        assert!(all.topics[1].is_empty());

        let some = TaskFilter::indices([5]).to_log_filter(service_manager);
        assert!(some.topics[1].contains(&B256::with_last_byte(5)));
        assert!(some.topics[0].contains(&NewTaskCreated::SIGNATURE_HASH));
    }
}
