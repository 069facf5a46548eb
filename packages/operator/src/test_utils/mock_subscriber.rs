use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use alloy_primitives::{Address, LogData};
use alloy_rpc_types_eth::Log;
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use futures::{channel::mpsc, StreamExt};
use tokio_util::sync::CancellationToken;
use utils::error::EvmClientError;

use crate::{
    bindings::{NewTaskCreated, SolTask},
    error::SubscriptionError,
    subscriber::{task_event_stream, EventSubscriber, TaskFilter, TaskSubscription},
};

/// A mined `NewTaskCreated` log
pub fn task_log(index: u32, name: &str, block_number: u64, log_index: u64) -> Log {
    let event = NewTaskCreated {
        taskIndex: index,
        task: SolTask {
            name: name.to_string(),
            taskCreatedBlock: block_number as u32,
        },
    };

    mined_log(event.encode_log_data(), block_number, log_index)
}

/// A mined log that isn't a `NewTaskCreated` event
pub fn undecodable_log(block_number: u64, log_index: u64) -> Log {
    mined_log(
        LogData::new_unchecked(vec![NewTaskCreated::SIGNATURE_HASH], vec![0xff; 3].into()),
        block_number,
        log_index,
    )
}

fn mined_log(data: LogData, block_number: u64, log_index: u64) -> Log {
    Log {
        inner: alloy_primitives::Log {
            address: Address::ZERO,
            data,
        },
        block_number: Some(block_number),
        log_index: Some(log_index),
        ..Default::default()
    }
}

/// Feeds hand-made logs through the real log-to-event pipeline
#[derive(Clone)]
pub struct MockEventSubscriber {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<Log>>>>,
    receiver: Arc<Mutex<Option<mpsc::UnboundedReceiver<Log>>>>,
    watch_count: Arc<AtomicUsize>,
    fail_watch: Arc<AtomicBool>,
    next_block: Arc<AtomicUsize>,
}

impl MockEventSubscriber {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded();

        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            receiver: Arc::new(Mutex::new(Some(receiver))),
            watch_count: Arc::new(AtomicUsize::new(0)),
            fail_watch: Arc::new(AtomicBool::new(false)),
            next_block: Arc::new(AtomicUsize::new(1)),
        }
    }

    pub fn send_log(&self, log: Log) {
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            // the receiver is gone once the subscription is dropped
            let _ = sender.unbounded_send(log);
        }
    }

    /// Sends a task in its own block
    pub fn send_task(&self, index: u32, name: &str) {
        let block_number = self.next_block.fetch_add(1, Ordering::SeqCst) as u64;
        self.send_log(task_log(index, name, block_number, 0));
    }

    /// Ends the feed, the subscription sees it as closed
    pub fn close(&self) {
        self.sender.lock().unwrap().take();
    }

    pub fn fail_watch(&self) {
        self.fail_watch.store(true, Ordering::SeqCst);
    }

    pub fn watch_count(&self) -> usize {
        self.watch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSubscriber for MockEventSubscriber {
    async fn watch(&self, filter: TaskFilter) -> Result<TaskSubscription, SubscriptionError> {
        self.watch_count.fetch_add(1, Ordering::SeqCst);

        if self.fail_watch.load(Ordering::SeqCst) {
            return Err(SubscriptionError::Subscribe(EvmClientError::SubscribeLogs(
                anyhow::anyhow!("mock subscription failure"),
            )));
        }

        let receiver = self.receiver.lock().unwrap().take().ok_or_else(|| {
            SubscriptionError::Subscribe(EvmClientError::SubscribeLogs(anyhow::anyhow!(
                "mock subscriber can only be watched once"
            )))
        })?;

        let cancel = CancellationToken::new();
        Ok(TaskSubscription::new(
            task_event_stream(receiver.boxed(), filter, cancel.clone()),
            cancel,
        ))
    }
}
