use alloy_rpc_types_eth::Log;

use crate::{
    bindings::{NewTaskCreated, SolTask},
    error::SubscriptionError,
};

/// A unit of work published by the service manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub name: String,
    pub created_at_block: u32,
}

impl Task {
    pub fn new(name: impl ToString, created_at_block: u32) -> Self {
        Self {
            name: name.to_string(),
            created_at_block,
        }
    }
}

impl From<SolTask> for Task {
    fn from(task: SolTask) -> Self {
        Self {
            name: task.name,
            created_at_block: task.taskCreatedBlock,
        }
    }
}

impl From<&Task> for SolTask {
    fn from(task: &Task) -> Self {
        SolTask {
            name: task.name.clone(),
            taskCreatedBlock: task.created_at_block,
        }
    }
}

/// Where a log sits in the ledger, ordered by block and then by log index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: u64,
}

impl LogPosition {
    /// `None` for logs that aren't mined yet
    pub fn of(log: &Log) -> Option<Self> {
        Some(Self {
            block_number: log.block_number?,
            log_index: log.log_index?,
        })
    }
}

/// A decoded `NewTaskCreated` notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
    pub index: u32,
    pub task: Task,
    pub position: LogPosition,
}

impl TaskEvent {
    pub fn decode(log: &Log, position: LogPosition) -> Result<Self, SubscriptionError> {
        let decoded = log
            .log_decode::<NewTaskCreated>()
            .map_err(|e| SubscriptionError::Decode {
                block_number: position.block_number,
                log_index: position.log_index,
                reason: e.to_string(),
            })?;

        let NewTaskCreated { taskIndex, task } = decoded.inner.data;

        Ok(Self {
            index: taskIndex,
            task: task.into(),
            position,
        })
    }
}

#[cfg(test)]
mod test {
    use alloy_primitives::{Address, LogData};
    use alloy_sol_types::SolEvent;

    use super::*;

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

    #[test]
    fn decodes_new_task_created() {
        let event = NewTaskCreated {
            taskIndex: 5,
            task: SolTask {
                name: "Foo".to_string(),
                taskCreatedBlock: 1000,
            },
        };
        let log = mined_log(event.encode_log_data(), 12, 3);

        let position = LogPosition::of(&log).unwrap();
        let decoded = TaskEvent::decode(&log, position).unwrap();

        assert_eq!(decoded.index, 5);
        assert_eq!(decoded.task, Task::new("Foo", 1000));
        assert_eq!(
            decoded.position,
            LogPosition {
                block_number: 12,
                log_index: 3
            }
        );
    }

    #[test]
    fn unrelated_log_fails_to_decode() {
        let log = mined_log(LogData::new_unchecked(vec![], vec![1, 2, 3].into()), 1, 0);
        let position = LogPosition::of(&log).unwrap();

        assert!(matches!(
            TaskEvent::decode(&log, position),
            Err(SubscriptionError::Decode { block_number: 1, .. })
        ));
    }

    #[test]
    fn pending_log_has_no_position() {
        let log = Log {
            block_number: None,
            log_index: Some(0),
            ..Default::default()
        };
        assert_eq!(LogPosition::of(&log), None);
    }

    #[test]
    fn positions_order_by_block_then_index() {
        let a = LogPosition {
            block_number: 1,
            log_index: 9,
        };
        let b = LogPosition {
            block_number: 2,
            log_index: 0,
        };
        assert!(a < b);
    }
}
