//! Solidity interfaces the operator talks to
//! only the calls and events we actually encode or decode are declared here

#![allow(missing_docs)]

mod service_manager {
    alloy_sol_macro::sol! {
        #[derive(Debug, PartialEq, Eq)]
        interface IHelloWorldServiceManager {
            struct Task {
                string name;
                uint32 taskCreatedBlock;
            }

            event NewTaskCreated(uint32 indexed taskIndex, Task task);

            function createNewTask(string name) external;

            function respondToTask(Task task, uint32 referenceTaskIndex, bytes signature) external;
        }
    }
}

mod delegation_manager {
    alloy_sol_macro::sol! {
        #[derive(Debug, PartialEq, Eq)]
        interface IDelegationManager {
            struct OperatorDetails {
                address earningsReceiver;
                address delegationApprover;
                uint32 stakerOptOutWindowBlocks;
            }

            function registerAsOperator(OperatorDetails registeringOperatorDetails, string metadataURI) external;
        }
    }
}

pub use delegation_manager::IDelegationManager::{self, registerAsOperatorCall, OperatorDetails};
pub use service_manager::IHelloWorldServiceManager::{
    self, createNewTaskCall, respondToTaskCall, NewTaskCreated, Task as SolTask,
};
