// State machine module for workflow orchestration
//
// Status enums plus pure transition tables. Persistence is the store's job: callers read the
// current status, compute the target here, and commit it with a compare-and-set.

pub mod errors;
pub mod events;
pub mod states;
pub mod task_state_machine;
pub mod workflow_state_machine;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::{TaskEvent, WorkflowEvent};
pub use states::{TaskStatus, WorkflowStatus};
pub use task_state_machine::TaskStateMachine;
pub use workflow_state_machine::WorkflowStateMachine;
