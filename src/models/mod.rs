pub mod task;
pub mod types;
pub mod workflow;

// Re-export core models for easy access
pub use task::Task;
pub use types::{ResourceType, RootType, TaskType, WorkflowNature};
pub use workflow::Workflow;
