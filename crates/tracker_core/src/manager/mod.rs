//! The state manager contract and its two implementations.
//!
//! Every operation runs to completion before returning. Callers that share a
//! manager across threads must hold one lock around the whole manager so that
//! an overlap check and the insert that follows it cannot interleave.

mod file_backed;
mod in_memory;

pub use file_backed::FileBackedManager;
pub use in_memory::InMemoryManager;

use crate::error::AppError;
use crate::model::{Entity, Epic, Subtask, Task, TaskId};

/// Operations offered to adapters such as the command line.
///
/// `get_*_by_id` records a hit in the view history, which is why it takes
/// `&mut self`. Update and delete report `Ok(false)` for unknown identities.
pub trait TaskManager {
    fn list_tasks(&self) -> Vec<Task>;
    fn get_task_by_id(&mut self, id: TaskId) -> Option<Task>;
    fn create_task(&mut self, task: Task) -> Result<TaskId, AppError>;
    fn update_task(&mut self, task: Task) -> Result<bool, AppError>;
    fn delete_task_by_id(&mut self, id: TaskId) -> Result<bool, AppError>;
    fn delete_all_tasks(&mut self) -> Result<(), AppError>;

    fn list_epics(&self) -> Vec<Epic>;
    fn get_epic_by_id(&mut self, id: TaskId) -> Option<Epic>;
    fn get_subtasks_of_epic(&self, id: TaskId) -> Option<Vec<Subtask>>;
    fn create_epic(&mut self, epic: Epic) -> Result<TaskId, AppError>;
    fn update_epic(&mut self, epic: Epic) -> Result<bool, AppError>;
    fn delete_epic_by_id(&mut self, id: TaskId) -> Result<bool, AppError>;
    fn delete_all_epics(&mut self) -> Result<(), AppError>;

    fn list_subtasks(&self) -> Vec<Subtask>;
    fn get_subtask_by_id(&mut self, id: TaskId) -> Option<Subtask>;
    fn create_subtask(&mut self, subtask: Subtask) -> Result<TaskId, AppError>;
    fn update_subtask(&mut self, subtask: Subtask) -> Result<bool, AppError>;
    fn delete_subtask_by_id(&mut self, id: TaskId) -> Result<bool, AppError>;
    fn delete_all_subtasks(&mut self) -> Result<(), AppError>;

    /// Tasks and subtasks with a start time, earliest first.
    fn prioritized_tasks(&self) -> Vec<Entity>;
    /// Items fetched by identity, oldest access first.
    fn history(&self) -> Vec<Entity>;
    /// Lookup of any kind that leaves the history untouched.
    fn peek(&self, id: TaskId) -> Option<Entity>;
}
