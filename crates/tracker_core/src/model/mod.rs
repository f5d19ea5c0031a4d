mod task;
mod timestamp;

pub use task::{Entity, EntityKind, Epic, Subtask, Task, TaskId, TaskStatus};
pub use timestamp::{format_timestamp, parse_timestamp};
