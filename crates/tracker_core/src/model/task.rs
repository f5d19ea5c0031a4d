use crate::error::AppError;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use time::{Duration, PrimitiveDateTime};

/// Identity shared by tasks, epics and subtasks. Zero means "not created yet".
pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    New,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::InProgress => "IN_PROGRESS",
            Self::Done => "DONE",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "NEW" => Ok(Self::New),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "DONE" => Ok(Self::Done),
            _ => Err(AppError::invalid_input(format!("unknown status '{raw}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Task,
    Epic,
    Subtask,
}

impl EntityKind {
    /// Tag used in the snapshot file.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Task => "TASK",
            Self::Epic => "EPIC",
            Self::Subtask => "SUBTASK",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "TASK" => Some(Self::Task),
            "EPIC" => Some(Self::Epic),
            "SUBTASK" => Some(Self::Subtask),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Epic => "epic",
            Self::Subtask => "subtask",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Base record shared by every kind of work item.
///
/// Equality and hashing look at `id` only.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub start_time: Option<PrimitiveDateTime>,
    pub duration: Option<Duration>,
}

impl Task {
    pub fn new(title: impl Into<String>, description: impl Into<String>, status: TaskStatus) -> Self {
        Self::with_id(0, title, description, status)
    }

    pub fn with_id(
        id: TaskId,
        title: impl Into<String>,
        description: impl Into<String>,
        status: TaskStatus,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            status,
            start_time: None,
            duration: None,
        }
    }

    pub fn scheduled(mut self, start_time: PrimitiveDateTime, duration: Duration) -> Self {
        self.start_time = Some(start_time);
        self.duration = Some(duration);
        self
    }

    /// `None` unless both parts are set and their sum is a representable time.
    pub fn end_time(&self) -> Option<PrimitiveDateTime> {
        self.start_time?.checked_add(self.duration?)
    }

    /// Interval end used for overlap checks. A start time without a duration
    /// occupies a single instant.
    pub(crate) fn occupied_until(&self) -> Option<PrimitiveDateTime> {
        let start = self.start_time?;
        match self.duration {
            Some(_) => self.end_time(),
            None => Some(start),
        }
    }

    /// Rejects a negative duration or one that ends past the calendar.
    pub(crate) fn check_schedule(&self) -> Result<(), String> {
        let (Some(start), Some(duration)) = (self.start_time, self.duration) else {
            return Ok(());
        };
        if duration.is_negative() {
            return Err(format!(
                "duration of task {} is negative ({} min)",
                self.id,
                duration.whole_minutes()
            ));
        }
        if start.checked_add(duration).is_none() {
            return Err(format!(
                "task {} ends beyond the supported time range",
                self.id
            ));
        }
        Ok(())
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A composite item whose status and time window are derived from its subtasks.
#[derive(Debug, Clone)]
pub struct Epic {
    pub base: Task,
    subtask_ids: Vec<TaskId>,
    end_time: Option<PrimitiveDateTime>,
}

impl Epic {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::with_id(0, title, description)
    }

    pub fn with_id(id: TaskId, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            base: Task::with_id(id, title, description, TaskStatus::New),
            subtask_ids: Vec::new(),
            end_time: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.base.id
    }

    pub fn status(&self) -> TaskStatus {
        self.base.status
    }

    pub fn start_time(&self) -> Option<PrimitiveDateTime> {
        self.base.start_time
    }

    pub fn duration(&self) -> Option<Duration> {
        self.base.duration
    }

    /// Aggregated end of the latest subtask, not `start + duration`.
    pub fn end_time(&self) -> Option<PrimitiveDateTime> {
        self.end_time
    }

    pub fn subtask_ids(&self) -> &[TaskId] {
        &self.subtask_ids
    }

    pub(crate) fn take_subtask_ids(&mut self) -> Vec<TaskId> {
        std::mem::take(&mut self.subtask_ids)
    }

    pub(crate) fn set_subtask_ids(&mut self, ids: Vec<TaskId>) {
        self.subtask_ids = ids;
    }

    pub(crate) fn push_subtask_id(&mut self, id: TaskId) {
        if !self.subtask_ids.contains(&id) {
            self.subtask_ids.push(id);
        }
    }

    pub(crate) fn remove_subtask_id(&mut self, id: TaskId) {
        self.subtask_ids.retain(|existing| *existing != id);
    }

    /// Stores the aggregated window; duration is set only when both ends are known.
    pub(crate) fn set_window(
        &mut self,
        start: Option<PrimitiveDateTime>,
        end: Option<PrimitiveDateTime>,
    ) {
        self.base.start_time = start;
        self.base.duration = match (start, end) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        };
        self.end_time = end;
    }
}

impl PartialEq for Epic {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
    }
}

impl Eq for Epic {}

/// A task owned by exactly one epic.
#[derive(Debug, Clone)]
pub struct Subtask {
    pub base: Task,
    epic_id: TaskId,
}

impl Subtask {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        status: TaskStatus,
        epic_id: TaskId,
    ) -> Self {
        Self::with_id(0, title, description, status, epic_id)
    }

    pub fn with_id(
        id: TaskId,
        title: impl Into<String>,
        description: impl Into<String>,
        status: TaskStatus,
        epic_id: TaskId,
    ) -> Self {
        Self {
            base: Task::with_id(id, title, description, status),
            epic_id,
        }
    }

    pub fn scheduled(mut self, start_time: PrimitiveDateTime, duration: Duration) -> Self {
        self.base = self.base.scheduled(start_time, duration);
        self
    }

    pub fn id(&self) -> TaskId {
        self.base.id
    }

    pub fn epic_id(&self) -> TaskId {
        self.epic_id
    }

    pub fn status(&self) -> TaskStatus {
        self.base.status
    }

    pub fn start_time(&self) -> Option<PrimitiveDateTime> {
        self.base.start_time
    }

    pub fn end_time(&self) -> Option<PrimitiveDateTime> {
        self.base.end_time()
    }

    pub(crate) fn reassign_epic(&mut self, epic_id: TaskId) {
        self.epic_id = epic_id;
    }
}

impl PartialEq for Subtask {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
    }
}

impl Eq for Subtask {}

/// Any stored work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Task(Task),
    Epic(Epic),
    Subtask(Subtask),
}

impl Entity {
    pub fn base(&self) -> &Task {
        match self {
            Self::Task(task) => task,
            Self::Epic(epic) => &epic.base,
            Self::Subtask(subtask) => &subtask.base,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Task(_) => EntityKind::Task,
            Self::Epic(_) => EntityKind::Epic,
            Self::Subtask(_) => EntityKind::Subtask,
        }
    }

    pub fn id(&self) -> TaskId {
        self.base().id
    }

    pub fn title(&self) -> &str {
        &self.base().title
    }

    pub fn status(&self) -> TaskStatus {
        self.base().status
    }

    pub fn start_time(&self) -> Option<PrimitiveDateTime> {
        self.base().start_time
    }

    pub fn end_time(&self) -> Option<PrimitiveDateTime> {
        match self {
            Self::Epic(epic) => epic.end_time(),
            other => other.base().end_time(),
        }
    }

    pub fn epic_id(&self) -> Option<TaskId> {
        match self {
            Self::Subtask(subtask) => Some(subtask.epic_id()),
            _ => None,
        }
    }
}

impl From<Task> for Entity {
    fn from(task: Task) -> Self {
        Self::Task(task)
    }
}

impl From<Epic> for Entity {
    fn from(epic: Epic) -> Self {
        Self::Epic(epic)
    }
}

impl From<Subtask> for Entity {
    fn from(subtask: Subtask) -> Self {
        Self::Subtask(subtask)
    }
}
