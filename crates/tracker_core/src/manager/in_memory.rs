use super::TaskManager;
use crate::error::AppError;
use crate::history::HistoryTracker;
use crate::model::{Entity, EntityKind, Epic, Subtask, Task, TaskId, TaskStatus};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use time::PrimitiveDateTime;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct InMemoryManager {
    last_id: TaskId,
    tasks: BTreeMap<TaskId, Task>,
    epics: BTreeMap<TaskId, Epic>,
    subtasks: BTreeMap<TaskId, Subtask>,
    prioritized: BTreeSet<(PrimitiveDateTime, TaskId)>,
    history: HistoryTracker<Entity>,
}

impl InMemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_limit(limit: Option<usize>) -> Self {
        let mut manager = Self::new();
        manager.set_history_limit(limit);
        manager
    }

    /// Swaps in a fresh tracker with the given bound, dropping recorded history.
    pub fn set_history_limit(&mut self, limit: Option<usize>) {
        self.history = match limit {
            Some(limit) => HistoryTracker::with_limit(limit),
            None => HistoryTracker::new(),
        };
    }

    pub fn last_id(&self) -> TaskId {
        self.last_id
    }

    /// Tasks, then epics, then subtasks, each in identity order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.tasks
            .values()
            .cloned()
            .map(Entity::Task)
            .chain(self.epics.values().cloned().map(Entity::Epic))
            .chain(self.subtasks.values().cloned().map(Entity::Subtask))
    }

    /// Rebuilds state from stored rows without assigning identities or
    /// checking overlaps. Epic links, aggregates and the prioritized index are
    /// derived from the rows.
    pub fn restore<I>(rows: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = Entity>,
    {
        let mut manager = Self::new();
        let mut seen = HashSet::new();
        let mut pending_links = Vec::new();

        for row in rows {
            let id = row.id();
            if id == 0 {
                return Err(AppError::invalid_data(format!(
                    "{} row is missing an id",
                    row.kind()
                )));
            }
            if !seen.insert(id) {
                return Err(AppError::invalid_data(format!("duplicate id {id}")));
            }
            manager.last_id = manager.last_id.max(id);
            row.base().check_schedule().map_err(AppError::invalid_data)?;

            match row {
                Entity::Task(task) => {
                    manager.index_insert(&task);
                    manager.tasks.insert(id, task);
                }
                Entity::Epic(mut epic) => {
                    epic.set_subtask_ids(Vec::new());
                    manager.epics.insert(id, epic);
                }
                Entity::Subtask(subtask) => {
                    pending_links.push((subtask.epic_id(), id));
                    manager.index_insert(&subtask.base);
                    manager.subtasks.insert(id, subtask);
                }
            }
        }

        for (epic_id, subtask_id) in pending_links {
            let epic = manager.epics.get_mut(&epic_id).ok_or_else(|| {
                AppError::invalid_data(format!(
                    "subtask {subtask_id} references missing epic {epic_id}"
                ))
            })?;
            epic.push_subtask_id(subtask_id);
        }

        let epic_ids: Vec<TaskId> = manager.epics.keys().copied().collect();
        for epic_id in epic_ids {
            manager.refresh_epic(epic_id);
        }

        Ok(manager)
    }

    fn next_id(&mut self) -> TaskId {
        self.last_id += 1;
        self.last_id
    }

    fn index_insert(&mut self, task: &Task) {
        if let Some(start) = task.start_time {
            self.prioritized.insert((start, task.id));
        }
    }

    fn index_remove(&mut self, task: &Task) {
        if let Some(start) = task.start_time {
            self.prioritized.remove(&(start, task.id));
        }
    }

    fn scheduled_base(&self, id: TaskId) -> Option<&Task> {
        self.tasks
            .get(&id)
            .or_else(|| self.subtasks.get(&id).map(|subtask| &subtask.base))
    }

    /// Rejects `candidate` when its interval intersects any other scheduled
    /// item, or when the interval itself cannot be represented. Intervals that
    /// only touch at an edge are accepted.
    fn validate_no_overlap(&self, candidate: &Task) -> Result<(), AppError> {
        candidate.check_schedule().map_err(AppError::invalid_input)?;
        let (Some(start), Some(end)) = (candidate.start_time, candidate.occupied_until()) else {
            return Ok(());
        };

        for &(other_start, other_id) in &self.prioritized {
            if other_start >= end {
                break;
            }
            if other_id == candidate.id {
                continue;
            }
            let Some(other_end) = self
                .scheduled_base(other_id)
                .and_then(Task::occupied_until)
            else {
                continue;
            };
            if other_end > start && other_start < end {
                warn!(
                    id = candidate.id,
                    conflicting_id = other_id,
                    "rejecting overlapping interval"
                );
                return Err(AppError::conflict(candidate.id, other_id));
            }
        }

        Ok(())
    }

    fn refresh_epic(&mut self, epic_id: TaskId) {
        let Some(epic) = self.epics.get(&epic_id) else {
            return;
        };
        let members: Vec<&Subtask> = epic
            .subtask_ids()
            .iter()
            .filter_map(|id| self.subtasks.get(id))
            .collect();
        let status = aggregate_status(&members);
        let start = members.iter().filter_map(|subtask| subtask.start_time()).min();
        let end = members.iter().filter_map(|subtask| subtask.end_time()).max();

        if let Some(epic) = self.epics.get_mut(&epic_id) {
            epic.base.status = status;
            epic.set_window(start, end);
        }
        self.sync_history(epic_id);
    }

    /// Keeps a tracked history entry in step with the stored value.
    fn sync_history(&mut self, id: TaskId) {
        if !self.history.contains(id) {
            return;
        }
        if let Some(entity) = self.peek(id) {
            self.history.refresh(entity);
        }
    }
}

fn aggregate_status(members: &[&Subtask]) -> TaskStatus {
    if members.is_empty() {
        return TaskStatus::New;
    }

    let done = members
        .iter()
        .filter(|subtask| subtask.status() == TaskStatus::Done)
        .count();
    let fresh = members
        .iter()
        .filter(|subtask| subtask.status() == TaskStatus::New)
        .count();

    if done == members.len() {
        TaskStatus::Done
    } else if fresh == members.len() {
        TaskStatus::New
    } else {
        TaskStatus::InProgress
    }
}

impl TaskManager for InMemoryManager {
    fn list_tasks(&self) -> Vec<Task> {
        self.tasks.values().cloned().collect()
    }

    fn get_task_by_id(&mut self, id: TaskId) -> Option<Task> {
        let task = self.tasks.get(&id)?.clone();
        self.history.record(Entity::Task(task.clone()));
        Some(task)
    }

    fn create_task(&mut self, mut task: Task) -> Result<TaskId, AppError> {
        task.id = 0;
        self.validate_no_overlap(&task)?;

        let id = self.next_id();
        task.id = id;
        self.index_insert(&task);
        self.tasks.insert(id, task);
        debug!(id, kind = %EntityKind::Task, "created");
        Ok(id)
    }

    fn update_task(&mut self, task: Task) -> Result<bool, AppError> {
        if !self.tasks.contains_key(&task.id) {
            return Ok(false);
        }
        self.validate_no_overlap(&task)?;

        let id = task.id;
        if let Some(previous) = self.tasks.remove(&id) {
            self.index_remove(&previous);
        }
        self.index_insert(&task);
        self.tasks.insert(id, task);
        self.sync_history(id);
        debug!(id, kind = %EntityKind::Task, "updated");
        Ok(true)
    }

    fn delete_task_by_id(&mut self, id: TaskId) -> Result<bool, AppError> {
        self.history.forget(id);
        let Some(task) = self.tasks.remove(&id) else {
            return Ok(false);
        };
        self.index_remove(&task);
        debug!(id, kind = %EntityKind::Task, "deleted");
        Ok(true)
    }

    fn delete_all_tasks(&mut self) -> Result<(), AppError> {
        let tasks = std::mem::take(&mut self.tasks);
        for task in tasks.values() {
            self.history.forget(task.id);
            self.index_remove(task);
        }
        debug!(count = tasks.len(), kind = %EntityKind::Task, "deleted all");
        Ok(())
    }

    fn list_epics(&self) -> Vec<Epic> {
        self.epics.values().cloned().collect()
    }

    fn get_epic_by_id(&mut self, id: TaskId) -> Option<Epic> {
        let epic = self.epics.get(&id)?.clone();
        self.history.record(Entity::Epic(epic.clone()));
        Some(epic)
    }

    fn get_subtasks_of_epic(&self, id: TaskId) -> Option<Vec<Subtask>> {
        let epic = self.epics.get(&id)?;
        Some(
            epic.subtask_ids()
                .iter()
                .filter_map(|subtask_id| self.subtasks.get(subtask_id).cloned())
                .collect(),
        )
    }

    fn create_epic(&mut self, mut epic: Epic) -> Result<TaskId, AppError> {
        let id = self.next_id();
        epic.base.id = id;
        epic.base.status = TaskStatus::New;
        epic.set_subtask_ids(Vec::new());
        epic.set_window(None, None);
        self.epics.insert(id, epic);
        debug!(id, kind = %EntityKind::Epic, "created");
        Ok(id)
    }

    fn update_epic(&mut self, mut epic: Epic) -> Result<bool, AppError> {
        let id = epic.id();
        let Some(existing) = self.epics.get_mut(&id) else {
            return Ok(false);
        };

        epic.set_subtask_ids(existing.take_subtask_ids());
        *existing = epic;
        self.refresh_epic(id);
        debug!(id, kind = %EntityKind::Epic, "updated");
        Ok(true)
    }

    fn delete_epic_by_id(&mut self, id: TaskId) -> Result<bool, AppError> {
        self.history.forget(id);
        let Some(epic) = self.epics.remove(&id) else {
            return Ok(false);
        };

        for subtask_id in epic.subtask_ids() {
            self.history.forget(*subtask_id);
            if let Some(subtask) = self.subtasks.remove(subtask_id) {
                self.index_remove(&subtask.base);
            }
        }
        debug!(
            id,
            kind = %EntityKind::Epic,
            subtasks = epic.subtask_ids().len(),
            "deleted"
        );
        Ok(true)
    }

    fn delete_all_epics(&mut self) -> Result<(), AppError> {
        let epics = std::mem::take(&mut self.epics);
        let subtasks = std::mem::take(&mut self.subtasks);
        for id in epics.keys() {
            self.history.forget(*id);
        }
        for subtask in subtasks.values() {
            self.history.forget(subtask.id());
            self.index_remove(&subtask.base);
        }
        debug!(
            count = epics.len(),
            subtasks = subtasks.len(),
            kind = %EntityKind::Epic,
            "deleted all"
        );
        Ok(())
    }

    fn list_subtasks(&self) -> Vec<Subtask> {
        self.subtasks.values().cloned().collect()
    }

    fn get_subtask_by_id(&mut self, id: TaskId) -> Option<Subtask> {
        let subtask = self.subtasks.get(&id)?.clone();
        self.history.record(Entity::Subtask(subtask.clone()));
        Some(subtask)
    }

    fn create_subtask(&mut self, mut subtask: Subtask) -> Result<TaskId, AppError> {
        let epic_id = subtask.epic_id();
        if !self.epics.contains_key(&epic_id) {
            return Err(AppError::not_found(format!("epic {epic_id} not found")));
        }
        subtask.base.id = 0;
        self.validate_no_overlap(&subtask.base)?;

        let id = self.next_id();
        subtask.base.id = id;
        self.index_insert(&subtask.base);
        self.subtasks.insert(id, subtask);
        if let Some(epic) = self.epics.get_mut(&epic_id) {
            epic.push_subtask_id(id);
        }
        self.refresh_epic(epic_id);
        debug!(id, epic_id, kind = %EntityKind::Subtask, "created");
        Ok(id)
    }

    fn update_subtask(&mut self, mut subtask: Subtask) -> Result<bool, AppError> {
        let id = subtask.id();
        let Some(epic_id) = self.subtasks.get(&id).map(Subtask::epic_id) else {
            return Ok(false);
        };
        subtask.reassign_epic(epic_id);
        self.validate_no_overlap(&subtask.base)?;

        if let Some(previous) = self.subtasks.remove(&id) {
            self.index_remove(&previous.base);
        }
        self.index_insert(&subtask.base);
        self.subtasks.insert(id, subtask);
        self.refresh_epic(epic_id);
        self.sync_history(id);
        debug!(id, epic_id, kind = %EntityKind::Subtask, "updated");
        Ok(true)
    }

    fn delete_subtask_by_id(&mut self, id: TaskId) -> Result<bool, AppError> {
        self.history.forget(id);
        let Some(subtask) = self.subtasks.remove(&id) else {
            return Ok(false);
        };
        self.index_remove(&subtask.base);

        let epic_id = subtask.epic_id();
        if let Some(epic) = self.epics.get_mut(&epic_id) {
            epic.remove_subtask_id(id);
        }
        self.refresh_epic(epic_id);
        debug!(id, epic_id, kind = %EntityKind::Subtask, "deleted");
        Ok(true)
    }

    fn delete_all_subtasks(&mut self) -> Result<(), AppError> {
        let subtasks = std::mem::take(&mut self.subtasks);
        for subtask in subtasks.values() {
            self.history.forget(subtask.id());
            self.index_remove(&subtask.base);
        }

        let epic_ids: Vec<TaskId> = self.epics.keys().copied().collect();
        for epic_id in epic_ids {
            if let Some(epic) = self.epics.get_mut(&epic_id) {
                epic.set_subtask_ids(Vec::new());
                epic.base.status = TaskStatus::New;
                epic.set_window(None, None);
            }
            self.sync_history(epic_id);
        }
        debug!(count = subtasks.len(), kind = %EntityKind::Subtask, "deleted all");
        Ok(())
    }

    fn prioritized_tasks(&self) -> Vec<Entity> {
        self.prioritized
            .iter()
            .filter_map(|(_, id)| {
                self.tasks
                    .get(id)
                    .cloned()
                    .map(Entity::Task)
                    .or_else(|| self.subtasks.get(id).cloned().map(Entity::Subtask))
            })
            .collect()
    }

    fn history(&self) -> Vec<Entity> {
        self.history.snapshot()
    }

    fn peek(&self, id: TaskId) -> Option<Entity> {
        if let Some(task) = self.tasks.get(&id) {
            return Some(Entity::Task(task.clone()));
        }
        if let Some(epic) = self.epics.get(&id) {
            return Some(Entity::Epic(epic.clone()));
        }
        self.subtasks.get(&id).cloned().map(Entity::Subtask)
    }
}
