use super::{InMemoryManager, TaskManager};
use crate::error::AppError;
use crate::model::{Entity, Epic, Subtask, Task, TaskId};
use crate::storage::snapshot;
use std::path::{Path, PathBuf};
use tracing::warn;

/// An [`InMemoryManager`] that rewrites its snapshot file after every applied
/// mutation.
///
/// When a write fails the in-memory change is kept and the error is returned.
/// The next successful write stores the full state again, so the file catches
/// up without a separate repair step.
#[derive(Debug, Clone)]
pub struct FileBackedManager {
    inner: InMemoryManager,
    path: PathBuf,
}

impl FileBackedManager {
    /// Starts empty without touching the file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: InMemoryManager::new(),
            path: path.into(),
        }
    }

    /// Reads an existing snapshot. A missing file is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let rows = snapshot::read_snapshot(&path)?;
        let inner = InMemoryManager::restore(rows)?;
        Ok(Self { inner, path })
    }

    /// Like [`FileBackedManager::load`], but a missing file yields an empty manager.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self::new(path));
        }
        Self::load(path)
    }

    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.inner.set_history_limit(limit);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<(), AppError> {
        snapshot::write_snapshot(&self.path, self.inner.entities()).inspect_err(|err| {
            warn!(path = %self.path.display(), error = %err, "snapshot write failed");
        })
    }

    fn persist_if(&self, applied: bool) -> Result<bool, AppError> {
        if applied {
            self.save()?;
        }
        Ok(applied)
    }
}

impl TaskManager for FileBackedManager {
    fn list_tasks(&self) -> Vec<Task> {
        self.inner.list_tasks()
    }

    fn get_task_by_id(&mut self, id: TaskId) -> Option<Task> {
        self.inner.get_task_by_id(id)
    }

    fn create_task(&mut self, task: Task) -> Result<TaskId, AppError> {
        let id = self.inner.create_task(task)?;
        self.save()?;
        Ok(id)
    }

    fn update_task(&mut self, task: Task) -> Result<bool, AppError> {
        let applied = self.inner.update_task(task)?;
        self.persist_if(applied)
    }

    fn delete_task_by_id(&mut self, id: TaskId) -> Result<bool, AppError> {
        let applied = self.inner.delete_task_by_id(id)?;
        self.persist_if(applied)
    }

    fn delete_all_tasks(&mut self) -> Result<(), AppError> {
        self.inner.delete_all_tasks()?;
        self.save()
    }

    fn list_epics(&self) -> Vec<Epic> {
        self.inner.list_epics()
    }

    fn get_epic_by_id(&mut self, id: TaskId) -> Option<Epic> {
        self.inner.get_epic_by_id(id)
    }

    fn get_subtasks_of_epic(&self, id: TaskId) -> Option<Vec<Subtask>> {
        self.inner.get_subtasks_of_epic(id)
    }

    fn create_epic(&mut self, epic: Epic) -> Result<TaskId, AppError> {
        let id = self.inner.create_epic(epic)?;
        self.save()?;
        Ok(id)
    }

    fn update_epic(&mut self, epic: Epic) -> Result<bool, AppError> {
        let applied = self.inner.update_epic(epic)?;
        self.persist_if(applied)
    }

    fn delete_epic_by_id(&mut self, id: TaskId) -> Result<bool, AppError> {
        let applied = self.inner.delete_epic_by_id(id)?;
        self.persist_if(applied)
    }

    fn delete_all_epics(&mut self) -> Result<(), AppError> {
        self.inner.delete_all_epics()?;
        self.save()
    }

    fn list_subtasks(&self) -> Vec<Subtask> {
        self.inner.list_subtasks()
    }

    fn get_subtask_by_id(&mut self, id: TaskId) -> Option<Subtask> {
        self.inner.get_subtask_by_id(id)
    }

    fn create_subtask(&mut self, subtask: Subtask) -> Result<TaskId, AppError> {
        let id = self.inner.create_subtask(subtask)?;
        self.save()?;
        Ok(id)
    }

    fn update_subtask(&mut self, subtask: Subtask) -> Result<bool, AppError> {
        let applied = self.inner.update_subtask(subtask)?;
        self.persist_if(applied)
    }

    fn delete_subtask_by_id(&mut self, id: TaskId) -> Result<bool, AppError> {
        let applied = self.inner.delete_subtask_by_id(id)?;
        self.persist_if(applied)
    }

    fn delete_all_subtasks(&mut self) -> Result<(), AppError> {
        self.inner.delete_all_subtasks()?;
        self.save()
    }

    fn prioritized_tasks(&self) -> Vec<Entity> {
        self.inner.prioritized_tasks()
    }

    fn history(&self) -> Vec<Entity> {
        self.inner.history()
    }

    fn peek(&self, id: TaskId) -> Option<Entity> {
        self.inner.peek(id)
    }
}

#[cfg(test)]
mod tests {
    use super::FileBackedManager;
    use crate::manager::TaskManager;
    use crate::model::{Epic, Subtask, Task, TaskStatus};
    use crate::storage::snapshot::HEADER;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};
    use time::Duration;
    use time::macros::datetime;

    fn temp_path(file_name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("tracker-{nanos}-{file_name}"))
    }

    #[test]
    fn open_missing_file_starts_empty() {
        let path = temp_path("fresh.csv");
        let manager = FileBackedManager::open(&path).unwrap();

        assert!(manager.list_tasks().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = FileBackedManager::load(temp_path("absent.csv")).unwrap_err();
        assert_eq!(err.code(), "io_error");
    }

    #[test]
    fn every_mutation_is_written_through() {
        let path = temp_path("write-through.csv");
        let mut manager = FileBackedManager::open(&path).unwrap();

        let task_id = manager
            .create_task(Task::new("write", "", TaskStatus::New))
            .unwrap();
        let after_create = fs::read_to_string(&path).unwrap();

        manager.delete_task_by_id(task_id).unwrap();
        let after_delete = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(after_create.lines().count(), 2);
        assert!(after_create.contains("1,TASK,write,NEW,"));
        assert_eq!(after_delete.trim_end(), HEADER);
    }

    #[test]
    fn reload_restores_state_and_counter() {
        let path = temp_path("reload.csv");
        let mut manager = FileBackedManager::open(&path).unwrap();
        manager
            .create_task(
                Task::new("standalone", "desc, with comma", TaskStatus::InProgress)
                    .scheduled(datetime!(2025-06-02 08:00), Duration::minutes(30)),
            )
            .unwrap();
        let epic_id = manager.create_epic(Epic::new("epic", "")).unwrap();
        manager
            .create_subtask(
                Subtask::new("first", "", TaskStatus::Done, epic_id)
                    .scheduled(datetime!(2025-06-02 10:00), Duration::minutes(60)),
            )
            .unwrap();
        manager
            .create_subtask(Subtask::new("second", "", TaskStatus::New, epic_id))
            .unwrap();
        manager.get_task_by_id(1);

        let mut reloaded = FileBackedManager::load(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(reloaded.list_tasks()[0].description, "desc, with comma");
        let epic = reloaded.get_epic_by_id(epic_id).unwrap();
        assert_eq!(epic.subtask_ids(), &[3, 4]);
        assert_eq!(epic.status(), TaskStatus::InProgress);
        assert_eq!(epic.start_time(), Some(datetime!(2025-06-02 10:00)));
        assert_eq!(epic.end_time(), Some(datetime!(2025-06-02 11:00)));
        assert_eq!(reloaded.prioritized_tasks().len(), 2);
        assert_eq!(reloaded.history().len(), 1);

        let next = reloaded
            .create_task(Task::new("next", "", TaskStatus::New))
            .unwrap();
        assert_eq!(next, 5);
    }

    #[test]
    fn no_op_mutations_leave_file_alone() {
        let path = temp_path("no-op.csv");
        let mut manager = FileBackedManager::open(&path).unwrap();

        assert!(!manager.delete_task_by_id(9).unwrap());
        assert!(
            !manager
                .update_task(Task::with_id(9, "ghost", "", TaskStatus::New))
                .unwrap()
        );
        assert!(!path.exists());
    }

    #[test]
    fn conflicts_are_not_persisted() {
        let path = temp_path("conflict.csv");
        let mut manager = FileBackedManager::open(&path).unwrap();
        manager
            .create_task(
                Task::new("first", "", TaskStatus::New)
                    .scheduled(datetime!(2025-06-02 09:00), Duration::minutes(60)),
            )
            .unwrap();

        let err = manager
            .create_task(
                Task::new("second", "", TaskStatus::New)
                    .scheduled(datetime!(2025-06-02 09:30), Duration::minutes(60)),
            )
            .unwrap_err();
        let content = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).ok();

        assert!(err.is_conflict());
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn unknown_row_type_fails_the_load() {
        let path = temp_path("corrupt.csv");
        fs::write(&path, format!("{HEADER}\n1,STORY,x,NEW,\n")).unwrap();

        let err = FileBackedManager::load(&path).unwrap_err();
        fs::remove_file(&path).ok();

        assert_eq!(err.code(), "invalid_data");
    }

    #[test]
    fn subtask_before_its_epic_still_loads() {
        let path = temp_path("out-of-order.csv");
        let content = format!(
            "{HEADER}\n3,SUBTASK,late,DONE,,2,null,null\n2,EPIC,epic,NEW,\n"
        );
        fs::write(&path, content).unwrap();

        let mut manager = FileBackedManager::load(&path).unwrap();
        fs::remove_file(&path).ok();

        let epic = manager.get_epic_by_id(2).unwrap();
        assert_eq!(epic.subtask_ids(), &[3]);
        assert_eq!(epic.status(), TaskStatus::Done);
    }

    #[test]
    fn failed_write_keeps_memory_and_resyncs_later() {
        let blocker = temp_path("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let mut manager = FileBackedManager::new(blocker.join("tasks.csv"));

        let err = manager
            .create_task(Task::new("kept", "", TaskStatus::New))
            .unwrap_err();
        assert_eq!(err.code(), "io_error");
        assert_eq!(manager.list_tasks().len(), 1);
        fs::remove_file(&blocker).ok();

        manager
            .create_task(Task::new("second", "", TaskStatus::New))
            .unwrap();
        let content = fs::read_to_string(manager.path()).unwrap();
        fs::remove_dir_all(&blocker).ok();

        assert!(content.contains("kept"));
        assert!(content.contains("second"));
    }
}
