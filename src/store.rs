//! Task store: an explicit handle over an injected persistence gateway
//!
//! Each owner's collection lives under `"{prefix}:{owner}"`. Every mutation
//! is a load, an engine transformation, and a save of the whole collection.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};

use crate::db::PersistenceGateway;
use crate::engine;
use crate::error::{Result, TaskError};
use crate::models::{
    NewTask, Priority, StatusFilter, Task, TaskCollection, TaskId, TaskStatistics, UpdateTask,
};

pub struct TaskStore {
    gateway: Arc<dyn PersistenceGateway>,
    prefix: String,
    /// Serializes load-modify-save cycles
    write_lock: Mutex<()>,
}

impl TaskStore {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, prefix: impl Into<String>) -> Self {
        Self {
            gateway,
            prefix: prefix.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn key_for(&self, owner: &str) -> String {
        format!("{}:{}", self.prefix, owner)
    }

    fn load(&self, owner: &str) -> Result<TaskCollection> {
        match self.gateway.load(&self.key_for(owner)) {
            Ok(collection) => Ok(collection),
            Err(TaskError::NotFound(_)) => Ok(TaskCollection::default()),
            Err(err) => Err(err),
        }
    }

    fn exclusive(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| TaskError::Storage("store lock poisoned".to_string()))
    }

    /// Run `f` against the owner's collection and persist the result.
    ///
    /// Nothing is saved when `f` fails.
    fn mutate<T>(
        &self,
        owner: &str,
        f: impl FnOnce(&mut TaskCollection) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.exclusive()?;
        let mut collection = self.load(owner)?;
        let out = f(&mut collection)?;
        self.gateway.save(&self.key_for(owner), &collection)?;
        Ok(out)
    }

    /// All tasks in insertion order, optionally filtered and display-sorted
    pub fn list(&self, owner: &str, status: StatusFilter, sorted: bool) -> Result<Vec<Task>> {
        let collection = self.load(owner)?;
        let tasks = engine::filter_by_status(&collection.tasks, status);
        Ok(if sorted {
            engine::sort_for_display(&tasks)
        } else {
            tasks
        })
    }

    pub fn get(&self, owner: &str, id: TaskId) -> Result<Task> {
        self.load(owner)?
            .tasks
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| missing(id))
    }

    pub fn create(&self, owner: &str, request: NewTask) -> Result<Task> {
        let task = self.mutate(owner, |collection| {
            // Validate before consuming an id
            let task = engine::create_task(collection.next_id, request, Utc::now())?;
            collection.allocate_id();
            collection.tasks.push(task.clone());
            Ok(task)
        })?;

        tracing::info!(owner, id = task.id, "Task created");
        Ok(task)
    }

    /// Apply an edit; a requested completion state that differs from the
    /// stored one is reached by toggling
    pub fn update(&self, owner: &str, id: TaskId, update: &UpdateTask) -> Result<Task> {
        let task = self.replace(owner, id, |task| {
            let edited = engine::apply_edit(task, &update.patch)?;
            Ok(match update.completed {
                Some(completed) if completed != edited.completed => {
                    engine::toggle_completion(&edited)
                }
                _ => edited,
            })
        })?;
        tracing::info!(owner, id, completed = task.completed, "Task updated");
        Ok(task)
    }

    pub fn toggle(&self, owner: &str, id: TaskId) -> Result<Task> {
        let task = self.replace(owner, id, |task| Ok(engine::toggle_completion(task)))?;
        tracing::info!(owner, id, completed = task.completed, "Task toggled");
        Ok(task)
    }

    fn replace(
        &self,
        owner: &str,
        id: TaskId,
        edit: impl FnOnce(&Task) -> Result<Task>,
    ) -> Result<Task> {
        self.mutate(owner, |collection| {
            let index = collection.position(id).ok_or_else(|| missing(id))?;
            let mut task = edit(&collection.tasks[index])?;
            task.updated_at = Utc::now();
            collection.tasks[index] = task.clone();
            Ok(task)
        })
    }

    pub fn delete(&self, owner: &str, id: TaskId) -> Result<()> {
        self.mutate(owner, |collection| {
            let index = collection.position(id).ok_or_else(|| missing(id))?;
            collection.tasks.remove(index);
            Ok(())
        })?;

        tracing::info!(owner, id, "Task deleted");
        Ok(())
    }

    pub fn statistics(&self, owner: &str) -> Result<TaskStatistics> {
        Ok(engine::compute_statistics(&self.load(owner)?.tasks))
    }

    pub fn by_date(&self, owner: &str, date: NaiveDate) -> Result<Vec<Task>> {
        Ok(engine::filter_by_due_date(&self.load(owner)?.tasks, date))
    }

    pub fn by_priority(&self, owner: &str, priority: Priority) -> Result<Vec<Task>> {
        Ok(engine::filter_by_priority(&self.load(owner)?.tasks, priority))
    }

    pub fn by_category(&self, owner: &str, category: &str) -> Result<Vec<Task>> {
        Ok(engine::filter_by_category(&self.load(owner)?.tasks, category))
    }
}

fn missing(id: TaskId) -> TaskError {
    TaskError::not_found(format!("task {id}"))
}
