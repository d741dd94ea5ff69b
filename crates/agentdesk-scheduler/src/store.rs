//! File-based task store.
//! Tasks are saved as one human-readable JSON document.
//! Only touched on task changes, never on an idle tick.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use agentdesk_core::StoreError;

use crate::tasks::Task;

/// Durable collection of task records keyed by id.
pub trait TaskRecordStore: Send + Sync {
    /// Load every task.
    fn load_all(&self) -> Result<Vec<Task>, StoreError>;

    /// Insert or replace the record with `task.id`.
    fn put(&self, task: &Task) -> Result<(), StoreError>;

    /// Delete a record. Missing ids are not an error.
    fn remove(&self, id: &str) -> Result<(), StoreError>;

    /// Replace the whole collection.
    fn replace_all(&self, tasks: &[Task]) -> Result<(), StoreError>;
}

/// JSON document store (`<dir>/tasks.json`).
pub struct JsonTaskStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl JsonTaskStore {
    /// Create a new task store in the given directory.
    pub fn new(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join("tasks.json"),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<Task>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let json = std::fs::read_to_string(&self.path)?;
        if json.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&json)
            .map_err(|e| StoreError::Serialize(format!("{}: {e}", self.path.display())))
    }

    /// Write to a sibling temp file, then rename over the document.
    fn write(&self, tasks: &[Task]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(tasks)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!("💾 Saved {} tasks to {}", tasks.len(), self.path.display());
        Ok(())
    }
}

impl TaskRecordStore for JsonTaskStore {
    fn load_all(&self) -> Result<Vec<Task>, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read()
    }

    fn put(&self, task: &Task) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut tasks = self.read()?;
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task.clone(),
            None => tasks.push(task.clone()),
        }
        self.write(&tasks)
    }

    fn remove(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut tasks = self.read()?;
        let len = tasks.len();
        tasks.retain(|t| t.id != id);
        if tasks.len() < len {
            self.write(&tasks)?;
        }
        Ok(())
    }

    fn replace_all(&self, tasks: &[Task]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write(tasks)
    }
}

/// Non-durable store, for tests and throwaway schedulers.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<Vec<Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
        }
    }
}

impl TaskRecordStore for MemoryTaskStore {
    fn load_all(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.tasks.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn put(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task.clone(),
            None => tasks.push(task.clone()),
        }
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|t| t.id != id);
        Ok(())
    }

    fn replace_all(&self, tasks: &[Task]) -> Result<(), StoreError> {
        *self.tasks.lock().unwrap_or_else(|e| e.into_inner()) = tasks.to_vec();
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::sample_task;
    use super::*;

    #[test]
    fn test_json_roundtrip_keeps_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonTaskStore::new(dir.path()).unwrap();
        assert!(store.load_all().unwrap().is_empty());

        let task = sample_task("a");
        store.put(&task).unwrap();

        let reopened = JsonTaskStore::new(dir.path()).unwrap();
        assert_eq!(reopened.load_all().unwrap(), vec![task]);
    }

    #[test]
    fn test_json_put_updates_in_place_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonTaskStore::new(dir.path()).unwrap();
        store.put(&sample_task("a")).unwrap();
        store.put(&sample_task("b")).unwrap();

        let mut a = sample_task("a");
        a.execution_count = 5;
        store.put(&a).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "a");
        assert_eq!(loaded[0].execution_count, 5);

        store.remove("a").unwrap();
        store.remove("missing").unwrap();
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "b");
    }

    #[test]
    fn test_json_corrupt_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tasks.json"), "{not json").unwrap();
        let store = JsonTaskStore::new(dir.path()).unwrap();
        assert!(matches!(store.load_all(), Err(StoreError::Serialize(_))));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryTaskStore::new();
        store.put(&sample_task("a")).unwrap();
        store.replace_all(&[sample_task("b"), sample_task("c")]).unwrap();
        let ids: Vec<String> = store.load_all().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }
}
