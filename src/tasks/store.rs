use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashSet;
use tracing::{debug, error};

use super::persist::KeyValueStore;
use super::{Task, TaskId};
use crate::notify::{Notification, Notifier};

/// Key the task snapshot is stored under
pub const SNAPSHOT_KEY: &str = "tasks";

/// In-memory task list mirrored to a key-value store after every mutation.
///
/// Every mutation writes the whole list as one JSON snapshot. A failed write
/// is reported through the notifier and does not undo the mutation.
pub struct TaskStore<K: KeyValueStore, N: Notifier> {
  tasks: Vec<Task>,
  kv: K,
  notifier: N,
}

impl<K: KeyValueStore, N: Notifier> TaskStore<K, N> {
  /// Load the snapshot from `kv`, starting empty if none was saved yet.
  ///
  /// A snapshot that cannot be parsed is an error rather than an empty list,
  /// so the next write cannot clobber it.
  pub fn load(kv: K, notifier: N) -> Result<Self> {
    let tasks = match kv.get(SNAPSHOT_KEY)? {
      Some(snapshot) => serde_json::from_str(&snapshot)
        .map_err(|e| eyre!("Failed to parse saved tasks: {}", e))?,
      None => Vec::new(),
    };

    Ok(Self {
      tasks,
      kv,
      notifier,
    })
  }

  pub fn tasks(&self) -> &[Task] {
    &self.tasks
  }

  pub fn get(&self, id: TaskId) -> Option<&Task> {
    self.tasks.iter().find(|t| t.id == id)
  }

  pub fn len(&self) -> usize {
    self.tasks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
  }

  /// Append a new task. Blank titles are ignored silently.
  pub fn add(&mut self, title: &str, description: &str) -> Option<TaskId> {
    let title = title.trim();
    if title.is_empty() {
      return None;
    }

    let id = self.next_id();
    self.tasks.push(Task {
      id,
      title: title.to_string(),
      description: description.to_string(),
      completed: false,
    });
    debug!(%id, "Task added");

    self.notifier.notify(Notification::new(
      "Task Added",
      format!("A new task \"{}\" has been added.", title),
    ));
    self.persist();

    Some(id)
  }

  /// Replace the title and description of a task, keeping its completion state.
  pub fn update(&mut self, id: TaskId, title: &str, description: &str) -> bool {
    let title = title.trim();
    if title.is_empty() {
      return false;
    }

    let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
      return false;
    };
    task.title = title.to_string();
    task.description = description.to_string();
    debug!(%id, "Task updated");

    self.notifier.notify(Notification::new(
      "Task Updated",
      format!("The task \"{}\" has been updated.", title),
    ));
    self.persist();

    true
  }

  /// Remove a task, returning it if it existed.
  pub fn delete(&mut self, id: TaskId) -> Option<Task> {
    let index = self.tasks.iter().position(|t| t.id == id)?;
    let task = self.tasks.remove(index);
    debug!(%id, "Task deleted");

    self.notifier.notify(Notification::new(
      "Task Deleted",
      format!("The task \"{}\" has been deleted.", task.title),
    ));
    self.persist();

    Some(task)
  }

  /// Flip the completion flag, returning the new value.
  pub fn toggle_complete(&mut self, id: TaskId) -> Option<bool> {
    let task = self.tasks.iter_mut().find(|t| t.id == id)?;
    task.completed = !task.completed;
    let completed = task.completed;

    self.persist();
    Some(completed)
  }

  fn next_id(&self) -> TaskId {
    let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
    match self.tasks.iter().map(|t| t.id.0).max() {
      Some(last) if last >= now => match last.checked_add(1) {
        Some(next) => TaskId(next),
        None => self.first_free_id(now),
      },
      _ => TaskId(now),
    }
  }

  /// Lowest unused id at or after `start`, wrapping around to 0.
  fn first_free_id(&self, start: u64) -> TaskId {
    let used: HashSet<u64> = self.tasks.iter().map(|t| t.id.0).collect();
    (start..=u64::MAX)
      .chain(0..start)
      .find(|id| !used.contains(id))
      .map_or(TaskId(start), TaskId)
  }

  fn persist(&self) {
    let result = serde_json::to_string(&self.tasks)
      .map_err(|e| eyre!("Failed to serialize tasks: {}", e))
      .and_then(|snapshot| self.kv.set(SNAPSHOT_KEY, &snapshot));

    if let Err(e) = result {
      error!(error = %e, "Failed to save tasks");
      self.notifier.notify(Notification::destructive(
        "Save Failed",
        "Failed to save tasks. Please try again.",
      ));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::notify::Variant;
  use crate::tasks::SqliteKv;
  use std::cell::Cell;
  use std::sync::{Arc, Mutex};

  #[derive(Clone, Default)]
  struct Recorder(Arc<Mutex<Vec<Notification>>>);

  impl Recorder {
    fn taken(&self) -> Vec<Notification> {
      std::mem::take(&mut *self.0.lock().unwrap())
    }
  }

  impl Notifier for Recorder {
    fn notify(&self, notification: Notification) {
      self.0.lock().unwrap().push(notification);
    }
  }

  /// Store whose writes fail on demand, like a full browser storage quota
  #[derive(Default)]
  struct QuotaKv {
    full: Cell<bool>,
    value: std::cell::RefCell<Option<String>>,
  }

  impl KeyValueStore for QuotaKv {
    fn get(&self, _key: &str) -> Result<Option<String>> {
      Ok(self.value.borrow().clone())
    }

    fn set(&self, _key: &str, value: &str) -> Result<()> {
      if self.full.get() {
        return Err(eyre!("quota exceeded"));
      }
      *self.value.borrow_mut() = Some(value.to_string());
      Ok(())
    }
  }

  fn store() -> (TaskStore<SqliteKv, Recorder>, Recorder) {
    let recorder = Recorder::default();
    let store = TaskStore::load(SqliteKv::open_in_memory().unwrap(), recorder.clone()).unwrap();
    (store, recorder)
  }

  #[test]
  fn test_add_appends_incomplete_task() {
    let (mut store, recorder) = store();
    let id = store.add("Buy milk", "2 litres").unwrap();

    assert_eq!(store.len(), 1);
    let task = store.get(id).unwrap();
    assert_eq!(task.title, "Buy milk");
    assert_eq!(task.description, "2 litres");
    assert!(!task.completed);

    let notes = recorder.taken();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Task Added");
    assert_eq!(notes[0].description, "A new task \"Buy milk\" has been added.");
  }

  #[test]
  fn test_add_blank_title_is_ignored() {
    let (mut store, recorder) = store();
    for title in ["", " ", "\t\n  "] {
      assert_eq!(store.add(title, "description"), None);
    }
    assert!(store.is_empty());
    assert!(recorder.taken().is_empty());
  }

  #[test]
  fn test_add_trims_title() {
    let (mut store, _) = store();
    let id = store.add("  Walk dog ", "").unwrap();
    assert_eq!(store.get(id).unwrap().title, "Walk dog");
  }

  #[test]
  fn test_ids_are_unique_and_increasing() {
    let (mut store, _) = store();
    let ids: Vec<TaskId> = (0..50)
      .map(|i| store.add(&format!("task {}", i), "").unwrap())
      .collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
  }

  #[test]
  fn test_id_after_largest_possible_id_is_unique() {
    let kv = SqliteKv::open_in_memory().unwrap();
    kv.set(
      SNAPSHOT_KEY,
      r#"[{"id":18446744073709551615,"title":"Last","description":"","completed":false}]"#,
    )
    .unwrap();

    let mut store = TaskStore::load(&kv, Recorder::default()).unwrap();
    let a = store.add("After", "").unwrap();
    let b = store.add("Again", "").unwrap();
    assert_ne!(a, TaskId(u64::MAX));
    assert_ne!(b, TaskId(u64::MAX));
    assert_ne!(a, b);
    assert_eq!(store.len(), 3);
  }

  #[test]
  fn test_update_keeps_completion() {
    let (mut store, recorder) = store();
    let id = store.add("Draft", "").unwrap();
    store.toggle_complete(id);
    recorder.taken();

    assert!(store.update(id, "Final", "reviewed"));
    let task = store.get(id).unwrap();
    assert_eq!(task.title, "Final");
    assert_eq!(task.description, "reviewed");
    assert!(task.completed);

    let notes = recorder.taken();
    assert_eq!(notes[0].title, "Task Updated");
    assert_eq!(notes[0].description, "The task \"Final\" has been updated.");
  }

  #[test]
  fn test_update_unknown_or_blank_is_noop() {
    let (mut store, recorder) = store();
    let id = store.add("Keep", "").unwrap();
    recorder.taken();

    assert!(!store.update(TaskId(1), "Other", ""));
    assert!(!store.update(id, "   ", "x"));
    assert_eq!(store.get(id).unwrap().title, "Keep");
    assert!(recorder.taken().is_empty());
  }

  #[test]
  fn test_toggle_twice_restores_state() {
    let (mut store, recorder) = store();
    let id = store.add("Flip", "").unwrap();
    recorder.taken();

    assert_eq!(store.toggle_complete(id), Some(true));
    assert_eq!(store.toggle_complete(id), Some(false));
    assert!(!store.get(id).unwrap().completed);
    assert_eq!(store.toggle_complete(TaskId(7)), None);
    assert!(recorder.taken().is_empty());
  }

  #[test]
  fn test_delete_is_idempotent() {
    let (mut store, recorder) = store();
    let keep = store.add("Keep", "").unwrap();
    let gone = store.add("Gone", "").unwrap();
    recorder.taken();

    let removed = store.delete(gone).unwrap();
    assert_eq!(removed.title, "Gone");
    assert!(store.delete(gone).is_none());
    assert_eq!(store.len(), 1);
    assert!(store.get(keep).is_some());

    let notes = recorder.taken();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].description, "The task \"Gone\" has been deleted.");
  }

  #[test]
  fn test_snapshot_round_trip() {
    let kv = SqliteKv::open_in_memory().unwrap();
    let expected = {
      let mut store = TaskStore::load(&kv, Recorder::default()).unwrap();
      let a = store.add("First", "with \"quotes\" and ünïcode").unwrap();
      store.add("Second", "").unwrap();
      store.add("Third", "line\nbreak").unwrap();
      store.toggle_complete(a);
      store.tasks().to_vec()
    };

    let reloaded = TaskStore::load(&kv, Recorder::default()).unwrap();
    assert_eq!(reloaded.tasks(), expected.as_slice());
  }

  #[test]
  fn test_snapshot_format() {
    let kv = SqliteKv::open_in_memory().unwrap();
    kv.set(
      SNAPSHOT_KEY,
      r#"[{"id":1700000000000,"title":"Old","description":"","completed":true,"synced":false}]"#,
    )
    .unwrap();

    let mut store = TaskStore::load(&kv, Recorder::default()).unwrap();
    assert_eq!(store.tasks()[0].id, TaskId(1_700_000_000_000));
    assert!(store.tasks()[0].completed);

    store.toggle_complete(TaskId(1_700_000_000_000));
    let saved: serde_json::Value =
      serde_json::from_str(&kv.get(SNAPSHOT_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(
      saved,
      serde_json::json!([{"id": 1700000000000u64, "title": "Old", "description": "", "completed": false}])
    );
  }

  #[test]
  fn test_corrupt_snapshot_refuses_to_load() {
    let kv = SqliteKv::open_in_memory().unwrap();
    kv.set(SNAPSHOT_KEY, "{not json").unwrap();
    assert!(TaskStore::load(&kv, Recorder::default()).is_err());
  }

  #[test]
  fn test_write_failure_keeps_mutation_and_notifies() {
    let kv = QuotaKv::default();
    let recorder = Recorder::default();
    let mut store = TaskStore::load(&kv, recorder.clone()).unwrap();
    kv.full.set(true);

    let id = store.add("Unsaved", "").unwrap();
    assert!(store.get(id).is_some());

    let notes = recorder.taken();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0].title, "Task Added");
    assert_eq!(notes[1].title, "Save Failed");
    assert_eq!(notes[1].variant, Variant::Destructive);
    assert!(kv.value.borrow().is_none());

    kv.full.set(false);
    store.toggle_complete(id);
    assert!(kv.value.borrow().as_deref().unwrap().contains("Unsaved"));
  }
}
