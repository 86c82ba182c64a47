//! Task records and the persistence-backed task store.

mod persist;
mod store;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use persist::{KeyValueStore, SqliteKv};
pub use store::TaskStore;

/// Opaque task identifier: milliseconds since the Unix epoch at creation,
/// bumped past the largest existing id when two tasks share a millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A single todo item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
  pub id: TaskId,
  pub title: String,
  pub description: String,
  pub completed: bool,
}
