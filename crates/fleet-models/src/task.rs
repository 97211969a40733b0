//! Task list shared by workers.
//!
//! Tasks are kept in insertion order; workers claim pending tasks and mark
//! them completed. The whole list is one document, so every change goes
//! through a single locked read-modify-write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::ids::TaskId;

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for a worker.
    #[default]
    Pending,
    /// Claimed by a worker.
    InProgress,
    /// Cannot proceed.
    Blocked,
    /// Finished.
    Completed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// A single unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub status: TaskStatus,

    /// Worker that claimed the task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a pending task.
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            title: title.into(),
            status: TaskStatus::Pending,
            assignee: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// The `tasks` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskList {
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Document for TaskList {
    const NAME: &'static str = "tasks";
}

impl TaskList {
    /// Appends a new pending task and returns its ID.
    pub fn add(&mut self, title: impl Into<String>) -> TaskId {
        let task = Task::new(title);
        let id = task.id.clone();
        self.tasks.push(task);
        id
    }

    /// Finds a task by full ID or unique prefix.
    pub fn find(&self, id: &str) -> Option<&Task> {
        let mut hits = self.tasks.iter().filter(|t| t.id.matches(id));
        match (hits.next(), hits.next()) {
            (Some(task), None) => Some(task),
            _ => None,
        }
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Task> {
        let index = self.find(id).map(|t| t.id.clone())?;
        self.tasks.iter_mut().find(|t| t.id == index)
    }

    /// Assigns a pending task to `worker`.
    ///
    /// Returns false if the task is unknown or not pending.
    pub fn claim(&mut self, id: &str, worker: &str) -> bool {
        match self.find_mut(id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.status = TaskStatus::InProgress;
                task.assignee = Some(worker.to_string());
                task.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Marks a task completed. Returns false if the task is unknown.
    pub fn complete(&mut self, id: &str) -> bool {
        match self.find_mut(id) {
            Some(task) => {
                let now = Utc::now();
                task.status = TaskStatus::Completed;
                task.updated_at = now;
                task.completed_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Pending tasks in insertion order.
    pub fn pending(&self) -> impl Iterator<Item = &Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
    }
}
