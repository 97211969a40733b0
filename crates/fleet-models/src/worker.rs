//! Worker status board.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::ids::TaskId;

/// What a worker is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    #[default]
    Idle,
    Working,
    Blocked,
    Done,
    Offline,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Idle => "idle",
            WorkerState::Working => "working",
            WorkerState::Blocked => "blocked",
            WorkerState::Done => "done",
            WorkerState::Offline => "offline",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for WorkerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "idle" => Ok(WorkerState::Idle),
            "working" => Ok(WorkerState::Working),
            "blocked" => Ok(WorkerState::Blocked),
            "done" => Ok(WorkerState::Done),
            "offline" => Ok(WorkerState::Offline),
            other => Err(format!("unknown worker state: {}", other)),
        }
    }
}

/// Last reported status of one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub state: WorkerState,

    /// Task the worker is on, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskId>,

    /// Free-form progress note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub updated_at: DateTime<Utc>,
}

/// The `workers` document: worker id to status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerBoard {
    #[serde(default)]
    pub workers: BTreeMap<String, WorkerStatus>,
}

impl Document for WorkerBoard {
    const NAME: &'static str = "workers";
}

impl WorkerBoard {
    /// Records a status report, replacing the worker's previous one.
    pub fn report(
        &mut self,
        worker: impl Into<String>,
        state: WorkerState,
        task: Option<TaskId>,
        message: Option<String>,
    ) {
        self.workers.insert(
            worker.into(),
            WorkerStatus {
                state,
                task,
                message,
                updated_at: Utc::now(),
            },
        );
    }

    /// Removes a worker. Returns false if it was not on the board.
    pub fn remove(&mut self, worker: &str) -> bool {
        self.workers.remove(worker).is_some()
    }

    /// Workers currently in `state`.
    pub fn in_state(&self, state: WorkerState) -> impl Iterator<Item = &str> {
        self.workers
            .iter()
            .filter(move |(_, s)| s.state == state)
            .map(|(id, _)| id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_replaces_previous() {
        let mut board = WorkerBoard::default();
        board.report("w1", WorkerState::Working, None, Some("starting".into()));
        board.report("w1", WorkerState::Done, None, None);

        assert_eq!(board.workers.len(), 1);
        assert_eq!(board.workers["w1"].state, WorkerState::Done);
        assert!(board.workers["w1"].message.is_none());
    }

    #[test]
    fn test_in_state() {
        let mut board = WorkerBoard::default();
        board.report("a", WorkerState::Working, None, None);
        board.report("b", WorkerState::Idle, None, None);
        board.report("c", WorkerState::Working, None, None);

        let working: Vec<_> = board.in_state(WorkerState::Working).collect();
        assert_eq!(working, vec!["a", "c"]);
    }

    #[test]
    fn test_remove() {
        let mut board = WorkerBoard::default();
        board.report("a", WorkerState::Idle, None, None);
        assert!(board.remove("a"));
        assert!(!board.remove("a"));
    }

    #[test]
    fn test_parse_state() {
        assert_eq!("Working".parse::<WorkerState>().unwrap(), WorkerState::Working);
        assert!("sleeping".parse::<WorkerState>().is_err());
    }

    #[test]
    fn test_default_value_shape() {
        assert_eq!(WorkerBoard::default_value(), serde_json::json!({ "workers": {} }));
    }
}
