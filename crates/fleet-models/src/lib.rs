//! Typed documents shared between Fleet workers.
//!
//! Every type here is a whole document in the state store: it has a fixed
//! store name (see [`Document`]) and a `Default` that doubles as the empty
//! structure handed out when a document is missing or unrecoverable.

pub mod document;
pub mod ids;
pub mod project;
pub mod task;
pub mod worker;

pub use document::Document;
pub use ids::TaskId;
pub use project::ProjectConfig;
pub use task::{Task, TaskList, TaskStatus};
pub use worker::{WorkerBoard, WorkerState, WorkerStatus};
