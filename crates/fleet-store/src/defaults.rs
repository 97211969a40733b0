//! Empty structures handed out for documents that cannot be read.

use std::collections::HashMap;

use fleet_models::{Document, ProjectConfig, TaskList, WorkerBoard};
use serde_json::{json, Value};

use crate::layout::DocumentName;

/// The default for `name`: a configured override, else the typed document's
/// `Default`, else an empty object.
pub fn default_document(overrides: &HashMap<String, Value>, name: &DocumentName) -> Value {
    if let Some(value) = overrides.get(name.as_str()) {
        return value.clone();
    }

    let known: [(&str, fn() -> Value); 3] = [
        (TaskList::NAME, TaskList::default_value),
        (WorkerBoard::NAME, WorkerBoard::default_value),
        (ProjectConfig::NAME, ProjectConfig::default_value),
    ];
    known
        .iter()
        .find(|(known_name, _)| *known_name == name.as_str())
        .map(|(_, make)| make())
        .unwrap_or_else(|| json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> DocumentName {
        DocumentName::parse(s).unwrap()
    }

    #[test]
    fn test_typed_defaults() {
        let none = HashMap::new();
        assert_eq!(default_document(&none, &name("tasks")), json!({ "tasks": [] }));
        assert_eq!(default_document(&none, &name("workers.json")), json!({ "workers": {} }));
        assert_eq!(default_document(&none, &name("project")), json!({ "settings": {} }));
        assert_eq!(default_document(&none, &name("anything")), json!({}));
    }

    #[test]
    fn test_override_wins() {
        let mut overrides = HashMap::new();
        overrides.insert("tasks".to_string(), json!([]));
        assert_eq!(default_document(&overrides, &name("tasks")), json!([]));
    }
}
