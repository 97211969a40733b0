//! Project configuration shared by every worker on a project.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;

/// The `project` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Filesystem root of the project.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,

    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
}

impl Document for ProjectConfig {
    const NAME: &'static str = "project";
}

impl ProjectConfig {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Sets a setting, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.settings.insert(key.into(), value)
    }

    pub fn unset(&mut self, key: &str) -> Option<Value> {
        self.settings.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_unset() {
        let mut config = ProjectConfig::default();
        assert!(config.set("max_workers", json!(4)).is_none());
        assert_eq!(config.get("max_workers"), Some(&json!(4)));
        assert_eq!(config.set("max_workers", json!(8)), Some(json!(4)));
        assert_eq!(config.unset("max_workers"), Some(json!(8)));
        assert!(config.get("max_workers").is_none());
    }

    #[test]
    fn test_default_value_shape() {
        assert_eq!(ProjectConfig::default_value(), json!({ "settings": {} }));
    }
}
