//! Type-safe ID wrappers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Macro to generate ID newtypes with common functionality.
macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new random ID.
            pub fn new() -> Self {
                Self(format!("{}-{}", $prefix, Uuid::new_v4()))
            }

            /// Returns the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when `other` is this ID or a unique-looking prefix of it.
            ///
            /// Lets the CLI accept `task-3f2a` instead of the full UUID.
            pub fn matches(&self, other: &str) -> bool {
                other.len() >= $prefix.len() + 2 && self.0.starts_with(other)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(TaskId, "task");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_prefix() {
        let id = TaskId::new();
        assert!(id.as_str().starts_with("task-"));
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }

    #[test]
    fn test_serde_transparent() {
        let id = TaskId::from("task-abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"task-abc\"");
    }

    #[test]
    fn test_matches_prefix() {
        let id = TaskId::from("task-3f2a9c");
        assert!(id.matches("task-3f"));
        assert!(id.matches("task-3f2a9c"));
        assert!(!id.matches("task-"));
        assert!(!id.matches("task-99"));
    }
}
