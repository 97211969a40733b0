//! The trait tying a Rust type to a named store document.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A whole document persisted under a fixed name.
///
/// The `Default` value is what readers see before the first write, and what
/// recovery falls back to when neither repair nor a backup can restore it.
pub trait Document: Serialize + DeserializeOwned + Default {
    /// Store name, without the `.json` suffix.
    const NAME: &'static str;

    /// The default value as a JSON tree.
    fn default_value() -> serde_json::Value {
        serde_json::to_value(Self::default()).unwrap_or_else(|_| serde_json::json!({}))
    }
}
