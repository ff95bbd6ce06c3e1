use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A skeleton descriptor as an opaque JSON tree.
///
/// The descriptor format is owned by the animation tool, not by us, so no
/// schema is imposed. Exactly two fields are touched: `skeleton.spine` is
/// read and `skeleton.images` is written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SkeletonDoc(Value);

impl SkeletonDoc {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        Ok(Self(serde_json::from_str(text)?))
    }

    /// The authoring-tool version string (`skeleton.spine`), if present.
    pub fn spine_version(&self) -> Option<&str> {
        self.0.get("skeleton")?.get("spine")?.as_str()
    }

    /// Sets `skeleton.images`, creating intermediate objects as needed. The
    /// field is always overwritten before hand-off; the concrete value is
    /// the persistence layer's policy.
    pub fn set_images_path(&mut self, path: &str) {
        if !self.0.is_object() {
            self.0 = Value::Object(serde_json::Map::new());
        }
        if let Some(root) = self.0.as_object_mut() {
            let skeleton = root
                .entry("skeleton")
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if !skeleton.is_object() {
                *skeleton = Value::Object(serde_json::Map::new());
            }
            if let Some(obj) = skeleton.as_object_mut() {
                obj.insert("images".to_string(), Value::String(path.to_string()));
            }
        }
    }

    /// The relative image path (`skeleton.images`), if present.
    pub fn images_path(&self) -> Option<&str> {
        self.0.get("skeleton")?.get("images")?.as_str()
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for SkeletonDoc {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Normalizes an authoring-tool version string to the one the launcher
/// accepts.
///
/// Migrated assets carry `<new>-from-<old>`; the segment after the first
/// marker is the version the asset is actually usable at. Anything without
/// the marker passes through unchanged.
pub fn normalize_spine_version(version: &str) -> &str {
    version.split("-from-").nth(1).unwrap_or(version)
}
