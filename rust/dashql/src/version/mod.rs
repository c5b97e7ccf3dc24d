//! Dashboard schema versions.
//!
//! A persisted dashboard is untyped JSON of unknown vintage. The engine works
//! out which [`SchemaVersion`] it satisfies, either from its `version` tag or
//! by probing each known version newest-first, and brings it up to the
//! current version in place.

mod v1;
mod v2;

pub use v1::VersionOne;
pub use v2::VersionTwo;

use crate::{
    error::{Error, Result},
    model::DashboardModel,
};
use serde_json::Value;
use tracing::{debug, info, warn};

pub const VERSION_FIELD: &str = "version";

/// One known document shape.
///
/// `verify` runs against arbitrary untrusted documents and must be a cheap,
/// read-only structural check. `update` normalizes any older shape this
/// version accepts into its own.
pub trait SchemaVersion: Send + Sync {
    fn version(&self) -> &str;
    fn verify(&self, doc: &Value) -> bool;
    fn update(&self, doc: &mut Value) -> Result<()>;
}

impl std::fmt::Debug for dyn SchemaVersion + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaVersion")
            .field("version", &self.version())
            .finish()
    }
}

pub struct VersionEngine {
    /// Newest first.
    versions: Vec<Box<dyn SchemaVersion>>,
    current: usize,
}

impl std::fmt::Debug for VersionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionEngine")
            .field("versions", &self.tags().collect::<Vec<_>>())
            .field("current", &self.current().version())
            .finish()
    }
}

impl Default for VersionEngine {
    fn default() -> Self {
        Self::standard()
    }
}

impl VersionEngine {
    /// `versions` must be ordered newest first and contain `current_tag`.
    pub fn new(versions: Vec<Box<dyn SchemaVersion>>, current_tag: &str) -> Result<Self> {
        let current = versions
            .iter()
            .position(|version| version.version() == current_tag)
            .ok_or_else(|| {
                Error::Config(format!(
                    "current schema version '{current_tag}' is not registered"
                ))
            })?;

        Ok(Self { versions, current })
    }

    /// Every version this crate knows about, with the newest as current.
    pub fn standard() -> Self {
        Self {
            versions: vec![Box::new(VersionTwo), Box::new(VersionOne)],
            current: 0,
        }
    }

    pub fn current(&self) -> &dyn SchemaVersion {
        self.versions[self.current].as_ref()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.versions.iter().map(|version| version.version())
    }

    pub fn get_dashboard_version(&self, doc: &Value) -> Result<&dyn SchemaVersion> {
        if let Some(tag) = version_tag(doc) {
            let version = self
                .versions
                .iter()
                .find(|version| version.version() == tag)
                .ok_or_else(|| {
                    warn!(version = %tag, "dashboard names an unknown schema version");
                    Error::VersionNotFound(tag.clone())
                })?;

            if !version.verify(doc) {
                warn!(version = %tag, "dashboard fails verification for its own version");
                return Err(Error::InvalidVersion(tag));
            }
            return Ok(version.as_ref());
        }

        match self.versions.iter().find(|version| version.verify(doc)) {
            Some(version) => {
                debug!(version = version.version(), "detected untagged dashboard version");
                Ok(version.as_ref())
            }
            None => {
                warn!("document matches no known dashboard schema");
                Err(Error::UnrecognizedDashboard)
            }
        }
    }

    /// Upgrades `doc` to the current version. Returns whether it changed.
    pub fn verify_and_update_model(&self, doc: &mut Value) -> Result<bool> {
        let tagged = version_tag(doc).is_some();
        let detected = self.get_dashboard_version(doc)?.version().to_string();
        let current = self.current();

        if tagged && detected == current.version() {
            return Ok(false);
        }

        info!(
            from = %detected,
            to = current.version(),
            tagged,
            "upgrading dashboard schema"
        );
        // `doc` is only replaced once the whole upgrade has succeeded.
        let mut upgraded = doc.clone();
        current.update(&mut upgraded)?;

        let object = upgraded
            .as_object_mut()
            .ok_or_else(|| Error::InvalidData("dashboard document must be an object".into()))?;
        object.insert(
            VERSION_FIELD.to_string(),
            Value::String(current.version().to_string()),
        );
        *doc = upgraded;
        Ok(true)
    }
}

/// Normalizes `doc` with `engine` and reads it as the current model.
pub fn load_dashboard(engine: &VersionEngine, mut doc: Value) -> Result<DashboardModel> {
    engine.verify_and_update_model(&mut doc)?;
    Ok(serde_json::from_value(doc)?)
}

/// The explicit tag, if any. Numeric tags are accepted as their decimal text.
fn version_tag(doc: &Value) -> Option<String> {
    match doc.get(VERSION_FIELD)? {
        Value::String(tag) if !tag.trim().is_empty() => Some(tag.trim().to_string()),
        Value::Number(tag) => Some(tag.to_string()),
        Value::Bool(tag) => Some(tag.to_string()),
        _ => None,
    }
}

/// Containers are tagged `"type": "container"`; untagged nodes with a
/// `children` list and no datasource predate the tag.
pub(crate) fn is_container(node: &Value) -> bool {
    match node.get("type").and_then(Value::as_str) {
        Some(kind) => kind == "container",
        None => {
            node.get("children").map_or(false, Value::is_array) && node.get("datasource").is_none()
        }
    }
}

/// Overlays `patch` onto `target`, recursing into objects present in both.
pub(crate) fn merge_json(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                let nested = value.is_object() && target.get(&key).map_or(false, Value::is_object);
                if !nested {
                    target.insert(key, value);
                } else if let Some(existing) = target.get_mut(&key) {
                    merge_json(existing, value);
                }
            }
        }
        (target, patch) => *target = patch,
    }
}
