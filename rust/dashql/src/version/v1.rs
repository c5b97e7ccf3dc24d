use super::{is_container, SchemaVersion};
use crate::error::{Error, Result};
use serde_json::Value;

/// The original layout: a list of containers, each holding widgets whose
/// datasource may still carry a legacy `querystring`.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionOne;

impl SchemaVersion for VersionOne {
    fn version(&self) -> &str {
        "1"
    }

    fn verify(&self, doc: &Value) -> bool {
        match doc.get("children").and_then(Value::as_array) {
            Some(containers) => containers.iter().all(container_shape),
            None => false,
        }
    }

    fn update(&self, doc: &mut Value) -> Result<()> {
        let object = doc
            .as_object_mut()
            .ok_or_else(|| Error::InvalidData("dashboard document must be an object".into()))?;
        let children = object
            .entry("children")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Some(containers) = children.as_array_mut() {
            for container in containers.iter_mut().filter_map(Value::as_object_mut) {
                container
                    .entry("children")
                    .or_insert_with(|| Value::Array(Vec::new()));
            }
        }
        Ok(())
    }
}

fn container_shape(node: &Value) -> bool {
    node.is_object() && node.get("children").map_or(false, Value::is_array)
}

/// Every non-container node below `doc`'s containers, depth first.
pub(super) fn widgets(doc: &Value) -> Vec<&Value> {
    fn walk<'a>(nodes: &'a [Value], out: &mut Vec<&'a Value>) {
        for node in nodes {
            if is_container(node) {
                if let Some(children) = node.get("children").and_then(Value::as_array) {
                    walk(children, out);
                }
            } else {
                out.push(node);
            }
        }
    }

    let mut out = Vec::new();
    if let Some(containers) = doc.get("children").and_then(Value::as_array) {
        for container in containers {
            if let Some(children) = container.get("children").and_then(Value::as_array) {
                walk(children, &mut out);
            }
        }
    }
    out
}
