use super::{is_container, merge_json, v1, SchemaVersion, VersionOne};
use crate::{
    error::Result,
    model::QueryConfigModel,
    parser::parse_legacy_querystring,
};
use serde_json::{Map, Value};
use tracing::debug;

/// Widgets carry a structured `datasource.config`; legacy querystrings are
/// folded into it.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionTwo;

impl SchemaVersion for VersionTwo {
    fn version(&self) -> &str {
        "2"
    }

    fn verify(&self, doc: &Value) -> bool {
        VersionOne.verify(doc)
            && v1::widgets(doc).into_iter().all(|widget| {
                let datasource = &widget["datasource"];
                datasource["config"].is_object() && datasource.get("querystring").is_none()
            })
    }

    fn update(&self, doc: &mut Value) -> Result<()> {
        VersionOne.update(doc)?;

        if let Some(containers) = doc.get_mut("children").and_then(Value::as_array_mut) {
            for container in containers.iter_mut() {
                upgrade_node(container, true)?;
            }
        }
        Ok(())
    }
}

fn upgrade_node(node: &mut Value, top_level: bool) -> Result<()> {
    let container = top_level || is_container(node);
    let Some(object) = node.as_object_mut() else {
        return Ok(());
    };

    let kind = if container { "container" } else { "chart" };
    object
        .entry("type")
        .or_insert_with(|| Value::String(kind.to_string()));

    if !container {
        return upgrade_datasource(object);
    }

    if let Some(children) = object.get_mut("children").and_then(Value::as_array_mut) {
        for child in children.iter_mut() {
            upgrade_node(child, false)?;
        }
    }
    Ok(())
}

fn upgrade_datasource(widget: &mut Map<String, Value>) -> Result<()> {
    let datasource = widget
        .entry("datasource")
        .or_insert_with(|| Value::Object(Map::new()));
    if !datasource.is_object() {
        *datasource = Value::Object(Map::new());
    }
    let Some(datasource) = datasource.as_object_mut() else {
        return Ok(());
    };

    datasource
        .entry("custom_query")
        .or_insert(Value::Bool(false));

    if datasource.get("config").map_or(true, |config| !config.is_object()) {
        datasource.insert(
            "config".to_string(),
            serde_json::to_value(QueryConfigModel::default())?,
        );
    }

    let patch = match datasource.get("querystring").and_then(Value::as_str) {
        Some(querystring) if !querystring.trim().is_empty() => {
            debug!(querystring, "merging legacy querystring into widget config");
            Some(parse_legacy_querystring(querystring)?)
        }
        _ => None,
    };
    datasource.remove("querystring");
    if let (Some(patch), Some(config)) = (patch, datasource.get_mut("config")) {
        merge_json(config, patch);
    }

    let has_query = datasource
        .get("query")
        .and_then(Value::as_str)
        .map_or(false, |query| !query.trim().is_empty());
    if has_query {
        datasource.insert("custom_query".to_string(), Value::Bool(true));
    }

    Ok(())
}
