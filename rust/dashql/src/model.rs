//! Persisted dashboard and widget query configuration.

use crate::{
    error::{Error, Result},
    time::{DateFilter, DateFilterType, DateGroup},
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

pub const DEFAULT_MEASURE: &str = "99%";
pub const DEFAULT_ROW_LIMIT: u32 = 100;

/// Declarative description of one widget's query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfigModel {
    pub filters: QueryFilters,
    pub results: QueryResults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryFilters {
    pub start_date: Option<DateFilter>,
    pub end_date: Option<DateFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runby: Option<String>,
    /// `None` applies no filter on the official flag.
    #[serde(deserialize_with = "deserialize_official")]
    pub official: Option<bool>,
    pub metadata: Vec<MetadataFilter>,
}

impl Default for QueryFilters {
    fn default() -> Self {
        Self {
            start_date: Some(DateFilter::relative(DateFilterType::Week, 2)),
            end_date: None,
            product_name: None,
            test: None,
            metric: None,
            runby: None,
            official: Some(true),
            metadata: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryResults {
    pub fields: Vec<FieldResult>,
    pub measures: Vec<MeasureResult>,
    pub labels: Vec<LabelResult>,
    pub show_date: bool,
    pub date_group: DateGroup,
    /// Aggregate `measures` when set; otherwise select raw values.
    pub measure_values: bool,
    pub row_limit: Option<u32>,
}

impl Default for QueryResults {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            measures: vec![MeasureResult::new(DEFAULT_MEASURE)],
            labels: Vec::new(),
            show_date: true,
            date_group: DateGroup::Day,
            measure_values: true,
            row_limit: Some(DEFAULT_ROW_LIMIT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldResult {
    pub name: String,
}

impl FieldResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureResult {
    pub name: String,
}

impl MeasureResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelResult {
    pub label: String,
}

impl LabelResult {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// A `label:value` restriction on the packed labels column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub text: String,
}

impl MetadataFilter {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

fn deserialize_official<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Bool(flag)) => Some(flag),
        Some(Value::String(text)) => match text.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// A named substitution for `%%NAME%%` tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardParam {
    pub name: String,
    pub value: ParamValue,
}

impl DashboardParam {
    pub fn new(name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Integer(value) => write!(f, "{value}"),
            ParamValue::Float(value) => write!(f, "{value}"),
            ParamValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

/// A dashboard normalized to the current schema version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub params: Vec<DashboardParam>,
    #[serde(default)]
    pub children: Vec<ContainerWidget>,
}

impl DashboardModel {
    pub fn find_container(&self, id: &str) -> Result<&ContainerWidget> {
        find_container_in(&self.children, id).ok_or_else(|| Error::not_found("container", id))
    }

    pub fn find_widget(&self, id: &str) -> Result<&ChartWidget> {
        self.charts()
            .into_iter()
            .find(|chart| chart.id == id)
            .ok_or_else(|| Error::not_found("widget", id))
    }

    /// Every chart in the dashboard, depth first.
    pub fn charts(&self) -> Vec<&ChartWidget> {
        let mut charts = Vec::new();
        for container in &self.children {
            container.collect_charts(&mut charts);
        }
        charts
    }
}

fn find_container_in<'a>(containers: &'a [ContainerWidget], id: &str) -> Option<&'a ContainerWidget> {
    for container in containers {
        if container.id == id {
            return Some(container);
        }
        let nested = container.children.iter().filter_map(|widget| match widget {
            Widget::Container(inner) => Some(inner),
            Widget::Chart(_) => None,
        });
        for inner in nested {
            if let Some(found) = find_container_in(std::slice::from_ref(inner), id) {
                return Some(found);
            }
        }
    }
    None
}

/// Serialized with a `type` tag. Nodes without one are read as containers
/// when they have `children` and no `datasource`, and as charts otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Widget {
    Chart(ChartWidget),
    Container(ContainerWidget),
}

impl<'de> Deserialize<'de> for Widget {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error as _;

        let node = Value::deserialize(deserializer)?;
        let container = match node.get("type") {
            Some(Value::String(kind)) if kind == "container" => true,
            Some(Value::String(kind)) if kind == "chart" => false,
            Some(other) => {
                return Err(D::Error::custom(format!("unknown widget type {other}")));
            }
            None => crate::version::is_container(&node),
        };

        if container {
            ContainerWidget::deserialize(node)
                .map(Widget::Container)
                .map_err(D::Error::custom)
        } else {
            ChartWidget::deserialize(node)
                .map(Widget::Chart)
                .map_err(D::Error::custom)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerWidget {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub children: Vec<Widget>,
}

impl ContainerWidget {
    fn collect_charts<'a>(&'a self, charts: &mut Vec<&'a ChartWidget>) {
        for widget in &self.children {
            match widget {
                Widget::Chart(chart) => charts.push(chart),
                Widget::Container(inner) => inner.collect_charts(charts),
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartWidget {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub datasource: Datasource,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub chart: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Datasource {
    #[serde(default)]
    pub config: QueryConfigModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Hand-written SQL in `query` is used as-is instead of being generated.
    #[serde(default)]
    pub custom_query: bool,
}
