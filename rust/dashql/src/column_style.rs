use crate::{
    builder::{aggregation_alias, QueryProperties, VALUE_FIELD},
    error::Result,
    filter::sanitize_alias,
    translator::DATE_ALIAS,
};
use serde::{Deserialize, Serialize};

/// Display metadata for one result column, keyed by its output name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStyle {
    pub column_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub data_type: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic: Option<ColumnSemantic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Float,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSemantic {
    Time,
    Value,
    Label,
    Dimension,
}

/// Styles for the columns `properties` selects, in SELECT order.
pub fn derive_column_styles(properties: &QueryProperties) -> Result<Vec<ColumnStyle>> {
    let mut styles = Vec::new();

    for filter in properties.field_filters.iter().filter(|f| f.is_visible()) {
        let name = filter.output_name();
        let style = if name == DATE_ALIAS {
            style(&name, "Date", ColumnType::Timestamp, ColumnSemantic::Time)
        } else if filter.field_name == VALUE_FIELD {
            style(&name, &name, ColumnType::Float, ColumnSemantic::Value)
        } else {
            style(&name, &name, ColumnType::Text, ColumnSemantic::Dimension)
        };
        styles.push(style);
    }

    for filter in properties.metadata_filters.iter().filter(|f| f.is_visible()) {
        let title = filter.field_alias.as_deref().unwrap_or(&filter.field_name);
        styles.push(style(
            &sanitize_alias(&filter.output_name()),
            title,
            ColumnType::Text,
            ColumnSemantic::Label,
        ));
    }

    for aggregation in &properties.aggregations {
        styles.push(style(
            &aggregation_alias(aggregation)?,
            aggregation.trim(),
            ColumnType::Float,
            ColumnSemantic::Value,
        ));
    }

    Ok(styles)
}

/// Keeps saved styles for columns that still exist and adds defaults for new
/// ones. Styles for columns the query no longer returns are dropped.
pub fn merge_column_styles(existing: &[ColumnStyle], derived: Vec<ColumnStyle>) -> Vec<ColumnStyle> {
    derived
        .into_iter()
        .map(|style| {
            existing
                .iter()
                .find(|saved| saved.column_id == style.column_id)
                .cloned()
                .unwrap_or(style)
        })
        .collect()
}

fn style(column_id: &str, title: &str, data_type: ColumnType, semantic: ColumnSemantic) -> ColumnStyle {
    ColumnStyle {
        column_id: column_id.to_string(),
        title: title.to_string(),
        data_type,
        semantic: Some(semantic),
        format: None,
    }
}
