//! Parsers for the small text formats embedded in dashboard documents:
//! `label:value` metadata filters and legacy URL-encoded widget querystrings.

use crate::{
    error::{Error, Result},
    time::DateGroup,
};
use serde_json::{json, Map, Value};
use tracing::debug;

const METADATA_SEPARATOR: char = ':';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTerm {
    pub label: String,
    pub value: Option<String>,
}

impl MetadataTerm {
    /// The `|label:value|` fragment stored in the packed labels column. A term
    /// without a value matches any value of the label.
    pub fn packed(&self) -> String {
        match &self.value {
            Some(value) => format!("|{}:{value}|", self.label),
            None => format!("|{}:", self.label),
        }
    }
}

pub fn parse_metadata_filter(raw: &str) -> Result<MetadataTerm> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(Error::InvalidData("metadata filter must not be empty".into()));
    }
    if text.starts_with(METADATA_SEPARATOR) {
        return Err(Error::InvalidData(format!(
            "metadata filter cannot start with '{METADATA_SEPARATOR}': '{text}'"
        )));
    }

    Ok(match text.split_once(METADATA_SEPARATOR) {
        Some((label, value)) => MetadataTerm {
            label: label.trim().to_string(),
            value: Some(value.trim().to_string()),
        },
        None => MetadataTerm {
            label: text.to_string(),
            value: None,
        },
    })
}

/// Decodes a pre-versioning widget querystring into a partial query config
/// (`{"filters": {...}, "results": {...}}`) ready to merge over a widget's
/// existing config.
pub fn parse_legacy_querystring(querystring: &str) -> Result<Value> {
    let querystring = querystring.trim().trim_start_matches('?');
    let mut filters = Map::new();
    let mut results = Map::new();
    let mut metadata = Vec::new();

    for (key, value) in url::form_urlencoded::parse(querystring.as_bytes()) {
        let value = value.trim();
        match &*key {
            "start_date" | "end_date" => {
                if !value.is_empty() {
                    filters.insert(key.to_string(), legacy_date(value));
                }
            }
            "product_name" | "test" | "metric" | "runby" | "official" => {
                if !value.is_empty() {
                    filters.insert(key.to_string(), Value::String(value.to_string()));
                }
            }
            "metadata" => {
                for item in split_list(value) {
                    parse_metadata_filter(item)?;
                    metadata.push(json!({ "text": item }));
                }
            }
            "fields" | "measures" => {
                let entries: Vec<Value> = split_list(value)
                    .map(|name| json!({ "name": name }))
                    .collect();
                results.insert(key.to_string(), Value::Array(entries));
            }
            "labels" => {
                let entries: Vec<Value> = split_list(value)
                    .map(|label| json!({ "label": label }))
                    .collect();
                results.insert(key.to_string(), Value::Array(entries));
            }
            "show_date" | "measure_values" => {
                results.insert(key.to_string(), Value::Bool(parse_flag(&key, value)?));
            }
            "date_group" => {
                let group = DateGroup::parse(value)?;
                results.insert(key.to_string(), Value::String(group.keyword().to_string()));
            }
            "row_limit" => {
                let limit = value.parse::<u32>().map_err(|_| {
                    Error::InvalidData(format!("row_limit must be a positive integer, got '{value}'"))
                })?;
                results.insert(key.to_string(), json!(limit));
            }
            other => {
                debug!(key = other, "ignoring unrecognized legacy querystring key");
            }
        }
    }

    if !metadata.is_empty() {
        filters.insert("metadata".to_string(), Value::Array(metadata));
    }

    Ok(json!({ "filters": filters, "results": results }))
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn legacy_date(value: &str) -> Value {
    match value.parse::<i64>() {
        Ok(days) => json!({ "filter_type": "DAY", "filter_value": days }),
        Err(_) => json!({ "filter_type": "CUSTOM", "text": value }),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::InvalidData(format!(
            "{key} must be a boolean, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_label_and_value() {
        let term = parse_metadata_filter(" machine_type : n1-standard-4 ").unwrap();
        assert_eq!(term.label, "machine_type");
        assert_eq!(term.value.as_deref(), Some("n1-standard-4"));
        assert_eq!(term.packed(), "|machine_type:n1-standard-4|");
    }

    #[test]
    fn value_may_contain_separator() {
        let term = parse_metadata_filter("endpoint:http://host:8080").unwrap();
        assert_eq!(term.label, "endpoint");
        assert_eq!(term.value.as_deref(), Some("http://host:8080"));
    }

    #[test]
    fn label_only_matches_any_value() {
        let term = parse_metadata_filter("zone").unwrap();
        assert_eq!(term.value, None);
        assert_eq!(term.packed(), "|zone:");
    }

    #[test]
    fn rejects_leading_separator() {
        let err = parse_metadata_filter(":value").unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
        assert!(err.to_string().contains("cannot start with ':'"));
    }

    #[test]
    fn decodes_legacy_querystring() {
        let patch = parse_legacy_querystring(
            "?product_name=widget%20factory&test=iperf&start_date=7&end_date=2014-03-01\
             &metadata=zone:us-east1,cloud:GCP&metadata=os:linux&measures=avg,99%25\
             &show_date=false&date_group=week&row_limit=50&unknown=1",
        )
        .unwrap();

        assert_eq!(patch["filters"]["product_name"], "widget factory");
        assert_eq!(patch["filters"]["test"], "iperf");
        assert_eq!(
            patch["filters"]["start_date"],
            json!({"filter_type": "DAY", "filter_value": 7})
        );
        assert_eq!(
            patch["filters"]["end_date"],
            json!({"filter_type": "CUSTOM", "text": "2014-03-01"})
        );
        assert_eq!(
            patch["filters"]["metadata"],
            json!([{"text": "zone:us-east1"}, {"text": "cloud:GCP"}, {"text": "os:linux"}])
        );
        assert_eq!(
            patch["results"]["measures"],
            json!([{"name": "avg"}, {"name": "99%"}])
        );
        assert_eq!(patch["results"]["show_date"], false);
        assert_eq!(patch["results"]["date_group"], "WEEK");
        assert_eq!(patch["results"]["row_limit"], 50);
        assert!(patch["filters"].get("unknown").is_none());
    }

    #[test]
    fn legacy_querystring_rejects_bad_metadata() {
        let err = parse_legacy_querystring("metadata=:orphan").unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn legacy_querystring_rejects_bad_flags() {
        assert!(parse_legacy_querystring("show_date=sometimes").is_err());
        assert!(parse_legacy_querystring("row_limit=-4").is_err());
    }
}
