//! Date filters and date grouping for widget queries.

use crate::{
    dialect::SqlDialect,
    error::{Error, Result},
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DateFilterType {
    Custom,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl DateFilterType {
    /// Unit keyword for relative date arithmetic; `None` for absolute dates.
    pub fn unit(self) -> Option<&'static str> {
        match self {
            DateFilterType::Custom => None,
            DateFilterType::Minute => Some("MINUTE"),
            DateFilterType::Hour => Some("HOUR"),
            DateFilterType::Day => Some("DAY"),
            DateFilterType::Week => Some("WEEK"),
            DateFilterType::Month => Some("MONTH"),
            DateFilterType::Year => Some("YEAR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateFilterValue {
    Amount(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateFilter {
    pub filter_type: DateFilterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_value: Option<DateFilterValue>,
    /// Literal for CUSTOM dates; takes precedence over `filter_value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl DateFilter {
    pub fn relative(filter_type: DateFilterType, amount: i64) -> Self {
        Self {
            filter_type,
            filter_value: Some(DateFilterValue::Amount(amount)),
            text: None,
        }
    }

    pub fn custom(text: impl Into<String>) -> Self {
        Self {
            filter_type: DateFilterType::Custom,
            filter_value: None,
            text: Some(text.into()),
        }
    }

    /// Renders the filter as a timestamp expression, before any conversion
    /// to seconds.
    pub fn to_expression(&self, dialect: &dyn SqlDialect) -> Result<String> {
        match self.filter_type.unit() {
            None => {
                let text = match (self.text.as_deref(), &self.filter_value) {
                    (Some(text), _) if !text.trim().is_empty() => text.trim().to_string(),
                    (_, Some(DateFilterValue::Text(text))) => text.trim().to_string(),
                    (_, Some(DateFilterValue::Amount(amount))) => amount.to_string(),
                    _ => {
                        return Err(Error::Config(
                            "custom date filter requires a date literal".into(),
                        ))
                    }
                };
                validate_custom_date(&text)?;
                Ok(dialect.absolute_date(&text))
            }
            Some(unit) => {
                let amount = match &self.filter_value {
                    Some(DateFilterValue::Amount(amount)) => *amount,
                    Some(DateFilterValue::Text(text)) => {
                        text.trim().parse::<i64>().map_err(|_| {
                            Error::Config(format!(
                                "relative date filter requires an integer amount, got '{text}'"
                            ))
                        })?
                    }
                    None => {
                        return Err(Error::Config(
                            "relative date filter requires an amount".into(),
                        ))
                    }
                };
                Ok(dialect.relative_date(amount, unit))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateGroup {
    #[serde(rename = "")]
    Second,
    #[serde(rename = "HOUR")]
    Hour,
    #[default]
    #[serde(rename = "DAY")]
    Day,
    #[serde(rename = "WEEK")]
    Week,
    #[serde(rename = "MONTH")]
    Month,
    #[serde(rename = "YEAR")]
    Year,
}

impl DateGroup {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_uppercase().as_str() {
            "" => Ok(DateGroup::Second),
            "HOUR" => Ok(DateGroup::Hour),
            "DAY" => Ok(DateGroup::Day),
            "WEEK" => Ok(DateGroup::Week),
            "MONTH" => Ok(DateGroup::Month),
            "YEAR" => Ok(DateGroup::Year),
            other => Err(Error::InvalidData(format!("unsupported date group '{other}'"))),
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            DateGroup::Second => "",
            DateGroup::Hour => "HOUR",
            DateGroup::Day => "DAY",
            DateGroup::Week => "WEEK",
            DateGroup::Month => "MONTH",
            DateGroup::Year => "YEAR",
        }
    }
}

fn validate_custom_date(text: &str) -> Result<()> {
    let valid = DateTime::parse_from_rfc3339(text).is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M").is_ok()
        || NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok();

    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!("invalid custom date '{text}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::BigQueryLegacy;

    #[test]
    fn relative_dates_use_date_arithmetic() {
        let filter = DateFilter::relative(DateFilterType::Week, 2);
        assert_eq!(
            filter.to_expression(&BigQueryLegacy).unwrap(),
            r#"DATE_ADD(CURRENT_TIMESTAMP(), -2, "WEEK")"#
        );
    }

    #[test]
    fn relative_amount_may_be_numeric_text() {
        let filter = DateFilter {
            filter_type: DateFilterType::Day,
            filter_value: Some(DateFilterValue::Text(" 3 ".into())),
            text: None,
        };
        assert_eq!(
            filter.to_expression(&BigQueryLegacy).unwrap(),
            r#"DATE_ADD(CURRENT_TIMESTAMP(), -3, "DAY")"#
        );
    }

    #[test]
    fn custom_dates_are_absolute_literals() {
        let filter = DateFilter::custom("2014-03-25 10:00:00");
        assert_eq!(
            filter.to_expression(&BigQueryLegacy).unwrap(),
            "TIMESTAMP('2014-03-25 10:00:00')"
        );

        let date_only = DateFilter::custom("2014-03-25");
        assert_eq!(
            date_only.to_expression(&BigQueryLegacy).unwrap(),
            "TIMESTAMP('2014-03-25')"
        );
    }

    #[test]
    fn rejects_unparseable_custom_dates() {
        let err = DateFilter::custom("last tuesday")
            .to_expression(&BigQueryLegacy)
            .expect_err("free text is not a date");
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_non_numeric_relative_amounts() {
        let filter = DateFilter {
            filter_type: DateFilterType::Month,
            filter_value: Some(DateFilterValue::Text("many".into())),
            text: None,
        };
        assert!(filter.to_expression(&BigQueryLegacy).is_err());
    }

    #[test]
    fn custom_dates_read_text_field() {
        let filter: DateFilter =
            serde_json::from_str(r#"{"filter_type": "CUSTOM", "text": "2014-03-01"}"#)
                .expect("text-only custom date should parse");
        assert_eq!(filter, DateFilter::custom("2014-03-01"));
        assert_eq!(
            filter.to_expression(&BigQueryLegacy).unwrap(),
            "TIMESTAMP('2014-03-01')"
        );

        let legacy: DateFilter =
            serde_json::from_str(r#"{"filter_type": "CUSTOM", "filter_value": "2014-03-02"}"#)
                .expect("value-only custom date should parse");
        assert_eq!(
            legacy.to_expression(&BigQueryLegacy).unwrap(),
            "TIMESTAMP('2014-03-02')"
        );

        let both: DateFilter = serde_json::from_str(
            r#"{"filter_type": "CUSTOM", "filter_value": "ignored", "text": "2014-03-03"}"#,
        )
        .unwrap();
        assert_eq!(
            both.to_expression(&BigQueryLegacy).unwrap(),
            "TIMESTAMP('2014-03-03')"
        );
    }

    #[test]
    fn missing_date_values_are_configuration_errors() {
        let custom: DateFilter = serde_json::from_str(r#"{"filter_type": "CUSTOM"}"#).unwrap();
        assert!(matches!(
            custom.to_expression(&BigQueryLegacy),
            Err(Error::Config(_))
        ));

        let relative: DateFilter = serde_json::from_str(r#"{"filter_type": "DAY"}"#).unwrap();
        assert!(matches!(
            relative.to_expression(&BigQueryLegacy),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn date_groups_round_trip_through_json() {
        let group: DateGroup = serde_json::from_str(r#""""#).unwrap();
        assert_eq!(group, DateGroup::Second);
        assert_eq!(DateGroup::parse("week").unwrap(), DateGroup::Week);
        assert!(DateGroup::parse("fortnight").is_err());
    }
}
