//! SQL dialect fragments.
//!
//! The builder and translator assemble clauses from plain strings; everything
//! that depends on the target engine's syntax goes through [`SqlDialect`].

use crate::{filter::MatchRule, time::DateGroup};

pub trait SqlDialect: Send + Sync {
    /// Reference to a single table. `project_id` is omitted when absent.
    fn table_ref(&self, project_id: Option<&str>, dataset: &str, table: &str) -> String;

    /// Scan over a family of day-partitioned tables sharing `table_ref`.
    fn table_date_range(&self, table_ref: &str, start: &str, end: &str) -> String;

    /// Expression extracting one label's value from a packed label string.
    fn label_extract(&self, labels_field: &str, label: &str) -> String;

    /// Nearest-rank percentile over `quantiles` buckets.
    fn percentile(&self, field: &str, nth: u64, quantiles: u64) -> String;

    fn aggregate(&self, function: &str, field: &str) -> String {
        format!("{}({field})", function.to_uppercase())
    }

    fn current_timestamp(&self) -> String;

    fn relative_date(&self, amount: i64, unit: &str) -> String;

    fn absolute_date(&self, literal: &str) -> String;

    fn timestamp_to_seconds(&self, expression: &str) -> String;

    /// Buckets a seconds-since-epoch field by `group`.
    fn date_bucket(&self, field: &str, group: DateGroup, first_day_of_week: u8) -> String;

    fn match_operator(&self, rule: MatchRule) -> &'static str {
        match rule {
            MatchRule::Eq => "=",
            MatchRule::Ne => "!=",
            MatchRule::Gt => ">",
            MatchRule::Ge => ">=",
            MatchRule::Lt => "<",
            MatchRule::Le => "<=",
            MatchRule::Ct => "CONTAINS",
        }
    }

    fn quote_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

/// BigQuery legacy SQL: bracketed table references, `TABLE_DATE_RANGE`,
/// `REGEXP_EXTRACT` and `NTH`/`QUANTILES`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BigQueryLegacy;

impl SqlDialect for BigQueryLegacy {
    fn table_ref(&self, project_id: Option<&str>, dataset: &str, table: &str) -> String {
        match project_id.filter(|project| !project.is_empty()) {
            Some(project) => format!("[{project}:{dataset}.{table}]"),
            None => format!("[{dataset}.{table}]"),
        }
    }

    fn table_date_range(&self, table_ref: &str, start: &str, end: &str) -> String {
        format!("TABLE_DATE_RANGE({table_ref}, {start}, {end})")
    }

    fn label_extract(&self, labels_field: &str, label: &str) -> String {
        format!(r#"REGEXP_EXTRACT({labels_field}, r"\|{label}:(.*?)\|")"#)
    }

    fn percentile(&self, field: &str, nth: u64, quantiles: u64) -> String {
        format!("NTH({nth}, QUANTILES({field}, {quantiles}))")
    }

    fn current_timestamp(&self) -> String {
        "CURRENT_TIMESTAMP()".to_string()
    }

    fn relative_date(&self, amount: i64, unit: &str) -> String {
        format!(
            r#"DATE_ADD({}, -{amount}, "{unit}")"#,
            self.current_timestamp()
        )
    }

    fn absolute_date(&self, literal: &str) -> String {
        format!("TIMESTAMP('{literal}')")
    }

    fn timestamp_to_seconds(&self, expression: &str) -> String {
        format!("TIMESTAMP_TO_SEC({expression})")
    }

    fn date_bucket(&self, field: &str, group: DateGroup, first_day_of_week: u8) -> String {
        match group {
            DateGroup::Second => format!("SEC_TO_TIMESTAMP({field})"),
            DateGroup::Week => {
                format!("UTC_USEC_TO_WEEK({field} * 1000000, {first_day_of_week})")
            }
            other => format!("UTC_USEC_TO_{}({field} * 1000000)", other.keyword()),
        }
    }
}
