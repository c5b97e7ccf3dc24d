//! Formats SELECT statements from resolved [`QueryProperties`].

use crate::{
    dialect::SqlDialect,
    error::{Error, Result},
    filter::{sanitize_alias, Filter, FilterClause, MatchRule},
};
use serde::{Deserialize, Serialize};

/// Field holding the measured sample value.
pub const VALUE_FIELD: &str = "value";
/// Field holding `|name:value|`-packed labels.
pub const LABELS_FIELD: &str = "labels";

const DEFAULT_QUANTILES: u64 = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryProperties {
    pub aggregations: Vec<String>,
    pub field_filters: Vec<Filter>,
    pub metadata_filters: Vec<Filter>,
}

/// Assembles the statement. Sections with no arguments are left out and the
/// statement is always terminated with `;`.
pub fn format_query(
    select_args: &[String],
    from_args: &[String],
    where_args: &[String],
    group_args: &[String],
    order_args: &[String],
    row_limit: Option<u32>,
) -> String {
    let mut sections = Vec::new();
    push_section(&mut sections, "SELECT", select_args, ",\n");
    push_section(&mut sections, "FROM", from_args, ",\n");
    push_section(&mut sections, "WHERE", where_args, " AND\n");
    push_section(&mut sections, "GROUP BY", group_args, ",\n");
    push_section(&mut sections, "ORDER BY", order_args, ",\n");

    if let Some(limit) = row_limit.filter(|limit| *limit > 0) {
        sections.push(format!("LIMIT {limit}"));
    }

    let mut sql = sections.join("\n");
    sql.push(';');
    sql
}

fn push_section(sections: &mut Vec<String>, keyword: &str, args: &[String], separator: &str) {
    if args.is_empty() {
        return;
    }
    sections.push(keyword.to_string());
    sections.push(format!("\t{}", args.join(&format!("{separator}\t"))));
}

pub fn build_select_args(
    properties: &QueryProperties,
    dialect: &dyn SqlDialect,
) -> Result<Vec<String>> {
    let mut args = Vec::new();

    for filter in properties.field_filters.iter().filter(|f| f.is_visible()) {
        match filter.distinct_alias() {
            Some(alias) => args.push(format!("{} AS {alias}", filter.field_name)),
            None => args.push(filter.field_name.clone()),
        }
    }

    for filter in properties.metadata_filters.iter().filter(|f| f.is_visible()) {
        args.push(format!(
            "{} AS {}",
            dialect.label_extract(LABELS_FIELD, &filter.field_name),
            sanitize_alias(&filter.output_name())
        ));
    }

    for aggregation in &properties.aggregations {
        args.push(aggregation_expression(aggregation, dialect)?);
    }

    Ok(args)
}

/// GROUP BY is only needed when at least one aggregation collapses rows.
pub fn build_group_args(properties: &QueryProperties) -> Vec<String> {
    if properties.aggregations.is_empty() {
        return Vec::new();
    }

    let fields = properties
        .field_filters
        .iter()
        .filter(|f| f.is_visible())
        .map(Filter::output_name);
    let metadata = properties
        .metadata_filters
        .iter()
        .filter(|f| f.is_visible())
        .map(|f| sanitize_alias(&f.output_name()));

    fields.chain(metadata).collect()
}

pub fn build_where_args(properties: &QueryProperties, dialect: &dyn SqlDialect) -> Vec<String> {
    let fields = properties
        .field_filters
        .iter()
        .filter_map(|filter| filter_predicate(&filter.field_name, filter, dialect));
    let metadata = properties.metadata_filters.iter().filter_map(|filter| {
        let target = dialect.label_extract(LABELS_FIELD, &filter.field_name);
        filter_predicate(&target, filter, dialect)
    });

    fields.chain(metadata).collect()
}

fn filter_predicate(target: &str, filter: &Filter, dialect: &dyn SqlDialect) -> Option<String> {
    let clauses: Vec<String> = filter
        .filter_clauses
        .iter()
        .filter_map(|clause| clause_predicate(target, clause, dialect))
        .collect();

    match clauses.len() {
        0 => None,
        1 => clauses.into_iter().next(),
        _ => Some(format!("({})", clauses.join(" OR "))),
    }
}

fn clause_predicate(target: &str, clause: &FilterClause, dialect: &dyn SqlDialect) -> Option<String> {
    let values: Vec<String> = clause
        .match_on
        .iter()
        .map(|value| {
            if value.is_text() && !clause.is_function {
                dialect.quote_string(&value.to_string())
            } else {
                value.to_string()
            }
        })
        .collect();

    let operator = dialect.match_operator(clause.match_rule);
    match (values.len(), clause.match_rule) {
        (0, _) => None,
        (1, _) => Some(format!("{target} {operator} {}", values[0])),
        (_, MatchRule::Eq) => Some(format!("{target} IN ({})", values.join(", "))),
        (_, MatchRule::Ne) => Some(format!("{target} NOT IN ({})", values.join(", "))),
        _ => {
            let alternatives: Vec<String> = values
                .iter()
                .map(|value| format!("{target} {operator} {value}"))
                .collect();
            Some(format!("({})", alternatives.join(" OR ")))
        }
    }
}

fn aggregation_expression(aggregation: &str, dialect: &dyn SqlDialect) -> Result<String> {
    let aggregation = aggregation.trim();
    if is_percentile(aggregation) {
        let percentile = parse_percentile(aggregation)?;
        return Ok(format!(
            "{} AS {}",
            dialect.percentile(VALUE_FIELD, percentile.nth, percentile.quantiles),
            percentile.alias
        ));
    }

    Ok(format!(
        "{} AS {}",
        dialect.aggregate(aggregation, VALUE_FIELD),
        aggregation_alias(aggregation)?
    ))
}

/// Output column name of an aggregation: `p99_5` for `99.5%`, otherwise the
/// lowercased function name.
pub fn aggregation_alias(aggregation: &str) -> Result<String> {
    let aggregation = aggregation.trim();
    if is_percentile(aggregation) {
        return Ok(parse_percentile(aggregation)?.alias);
    }
    if aggregation.is_empty() {
        return Err(Error::Config("aggregation name must not be empty".into()));
    }
    Ok(aggregation.to_lowercase())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Percentile {
    /// Nearest-rank index into the quantile buckets.
    pub nth: u64,
    pub quantiles: u64,
    pub alias: String,
}

pub fn is_percentile(aggregation: &str) -> bool {
    aggregation.trim().ends_with('%')
}

/// Parses `99%`, `99.5%` or `.01%`. Every digit after the decimal point
/// scales the quantile count by ten.
pub fn parse_percentile(aggregation: &str) -> Result<Percentile> {
    let invalid = || Error::Config(format!("invalid percentile aggregation '{aggregation}'"));

    let body = aggregation
        .trim()
        .strip_suffix('%')
        .ok_or_else(invalid)?
        .trim();

    let (whole, fraction) = match body.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (body, ""),
    };

    let all_digits = |part: &str| part.chars().all(|ch| ch.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(invalid());
    }

    let scale = u32::try_from(fraction.len())
        .ok()
        .and_then(|digits| 10u64.checked_pow(digits))
        .ok_or_else(invalid)?;
    let quantiles = DEFAULT_QUANTILES.checked_mul(scale).ok_or_else(invalid)?;
    let nth = format!("{whole}{fraction}")
        .parse::<u64>()
        .map_err(|_| invalid())?;

    if nth > quantiles {
        return Err(Error::Config(format!(
            "percentile '{aggregation}' must not exceed 100%"
        )));
    }

    Ok(Percentile {
        nth,
        quantiles,
        alias: format!("p{}", body.replace('.', "_")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::BigQueryLegacy;
    use crate::filter::{DisplayMode, FilterClause, MatchValue};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn formats_all_sections_in_order() {
        let sql = format_query(
            &strings(&["product_name", "AVG(value) AS avg"]),
            &strings(&["[samples.results]"]),
            &strings(&["test = 'iperf'", "official = true"]),
            &strings(&["product_name"]),
            &strings(&["product_name"]),
            Some(10),
        );

        assert_eq!(
            sql,
            "SELECT\n\tproduct_name,\n\tAVG(value) AS avg\nFROM\n\t[samples.results]\nWHERE\n\ttest = 'iperf' AND\n\tofficial = true\nGROUP BY\n\tproduct_name\nORDER BY\n\tproduct_name\nLIMIT 10;"
        );
    }

    #[test]
    fn omits_empty_sections() {
        let sql = format_query(&[], &strings(&["[samples.results]"]), &[], &[], &[], None);
        assert_eq!(sql, "FROM\n\t[samples.results];");
        assert!(!sql.contains("SELECT"));
        assert!(sql.ends_with(';'));
    }

    #[test]
    fn zero_row_limit_is_ignored() {
        let sql = format_query(&strings(&["a"]), &strings(&["t"]), &[], &[], &[], Some(0));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn plain_aggregations_are_upper_and_lower_cased() {
        for name in ["avg", "Max", "min", "COUNT", "stddev"] {
            let properties = QueryProperties {
                aggregations: vec![name.to_string()],
                ..Default::default()
            };
            let args = build_select_args(&properties, &BigQueryLegacy).unwrap();
            assert_eq!(
                args,
                vec![format!(
                    "{}(value) AS {}",
                    name.to_uppercase(),
                    name.to_lowercase()
                )]
            );
        }
    }

    #[test]
    fn percentiles_scale_quantiles_per_decimal_place() {
        let cases = [
            ("99%", "NTH(99, QUANTILES(value, 100)) AS p99"),
            ("50%", "NTH(50, QUANTILES(value, 100)) AS p50"),
            ("99.5%", "NTH(995, QUANTILES(value, 1000)) AS p99_5"),
            ("99.99%", "NTH(9999, QUANTILES(value, 10000)) AS p99_99"),
            (".01%", "NTH(1, QUANTILES(value, 10000)) AS p_01"),
        ];

        for (aggregation, expected) in cases {
            let properties = QueryProperties {
                aggregations: vec![aggregation.to_string()],
                ..Default::default()
            };
            let args = build_select_args(&properties, &BigQueryLegacy).unwrap();
            assert_eq!(args, vec![expected.to_string()], "for {aggregation}");
        }
    }

    #[test]
    fn malformed_percentiles_are_configuration_errors() {
        for aggregation in ["%", "abc%", "9.9.9%", "150%", "-5%", ".%"] {
            let err = parse_percentile(aggregation).expect_err(aggregation);
            assert!(matches!(err, Error::Config(_)), "for {aggregation}: {err}");
        }
    }

    #[test]
    fn select_args_cover_fields_metadata_and_aggregations() {
        let properties = QueryProperties {
            aggregations: vec!["avg".into()],
            field_filters: vec![
                Filter::column("product_name"),
                Filter::column("owner").with_alias("run by"),
                Filter::hidden("test", FilterClause::single("iperf", MatchRule::Eq)),
            ],
            metadata_filters: vec![Filter::column("machine-type")],
        };

        let args = build_select_args(&properties, &BigQueryLegacy).unwrap();
        assert_eq!(
            args,
            vec![
                "product_name".to_string(),
                "owner AS run_by".to_string(),
                r#"REGEXP_EXTRACT(labels, r"\|machine-type:(.*?)\|") AS machine_type"#.to_string(),
                "AVG(value) AS avg".to_string(),
            ]
        );

        assert_eq!(
            build_group_args(&properties),
            vec!["product_name", "run_by", "machine_type"]
        );
    }

    #[test]
    fn group_args_empty_without_aggregations() {
        let properties = QueryProperties {
            aggregations: Vec::new(),
            field_filters: vec![Filter::column("product_name")],
            metadata_filters: Vec::new(),
        };
        assert!(build_group_args(&properties).is_empty());
    }

    #[test]
    fn where_args_join_clauses_and_quote_text() {
        let properties = QueryProperties {
            aggregations: Vec::new(),
            field_filters: vec![
                Filter::column("product_name"),
                Filter::hidden("test", FilterClause::single("iperf", MatchRule::Eq)),
                Filter {
                    field_name: "value".into(),
                    filter_clauses: vec![
                        FilterClause::single(10i64, MatchRule::Lt),
                        FilterClause::single(90i64, MatchRule::Gt),
                    ],
                    display_mode: DisplayMode::Hidden,
                    field_alias: None,
                },
                Filter::hidden(
                    "timestamp",
                    FilterClause::function("TIMESTAMP_TO_SEC(CURRENT_TIMESTAMP())", MatchRule::Le),
                ),
                Filter::hidden("official", FilterClause::single(true, MatchRule::Eq)),
            ],
            metadata_filters: vec![Filter::hidden(
                "zone",
                FilterClause::new(
                    vec![MatchValue::from("us-east1"), MatchValue::from("us-west1")],
                    MatchRule::Eq,
                ),
            )],
        };

        assert_eq!(
            build_where_args(&properties, &BigQueryLegacy),
            vec![
                "test = 'iperf'".to_string(),
                "(value < 10 OR value > 90)".to_string(),
                "timestamp <= TIMESTAMP_TO_SEC(CURRENT_TIMESTAMP())".to_string(),
                "official = true".to_string(),
                r#"REGEXP_EXTRACT(labels, r"\|zone:(.*?)\|") IN ('us-east1', 'us-west1')"#
                    .to_string(),
            ]
        );
    }

    #[test]
    fn multi_value_range_clauses_expand_to_alternatives() {
        let properties = QueryProperties {
            field_filters: vec![Filter::hidden(
                "labels",
                FilterClause::new(vec!["|a:1|".into(), "|b:2|".into()], MatchRule::Ct),
            )],
            ..Default::default()
        };
        assert_eq!(
            build_where_args(&properties, &BigQueryLegacy),
            vec!["(labels CONTAINS '|a:1|' OR labels CONTAINS '|b:2|')".to_string()]
        );
    }
}
