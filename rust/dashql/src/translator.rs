//! Translates a widget's [`QueryConfigModel`] into SQL.

use crate::{
    builder::{
        build_group_args, build_select_args, build_where_args, format_query, QueryProperties,
        LABELS_FIELD, VALUE_FIELD,
    },
    dialect::{BigQueryLegacy, SqlDialect},
    error::{Error, Result},
    filter::{Filter, FilterClause, MatchRule},
    model::{ChartWidget, DashboardParam, QueryConfigModel},
    parser::parse_metadata_filter,
    tokens::substitute_tokens,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const DATE_ALIAS: &str = "date";
pub const OFFICIAL_FIELD: &str = "official";
/// Column holding the `runby` filter value.
pub const OWNER_FIELD: &str = "owner";
/// Sunday.
pub const DEFAULT_FIRST_DAY_OF_WEEK: u8 = 0;

const SORTED_DIMENSIONS: [&str; 3] = ["product_name", "test", "metric"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TablePartition {
    #[default]
    OneTable,
    PerDay,
}

impl TablePartition {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_uppercase().as_str() {
            "ONETABLE" | "" => Ok(TablePartition::OneTable),
            "PERDAY" => Ok(TablePartition::PerDay),
            other => Err(Error::Config(format!("unsupported table partition '{other}'"))),
        }
    }
}

/// Where a query reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec<'a> {
    pub project_id: Option<&'a str>,
    pub dataset_name: &'a str,
    pub table_name: &'a str,
    pub partition: TablePartition,
}

/// Builder-ready form of a query config.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub properties: QueryProperties,
    pub order_args: Vec<String>,
    /// Timestamp expressions bounding the query; also used to pick daily tables.
    pub start_expression: Option<String>,
    pub end_expression: Option<String>,
    pub row_limit: Option<u32>,
}

pub struct Translator<'d> {
    dialect: &'d dyn SqlDialect,
    first_day_of_week: u8,
    default_row_limit: Option<u32>,
}

impl Default for Translator<'static> {
    fn default() -> Self {
        Translator::new(&BigQueryLegacy)
    }
}

impl<'d> Translator<'d> {
    pub fn new(dialect: &'d dyn SqlDialect) -> Self {
        Self {
            dialect,
            first_day_of_week: DEFAULT_FIRST_DAY_OF_WEEK,
            default_row_limit: None,
        }
    }

    pub fn with_first_day_of_week(mut self, day: u8) -> Self {
        self.first_day_of_week = day.min(6);
        self
    }

    /// Row limit used when a config does not set one.
    pub fn with_default_row_limit(mut self, limit: Option<u32>) -> Self {
        self.default_row_limit = limit;
        self
    }

    pub fn plan(&self, config: &QueryConfigModel) -> Result<QueryPlan> {
        let filters = &config.filters;
        let results = &config.results;
        let dialect = self.dialect;
        let mut properties = QueryProperties::default();

        let start_expression = filters
            .start_date
            .as_ref()
            .map(|date| date.to_expression(dialect))
            .transpose()?;
        let end_expression = filters
            .end_date
            .as_ref()
            .map(|date| date.to_expression(dialect))
            .transpose()?;

        if let Some(start) = &start_expression {
            properties.field_filters.push(Filter::hidden(
                TIMESTAMP_FIELD,
                FilterClause::function(dialect.timestamp_to_seconds(start), MatchRule::Ge),
            ));
        }
        if let Some(end) = &end_expression {
            properties.field_filters.push(Filter::hidden(
                TIMESTAMP_FIELD,
                FilterClause::function(dialect.timestamp_to_seconds(end), MatchRule::Le),
            ));
        }

        let equality_filters = [
            ("product_name", filters.product_name.as_deref()),
            ("test", filters.test.as_deref()),
            ("metric", filters.metric.as_deref()),
            (OWNER_FIELD, filters.runby.as_deref()),
        ];
        for (field, value) in equality_filters {
            if let Some(value) = value.and_then(populated) {
                properties
                    .field_filters
                    .push(Filter::hidden(field, FilterClause::single(value, MatchRule::Eq)));
            }
        }

        for field in &results.fields {
            if let Some(name) = populated(&field.name) {
                properties.field_filters.push(Filter::column(name));
            }
        }

        if results.show_date {
            let bucket =
                dialect.date_bucket(TIMESTAMP_FIELD, results.date_group, self.first_day_of_week);
            properties
                .field_filters
                .push(Filter::column(bucket).with_alias(DATE_ALIAS));
        }

        for label in &results.labels {
            if let Some(label) = populated(&label.label) {
                properties.metadata_filters.push(Filter::column(label));
            }
        }

        if let Some(official) = filters.official {
            properties.field_filters.push(Filter::hidden(
                OFFICIAL_FIELD,
                FilterClause::single(official, MatchRule::Eq),
            ));
        }

        for metadata in &filters.metadata {
            if metadata.text.trim().is_empty() {
                continue;
            }
            let term = parse_metadata_filter(&metadata.text)?;
            properties.field_filters.push(Filter::hidden(
                LABELS_FIELD,
                FilterClause::single(term.packed(), MatchRule::Ct),
            ));
        }

        if results.measure_values {
            properties.aggregations = results
                .measures
                .iter()
                .filter_map(|measure| populated(&measure.name))
                .map(str::to_string)
                .collect();
        } else {
            properties.field_filters.push(Filter::column(VALUE_FIELD));
        }

        let constrained = |field: &str| {
            properties
                .field_filters
                .iter()
                .any(|filter| filter.field_name == field && filter.is_equality())
        };
        let mut order_args: Vec<String> = SORTED_DIMENSIONS
            .iter()
            .filter(|field| !constrained(**field))
            .map(|field| field.to_string())
            .collect();
        if results.show_date {
            order_args.push(DATE_ALIAS.to_string());
        }

        Ok(QueryPlan {
            properties,
            order_args,
            start_expression,
            end_expression,
            row_limit: results.row_limit.or(self.default_row_limit),
        })
    }

    pub fn table_expression(&self, table: &TableSpec<'_>, plan: &QueryPlan) -> Result<String> {
        let table_ref =
            self.dialect
                .table_ref(table.project_id, table.dataset_name, table.table_name);

        match table.partition {
            TablePartition::OneTable => Ok(table_ref),
            TablePartition::PerDay => {
                let start = plan.start_expression.as_deref().ok_or_else(|| {
                    Error::Config(
                        "Start date is required when PERDAY table partitioning is used".into(),
                    )
                })?;
                let end = plan
                    .end_expression
                    .clone()
                    .unwrap_or_else(|| self.dialect.current_timestamp());
                Ok(self.dialect.table_date_range(&table_ref, start, &end))
            }
        }
    }

    /// Builds the full statement, then substitutes `params` tokens into it.
    pub fn sql(
        &self,
        config: &QueryConfigModel,
        table: &TableSpec<'_>,
        params: Option<&[DashboardParam]>,
    ) -> Result<String> {
        let plan = self.plan(config)?;
        let from = self.table_expression(table, &plan)?;
        let select = build_select_args(&plan.properties, self.dialect)?;

        let sql = format_query(
            &select,
            &[from],
            &build_where_args(&plan.properties, self.dialect),
            &build_group_args(&plan.properties),
            &plan.order_args,
            plan.row_limit,
        );
        debug!(
            table = table.table_name,
            partition = ?table.partition,
            "built widget query"
        );

        Ok(match params {
            Some(params) => substitute_tokens(&sql, params),
            None => sql,
        })
    }

    /// The SQL a chart should run: its hand-written query when it has one,
    /// otherwise the statement generated from its config.
    pub fn widget_sql(
        &self,
        widget: &ChartWidget,
        table: &TableSpec<'_>,
        params: &[DashboardParam],
    ) -> Result<String> {
        let datasource = &widget.datasource;
        match datasource.query.as_deref() {
            Some(query) if datasource.custom_query && !query.trim().is_empty() => {
                Ok(substitute_tokens(query, params))
            }
            _ => self.sql(&datasource.config, table, Some(params)),
        }
    }
}

/// Generates BigQuery legacy SQL for `config`.
pub fn get_sql(
    config: &QueryConfigModel,
    project_id: Option<&str>,
    dataset_name: &str,
    table_name: &str,
    table_partition: TablePartition,
    params: Option<&[DashboardParam]>,
) -> Result<String> {
    let table = TableSpec {
        project_id,
        dataset_name,
        table_name,
        partition: table_partition,
    };
    Translator::default().sql(config, &table, params)
}

fn populated(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|value| !value.is_empty())
}
