use crate::{
    model::{DashboardParam, QueryConfigModel, DEFAULT_ROW_LIMIT},
    queue::{WorkQueue, DEFAULT_MAX_PARALLEL_QUERIES},
    translator::{TablePartition, TableSpec, Translator, DEFAULT_FIRST_DAY_OF_WEEK},
};
use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_DATASET: &str = "DEFAULT_DATASET";
pub const DEFAULT_TABLE: &str = "DEFAULT_PROJECT";

/// Where widget queries run and how many may be outstanding at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerConfig {
    pub project_id: Option<String>,
    pub dataset_name: String,
    pub table_name: String,
    pub table_partition: TablePartition,
    pub max_parallel_queries: usize,
    pub default_row_limit: u32,
    /// 0 is Sunday.
    pub first_day_of_week: u8,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            dataset_name: DEFAULT_DATASET.to_string(),
            table_name: DEFAULT_TABLE.to_string(),
            table_partition: TablePartition::OneTable,
            max_parallel_queries: DEFAULT_MAX_PARALLEL_QUERIES,
            default_row_limit: DEFAULT_ROW_LIMIT,
            first_day_of_week: DEFAULT_FIRST_DAY_OF_WEEK,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    dashql_project_id: Option<String>,
    #[serde(default)]
    dashql_dataset_name: Option<String>,
    #[serde(default)]
    dashql_table_name: Option<String>,
    #[serde(default)]
    dashql_table_partition: Option<String>,
    #[serde(default = "default_max_parallel_queries")]
    dashql_max_parallel_queries: usize,
    #[serde(default = "default_row_limit")]
    dashql_default_row_limit: u32,
    #[serde(default)]
    dashql_first_day_of_week: u8,
}

const fn default_max_parallel_queries() -> usize {
    DEFAULT_MAX_PARALLEL_QUERIES
}

const fn default_row_limit() -> u32 {
    DEFAULT_ROW_LIMIT
}

impl ExplorerConfig {
    pub fn from_env() -> Result<Self> {
        let raw: RawConfig =
            envy::from_env().context("failed to parse DASHQL_* environment variables")?;

        let table_partition = match raw.dashql_table_partition.as_deref() {
            Some(partition) => TablePartition::parse(partition)
                .context("invalid DASHQL_TABLE_PARTITION value")?,
            None => TablePartition::OneTable,
        };

        Ok(Self {
            project_id: non_empty(raw.dashql_project_id),
            dataset_name: non_empty(raw.dashql_dataset_name)
                .unwrap_or_else(|| DEFAULT_DATASET.to_string()),
            table_name: non_empty(raw.dashql_table_name)
                .unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            table_partition,
            max_parallel_queries: raw.dashql_max_parallel_queries.max(1),
            default_row_limit: raw.dashql_default_row_limit,
            first_day_of_week: raw.dashql_first_day_of_week.min(6),
        })
    }

    pub fn table(&self) -> TableSpec<'_> {
        TableSpec {
            project_id: self.project_id.as_deref(),
            dataset_name: &self.dataset_name,
            table_name: &self.table_name,
            partition: self.table_partition,
        }
    }

    pub fn translator(&self) -> Translator<'static> {
        Translator::default()
            .with_first_day_of_week(self.first_day_of_week)
            .with_default_row_limit(Some(self.default_row_limit))
    }

    /// SQL for `config` against the configured table.
    pub fn get_sql(
        &self,
        config: &QueryConfigModel,
        params: Option<&[DashboardParam]>,
    ) -> crate::error::Result<String> {
        self.translator().sql(config, &self.table(), params)
    }

    /// A queue on the current runtime sized by `max_parallel_queries`.
    pub fn work_queue(&self) -> crate::error::Result<WorkQueue> {
        WorkQueue::new(self.max_parallel_queries)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
