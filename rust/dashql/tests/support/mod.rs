#![allow(dead_code)]

use dashql::{model::DashboardParam, telemetry, translator::TableSpec, TablePartition};
use serde_json::{json, Value};
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

pub fn init_tracing() {
    TRACING_INIT.call_once(telemetry::init_test_tracing);
}

/// A dashboard saved before version tags and structured widget configs.
pub fn legacy_dashboard() -> Value {
    json!({
        "title": "Network throughput",
        "owner": "perf-team@example.com",
        "params": [
            {"name": "PRODUCT", "value": "widget-factory"},
            {"name": "DAYS", "value": 7}
        ],
        "children": [{
            "id": "c1",
            "container": {"columns": 2},
            "children": [
                {
                    "id": "w-iperf",
                    "title": "iperf p99",
                    "datasource": {
                        "querystring": "product_name=%25%25PRODUCT%25%25&test=iperf&metric=throughput&start_date=14&metadata=zone:us-east1"
                    }
                },
                {
                    "id": "w-custom",
                    "title": "Raw rows",
                    "datasource": {
                        "query": "SELECT * FROM [samples.results] WHERE product_name = '%%PRODUCT%%' LIMIT %%DAYS%%;"
                    }
                }
            ]
        }]
    })
}

/// A dashboard already at the current schema version.
pub fn current_dashboard() -> Value {
    json!({
        "version": "2",
        "title": "Current",
        "children": [{
            "type": "container",
            "id": "c1",
            "children": [{
                "type": "chart",
                "id": "w1",
                "datasource": {"config": {}, "custom_query": false}
            }]
        }]
    })
}

pub fn sample_table() -> TableSpec<'static> {
    TableSpec {
        project_id: Some("perf-project"),
        dataset_name: "samples",
        table_name: "results",
        partition: TablePartition::OneTable,
    }
}

pub fn params(pairs: &[(&str, &str)]) -> Vec<DashboardParam> {
    pairs
        .iter()
        .map(|(name, value)| DashboardParam::new(*name, *value))
        .collect()
}
