//! Query construction and dashboard schema handling for a warehouse-backed
//! dashboard builder.
//!
//! Widget query configs are translated into BigQuery legacy SQL, persisted
//! dashboards are upgraded to the current schema, and query execution is
//! throttled through a bounded [`WorkQueue`].

pub mod builder;
pub mod column_style;
pub mod config;
pub mod dialect;
pub mod error;
pub mod filter;
pub mod model;
pub mod parser;
pub mod queue;
pub mod telemetry;
pub mod time;
pub mod tokens;
pub mod translator;
pub mod version;

pub use config::ExplorerConfig;
pub use error::{Error, Result};
pub use model::{DashboardModel, DashboardParam, QueryConfigModel};
pub use queue::{QueueEvent, QueuedWork, WorkError, WorkQueue};
pub use tokens::replace_tokens;
pub use translator::{get_sql, TablePartition, Translator};
pub use version::{load_dashboard, SchemaVersion, VersionEngine};
