//! Application state for the dashboard
//!
//! [`MapStore`] is the single owner of polygons, data sources, the time
//! range and the map viewport. Every mutation goes through one of its
//! methods and is announced as a [`StoreEvent`]; persistence is an explicit
//! load/save of a [`PersistedState`] snapshot.

pub mod persist;
pub mod state;

pub use persist::*;
pub use state::*;

use geowx_core::GeometryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Polygon not found: {0}")]
    PolygonNotFound(String),

    #[error("Data source not found: {0}")]
    DataSourceNotFound(String),

    #[error("Rule {rule_id} not found in data source {data_source_id}")]
    RuleNotFound {
        data_source_id: String,
        rule_id: String,
    },

    #[error("Rule {rule_id} already exists in data source {data_source_id}")]
    DuplicateRule {
        data_source_id: String,
        rule_id: String,
    },

    #[error("Data source already exists: {0}")]
    DuplicateDataSource(String),

    #[error("Invalid polygon outline: {0}")]
    InvalidOutline(#[from] GeometryError),

    #[error("Invalid API URL: {0}")]
    InvalidApiUrl(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
