use anyhow::Result;
use chrono::NaiveDate;

use crate::{Coordinate, WeatherSeries};

/// One daily-series request for a single representative point
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRequest {
    pub location: Coordinate,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub fields: Vec<String>,
    /// Endpoint configured on the data source; providers fall back to their
    /// own base URL when empty.
    pub endpoint: Option<String>,
}

#[async_trait::async_trait]
pub trait WeatherProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn daily_series(&self, request: &SeriesRequest) -> Result<WeatherSeries>;
}

#[async_trait::async_trait]
pub trait DisplaySink: Send + Sync {
    /// Store a resolved `(value, color)` pair for a polygon in one step.
    ///
    /// Returns `false` when the polygon no longer exists.
    async fn commit_display(&self, polygon_id: &str, value: f64, color: &str) -> Result<bool>;
}
