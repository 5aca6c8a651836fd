//! One refresh pass over every tracked polygon

use anyhow::{Context, Result};
use futures::future::join_all;
use geowx_core::{
    average_over, resolve_color, value_at, DataSource, DisplaySink, Polygon, SeriesRequest,
    TimeMode, TimeRange, WeatherProvider,
};
use geowx_store::MapStore;
use tracing::{debug, error, info, instrument};

/// Result of refreshing one polygon
#[derive(Debug, Clone, PartialEq)]
pub enum PolygonOutcome {
    Updated { value: f64, color: String },
    /// The polygon's data source does not exist (yet)
    Unconfigured,
    /// The series had no usable value for the requested time
    NoData,
    /// The polygon was deleted before its result arrived
    Discarded,
    Failed(String),
}

/// Tally of a finished pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub updated: usize,
    pub unconfigured: usize,
    pub no_data: usize,
    pub discarded: usize,
    pub failed: usize,
}

impl RefreshReport {
    fn record(&mut self, outcome: &PolygonOutcome) {
        match outcome {
            PolygonOutcome::Updated { .. } => self.updated += 1,
            PolygonOutcome::Unconfigured => self.unconfigured += 1,
            PolygonOutcome::NoData => self.no_data += 1,
            PolygonOutcome::Discarded => self.discarded += 1,
            PolygonOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.updated + self.unconfigured + self.no_data + self.discarded + self.failed
    }
}

/// Round half up to two decimals for display
pub fn round_for_display(value: f64) -> f64 {
    (value * 100.0 + 0.5).floor() / 100.0
}

/// Refresh every polygon concurrently and wait for all of them.
///
/// Each polygon is independent: a failure is logged and leaves that
/// polygon's displayed pair untouched without affecting the others.
pub async fn refresh_all<P, S>(
    polygons: &[Polygon],
    time_range: &TimeRange,
    data_sources: &[DataSource],
    provider: &P,
    sink: &S,
) -> RefreshReport
where
    P: WeatherProvider + ?Sized,
    S: DisplaySink + ?Sized,
{
    let outcomes = join_all(
        polygons
            .iter()
            .map(|polygon| refresh_polygon(polygon, time_range, data_sources, provider, sink)),
    )
    .await;

    let mut report = RefreshReport::default();
    for outcome in &outcomes {
        report.record(outcome);
    }
    report
}

pub async fn refresh_polygon<P, S>(
    polygon: &Polygon,
    time_range: &TimeRange,
    data_sources: &[DataSource],
    provider: &P,
    sink: &S,
) -> PolygonOutcome
where
    P: WeatherProvider + ?Sized,
    S: DisplaySink + ?Sized,
{
    let Some(source) = data_sources
        .iter()
        .find(|ds| ds.id == polygon.data_source_id)
    else {
        debug!(polygon = %polygon.id, data_source = %polygon.data_source_id, "no data source, skipping");
        return PolygonOutcome::Unconfigured;
    };

    let resolved = match resolve_display(polygon, source, time_range, provider).await {
        Ok(Some(resolved)) => resolved,
        Ok(None) => {
            debug!(polygon = %polygon.id, "no value for the requested time, keeping display");
            return PolygonOutcome::NoData;
        }
        Err(e) => {
            error!(polygon = %polygon.id, error = ?e, "Error updating polygon");
            return PolygonOutcome::Failed(format!("{:#}", e));
        }
    };

    let (value, color) = resolved;
    match sink.commit_display(&polygon.id, value, &color).await {
        Ok(true) => PolygonOutcome::Updated { value, color },
        Ok(false) => {
            debug!(polygon = %polygon.id, "polygon removed during refresh, result dropped");
            PolygonOutcome::Discarded
        }
        Err(e) => {
            error!(polygon = %polygon.id, error = ?e, "Error committing polygon display");
            PolygonOutcome::Failed(format!("{:#}", e))
        }
    }
}

/// Fetch, reduce and classify; `None` when the reduced value is NaN
async fn resolve_display<P>(
    polygon: &Polygon,
    source: &DataSource,
    time_range: &TimeRange,
    provider: &P,
) -> Result<Option<(f64, String)>>
where
    P: WeatherProvider + ?Sized,
{
    let location = polygon.centroid().context("polygon has no vertices")?;
    let (start, end) = time_range.query_window();
    let request = SeriesRequest {
        location,
        start,
        end,
        fields: vec![source.field.clone()],
        endpoint: Some(source.api_url.clone()).filter(|url| !url.is_empty()),
    };

    let series = provider
        .daily_series(&request)
        .await
        .with_context(|| format!("{} request for polygon {}", provider.name(), polygon.id))?;

    let value = match time_range.mode {
        TimeMode::Single => value_at(&series, &time_range.start, &source.field),
        TimeMode::Range => average_over(
            &series,
            &time_range.start,
            &time_range.end,
            &source.field,
        ),
    };
    if value.is_nan() {
        return Ok(None);
    }

    let color = resolve_color(value, &source.color_rules).to_string();
    Ok(Some((round_for_display(value), color)))
}

/// Run one pass against the store's current snapshot.
///
/// The loading flag is raised for the duration of the pass.
#[instrument(skip_all)]
pub async fn run_pass<P>(store: &MapStore, provider: &P) -> RefreshReport
where
    P: WeatherProvider + ?Sized,
{
    let snapshot = store.refresh_snapshot().await;
    if snapshot.polygons.is_empty() {
        debug!("no polygons to refresh");
        return RefreshReport::default();
    }

    store.set_loading(true).await;
    let report = refresh_all(
        &snapshot.polygons,
        &snapshot.time_range,
        &snapshot.data_sources,
        provider,
        store,
    )
    .await;
    store.set_loading(false).await;

    info!(
        polygons = report.total(),
        updated = report.updated,
        failed = report.failed,
        no_data = report.no_data,
        "Refresh pass complete"
    );
    report
}
