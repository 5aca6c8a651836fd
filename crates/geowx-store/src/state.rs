//! The shared dashboard state and its mutation entry points

use crate::{PersistedState, StoreError, StoreResult};
use geowx_core::{
    temperature_band_rules, validate_outline, validate_rules, ColorRule, Coordinate, DataSource,
    DisplaySink, Polygon, RuleOperator, RuleViolation, TimeRange,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use url::Url;

const EVENT_CAPACITY: usize = 256;

/// Map camera position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: Coordinate,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            // Berlin
            center: Coordinate::new(52.52, 13.41),
            zoom: 10.0,
        }
    }
}

/// What changed in the store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    PolygonAdded { id: String },
    PolygonDeleted { id: String },
    DataSourceChanged { id: String },
    TimeRangeChanged,
    ViewportChanged,
    /// A refresh pass committed a new `(value, color)` pair
    DisplayUpdated { polygon_id: String },
    LoadingChanged(bool),
}

impl StoreEvent {
    /// Whether the displayed values may now be stale
    pub fn triggers_refresh(&self) -> bool {
        matches!(
            self,
            StoreEvent::PolygonAdded { .. }
                | StoreEvent::PolygonDeleted { .. }
                | StoreEvent::DataSourceChanged { .. }
                | StoreEvent::TimeRangeChanged
        )
    }

    /// Whether the persisted configuration changed
    pub fn changes_configuration(&self) -> bool {
        matches!(
            self,
            StoreEvent::PolygonAdded { .. }
                | StoreEvent::PolygonDeleted { .. }
                | StoreEvent::DataSourceChanged { .. }
                | StoreEvent::ViewportChanged
        )
    }
}

/// A finished outline handed over by the drawing surface
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPolygon {
    pub name: Option<String>,
    pub coordinates: Vec<Coordinate>,
    /// May be omitted when exactly one data source exists
    pub data_source_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourcePatch {
    pub name: Option<String>,
    pub field: Option<String>,
    pub api_url: Option<String>,
    pub color_rules: Option<Vec<ColorRule>>,
    /// Replace the rules with a named set; exclusive with `color_rules`
    pub preset: Option<RulePreset>,
}

/// Named rule sets a data source can be reset to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RulePreset {
    TemperatureBands,
}

impl RulePreset {
    pub fn rules(self) -> Vec<ColorRule> {
        match self {
            RulePreset::TemperatureBands => temperature_band_rules(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRule {
    pub id: Option<String>,
    pub operator: RuleOperator,
    pub value: f64,
    pub color: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulePatch {
    pub operator: Option<RuleOperator>,
    pub value: Option<f64>,
    pub color: Option<String>,
}

/// Everything a refresh pass reads, taken under one lock
#[derive(Debug, Clone)]
pub struct RefreshSnapshot {
    pub polygons: Vec<Polygon>,
    pub data_sources: Vec<DataSource>,
    pub time_range: TimeRange,
}

#[derive(Debug, Clone, Default)]
struct MapState {
    polygons: Vec<Polygon>,
    data_sources: Vec<DataSource>,
    time_range: TimeRange,
    viewport: Viewport,
    loading: bool,
}

impl MapState {
    fn data_source_mut(&mut self, id: &str) -> StoreResult<&mut DataSource> {
        self.data_sources
            .iter_mut()
            .find(|ds| ds.id == id)
            .ok_or_else(|| StoreError::DataSourceNotFound(id.to_string()))
    }
}

pub struct MapStore {
    state: RwLock<MapState>,
    events: broadcast::Sender<StoreEvent>,
}

impl MapStore {
    /// Create a store with the given data sources, falling back to the
    /// default source when none are given.
    pub fn new(data_sources: Vec<DataSource>) -> Self {
        let data_sources = if data_sources.is_empty() {
            vec![DataSource::open_meteo_temperature()]
        } else {
            data_sources
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: RwLock::new(MapState {
                data_sources,
                ..MapState::default()
            }),
            events,
        }
    }

    /// Restore a store from a saved snapshot.
    ///
    /// Polygons whose outline no longer validates are dropped.
    pub fn from_persisted(saved: PersistedState) -> Self {
        let mut store = Self::new(saved.data_sources);
        let polygons: Vec<Polygon> = saved
            .polygons
            .into_iter()
            .filter(|p| match validate_outline(&p.coordinates) {
                Ok(()) => true,
                Err(e) => {
                    warn!(polygon = %p.id, error = %e, "dropping invalid saved polygon");
                    false
                }
            })
            .collect();
        info!(polygons = polygons.len(), "restored saved state");

        let state = store.state.get_mut();
        state.polygons = polygons;
        state.viewport = Viewport {
            center: saved.map_center,
            zoom: saved.map_zoom,
        };
        store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        debug!(?event, "store event");
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Snapshot of the persisted subset of the state
    pub async fn persisted(&self) -> PersistedState {
        let state = self.state.read().await;
        PersistedState {
            polygons: state.polygons.clone(),
            data_sources: state.data_sources.clone(),
            map_center: state.viewport.center,
            map_zoom: state.viewport.zoom,
        }
    }

    pub async fn refresh_snapshot(&self) -> RefreshSnapshot {
        let state = self.state.read().await;
        RefreshSnapshot {
            polygons: state.polygons.clone(),
            data_sources: state.data_sources.clone(),
            time_range: state.time_range,
        }
    }

    // Polygons

    pub async fn polygons(&self) -> Vec<Polygon> {
        self.state.read().await.polygons.clone()
    }

    pub async fn polygon(&self, id: &str) -> Option<Polygon> {
        let state = self.state.read().await;
        state.polygons.iter().find(|p| p.id == id).cloned()
    }

    /// Create a polygon from a finished drawing
    pub async fn add_polygon(&self, new: NewPolygon) -> StoreResult<Polygon> {
        let polygon = {
            let mut state = self.state.write().await;

            let data_source_id = match new.data_source_id {
                Some(id) => id,
                None => match state.data_sources.as_slice() {
                    [only] => only.id.clone(),
                    _ => {
                        return Err(StoreError::InvalidInput(
                            "dataSourceId is required when several data sources exist".into(),
                        ))
                    }
                },
            };
            let name = new
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("Polygon {}", state.polygons.len() + 1));
            let id = format!("polygon-{}", uuid::Uuid::new_v4());

            let polygon = Polygon::new(id, name, new.coordinates, data_source_id)?;
            state.polygons.push(polygon.clone());
            polygon
        };

        info!(polygon = %polygon.id, name = %polygon.name, "polygon added");
        self.emit(StoreEvent::PolygonAdded {
            id: polygon.id.clone(),
        });
        Ok(polygon)
    }

    pub async fn delete_polygon(&self, id: &str) -> StoreResult<Polygon> {
        let removed = {
            let mut state = self.state.write().await;
            let idx = state
                .polygons
                .iter()
                .position(|p| p.id == id)
                .ok_or_else(|| StoreError::PolygonNotFound(id.to_string()))?;
            state.polygons.remove(idx)
        };

        info!(polygon = %id, "polygon deleted");
        self.emit(StoreEvent::PolygonDeleted { id: id.to_string() });
        Ok(removed)
    }

    /// Replace a polygon's displayed value and color together.
    ///
    /// Returns `false` if the polygon was deleted in the meantime.
    pub async fn commit_display(&self, polygon_id: &str, value: f64, color: &str) -> bool {
        {
            let mut state = self.state.write().await;
            let Some(polygon) = state.polygons.iter_mut().find(|p| p.id == polygon_id) else {
                return false;
            };
            polygon.current_value = Some(value);
            polygon.current_color = color.to_string();
        }

        self.emit(StoreEvent::DisplayUpdated {
            polygon_id: polygon_id.to_string(),
        });
        true
    }

    // Data sources

    pub async fn data_sources(&self) -> Vec<DataSource> {
        self.state.read().await.data_sources.clone()
    }

    pub async fn data_source(&self, id: &str) -> Option<DataSource> {
        let state = self.state.read().await;
        state.data_sources.iter().find(|ds| ds.id == id).cloned()
    }

    pub async fn add_data_source(&self, source: DataSource) -> StoreResult<DataSource> {
        check_api_url(&source.api_url)?;
        check_field(&source.field)?;
        check_rules(&source.id, &source.color_rules)?;
        {
            let mut state = self.state.write().await;
            if state.data_sources.iter().any(|ds| ds.id == source.id) {
                return Err(StoreError::DuplicateDataSource(source.id));
            }
            state.data_sources.push(source.clone());
        }

        self.emit(StoreEvent::DataSourceChanged {
            id: source.id.clone(),
        });
        Ok(source)
    }

    pub async fn update_data_source(
        &self,
        id: &str,
        patch: DataSourcePatch,
    ) -> StoreResult<DataSource> {
        if let Some(url) = &patch.api_url {
            check_api_url(url)?;
        }
        if let Some(field) = &patch.field {
            check_field(field)?;
        }
        let color_rules = match (patch.color_rules, patch.preset) {
            (Some(_), Some(_)) => {
                return Err(StoreError::InvalidInput(
                    "colorRules and preset cannot be combined".into(),
                ))
            }
            (rules, preset) => rules.or_else(|| preset.map(RulePreset::rules)),
        };
        if let Some(rules) = &color_rules {
            check_rules(id, rules)?;
        }

        let updated = {
            let mut state = self.state.write().await;
            let source = state.data_source_mut(id)?;
            if let Some(name) = patch.name {
                source.name = name;
            }
            if let Some(field) = patch.field {
                source.field = field;
            }
            if let Some(api_url) = patch.api_url {
                source.api_url = api_url;
            }
            if let Some(rules) = color_rules {
                source.color_rules = rules;
            }
            source.clone()
        };

        self.emit(StoreEvent::DataSourceChanged { id: id.to_string() });
        Ok(updated)
    }

    /// Append a rule; an id is generated when none is given.
    ///
    /// Rules that conflict with existing ones are still stored; see
    /// [`MapStore::validate_rules`].
    pub async fn add_rule(&self, data_source_id: &str, new: NewRule) -> StoreResult<ColorRule> {
        check_operator(&new.operator)?;
        let rule = {
            let mut state = self.state.write().await;
            let source = state.data_source_mut(data_source_id)?;

            let id = new
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| format!("rule-{}", uuid::Uuid::new_v4().simple()));
            if source.rule(&id).is_some() {
                return Err(StoreError::DuplicateRule {
                    data_source_id: data_source_id.to_string(),
                    rule_id: id,
                });
            }

            let rule = ColorRule::new(id, new.operator, new.value, new.color);
            source.color_rules.push(rule.clone());
            rule
        };

        self.emit(StoreEvent::DataSourceChanged {
            id: data_source_id.to_string(),
        });
        Ok(rule)
    }

    pub async fn update_rule(
        &self,
        data_source_id: &str,
        rule_id: &str,
        patch: RulePatch,
    ) -> StoreResult<ColorRule> {
        if let Some(operator) = &patch.operator {
            check_operator(operator)?;
        }
        let rule = {
            let mut state = self.state.write().await;
            let source = state.data_source_mut(data_source_id)?;
            let rule = source
                .color_rules
                .iter_mut()
                .find(|r| r.id == rule_id)
                .ok_or_else(|| StoreError::RuleNotFound {
                    data_source_id: data_source_id.to_string(),
                    rule_id: rule_id.to_string(),
                })?;

            if let Some(operator) = patch.operator {
                rule.operator = operator;
            }
            if let Some(value) = patch.value {
                rule.value = value;
            }
            if let Some(color) = patch.color {
                rule.color = color;
            }
            rule.clone()
        };

        self.emit(StoreEvent::DataSourceChanged {
            id: data_source_id.to_string(),
        });
        Ok(rule)
    }

    pub async fn delete_rule(&self, data_source_id: &str, rule_id: &str) -> StoreResult<ColorRule> {
        let removed = {
            let mut state = self.state.write().await;
            let source = state.data_source_mut(data_source_id)?;
            let idx = source
                .color_rules
                .iter()
                .position(|r| r.id == rule_id)
                .ok_or_else(|| StoreError::RuleNotFound {
                    data_source_id: data_source_id.to_string(),
                    rule_id: rule_id.to_string(),
                })?;
            source.color_rules.remove(idx)
        };

        self.emit(StoreEvent::DataSourceChanged {
            id: data_source_id.to_string(),
        });
        Ok(removed)
    }

    /// Advisory findings for a data source's rule set
    pub async fn validate_rules(&self, data_source_id: &str) -> StoreResult<Vec<RuleViolation>> {
        let state = self.state.read().await;
        let source = state
            .data_sources
            .iter()
            .find(|ds| ds.id == data_source_id)
            .ok_or_else(|| StoreError::DataSourceNotFound(data_source_id.to_string()))?;
        Ok(validate_rules(&source.color_rules))
    }

    // Time, viewport, loading

    pub async fn time_range(&self) -> TimeRange {
        self.state.read().await.time_range
    }

    pub async fn set_time_range(&self, range: TimeRange) {
        if range.is_inverted() {
            debug!(start = %range.start, end = %range.end, "inverted time range accepted");
        }
        {
            let mut state = self.state.write().await;
            if state.time_range == range {
                return;
            }
            state.time_range = range;
        }
        self.emit(StoreEvent::TimeRangeChanged);
    }

    pub async fn viewport(&self) -> Viewport {
        self.state.read().await.viewport
    }

    pub async fn set_viewport(&self, viewport: Viewport) {
        self.state.write().await.viewport = viewport;
        self.emit(StoreEvent::ViewportChanged);
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }

    pub async fn set_loading(&self, loading: bool) {
        self.state.write().await.loading = loading;
        self.emit(StoreEvent::LoadingChanged(loading));
    }
}

impl Default for MapStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait::async_trait]
impl DisplaySink for MapStore {
    async fn commit_display(
        &self,
        polygon_id: &str,
        value: f64,
        color: &str,
    ) -> anyhow::Result<bool> {
        Ok(MapStore::commit_display(self, polygon_id, value, color).await)
    }
}

/// An empty URL leaves the endpoint to the provider configuration
fn check_api_url(url: &str) -> StoreResult<()> {
    if url.trim().is_empty() {
        return Ok(());
    }
    Url::parse(url)
        .map(|_| ())
        .map_err(|e| StoreError::InvalidApiUrl(format!("{}: {}", url, e)))
}

fn check_field(field: &str) -> StoreResult<()> {
    if field.trim().is_empty() {
        return Err(StoreError::InvalidInput("field must not be empty".into()));
    }
    Ok(())
}

/// Edits only take the five known operators; unknown ones are tolerated
/// when loading saved state but never accepted as new input.
fn check_operator(operator: &RuleOperator) -> StoreResult<()> {
    match operator {
        RuleOperator::Unrecognized(op) => Err(StoreError::InvalidInput(format!(
            "unsupported rule operator {:?}, expected one of =, <, >, <=, >=",
            op
        ))),
        _ => Ok(()),
    }
}

fn check_rules(data_source_id: &str, rules: &[ColorRule]) -> StoreResult<()> {
    for (i, rule) in rules.iter().enumerate() {
        check_operator(&rule.operator)?;
        if rules[..i].iter().any(|r| r.id == rule.id) {
            return Err(StoreError::DuplicateRule {
                data_source_id: data_source_id.to_string(),
                rule_id: rule.id.clone(),
            });
        }
    }
    Ok(())
}
