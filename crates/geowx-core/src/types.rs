//! Core data types for polygons, data sources, and weather series

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Color shown for polygons that have no resolved value or no matching rule
pub const DEFAULT_COLOR: &str = "#cccccc";

/// Archive endpoint used by the default data source
pub const OPEN_METEO_ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";

/// Comparison operator of a color rule
///
/// Operators outside the closed set survive deserialization as
/// `Unrecognized` so a stored rule set never fails to load; they never match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleOperator {
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
    Unrecognized(String),
}

/// Directional class used when ordering rules by priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorClass {
    Equality,
    /// `>` and `>=`
    Upper,
    /// `<` and `<=`
    Lower,
    Unclassified,
}

impl RuleOperator {
    pub fn as_str(&self) -> &str {
        match self {
            RuleOperator::Eq => "=",
            RuleOperator::Lt => "<",
            RuleOperator::Gt => ">",
            RuleOperator::Le => "<=",
            RuleOperator::Ge => ">=",
            RuleOperator::Unrecognized(op) => op,
        }
    }

    pub fn class(&self) -> OperatorClass {
        match self {
            RuleOperator::Eq => OperatorClass::Equality,
            RuleOperator::Gt | RuleOperator::Ge => OperatorClass::Upper,
            RuleOperator::Lt | RuleOperator::Le => OperatorClass::Lower,
            RuleOperator::Unrecognized(_) => OperatorClass::Unclassified,
        }
    }
}

impl From<String> for RuleOperator {
    fn from(op: String) -> Self {
        match op.trim() {
            "=" => RuleOperator::Eq,
            "<" => RuleOperator::Lt,
            ">" => RuleOperator::Gt,
            "<=" => RuleOperator::Le,
            ">=" => RuleOperator::Ge,
            _ => RuleOperator::Unrecognized(op),
        }
    }
}

impl From<&str> for RuleOperator {
    fn from(op: &str) -> Self {
        RuleOperator::from(op.to_string())
    }
}

impl From<RuleOperator> for String {
    fn from(op: RuleOperator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for RuleOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `(operator, threshold, color)` classification unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColorRule {
    pub id: String,
    pub operator: RuleOperator,
    pub value: f64,
    pub color: String,
}

impl ColorRule {
    pub fn new(
        id: impl Into<String>,
        operator: impl Into<RuleOperator>,
        value: f64,
        color: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            operator: operator.into(),
            value,
            color: color.into(),
        }
    }
}

/// A named remote data feed plus its classification rule set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub id: String,
    pub name: String,
    /// Series column requested from the provider and reduced
    pub field: String,
    pub api_url: String,
    #[serde(default)]
    pub color_rules: Vec<ColorRule>,
}

impl DataSource {
    /// The data source every fresh installation starts with
    pub fn open_meteo_temperature() -> Self {
        Self {
            id: "open-meteo-temp".to_string(),
            name: "Temperature (°C)".to_string(),
            field: "temperature_2m_mean".to_string(),
            api_url: OPEN_METEO_ARCHIVE_URL.to_string(),
            color_rules: vec![
                ColorRule::new("1", RuleOperator::Lt, 10.0, "#ff4d4f"),
                ColorRule::new("2", RuleOperator::Ge, 10.0, "#1890ff"),
                ColorRule::new("3", RuleOperator::Ge, 25.0, "#52c41a"),
            ],
        }
    }

    pub fn rule(&self, rule_id: &str) -> Option<&ColorRule> {
        self.color_rules.iter().find(|r| r.id == rule_id)
    }
}

/// A (latitude, longitude) pair, serialized as `[lat, lng]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from([latitude, longitude]: [f64; 2]) -> Self {
        Self::new(latitude, longitude)
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(c: Coordinate) -> Self {
        [c.latitude, c.longitude]
    }
}

/// A user-drawn region of interest bound to one data source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Polygon {
    pub id: String,
    pub name: String,
    pub coordinates: Vec<Coordinate>,
    pub data_source_id: String,
    pub current_color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<f64>,
}

/// Query window mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeMode {
    Single,
    Range,
}

/// The instant or interval the dashboard is currently showing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub mode: TimeMode,
}

impl TimeRange {
    pub fn single(at: NaiveDateTime) -> Self {
        Self {
            start: at,
            end: at,
            mode: TimeMode::Single,
        }
    }

    /// Inverted bounds are accepted; reducing over them yields NaN.
    pub fn range(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start,
            end,
            mode: TimeMode::Range,
        }
    }

    pub fn is_inverted(&self) -> bool {
        self.mode == TimeMode::Range && self.start > self.end
    }

    /// Days to request from the provider.
    ///
    /// Single-instant queries are padded by a day on each side so the
    /// provider's own date rounding cannot drop the requested day.
    pub fn query_window(&self) -> (NaiveDate, NaiveDate) {
        let start = self.start.date();
        let end = self.end.date();
        match self.mode {
            TimeMode::Single => (
                start.pred_opt().unwrap_or(start),
                end.succ_opt().unwrap_or(end),
            ),
            TimeMode::Range => (start, end),
        }
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::single(Local::now().naive_local())
    }
}

/// Daily series as returned by the provider: a `time` column plus one
/// positionally aligned column per requested field
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WeatherSeries {
    #[serde(default)]
    pub time: Vec<String>,

    #[serde(flatten)]
    pub columns: HashMap<String, Vec<ObservationValue>>,
}

impl WeatherSeries {
    /// Exact-match position of a day key in `time`
    pub fn position(&self, day: &str) -> Option<usize> {
        self.time.iter().position(|t| t == day)
    }

    pub fn column(&self, field: &str) -> Option<&[ObservationValue]> {
        self.columns.get(field).map(Vec::as_slice)
    }

    pub fn numeric_at(&self, field: &str, index: usize) -> Option<f64> {
        self.column(field)?.get(index)?.as_f64()
    }
}

/// A series cell; anything that is not a number is treated as missing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ObservationValue {
    Float(f64),
    Integer(i64),
    Bool(bool),
    Text(String),
    Null,
}

impl ObservationValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ObservationValue::Float(v) => Some(*v),
            ObservationValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ObservationValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_operator_serde() {
        let rule: ColorRule =
            serde_json::from_str(r##"{"id":"a","operator":">=","value":3,"color":"#fff"}"##)
                .unwrap();
        assert_eq!(rule.operator, RuleOperator::Ge);
        assert_eq!(rule.value, 3.0);

        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains(r#""operator":">=""#));
    }

    #[test]
    fn test_unknown_operator_is_kept() {
        let rule: ColorRule =
            serde_json::from_str(r##"{"id":"a","operator":"!=","value":3,"color":"#fff"}"##)
                .unwrap();
        assert_eq!(rule.operator, RuleOperator::Unrecognized("!=".into()));
        assert_eq!(rule.operator.class(), OperatorClass::Unclassified);
        assert_eq!(serde_json::to_value(&rule).unwrap()["operator"], "!=");
    }

    #[test]
    fn test_polygon_camel_case() {
        let json = r##"{
            "id": "p1",
            "name": "Field",
            "coordinates": [[52.5, 13.4], [52.6, 13.4], [52.6, 13.5]],
            "dataSourceId": "open-meteo-temp",
            "currentColor": "#cccccc"
        }"##;
        let polygon: Polygon = serde_json::from_str(json).unwrap();
        assert_eq!(polygon.coordinates[1], Coordinate::new(52.6, 13.4));
        assert_eq!(polygon.current_value, None);

        let out = serde_json::to_value(&polygon).unwrap();
        assert_eq!(out["dataSourceId"], "open-meteo-temp");
        assert!(out.get("currentValue").is_none());
    }

    #[test]
    fn test_series_columns() {
        let json = r#"{"time":["2024-01-01","2024-01-02"],"temperature_2m_mean":[1.5,null]}"#;
        let series: WeatherSeries = serde_json::from_str(json).unwrap();

        assert_eq!(series.position("2024-01-02"), Some(1));
        assert_eq!(series.numeric_at("temperature_2m_mean", 0), Some(1.5));
        assert_eq!(series.numeric_at("temperature_2m_mean", 1), None);
        assert_eq!(series.numeric_at("missing", 0), None);
    }

    #[test]
    fn test_observation_value_conversions() {
        assert_eq!(ObservationValue::Integer(42).as_f64(), Some(42.0));
        assert_eq!(ObservationValue::Text("n/a".into()).as_f64(), None);
        assert!(ObservationValue::Null.is_null());
    }

    #[test]
    fn test_single_query_window_is_padded() {
        let range = TimeRange::single(at(2024, 3, 1, 13));
        assert_eq!(
            range.query_window(),
            (
                NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()
            )
        );
    }

    #[test]
    fn test_range_query_window_is_exact() {
        let range = TimeRange::range(at(2024, 1, 1, 0), at(2024, 1, 5, 23));
        assert_eq!(
            range.query_window(),
            (
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
            )
        );
        assert!(!range.is_inverted());
        assert!(TimeRange::range(at(2024, 1, 5, 0), at(2024, 1, 1, 0)).is_inverted());
    }

    #[test]
    fn test_time_range_serde() {
        let range = TimeRange::single(at(2024, 6, 1, 12));
        let json = serde_json::to_string(&range).unwrap();
        assert!(json.contains(r#""mode":"single""#));
        let back: TimeRange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, range);
    }
}
