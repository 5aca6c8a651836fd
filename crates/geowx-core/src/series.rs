//! Point lookups and interval means over day-keyed series

use crate::types::WeatherSeries;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use std::fmt::Display;

/// Day resolution used by the provider's `time` column
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Anything that can be formatted to the series' day key
pub trait DayKey {
    fn day_key(&self) -> String;
}

impl DayKey for NaiveDate {
    fn day_key(&self) -> String {
        self.format(DAY_FORMAT).to_string()
    }
}

impl DayKey for NaiveDateTime {
    fn day_key(&self) -> String {
        self.date().day_key()
    }
}

impl<Tz: TimeZone> DayKey for DateTime<Tz>
where
    Tz::Offset: Display,
{
    fn day_key(&self) -> String {
        self.format(DAY_FORMAT).to_string()
    }
}

/// Pre-formatted keys are used as-is
impl DayKey for str {
    fn day_key(&self) -> String {
        self.to_string()
    }
}

/// Running mean over the numeric cells of a slice
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    sum: f64,
    count: usize,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Value of `field` on the day of `instant`.
///
/// Returns NaN when the day is not in the series or the cell is missing or
/// non-numeric. Callers treat NaN as "nothing to display".
pub fn value_at<D: DayKey + ?Sized>(series: &WeatherSeries, instant: &D, field: &str) -> f64 {
    series
        .position(&instant.day_key())
        .and_then(|idx| series.numeric_at(field, idx))
        .unwrap_or(f64::NAN)
}

/// Arithmetic mean of `field` over the inclusive index range spanned by the
/// days of `start` and `end`.
///
/// Both days must be present and `start` must not sort after `end`;
/// otherwise NaN. Non-numeric cells are left out of both sum and count, so a
/// range with no numeric cell is NaN as well. Samples are weighted by
/// position only.
pub fn average_over<S, E>(series: &WeatherSeries, start: &S, end: &E, field: &str) -> f64
where
    S: DayKey + ?Sized,
    E: DayKey + ?Sized,
{
    let (Some(start_idx), Some(end_idx)) = (
        series.position(&start.day_key()),
        series.position(&end.day_key()),
    ) else {
        return f64::NAN;
    };
    if start_idx > end_idx {
        return f64::NAN;
    }
    let Some(column) = series.column(field) else {
        return f64::NAN;
    };

    let mut acc = Accumulator::new();
    column
        .iter()
        .take(end_idx + 1)
        .skip(start_idx)
        .filter_map(|cell| cell.as_f64())
        .for_each(|v| acc.add(v));

    acc.mean().unwrap_or(f64::NAN)
}
