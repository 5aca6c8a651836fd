//! Threshold rule matching, priority ordering, and rule set validation

use crate::types::{ColorRule, OperatorClass, RuleOperator, DEFAULT_COLOR};
use serde::Serialize;
use std::fmt;

/// Tolerance for `=` rules; upstream values carry floating point noise
pub const EQ_EPSILON: f64 = 0.01;

/// Check whether a value satisfies a single rule.
///
/// NaN satisfies nothing.
pub fn matches(value: f64, rule: &ColorRule) -> bool {
    match rule.operator {
        RuleOperator::Eq => (value - rule.value).abs() < EQ_EPSILON,
        RuleOperator::Lt => value < rule.value,
        RuleOperator::Gt => value > rule.value,
        RuleOperator::Le => value <= rule.value,
        RuleOperator::Ge => value >= rule.value,
        RuleOperator::Unrecognized(_) => false,
    }
}

/// Evaluation order for a rule set.
///
/// Equality rules come first in their stored order. The remaining rules keep
/// the slots their class occupies in storage order, but each class is sorted
/// within its own slots: `>`/`>=` by descending threshold, `<`/`<=` by
/// ascending threshold. Unrecognized operators stay where they are.
pub fn prioritize(rules: &[ColorRule]) -> Vec<&ColorRule> {
    let of_class = |class: OperatorClass| {
        rules
            .iter()
            .filter(move |r| r.operator.class() == class)
            .collect::<Vec<_>>()
    };

    let mut upper = of_class(OperatorClass::Upper);
    upper.sort_by(|a, b| b.value.total_cmp(&a.value));
    let mut lower = of_class(OperatorClass::Lower);
    lower.sort_by(|a, b| a.value.total_cmp(&b.value));

    let mut upper = upper.into_iter();
    let mut lower = lower.into_iter();

    let mut ordered = of_class(OperatorClass::Equality);
    ordered.reserve(rules.len() - ordered.len());
    for rule in rules {
        let next = match rule.operator.class() {
            OperatorClass::Equality => continue,
            OperatorClass::Upper => upper.next(),
            OperatorClass::Lower => lower.next(),
            OperatorClass::Unclassified => Some(rule),
        };
        ordered.extend(next);
    }
    ordered
}

/// Resolve the display color for a value.
///
/// Returns [`DEFAULT_COLOR`] for an empty rule set or when nothing matches.
pub fn resolve_color<'a>(value: f64, rules: &'a [ColorRule]) -> &'a str {
    prioritize(rules)
        .into_iter()
        .find(|rule| matches(value, rule))
        .map(|rule| rule.color.as_str())
        .unwrap_or(DEFAULT_COLOR)
}

/// Advisory finding about a rule set
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleViolation {
    /// A second `=` rule on a threshold already covered
    DuplicateEquality { rule_id: String, value: f64 },

    /// Two non-equality rules with identical operator and threshold
    Conflict {
        first_id: String,
        second_id: String,
        operator: RuleOperator,
        value: f64,
    },
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleViolation::DuplicateEquality { value, .. } => {
                write!(f, "Duplicate equality rule for value {}", value)
            }
            RuleViolation::Conflict {
                operator, value, ..
            } => write!(
                f,
                "Conflicting rules: {op} {v} and {op} {v}",
                op = operator,
                v = value
            ),
        }
    }
}

/// Report duplicate and structurally identical rules.
///
/// Only exact duplicates are detected: `> 5` and `>= 3` overlap for every
/// value above 5 but are not reported.
pub fn validate_rules(rules: &[ColorRule]) -> Vec<RuleViolation> {
    let mut violations = Vec::new();

    let mut seen_equalities: Vec<f64> = Vec::new();
    for rule in rules.iter().filter(|r| r.operator == RuleOperator::Eq) {
        if seen_equalities.contains(&rule.value) {
            violations.push(RuleViolation::DuplicateEquality {
                rule_id: rule.id.clone(),
                value: rule.value,
            });
        }
        seen_equalities.push(rule.value);
    }

    let ranged: Vec<&ColorRule> = rules
        .iter()
        .filter(|r| r.operator != RuleOperator::Eq)
        .collect();
    for (i, first) in ranged.iter().enumerate() {
        for second in &ranged[i + 1..] {
            if first.operator == second.operator && first.value == second.value {
                violations.push(RuleViolation::Conflict {
                    first_id: first.id.clone(),
                    second_id: second.id.clone(),
                    operator: first.operator.clone(),
                    value: first.value,
                });
            }
        }
    }

    violations
}

/// Cascade of `>=` bands for temperatures in °C
pub fn temperature_band_rules() -> Vec<ColorRule> {
    vec![
        ColorRule::new("temp-1", RuleOperator::Lt, 0.0, "#0066cc"),
        ColorRule::new("temp-2", RuleOperator::Ge, 0.0, "#00cc66"),
        ColorRule::new("temp-3", RuleOperator::Ge, 20.0, "#ffcc00"),
        ColorRule::new("temp-4", RuleOperator::Ge, 30.0, "#ff6600"),
        ColorRule::new("temp-5", RuleOperator::Ge, 40.0, "#cc0000"),
    ]
}

/// A sampled value and the color it resolves to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorStop {
    pub value: f64,
    pub color: String,
}

/// Sample `steps` evenly spaced values across `[min, max]` and resolve each.
pub fn color_preview(rules: &[ColorRule], min: f64, max: f64, steps: usize) -> Vec<ColorStop> {
    let stop = |value: f64| ColorStop {
        value,
        color: resolve_color(value, rules).to_string(),
    };

    match steps {
        0 => Vec::new(),
        1 => vec![stop(min)],
        _ => {
            let step = (max - min) / (steps - 1) as f64;
            (0..steps).map(|i| stop(min + step * i as f64)).collect()
        }
    }
}

/// Linear interpolation between two `#rrggbb` colors.
///
/// Returns `from` unchanged if either color cannot be parsed.
pub fn interpolate_color(from: &str, to: &str, factor: f64) -> String {
    let (Some(a), Some(b)) = (parse_hex(from), parse_hex(to)) else {
        return from.to_string();
    };

    let channel = |x: u8, y: u8| -> u8 {
        let mixed = f64::from(x) + (f64::from(y) - f64::from(x)) * factor;
        (mixed + 0.5).floor().clamp(0.0, 255.0) as u8
    };

    format!(
        "#{:02x}{:02x}{:02x}",
        channel(a[0], b[0]),
        channel(a[1], b[1]),
        channel(a[2], b[2])
    )
}

fn parse_hex(color: &str) -> Option<[u8; 3]> {
    let hex = color.strip_prefix('#').unwrap_or(color);
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([byte(0)?, byte(2)?, byte(4)?])
}
