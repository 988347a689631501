//! Per-feature scorers
//!
//! Pure functions, one per scoring method. Each returns a score in [0, 1] (or `None`
//! when the farm or species side is missing) together with the human-readable reason
//! that ends up in the explanation trace.

use crate::config::CompatibilityMatrix;
use crate::record::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureScore {
    pub score: Option<f64>,
    pub reason: String,
}

impl FeatureScore {
    fn scored(score: f64, reason: impl Into<String>) -> Self {
        Self {
            score: Some(score),
            reason: reason.into(),
        }
    }

    fn missing(reason: &str) -> Self {
        Self {
            score: None,
            reason: reason.to_string(),
        }
    }
}

/// 1.0 inside `[min, max]` (inclusive), 0.0 outside
pub fn numeric_range_score(
    value: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
) -> FeatureScore {
    match (value, min, max) {
        (Some(v), Some(lo), Some(hi)) => {
            if lo <= v && v <= hi {
                FeatureScore::scored(1.0, "inside preferred range")
            } else if v < lo {
                FeatureScore::scored(0.0, "below minimum")
            } else {
                FeatureScore::scored(0.0, "above maximum")
            }
        }
        _ => FeatureScore::missing("missing data"),
    }
}

/// `exact_score` when `value` is in `preferred` (case-sensitive), 0.0 otherwise
pub fn categorical_exact_score(
    value: Option<&str>,
    preferred: &[String],
    exact_score: f64,
) -> FeatureScore {
    match value {
        Some(v) if !preferred.is_empty() => {
            if preferred.iter().any(|p| p == v) {
                FeatureScore::scored(exact_score, "exact match")
            } else {
                FeatureScore::scored(0.0, "no match")
            }
        }
        _ => FeatureScore::missing("missing or no preference"),
    }
}

/// Best compatibility between `value` and any preferred category
///
/// Every preferred category tied at the best score gets its own clause, in
/// preferred-list order. Ties use exact float equality.
pub fn categorical_compatibility_score(
    value: Option<&str>,
    preferred: &[String],
    matrix: &CompatibilityMatrix,
) -> FeatureScore {
    let Some(value) = value else {
        return FeatureScore::missing("missing farm data");
    };
    if preferred.is_empty() {
        return FeatureScore::missing("missing species data");
    }
    if preferred.iter().any(|p| p == value) {
        return FeatureScore::scored(1.0, "exact match");
    }

    let found: Vec<(&str, f64)> = preferred
        .iter()
        .filter_map(|p| matrix.get(value, p).map(|s| (p.as_str(), s)))
        .collect();

    let Some(best) = found.iter().map(|&(_, s)| s).reduce(f64::max) else {
        return FeatureScore::scored(0.0, "no_match");
    };

    let reason = found
        .iter()
        .filter(|&&(_, s)| s == best)
        .map(|(p, s)| format!("closest compatibility match {} at {:.2}", p, s))
        .collect::<Vec<_>>()
        .join(". ");

    FeatureScore::scored(best, reason)
}

/// Species preference cell -> ordered list of categories
///
/// Comma-separated text is split and trimmed; list cells keep their order. Blank
/// items are dropped either way.
pub fn parse_prefs(raw: Option<&Value>) -> Vec<String> {
    match raw {
        Some(Value::List(items)) => items
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Text(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(other) => other.as_text().map(|s| vec![s.into_owned()]).unwrap_or_default(),
        None => Vec::new(),
    }
}
