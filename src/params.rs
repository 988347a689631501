//! Per-species scoring parameters
//!
//! Resolution order for each (species, feature): species override, then the
//! feature's own default, then the engine-wide `defaults.weight`. Anything that
//! still has no value is a configuration error.

use crate::config::{check_weight, CompiledConfig, ScoreMethod};
use crate::error::{ConfigError, ConfigResult};
use crate::record::{Record, RecordId};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpeciesParamsOverride {
    pub weight: Option<f64>,
    pub score_method: Option<ScoreMethod>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedParams {
    pub weight: f64,
    pub score_method: ScoreMethod,
}

/// Immutable (species, feature) -> override lookup
#[derive(Debug, Clone, Default)]
pub struct ParamsIndex {
    overrides: FxHashMap<RecordId, FxHashMap<String, SpeciesParamsOverride>>,
}

impl ParamsIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        species_id: RecordId,
        feature: impl Into<String>,
        params: SpeciesParamsOverride,
    ) {
        self.overrides
            .entry(species_id)
            .or_default()
            .insert(feature.into(), params);
    }

    pub fn get(&self, species_id: &RecordId, feature: &str) -> Option<&SpeciesParamsOverride> {
        self.overrides.get(species_id).and_then(|m| m.get(feature))
    }

    /// Number of (species, feature) overrides
    pub fn len(&self) -> usize {
        self.overrides.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

/// Build the override index from tabular rows
///
/// Expected columns: the configured species id column, `feature`, `score_method`,
/// `weight`. Blank cells mean "no override"; rows without a species id or feature
/// name are skipped.
pub fn build_params_index<'a>(
    rows: impl IntoIterator<Item = &'a Record>,
    config: &CompiledConfig,
) -> ConfigResult<ParamsIndex> {
    let mut index = ParamsIndex::new();
    let mut skipped = 0usize;

    for row in rows {
        let (Some(species_id), Some(feature)) =
            (row.id(&config.ids.species), row.text("feature"))
        else {
            skipped += 1;
            continue;
        };

        let spec = config.feature(&feature).ok_or_else(|| ConfigError::UndeclaredFeature {
            feature: feature.to_string(),
            species: species_id.to_string(),
        })?;

        let score_method = match row.text("score_method") {
            Some(m) => Some(spec.check_method(ScoreMethod::parse(&spec.name, &m)?)?),
            None => None,
        };
        let weight = row
            .number("weight")
            .map(|w| check_weight(&spec.name, w))
            .transpose()?;

        if weight.is_some() || score_method.is_some() {
            let params = SpeciesParamsOverride {
                weight,
                score_method,
            };
            index.insert(species_id, spec.name.clone(), params);
        }
    }

    if skipped > 0 {
        tracing::warn!("Skipped {} override rows without species id or feature", skipped);
    }
    tracing::debug!("Built params index with {} overrides", index.len());

    Ok(index)
}

/// Effective weight and scoring method for one species and feature
pub fn resolve(
    params: &ParamsIndex,
    config: &CompiledConfig,
    species_id: &RecordId,
    feature: &str,
) -> ConfigResult<ResolvedParams> {
    let spec = config.feature(feature).ok_or_else(|| ConfigError::UndeclaredFeature {
        feature: feature.to_string(),
        species: species_id.to_string(),
    })?;
    let overrides = params.get(species_id, feature).copied().unwrap_or_default();

    let unresolved = |what: &'static str| ConfigError::Unresolved {
        what,
        feature: feature.to_string(),
        species: species_id.to_string(),
    };

    let weight = overrides
        .weight
        .or(spec.default_weight)
        .or(config.default_weight)
        .ok_or_else(|| unresolved("weight"))?;

    let score_method = overrides
        .score_method
        .or(spec.score_method)
        .ok_or_else(|| unresolved("score_method"))?;

    Ok(ResolvedParams {
        weight: check_weight(feature, weight)?,
        score_method: spec.check_method(score_method)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;

    const CONFIG: &str = r#"{
        "defaults": {"weight": 0.25},
        "features": {
            "ph": {"type": "numeric", "score_method": "num_range", "default_weight": 0.5},
            "rainfall_mm": {"type": "numeric", "score_method": "num_range"},
            "soil_texture": {
                "type": "categorical",
                "compatibility_pairs": {"loam": {"clay": 0.3}}
            }
        },
        "rules": []
    }"#;

    fn config() -> CompiledConfig {
        CompiledConfig::from_json_str(CONFIG).unwrap()
    }

    fn override_row(species: i64, feature: &str, method: &str, weight: Option<f64>) -> Record {
        let mut row: Record = [
            ("species_id", Value::from(species)),
            ("feature", Value::from(feature)),
        ]
        .into_iter()
        .collect();
        row.insert("score_method", method);
        if let Some(w) = weight {
            row.insert("weight", w);
        }
        row
    }

    #[test]
    fn test_feature_default_then_engine_default() {
        let cfg = config();
        let idx = ParamsIndex::new();
        let id = RecordId::Int(1);

        let ph = resolve(&idx, &cfg, &id, "ph").unwrap();
        assert_eq!(ph.weight, 0.5);
        assert_eq!(ph.score_method, ScoreMethod::NumRange);

        let rain = resolve(&idx, &cfg, &id, "rainfall_mm").unwrap();
        assert_eq!(rain.weight, 0.25);
    }

    #[test]
    fn test_override_wins() {
        let cfg = config();
        let rows = vec![
            override_row(7, "ph", "", Some(2.0)),
            override_row(7, "soil_texture", "cat_compatibility", None),
        ];
        let idx = build_params_index(&rows, &cfg).unwrap();
        assert_eq!(idx.len(), 2);

        let ph = resolve(&idx, &cfg, &RecordId::Int(7), "ph").unwrap();
        assert_eq!(ph.weight, 2.0);
        assert_eq!(ph.score_method, ScoreMethod::NumRange);

        let soil = resolve(&idx, &cfg, &RecordId::Int(7), "soil_texture").unwrap();
        assert_eq!(soil.score_method, ScoreMethod::CatCompatibility);

        // other species keep the defaults
        assert_eq!(resolve(&idx, &cfg, &RecordId::Int(8), "ph").unwrap().weight, 0.5);
    }

    #[test]
    fn test_unresolved_method_is_error() {
        let cfg = config();
        let err =
            resolve(&ParamsIndex::new(), &cfg, &RecordId::Int(1), "soil_texture").unwrap_err();
        assert!(matches!(err, ConfigError::Unresolved { what: "score_method", .. }));
    }

    #[test]
    fn test_unresolved_weight_is_error() {
        let cfg = CompiledConfig::from_json_str(
            r#"{
                "features": {"ph": {"type": "numeric", "score_method": "num_range"}},
                "rules": []
            }"#,
        )
        .unwrap();
        let err = resolve(&ParamsIndex::new(), &cfg, &RecordId::Int(1), "ph").unwrap_err();
        assert!(matches!(err, ConfigError::Unresolved { what: "weight", .. }));
    }

    #[test]
    fn test_bad_override_rows_rejected() {
        let cfg = config();

        let undeclared = vec![override_row(1, "salinity", "num_range", None)];
        assert!(matches!(
            build_params_index(&undeclared, &cfg).unwrap_err(),
            ConfigError::UndeclaredFeature { .. }
        ));

        let wrong_type = vec![override_row(1, "ph", "cat_exact", None)];
        assert!(matches!(
            build_params_index(&wrong_type, &cfg).unwrap_err(),
            ConfigError::IncompatibleScoreMethod { .. }
        ));

        let negative = vec![override_row(1, "ph", "", Some(-1.0))];
        assert!(matches!(
            build_params_index(&negative, &cfg).unwrap_err(),
            ConfigError::InvalidWeight { .. }
        ));
    }
}
