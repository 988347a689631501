//! Weighted MCDA aggregation
//!
//! Every candidate gets one explanation per configured feature, in configuration
//! order, whether or not the feature contributed to the aggregate. Only features
//! with a score and a positive weight enter the weighted mean; when none do, the
//! aggregate is 0.0.

use super::features::{
    categorical_compatibility_score, categorical_exact_score, numeric_range_score, parse_prefs,
    FeatureScore,
};
use crate::catalog::RecordIndex;
use crate::config::{CompiledConfig, FeatureSpec, FeatureType, ScoreMethod};
use crate::error::{ConfigError, ConfigResult};
use crate::params::{resolve, ParamsIndex};
use crate::record::{Record, RecordId, Value};
use rustc_hash::FxHashMap;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

// ============================================================================
// Output types
// ============================================================================

/// Parameters the scorer was called with
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScoringParams {
    Range { min: Option<f64>, max: Option<f64> },
    Preferred { preferred: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureExplanation {
    pub short_name: String,
    #[serde(rename = "type")]
    pub feature_type: FeatureType,
    pub farm_value: Option<Value>,
    pub score: Option<f64>,
    pub reason: String,
    pub params: ScoringParams,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub species_id: RecordId,
    pub species_name: Option<String>,
    pub species_common_name: Option<String>,
    pub mcda_score: f64,
    /// Feature name -> explanation, in configuration order
    #[serde(serialize_with = "ordered_map")]
    pub features: Vec<(String, FeatureExplanation)>,
}

fn ordered_map<S>(
    features: &[(String, FeatureExplanation)],
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(features.len()))?;
    for (name, explanation) in features {
        map.serialize_entry(name, explanation)?;
    }
    map.end()
}

// ============================================================================
// Compiled species rules
// ============================================================================

/// One species' resolved parameters for one feature
#[derive(Debug, Clone)]
struct FeatureRule {
    feature: usize,
    weight: f64,
    method: ScoreMethod,
    params: ScoringParams,
}

fn compile_species_rules(
    species_id: &RecordId,
    row: &Record,
    params: &ParamsIndex,
    config: &CompiledConfig,
) -> ConfigResult<Vec<FeatureRule>> {
    config
        .features
        .iter()
        .enumerate()
        .map(|(i, spec)| -> ConfigResult<FeatureRule> {
            let resolved = resolve(params, config, species_id, &spec.name)?;
            let scoring_params = match resolved.score_method {
                ScoreMethod::NumRange => ScoringParams::Range {
                    min: row.number(&spec.min_column()),
                    max: row.number(&spec.max_column()),
                },
                ScoreMethod::CatExact | ScoreMethod::CatCompatibility => ScoringParams::Preferred {
                    preferred: parse_prefs(row.get(&spec.preferred_column())),
                },
            };
            Ok(FeatureRule {
                feature: i,
                weight: resolved.weight,
                method: resolved.score_method,
                params: scoring_params,
            })
        })
        .collect()
}

fn score_feature(
    spec: &FeatureSpec,
    rule: &FeatureRule,
    farm: &Record,
) -> ConfigResult<FeatureScore> {
    let out = match (rule.method, &rule.params) {
        (ScoreMethod::NumRange, ScoringParams::Range { min, max }) => {
            numeric_range_score(farm.number(&spec.name), *min, *max)
        }
        (ScoreMethod::CatExact, ScoringParams::Preferred { preferred }) => {
            categorical_exact_score(farm.text(&spec.name).as_deref(), preferred, spec.exact_match)
        }
        (ScoreMethod::CatCompatibility, ScoringParams::Preferred { preferred }) => {
            let matrix = spec
                .compatibility
                .as_ref()
                .ok_or_else(|| ConfigError::MissingCompatibilityMatrix {
                    feature: spec.name.clone(),
                })?;
            categorical_compatibility_score(farm.text(&spec.name).as_deref(), preferred, matrix)
        }
        (method, _) => {
            return Err(ConfigError::IncompatibleScoreMethod {
                feature: spec.name.clone(),
                feature_type: spec.feature_type.as_str().to_string(),
                method: method.as_str().to_string(),
            })
        }
    };
    Ok(out)
}

// ============================================================================
// Scorer
// ============================================================================

/// Batch scorer: species rules are resolved once and reused for every farm
pub struct McdaScorer<'a> {
    config: &'a CompiledConfig,
    params: &'a ParamsIndex,
    rule_book: FxHashMap<RecordId, Vec<FeatureRule>>,
}

impl<'a> McdaScorer<'a> {
    pub fn new(
        config: &'a CompiledConfig,
        params: &'a ParamsIndex,
        species: &RecordIndex,
    ) -> ConfigResult<Self> {
        let rule_book = species
            .iter()
            .map(|(id, row)| -> ConfigResult<_> {
                let rules = compile_species_rules(id, row, params, config)?;
                Ok((id.clone(), rules))
            })
            .collect::<ConfigResult<FxHashMap<_, _>>>()?;

        tracing::debug!(
            "Compiled scoring rules for {} species x {} features",
            rule_book.len(),
            config.features.len()
        );

        Ok(Self {
            config,
            params,
            rule_book,
        })
    }

    /// Score one farm against each candidate, preserving candidate order
    pub fn score<'r>(
        &self,
        farm: &Record,
        candidates: impl IntoIterator<Item = (&'r RecordId, &'r Record)>,
    ) -> ConfigResult<Vec<ScoredCandidate>> {
        candidates
            .into_iter()
            .map(|(id, row)| self.score_one(farm, id, row))
            .collect()
    }

    fn score_one(
        &self,
        farm: &Record,
        species_id: &RecordId,
        row: &Record,
    ) -> ConfigResult<ScoredCandidate> {
        // rows outside the indexed catalog are compiled on the spot
        let compiled;
        let rules = match self.rule_book.get(species_id) {
            Some(rules) => rules,
            None => {
                compiled = compile_species_rules(species_id, row, self.params, self.config)?;
                &compiled
            }
        };

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        let mut features = Vec::with_capacity(rules.len());

        for rule in rules {
            let spec = &self.config.features[rule.feature];
            let FeatureScore { score, reason } = score_feature(spec, rule, farm)?;

            if let Some(s) = score {
                if rule.weight > 0.0 {
                    weighted_sum += rule.weight * s;
                    weight_total += rule.weight;
                }
            }

            features.push((
                spec.name.clone(),
                FeatureExplanation {
                    short_name: spec.short.clone(),
                    feature_type: spec.feature_type,
                    farm_value: farm.get(&spec.name).cloned(),
                    score,
                    reason,
                    params: rule.params.clone(),
                },
            ));
        }

        let mcda_score = if weight_total > 0.0 {
            weighted_sum / weight_total
        } else {
            0.0
        };

        Ok(ScoredCandidate {
            species_id: species_id.clone(),
            species_name: row.text(&self.config.names.species_name).map(|s| s.into_owned()),
            species_common_name: row
                .text(&self.config.names.species_common_name)
                .map(|s| s.into_owned()),
            mcda_score,
            features,
        })
    }
}

/// One-shot aggregation without a prebuilt rule book
pub fn score_candidates<'r>(
    farm: &Record,
    candidates: impl IntoIterator<Item = (&'r RecordId, &'r Record)>,
    params: &ParamsIndex,
    config: &CompiledConfig,
) -> ConfigResult<Vec<ScoredCandidate>> {
    McdaScorer::new(config, params, &RecordIndex::default())?.score(farm, candidates)
}
