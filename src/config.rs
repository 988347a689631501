//! Engine configuration
//!
//! The JSON document is deserialized as-is into [`ConfigDocument`] and then compiled
//! once into an immutable [`CompiledConfig`]: string-typed feature types, score methods
//! and rule operators become closed enums, weights and compatibility matrices are
//! validated. The compiled value is shared by reference into every scoring call.

use crate::error::{ConfigError, ConfigResult};
use crate::exclusion::{default_rules, ExclusionRule, Operator};
use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

// ============================================================================
// Closed vocabularies
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    Numeric,
    Categorical,
}

impl FeatureType {
    pub fn parse(feature: &str, value: &str) -> ConfigResult<Self> {
        match value.trim() {
            "numeric" | "numerical" => Ok(FeatureType::Numeric),
            "categorical" => Ok(FeatureType::Categorical),
            other => Err(ConfigError::UnknownFeatureType {
                feature: feature.to_string(),
                value: other.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureType::Numeric => "numeric",
            FeatureType::Categorical => "categorical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMethod {
    NumRange,
    CatExact,
    CatCompatibility,
}

impl ScoreMethod {
    pub fn parse(feature: &str, value: &str) -> ConfigResult<Self> {
        match value.trim() {
            "num_range" => Ok(ScoreMethod::NumRange),
            "cat_exact" => Ok(ScoreMethod::CatExact),
            "cat_compatibility" => Ok(ScoreMethod::CatCompatibility),
            other => Err(ConfigError::UnknownScoreMethod {
                feature: feature.to_string(),
                value: other.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreMethod::NumRange => "num_range",
            ScoreMethod::CatExact => "cat_exact",
            ScoreMethod::CatCompatibility => "cat_compatibility",
        }
    }

    /// Feature type this method is able to score
    pub fn feature_type(&self) -> FeatureType {
        match self {
            ScoreMethod::NumRange => FeatureType::Numeric,
            ScoreMethod::CatExact | ScoreMethod::CatCompatibility => FeatureType::Categorical,
        }
    }
}

pub(crate) fn check_weight(feature: &str, weight: f64) -> ConfigResult<f64> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(weight)
    } else {
        Err(ConfigError::InvalidWeight {
            feature: feature.to_string(),
            weight,
        })
    }
}

// ============================================================================
// Raw document
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct IdColumns {
    #[serde(default = "default_farm_id_col")]
    pub farm: String,
    #[serde(default = "default_species_id_col")]
    pub species: String,
}

impl Default for IdColumns {
    fn default() -> Self {
        Self {
            farm: default_farm_id_col(),
            species: default_species_id_col(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NameColumns {
    #[serde(default = "default_species_name_col")]
    pub species_name: String,
    #[serde(default = "default_common_name_col")]
    pub species_common_name: String,
}

impl Default for NameColumns {
    fn default() -> Self {
        Self {
            species_name: default_species_name_col(),
            species_common_name: default_common_name_col(),
        }
    }
}

fn default_farm_id_col() -> String {
    "farm_id".to_string()
}

fn default_species_id_col() -> String {
    "species_id".to_string()
}

fn default_species_name_col() -> String {
    "species_name".to_string()
}

fn default_common_name_col() -> String {
    "species_common_name".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineDefaults {
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AnnotationConfig {
    #[serde(default)]
    pub include_values: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DependencyConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoricalConfig {
    pub exact_match: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFeature {
    #[serde(rename = "type")]
    pub feature_type: String,
    pub short: Option<String>,
    pub score_method: Option<String>,
    pub default_weight: Option<f64>,
    #[serde(default)]
    pub categorical: Option<CategoricalConfig>,
    #[serde(default)]
    pub compatibility_pairs: Option<FxHashMap<String, FxHashMap<String, f64>>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRule {
    pub id: String,
    pub farm_col: String,
    pub species_col: String,
    pub op: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Configuration document as written on disk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub ids: IdColumns,
    #[serde(default)]
    pub names: NameColumns,
    #[serde(default)]
    pub defaults: EngineDefaults,
    /// Kept in document order: explanations and key reasons follow it
    #[serde(default, deserialize_with = "ordered_features")]
    pub features: Vec<(String, RawFeature)>,
    /// `None` selects the built-in rule set, `Some(vec![])` disables rule checks
    #[serde(default)]
    pub rules: Option<Vec<RawRule>>,
    #[serde(default)]
    pub annotation: AnnotationConfig,
    #[serde(default)]
    pub dependency: DependencyConfig,
}

fn ordered_features<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<(String, RawFeature)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct FeaturesVisitor;

    impl<'de> Visitor<'de> for FeaturesVisitor {
        type Value = Vec<(String, RawFeature)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of feature name to feature settings")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut features: Vec<(String, RawFeature)> =
                Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, feature)) = map.next_entry::<String, RawFeature>()? {
                match features.iter_mut().find(|(existing, _)| *existing == name) {
                    Some(slot) => slot.1 = feature,
                    None => features.push((name, feature)),
                }
            }
            Ok(features)
        }
    }

    deserializer.deserialize_map(FeaturesVisitor)
}

// ============================================================================
// Compiled configuration
// ============================================================================

/// Category -> category similarity lookup
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct CompatibilityMatrix {
    pairs: FxHashMap<String, FxHashMap<String, f64>>,
}

impl CompatibilityMatrix {
    pub fn new(pairs: FxHashMap<String, FxHashMap<String, f64>>) -> Self {
        Self { pairs }
    }

    pub fn get(&self, from: &str, to: &str) -> Option<f64> {
        self.pairs.get(from).and_then(|row| row.get(to)).copied()
    }

    fn validate(&self, feature: &str) -> ConfigResult<()> {
        for (from, row) in &self.pairs {
            for (to, &score) in row {
                if !(0.0..=1.0).contains(&score) {
                    return Err(ConfigError::CompatibilityOutOfRange {
                        feature: feature.to_string(),
                        from: from.clone(),
                        to: to.clone(),
                        score,
                    });
                }
            }
        }
        Ok(())
    }
}

/// One validated feature
#[derive(Debug, Clone)]
pub struct FeatureSpec {
    pub name: String,
    pub feature_type: FeatureType,
    pub short: String,
    pub score_method: Option<ScoreMethod>,
    pub default_weight: Option<f64>,
    pub exact_match: f64,
    pub compatibility: Option<CompatibilityMatrix>,
}

impl FeatureSpec {
    /// Species column holding the lower bound of a numeric feature
    pub fn min_column(&self) -> String {
        format!("{}_min", self.name)
    }

    pub fn max_column(&self) -> String {
        format!("{}_max", self.name)
    }

    /// Species column holding the preferred values of a categorical feature
    pub fn preferred_column(&self) -> String {
        format!("preferred_{}", self.name)
    }

    /// Reject a method that cannot score this feature's type
    pub fn check_method(&self, method: ScoreMethod) -> ConfigResult<ScoreMethod> {
        if method.feature_type() != self.feature_type {
            return Err(ConfigError::IncompatibleScoreMethod {
                feature: self.name.clone(),
                feature_type: self.feature_type.as_str().to_string(),
                method: method.as_str().to_string(),
            });
        }
        if method == ScoreMethod::CatCompatibility && self.compatibility.is_none() {
            return Err(ConfigError::MissingCompatibilityMatrix {
                feature: self.name.clone(),
            });
        }
        Ok(method)
    }

    fn compile(name: &str, raw: &RawFeature) -> ConfigResult<Self> {
        let feature_type = FeatureType::parse(name, &raw.feature_type)?;

        let default_weight = raw
            .default_weight
            .map(|w| check_weight(name, w))
            .transpose()?;

        let compatibility = raw.compatibility_pairs.clone().map(CompatibilityMatrix::new);
        if let Some(matrix) = &compatibility {
            matrix.validate(name)?;
        }

        let exact_match = raw
            .categorical
            .as_ref()
            .and_then(|c| c.exact_match)
            .unwrap_or(1.0);
        if !(0.0..=1.0).contains(&exact_match) {
            return Err(ConfigError::ExactMatchOutOfRange {
                feature: name.to_string(),
                score: exact_match,
            });
        }

        let mut spec = Self {
            name: name.to_string(),
            feature_type,
            short: raw.short.clone().unwrap_or_else(|| name.to_string()),
            score_method: None,
            default_weight,
            exact_match,
            compatibility,
        };

        if let Some(method) = &raw.score_method {
            let method = ScoreMethod::parse(name, method)?;
            spec.score_method = Some(spec.check_method(method)?);
        }

        Ok(spec)
    }
}

/// Immutable, validated configuration shared across a scoring batch
#[derive(Debug, Clone)]
pub struct CompiledConfig {
    pub ids: IdColumns,
    pub names: NameColumns,
    pub default_weight: Option<f64>,
    pub features: Vec<FeatureSpec>,
    pub rules: Vec<ExclusionRule>,
    pub annotation: AnnotationConfig,
    pub dependency: DependencyConfig,
    feature_index: FxHashMap<String, usize>,
}

impl CompiledConfig {
    pub fn compile(doc: &ConfigDocument) -> ConfigResult<Self> {
        let default_weight = doc
            .defaults
            .weight
            .map(|w| check_weight("defaults", w))
            .transpose()?;

        let features = doc
            .features
            .iter()
            .map(|(name, raw)| FeatureSpec::compile(name, raw))
            .collect::<ConfigResult<Vec<_>>>()?;

        let feature_index = features
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();

        let rules = match &doc.rules {
            Some(raw_rules) => raw_rules
                .iter()
                .map(|r| -> ConfigResult<ExclusionRule> {
                    Ok(ExclusionRule {
                        id: r.id.clone(),
                        farm_col: r.farm_col.clone(),
                        species_col: r.species_col.clone(),
                        op: Operator::parse(&r.id, &r.op)?,
                        reason: r
                            .reason
                            .clone()
                            .unwrap_or_else(|| format!("excluded: rule {} failed", r.id)),
                    })
                })
                .collect::<ConfigResult<Vec<_>>>()?,
            None => default_rules(),
        };

        Ok(Self {
            ids: doc.ids.clone(),
            names: doc.names.clone(),
            default_weight,
            features,
            rules,
            annotation: doc.annotation,
            dependency: doc.dependency,
            feature_index,
        })
    }

    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let doc: ConfigDocument = serde_json::from_str(json)?;
        Self::compile(&doc)
    }

    /// Load and compile a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_json_str(&contents)
            .with_context(|| format!("Invalid config file: {:?}", path))?;

        tracing::info!(
            "Loaded config {:?}: {} features, {} exclusion rules",
            path,
            config.features.len(),
            config.rules.len()
        );

        Ok(config)
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureSpec> {
        self.feature_index.get(name).map(|&i| &self.features[i])
    }
}
