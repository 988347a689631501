//! Hard exclusion rules
//!
//! Pass/fail predicates applied before scoring. Each rule compares one farm column
//! against one species column; a species failing any rule is removed from the
//! candidate set and carries every failing rule's reason.
//!
//! Missing data never excludes: when either side of a rule is absent the rule is
//! skipped for that species and contributes no reason.

pub mod dependency;

pub use dependency::{apply_dependencies, SpeciesDependency};

use crate::catalog::RecordIndex;
use crate::config::{AnnotationConfig, CompiledConfig};
use crate::error::{ConfigError, ConfigResult};
use crate::record::{Record, RecordId, Value};
use rustc_hash::FxHashSet;
use serde::Serialize;

/// Comparison applied between `farm[farm_col]` and `species[species_col]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "in_set")]
    InSet,
    #[serde(rename = "requires_true")]
    RequiresTrue,
}

impl Operator {
    pub fn parse(rule: &str, op: &str) -> ConfigResult<Self> {
        match op.trim() {
            ">" => Ok(Operator::Gt),
            "<" => Ok(Operator::Lt),
            ">=" => Ok(Operator::Ge),
            "<=" => Ok(Operator::Le),
            "in_set" => Ok(Operator::InSet),
            "requires_true" => Ok(Operator::RequiresTrue),
            other => Err(ConfigError::UnknownOperator {
                rule: rule.to_string(),
                op: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExclusionRule {
    pub id: String,
    pub farm_col: String,
    pub species_col: String,
    pub op: Operator,
    pub reason: String,
}

impl ExclusionRule {
    pub fn new(id: &str, farm_col: &str, species_col: &str, op: Operator, reason: &str) -> Self {
        Self {
            id: id.to_string(),
            farm_col: farm_col.to_string(),
            species_col: species_col.to_string(),
            op,
            reason: reason.to_string(),
        }
    }
}

/// Built-in rules used when the config document has no `rules` key
pub fn default_rules() -> Vec<ExclusionRule> {
    use Operator::{Ge, InSet, Le, RequiresTrue};

    [
        ("rain_min", "rainfall_mm", "rainfall_mm_min", Ge, "excluded: rainfall below minimum"),
        ("rain_max", "rainfall_mm", "rainfall_mm_max", Le, "excluded: rainfall above maximum"),
        (
            "temp_min",
            "temperature_celsius",
            "temperature_celsius_min",
            Ge,
            "excluded: temperature below minimum",
        ),
        (
            "temp_max",
            "temperature_celsius",
            "temperature_celsius_max",
            Le,
            "excluded: temperature above maximum",
        ),
        ("elev_min", "elevation_m", "elevation_m_min", Ge, "excluded: elevation below minimum"),
        ("elev_max", "elevation_m", "elevation_m_max", Le, "excluded: elevation above maximum"),
        ("ph_min", "ph", "ph_min", Ge, "excluded: soil pH below minimum"),
        ("ph_max", "ph", "ph_max", Le, "excluded: soil pH above maximum"),
        (
            "soil_texture",
            "soil_texture",
            "preferred_soil_texture",
            InSet,
            "excluded: soil texture not supported",
        ),
        (
            "coastal",
            "coastal",
            "coastal",
            RequiresTrue,
            "excluded: not suitable for coastal habitat",
        ),
        (
            "riparian",
            "riparian",
            "riparian",
            RequiresTrue,
            "excluded: not suitable for riparian habitat",
        ),
    ]
    .into_iter()
    .map(|(id, farm_col, species_col, op, reason)| {
        ExclusionRule::new(id, farm_col, species_col, op, reason)
    })
    .collect()
}

/// Outcome of one rule against one farm/species pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    Pass,
    Fail,
    /// A value was missing on either side
    Skipped,
}

/// Split a species acceptable-values cell on `,` `;` `/` `|`, trimmed and lower-cased
pub fn parse_value_set(raw: &str) -> FxHashSet<String> {
    raw.split([',', ';', '/', '|'])
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Acceptable values from a species cell: list items as given, text split by
/// [`parse_value_set`]
fn accepted_values(value: &Value) -> FxHashSet<String> {
    match value {
        Value::List(items) => items
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        other => other
            .as_text()
            .map(|s| parse_value_set(&s))
            .unwrap_or_default(),
    }
}

fn compare(
    rule: &ExclusionRule,
    farm: &Record,
    species: &Record,
    holds: impl Fn(f64, f64) -> bool,
) -> RuleOutcome {
    match (farm.number(&rule.farm_col), species.number(&rule.species_col)) {
        (Some(f), Some(s)) if holds(f, s) => RuleOutcome::Pass,
        (Some(_), Some(_)) => RuleOutcome::Fail,
        _ => RuleOutcome::Skipped,
    }
}

pub fn check_rule(rule: &ExclusionRule, farm: &Record, species: &Record) -> RuleOutcome {
    match rule.op {
        Operator::Gt => compare(rule, farm, species, |f, s| f > s),
        Operator::Lt => compare(rule, farm, species, |f, s| f < s),
        Operator::Ge => compare(rule, farm, species, |f, s| f >= s),
        Operator::Le => compare(rule, farm, species, |f, s| f <= s),
        Operator::InSet => {
            let (Some(f), Some(accepted)) = (
                farm.text(&rule.farm_col),
                species.get(&rule.species_col).map(accepted_values),
            ) else {
                return RuleOutcome::Skipped;
            };
            if accepted.is_empty() {
                return RuleOutcome::Skipped;
            }
            if accepted.contains(&f.trim().to_lowercase()) {
                RuleOutcome::Pass
            } else {
                RuleOutcome::Fail
            }
        }
        Operator::RequiresTrue => {
            match farm.get(&rule.farm_col).and_then(|v| v.truthy()) {
                None => RuleOutcome::Skipped,
                Some(false) => RuleOutcome::Pass,
                Some(true) => match species.get(&rule.species_col).and_then(|v| v.truthy()) {
                    None => RuleOutcome::Skipped,
                    Some(true) => RuleOutcome::Pass,
                    Some(false) => RuleOutcome::Fail,
                },
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedSpecies {
    pub id: RecordId,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExclusionResult {
    pub candidate_ids: Vec<RecordId>,
    pub excluded_species: Vec<ExcludedSpecies>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Apply `rules` to every species row for one farm
pub fn evaluate(
    farm: &Record,
    species: &RecordIndex,
    rules: &[ExclusionRule],
    annotation: AnnotationConfig,
) -> ExclusionResult {
    let mut result = ExclusionResult::default();

    for (species_id, row) in species.iter() {
        let reasons: Vec<String> = rules
            .iter()
            .filter(|rule| check_rule(rule, farm, row) == RuleOutcome::Fail)
            .map(|rule| match (annotation.include_values, farm.get(&rule.farm_col)) {
                (true, Some(value)) => format!("{} (farm={})", rule.reason, value),
                _ => rule.reason.clone(),
            })
            .collect();

        if reasons.is_empty() {
            result.candidate_ids.push(species_id.clone());
        } else {
            result.excluded_species.push(ExcludedSpecies {
                id: species_id.clone(),
                reasons,
            });
        }
    }

    result
}

/// Source of the candidate shortlist for a farm
pub trait CandidateProvider: Sync {
    fn candidates(&self, farm: &Record, species: &RecordIndex) -> ExclusionResult;
}

/// Configured exclusion rules, followed by species dependencies when enabled
pub struct RuleExclusion<'a> {
    config: &'a CompiledConfig,
    dependencies: &'a [SpeciesDependency],
}

impl<'a> RuleExclusion<'a> {
    pub fn new(config: &'a CompiledConfig, dependencies: &'a [SpeciesDependency]) -> Self {
        if config.dependency.enabled && dependencies.is_empty() {
            tracing::warn!("Species dependencies enabled but no dependency rows supplied");
        }
        Self { config, dependencies }
    }
}

impl CandidateProvider for RuleExclusion<'_> {
    fn candidates(&self, farm: &Record, species: &RecordIndex) -> ExclusionResult {
        let mut result = evaluate(farm, species, &self.config.rules, self.config.annotation);
        if self.config.dependency.enabled {
            apply_dependencies(&mut result, self.dependencies);
        }
        result
    }
}

/// Every catalog species is a candidate
pub struct PassThrough;

impl CandidateProvider for PassThrough {
    fn candidates(&self, _farm: &Record, species: &RecordIndex) -> ExclusionResult {
        ExclusionResult {
            candidate_ids: species.ids().to_vec(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn farm() -> Record {
        [
            ("id", Value::from(1)),
            ("rainfall_mm", Value::from(500)),
            ("temperature_celsius", Value::from(20)),
            ("elevation_m", Value::from(100)),
            ("ph", Value::from(6.5)),
            ("soil_texture", Value::from("loam")),
        ]
        .into_iter()
        .collect()
    }

    fn species(rows: Vec<Vec<(&str, Value)>>) -> RecordIndex {
        RecordIndex::from_records(
            rows.into_iter().map(|r| r.into_iter().collect::<Record>()),
            "id",
        )
    }

    fn quiet() -> AnnotationConfig {
        AnnotationConfig { include_values: false }
    }

    #[test]
    fn test_default_rules_filter_by_rainfall() {
        let catalog = species(vec![
            vec![
                ("id", 1.into()),
                ("rainfall_mm_min", 400.into()),
                ("rainfall_mm_max", 900.into()),
                ("temperature_celsius_min", 10.into()),
                ("temperature_celsius_max", 30.into()),
                ("elevation_m_min", 0.into()),
                ("elevation_m_max", 500.into()),
                ("ph_min", 5.5.into()),
                ("ph_max", 7.5.into()),
                ("preferred_soil_texture", "loam, clay".into()),
                ("coastal", 0.into()),
            ],
            vec![
                ("id", 2.into()),
                ("rainfall_mm_min", 800.into()),
                ("rainfall_mm_max", 1200.into()),
                ("preferred_soil_texture", "loam".into()),
            ],
        ]);

        let out = evaluate(&farm(), &catalog, &default_rules(), quiet());

        assert_eq!(out.candidate_ids, vec![RecordId::Int(1)]);
        assert_eq!(out.excluded_species.len(), 1);
        assert_eq!(out.excluded_species[0].id, RecordId::Int(2));
        assert!(out.excluded_species[0]
            .reasons
            .iter()
            .any(|r| r.contains("excluded: rainfall below minimum")));
    }

    #[test]
    fn test_dynamic_rule_with_annotation() {
        let rules = vec![ExclusionRule::new(
            "temp_gt_threshold",
            "temperature_celsius",
            "temp_threshold",
            Operator::Gt,
            "excluded: temperature not above threshold",
        )];
        let catalog = species(vec![
            vec![("id", 10.into()), ("temp_threshold", 15.into())],
            vec![("id", 11.into()), ("temp_threshold", 25.into())],
        ]);

        let annotated = AnnotationConfig { include_values: true };
        let out = evaluate(&farm(), &catalog, &rules, annotated);

        assert_eq!(out.candidate_ids, vec![RecordId::Int(10)]);
        let reasons = &out.excluded_species[0].reasons;
        assert_eq!(reasons, &["excluded: temperature not above threshold (farm=20)"]);
    }

    #[test]
    fn test_strict_and_inclusive_less_than() {
        let rules = vec![
            ExclusionRule::new(
                "elev_lt",
                "elevation_m",
                "elevation_cap",
                Operator::Lt,
                "excluded: elevation not below cap",
            ),
            ExclusionRule::new(
                "ph_le",
                "ph",
                "ph_cap",
                Operator::Le,
                "excluded: soil pH above cap",
            ),
        ];
        // farm: elevation 100, ph 6.5
        let catalog = species(vec![
            vec![("id", 1.into()), ("elevation_cap", 101.into()), ("ph_cap", 6.5.into())],
            vec![("id", 2.into()), ("elevation_cap", 100.into()), ("ph_cap", 7.0.into())],
            vec![("id", 3.into()), ("elevation_cap", 500.into()), ("ph_cap", 6.4.into())],
        ]);

        let out = evaluate(&farm(), &catalog, &rules, quiet());

        assert_eq!(out.candidate_ids, vec![RecordId::Int(1)]);
        assert_eq!(out.excluded_species[0].reasons, ["excluded: elevation not below cap"]);
        assert_eq!(out.excluded_species[1].reasons, ["excluded: soil pH above cap"]);
    }

    #[test]
    fn test_missing_species_value_skips_rule() {
        let catalog = species(vec![vec![
            ("id", 1.into()),
            ("rainfall_mm_min", Value::Number(f64::NAN)),
            ("rainfall_mm_max", 900.into()),
            ("preferred_soil_texture", "loam".into()),
        ]]);

        let out = evaluate(&farm(), &catalog, &default_rules(), quiet());

        assert_eq!(out.candidate_ids, vec![RecordId::Int(1)]);
        assert!(out.excluded_species.is_empty());
    }

    #[test]
    fn test_missing_farm_value_skips_rule() {
        let mut dry_farm = farm();
        dry_farm.insert("rainfall_mm", Value::Number(f64::NAN));
        let catalog = species(vec![vec![
            ("id", 1.into()),
            ("rainfall_mm_min", 400.into()),
            ("rainfall_mm_max", 900.into()),
        ]]);

        let out = evaluate(&dry_farm, &catalog, &default_rules(), quiet());

        assert_eq!(out.candidate_ids, vec![RecordId::Int(1)]);
    }

    #[test]
    fn test_in_set_accepts_mixed_separators() {
        let rules = vec![ExclusionRule::new(
            "soil_only",
            "soil_texture",
            "preferred_soil_texture",
            Operator::InSet,
            "excluded: soil texture not supported",
        )];
        let catalog = species(vec![
            vec![("id", 1.into()), ("preferred_soil_texture", "clay; Loam / sand".into())],
            vec![("id", 2.into()), ("preferred_soil_texture", "clay|sand".into())],
        ]);

        let out = evaluate(&farm(), &catalog, &rules, quiet());

        assert_eq!(out.candidate_ids, vec![RecordId::Int(1)]);
        assert_eq!(out.excluded_species[0].id, RecordId::Int(2));
    }

    #[test]
    fn test_in_set_accepts_list_cells() {
        let list = |items: &[&str]| Value::List(items.iter().map(|s| s.to_string()).collect());
        let rules = vec![ExclusionRule::new(
            "soil_only",
            "soil_texture",
            "preferred_soil_texture",
            Operator::InSet,
            "excluded: soil texture not supported",
        )];
        let catalog = species(vec![
            vec![("id", 1.into()), ("preferred_soil_texture", list(&["clay", " LOAM "]))],
            vec![("id", 2.into()), ("preferred_soil_texture", list(&["sand"]))],
            vec![("id", 3.into()), ("preferred_soil_texture", list(&[]))],
        ]);

        let out = evaluate(&farm(), &catalog, &rules, quiet());

        // an empty list is missing data, so species 3 is not excluded
        assert_eq!(out.candidate_ids, vec![RecordId::Int(1), RecordId::Int(3)]);
        assert_eq!(out.excluded_species[0].id, RecordId::Int(2));
    }

    #[test]
    fn test_requires_true_skipped_when_farm_flag_missing() {
        let rules = vec![ExclusionRule::new(
            "coastal_rule",
            "coastal",
            "coastal",
            Operator::RequiresTrue,
            "excluded: not suitable for coastal habitat",
        )];
        let catalog = species(vec![vec![("id", 1.into()), ("coastal", 0.into())]]);

        let out = evaluate(&farm(), &catalog, &rules, quiet());
        assert_eq!(out.candidate_ids, vec![RecordId::Int(1)]);

        let mut coastal_farm = farm();
        coastal_farm.insert("coastal", true);
        let out = evaluate(&coastal_farm, &catalog, &rules, quiet());
        assert!(out.candidate_ids.is_empty());
        assert_eq!(
            out.excluded_species[0].reasons,
            ["excluded: not suitable for coastal habitat"]
        );
    }

    #[test]
    fn test_reasons_accumulate() {
        let catalog = species(vec![vec![
            ("id", 3.into()),
            ("rainfall_mm_min", 800.into()),
            ("ph_max", 6.0.into()),
        ]]);

        let out = evaluate(&farm(), &catalog, &default_rules(), quiet());

        assert_eq!(out.excluded_species[0].reasons.len(), 2);
    }

    #[test]
    fn test_parse_value_set() {
        let set = parse_value_set(" Clay ;loam/ /SAND|silt,");
        assert_eq!(set.len(), 4);
        assert!(set.contains("clay") && set.contains("sand"));
    }

    #[test]
    fn test_pass_through_keeps_all() {
        let catalog = species(vec![vec![("id", 1.into())], vec![("id", 2.into())]]);
        let out = PassThrough.candidates(&farm(), &catalog);
        assert_eq!(out.candidate_ids.len(), 2);
        assert!(out.excluded_species.is_empty());
    }
}
