//! Species dependencies
//!
//! Some species only establish alongside a partner (a nurse tree, a host). When
//! dependency checks are enabled, a candidate whose partner did not survive exclusion
//! is excluded too. Exclusions can cascade, so the pass repeats until stable.

use super::{ExcludedSpecies, ExclusionResult};
use crate::record::{Record, RecordId};
use rustc_hash::FxHashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeciesDependency {
    pub species_id: RecordId,
    pub depends_on: RecordId,
}

impl SpeciesDependency {
    /// Read `(species_col, depends_on_col)` pairs; incomplete rows are ignored
    pub fn from_records<'a>(
        rows: impl IntoIterator<Item = &'a Record>,
        species_col: &str,
        depends_on_col: &str,
    ) -> Vec<Self> {
        rows.into_iter()
            .filter_map(|row| {
                Some(Self {
                    species_id: row.id(species_col)?,
                    depends_on: row.id(depends_on_col)?,
                })
            })
            .collect()
    }
}

pub fn apply_dependencies(result: &mut ExclusionResult, dependencies: &[SpeciesDependency]) {
    if dependencies.is_empty() {
        return;
    }

    loop {
        let candidates: FxHashSet<&RecordId> = result.candidate_ids.iter().collect();

        let mut dropped: Vec<ExcludedSpecies> = Vec::new();
        for id in &result.candidate_ids {
            let reasons: Vec<String> = dependencies
                .iter()
                .filter(|d| &d.species_id == id && !candidates.contains(&d.depends_on))
                .map(|d| {
                    format!(
                        "excluded: requires species {} which is not a candidate",
                        d.depends_on
                    )
                })
                .collect();
            if !reasons.is_empty() {
                dropped.push(ExcludedSpecies {
                    id: id.clone(),
                    reasons,
                });
            }
        }

        if dropped.is_empty() {
            break;
        }

        let dropped_ids: FxHashSet<RecordId> = dropped.iter().map(|e| e.id.clone()).collect();
        result.candidate_ids.retain(|id| !dropped_ids.contains(id));
        result.excluded_species.extend(dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(species: i64, on: i64) -> SpeciesDependency {
        SpeciesDependency {
            species_id: RecordId::Int(species),
            depends_on: RecordId::Int(on),
        }
    }

    fn candidates(ids: &[i64]) -> ExclusionResult {
        ExclusionResult {
            candidate_ids: ids.iter().map(|&i| RecordId::Int(i)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_satisfied_dependency_keeps_species() {
        let mut result = candidates(&[1, 2]);
        apply_dependencies(&mut result, &[dep(2, 1)]);
        assert_eq!(result.candidate_ids.len(), 2);
        assert!(result.excluded_species.is_empty());
    }

    #[test]
    fn test_missing_partner_cascades() {
        // 3 needs 2, 2 needs 9 (not a candidate)
        let mut result = candidates(&[1, 2, 3]);
        apply_dependencies(&mut result, &[dep(3, 2), dep(2, 9)]);

        assert_eq!(result.candidate_ids, vec![RecordId::Int(1)]);
        let ids: Vec<_> = result.excluded_species.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec![RecordId::Int(2), RecordId::Int(3)]);
        assert_eq!(
            result.excluded_species[0].reasons,
            ["excluded: requires species 9 which is not a candidate"]
        );
    }

    #[test]
    fn test_rows_parsed() {
        let rows: Vec<Record> = vec![
            [("species_id", 2), ("depends_on", 1)].into_iter().collect(),
            [("species_id", 3)].into_iter().collect(),
        ];
        let deps = SpeciesDependency::from_records(&rows, "species_id", "depends_on");
        assert_eq!(deps, vec![dep(2, 1)]);
    }
}
