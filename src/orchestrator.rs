//! Batch orchestration
//!
//! One payload per requested farm id, in request order:
//! exclusion -> candidate filtering -> MCDA -> ranking.
//!
//! The species index, params index and compiled scoring rules are built once per
//! batch and shared read-only, so `run_parallel` fans farms out over rayon without
//! any locking.

use crate::catalog::RecordIndex;
use crate::config::CompiledConfig;
use crate::error::ConfigResult;
use crate::exclusion::{CandidateProvider, ExcludedSpecies, RuleExclusion, SpeciesDependency};
use crate::params::ParamsIndex;
use crate::record::{Record, RecordId};
use crate::recommend::{build_species_recommendations, Recommendation};
use crate::scoring::McdaScorer;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::time::Instant;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Unknown ids listed in a note before eliding the rest
const NOTE_ID_PREVIEW: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FarmPayload {
    pub farm_id: RecordId,
    pub timestamp_utc: String,
    pub recommendations: Vec<Recommendation>,
    pub excluded_species: Vec<ExcludedSpecies>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

fn unknown_ids_note(unknown: &[RecordId]) -> String {
    let preview: Vec<String> = unknown
        .iter()
        .take(NOTE_ID_PREVIEW)
        .map(|id| id.to_string())
        .collect();
    format!(
        "Exclusion function provided {} unknown species_id(s): [{}]{}",
        unknown.len(),
        preview.join(", "),
        if unknown.len() > NOTE_ID_PREVIEW { "..." } else { "" }
    )
}

pub struct Orchestrator<'a> {
    species: &'a RecordIndex,
    provider: &'a dyn CandidateProvider,
    scorer: McdaScorer<'a>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a CompiledConfig,
        params: &'a ParamsIndex,
        species: &'a RecordIndex,
        provider: &'a dyn CandidateProvider,
    ) -> ConfigResult<Self> {
        Ok(Self {
            species,
            provider,
            scorer: McdaScorer::new(config, params, species)?,
        })
    }

    /// Payload for one farm profile
    pub fn recommend(
        &self,
        farm_id: &RecordId,
        farm: &Record,
        now: DateTime<Utc>,
    ) -> ConfigResult<FarmPayload> {
        let exclusion = self.provider.candidates(farm, self.species);
        let mut notes = exclusion.notes;

        let (known, unknown): (Vec<_>, Vec<_>) = exclusion
            .candidate_ids
            .iter()
            .partition(|id| self.species.contains(id));

        if !unknown.is_empty() {
            let unknown: Vec<RecordId> = unknown.into_iter().cloned().collect();
            tracing::warn!(
                "Farm {}: {} candidate ids not in species catalog",
                farm_id,
                unknown.len()
            );
            notes.push(unknown_ids_note(&unknown));
        }

        let candidates = known
            .into_iter()
            .filter_map(|id| self.species.get(id).map(|row| (id, row)));
        let scored = self.scorer.score(farm, candidates)?;
        let recommendations = build_species_recommendations(scored);

        tracing::debug!(
            "Farm {}: {} recommended, {} excluded",
            farm_id,
            recommendations.len(),
            exclusion.excluded_species.len()
        );

        Ok(FarmPayload {
            farm_id: farm_id.clone(),
            timestamp_utc: now.format(TIMESTAMP_FORMAT).to_string(),
            recommendations,
            excluded_species: exclusion.excluded_species,
            notes,
        })
    }

    /// Requested ids that exist in `farms`, in request order
    fn lookup<'f>(
        &self,
        farm_ids: &'f [RecordId],
        farms: &'f RecordIndex,
    ) -> Vec<(&'f RecordId, &'f Record)> {
        farm_ids
            .iter()
            .filter_map(|id| match farms.get(id) {
                Some(farm) => Some((id, farm)),
                None => {
                    tracing::warn!("Farm {} not found, skipping", id);
                    None
                }
            })
            .collect()
    }

    pub fn run(
        &self,
        farm_ids: &[RecordId],
        farms: &RecordIndex,
    ) -> ConfigResult<Vec<FarmPayload>> {
        self.run_at(farm_ids, farms, Utc::now())
    }

    /// Sequential batch with a fixed timestamp
    pub fn run_at(
        &self,
        farm_ids: &[RecordId],
        farms: &RecordIndex,
        now: DateTime<Utc>,
    ) -> ConfigResult<Vec<FarmPayload>> {
        let start = Instant::now();

        let payloads = self
            .lookup(farm_ids, farms)
            .into_iter()
            .map(|(id, farm)| self.recommend(id, farm, now))
            .collect::<ConfigResult<Vec<_>>>()?;

        tracing::info!(
            "Scored {} farms against {} species in {:?}",
            payloads.len(),
            self.species.len(),
            start.elapsed()
        );
        Ok(payloads)
    }

    /// Same output as `run_at`, farms scored on the rayon pool
    pub fn run_parallel(
        &self,
        farm_ids: &[RecordId],
        farms: &RecordIndex,
        now: DateTime<Utc>,
    ) -> ConfigResult<Vec<FarmPayload>> {
        let start = Instant::now();

        let payloads = self
            .lookup(farm_ids, farms)
            .into_par_iter()
            .map(|(id, farm)| self.recommend(id, farm, now))
            .collect::<ConfigResult<Vec<_>>>()?;

        tracing::info!(
            "Scored {} farms against {} species in {:?} ({} threads)",
            payloads.len(),
            self.species.len(),
            start.elapsed(),
            rayon::current_num_threads()
        );
        Ok(payloads)
    }
}

/// Score a batch with the configured exclusion rules
///
/// `dependencies` only take effect when the config enables dependency checks.
pub fn run(
    farm_ids: &[RecordId],
    farms: &RecordIndex,
    species: &RecordIndex,
    params: &ParamsIndex,
    config: &CompiledConfig,
    dependencies: &[SpeciesDependency],
) -> ConfigResult<Vec<FarmPayload>> {
    let provider = RuleExclusion::new(config, dependencies);
    Orchestrator::new(config, params, species, &provider)?.run(farm_ids, farms)
}

/// Payload for a single farm, `None` when the id is not in `farms`
pub fn recommend_farm(
    farm_id: &RecordId,
    farms: &RecordIndex,
    species: &RecordIndex,
    params: &ParamsIndex,
    config: &CompiledConfig,
    dependencies: &[SpeciesDependency],
) -> ConfigResult<Option<FarmPayload>> {
    let farm_ids = std::slice::from_ref(farm_id);
    let mut payloads = run(farm_ids, farms, species, params, config, dependencies)?;
    Ok(payloads.pop())
}
