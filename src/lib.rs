//! Farm Suitability Recommendation Engine
//!
//! Matches farm environmental profiles against a species catalog and produces a
//! ranked, explainable shortlist per farm.
//!
//! Pipeline, leaves first:
//! - `config` / `params`: compiled configuration and per-species weight/method resolution
//! - `scoring`: per-feature scorers and the weighted MCDA aggregator
//! - `exclusion`: hard pass/fail rules applied before scoring
//! - `recommend`: ordering, dense ranks and presentation
//! - `orchestrator`: batch of farms -> one payload per farm
//! - `data`: CSV / Parquet / JSON table loading with Polars

pub mod catalog;
pub mod config;
pub mod data;
pub mod error;
pub mod exclusion;
pub mod orchestrator;
pub mod params;
pub mod recommend;
pub mod record;
pub mod scoring;

// Re-export commonly used types
pub use catalog::RecordIndex;
pub use config::{CompiledConfig, FeatureType, ScoreMethod};
pub use data::{load_records, EngineInputs, InputPaths};
pub use error::{ConfigError, ConfigResult};
pub use exclusion::{
    CandidateProvider, ExcludedSpecies, ExclusionResult, ExclusionRule, Operator, PassThrough,
    RuleExclusion, SpeciesDependency,
};
pub use orchestrator::{recommend_farm, run, FarmPayload, Orchestrator};
pub use params::{build_params_index, resolve, ParamsIndex, SpeciesParamsOverride};
pub use recommend::{assign_dense_ranks, build_species_recommendations, Recommendation};
pub use record::{Record, RecordId, Value};
pub use scoring::{FeatureExplanation, McdaScorer, ScoredCandidate};
