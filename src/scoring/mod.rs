//! Suitability scoring
//!
//! - `features`: per-feature scorers returning `(score, reason)`
//! - `mcda`: weighted aggregation with an explanation trace per candidate

pub mod features;
pub mod mcda;

pub use features::{
    categorical_compatibility_score, categorical_exact_score, numeric_range_score, parse_prefs,
    FeatureScore,
};
pub use mcda::{score_candidates, FeatureExplanation, McdaScorer, ScoredCandidate, ScoringParams};
