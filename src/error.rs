//! Configuration errors
//!
//! Only broken configuration is fatal. Data gaps (missing farm or species values,
//! unknown candidate ids, empty candidate sets) are recovered where they occur and
//! never reach this type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown feature type '{value}' for feature '{feature}'")]
    UnknownFeatureType { feature: String, value: String },

    #[error("unknown score method '{value}' for feature '{feature}'")]
    UnknownScoreMethod { feature: String, value: String },

    #[error("score method '{method}' cannot score {feature_type} feature '{feature}'")]
    IncompatibleScoreMethod {
        feature: String,
        feature_type: String,
        method: String,
    },

    #[error("no {what} configured for feature '{feature}' (species {species})")]
    Unresolved {
        what: &'static str,
        feature: String,
        species: String,
    },

    #[error("weight for feature '{feature}' must be a finite value >= 0, got {weight}")]
    InvalidWeight { feature: String, weight: f64 },

    #[error("override references undeclared feature '{feature}' (species {species})")]
    UndeclaredFeature { feature: String, species: String },

    #[error(
        "compatibility score {from} -> {to} for feature '{feature}' must lie in [0, 1], got {score}"
    )]
    CompatibilityOutOfRange {
        feature: String,
        from: String,
        to: String,
        score: f64,
    },

    #[error("exact_match score for feature '{feature}' must lie in [0, 1], got {score}")]
    ExactMatchOutOfRange { feature: String, score: f64 },

    #[error("feature '{feature}' uses cat_compatibility but has no compatibility_pairs")]
    MissingCompatibilityMatrix { feature: String },

    #[error("unknown exclusion operator '{op}' in rule '{rule}'")]
    UnknownOperator { rule: String, op: String },

    #[error("invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
