//! Ranking and presentation
//!
//! Scored candidates are ordered by descending aggregate score with ascending
//! species id as the tie-break, then dense-ranked. Rounding to three decimals is
//! applied to the presented score only, after ranking on the raw value.

use crate::record::RecordId;
use crate::scoring::ScoredCandidate;
use serde::Serialize;
use std::cmp::Ordering;

const MISSING_NAME: &str = "missing";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub species_id: RecordId,
    pub species_name: String,
    pub species_common_name: String,
    pub score_mcda: f64,
    pub rank_overall: usize,
    /// `short_name:reason` per feature, in configuration order
    pub key_reasons: Vec<String>,
}

/// Dense ranks over scores that are already sorted descending
///
/// `[0.82, 0.76, 0.76, 0.70] -> [1, 2, 2, 3]`. Ties use exact float equality.
pub fn assign_dense_ranks(sorted_scores: &[f64]) -> Vec<usize> {
    let mut ranks = Vec::with_capacity(sorted_scores.len());
    let mut last: Option<f64> = None;
    let mut rank = 0;

    for &score in sorted_scores {
        if last != Some(score) {
            rank += 1;
            last = Some(score);
        }
        ranks.push(rank);
    }

    ranks
}

fn by_score_then_id(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.mcda_score
        .total_cmp(&a.mcda_score)
        .then_with(|| a.species_id.cmp(&b.species_id))
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

pub fn build_species_recommendations(mut scored: Vec<ScoredCandidate>) -> Vec<Recommendation> {
    scored.sort_by(by_score_then_id);

    let scores: Vec<f64> = scored.iter().map(|c| c.mcda_score).collect();
    let ranks = assign_dense_ranks(&scores);

    scored
        .into_iter()
        .zip(ranks)
        .map(|(candidate, rank)| Recommendation {
            key_reasons: candidate
                .features
                .iter()
                .map(|(_, e)| format!("{}:{}", e.short_name, e.reason.to_lowercase()))
                .collect(),
            species_id: candidate.species_id,
            species_name: candidate.species_name.unwrap_or_else(|| MISSING_NAME.to_string()),
            species_common_name: candidate
                .species_common_name
                .unwrap_or_else(|| MISSING_NAME.to_string()),
            score_mcda: round3(candidate.mcda_score),
            rank_overall: rank,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureType;
    use crate::scoring::{FeatureExplanation, ScoringParams};

    fn candidate(id: i64, score: f64, reasons: &[(&str, &str)]) -> ScoredCandidate {
        ScoredCandidate {
            species_id: RecordId::Int(id),
            species_name: Some(format!("Species {}", id)),
            species_common_name: None,
            mcda_score: score,
            features: reasons
                .iter()
                .map(|&(short, reason)| {
                    (
                        short.to_string(),
                        FeatureExplanation {
                            short_name: short.to_string(),
                            feature_type: FeatureType::Numeric,
                            farm_value: None,
                            score: None,
                            reason: reason.to_string(),
                            params: ScoringParams::Range { min: None, max: None },
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn test_dense_ranks() {
        assert_eq!(assign_dense_ranks(&[0.82, 0.76, 0.76, 0.70]), vec![1, 2, 2, 3]);
        assert!(assign_dense_ranks(&[]).is_empty());
        assert_eq!(assign_dense_ranks(&[0.5, 0.5, 0.5]), vec![1, 1, 1]);
    }

    #[test]
    fn test_ties_share_rank_and_sort_by_id() {
        let recs = build_species_recommendations(vec![
            candidate(103, 0.4, &[]),
            candidate(102, 0.8567, &[]),
            candidate(101, 0.8567, &[]),
        ]);

        let ids: Vec<_> = recs.iter().map(|r| r.species_id.clone()).collect();
        assert_eq!(ids, vec![RecordId::Int(101), RecordId::Int(102), RecordId::Int(103)]);
        let ranks: Vec<_> = recs.iter().map(|r| r.rank_overall).collect();
        assert_eq!(ranks, vec![1, 1, 2]);
        assert_eq!(recs[0].score_mcda, 0.857);
    }

    #[test]
    fn test_key_reasons_lowercased_in_feature_order() {
        let recs = build_species_recommendations(vec![candidate(
            1,
            0.5,
            &[("rain", "Acceptable"), ("soil", "No match")],
        )]);
        assert_eq!(recs[0].key_reasons, ["rain:acceptable", "soil:no match"]);
    }

    #[test]
    fn test_no_features_no_reasons() {
        let recs = build_species_recommendations(vec![candidate(1, 0.0, &[])]);
        assert!(recs[0].key_reasons.is_empty());
        assert_eq!(recs[0].species_common_name, "missing");
        assert_eq!(recs[0].species_name, "Species 1");
    }

    #[test]
    fn test_empty_input() {
        assert!(build_species_recommendations(Vec::new()).is_empty());
    }
}
