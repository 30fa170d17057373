use crate::core::scoring::score;
use crate::models::{Candidate, MatchWeights, PreferenceData, ScoredCandidate};
use std::cmp::Ordering;

/// Result of ranking a candidate pool
#[derive(Debug)]
pub struct MatchResult {
    pub matches: Vec<ScoredCandidate>,
    pub total_candidates: usize,
}

/// Ranks an already-filtered candidate pool by compatibility
///
/// Ordering is score descending, then rating descending, then profile id,
/// so equal inputs always produce the same page.
#[derive(Debug, Clone)]
pub struct Matcher {
    weights: MatchWeights,
}

impl Matcher {
    pub fn new(weights: MatchWeights) -> Self {
        Self { weights }
    }

    pub fn with_default_weights() -> Self {
        Self {
            weights: MatchWeights::default(),
        }
    }

    pub fn weights(&self) -> &MatchWeights {
        &self.weights
    }

    /// Score, sort and truncate `candidates` to at most `limit` entries
    pub fn rank(
        &self,
        preferences: &PreferenceData,
        candidates: Vec<Candidate>,
        limit: usize,
    ) -> MatchResult {
        let total_candidates = candidates.len();

        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|candidate| {
                let result = score(&candidate.profile, preferences);
                ScoredCandidate {
                    profile_id: candidate.id,
                    profile: candidate.profile,
                    rating: candidate.rating,
                    match_score: result.score,
                    reasons: result.reasons,
                }
            })
            .collect();

        scored.sort_by(compare_ranked);
        scored.truncate(limit);

        MatchResult {
            matches: scored,
            total_candidates,
        }
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::with_default_weights()
    }
}

fn compare_ranked(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.match_score
        .partial_cmp(&a.match_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.rating.cmp(&a.rating))
        .then_with(|| a.profile_id.cmp(&b.profile_id))
}
